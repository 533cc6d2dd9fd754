//nsc_oracle_core/error.rs

/// Failure taxonomy for a market resolution.
///
/// Parser degradation is deliberately absent: the parser is total and reports
/// how far it had to degrade through [`crate::ParseStage`] instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// Missing or out-of-range market parameters. Raised before any task runs.
    #[error("invalid market parameters: {reason}")]
    Validation { reason: String },

    /// The equivalence policy did not accept the executor outputs.
    #[error("executor {executor} disagrees with the leader: {reason}")]
    Disagreement { executor: usize, reason: String },

    /// Encoder input does not fit the declared tuple layout.
    #[error("abi schema violation: {reason}")]
    Schema { reason: String },

    /// An executor (or a collaborator it called) failed to produce output.
    #[error("executor {executor} failed: {reason}")]
    Task { executor: usize, reason: String },

    /// A snapshot could not be read back.
    #[error("snapshot rejected: {reason}")]
    Snapshot { reason: String },
}

impl OracleError {
    pub fn validation(reason: impl Into<String>) -> Self {
        OracleError::Validation { reason: reason.into() }
    }

    pub fn schema(reason: impl Into<String>) -> Self {
        OracleError::Schema { reason: reason.into() }
    }

    pub fn disagreement(executor: usize, reason: impl Into<String>) -> Self {
        OracleError::Disagreement { executor, reason: reason.into() }
    }
}

pub type OracleResult<T> = Result<T, OracleError>;
