pub mod error;
pub mod market;
pub mod candidate;
pub mod task;

pub mod parse;
pub mod cfg;
pub mod equivalence;
pub mod abi;
pub mod envelope;
pub mod record;

pub use error::{OracleError, OracleResult};
pub use market::{Address, LabelSet, Market};
pub use candidate::{OutcomeSchema, ParseStage, ParsedCandidate, dollars_to_cents};
pub use task::{NondetTask, RenderMode, ReplayTask, TaskError, TaskOutput, TaskParams};

pub use parse::{Parsed, ResultParser};
pub use cfg::OracleCfg;
pub use equivalence::{Comparator, ConsensusOutcome, EquivalenceEngine, Execution, FieldComparator, Policy, StrictLayer};
pub use abi::{ParamType, Token, decode_tuple, encode_tuple};
pub use envelope::{BridgeEnvelope, ResolutionTuple, decode_envelope, decode_resolution, encode};
pub use record::ResolutionRecord;
