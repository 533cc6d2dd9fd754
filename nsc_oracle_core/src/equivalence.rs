//nsc_oracle_core/equivalence.rs

//! Equivalence-principle engine: run a task once per executor and accept the
//! result only if every execution agrees under the chosen policy.
//!
//! Executor 0 acts as leader; its parsed candidate becomes canonical. Every
//! other executor is compared against the leader. There is no majority
//! fallback and no retry: the first disagreement rejects the resolution.

use serde::{Deserialize, Serialize};

use crate::candidate::{ParseStage, ParsedCandidate};
use crate::cfg::OracleCfg;
use crate::error::OracleError;
use crate::parse::{Parsed, ResultParser};
use crate::task::{NondetTask, TaskError, TaskOutput, TaskParams};

/// What strict mode holds equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrictLayer {
    /// Parsed candidates must match field for field.
    Parsed,
    /// Raw outputs must match byte for byte.
    Raw,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    Strict,
    /// Decision fields must match exactly; everything else is left to a
    /// [`Comparator`] applying the natural-language `principle`.
    Comparative { principle: String },
}

/// One executor's run, as seen by the engine.
#[derive(Clone, Debug)]
pub struct Execution {
    pub executor: usize,
    pub output: TaskOutput,
    pub parsed: Parsed,
}

/// Judges whether a validator's execution is equivalent to the leader's.
pub trait Comparator {
    fn equivalent(&self, principle: &str, leader: &Execution, other: &Execution) -> Result<bool, TaskError>;
}

impl<F> Comparator for F
where
    F: Fn(&str, &Execution, &Execution) -> Result<bool, TaskError>,
{
    fn equivalent(&self, principle: &str, leader: &Execution, other: &Execution) -> Result<bool, TaskError> {
        self(principle, leader, other)
    }
}

/// Deterministic rubric: formatting and free text never matter; prices
/// matter only when a tolerance is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldComparator {
    pub price_tolerance_bps: Option<u32>,
}

impl Comparator for FieldComparator {
    fn equivalent(&self, _principle: &str, leader: &Execution, other: &Execution) -> Result<bool, TaskError> {
        let Some(bps) = self.price_tolerance_bps else {
            return Ok(true);
        };
        Ok(match (leader.parsed.candidate.price, other.parsed.candidate.price) {
            (Some(a), Some(b)) => (a - b).abs() <= a.abs() * f64::from(bps) / 10_000.0,
            (None, None) => true,
            _ => false,
        })
    }
}

/// The candidate every executor agreed on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub candidate: ParsedCandidate,
    pub leader_stage: ParseStage,
    pub executors: usize,
}

pub struct EquivalenceEngine {
    cfg: OracleCfg,
    comparator: Box<dyn Comparator + Send + Sync>,
}

impl std::fmt::Debug for EquivalenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EquivalenceEngine").field("cfg", &self.cfg).finish_non_exhaustive()
    }
}

impl EquivalenceEngine {
    pub fn new(cfg: OracleCfg) -> Self {
        let comparator = FieldComparator { price_tolerance_bps: cfg.price_tolerance_bps };
        Self { cfg, comparator: Box::new(comparator) }
    }

    /// Replace the comparative-mode judge (e.g. with a model-backed one).
    pub fn with_comparator<C>(mut self, comparator: C) -> Self
    where
        C: Comparator + Send + Sync + 'static,
    {
        self.comparator = Box::new(comparator);
        self
    }

    pub fn cfg(&self) -> &OracleCfg {
        &self.cfg
    }

    /// Resolve with the configured executor count.
    pub fn resolve(
        &self,
        task: &dyn NondetTask,
        params: &TaskParams,
        policy: &Policy,
    ) -> Result<ConsensusOutcome, OracleError> {
        self.resolve_with(task, params, policy, self.cfg.executor_count)
    }

    pub fn resolve_with(
        &self,
        task: &dyn NondetTask,
        params: &TaskParams,
        policy: &Policy,
        executor_count: usize,
    ) -> Result<ConsensusOutcome, OracleError> {
        if executor_count == 0 {
            return Err(OracleError::validation("at least one executor is required"));
        }
        let parser = ResultParser::new(params.labels.clone(), params.schema);

        let leader = run_one(task, &parser, params, 0)?;
        for executor in 1..executor_count {
            let other = run_one(task, &parser, params, executor)?;
            if let Err(e) = self.check(policy, &leader, &other) {
                tracing::warn!(executor, error = %e, "equivalence rejected");
                return Err(e);
            }
        }

        tracing::info!(
            executors = executor_count,
            leader_stage = ?leader.parsed.stage,
            winner = ?leader.parsed.candidate.winner,
            "equivalence accepted"
        );
        Ok(ConsensusOutcome {
            candidate: leader.parsed.candidate,
            leader_stage: leader.parsed.stage,
            executors: executor_count,
        })
    }

    fn check(&self, policy: &Policy, leader: &Execution, other: &Execution) -> Result<(), OracleError> {
        match policy {
            Policy::Strict => match self.cfg.strict_layer {
                StrictLayer::Raw => {
                    if leader.output != other.output {
                        return Err(OracleError::disagreement(other.executor, "raw output differs"));
                    }
                }
                StrictLayer::Parsed => {
                    let (a, b) = (&leader.parsed.candidate, &other.parsed.candidate);
                    if a != b {
                        return Err(OracleError::disagreement(
                            other.executor,
                            format!("parsed result differs: leader {a:?}, executor {b:?}"),
                        ));
                    }
                }
            },
            Policy::Comparative { principle } => {
                let (a, b) = (
                    leader.parsed.candidate.decision_fields(),
                    other.parsed.candidate.decision_fields(),
                );
                if a != b {
                    return Err(OracleError::disagreement(
                        other.executor,
                        format!("decision differs: leader {a:?}, executor {b:?}"),
                    ));
                }
                let same = self
                    .comparator
                    .equivalent(principle, leader, other)
                    .map_err(|e| OracleError::Task { executor: other.executor, reason: e.0 })?;
                if !same {
                    return Err(OracleError::disagreement(other.executor, "comparator judged outputs not equivalent"));
                }
            }
        }
        Ok(())
    }
}

fn run_one(
    task: &dyn NondetTask,
    parser: &ResultParser,
    params: &TaskParams,
    executor: usize,
) -> Result<Execution, OracleError> {
    let output = task
        .execute(executor, params)
        .map_err(|e| OracleError::Task { executor, reason: e.0 })?;
    let parsed = parser.parse(&output.text);
    tracing::debug!(executor, stage = ?parsed.stage, "executor finished");
    Ok(Execution { executor, output, parsed })
}
