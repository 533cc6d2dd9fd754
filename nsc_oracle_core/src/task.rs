//! Boundary to the non-deterministic fetch-and-interpret task.
//!
//! A task only ever sees an immutable [`TaskParams`] and its executor index,
//! so no execution can observe another's output or any market state.

use serde::{Deserialize, Serialize};

use crate::candidate::OutcomeSchema;
use crate::market::LabelSet;

/// How the data source page is fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    Text,
    Screenshot,
}

/// Everything a task run may read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParams {
    pub market_title: String,
    pub labels: LabelSet,
    pub url: String,
    pub mode: RenderMode,
    pub schema: OutcomeSchema,
    /// Instruction for the model, minus the fetched page content.
    pub instruction: String,
}

/// Raw output of one execution. Consumed by the parser, never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskOutput {
    pub text: String,
    pub images: Vec<Vec<u8>>,
}

impl TaskOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), images: Vec::new() }
    }
}

impl From<String> for TaskOutput {
    fn from(text: String) -> Self {
        TaskOutput::text(text)
    }
}

impl From<&str> for TaskOutput {
    fn from(text: &str) -> Self {
        TaskOutput::text(text)
    }
}

/// Failure reported by a task or one of its collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskError(pub String);

impl TaskError {
    pub fn new(msg: impl Into<String>) -> Self {
        TaskError(msg.into())
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One independent fetch-and-interpret run.
pub trait NondetTask {
    fn execute(&self, executor: usize, params: &TaskParams) -> Result<TaskOutput, TaskError>;
}

impl<F> NondetTask for F
where
    F: Fn(usize, &TaskParams) -> Result<TaskOutput, TaskError>,
{
    fn execute(&self, executor: usize, params: &TaskParams) -> Result<TaskOutput, TaskError> {
        self(executor, params)
    }
}

/// Serves outputs collected elsewhere, one per executor.
#[derive(Clone, Debug, Default)]
pub struct ReplayTask {
    outputs: Vec<TaskOutput>,
}

impl ReplayTask {
    pub fn new<I, T>(outputs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskOutput>,
    {
        Self { outputs: outputs.into_iter().map(Into::into).collect() }
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl NondetTask for ReplayTask {
    fn execute(&self, executor: usize, _params: &TaskParams) -> Result<TaskOutput, TaskError> {
        self.outputs
            .get(executor)
            .cloned()
            .ok_or_else(|| TaskError::new(format!("no recorded output for executor {executor}")))
    }
}
