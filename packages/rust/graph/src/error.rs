//! Error types for stage graph construction and resolution.

use std::sync::Arc;

use crate::stage::StageId;

/// Error type accepted from stage bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid graph definition, detected before any stage runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// A declared dependency was never registered in this graph.
    #[error("unknown dependency: stage {dependency} is not registered in this graph")]
    UnknownDependency { dependency: StageId },

    /// `process()` was called on a graph with no stages.
    #[error("stage graph is empty: nothing to process")]
    Empty,
}

/// A stage body failed (returned an error or panicked).
///
/// Cloneable so every dependent awaiting the failed stage observes the same error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("stage {stage} ({}) failed: {source}", .description.as_deref().unwrap_or("unnamed"))]
pub struct StageExecutionError {
    /// Identity of the stage whose body failed.
    pub stage: StageId,
    /// Description of the failing stage, if it had one.
    pub description: Option<String>,
    #[source]
    source: Arc<dyn std::error::Error + Send + Sync>,
}

impl StageExecutionError {
    pub(crate) fn new(stage: StageId, description: Option<String>, source: BoxError) -> Self {
        Self {
            stage,
            description,
            source: Arc::from(source),
        }
    }

    /// The error produced by the stage body.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

/// Top-level error returned by [`StageGraph::process`](crate::StageGraph::process).
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    StageExecution(#[from] StageExecutionError),

    /// The terminal value did not have the type the caller asked for.
    #[error("terminal stage produced a value of an unexpected type (expected {expected})")]
    OutputType { expected: &'static str },
}

/// A stage body asked its [`Inputs`](crate::Inputs) for something that is not there.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("input {index} is missing (stage received {len} inputs)")]
    Missing { index: usize, len: usize },

    #[error("input {index} is not a {expected}")]
    TypeMismatch { index: usize, expected: &'static str },
}

/// Panic payload of a stage body, surfaced as a regular error.
#[derive(Debug, thiserror::Error)]
#[error("stage body panicked: {0}")]
pub(crate) struct StagePanic(pub String);
