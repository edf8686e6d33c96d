// Runner Errors
// Error taxonomy shared by every engine component

use thiserror::Error;

use crate::actions::ActionError;
use crate::execution::graph::GraphError;
use crate::expression::EvalError;

/// Errors raised while planning or executing a workflow
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A job or workflow reference could not be resolved, or nothing was planned
    #[error("planning error: {0}")]
    Planning(String),

    /// A lifecycle call was made out of order (e.g. setting a step without a job)
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// An expression failed to parse, evaluate, or coerce
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// A process or container could not be run
    #[error("execution error: {0}")]
    Execution(String),

    /// A report could not be written or read
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The workflow file is not valid YAML for the model
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    pub fn planning(message: impl Into<String>) -> Self {
        Self::Planning(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Planning and precondition errors abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Planning(_) | Self::Precondition(_))
    }
}

impl From<GraphError> for RunnerError {
    fn from(err: GraphError) -> Self {
        Self::Planning(err.to_string())
    }
}

impl From<EvalError> for RunnerError {
    fn from(err: EvalError) -> Self {
        Self::Evaluation(err.message)
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for RunnerError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<ActionError> for RunnerError {
    fn from(err: ActionError) -> Self {
        Self::Execution(err.to_string())
    }
}

pub type RunnerResult<T> = Result<T, RunnerError>;
