// Workflow Engine Library
// Parses and runs GitHub Actions style workflows on the local machine

pub mod actions;
pub mod config;
pub mod error;
pub mod execution;
pub mod expression;
pub mod logging;
pub mod runners;
pub mod steps;
pub mod utils;
pub mod workflow;

pub use error::{RunnerError, RunnerResult};

pub use config::ExecutorConfig;

// Re-export expression types
pub use expression::{EvalError, EvalMode, ExpressionEngine, VariableProvider};

// Re-export execution types
pub use execution::{
    event_journal, Conclusion, EventJournal, ExecutionContext, ExecutionEvent, JobPlanner,
    JournalEntry, MatrixExpander, RunStore, WorkflowExecutor, WorkflowRun,
};

// Re-export collaborator types
pub use actions::{ActionResolver, LocalActionResolver};
pub use runners::{ExecutionEngine, ProcessEngine};
pub use steps::StepServices;

pub use workflow::{Workflow, WorkflowParser};
