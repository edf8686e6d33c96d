// Execution Engine Module
// Planning, the run context, job scheduling and step orchestration

pub mod commands;
pub mod context;
pub mod envfile;
pub mod events;
pub mod executor;
pub mod graph;
pub mod journal;
pub mod matrix;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod task;

// Re-export key types
pub use commands::{parse_command, CommandKind, CommandProcessor, LineDisposition, WorkflowCommand};
pub use context::ExecutionContext;
pub use envfile::EnvFiles;
pub use events::{event_journal, Annotation, AnnotationLevel, EventJournal, ExecutionEvent};
pub use executor::WorkflowExecutor;
pub use graph::{GraphError, GraphErrorKind, JobPlanner};
pub use journal::{Journal, JournalEntry};
pub use matrix::{MatrixExpander, MatrixInstance};
pub use report::{Conclusion, JobRun, StepRun, StepRunSummary, StepStage, WorkflowRun};
pub use scheduler::{JobScheduler, Schedule};
pub use store::RunStore;
pub use task::{Decision, Task, TaskError, TaskResult, TaskRunner, TaskState};
