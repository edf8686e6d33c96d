// Execution Events
// Progress events written to the run journal

use crate::execution::journal::Journal;
use crate::execution::report::{Conclusion, StepStage};

use std::sync::Arc;
use std::time::Duration;

/// Journal carrying progress events to a consumer
pub type EventJournal = Arc<Journal<ExecutionEvent>>;

/// Create an empty event journal
pub fn event_journal() -> EventJournal {
    Arc::new(Journal::new())
}

/// Severity of a workflow command annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationLevel {
    Debug,
    Notice,
    Warning,
    Error,
}

impl AnnotationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationLevel::Debug => "debug",
            AnnotationLevel::Notice => "notice",
            AnnotationLevel::Warning => "warning",
            AnnotationLevel::Error => "error",
        }
    }
}

/// A `::error file=...::message` style annotation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotation {
    pub message: String,
    pub title: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub col: Option<u32>,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
}

/// Events emitted during workflow execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    WorkflowStarted {
        workflow_name: String,
        run_id: String,
        total_jobs: usize,
    },

    WorkflowCompleted {
        workflow_name: String,
        conclusion: Conclusion,
        duration: Duration,
    },

    JobStarted {
        job_id: String,
        display_name: String,
        matrix_instance: Option<String>,
        total_steps: usize,
    },

    JobCompleted {
        job_id: String,
        conclusion: Conclusion,
        duration: Duration,
    },

    /// Job condition evaluated to false
    JobSkipped { job_id: String, reason: String },

    StepStarted {
        job_id: String,
        step_id: String,
        display_name: String,
        stage: StepStage,
    },

    /// One line of step output; `depth` is the open `::group::` count
    StepOutput {
        job_id: String,
        step_id: String,
        output: String,
        depth: usize,
    },

    StepCompleted {
        job_id: String,
        step_id: String,
        stage: StepStage,
        outcome: Conclusion,
        conclusion: Conclusion,
        duration: Duration,
        exit_code: Option<i32>,
    },

    StepSkipped {
        job_id: String,
        step_id: String,
        stage: StepStage,
        reason: String,
    },

    Annotation {
        job_id: String,
        step_id: String,
        level: AnnotationLevel,
        annotation: Annotation,
    },
}

impl ExecutionEvent {
    pub fn workflow_started(name: impl Into<String>, run_id: impl Into<String>, total_jobs: usize) -> Self {
        Self::WorkflowStarted {
            workflow_name: name.into(),
            run_id: run_id.into(),
            total_jobs,
        }
    }

    pub fn workflow_completed(name: impl Into<String>, conclusion: Conclusion, duration: Duration) -> Self {
        Self::WorkflowCompleted {
            workflow_name: name.into(),
            conclusion,
            duration,
        }
    }

    pub fn job_started(
        job_id: impl Into<String>,
        display_name: impl Into<String>,
        matrix_instance: Option<String>,
        total_steps: usize,
    ) -> Self {
        Self::JobStarted {
            job_id: job_id.into(),
            display_name: display_name.into(),
            matrix_instance,
            total_steps,
        }
    }

    pub fn job_completed(job_id: impl Into<String>, conclusion: Conclusion, duration: Duration) -> Self {
        Self::JobCompleted {
            job_id: job_id.into(),
            conclusion,
            duration,
        }
    }

    pub fn job_skipped(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JobSkipped {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    pub fn step_started(
        job_id: impl Into<String>,
        step_id: impl Into<String>,
        display_name: impl Into<String>,
        stage: StepStage,
    ) -> Self {
        Self::StepStarted {
            job_id: job_id.into(),
            step_id: step_id.into(),
            display_name: display_name.into(),
            stage,
        }
    }

    pub fn step_output(
        job_id: impl Into<String>,
        step_id: impl Into<String>,
        output: impl Into<String>,
        depth: usize,
    ) -> Self {
        Self::StepOutput {
            job_id: job_id.into(),
            step_id: step_id.into(),
            output: output.into(),
            depth,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step_completed(
        job_id: impl Into<String>,
        step_id: impl Into<String>,
        stage: StepStage,
        outcome: Conclusion,
        conclusion: Conclusion,
        duration: Duration,
        exit_code: Option<i32>,
    ) -> Self {
        Self::StepCompleted {
            job_id: job_id.into(),
            step_id: step_id.into(),
            stage,
            outcome,
            conclusion,
            duration,
            exit_code,
        }
    }

    pub fn step_skipped(
        job_id: impl Into<String>,
        step_id: impl Into<String>,
        stage: StepStage,
        reason: impl Into<String>,
    ) -> Self {
        Self::StepSkipped {
            job_id: job_id.into(),
            step_id: step_id.into(),
            stage,
            reason: reason.into(),
        }
    }

    pub fn annotation(
        job_id: impl Into<String>,
        step_id: impl Into<String>,
        level: AnnotationLevel,
        annotation: Annotation,
    ) -> Self {
        Self::Annotation {
            job_id: job_id.into(),
            step_id: step_id.into(),
            level,
            annotation,
        }
    }

    /// Job the event belongs to, if any
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::WorkflowStarted { .. } | Self::WorkflowCompleted { .. } => None,
            Self::JobStarted { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobSkipped { job_id, .. }
            | Self::StepStarted { job_id, .. }
            | Self::StepOutput { job_id, .. }
            | Self::StepCompleted { job_id, .. }
            | Self::StepSkipped { job_id, .. }
            | Self::Annotation { job_id, .. } => Some(job_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::journal::JournalEntry;

    #[test]
    fn test_events_flow_through_journal() {
        let journal = event_journal();
        journal.write(ExecutionEvent::workflow_started("CI", "run-1", 2));
        journal.write(ExecutionEvent::step_output("build", "0", "hello", 1));
        journal.close();

        match journal.read_entry() {
            JournalEntry::Entry(ExecutionEvent::WorkflowStarted { total_jobs, .. }) => {
                assert_eq!(total_jobs, 2)
            }
            other => panic!("unexpected entry: {:?}", other),
        }
        match journal.read_entry() {
            JournalEntry::Entry(event) => assert_eq!(event.job_id(), Some("build")),
            JournalEntry::Closed => panic!("journal closed early"),
        }
        assert!(matches!(journal.read_entry(), JournalEntry::Closed));
    }
}
