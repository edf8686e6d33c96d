// Task Runner
// The pre -> condition -> run -> post state machine shared by workflows, jobs and step stages

use crate::execution::report::Conclusion;
use crate::RunnerError;

use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    InProgress,
    Completed,
}

/// What the condition hook decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Run,
    /// Skip the run hook and conclude with the given verdict
    Skip(Conclusion),
}

/// A unit the [`TaskRunner`] can drive.
///
/// Only `run` is required. `post_run` is invoked whenever `pre_run`
/// succeeded, whatever happened in between.
#[async_trait]
pub trait Task: Send {
    async fn pre_run(&mut self) -> Result<(), RunnerError> {
        Ok(())
    }

    async fn condition(&mut self) -> Result<Decision, RunnerError> {
        Ok(Decision::Run)
    }

    async fn run(&mut self) -> Result<Conclusion, RunnerError>;

    async fn post_run(&mut self) -> Result<(), RunnerError> {
        Ok(())
    }
}

/// Result of driving a task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub ran: bool,
    pub conclusion: Conclusion,
    pub duration: Duration,
    pub state: TaskState,
}

/// A task hook failed; the partial result is kept alongside the error.
#[derive(Debug)]
pub struct TaskError {
    pub error: RunnerError,
    pub result: TaskResult,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for TaskError {}

impl From<TaskError> for RunnerError {
    fn from(err: TaskError) -> Self {
        err.error
    }
}

/// Drives a [`Task`] through its lifecycle
pub struct TaskRunner {
    state: TaskState,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner {
    pub fn new() -> Self {
        Self {
            state: TaskState::Queued,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Run `task` to completion.
    ///
    /// A `pre_run` error is returned immediately and nothing else runs. A
    /// `condition` or `run` error concludes `failure`, still goes through
    /// `post_run`, and is returned. A `post_run` error is only returned
    /// when nothing failed before it.
    pub async fn run<T: Task + ?Sized>(&mut self, task: &mut T) -> Result<TaskResult, TaskError> {
        let started = Instant::now();
        self.state = TaskState::InProgress;

        if let Err(error) = task.pre_run().await {
            self.state = TaskState::Completed;
            return Err(TaskError {
                error,
                result: self.result(false, Conclusion::Failure, started),
            });
        }

        let mut ran = false;
        let (conclusion, failure) = match task.condition().await {
            Ok(Decision::Skip(conclusion)) => (conclusion, None),
            Ok(Decision::Run) => {
                ran = true;
                match task.run().await {
                    Ok(conclusion) => (conclusion, None),
                    Err(error) => (Conclusion::Failure, Some(error)),
                }
            }
            Err(error) => (Conclusion::Failure, Some(error)),
        };

        let post = task.post_run().await;
        self.state = TaskState::Completed;
        let result = self.result(ran, conclusion, started);

        match (failure, post) {
            (Some(error), _) => Err(TaskError { error, result }),
            (None, Err(error)) => Err(TaskError {
                error,
                result: TaskResult {
                    conclusion: Conclusion::Failure,
                    ..result
                },
            }),
            (None, Ok(())) => Ok(result),
        }
    }

    fn result(&self, ran: bool, conclusion: Conclusion, started: Instant) -> TaskResult {
        TaskResult {
            ran,
            conclusion,
            duration: started.elapsed(),
            state: self.state,
        }
    }
}
