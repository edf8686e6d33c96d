// Job Scheduler
// Bounded worker pool that starts planned jobs once their needs are done

use crate::execution::report::Conclusion;
use crate::workflow::Workflow;
use crate::{RunnerError, RunnerResult};

use std::collections::HashSet;
use std::future::Future;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// What a scheduling pass produced
#[derive(Debug, Default)]
pub struct Schedule {
    /// Finished jobs with their conclusions, in completion order
    pub completed: Vec<(String, Conclusion)>,
    /// Jobs whose run returned an error, in completion order
    pub aborted: Vec<String>,
    /// The first job error, after which no new job was started
    pub error: Option<RunnerError>,
}

impl Schedule {
    pub fn into_result(self) -> RunnerResult<Vec<(String, Conclusion)>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.completed),
        }
    }
}

/// Runs planned jobs on at most `max_parallel` workers.
///
/// A job is started once every job in its `needs` has finished. Jobs are
/// considered in planned order, so with a single worker the run is
/// exactly the planned sequence.
#[derive(Debug, Clone, Copy)]
pub struct JobScheduler {
    max_parallel: usize,
}

impl JobScheduler {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Drive `plan` to completion.
    ///
    /// `start` builds the future for one job. The first job error stops
    /// new jobs from starting; running jobs are still awaited and their
    /// conclusions kept.
    pub async fn run<F, Fut>(&self, workflow: &Workflow, plan: &[String], mut start: F) -> Schedule
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = RunnerResult<Conclusion>> + Send + 'static,
    {
        let mut pending: Vec<String> = plan.to_vec();
        let planned: HashSet<&str> = plan.iter().map(String::as_str).collect();
        let mut finished: HashSet<String> = HashSet::new();
        let mut completed = Vec::with_capacity(plan.len());
        let mut aborted = Vec::new();
        let mut running = JoinSet::new();
        let mut failure: Option<RunnerError> = None;

        loop {
            if failure.is_none() {
                let mut i = 0;
                while i < pending.len() && running.len() < self.max_parallel {
                    let ready = workflow
                        .jobs
                        .get(&pending[i])
                        .map(|job| {
                            job.needs
                                .to_vec()
                                .iter()
                                .all(|need| finished.contains(need) || !planned.contains(need.as_str()))
                        })
                        .unwrap_or(true);
                    if ready {
                        let job_id = pending.remove(i);
                        debug!(job = %job_id, running = running.len() + 1, "starting job");
                        let work = start(job_id.clone());
                        running.spawn(async move { (job_id, work.await) });
                    } else {
                        i += 1;
                    }
                }
            }

            match running.join_next().await {
                None => break,
                Some(Ok((job_id, Ok(conclusion)))) => {
                    debug!(job = %job_id, conclusion = %conclusion, "job finished");
                    finished.insert(job_id.clone());
                    completed.push((job_id, conclusion));
                }
                Some(Ok((job_id, Err(err)))) => {
                    error!(job = %job_id, error = %err, "job aborted the run");
                    finished.insert(job_id.clone());
                    aborted.push(job_id);
                    failure.get_or_insert(err);
                }
                Some(Err(join_err)) => {
                    error!(error = %join_err, "job task did not complete");
                    failure.get_or_insert(RunnerError::execution(format!(
                        "job task did not complete: {}",
                        join_err
                    )));
                }
            }
        }

        if failure.is_none() && !pending.is_empty() {
            failure = Some(RunnerError::planning(format!(
                "jobs could never start: {}",
                pending.join(", ")
            )));
        }
        Schedule {
            completed,
            aborted,
            error: failure,
        }
    }
}
