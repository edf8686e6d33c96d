// Workflow Executor
// Drives a workflow through the task runner: planned jobs, matrix combinations and step stages

use crate::config::ExecutorConfig;
use crate::execution::context::ExecutionContext;
use crate::execution::events::{EventJournal, ExecutionEvent};
use crate::execution::graph::JobPlanner;
use crate::execution::matrix::MatrixExpander;
use crate::execution::report::{Conclusion, JobRun, StepStage, WorkflowRun};
use crate::execution::scheduler::JobScheduler;
use crate::execution::task::{Decision, Task, TaskRunner};
use crate::steps::{StageTask, StepKind, StepServices};
use crate::workflow::{Job, Step, Workflow};
use crate::{RunnerError, RunnerResult};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Runs workflows against a config and a set of step collaborators
pub struct WorkflowExecutor {
    config: Arc<ExecutorConfig>,
    services: StepServices,
    journal: Option<EventJournal>,
}

impl WorkflowExecutor {
    /// Executor using local processes, the docker CLI and on-disk actions
    pub fn new(config: ExecutorConfig) -> Self {
        let services = StepServices::local(&config);
        Self {
            config: Arc::new(config),
            services,
            journal: None,
        }
    }

    pub fn with_services(mut self, services: StepServices) -> Self {
        self.services = services;
        self
    }

    /// Progress events are written to `journal`; it is not closed here
    pub fn with_journal(mut self, journal: EventJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `workflow`, or only `job` and what it needs.
    ///
    /// Planning and precondition errors abort the run and are returned.
    /// Step and job failures only show up in the returned report.
    pub async fn execute(&self, workflow: Workflow, job: Option<&str>) -> RunnerResult<WorkflowRun> {
        let plan = JobPlanner::plan(&workflow, job)?;
        debug!(plan = ?plan, "planned jobs");

        let mut ctx = ExecutionContext::new(Arc::clone(&self.config));
        if let Some(journal) = &self.journal {
            ctx = ctx.with_journal(journal.clone());
        }
        if let Err(err) = ctx.store().reset() {
            error!(error = %err, "failed to reset the run store");
        }

        let mut task = WorkflowTask {
            ctx,
            services: self.services.clone(),
            workflow: Arc::new(workflow),
            plan,
            started: Instant::now(),
            report: None,
        };
        let result = TaskRunner::new().run(&mut task).await;

        match (result, task.report) {
            (Err(err), _) => Err(err.error),
            (Ok(_), Some(report)) => Ok(report),
            (Ok(_), None) => Err(RunnerError::precondition("workflow finished without a report")),
        }
    }
}

struct WorkflowTask {
    ctx: ExecutionContext,
    services: StepServices,
    workflow: Arc<Workflow>,
    plan: Vec<String>,
    started: Instant,
    report: Option<WorkflowRun>,
}

#[async_trait]
impl Task for WorkflowTask {
    async fn pre_run(&mut self) -> Result<(), RunnerError> {
        let events = self.workflow.on.events();
        let event_name = &self.ctx.config().event_name;
        if !events.is_empty() && !events.iter().any(|e| e == event_name) {
            warn!(event = %event_name, triggers = ?events, "workflow is not triggered by this event; running anyway");
        }

        self.ctx.set_workflow(Arc::clone(&self.workflow))?;
        self.started = Instant::now();
        if let Some(run) = self.ctx.workflow_run() {
            info!(workflow = %run.name, run_id = %run.run_id, jobs = self.plan.len(), "workflow started");
            self.ctx.emit(ExecutionEvent::workflow_started(
                run.name.clone(),
                run.run_id.clone(),
                self.plan.len(),
            ));
        }
        Ok(())
    }

    async fn run(&mut self) -> Result<Conclusion, RunnerError> {
        let scheduler = JobScheduler::new(self.ctx.config().parallelism());
        let services = self.services.clone();
        let master = &self.ctx;

        let schedule = scheduler
            .run(&self.workflow, &self.plan, |job_id| {
                let forked = master.fork();
                let services = services.clone();
                async move { run_job(forked?, services, job_id).await }
            })
            .await;

        for (job_id, conclusion) in &schedule.completed {
            self.ctx.record_job_conclusion(job_id, *conclusion)?;
        }
        for job_id in &schedule.aborted {
            self.ctx.record_job_conclusion(job_id, Conclusion::Failure)?;
        }
        if let Some(err) = schedule.error {
            return Err(err);
        }
        Ok(self.ctx.workflow_run().map(|r| r.conclusion).unwrap_or_default())
    }

    async fn post_run(&mut self) -> Result<(), RunnerError> {
        let run = self.ctx.unset_workflow()?;
        info!(workflow = %run.name, conclusion = %run.conclusion, "workflow completed");
        self.ctx.emit(ExecutionEvent::workflow_completed(
            run.name.clone(),
            run.conclusion,
            self.started.elapsed(),
        ));
        self.report = Some(run);
        Ok(())
    }
}

/// Run one job on its own forked context and return its final conclusion
async fn run_job(ctx: ExecutionContext, services: StepServices, job_id: String) -> RunnerResult<Conclusion> {
    let mut task = JobTask {
        ctx,
        services,
        job_id,
        report: None,
    };
    match TaskRunner::new().run(&mut task).await {
        Ok(result) => Ok(task.report.map(|r| r.conclusion).unwrap_or(result.conclusion)),
        Err(err) => Err(err.error),
    }
}

struct JobTask {
    ctx: ExecutionContext,
    services: StepServices,
    job_id: String,
    report: Option<JobRun>,
}

#[async_trait]
impl Task for JobTask {
    async fn pre_run(&mut self) -> Result<(), RunnerError> {
        self.ctx.set_job(&self.job_id)
    }

    async fn condition(&mut self) -> Result<Decision, RunnerError> {
        let condition = self.ctx.job().and_then(|j| j.if_condition.clone());
        let engine = self.ctx.engine();
        let run = match engine.eval_condition(&self.ctx, condition.as_deref()) {
            Ok(run) => run,
            Err(err) => {
                self.ctx.fold_job_conclusion(Conclusion::Failure)?;
                return Err(err.into());
            }
        };
        if run {
            return Ok(Decision::Run);
        }

        self.ctx.mark_job_skipped()?;
        let reason = match condition {
            Some(condition) => format!("condition '{}' was false", condition),
            None => "a needed job did not succeed".to_string(),
        };
        info!(job = %self.job_id, reason = %reason, "job skipped");
        self.ctx
            .emit(ExecutionEvent::job_skipped(self.job_id.clone(), reason));
        Ok(Decision::Skip(Conclusion::Skipped))
    }

    async fn run(&mut self) -> Result<Conclusion, RunnerError> {
        match self.run_matrix().await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.ctx.fold_job_conclusion(Conclusion::Failure)?;
                Err(err)
            }
        }
    }

    async fn post_run(&mut self) -> Result<(), RunnerError> {
        self.report = Some(self.ctx.unset_job()?);
        Ok(())
    }
}

impl JobTask {
    /// Run every matrix combination, or the job once when there is no matrix
    async fn run_matrix(&mut self) -> RunnerResult<Conclusion> {
        let job = self
            .ctx
            .job()
            .cloned()
            .ok_or_else(|| RunnerError::precondition("no job is set"))?;
        let engine = self.ctx.engine();
        let strategy = job.strategy.as_ref();

        let instances = job.matrix().map(MatrixExpander::expand).unwrap_or_default();
        let total = instances.len().max(1);
        let fail_fast = engine.eval_typed_or(&self.ctx, strategy.and_then(|s| s.fail_fast.as_ref()), true)?;
        let max_parallel = engine
            .eval_typed_or(&self.ctx, strategy.and_then(|s| s.max_parallel.as_ref()), total as i64)?
            .max(1) as usize;

        if instances.is_empty() {
            self.ctx.set_matrix(None, 1, fail_fast, max_parallel)?;
            self.run_combination(&job).await?;
        } else {
            let mut cancel_rest = false;
            for instance in instances {
                let name = instance.name.clone();
                self.ctx
                    .set_matrix(Some(instance), total, fail_fast, max_parallel)?;
                if cancel_rest {
                    info!(job = %self.job_id, matrix = %name, "cancelled by fail-fast");
                    self.ctx.fold_job_conclusion(Conclusion::Cancelled)?;
                    self.ctx.emit(ExecutionEvent::job_skipped(
                        self.job_id.clone(),
                        format!("matrix combination ({}) cancelled by fail-fast", name),
                    ));
                    continue;
                }
                let conclusion = self.run_combination(&job).await?;
                if fail_fast && conclusion.propagates() {
                    cancel_rest = true;
                }
            }
        }

        Ok(self.ctx.job_run().map(|r| r.outcome).unwrap_or_default())
    }

    /// Run every stage of every step for the current matrix combination:
    /// all `pre` stages, then all `main` stages, then `post` stages in
    /// reverse for the steps whose main stage ran.
    async fn run_combination(&mut self, job: &Job) -> RunnerResult<Conclusion> {
        let started = Instant::now();
        let matrix_name = self.ctx.matrix_instance().map(|m| m.name.clone());
        self.ctx.emit(ExecutionEvent::job_started(
            self.job_id.clone(),
            job.display_name(&self.job_id),
            matrix_name,
            job.steps.len(),
        ));

        let engine = self.ctx.engine();
        let minutes = engine.eval_typed_or(&self.ctx, job.timeout_minutes.as_ref(), 0.0)?;
        let deadline =
            (minutes > 0.0).then(|| tokio::time::Instant::now() + Duration::from_secs_f64(minutes * 60.0));

        let mut kinds = Vec::with_capacity(job.steps.len());
        for step in &job.steps {
            let mut kind = StepKind::from_step(step)?;
            kind.setup(&self.services).await;
            kinds.push(kind);
        }

        for (index, (step, kind)) in job.steps.iter().zip(&kinds).enumerate() {
            if kind.has_stage(StepStage::Pre) {
                self.run_stage(step, kind, index, StepStage::Pre, deadline).await?;
            }
        }

        let mut main_ran = vec![false; kinds.len()];
        for (index, (step, kind)) in job.steps.iter().zip(&kinds).enumerate() {
            main_ran[index] = self.run_stage(step, kind, index, StepStage::Main, deadline).await?;
        }

        for (index, (step, kind)) in job.steps.iter().zip(&kinds).enumerate().rev() {
            if main_ran[index] && kind.has_stage(StepStage::Post) {
                self.run_stage(step, kind, index, StepStage::Post, deadline).await?;
            }
        }

        if let Err(err) = self.ctx.set_job_results() {
            if err.is_fatal() {
                return Err(err);
            }
            error!(job = %self.job_id, error = %err, "job outputs could not be evaluated");
            self.ctx.fold_job_conclusion(Conclusion::Failure)?;
        }

        let conclusion = self.ctx.job_status();
        self.ctx.emit(ExecutionEvent::job_completed(
            self.job_id.clone(),
            conclusion,
            started.elapsed(),
        ));
        Ok(conclusion)
    }

    /// Returns whether the stage ran. A condition that cannot be evaluated
    /// records the stage as a failure.
    async fn run_stage(
        &mut self,
        step: &Step,
        kind: &StepKind,
        index: usize,
        stage: StepStage,
        deadline: Option<tokio::time::Instant>,
    ) -> RunnerResult<bool> {
        let mut task = StageTask::new(&mut self.ctx, &self.services, step, kind, index, stage, deadline);
        match TaskRunner::new().run(&mut task).await {
            Ok(result) => Ok(result.ran),
            Err(err) if err.error.is_fatal() => Err(err.error),
            Err(err) => {
                error!(job = %self.job_id, step = %step.id_or_index(index), stage = %stage, error = %err, "stage could not start");
                self.ctx.record_skipped_step(step, index, stage, Conclusion::Failure)?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::LocalActionResolver;
    use crate::execution::events::event_journal;
    use crate::execution::journal::JournalEntry;
    use crate::runners::fake::{FakeEngine, FakeReply};
    use crate::runners::{ExecRequest, ExecSpec};
    use crate::workflow::WorkflowParser;
    use std::fs;
    use std::path::Path;

    fn executor(dir: &Path, engine: Arc<FakeEngine>) -> WorkflowExecutor {
        let config = ExecutorConfig::new()
            .with_workspace(dir)
            .with_action_cache_dir(dir.join("actions-cache"))
            .with_default_shell("sh");
        let services = StepServices::new(engine, Arc::new(LocalActionResolver::new(dir, dir.join("actions-cache"))));
        WorkflowExecutor::new(config).with_services(services)
    }

    fn script_of(request: &ExecRequest) -> String {
        match &request.spec {
            ExecSpec::Process { args, .. } => args.last().cloned().unwrap_or_default(),
            ExecSpec::Container { image, .. } => image.clone(),
        }
    }

    /// Replies by matching the script body, which the fake reads before
    /// the runner removes the file
    fn scripted(reply: impl Fn(&str) -> FakeReply + Send + Sync + 'static) -> Arc<FakeEngine> {
        Arc::new(FakeEngine::new(move |request| {
            let body = fs::read_to_string(script_of(request)).unwrap_or_default();
            reply(&body)
        }))
    }

    #[tokio::test]
    async fn test_needs_outputs_flow_between_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
on: push
jobs:
  produce:
    outputs:
      version: ${{ steps.emit.outputs.version }}
    steps:
      - id: emit
        run: emit-version
  consume:
    needs: produce
    steps:
      - run: use-version
        env:
          VERSION: ${{ needs.produce.outputs.version }}
"#;
        let engine = scripted(|body| {
            if body.contains("emit-version") {
                FakeReply::ok(&["::set-output name=version::1.2.3"])
            } else {
                FakeReply::default()
            }
        });
        let exec = executor(dir.path(), engine.clone());
        let run = exec
            .execute(WorkflowParser::parse(yaml).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(run.conclusion, Conclusion::Success);
        let requests = engine.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].env["VERSION"], "1.2.3");

        let store = crate::execution::store::RunStore::new(exec.config().state_dir());
        let produce = store.read_job("produce").unwrap().unwrap();
        assert_eq!(produce.outputs["version"], "1.2.3");
        assert_eq!(produce.run_id, run.run_id);
    }

    #[tokio::test]
    async fn test_failed_need_skips_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
on: push
jobs:
  build:
    steps:
      - run: broken
  deploy:
    needs: build
    steps:
      - run: deploy
  report:
    needs: build
    if: always()
    steps:
      - run: report
"#;
        let engine = scripted(|body| {
            if body.contains("broken") {
                FakeReply::exit(2)
            } else {
                FakeReply::default()
            }
        });
        let exec = executor(dir.path(), engine.clone());
        let run = exec
            .execute(WorkflowParser::parse(yaml).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(run.conclusion, Conclusion::Failure);
        assert_eq!(run.jobs["build"], Conclusion::Failure);
        assert_eq!(run.jobs["deploy"], Conclusion::Skipped);
        assert_eq!(run.jobs["report"], Conclusion::Success);
        assert_eq!(engine.requests().len(), 2);

        let store = crate::execution::store::RunStore::new(exec.config().state_dir());
        let deploy = store.read_job("deploy").unwrap().unwrap();
        assert_eq!(deploy.conclusion, Conclusion::Skipped);
    }

    #[tokio::test]
    async fn test_aborted_job_is_persisted_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
on: push
jobs:
  build:
    strategy:
      fail-fast: ${{ bogus.x }}
    steps:
      - run: build
"#;
        let config = ExecutorConfig::new()
            .with_workspace(dir.path())
            .with_action_cache_dir(dir.path().join("actions-cache"))
            .with_default_shell("sh")
            .with_eval_mode(crate::EvalMode::Strict);
        let engine = Arc::new(FakeEngine::succeeding());
        let services = StepServices::new(
            engine.clone(),
            Arc::new(LocalActionResolver::new(dir.path(), dir.path().join("actions-cache"))),
        );
        let exec = WorkflowExecutor::new(config).with_services(services);

        let result = exec.execute(WorkflowParser::parse(yaml).unwrap(), None).await;
        assert!(matches!(result, Err(RunnerError::Evaluation(_))));
        assert!(engine.requests().is_empty());

        let store = crate::execution::store::RunStore::new(exec.config().state_dir());
        let build = store.read_job("build").unwrap().unwrap();
        assert_eq!(build.conclusion, Conclusion::Failure);
        let workflow = store.read_workflow().unwrap().unwrap();
        assert_eq!(workflow.conclusion, Conclusion::Failure);
        assert_eq!(workflow.jobs["build"], Conclusion::Failure);
    }

    #[tokio::test]
    async fn test_skipped_job_concludes_workflow_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
on: push
jobs:
  a:
    steps:
      - run: a
  b:
    if: ${{ false }}
    steps:
      - run: b
"#;
        let engine = Arc::new(FakeEngine::succeeding());
        let exec = executor(dir.path(), engine.clone());
        let run = exec
            .execute(WorkflowParser::parse(yaml).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(run.jobs["a"], Conclusion::Success);
        assert_eq!(run.jobs["b"], Conclusion::Skipped);
        assert_eq!(run.conclusion, Conclusion::Skipped);
        assert_eq!(engine.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_matrix_fail_fast_cancels_rest() {
        let yaml = |fail_fast: bool| {
            format!(
                r#"
on: push
jobs:
  test:
    strategy:
      fail-fast: {}
      matrix:
        os: [linux, mac, windows]
    steps:
      - run: test ${{{{ matrix.os }}}}
"#,
                fail_fast
            )
        };

        for (fail_fast, expected_runs) in [(true, 1), (false, 3)] {
            let dir = tempfile::tempdir().unwrap();
            let engine = Arc::new(FakeEngine::new(|_| FakeReply::exit(1)));
            let exec = executor(dir.path(), engine.clone());
            let run = exec
                .execute(WorkflowParser::parse(&yaml(fail_fast)).unwrap(), None)
                .await
                .unwrap();

            assert_eq!(run.jobs["test"], Conclusion::Failure);
            assert_eq!(engine.requests().len(), expected_runs);

            let store = crate::execution::store::RunStore::new(exec.config().state_dir());
            let report = store.read_job("test").unwrap().unwrap();
            assert_eq!(report.matrix.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_matrix_values_reach_steps() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
on: push
jobs:
  test:
    strategy:
      matrix:
        os: [linux, mac]
        include:
          - os: mac
            arch: arm64
    steps:
      - run: test
        env:
          TARGET: ${{ matrix.os }}-${{ matrix.arch }}-${{ strategy.job-index }}/${{ strategy.job-total }}
"#;
        let engine = Arc::new(FakeEngine::succeeding());
        let exec = executor(dir.path(), engine.clone());
        exec.execute(WorkflowParser::parse(yaml).unwrap(), None)
            .await
            .unwrap();

        let targets: Vec<_> = engine
            .requests()
            .iter()
            .map(|r| r.env["TARGET"].clone())
            .collect();
        assert_eq!(targets, vec!["linux--0/2", "mac-arm64-1/2"]);
    }

    #[tokio::test]
    async fn test_action_stages_run_pre_main_post() {
        let dir = tempfile::tempdir().unwrap();
        let action = dir.path().join(".github/actions/setup");
        fs::create_dir_all(&action).unwrap();
        fs::write(
            action.join("action.yml"),
            "runs:\n  using: node20\n  pre: pre.js\n  main: main.js\n  post: post.js\n",
        )
        .unwrap();
        let yaml = r#"
on: push
jobs:
  build:
    steps:
      - uses: ./.github/actions/setup
      - run: echo build
"#;
        let engine = Arc::new(FakeEngine::succeeding());
        let exec = executor(dir.path(), engine.clone());
        let run = exec
            .execute(WorkflowParser::parse(yaml).unwrap(), None)
            .await
            .unwrap();
        assert_eq!(run.conclusion, Conclusion::Success);

        let order: Vec<String> = engine
            .requests()
            .iter()
            .map(|r| {
                let last = script_of(r);
                Path::new(&last)
                    .file_name()
                    .map(|f| f.to_string_lossy().to_string())
                    .unwrap_or_default()
            })
            .map(|name| if name.starts_with("script-") { "run".to_string() } else { name })
            .collect();
        assert_eq!(order, vec!["pre.js", "main.js", "run", "post.js"]);
    }

    #[tokio::test]
    async fn test_job_timeout_cancels_remaining_steps() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
on: push
jobs:
  slow:
    timeout-minutes: 0.002
    steps:
      - run: sleep
      - run: after
"#;
        let engine = scripted(|body| {
            if body.contains("sleep") {
                FakeReply::sleep(Duration::from_secs(5))
            } else {
                FakeReply::default()
            }
        });
        let exec = executor(dir.path(), engine.clone());
        let run = exec
            .execute(WorkflowParser::parse(yaml).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(run.jobs["slow"], Conclusion::Cancelled);
        assert_eq!(engine.requests().len(), 1);

        let store = crate::execution::store::RunStore::new(exec.config().state_dir());
        let report = store.read_job("slow").unwrap().unwrap();
        assert!(report
            .steps
            .iter()
            .all(|s| s.conclusion == Conclusion::Cancelled));
    }

    #[tokio::test]
    async fn test_parallel_jobs_and_single_job_selection() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
on: push
jobs:
  lint:
    steps: [{ run: lint }]
  unit:
    steps: [{ run: unit }]
  package:
    needs: [lint, unit]
    steps: [{ run: package }]
"#;
        let engine = Arc::new(FakeEngine::new(|_| FakeReply::sleep(Duration::from_millis(10))));
        let exec = WorkflowExecutor::new(
            ExecutorConfig::new()
                .with_workspace(dir.path())
                .with_default_shell("sh")
                .with_max_parallel_jobs(2),
        )
        .with_services(StepServices::new(
            engine.clone(),
            Arc::new(LocalActionResolver::new(dir.path(), dir.path())),
        ));

        let run = exec
            .execute(WorkflowParser::parse(yaml).unwrap(), None)
            .await
            .unwrap();
        assert_eq!(run.jobs.len(), 3);
        assert_eq!(run.jobs.keys().last().map(String::as_str), Some("package"));

        let only = exec
            .execute(WorkflowParser::parse(yaml).unwrap(), Some("lint"))
            .await
            .unwrap();
        assert_eq!(only.jobs.keys().collect::<Vec<_>>(), vec!["lint"]);
    }

    #[tokio::test]
    async fn test_unknown_job_is_planning_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), Arc::new(FakeEngine::succeeding()));
        let workflow = WorkflowParser::parse("on: push\njobs:\n  a:\n    steps: [{ run: x }]\n").unwrap();
        let result = exec.execute(workflow, Some("missing")).await;
        assert!(matches!(result, Err(RunnerError::Planning(_))));
    }

    #[tokio::test]
    async fn test_journal_brackets_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let journal = event_journal();
        let exec = executor(dir.path(), Arc::new(FakeEngine::succeeding())).with_journal(journal.clone());
        let workflow = WorkflowParser::parse("on: push\njobs:\n  a:\n    steps: [{ run: x }]\n").unwrap();
        exec.execute(workflow, None).await.unwrap();
        journal.close();

        let mut events = Vec::new();
        while let JournalEntry::Entry(event) = journal.read_entry() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(ExecutionEvent::WorkflowStarted { total_jobs: 1, .. })));
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::WorkflowCompleted {
                conclusion: Conclusion::Success,
                ..
            })
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, ExecutionEvent::StepCompleted { .. })));
    }
}
