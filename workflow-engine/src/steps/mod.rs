// Steps Module
// Step kinds and the per-stage task that runs them

pub mod action;
pub mod docker;
pub mod run;

pub use action::ActionStep;
pub use docker::DockerStep;
pub use run::RunStep;

use crate::actions::{ActionResolver, LocalActionResolver};
use crate::config::ExecutorConfig;
use crate::execution::commands::{CommandProcessor, LineDisposition};
use crate::execution::context::ExecutionContext;
use crate::execution::envfile::EnvFiles;
use crate::execution::events::ExecutionEvent;
use crate::execution::report::{Conclusion, StepStage};
use crate::execution::task::{Decision, Task};
use crate::runners::{ExecRequest, ExecStatus, ExecutionEngine, ProcessEngine};
use crate::workflow::Step;
use crate::{RunnerError, RunnerResult};

use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

/// Collaborators a step needs to run
#[derive(Clone)]
pub struct StepServices {
    pub engine: Arc<dyn ExecutionEngine>,
    pub resolver: Arc<dyn ActionResolver>,
}

impl StepServices {
    pub fn new(engine: Arc<dyn ExecutionEngine>, resolver: Arc<dyn ActionResolver>) -> Self {
        Self { engine, resolver }
    }

    /// Local processes, the docker CLI and actions from disk
    pub fn local(config: &ExecutorConfig) -> Self {
        Self {
            engine: Arc::new(ProcessEngine::new()),
            resolver: Arc::new(LocalActionResolver::new(
                config.workspace.clone(),
                config.action_cache_dir.clone(),
            )),
        }
    }
}

/// The three kinds of step, picked once from `uses` / `run`
pub enum StepKind {
    Run(RunStep),
    Docker(DockerStep),
    Action(ActionStep),
}

impl StepKind {
    pub fn from_step(step: &Step) -> RunnerResult<Self> {
        match (&step.uses, &step.run) {
            (Some(uses), None) => match uses.strip_prefix("docker://") {
                Some(image) => Ok(StepKind::Docker(DockerStep::new(image))),
                None => Ok(StepKind::Action(ActionStep::new(uses))),
            },
            (None, Some(_)) => Ok(StepKind::Run(RunStep)),
            (Some(_), Some(_)) => Err(RunnerError::planning(format!(
                "step '{}' cannot have both 'run' and 'uses'",
                step.display_name()
            ))),
            (None, None) => Err(RunnerError::planning(format!(
                "step '{}' must have either 'run' or 'uses'",
                step.display_name()
            ))),
        }
    }

    /// Prepare before any stage runs
    pub async fn setup(&mut self, services: &StepServices) {
        if let StepKind::Action(action) = self {
            action.setup(services).await;
        }
    }

    pub fn has_stage(&self, stage: StepStage) -> bool {
        match self {
            StepKind::Action(action) => action.has_stage(stage),
            _ => stage == StepStage::Main,
        }
    }

    /// Condition gating `stage`; `None` means `success()`
    pub fn condition(&self, step: &Step, stage: StepStage) -> Option<String> {
        match (self, stage) {
            (_, StepStage::Main) => step.if_condition.clone(),
            (StepKind::Action(action), stage) => action.stage_condition(stage),
            _ => None,
        }
    }

    pub async fn execute(
        &self,
        stage: StepStage,
        step: &Step,
        exec: &mut StageExec<'_>,
    ) -> RunnerResult<ExecStatus> {
        match self {
            StepKind::Run(run) => run.execute(step, exec).await,
            StepKind::Docker(docker) => docker.execute(step, exec).await,
            StepKind::Action(action) => action.execute(stage, step, exec).await,
        }
    }
}

/// What a stage's process can see and how its output is handled
pub struct StageExec<'a> {
    pub ctx: &'a mut ExecutionContext,
    pub services: &'a StepServices,
    pub files: &'a EnvFiles,
    logging: CommandProcessor,
    environment: CommandProcessor,
}

impl<'a> StageExec<'a> {
    pub fn new(ctx: &'a mut ExecutionContext, services: &'a StepServices, files: &'a EnvFiles) -> Self {
        Self {
            ctx,
            services,
            files,
            logging: CommandProcessor::logging(),
            environment: CommandProcessor::environment(),
        }
    }

    /// Default variables, the layered env, env file paths and PATH additions
    pub fn base_env(&self) -> IndexMap<String, String> {
        let mut env = self.ctx.default_env();
        env.extend(self.ctx.effective_env());
        env.extend(self.files.exports());

        let added = self.ctx.added_paths();
        if !added.is_empty() {
            let current = env
                .get("PATH")
                .cloned()
                .or_else(|| std::env::var("PATH").ok())
                .unwrap_or_default();
            let separator = if cfg!(windows) { ";" } else { ":" };
            let mut parts = added;
            if !current.is_empty() {
                parts.push(current);
            }
            env.insert("PATH".to_string(), parts.join(separator));
        }
        env
    }

    /// Run `request`, feeding every output line through the command processors
    pub async fn run(&mut self, request: &ExecRequest) -> RunnerResult<ExecStatus> {
        let ctx = &mut *self.ctx;
        let logging = &mut self.logging;
        let environment = &mut self.environment;
        let mut failure: Option<RunnerError> = None;

        let mut on_line = |line: &str| {
            if failure.is_some() {
                return;
            }
            if let Err(err) = process_line(line, logging, environment, ctx) {
                failure = Some(err);
            }
        };
        debug!(command = %request.describe(), "executing");
        let status = self.services.engine.execute(request, &mut on_line).await?;

        match failure {
            Some(err) => Err(err),
            None => Ok(status),
        }
    }
}

fn process_line(
    line: &str,
    logging: &mut CommandProcessor,
    environment: &mut CommandProcessor,
    ctx: &mut ExecutionContext,
) -> RunnerResult<()> {
    let disposition = logging.process(line, ctx)?;
    environment.process(line, ctx)?;

    if let LineDisposition::Output(text) = disposition {
        let job_id = ctx.job_id().unwrap_or_default().to_string();
        let step_id = ctx.step_id().unwrap_or_default().to_string();
        trace!(job = %job_id, step = %step_id, "{}", text);
        ctx.emit(ExecutionEvent::step_output(job_id, step_id, text, logging.depth()));
    }
    Ok(())
}

/// `INPUT_<NAME>` variables for action inputs
pub fn input_env(inputs: &IndexMap<String, String>) -> IndexMap<String, String> {
    inputs
        .iter()
        .map(|(name, value)| {
            (
                format!("INPUT_{}", name.replace(' ', "_").to_uppercase()),
                value.clone(),
            )
        })
        .collect()
}

/// `STATE_<name>` variables for state saved by earlier stages
pub fn state_env(state: &IndexMap<String, String>) -> IndexMap<String, String> {
    state
        .iter()
        .map(|(name, value)| (format!("STATE_{}", name), value.clone()))
        .collect()
}

/// Text form of a `with:` value
pub fn with_value_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
struct TimeLimit {
    duration: Duration,
    /// Set when the job deadline is the tighter bound
    job_deadline: bool,
}

/// One stage of one step, driven by the task runner.
///
/// `run` always closes the step scope it opens. Only fatal errors escape
/// it; anything else concludes the stage `failure`.
pub struct StageTask<'a> {
    ctx: &'a mut ExecutionContext,
    services: &'a StepServices,
    step: &'a Step,
    kind: &'a StepKind,
    index: usize,
    stage: StepStage,
    deadline: Option<Instant>,
    exit_code: Option<i32>,
}

impl<'a> StageTask<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &'a mut ExecutionContext,
        services: &'a StepServices,
        step: &'a Step,
        kind: &'a StepKind,
        index: usize,
        stage: StepStage,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            ctx,
            services,
            step,
            kind,
            index,
            stage,
            deadline,
            exit_code: None,
        }
    }

    fn skip(&mut self, conclusion: Conclusion, reason: &str) -> RunnerResult<Decision> {
        self.ctx
            .record_skipped_step(self.step, self.index, self.stage, conclusion)?;
        let job_id = self.ctx.job_id().unwrap_or_default().to_string();
        self.ctx.emit(ExecutionEvent::step_skipped(
            job_id,
            self.step.id_or_index(self.index),
            self.stage,
            reason,
        ));
        Ok(Decision::Skip(conclusion))
    }

    fn time_limit(&self) -> RunnerResult<Option<TimeLimit>> {
        let engine = self.ctx.engine();
        let minutes = engine.eval_typed_or(&*self.ctx, self.step.timeout_minutes.as_ref(), 0.0)?;
        let step_limit = (minutes > 0.0).then(|| Duration::from_secs_f64(minutes * 60.0));
        let job_left = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));

        Ok(match (step_limit, job_left) {
            (Some(step), Some(job)) if job < step => Some(TimeLimit {
                duration: job,
                job_deadline: true,
            }),
            (Some(step), _) => Some(TimeLimit {
                duration: step,
                job_deadline: false,
            }),
            (None, Some(job)) => Some(TimeLimit {
                duration: job,
                job_deadline: true,
            }),
            (None, None) => None,
        })
    }

    fn continue_on_error(&self) -> bool {
        let engine = self.ctx.engine();
        match engine.eval_typed_or(&*self.ctx, self.step.continue_on_error.as_ref(), false) {
            Ok(value) => value,
            Err(err) => {
                warn!(step = %self.step.display_name(), error = %err, "continue-on-error could not be evaluated");
                false
            }
        }
    }

    /// Run the stage's process and apply its env files
    async fn execute(&mut self) -> RunnerResult<Conclusion> {
        let limit = self.time_limit()?;
        let files = EnvFiles::create(&self.ctx.config().temp_dir())?;
        let (kind, step, stage) = (self.kind, self.step, self.stage);

        let status = {
            let mut exec = StageExec::new(self.ctx, self.services, &files);
            let work = kind.execute(stage, step, &mut exec);
            match limit {
                Some(limit) => tokio::time::timeout(limit.duration, work).await.ok(),
                None => Some(work.await),
            }
        };

        let result = match status {
            None => {
                let duration = limit.map(|l| l.duration).unwrap_or_default();
                error!(step = %step.display_name(), "timed out after {:?}", duration);
                self.output(&format!("##[error]The step timed out after {:?}", duration));
                match limit {
                    Some(limit) if limit.job_deadline => Ok(Conclusion::Cancelled),
                    _ => Ok(Conclusion::Failure),
                }
            }
            Some(Err(err)) => Err(err),
            Some(Ok(status)) => {
                self.exit_code = status.exit_code;
                files.apply(self.ctx).map(|_| {
                    if status.success() {
                        Conclusion::Success
                    } else {
                        Conclusion::Failure
                    }
                })
            }
        };

        if let Err(err) = files.remove() {
            debug!(error = %err, "failed to remove env files");
        }
        result
    }

    fn output(&self, line: &str) {
        let job_id = self.ctx.job_id().unwrap_or_default().to_string();
        self.ctx.emit(ExecutionEvent::step_output(
            job_id,
            self.step.id_or_index(self.index),
            line,
            0,
        ));
    }
}

#[async_trait::async_trait]
impl Task for StageTask<'_> {
    async fn condition(&mut self) -> Result<Decision, RunnerError> {
        if self.deadline.map_or(false, |d| Instant::now() >= d) {
            return self.skip(Conclusion::Cancelled, "the job timed out");
        }
        if !self.kind.has_stage(self.stage) {
            return Ok(Decision::Skip(Conclusion::Skipped));
        }

        let condition = self.kind.condition(self.step, self.stage);
        let engine = self.ctx.engine();
        if engine.eval_condition(&*self.ctx, condition.as_deref())? {
            Ok(Decision::Run)
        } else {
            let reason = format!("condition '{}' was false", condition.as_deref().unwrap_or("success()"));
            self.skip(Conclusion::Skipped, &reason)
        }
    }

    async fn run(&mut self) -> Result<Conclusion, RunnerError> {
        let started = Instant::now();
        self.ctx.set_step(self.step, self.index, self.stage)?;
        let job_id = self.ctx.job_id().unwrap_or_default().to_string();
        let step_id = self.step.id_or_index(self.index);
        self.ctx.emit(ExecutionEvent::step_started(
            job_id.clone(),
            step_id.clone(),
            self.step.display_name(),
            self.stage,
        ));

        let outcome = match self.execute().await {
            Ok(outcome) => outcome,
            Err(err) if err.is_fatal() => {
                self.close_scopes();
                return Err(err);
            }
            Err(err) => {
                error!(job = %job_id, step = %step_id, error = %err, "step failed");
                self.output(&format!("##[error]{}", err));
                Conclusion::Failure
            }
        };

        let conclusion = if outcome == Conclusion::Failure && self.continue_on_error() {
            Conclusion::Success
        } else {
            outcome
        };

        self.ctx.set_step_results(outcome, conclusion)?;
        self.close_scopes();
        self.ctx.emit(ExecutionEvent::step_completed(
            job_id,
            step_id,
            self.stage,
            outcome,
            conclusion,
            started.elapsed(),
            self.exit_code,
        ));
        Ok(conclusion)
    }
}

impl StageTask<'_> {
    /// Close the action and step scopes, even after a dropped stage future
    fn close_scopes(&mut self) {
        if self.ctx.action_reference().is_some() {
            let _ = self.ctx.unset_action();
        }
        if let Err(err) = self.ctx.unset_step() {
            error!(error = %err, "failed to close step scope");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::execution::task::TaskRunner;
    use crate::runners::fake::{FakeEngine, FakeReply};
    use crate::workflow::WorkflowParser;
    use std::fs;

    pub(crate) fn services_with(engine: FakeEngine, cache: &std::path::Path, workspace: &std::path::Path) -> StepServices {
        StepServices::new(
            Arc::new(engine),
            Arc::new(LocalActionResolver::new(workspace, cache)),
        )
    }

    pub(crate) fn job_context(dir: &std::path::Path, yaml: &str) -> ExecutionContext {
        let config = ExecutorConfig::new()
            .with_workspace(dir)
            .with_action_cache_dir(dir.join("actions-cache"));
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let mut ctx = ExecutionContext::new(Arc::new(config));
        ctx.set_workflow(Arc::new(workflow)).unwrap();
        ctx.set_job("build").unwrap();
        ctx.set_matrix(None, 1, true, 1).unwrap();
        ctx
    }

    async fn run_stage(
        ctx: &mut ExecutionContext,
        services: &StepServices,
        index: usize,
        deadline: Option<Instant>,
    ) -> Result<crate::execution::task::TaskResult, crate::execution::task::TaskError> {
        let step = ctx.job().unwrap().steps[index].clone();
        let mut kind = StepKind::from_step(&step).unwrap();
        kind.setup(services).await;
        let mut task = StageTask::new(ctx, services, &step, &kind, index, StepStage::Main, deadline);
        TaskRunner::new().run(&mut task).await
    }

    const WORKFLOW: &str = r#"
on: push
jobs:
  build:
    steps:
      - id: first
        run: echo one
      - id: flaky
        run: exit 1
        continue-on-error: true
      - id: gated
        if: ${{ env.NEVER == 'set' }}
        run: echo never
      - id: slow
        run: sleep 5
        timeout-minutes: 0.001
"#;

    #[test]
    fn test_step_kind_selection() {
        let run = Step {
            run: Some("echo".into()),
            ..Default::default()
        };
        assert!(matches!(StepKind::from_step(&run).unwrap(), StepKind::Run(_)));

        let docker = Step {
            uses: Some("docker://alpine:3".into()),
            ..Default::default()
        };
        assert!(matches!(StepKind::from_step(&docker).unwrap(), StepKind::Docker(_)));

        let action = Step {
            uses: Some("actions/checkout@v4".into()),
            ..Default::default()
        };
        assert!(matches!(StepKind::from_step(&action).unwrap(), StepKind::Action(_)));

        assert!(StepKind::from_step(&Step::default()).is_err());
    }

    #[test]
    fn test_input_and_state_env() {
        let mut inputs = IndexMap::new();
        inputs.insert("node version".to_string(), "20".to_string());
        assert_eq!(input_env(&inputs)["INPUT_NODE_VERSION"], "20");

        let mut state = IndexMap::new();
        state.insert("pid".to_string(), "7".to_string());
        assert_eq!(state_env(&state)["STATE_pid"], "7");

        assert_eq!(with_value_string(&serde_json::json!(3)), "3");
        assert_eq!(with_value_string(&serde_json::json!(true)), "true");
        assert_eq!(with_value_string(&serde_json::Value::Null), "");
    }

    #[tokio::test]
    async fn test_run_step_streams_commands_and_env_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = job_context(dir.path(), WORKFLOW);
        let engine = FakeEngine::new(|request| {
            fs::write(&request.env["GITHUB_OUTPUT"], "from_file=yes\n").unwrap();
            FakeReply::ok(&["hello", "::set-output name=from_cmd::1", "::add-path::/opt/bin"])
        });
        let services = services_with(engine, dir.path(), dir.path());

        let result = run_stage(&mut ctx, &services, 0, None).await.unwrap();
        assert!(result.ran);
        assert_eq!(result.conclusion, Conclusion::Success);

        let report = ctx.job_run().unwrap().steps[0].clone();
        assert_eq!(report.step_id, "first");
        let stored = ctx.store().read_step("build", None, "first").unwrap().unwrap();
        assert_eq!(stored.outputs["from_cmd"], "1");
        assert_eq!(stored.outputs["from_file"], "yes");
        assert_eq!(ctx.added_paths(), vec!["/opt/bin".to_string()]);
    }

    #[tokio::test]
    async fn test_continue_on_error_keeps_job_green() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = job_context(dir.path(), WORKFLOW);
        let services = services_with(FakeEngine::new(|_| FakeReply::exit(1)), dir.path(), dir.path());

        let result = run_stage(&mut ctx, &services, 1, None).await.unwrap();
        assert_eq!(result.conclusion, Conclusion::Success);

        let step = ctx.job_run().unwrap().steps[0].clone();
        assert_eq!(step.outcome, Conclusion::Failure);
        assert_eq!(step.conclusion, Conclusion::Success);
        assert_eq!(ctx.job_status(), Conclusion::Success);
    }

    #[tokio::test]
    async fn test_failed_step_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = job_context(dir.path(), WORKFLOW);
        let services = services_with(FakeEngine::new(|_| FakeReply::exit(2)), dir.path(), dir.path());

        let result = run_stage(&mut ctx, &services, 0, None).await.unwrap();
        assert_eq!(result.conclusion, Conclusion::Failure);
        assert_eq!(ctx.job_status(), Conclusion::Failure);

        // a later step with the implicit success() gate is skipped
        let result = run_stage(&mut ctx, &services, 1, None).await.unwrap();
        assert!(!result.ran);
        assert_eq!(result.conclusion, Conclusion::Skipped);
    }

    #[tokio::test]
    async fn test_false_condition_skips_without_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = job_context(dir.path(), WORKFLOW);
        let engine = Arc::new(FakeEngine::succeeding());
        let services = StepServices::new(
            engine.clone(),
            Arc::new(LocalActionResolver::new(dir.path(), dir.path())),
        );

        let result = run_stage(&mut ctx, &services, 2, None).await.unwrap();
        assert!(!result.ran);
        assert_eq!(result.conclusion, Conclusion::Skipped);
        assert!(engine.requests().is_empty());
        assert_eq!(ctx.job_run().unwrap().steps[0].conclusion, Conclusion::Skipped);
    }

    #[tokio::test]
    async fn test_step_timeout_fails_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = job_context(dir.path(), WORKFLOW);
        let services = services_with(
            FakeEngine::new(|_| FakeReply::sleep(Duration::from_secs(5))),
            dir.path(),
            dir.path(),
        );

        let result = run_stage(&mut ctx, &services, 3, None).await.unwrap();
        assert_eq!(result.conclusion, Conclusion::Failure);
        assert!(ctx.step_run().is_none());
    }

    #[tokio::test]
    async fn test_passed_job_deadline_cancels_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = job_context(dir.path(), WORKFLOW);
        let services = services_with(FakeEngine::succeeding(), dir.path(), dir.path());

        let result = run_stage(&mut ctx, &services, 0, Some(Instant::now())).await.unwrap();
        assert!(!result.ran);
        assert_eq!(result.conclusion, Conclusion::Cancelled);
        assert_eq!(ctx.job_status(), Conclusion::Cancelled);
    }
}
