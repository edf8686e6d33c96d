// Execution Context
// Strictly nested workflow > job > step state with explicit Set/Unset lifecycle

use crate::config::ExecutorConfig;
use crate::execution::events::{EventJournal, ExecutionEvent};
use crate::execution::matrix::MatrixInstance;
use crate::execution::report::{
    fold_conclusion, Conclusion, JobRun, StepRun, StepRunSummary, StepStage, WorkflowRun,
};
use crate::execution::store::RunStore;
use crate::expression::{ExpressionEngine, Value, VariableProvider};
use crate::workflow::{Job, Step, Workflow};
use crate::{RunnerError, RunnerResult};

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

struct WorkflowScope {
    workflow: Arc<Workflow>,
    run: WorkflowRun,
    env: IndexMap<String, String>,
    inputs: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobPhase {
    /// Evaluating the job's own condition
    Gate,
    /// Running steps of a combination
    Running,
}

struct JobScope {
    id: String,
    job: Job,
    run: JobRun,
    phase: JobPhase,
    needs: Value,
    needs_results: Vec<Conclusion>,
    continue_on_error: bool,
    env: IndexMap<String, String>,
    matrix: Option<MatrixInstance>,
    strategy: Value,
    /// Current combination's status, read by the status functions
    status: Conclusion,
    exported_env: IndexMap<String, String>,
    paths: Vec<String>,
    steps: IndexMap<String, StepContext>,
    states: HashMap<String, IndexMap<String, String>>,
}

#[derive(Debug, Clone)]
struct StepContext {
    outputs: IndexMap<String, String>,
    outcome: Conclusion,
    conclusion: Conclusion,
}

struct StepScope {
    run: StepRun,
    env: IndexMap<String, String>,
}

struct ActionScope {
    reference: String,
    inputs: IndexMap<String, String>,
}

/// The single mutable context of a run.
///
/// Scopes nest strictly: a job needs a workflow, a step needs a job and an
/// action needs a step. Calls made out of order fail with
/// [`RunnerError::Precondition`]. Report writes never fail a call; they are
/// logged and dropped.
pub struct ExecutionContext {
    config: Arc<ExecutorConfig>,
    store: RunStore,
    engine: ExpressionEngine,
    journal: Option<EventJournal>,
    workflow: Option<WorkflowScope>,
    job: Option<JobScope>,
    step: Option<StepScope>,
    action: Option<ActionScope>,
}

impl ExecutionContext {
    pub fn new(config: Arc<ExecutorConfig>) -> Self {
        let store = RunStore::new(config.state_dir());
        let engine = ExpressionEngine::new(config.eval_mode);
        Self {
            config,
            store,
            engine,
            journal: None,
            workflow: None,
            job: None,
            step: None,
            action: None,
        }
    }

    pub fn with_journal(mut self, journal: EventJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Copy of the workflow scope for running one job independently
    pub fn fork(&self) -> RunnerResult<Self> {
        let scope = self.workflow_scope()?;
        Ok(Self {
            config: Arc::clone(&self.config),
            store: self.store.clone(),
            engine: self.engine,
            journal: self.journal.clone(),
            workflow: Some(WorkflowScope {
                workflow: Arc::clone(&scope.workflow),
                run: scope.run.clone(),
                env: scope.env.clone(),
                inputs: scope.inputs.clone(),
            }),
            job: None,
            step: None,
            action: None,
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    pub fn engine(&self) -> ExpressionEngine {
        self.engine
    }

    pub fn emit(&self, event: ExecutionEvent) {
        if let Some(journal) = &self.journal {
            journal.write(event);
        }
    }

    // ---- scope accessors -------------------------------------------------

    fn workflow_scope(&self) -> RunnerResult<&WorkflowScope> {
        self.workflow
            .as_ref()
            .ok_or_else(|| RunnerError::precondition("no workflow is set"))
    }

    fn workflow_scope_mut(&mut self) -> RunnerResult<&mut WorkflowScope> {
        self.workflow
            .as_mut()
            .ok_or_else(|| RunnerError::precondition("no workflow is set"))
    }

    fn job_scope(&self) -> RunnerResult<&JobScope> {
        self.job
            .as_ref()
            .ok_or_else(|| RunnerError::precondition("no job is set"))
    }

    fn job_scope_mut(&mut self) -> RunnerResult<&mut JobScope> {
        self.job
            .as_mut()
            .ok_or_else(|| RunnerError::precondition("no job is set"))
    }

    fn step_scope_mut(&mut self) -> RunnerResult<&mut StepScope> {
        self.step
            .as_mut()
            .ok_or_else(|| RunnerError::precondition("no step is set"))
    }

    pub fn workflow(&self) -> Option<&Arc<Workflow>> {
        self.workflow.as_ref().map(|s| &s.workflow)
    }

    pub fn workflow_run(&self) -> Option<&WorkflowRun> {
        self.workflow.as_ref().map(|s| &s.run)
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job.as_ref().map(|j| j.id.as_str())
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref().map(|j| &j.job)
    }

    pub fn job_run(&self) -> Option<&JobRun> {
        self.job.as_ref().map(|j| &j.run)
    }

    pub fn matrix_instance(&self) -> Option<&MatrixInstance> {
        self.job.as_ref().and_then(|j| j.matrix.as_ref())
    }

    pub fn step_run(&self) -> Option<&StepRun> {
        self.step.as_ref().map(|s| &s.run)
    }

    pub fn step_id(&self) -> Option<&str> {
        self.step.as_ref().map(|s| s.run.step_id.as_str())
    }

    pub fn action_reference(&self) -> Option<&str> {
        self.action.as_ref().map(|a| a.reference.as_str())
    }

    pub fn action_inputs(&self) -> Option<&IndexMap<String, String>> {
        self.action.as_ref().map(|a| &a.inputs)
    }

    /// Status of the current combination
    pub fn job_status(&self) -> Conclusion {
        self.job.as_ref().map(|j| j.status).unwrap_or_default()
    }

    // ---- workflow --------------------------------------------------------

    pub fn set_workflow(&mut self, workflow: Arc<Workflow>) -> RunnerResult<()> {
        if self.workflow.is_some() {
            return Err(RunnerError::precondition("a workflow is already set"));
        }

        let mut inputs = IndexMap::new();
        for (name, input) in workflow.dispatch_inputs() {
            if let Some(default) = &input.default {
                inputs.insert(name, Value::from(default));
            }
        }
        for (name, value) in &self.config.inputs {
            inputs.insert(name.clone(), Value::from(value.as_str()));
        }

        let name = workflow.display_name("workflow");
        let raw_env = workflow.env.clone();
        self.workflow = Some(WorkflowScope {
            workflow,
            run: WorkflowRun::new(name),
            env: IndexMap::new(),
            inputs: Value::Object(inputs),
        });

        let env = self.evaluate_map(&raw_env)?;
        self.workflow_scope_mut()?.env = env;
        Ok(())
    }

    /// Record a finished job's conclusion on the workflow
    pub fn record_job_conclusion(&mut self, job_id: &str, conclusion: Conclusion) -> RunnerResult<()> {
        self.workflow_scope_mut()?.run.record_job(job_id, conclusion);
        Ok(())
    }

    /// Close the workflow scope and persist its report
    pub fn unset_workflow(&mut self) -> RunnerResult<WorkflowRun> {
        if self.job.is_some() {
            return Err(RunnerError::precondition("cannot unset the workflow while a job is set"));
        }
        let mut scope = self
            .workflow
            .take()
            .ok_or_else(|| RunnerError::precondition("no workflow is set"))?;
        scope.run.completed_at = Some(chrono::Utc::now());

        if let Err(err) = self.store.write_workflow(&scope.run) {
            error!(error = %err, "failed to write workflow report");
        }
        Ok(scope.run)
    }

    // ---- job -------------------------------------------------------------

    /// Open the job scope, reading the reports of its `needs` from the store.
    pub fn set_job(&mut self, job_id: &str) -> RunnerResult<()> {
        let scope = self.workflow_scope()?;
        if self.job.is_some() {
            return Err(RunnerError::precondition(format!(
                "cannot set job '{}' while another job is set",
                job_id
            )));
        }
        let job = scope
            .workflow
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| RunnerError::planning(format!("job '{}' is not declared", job_id)))?;
        let run_id = scope.run.run_id.clone();

        let mut needs = IndexMap::new();
        let mut needs_results = Vec::new();
        for need in job.needs.to_vec() {
            match self.store.read_job(&need) {
                Ok(Some(report)) if report.run_id == run_id => {
                    needs_results.push(report.conclusion);
                    let mut entry = IndexMap::new();
                    entry.insert("result".to_string(), Value::from(report.conclusion.as_str()));
                    entry.insert("outputs".to_string(), Value::object_from_strings(&report.outputs));
                    needs.insert(need, Value::Object(entry));
                }
                Ok(_) => {
                    warn!(job = %job_id, need = %need, "no report for needed job in this run");
                    needs_results.push(Conclusion::Skipped);
                }
                Err(err) => {
                    error!(job = %job_id, need = %need, error = %err, "failed to read job report");
                    needs_results.push(Conclusion::Skipped);
                }
            }
        }

        let run = JobRun::new(run_id, job_id, job.display_name(job_id));
        let raw_env = job.env.clone();
        let continue_on_error_field = job.continue_on_error.clone();
        self.job = Some(JobScope {
            id: job_id.to_string(),
            job,
            run,
            phase: JobPhase::Gate,
            needs: Value::Object(needs),
            needs_results,
            continue_on_error: false,
            env: IndexMap::new(),
            matrix: None,
            strategy: Value::Object(IndexMap::new()),
            status: Conclusion::Success,
            exported_env: IndexMap::new(),
            paths: Vec::new(),
            steps: IndexMap::new(),
            states: HashMap::new(),
        });

        let env = self.evaluate_map(&raw_env)?;
        let continue_on_error =
            self.engine
                .eval_typed_or(self, continue_on_error_field.as_ref(), false)?;
        let scope = self.job_scope_mut()?;
        scope.env = env;
        scope.continue_on_error = continue_on_error;
        debug!(job = %job_id, "job scope set");
        Ok(())
    }

    /// Mark the job as skipped by its condition
    pub fn mark_job_skipped(&mut self) -> RunnerResult<()> {
        let scope = self.job_scope_mut()?;
        scope.run.outcome = Conclusion::Skipped;
        scope.run.conclusion = Conclusion::Skipped;
        Ok(())
    }

    /// Start a matrix combination (or the single unparameterized run).
    ///
    /// Resets the per-combination state: exported env, PATH entries, the
    /// `steps` context and the job status.
    pub fn set_matrix(
        &mut self,
        instance: Option<MatrixInstance>,
        total: usize,
        fail_fast: bool,
        max_parallel: usize,
    ) -> RunnerResult<()> {
        if self.step.is_some() {
            return Err(RunnerError::precondition("cannot change matrix while a step is set"));
        }
        let scope = self.job_scope_mut()?;

        let mut strategy = IndexMap::new();
        strategy.insert("fail-fast".to_string(), Value::Bool(fail_fast));
        strategy.insert("max-parallel".to_string(), Value::from(max_parallel as i64));
        strategy.insert(
            "job-index".to_string(),
            Value::from(instance.as_ref().map(|i| i.index).unwrap_or(0) as i64),
        );
        strategy.insert("job-total".to_string(), Value::from(total.max(1) as i64));

        if let Some(instance) = &instance {
            scope.run.matrix.push(instance.variables.clone());
        }
        scope.strategy = Value::Object(strategy);
        scope.matrix = instance;
        scope.phase = JobPhase::Running;
        scope.status = Conclusion::Success;
        scope.exported_env.clear();
        scope.paths.clear();
        scope.steps.clear();
        scope.states.clear();

        // job env may reference the matrix
        let raw_env = scope.job.env.clone();
        let env = self.evaluate_map(&raw_env)?;
        self.job_scope_mut()?.env = env;
        Ok(())
    }

    /// Fold a conclusion that did not come from a step, e.g. a cancelled
    /// matrix combination.
    pub fn fold_job_conclusion(&mut self, conclusion: Conclusion) -> RunnerResult<()> {
        let scope = self.job_scope_mut()?;
        fold_conclusion(&mut scope.status, conclusion);
        fold_conclusion(&mut scope.run.outcome, conclusion);
        Ok(())
    }

    /// Evaluate the job's `outputs`; later combinations override earlier ones.
    pub fn set_job_results(&mut self) -> RunnerResult<IndexMap<String, String>> {
        let raw = self.job_scope()?.job.outputs.clone();
        let outputs = self.evaluate_map(&raw)?;
        let scope = self.job_scope_mut()?;
        for (name, value) in &outputs {
            scope.run.outputs.insert(name.clone(), value.clone());
        }
        Ok(outputs)
    }

    /// Close the job scope: settle its conclusion, fold it into the
    /// workflow and persist the job report.
    pub fn unset_job(&mut self) -> RunnerResult<JobRun> {
        if self.step.is_some() {
            return Err(RunnerError::precondition("cannot unset the job while a step is set"));
        }
        let mut scope = self
            .job
            .take()
            .ok_or_else(|| RunnerError::precondition("no job is set"))?;

        let run = &mut scope.run;
        if run.conclusion != Conclusion::Skipped {
            run.conclusion = if scope.continue_on_error && run.outcome.propagates() {
                Conclusion::Success
            } else {
                run.outcome
            };
        }
        run.completed_at = Some(chrono::Utc::now());

        if let Some(workflow) = self.workflow.as_mut() {
            workflow.run.record_job(&scope.id, scope.run.conclusion);
        }
        if let Err(err) = self.store.write_job(&scope.run) {
            error!(job = %scope.id, error = %err, "failed to write job report");
        }
        debug!(job = %scope.id, conclusion = %scope.run.conclusion, "job scope unset");
        Ok(scope.run)
    }

    // ---- step ------------------------------------------------------------

    /// Open a stage of a step and evaluate the step's env on top of the
    /// workflow, job and exported layers.
    pub fn set_step(&mut self, step: &Step, index: usize, stage: StepStage) -> RunnerResult<()> {
        let job = self.job_scope()?;
        if self.step.is_some() {
            return Err(RunnerError::precondition("another step is already set"));
        }
        let mut run = StepRun::new(step.id_or_index(index), step.display_name(), stage);
        run.matrix_index = job.matrix.as_ref().map(|m| m.index);

        let env = self.evaluate_map(&step.env)?;
        self.step = Some(StepScope { run, env });
        Ok(())
    }

    pub fn set_step_results(&mut self, outcome: Conclusion, conclusion: Conclusion) -> RunnerResult<()> {
        let scope = self.step_scope_mut()?;
        scope.run.outcome = outcome;
        scope.run.conclusion = conclusion;
        Ok(())
    }

    pub fn set_step_output(&mut self, name: &str, value: &str) -> RunnerResult<()> {
        let scope = self.step_scope_mut()?;
        scope.run.outputs.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Save state for the later stages of the same step
    pub fn set_step_state(&mut self, name: &str, value: &str) -> RunnerResult<()> {
        let scope = self.step.as_mut().ok_or_else(|| RunnerError::precondition("no step is set"))?;
        scope.run.state.insert(name.to_string(), value.to_string());
        let step_id = scope.run.step_id.clone();
        self.job_scope_mut()?
            .states
            .entry(step_id)
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn set_step_summary(&mut self, markdown: &str) -> RunnerResult<()> {
        let scope = self.step_scope_mut()?;
        scope.run.summary.push_str(markdown);
        Ok(())
    }

    /// Export a variable to the following steps of the job
    pub fn set_step_env(&mut self, name: &str, value: &str) -> RunnerResult<()> {
        let scope = self.step.as_mut().ok_or_else(|| RunnerError::precondition("no step is set"))?;
        scope.run.env.insert(name.to_string(), value.to_string());
        self.job_scope_mut()?
            .exported_env
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Prepend a directory to PATH for the following steps of the job
    pub fn add_step_path(&mut self, path: &str) -> RunnerResult<()> {
        let scope = self.step.as_mut().ok_or_else(|| RunnerError::precondition("no step is set"))?;
        scope.run.paths.push(path.to_string());
        self.job_scope_mut()?.paths.insert(0, path.to_string());
        Ok(())
    }

    /// Close the stage: fold it into the job and, for the main stage,
    /// expose it through `steps.<id>` and persist its report.
    pub fn unset_step(&mut self) -> RunnerResult<StepRun> {
        if self.action.is_some() {
            return Err(RunnerError::precondition("cannot unset the step while an action is set"));
        }
        self.job_scope()?;
        let mut scope = self
            .step
            .take()
            .ok_or_else(|| RunnerError::precondition("no step is set"))?;
        scope.run.completed_at = Some(chrono::Utc::now());
        let run = scope.run;

        let job = self.job_scope_mut()?;
        job.run.steps.push(StepRunSummary::from(&run));
        fold_conclusion(&mut job.status, run.conclusion);
        fold_conclusion(&mut job.run.outcome, run.conclusion);
        let job_id = job.id.clone();

        if run.stage == StepStage::Main {
            job.steps.insert(
                run.step_id.clone(),
                StepContext {
                    outputs: run.outputs.clone(),
                    outcome: run.outcome,
                    conclusion: run.conclusion,
                },
            );
            if let Err(err) = self.store.write_step(&job_id, &run) {
                error!(job = %job_id, step = %run.step_id, error = %err, "failed to write step report");
            }
        }
        Ok(run)
    }

    /// Record a stage whose condition was false (or that never started)
    /// without opening a step scope.
    pub fn record_skipped_step(
        &mut self,
        step: &Step,
        index: usize,
        stage: StepStage,
        conclusion: Conclusion,
    ) -> RunnerResult<()> {
        let job = self.job_scope_mut()?;
        let step_id = step.id_or_index(index);
        job.run.steps.push(StepRunSummary {
            step_id: step_id.clone(),
            name: step.display_name(),
            stage,
            matrix_index: job.matrix.as_ref().map(|m| m.index),
            outcome: conclusion,
            conclusion,
        });
        // Condition-skipped steps never opened a step scope; they leave the job alone.
        if conclusion != Conclusion::Skipped {
            fold_conclusion(&mut job.status, conclusion);
            fold_conclusion(&mut job.run.outcome, conclusion);
        }
        if stage == StepStage::Main {
            job.steps.insert(
                step_id,
                StepContext {
                    outputs: IndexMap::new(),
                    outcome: conclusion,
                    conclusion,
                },
            );
        }
        Ok(())
    }

    // ---- action ----------------------------------------------------------

    pub fn set_action(&mut self, reference: &str, inputs: IndexMap<String, String>) -> RunnerResult<()> {
        if self.step.is_none() {
            return Err(RunnerError::precondition(format!(
                "cannot set action '{}' without a step",
                reference
            )));
        }
        if self.action.is_some() {
            return Err(RunnerError::precondition("an action is already set"));
        }
        self.action = Some(ActionScope {
            reference: reference.to_string(),
            inputs,
        });
        Ok(())
    }

    pub fn unset_action(&mut self) -> RunnerResult<()> {
        self.action
            .take()
            .map(|_| ())
            .ok_or_else(|| RunnerError::precondition("no action is set"))
    }

    // ---- derived views ---------------------------------------------------

    /// Layered env: workflow, job, exported by earlier steps, then the step's own
    pub fn effective_env(&self) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        if let Some(workflow) = &self.workflow {
            env.extend(workflow.env.clone());
        }
        if let Some(job) = &self.job {
            env.extend(job.env.clone());
            env.extend(job.exported_env.clone());
        }
        if let Some(step) = &self.step {
            env.extend(step.env.clone());
        }
        env
    }

    /// PATH entries added by earlier steps, most recent first
    pub fn added_paths(&self) -> Vec<String> {
        self.job.as_ref().map(|j| j.paths.clone()).unwrap_or_default()
    }

    /// State saved by earlier stages of `step_id`
    pub fn saved_state(&self, step_id: &str) -> IndexMap<String, String> {
        self.job
            .as_ref()
            .and_then(|j| j.states.get(step_id).cloned())
            .unwrap_or_default()
    }

    /// `GITHUB_*`/`RUNNER_*` variables every step process receives
    pub fn default_env(&self) -> IndexMap<String, String> {
        let github = self.github();
        let mut env = IndexMap::new();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("GITHUB_ACTIONS".to_string(), "true".to_string());
        for (key, name) in [
            ("workspace", "GITHUB_WORKSPACE"),
            ("event_name", "GITHUB_EVENT_NAME"),
            ("sha", "GITHUB_SHA"),
            ("ref", "GITHUB_REF"),
            ("repository", "GITHUB_REPOSITORY"),
            ("actor", "GITHUB_ACTOR"),
            ("run_id", "GITHUB_RUN_ID"),
            ("run_number", "GITHUB_RUN_NUMBER"),
            ("job", "GITHUB_JOB"),
            ("action", "GITHUB_ACTION"),
            ("workflow", "GITHUB_WORKFLOW"),
        ] {
            env.insert(name.to_string(), github.get(key).as_string());
        }
        let runner = self.runner();
        for (key, name) in [
            ("os", "RUNNER_OS"),
            ("arch", "RUNNER_ARCH"),
            ("name", "RUNNER_NAME"),
            ("temp", "RUNNER_TEMP"),
            ("tool_cache", "RUNNER_TOOL_CACHE"),
        ] {
            env.insert(name.to_string(), runner.get(key).as_string());
        }
        env
    }

    /// Evaluate every value of `raw` against the current scopes
    pub fn evaluate_map(&self, raw: &IndexMap<String, String>) -> RunnerResult<IndexMap<String, String>> {
        let mut out = IndexMap::with_capacity(raw.len());
        for (key, value) in raw {
            out.insert(key.clone(), self.engine.eval_string(self, value)?);
        }
        Ok(out)
    }

    /// Status exposed while the job's own condition is evaluated
    fn gate_status(job: &JobScope) -> &'static str {
        if job.needs_results.contains(&Conclusion::Cancelled) {
            "cancelled"
        } else if job.needs_results.contains(&Conclusion::Failure) {
            "failure"
        } else if job.needs_results.contains(&Conclusion::Skipped) {
            "skipped"
        } else {
            "success"
        }
    }
}

fn empty() -> Value {
    Value::Object(IndexMap::new())
}

impl VariableProvider for ExecutionContext {
    fn github(&self) -> Value {
        let config = &self.config;
        let overrides = &config.github;
        let mut github = IndexMap::new();
        let mut put = |key: &str, value: Value| {
            github.insert(key.to_string(), value);
        };

        put("workspace", Value::from(config.workspace.to_string_lossy().to_string()));
        put("event_name", Value::from(config.event_name.as_str()));
        put("event", Value::from(&config.event));
        put("sha", Value::from(overrides.sha.clone().unwrap_or_default()));
        put("ref", Value::from(overrides.git_ref.clone().unwrap_or_default()));
        put("repository", Value::from(overrides.repository.clone().unwrap_or_default()));
        put(
            "actor",
            Value::from(
                overrides
                    .actor
                    .clone()
                    .or_else(|| std::env::var("USER").ok())
                    .unwrap_or_default(),
            ),
        );
        put("run_number", Value::from("1"));
        if let Some(workflow) = &self.workflow {
            put("run_id", Value::from(workflow.run.run_id.as_str()));
            put("workflow", Value::from(workflow.run.name.as_str()));
        }
        if let Some(job) = &self.job {
            put("job", Value::from(job.id.as_str()));
        }
        if let Some(step) = &self.step {
            put("action", Value::from(step.run.step_id.as_str()));
        }
        if let Some(action) = &self.action {
            put("action_ref", Value::from(action.reference.as_str()));
        }
        Value::Object(github)
    }

    fn runner(&self) -> Value {
        let os = match std::env::consts::OS {
            "linux" => "Linux",
            "macos" => "macOS",
            "windows" => "Windows",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "X64",
            "x86" => "X86",
            "aarch64" => "ARM64",
            "arm" => "ARM",
            other => other,
        };
        let mut runner = IndexMap::new();
        runner.insert("os".to_string(), Value::from(os));
        runner.insert("arch".to_string(), Value::from(arch));
        runner.insert("name".to_string(), Value::from("gantry"));
        runner.insert(
            "temp".to_string(),
            Value::from(self.config.temp_dir().to_string_lossy().to_string()),
        );
        runner.insert(
            "tool_cache".to_string(),
            Value::from(self.config.tool_cache_dir().to_string_lossy().to_string()),
        );
        Value::Object(runner)
    }

    fn env(&self) -> Value {
        Value::object_from_strings(&self.effective_env())
    }

    fn job(&self) -> Value {
        let Some(job) = &self.job else {
            return empty();
        };
        let status = match job.phase {
            JobPhase::Gate => Self::gate_status(job),
            JobPhase::Running => job.status.as_str(),
        };
        let mut map = IndexMap::new();
        map.insert("status".to_string(), Value::from(status));
        Value::Object(map)
    }

    fn steps(&self) -> Value {
        let Some(job) = &self.job else {
            return empty();
        };
        Value::Object(
            job.steps
                .iter()
                .map(|(id, step)| {
                    let mut entry = IndexMap::new();
                    entry.insert("outputs".to_string(), Value::object_from_strings(&step.outputs));
                    entry.insert("outcome".to_string(), Value::from(step.outcome.as_str()));
                    entry.insert("conclusion".to_string(), Value::from(step.conclusion.as_str()));
                    (id.clone(), Value::Object(entry))
                })
                .collect(),
        )
    }

    fn secrets(&self) -> Value {
        Value::object_from_strings(&self.config.secrets)
    }

    fn strategy(&self) -> Value {
        self.job.as_ref().map(|j| j.strategy.clone()).unwrap_or_else(empty)
    }

    fn matrix(&self) -> Value {
        self.job
            .as_ref()
            .and_then(|j| j.matrix.as_ref())
            .map(MatrixInstance::to_context)
            .unwrap_or_else(empty)
    }

    fn needs(&self) -> Value {
        self.job.as_ref().map(|j| j.needs.clone()).unwrap_or_else(empty)
    }

    fn inputs(&self) -> Value {
        self.workflow
            .as_ref()
            .map(|w| w.inputs.clone())
            .unwrap_or_else(empty)
    }
}
