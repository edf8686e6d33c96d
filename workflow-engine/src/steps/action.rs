// Action Step
// Reusable actions: node scripts, docker images and composite steps

use crate::actions::{ActionMetadata, ActionRef, ActionRuntime, ResolvedAction};
use crate::execution::context::ExecutionContext;
use crate::execution::report::{Conclusion, StepStage};
use crate::expression::{ActionInputsProvider, Value};
use crate::runners::{ExecRequest, ExecStatus, Shell};
use crate::steps::docker::container_request;
use crate::steps::run::{run_script, working_dir_for};
use crate::steps::{input_env, state_env, with_value_string, StageExec, StepServices};
use crate::workflow::Step;
use crate::{RunnerError, RunnerResult};

use indexmap::IndexMap;
use tracing::{debug, warn};

/// `uses: owner/repo@ref` or `uses: ./path` step
#[derive(Debug, Clone)]
pub struct ActionStep {
    uses: String,
    reference: Option<ActionRef>,
    resolved: Option<ResolvedAction>,
    error: Option<String>,
}

impl ActionStep {
    pub fn new(uses: &str) -> Self {
        match ActionRef::parse(uses) {
            Ok(reference) => Self {
                uses: uses.to_string(),
                reference: Some(reference),
                resolved: None,
                error: None,
            },
            Err(err) => Self {
                uses: uses.to_string(),
                reference: None,
                resolved: None,
                error: Some(err.to_string()),
            },
        }
    }

    /// Resolve the action; a failure surfaces when the main stage runs
    pub async fn setup(&mut self, services: &StepServices) {
        let Some(reference) = &self.reference else {
            return;
        };
        match services.resolver.resolve(reference).await {
            Ok(action) => self.resolved = Some(action),
            Err(err) => {
                warn!(action = %self.uses, error = %err, "failed to resolve action");
                self.error = Some(err.to_string());
            }
        }
    }

    pub fn resolved(&self) -> Option<&ResolvedAction> {
        self.resolved.as_ref()
    }

    pub fn has_stage(&self, stage: StepStage) -> bool {
        match stage {
            StepStage::Main => true,
            StepStage::Pre => self.resolved.as_ref().map_or(false, |a| a.metadata.has_pre()),
            StepStage::Post => self.resolved.as_ref().map_or(false, |a| a.metadata.has_post()),
        }
    }

    /// `pre-if` / `post-if` of the action
    pub fn stage_condition(&self, stage: StepStage) -> Option<String> {
        let runs = &self.resolved.as_ref()?.metadata.runs;
        match stage {
            StepStage::Pre => runs.pre_if.clone(),
            StepStage::Post => runs.post_if.clone(),
            StepStage::Main => None,
        }
    }

    fn ready(&self) -> RunnerResult<&ResolvedAction> {
        self.resolved.as_ref().ok_or_else(|| {
            RunnerError::execution(
                self.error
                    .clone()
                    .unwrap_or_else(|| format!("action '{}' was not resolved", self.uses)),
            )
        })
    }

    pub async fn execute(
        &self,
        stage: StepStage,
        step: &Step,
        exec: &mut StageExec<'_>,
    ) -> RunnerResult<ExecStatus> {
        let action = self.ready()?;
        let runtime = action.metadata.runtime()?;
        let inputs = resolve_inputs(exec.ctx, step, &action.metadata)?;
        exec.ctx.set_action(&self.uses, inputs.clone())?;

        let result = match runtime {
            ActionRuntime::Node(runtime) => {
                debug!(action = %self.uses, runtime = %runtime, stage = %stage.as_str(), "running node action");
                run_node(action, stage, &inputs, exec).await
            }
            ActionRuntime::Docker => run_docker(action, stage, &inputs, exec).await,
            ActionRuntime::Composite => run_composite(action, &inputs, exec).await,
        };

        exec.ctx.unset_action()?;
        result
    }
}

/// Step `with:` merged over the declared defaults, both evaluated
fn resolve_inputs(
    ctx: &ExecutionContext,
    step: &Step,
    metadata: &ActionMetadata,
) -> RunnerResult<IndexMap<String, String>> {
    let engine = ctx.engine();
    let mut inputs = IndexMap::new();
    for (name, default) in metadata.input_defaults() {
        inputs.insert(name, engine.eval_string(ctx, &default)?);
    }
    for (name, value) in &step.with {
        inputs.insert(name.clone(), engine.eval_string(ctx, &with_value_string(value))?);
    }
    for (name, input) in &metadata.inputs {
        if input.required && !inputs.contains_key(name) {
            warn!(input = %name, "required input not supplied");
        }
    }
    Ok(inputs)
}

/// Base env plus `INPUT_*` and the step's saved `STATE_*`
fn action_env(inputs: &IndexMap<String, String>, exec: &StageExec<'_>) -> IndexMap<String, String> {
    let step_id = exec.ctx.step_id().unwrap_or_default();
    let mut env = exec.base_env();
    env.extend(input_env(inputs));
    env.extend(state_env(&exec.ctx.saved_state(step_id)));
    env
}

async fn run_node(
    action: &ResolvedAction,
    stage: StepStage,
    inputs: &IndexMap<String, String>,
    exec: &mut StageExec<'_>,
) -> RunnerResult<ExecStatus> {
    let runs = &action.metadata.runs;
    let entry = match stage {
        StepStage::Pre => runs.pre.as_deref(),
        StepStage::Main => runs.main.as_deref(),
        StepStage::Post => runs.post.as_deref(),
    }
    .ok_or_else(|| {
        RunnerError::execution(format!(
            "action '{}' declares no {} entrypoint",
            action.reference,
            stage.as_str()
        ))
    })?;

    let env = action_env(inputs, exec);
    let script = action.location.join(entry);
    let request = ExecRequest::process(
        "node",
        vec![script.to_string_lossy().to_string()],
        exec.ctx.config().workspace.clone(),
    )
    .with_env(env);
    exec.run(&request).await
}

async fn run_docker(
    action: &ResolvedAction,
    stage: StepStage,
    inputs: &IndexMap<String, String>,
    exec: &mut StageExec<'_>,
) -> RunnerResult<ExecStatus> {
    let runs = &action.metadata.runs;
    let image = runs
        .image
        .as_deref()
        .ok_or_else(|| RunnerError::execution(format!("action '{}' declares no image", action.reference)))?;
    let image = match image.strip_prefix("docker://") {
        Some(registry) => registry.to_string(),
        None => action.location.join(image).to_string_lossy().to_string(),
    };

    let entrypoint = match stage {
        StepStage::Pre => runs.pre_entrypoint.clone(),
        StepStage::Main => runs.entrypoint.clone(),
        StepStage::Post => runs.post_entrypoint.clone(),
    };

    let (args, declared_env) = {
        let provider = ActionInputsProvider::new(&*exec.ctx, inputs.clone());
        let engine = exec.ctx.engine();
        let mut args = Vec::new();
        if stage == StepStage::Main {
            for arg in &runs.args {
                args.push(engine.eval_string(&provider, arg)?);
            }
        }
        let mut env = IndexMap::new();
        for (name, value) in &runs.env {
            env.insert(name.clone(), engine.eval_string(&provider, value)?);
        }
        (args, env)
    };

    let mut env = action_env(inputs, exec);
    env.extend(declared_env);
    let request = container_request(exec, image, entrypoint, args, env);
    exec.run(&request).await
}

/// Run the nested `run:` steps of a composite action in order.
///
/// Nested steps see the action's inputs and each other through `steps`;
/// their outputs land on the invoking step. The first failing nested step
/// ends the action.
async fn run_composite(
    action: &ResolvedAction,
    inputs: &IndexMap<String, String>,
    exec: &mut StageExec<'_>,
) -> RunnerResult<ExecStatus> {
    let mut nested_steps: IndexMap<String, Value> = IndexMap::new();
    let mut status = ExecStatus { exit_code: Some(0) };

    for (index, nested) in action.metadata.runs.steps.iter().enumerate() {
        let nested_id = nested.id_or_index(index);
        let prepared = {
            let provider = ActionInputsProvider::new(&*exec.ctx, inputs.clone())
                .with_steps(Value::Object(nested_steps.clone()));
            let engine = exec.ctx.engine();
            if !engine.eval_condition(&provider, nested.if_condition.as_deref())? {
                debug!(action = %action.reference, step = %nested_id, "nested step skipped");
                nested_steps.insert(nested_id, nested_context(IndexMap::new(), Conclusion::Skipped));
                continue;
            }
            if let Some(uses) = &nested.uses {
                return Err(RunnerError::execution(format!(
                    "composite action '{}' uses '{}': nested actions are not supported",
                    action.reference, uses
                )));
            }
            let script = nested.run.as_deref().ok_or_else(|| {
                RunnerError::execution(format!("composite step '{}' has no 'run'", nested_id))
            })?;
            let body = engine.eval_string(&provider, script)?;
            let mut env = IndexMap::new();
            for (name, value) in &nested.env {
                env.insert(name.clone(), engine.eval_string(&provider, value)?);
            }
            (body, env)
        };
        let (body, env) = prepared;

        let shell = Shell::resolve(nested.shell.as_deref())?;
        let working_dir = match nested.working_directory.as_deref() {
            Some(dir) => working_dir_for(exec.ctx, Some(dir)),
            None => exec.ctx.config().workspace.clone(),
        };

        let before = current_outputs(exec.ctx);
        status = run_script(exec, &shell, &body, &working_dir, env).await?;
        let produced = current_outputs(exec.ctx)
            .into_iter()
            .filter(|(name, value)| before.get(name) != Some(value))
            .collect();

        let conclusion = if status.success() {
            Conclusion::Success
        } else {
            Conclusion::Failure
        };
        nested_steps.insert(nested_id, nested_context(produced, conclusion));
        if !status.success() {
            return Ok(status);
        }
    }

    // declared outputs map onto nested step outputs
    let provider = ActionInputsProvider::new(&*exec.ctx, inputs.clone())
        .with_steps(Value::Object(nested_steps));
    let engine = exec.ctx.engine();
    let mut outputs = IndexMap::new();
    for (name, output) in &action.metadata.outputs {
        if let Some(value) = &output.value {
            outputs.insert(name.clone(), engine.eval_string(&provider, value)?);
        }
    }
    for (name, value) in outputs {
        exec.ctx.set_step_output(&name, &value)?;
    }
    Ok(status)
}

fn current_outputs(ctx: &ExecutionContext) -> IndexMap<String, String> {
    ctx.step_run().map(|run| run.outputs.clone()).unwrap_or_default()
}

fn nested_context(outputs: IndexMap<String, String>, conclusion: Conclusion) -> Value {
    let mut entry = IndexMap::new();
    entry.insert("outputs".to_string(), Value::object_from_strings(&outputs));
    entry.insert("outcome".to_string(), Value::from(conclusion.as_str()));
    entry.insert("conclusion".to_string(), Value::from(conclusion.as_str()));
    Value::Object(entry)
}
