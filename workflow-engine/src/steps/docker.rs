// Docker Step
// `uses: docker://image` steps run as a one-off container

use crate::runners::{ExecRequest, ExecSpec, ExecStatus};
use crate::steps::{input_env, with_value_string, StageExec};
use crate::workflow::Step;
use crate::{RunnerError, RunnerResult};

use indexmap::IndexMap;

/// Workspace path inside step containers
pub const CONTAINER_WORKSPACE: &str = "/github/workspace";

/// `docker://` step
#[derive(Debug, Clone)]
pub struct DockerStep {
    image: String,
}

impl DockerStep {
    pub fn new(image: impl Into<String>) -> Self {
        Self { image: image.into() }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// `with.args` and `with.entrypoint` configure the container; every
    /// other input becomes an `INPUT_*` variable.
    pub async fn execute(&self, step: &Step, exec: &mut StageExec<'_>) -> RunnerResult<ExecStatus> {
        let engine = exec.ctx.engine();
        let mut inputs = IndexMap::new();
        for (name, value) in &step.with {
            inputs.insert(name.clone(), engine.eval_string(&*exec.ctx, &with_value_string(value))?);
        }

        let args = match inputs.shift_remove("args") {
            Some(raw) => shell_words::split(&raw)
                .map_err(|e| RunnerError::execution(format!("invalid args '{}': {}", raw, e)))?,
            None => Vec::new(),
        };
        let entrypoint = inputs.shift_remove("entrypoint");

        let mut env = exec.base_env();
        env.extend(input_env(&inputs));
        let request = container_request(exec, self.image.clone(), entrypoint, args, env);
        exec.run(&request).await
    }
}

/// Container request with the workspace and env files mounted
pub fn container_request(
    exec: &StageExec<'_>,
    image: String,
    entrypoint: Option<String>,
    args: Vec<String>,
    mut env: IndexMap<String, String>,
) -> ExecRequest {
    let workspace = exec.ctx.config().workspace.to_string_lossy().to_string();
    let files = exec.files.dir().to_string_lossy().to_string();
    env.insert("GITHUB_WORKSPACE".to_string(), CONTAINER_WORKSPACE.to_string());

    ExecRequest {
        spec: ExecSpec::Container {
            image,
            entrypoint,
            args,
            mounts: vec![
                format!("{}:{}", workspace, CONTAINER_WORKSPACE),
                format!("{}:{}", files, files),
            ],
            working_dir: Some(CONTAINER_WORKSPACE.to_string()),
        },
        env,
    }
}
