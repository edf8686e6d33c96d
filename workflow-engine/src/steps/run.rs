// Run Step
// Inline scripts written to a shell-specific file and executed

use crate::execution::context::ExecutionContext;
use crate::runners::{ExecRequest, ExecStatus, Shell};
use crate::steps::StageExec;
use crate::utils::resolve_path;
use crate::workflow::Step;
use crate::{RunnerError, RunnerResult};

use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `run:` step
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStep;

impl RunStep {
    pub async fn execute(&self, step: &Step, exec: &mut StageExec<'_>) -> RunnerResult<ExecStatus> {
        let script = step
            .run
            .as_deref()
            .ok_or_else(|| RunnerError::execution("run step has no script"))?;
        let engine = exec.ctx.engine();
        let body = engine.eval_string(&*exec.ctx, script)?;
        let shell = Shell::resolve(shell_for(exec.ctx, step.shell.as_deref()).as_deref())?;
        let working_dir = working_dir_for(exec.ctx, step.working_directory.as_deref());

        run_script(exec, &shell, &body, &working_dir, IndexMap::new()).await
    }
}

/// Step shell, else `defaults.run.shell` of the job then the workflow, else
/// the configured default
pub fn shell_for(ctx: &ExecutionContext, step_shell: Option<&str>) -> Option<String> {
    step_shell
        .map(String::from)
        .or_else(|| ctx.job().and_then(|j| j.default_shell()).map(String::from))
        .or_else(|| {
            ctx.workflow()
                .and_then(|w| w.defaults.as_ref())
                .and_then(|d| d.run.as_ref())
                .and_then(|r| r.shell.clone())
        })
        .or_else(|| ctx.config().default_shell.clone())
}

/// Working directory resolved against the workspace, honouring
/// `defaults.run.working-directory`
pub fn working_dir_for(ctx: &ExecutionContext, step_dir: Option<&str>) -> PathBuf {
    let workspace = &ctx.config().workspace;
    let dir = step_dir
        .map(String::from)
        .or_else(|| ctx.job().and_then(|j| j.default_working_directory()).map(String::from))
        .or_else(|| {
            ctx.workflow()
                .and_then(|w| w.defaults.as_ref())
                .and_then(|d| d.run.as_ref())
                .and_then(|r| r.working_directory.clone())
        });
    match dir {
        Some(dir) => resolve_path(workspace, &dir),
        None => workspace.clone(),
    }
}

/// Write `body` to a script file, run it with `shell` and remove the file
pub async fn run_script(
    exec: &mut StageExec<'_>,
    shell: &Shell,
    body: &str,
    working_dir: &Path,
    extra_env: IndexMap<String, String>,
) -> RunnerResult<ExecStatus> {
    let temp_dir = exec.ctx.config().temp_dir();
    fs::create_dir_all(&temp_dir)?;
    let script = temp_dir.join(format!("script-{}{}", uuid::Uuid::new_v4(), shell.extension()));
    fs::write(&script, shell.prepare_script(body))?;

    let (program, args) = shell.command(&script);
    let mut env = exec.base_env();
    env.extend(extra_env);
    let request = ExecRequest::process(program, args, working_dir).with_env(env);

    let result = exec.run(&request).await;
    if let Err(err) = fs::remove_file(&script) {
        debug!(script = %script.display(), error = %err, "failed to remove script");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::envfile::EnvFiles;
    use crate::runners::fake::{FakeEngine, FakeReply};
    use crate::runners::ExecSpec;
    use crate::steps::tests::{job_context, services_with};
    use std::sync::{Arc, Mutex};

    const WORKFLOW: &str = r#"
on: push
defaults:
  run:
    shell: sh
env:
  WHO: world
jobs:
  build:
    defaults:
      run:
        working-directory: sub
    steps:
      - run: echo hello ${{ env.WHO }}
      - run: print(1)
        shell: python
        working-directory: /abs
"#;

    #[tokio::test]
    async fn test_script_is_interpolated_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = job_context(dir.path(), WORKFLOW);
        let seen = Arc::new(Mutex::new(String::new()));
        let captured = Arc::clone(&seen);
        let engine = FakeEngine::new(move |request| {
            if let ExecSpec::Process { args, .. } = &request.spec {
                let script = args.last().unwrap();
                *captured.lock().unwrap() = fs::read_to_string(script).unwrap();
            }
            FakeReply::default()
        });
        let services = services_with(engine, dir.path(), dir.path());
        let step = ctx.job().unwrap().steps[0].clone();
        let files = EnvFiles::create(dir.path()).unwrap();

        let status = {
            ctx.set_step(&step, 0, crate::execution::report::StepStage::Main).unwrap();
            let mut exec = StageExec::new(&mut ctx, &services, &files);
            RunStep.execute(&step, &mut exec).await.unwrap()
        };

        assert!(status.success());
        assert_eq!(*seen.lock().unwrap(), "echo hello world");
    }

    #[tokio::test]
    async fn test_shell_and_working_dir_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = job_context(dir.path(), WORKFLOW);
        let steps = ctx.job().unwrap().steps.clone();

        assert_eq!(shell_for(&ctx, steps[0].shell.as_deref()).as_deref(), Some("sh"));
        assert_eq!(shell_for(&ctx, steps[1].shell.as_deref()).as_deref(), Some("python"));
        assert_eq!(
            working_dir_for(&ctx, steps[0].working_directory.as_deref()),
            dir.path().join("sub")
        );
        assert_eq!(
            working_dir_for(&ctx, steps[1].working_directory.as_deref()),
            PathBuf::from("/abs")
        );
    }

    #[tokio::test]
    async fn test_process_env_carries_defaults_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = job_context(dir.path(), WORKFLOW);
        let engine = Arc::new(FakeEngine::succeeding());
        let services = crate::steps::StepServices::new(
            engine.clone(),
            Arc::new(crate::actions::LocalActionResolver::new(dir.path(), dir.path())),
        );
        let step = ctx.job().unwrap().steps[0].clone();
        let files = EnvFiles::create(dir.path()).unwrap();

        ctx.set_step(&step, 0, crate::execution::report::StepStage::Main).unwrap();
        let mut exec = StageExec::new(&mut ctx, &services, &files);
        let shell = Shell::resolve(Some("sh")).unwrap();
        let mut extra = IndexMap::new();
        extra.insert("EXTRA".to_string(), "1".to_string());
        run_script(&mut exec, &shell, "true", dir.path(), extra).await.unwrap();

        let request = &engine.requests()[0];
        assert_eq!(request.env["CI"], "true");
        assert_eq!(request.env["WHO"], "world");
        assert_eq!(request.env["EXTRA"], "1");
        assert!(request.env.contains_key("GITHUB_OUTPUT"));
        assert_eq!(request.env["GITHUB_JOB"], "build");
    }
}
