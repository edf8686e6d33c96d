// Shell Runner
// Shell templates for run steps and the local process execution engine

use crate::runners::container::{docker_build_args, docker_run_args, DockerImage};
use crate::runners::{ExecRequest, ExecSpec, ExecStatus, ExecutionEngine};
use crate::{RunnerError, RunnerResult};

use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// How a run step's script file is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    name: String,
    /// Program followed by arguments; `{0}` is replaced by the script path
    template: Vec<String>,
    extension: &'static str,
}

impl Shell {
    /// Resolve a `shell:` value, falling back to the default shell
    pub fn resolve(name: Option<&str>) -> RunnerResult<Self> {
        let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or_else(|| Self::default_name());

        let (template, extension): (&[&str], &'static str) = match name {
            "bash" => (&["bash", "--noprofile", "--norc", "-eo", "pipefail", "{0}"], ".sh"),
            "sh" => (&["sh", "-e", "{0}"], ".sh"),
            "python" => (&["python", "{0}"], ".py"),
            "pwsh" => (&["pwsh", "-command", ". '{0}'"], ".ps1"),
            "powershell" => (&["powershell", "-command", ". '{0}'"], ".ps1"),
            "cmd" => (&["cmd", "/D", "/E:ON", "/V:OFF", "/S", "/C", "CALL \"{0}\""], ".cmd"),
            custom if custom.contains("{0}") => {
                let template = shell_words::split(custom).map_err(|e| {
                    RunnerError::execution(format!("invalid shell template '{}': {}", custom, e))
                })?;
                if template.is_empty() {
                    return Err(RunnerError::execution("empty shell template"));
                }
                return Ok(Self {
                    name: custom.to_string(),
                    template,
                    extension: "",
                });
            }
            other => {
                return Err(RunnerError::execution(format!(
                    "unsupported shell '{}' (use a template containing {{0}})",
                    other
                )))
            }
        };

        Ok(Self {
            name: name.to_string(),
            template: template.iter().map(|s| s.to_string()).collect(),
            extension,
        })
    }

    /// `bash` when it is on PATH, else `sh`
    pub fn default_name() -> &'static str {
        if which::which("bash").is_ok() {
            "bash"
        } else {
            "sh"
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// Script body as written to disk
    pub fn prepare_script(&self, body: &str) -> String {
        match self.extension {
            ".ps1" => format!(
                "$ErrorActionPreference = 'stop'\n{}\nif ((Test-Path -LiteralPath variable:\\LASTEXITCODE)) {{ exit $LASTEXITCODE }}\n",
                body
            ),
            _ => body.to_string(),
        }
    }

    /// Program and arguments that run `script`
    pub fn command(&self, script: &Path) -> (String, Vec<String>) {
        let path = script.to_string_lossy();
        let mut parts = self.template.iter().map(|part| part.replace("{0}", &path));
        let program = parts.next().unwrap_or_default();
        (program, parts.collect())
    }
}

/// Runs processes with `tokio::process` and containers through the docker CLI.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    docker: String,
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEngine {
    pub fn new() -> Self {
        Self {
            docker: "docker".to_string(),
        }
    }

    async fn build_image(&self, path: &Path, context: &Path, tag: &str) -> RunnerResult<()> {
        let mut cmd = Command::new(&self.docker);
        cmd.args(docker_build_args(path, context, tag));
        let mut log = |line: &str| debug!(image = %tag, "{}", line);
        let status = stream(cmd, &self.docker, &mut log).await?;
        if !status.success() {
            return Err(RunnerError::execution(format!(
                "docker build of '{}' failed with exit code {:?}",
                path.display(),
                status.exit_code
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ExecutionEngine for ProcessEngine {
    async fn execute(
        &self,
        request: &ExecRequest,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> RunnerResult<ExecStatus> {
        match &request.spec {
            ExecSpec::Process {
                program,
                args,
                working_dir,
            } => {
                let mut cmd = Command::new(program);
                cmd.args(args).current_dir(working_dir).envs(&request.env);
                debug!(command = %request.describe(), dir = %working_dir.display(), "spawning process");
                stream(cmd, program, on_line).await
            }
            ExecSpec::Container {
                image,
                entrypoint,
                args,
                mounts,
                working_dir,
            } => {
                let image = DockerImage::parse(image);
                if let DockerImage::Dockerfile { path, context, tag } = &image {
                    self.build_image(path, context, tag).await?;
                }

                let mut cmd = Command::new(&self.docker);
                cmd.args(docker_run_args(
                    image.run_name(),
                    entrypoint.as_deref(),
                    args,
                    mounts,
                    working_dir.as_deref(),
                    request.env.keys(),
                ))
                .envs(&request.env);
                debug!(image = %image.run_name(), "running container");
                stream(cmd, &self.docker, on_line).await
            }
        }
    }
}

/// Spawn `cmd` and forward stdout and stderr lines as they arrive
async fn stream(
    mut cmd: Command,
    program: &str,
    on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
) -> RunnerResult<ExecStatus> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| RunnerError::execution(format!("failed to spawn '{}': {}", program, e)))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RunnerError::execution("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RunnerError::execution("stderr was not captured"))?;

    let mut out = BufReader::new(stdout).lines();
    let mut err = BufReader::new(stderr).lines();
    let (mut out_open, mut err_open) = (true, true);

    while out_open || err_open {
        tokio::select! {
            line = out.next_line(), if out_open => match line? {
                Some(line) => on_line(&line),
                None => out_open = false,
            },
            line = err.next_line(), if err_open => match line? {
                Some(line) => on_line(&line),
                None => err_open = false,
            },
        }
    }

    let status = child.wait().await?;
    Ok(ExecStatus {
        exit_code: status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_builtin_shells() {
        let bash = Shell::resolve(Some("bash")).unwrap();
        let (program, args) = bash.command(Path::new("/tmp/s.sh"));
        assert_eq!(program, "bash");
        assert_eq!(args, vec!["--noprofile", "--norc", "-eo", "pipefail", "/tmp/s.sh"]);
        assert_eq!(bash.extension(), ".sh");

        let pwsh = Shell::resolve(Some("pwsh")).unwrap();
        assert_eq!(pwsh.command(Path::new("a.ps1")).1, vec!["-command", ". 'a.ps1'"]);
        assert!(pwsh.prepare_script("Write-Host hi").starts_with("$ErrorActionPreference"));

        assert_eq!(Shell::resolve(Some("python")).unwrap().extension(), ".py");
        assert_eq!(
            Shell::resolve(Some("cmd")).unwrap().command(Path::new("x.cmd")).1.last().unwrap(),
            "CALL \"x.cmd\""
        );
    }

    #[test]
    fn test_custom_template() {
        let shell = Shell::resolve(Some("perl -w '{0}'")).unwrap();
        let (program, args) = shell.command(Path::new("/tmp/run"));
        assert_eq!(program, "perl");
        assert_eq!(args, vec!["-w", "/tmp/run"]);
    }

    #[test]
    fn test_unknown_shell_fails() {
        assert!(matches!(Shell::resolve(Some("fish")), Err(RunnerError::Execution(_))));
    }

    #[test]
    fn test_default_shell() {
        let shell = Shell::resolve(None).unwrap();
        assert!(shell.name() == "bash" || shell.name() == "sh");

        let configured = String::from("  ");
        let shell = Shell::resolve(Some(configured.as_str())).unwrap();
        assert_eq!(shell.name(), Shell::default_name());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_trait_object_streams_borrowed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let engine: std::sync::Arc<dyn ExecutionEngine> = std::sync::Arc::new(ProcessEngine::new());
        let request = ExecRequest::process("sh", vec!["-c".into(), "echo one; echo two".into()], dir.path());

        let mut lines = Vec::new();
        let mut collect = |line: &str| lines.push(line.to_uppercase());
        let status = engine.execute(&request, &mut collect).await.unwrap();

        assert!(status.success());
        assert_eq!(lines, vec!["ONE".to_string(), "TWO".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_streams_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = IndexMap::new();
        env.insert("GREETING".to_string(), "hello".to_string());
        let request = ExecRequest::process(
            "sh",
            vec!["-c".into(), "echo $GREETING; echo oops >&2; exit 3".into()],
            dir.path(),
        )
        .with_env(env);

        let mut lines = Vec::new();
        let status = ProcessEngine::new()
            .execute(&request, &mut |line: &str| lines.push(line.to_string()))
            .await
            .unwrap();

        assert_eq!(status.exit_code, Some(3));
        lines.sort();
        assert_eq!(lines, vec!["hello".to_string(), "oops".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_program_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let request = ExecRequest::process("gantry-no-such-program", vec![], dir.path());
        let result = ProcessEngine::new().execute(&request, &mut |_: &str| {}).await;
        assert!(matches!(result, Err(RunnerError::Execution(_))));
    }
}
