// Runners Module
// The execution engine seam plus the local process and docker implementations

pub mod container;
pub mod shell;

#[cfg(test)]
pub(crate) mod fake;

pub use container::{docker_build_args, docker_run_args, image_needs_build, DockerImage};
pub use shell::{ProcessEngine, Shell};

use crate::RunnerResult;

use indexmap::IndexMap;
use std::path::PathBuf;

/// What to run
#[derive(Debug, Clone, PartialEq)]
pub enum ExecSpec {
    Process {
        program: String,
        args: Vec<String>,
        working_dir: PathBuf,
    },
    Container {
        /// Image name, or a path to a Dockerfile to build first
        image: String,
        entrypoint: Option<String>,
        args: Vec<String>,
        /// `host:container` bind mounts
        mounts: Vec<String>,
        working_dir: Option<String>,
    },
}

/// A command or container plus its environment
#[derive(Debug, Clone, PartialEq)]
pub struct ExecRequest {
    pub spec: ExecSpec,
    pub env: IndexMap<String, String>,
}

impl ExecRequest {
    pub fn process(program: impl Into<String>, args: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            spec: ExecSpec::Process {
                program: program.into(),
                args,
                working_dir: working_dir.into(),
            },
            env: IndexMap::new(),
        }
    }

    pub fn with_env(mut self, env: IndexMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match &self.spec {
            ExecSpec::Process { program, args, .. } => {
                format!("{} {}", program, args.join(" ")).trim_end().to_string()
            }
            ExecSpec::Container { image, .. } => format!("docker://{}", image),
        }
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecStatus {
    /// `None` when killed by a signal
    pub exit_code: Option<i32>,
}

impl ExecStatus {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs processes and containers, streaming their output line by line.
///
/// Dropping the returned future must stop the work; timeouts rely on it.
#[async_trait::async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(
        &self,
        request: &ExecRequest,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> RunnerResult<ExecStatus>;
}
