// Executor Configuration
// Settings shared by every component of a workflow run

use crate::expression::EvalMode;
use crate::utils::default_workspace;
use crate::RunnerResult;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Values that override the defaults of the `github` context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubOverrides {
    pub sha: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub repository: Option<String>,
    pub actor: Option<String>,
}

/// Configuration for a workflow run.
///
/// Unset directories are derived from the workspace, see the accessor
/// methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutorConfig {
    /// Checkout the workflow operates on (default: enclosing git repository)
    pub workspace: PathBuf,

    /// Durable run store root (default: `<workspace>/.gantry`)
    pub state_dir: Option<PathBuf>,

    /// Runner temp dir (default: `<state_dir>/tmp`)
    pub temp_dir: Option<PathBuf>,

    /// Where `owner/repo@ref` actions are looked up (default: `~/.gantry/actions`)
    pub action_cache_dir: PathBuf,

    pub eval_mode: EvalMode,

    /// Jobs allowed to run at the same time
    pub max_parallel_jobs: usize,

    pub secrets: IndexMap<String, String>,

    /// `workflow_dispatch` inputs; override declared defaults
    pub inputs: IndexMap<String, String>,

    pub event_name: String,

    /// Webhook-style event payload exposed as `github.event`
    pub event: serde_json::Value,

    pub github: GithubOverrides,

    /// Shell for `run` steps that set none (default: bash if installed, else sh)
    pub default_shell: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let action_cache_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gantry")
            .join("actions");

        Self {
            workspace: default_workspace(),
            state_dir: None,
            temp_dir: None,
            action_cache_dir,
            eval_mode: EvalMode::default(),
            max_parallel_jobs: 1,
            secrets: IndexMap::new(),
            inputs: IndexMap::new(),
            event_name: "push".to_string(),
            event: serde_json::Value::Object(serde_json::Map::new()),
            github: GithubOverrides::default(),
            default_shell: None,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> RunnerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(state_dir.into());
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    pub fn with_action_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.action_cache_dir = dir.into();
        self
    }

    pub fn with_eval_mode(mut self, mode: EvalMode) -> Self {
        self.eval_mode = mode;
        self
    }

    pub fn with_max_parallel_jobs(mut self, max: usize) -> Self {
        self.max_parallel_jobs = max.max(1);
        self
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn with_event(mut self, name: impl Into<String>, payload: serde_json::Value) -> Self {
        self.event_name = name.into();
        self.event = payload;
        self
    }

    pub fn with_default_shell(mut self, shell: impl Into<String>) -> Self {
        self.default_shell = Some(shell.into());
        self
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.workspace.join(".gantry"))
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.state_dir().join("tmp"))
    }

    pub fn tool_cache_dir(&self) -> PathBuf {
        self.state_dir().join("tool-cache")
    }

    /// Max parallel jobs, never zero
    pub fn parallelism(&self) -> usize {
        self.max_parallel_jobs.max(1)
    }
}
