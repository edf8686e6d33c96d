// Action Manifest Parser
// Parses action.yml / action.yaml metadata files

use crate::workflow::Step;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when loading actions
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Failed to read action metadata: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse action metadata: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Action not found at: {0}")]
    NotFound(String),

    #[error("Invalid action reference: {0}")]
    InvalidReference(String),

    #[error("Invalid action metadata: {0}")]
    Invalid(String),
}

/// Action metadata (action.yml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMetadata {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub inputs: IndexMap<String, ActionInput>,

    #[serde(default)]
    pub outputs: IndexMap<String, ActionOutput>,

    pub runs: ActionRuns,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionInput {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default, deserialize_with = "scalar_string")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionOutput {
    #[serde(default)]
    pub description: Option<String>,

    /// Composite actions map outputs to expressions
    #[serde(default)]
    pub value: Option<String>,
}

/// The `runs:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActionRuns {
    pub using: String,

    // node
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub pre: Option<String>,
    #[serde(default)]
    pub post: Option<String>,
    #[serde(default)]
    pub pre_if: Option<String>,
    #[serde(default)]
    pub post_if: Option<String>,

    // docker
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub pre_entrypoint: Option<String>,
    #[serde(default)]
    pub post_entrypoint: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,

    // composite
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Runtime an action declares in `runs.using`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRuntime {
    Node(String),
    Docker,
    Composite,
}

impl ActionRuntime {
    pub fn parse(using: &str) -> Result<Self, ActionError> {
        match using.trim().to_lowercase().as_str() {
            v @ ("node12" | "node16" | "node20") => Ok(ActionRuntime::Node(v.to_string())),
            "docker" => Ok(ActionRuntime::Docker),
            "composite" => Ok(ActionRuntime::Composite),
            other => Err(ActionError::Invalid(format!("unsupported runtime '{}'", other))),
        }
    }
}

impl FromStr for ActionMetadata {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let metadata: ActionMetadata = serde_yaml::from_str(s)?;
        metadata.runtime()?;
        Ok(metadata)
    }
}

impl ActionMetadata {
    /// Load `action.yml` (or `action.yaml`) from an action directory
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ActionError> {
        let dir = dir.as_ref();
        for file in ["action.yml", "action.yaml"] {
            let path = dir.join(file);
            if path.is_file() {
                let content = fs::read_to_string(&path)?;
                return content.parse();
            }
        }
        Err(ActionError::NotFound(dir.display().to_string()))
    }

    pub fn runtime(&self) -> Result<ActionRuntime, ActionError> {
        ActionRuntime::parse(&self.runs.using)
    }

    /// Declared input defaults, for inputs that have one
    pub fn input_defaults(&self) -> IndexMap<String, String> {
        self.inputs
            .iter()
            .filter_map(|(name, input)| input.default.clone().map(|d| (name.clone(), d)))
            .collect()
    }

    /// Whether a `pre` stage exists for the runtime
    pub fn has_pre(&self) -> bool {
        match self.runtime() {
            Ok(ActionRuntime::Node(_)) => self.runs.pre.is_some(),
            Ok(ActionRuntime::Docker) => self.runs.pre_entrypoint.is_some(),
            _ => false,
        }
    }

    /// Whether a `post` stage exists for the runtime
    pub fn has_post(&self) -> bool {
        match self.runtime() {
            Ok(ActionRuntime::Node(_)) => self.runs.post.is_some(),
            Ok(ActionRuntime::Docker) => self.runs.post_entrypoint.is_some(),
            _ => false,
        }
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(serde_yaml::Value::Null) => None,
        Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a scalar input default, found {:?}",
                other
            )))
        }
    })
}
