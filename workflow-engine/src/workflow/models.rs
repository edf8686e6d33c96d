use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A GitHub Actions-compatible workflow definition.
///
/// Immutable once parsed. Jobs keep their declaration order, which is the
/// order the planner visits them in when no single job is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// The name of the workflow
    #[serde(default)]
    pub name: Option<String>,

    /// The trigger configuration for the workflow
    #[serde(rename = "on", default)]
    pub on: Trigger,

    /// Workflow-level environment variables
    #[serde(default, deserialize_with = "string_map")]
    pub env: IndexMap<String, String>,

    /// Default settings for all jobs in the workflow
    #[serde(default)]
    pub defaults: Option<Defaults>,

    /// The jobs that make up this workflow, keyed by job ID
    #[serde(default)]
    pub jobs: IndexMap<String, Job>,
}

impl Workflow {
    /// Display name, falling back to the given file stem
    pub fn display_name(&self, fallback: &str) -> String {
        self.name.clone().unwrap_or_else(|| fallback.to_string())
    }

    /// Declared `workflow_dispatch` inputs, if any
    pub fn dispatch_inputs(&self) -> IndexMap<String, WorkflowInput> {
        match &self.on {
            Trigger::Detailed(events) => events
                .get("workflow_dispatch")
                .and_then(|cfg| cfg.as_ref())
                .map(|cfg| cfg.inputs.clone())
                .unwrap_or_default(),
            _ => IndexMap::new(),
        }
    }
}

/// Trigger configuration for when the workflow should run.
///
/// Supports multiple trigger formats:
/// - Simple: `on: push`
/// - List: `on: [push, pull_request]`
/// - Detailed: `on: { push: { branches: [main] } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trigger {
    Single(String),
    Multiple(Vec<String>),
    Detailed(IndexMap<String, Option<EventConfig>>),
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::Multiple(Vec::new())
    }
}

impl Trigger {
    /// Names of the events this workflow reacts to
    pub fn events(&self) -> Vec<String> {
        match self {
            Trigger::Single(s) => vec![s.clone()],
            Trigger::Multiple(v) => v.clone(),
            Trigger::Detailed(m) => m.keys().cloned().collect(),
        }
    }
}

/// Configuration for a specific trigger event.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventConfig {
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub types: Vec<String>,

    /// Inputs for workflow_dispatch
    #[serde(default)]
    pub inputs: IndexMap<String, WorkflowInput>,
}

/// Input definition for workflow_dispatch triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default: Option<Value>,

    #[serde(default, rename = "type")]
    pub input_type: Option<String>,
}

/// Default settings for jobs and steps.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Defaults {
    #[serde(default)]
    pub run: Option<RunDefaults>,
}

/// Default settings for run steps.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunDefaults {
    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,
}

/// A job within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Job {
    /// Display name for the job
    #[serde(default)]
    pub name: Option<String>,

    /// Jobs that must complete before this job runs
    #[serde(default)]
    pub needs: JobNeeds,

    /// Runner label(s); informational, every job runs on the local host
    #[serde(default, rename = "runs-on")]
    pub runs_on: Option<Value>,

    /// Conditional expression for job execution
    #[serde(default, rename = "if")]
    pub if_condition: Option<String>,

    /// Job-level environment variables
    #[serde(default, deserialize_with = "string_map")]
    pub env: IndexMap<String, String>,

    /// Default settings for steps in this job
    #[serde(default)]
    pub defaults: Option<Defaults>,

    /// Output expressions exposed to dependent jobs
    #[serde(default, deserialize_with = "string_map")]
    pub outputs: IndexMap<String, String>,

    /// Matrix strategy for running multiple job instances
    #[serde(default)]
    pub strategy: Option<Strategy>,

    /// The steps that make up this job
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Job container; parsed but steps run on the host
    #[serde(default)]
    pub container: Option<JobContainer>,

    /// Service containers; parsed but not started
    #[serde(default)]
    pub services: IndexMap<String, JobContainer>,

    /// Job timeout in minutes
    #[serde(default, rename = "timeout-minutes")]
    pub timeout_minutes: Option<ExprFloat>,

    /// Whether a failure of this job leaves the workflow green
    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: Option<ExprBool>,
}

impl Job {
    /// Get a display name for the job.
    pub fn display_name(&self, id: &str) -> String {
        self.name.clone().unwrap_or_else(|| id.to_string())
    }

    pub fn matrix(&self) -> Option<&Matrix> {
        self.strategy.as_ref().and_then(|s| s.matrix.as_ref())
    }

    /// Shell configured through `defaults.run.shell`
    pub fn default_shell(&self) -> Option<&str> {
        self.defaults
            .as_ref()
            .and_then(|d| d.run.as_ref())
            .and_then(|r| r.shell.as_deref())
    }

    /// Working directory configured through `defaults.run.working-directory`
    pub fn default_working_directory(&self) -> Option<&str> {
        self.defaults
            .as_ref()
            .and_then(|d| d.run.as_ref())
            .and_then(|r| r.working_directory.as_deref())
    }
}

/// Job or service container, either `image` shorthand or the full mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JobContainer {
    Image(String),
    Detailed {
        image: String,
        #[serde(default, deserialize_with = "string_map")]
        env: IndexMap<String, String>,
        #[serde(default)]
        volumes: Vec<String>,
        #[serde(default)]
        options: Option<String>,
    },
}

impl JobContainer {
    pub fn image(&self) -> &str {
        match self {
            JobContainer::Image(image) => image,
            JobContainer::Detailed { image, .. } => image,
        }
    }

    pub fn env(&self) -> IndexMap<String, String> {
        match self {
            JobContainer::Image(_) => IndexMap::new(),
            JobContainer::Detailed { env, .. } => env.clone(),
        }
    }

    pub fn volumes(&self) -> &[String] {
        match self {
            JobContainer::Image(_) => &[],
            JobContainer::Detailed { volumes, .. } => volumes,
        }
    }
}

/// Job dependencies - can be a single string or a list.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(untagged)]
pub enum JobNeeds {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl JobNeeds {
    /// Convert to a vector of job IDs.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            JobNeeds::None => vec![],
            JobNeeds::Single(s) => vec![s.clone()],
            JobNeeds::Multiple(v) => v.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            JobNeeds::None => true,
            JobNeeds::Single(_) => false,
            JobNeeds::Multiple(v) => v.is_empty(),
        }
    }
}

impl From<Vec<&str>> for JobNeeds {
    fn from(ids: Vec<&str>) -> Self {
        if ids.is_empty() {
            JobNeeds::None
        } else {
            JobNeeds::Multiple(ids.into_iter().map(String::from).collect())
        }
    }
}

/// A field that holds either a literal or a single `${{ }}` expression.
///
/// Expressions are coerced to `T` when evaluated; see
/// [`crate::expression::ExpressionEngine::eval_typed`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ExprValue<T> {
    Literal(T),
    Expression(String),
}

pub type ExprBool = ExprValue<bool>;
pub type ExprInt = ExprValue<i64>;
pub type ExprFloat = ExprValue<f64>;

impl<T> From<T> for ExprValue<T> {
    fn from(value: T) -> Self {
        ExprValue::Literal(value)
    }
}

/// Strategy configuration for matrix builds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Strategy {
    #[serde(default)]
    pub matrix: Option<Matrix>,

    /// Whether to cancel the remaining combinations once one fails
    #[serde(default, rename = "fail-fast")]
    pub fail_fast: Option<ExprBool>,

    #[serde(default, rename = "max-parallel")]
    pub max_parallel: Option<ExprInt>,
}

/// Matrix configuration: `{ <dimension>: [values...], include: [...], exclude: [...] }`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Matrix {
    /// Matrix dimensions in declaration order
    #[serde(flatten)]
    pub dimensions: IndexMap<String, Vec<Value>>,

    #[serde(default)]
    pub include: Vec<IndexMap<String, Value>>,

    #[serde(default)]
    pub exclude: Vec<IndexMap<String, Value>>,
}

/// A step within a job.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Step {
    /// Unique identifier for the step (used in outputs)
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "if")]
    pub if_condition: Option<String>,

    /// Inline script
    #[serde(default)]
    pub run: Option<String>,

    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,

    /// Action reference or `docker://` image
    #[serde(default)]
    pub uses: Option<String>,

    /// Inputs to pass to the action
    #[serde(default)]
    pub with: IndexMap<String, Value>,

    #[serde(default, deserialize_with = "string_map")]
    pub env: IndexMap<String, String>,

    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: Option<ExprBool>,

    #[serde(default, rename = "timeout-minutes")]
    pub timeout_minutes: Option<ExprFloat>,
}

impl Step {
    /// Step ID, defaulting to the step's position in its job.
    pub fn id_or_index(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| index.to_string())
    }

    /// Get a display name for the step.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            name.clone()
        } else if let Some(uses) = &self.uses {
            format!("Run {}", uses)
        } else if let Some(run) = &self.run {
            let first_line = run.lines().next().unwrap_or(run);
            if first_line.chars().count() > 50 {
                let truncated: String = first_line.chars().take(47).collect();
                format!("Run {}...", truncated)
            } else {
                format!("Run {}", first_line)
            }
        } else {
            "Unnamed step".to_string()
        }
    }

    pub fn is_run(&self) -> bool {
        self.run.is_some()
    }

    pub fn is_uses(&self) -> bool {
        self.uses.is_some()
    }
}

/// Deserialize a mapping whose values may be any YAML scalar into strings.
fn string_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, serde_yaml::Value>> = Option::deserialize(deserializer)?;
    let mut out = IndexMap::new();
    for (key, value) in raw.unwrap_or_default() {
        let text = match value {
            serde_yaml::Value::Null => String::new(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a scalar value for '{}', found {:?}",
                    key, other
                )))
            }
        };
        out.insert(key, text);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_workflow() {
        let yaml = r#"
name: CI
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: echo "Hello, World!"
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(workflow.name, Some("CI".to_string()));
        assert!(matches!(workflow.on, Trigger::Single(ref s) if s == "push"));
        assert!(workflow.jobs.contains_key("build"));
    }

    #[test]
    fn test_jobs_keep_declaration_order() {
        let yaml = r#"
on: push
jobs:
  zeta:
    steps: [{run: a}]
  alpha:
    steps: [{run: b}]
  mid:
    steps: [{run: c}]
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        let ids: Vec<&str> = workflow.jobs.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_job_with_needs() {
        let yaml = r#"
on: push
jobs:
  build:
    steps:
      - run: cargo build
  test:
    needs: build
    steps:
      - run: cargo test
  deploy:
    needs: [build, test]
    steps:
      - run: echo "Deploying"
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert!(workflow.jobs["build"].needs.is_empty());
        assert_eq!(workflow.jobs["test"].needs.to_vec(), vec!["build"]);
        assert_eq!(workflow.jobs["deploy"].needs.to_vec(), vec!["build", "test"]);
    }

    #[test]
    fn test_parse_matrix_strategy() {
        let yaml = r#"
on: push
jobs:
  test:
    strategy:
      fail-fast: false
      matrix:
        os: [ubuntu-latest, macos-latest]
        node: [16, 18]
        include:
          - os: windows-latest
            node: 20
        exclude:
          - os: macos-latest
            node: 16
    steps:
      - run: echo "Testing"
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        let strategy = workflow.jobs["test"].strategy.as_ref().unwrap();
        let matrix = strategy.matrix.as_ref().unwrap();

        let dims: Vec<&str> = matrix.dimensions.keys().map(String::as_str).collect();
        assert_eq!(dims, vec!["os", "node"]);
        assert_eq!(matrix.include.len(), 1);
        assert_eq!(matrix.exclude.len(), 1);
        assert_eq!(strategy.fail_fast, Some(ExprValue::Literal(false)));
    }

    #[test]
    fn test_typed_fields_accept_literals_and_expressions() {
        let yaml = r#"
on: push
jobs:
  build:
    timeout-minutes: 10
    continue-on-error: ${{ matrix.experimental }}
    steps:
      - run: make
        continue-on-error: true
        timeout-minutes: 0.5
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        let job = &workflow.jobs["build"];
        assert_eq!(job.timeout_minutes, Some(ExprValue::Literal(10.0)));
        assert_eq!(
            job.continue_on_error,
            Some(ExprValue::Expression("${{ matrix.experimental }}".to_string()))
        );
        assert_eq!(job.steps[0].continue_on_error, Some(ExprValue::Literal(true)));
        assert_eq!(job.steps[0].timeout_minutes, Some(ExprValue::Literal(0.5)));
    }

    #[test]
    fn test_parse_env_at_all_levels_with_scalars() {
        let yaml = r#"
on: push
env:
  WORKFLOW_VAR: workflow
  RETRIES: 3
jobs:
  build:
    env:
      DEBUG: true
    steps:
      - run: echo "Hello"
        env:
          STEP_VAR: step
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(workflow.env["WORKFLOW_VAR"], "workflow");
        assert_eq!(workflow.env["RETRIES"], "3");
        let job = &workflow.jobs["build"];
        assert_eq!(job.env["DEBUG"], "true");
        assert_eq!(job.steps[0].env["STEP_VAR"], "step");
    }

    #[test]
    fn test_dispatch_inputs() {
        let yaml = r#"
on:
  workflow_dispatch:
    inputs:
      level:
        default: info
jobs:
  build:
    steps: [{run: echo}]
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        let inputs = workflow.dispatch_inputs();
        assert_eq!(inputs["level"].default, Some(Value::String("info".to_string())));
        assert_eq!(workflow.on.events(), vec!["workflow_dispatch"]);
    }

    #[test]
    fn test_step_display_name_and_id() {
        let named = Step {
            name: Some("Build project".to_string()),
            run: Some("cargo build".to_string()),
            ..Default::default()
        };
        assert_eq!(named.display_name(), "Build project");
        assert_eq!(named.id_or_index(3), "3");

        let uses = Step {
            id: Some("checkout".to_string()),
            uses: Some("actions/checkout@v4".to_string()),
            ..Default::default()
        };
        assert_eq!(uses.display_name(), "Run actions/checkout@v4");
        assert_eq!(uses.id_or_index(0), "checkout");

        let run = Step {
            run: Some("echo hello\necho world".to_string()),
            ..Default::default()
        };
        assert_eq!(run.display_name(), "Run echo hello");
    }

    #[test]
    fn test_parse_job_container_forms() {
        let yaml = r#"
on: push
jobs:
  short:
    runs-on: [self-hosted, linux]
    container: node:20
    steps: [{run: node --version}]
  full:
    container:
      image: rust:1.80
      env:
        CARGO_HOME: /cargo
      volumes: ["/tmp:/tmp"]
    services:
      redis: redis:7
    steps: [{run: cargo --version}]
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        let short = &workflow.jobs["short"];
        assert_eq!(short.container.as_ref().unwrap().image(), "node:20");
        assert!(short.runs_on.as_ref().unwrap().is_array());

        let full = workflow.jobs["full"].container.as_ref().unwrap();
        assert_eq!(full.image(), "rust:1.80");
        assert_eq!(full.env().get("CARGO_HOME").map(String::as_str), Some("/cargo"));
        assert_eq!(full.volumes(), ["/tmp:/tmp".to_string()]);
        assert_eq!(workflow.jobs["full"].services["redis"].image(), "redis:7");
    }
}
