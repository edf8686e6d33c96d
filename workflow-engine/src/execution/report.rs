// Run Records
// Workflow, job and step run state, persisted as the JSON run reports

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final verdict of a workflow, job or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conclusion {
    #[default]
    Success,
    Failure,
    Cancelled,
    Skipped,
}

impl Conclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
            Conclusion::Cancelled => "cancelled",
            Conclusion::Skipped => "skipped",
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Conclusion::Success
    }

    /// Failure or cancellation; what fail-fast and continue-on-error react to
    pub fn propagates(&self) -> bool {
        matches!(self, Conclusion::Failure | Conclusion::Cancelled)
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold `next` into `current`: the first non-success conclusion wins and is
/// never overwritten.
pub fn fold_conclusion(current: &mut Conclusion, next: Conclusion) {
    if current.is_success() && !next.is_success() {
        *current = next;
    }
}

/// Stage of a step's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStage {
    Pre,
    Main,
    Post,
}

impl StepStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStage::Pre => "pre",
            StepStage::Main => "main",
            StepStage::Post => "post",
        }
    }
}

impl fmt::Display for StepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub step_id: String,
    pub name: String,
    pub stage: StepStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_index: Option<usize>,
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
    #[serde(default)]
    pub state: IndexMap<String, String>,
    /// Variables exported for later steps
    #[serde(default)]
    pub env: IndexMap<String, String>,
    /// Entries added to PATH for later steps
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub summary: String,
    pub outcome: Conclusion,
    pub conclusion: Conclusion,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepRun {
    pub fn new(step_id: impl Into<String>, name: impl Into<String>, stage: StepStage) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            stage,
            matrix_index: None,
            outputs: IndexMap::new(),
            state: IndexMap::new(),
            env: IndexMap::new(),
            paths: Vec::new(),
            summary: String::new(),
            outcome: Conclusion::Success,
            conclusion: Conclusion::Success,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Condensed step record kept in the job report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRunSummary {
    pub step_id: String,
    pub name: String,
    pub stage: StepStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_index: Option<usize>,
    pub outcome: Conclusion,
    pub conclusion: Conclusion,
}

impl From<&StepRun> for StepRunSummary {
    fn from(run: &StepRun) -> Self {
        Self {
            step_id: run.step_id.clone(),
            name: run.name.clone(),
            stage: run.stage,
            matrix_index: run.matrix_index,
            outcome: run.outcome,
            conclusion: run.conclusion,
        }
    }
}

/// One job, including all of its matrix combinations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub run_id: String,
    pub job_id: String,
    pub name: String,
    #[serde(default)]
    pub matrix: Vec<IndexMap<String, serde_json::Value>>,
    pub outcome: Conclusion,
    pub conclusion: Conclusion,
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
    #[serde(default)]
    pub steps: Vec<StepRunSummary>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRun {
    pub fn new(run_id: impl Into<String>, job_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            job_id: job_id.into(),
            name: name.into(),
            matrix: Vec::new(),
            outcome: Conclusion::Success,
            conclusion: Conclusion::Success,
            outputs: IndexMap::new(),
            steps: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// The workflow as a whole
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub name: String,
    pub conclusion: Conclusion,
    /// Job ids with their conclusions, in completion order
    #[serde(default)]
    pub jobs: IndexMap<String, Conclusion>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            conclusion: Conclusion::Success,
            jobs: IndexMap::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record a finished job and fold its conclusion
    pub fn record_job(&mut self, job_id: &str, conclusion: Conclusion) {
        self.jobs.insert(job_id.to_string(), conclusion);
        fold_conclusion(&mut self.conclusion, conclusion);
    }
}
