// Run Store
// Flat JSON reports for workflow, job and step runs

use crate::execution::report::{JobRun, StepRun, WorkflowRun};
use crate::utils::sanitize_file_name;
use crate::RunnerResult;

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const WORKFLOW_REPORT: &str = "workflow_run.json";
const JOB_REPORT: &str = "job_run.json";
const STEP_REPORT: &str = "step_run.json";
const SUMMARY_FILE: &str = "summary.md";

/// Durable store rooted at `<state_dir>/run`.
///
/// ```text
/// run/workflow_run.json
/// run/jobs/<job>/job_run.json
/// run/jobs/<job>/steps/<step>/step_run.json
/// run/jobs/<job>/matrix-<n>/steps/<step>/step_run.json
/// ```
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            root: state_dir.as_ref().join("run"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove reports left by a previous run
    pub fn reset(&self) -> RunnerResult<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn workflow_report_path(&self) -> PathBuf {
        self.root.join(WORKFLOW_REPORT)
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join("jobs").join(sanitize_file_name(job_id))
    }

    pub fn job_report_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(JOB_REPORT)
    }

    pub fn step_dir(&self, job_id: &str, matrix_index: Option<usize>, step_id: &str) -> PathBuf {
        let base = match matrix_index {
            Some(n) => self.job_dir(job_id).join(format!("matrix-{}", n)),
            None => self.job_dir(job_id),
        };
        base.join("steps").join(sanitize_file_name(step_id))
    }

    pub fn write_workflow(&self, run: &WorkflowRun) -> RunnerResult<()> {
        write_json(&self.workflow_report_path(), run)
    }

    pub fn read_workflow(&self) -> RunnerResult<Option<WorkflowRun>> {
        read_json(&self.workflow_report_path())
    }

    pub fn write_job(&self, run: &JobRun) -> RunnerResult<()> {
        write_json(&self.job_report_path(&run.job_id), run)
    }

    pub fn read_job(&self, job_id: &str) -> RunnerResult<Option<JobRun>> {
        read_json(&self.job_report_path(job_id))
    }

    /// Write the step report and its summary file
    pub fn write_step(&self, job_id: &str, run: &StepRun) -> RunnerResult<()> {
        let dir = self.step_dir(job_id, run.matrix_index, &run.step_id);
        write_json(&dir.join(STEP_REPORT), run)?;
        fs::write(dir.join(SUMMARY_FILE), &run.summary)?;
        Ok(())
    }

    pub fn read_step(
        &self,
        job_id: &str,
        matrix_index: Option<usize>,
        step_id: &str,
    ) -> RunnerResult<Option<StepRun>> {
        read_json(&self.step_dir(job_id, matrix_index, step_id).join(STEP_REPORT))
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> RunnerResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    debug!(path = %path.display(), "wrote report");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> RunnerResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::report::{Conclusion, StepStage};

    #[test]
    fn test_job_report_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let mut run = JobRun::new("run-1", "build", "Build");
        run.conclusion = Conclusion::Failure;
        run.outputs.insert("version".into(), "1.0".into());
        store.write_job(&run).unwrap();

        assert!(dir.path().join("run/jobs/build/job_run.json").exists());
        let loaded = store.read_job("build").unwrap().unwrap();
        assert_eq!(loaded.conclusion, Conclusion::Failure);
        assert_eq!(loaded.outputs["version"], "1.0");
        assert!(store.read_job("missing").unwrap().is_none());
    }

    #[test]
    fn test_step_report_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let mut run = StepRun::new("compile", "Compile", StepStage::Main);
        run.summary = "# Done".into();
        store.write_step("build", &run).unwrap();
        assert!(dir.path().join("run/jobs/build/steps/compile/step_run.json").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("run/jobs/build/steps/compile/summary.md")).unwrap(),
            "# Done"
        );

        run.matrix_index = Some(1);
        store.write_step("build", &run).unwrap();
        let loaded = store.read_step("build", Some(1), "compile").unwrap().unwrap();
        assert_eq!(loaded.matrix_index, Some(1));
    }

    #[test]
    fn test_reset_clears_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        store.write_job(&JobRun::new("r", "old", "old")).unwrap();
        store.reset().unwrap();
        assert!(store.read_job("old").unwrap().is_none());
        assert!(store.root().exists());
    }
}
