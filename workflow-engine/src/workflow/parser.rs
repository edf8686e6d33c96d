use crate::execution::graph::JobPlanner;
use crate::workflow::models::Workflow;
use crate::{RunnerError, RunnerResult};

use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Parser for GitHub Actions workflow YAML files.
pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> RunnerResult<Workflow> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a workflow from a YAML string.
    pub fn parse(content: &str) -> RunnerResult<Workflow> {
        let workflow: Workflow = serde_yaml::from_str(content)?;
        Ok(workflow)
    }

    /// Parse and validate a workflow from a YAML string.
    pub fn parse_and_validate(content: &str) -> RunnerResult<Workflow> {
        let workflow = Self::parse(content)?;
        Self::validate(&workflow)?;
        Ok(workflow)
    }

    /// Validate a parsed workflow for semantic correctness.
    pub fn validate(workflow: &Workflow) -> RunnerResult<()> {
        if workflow.jobs.is_empty() {
            return Err(RunnerError::Parse("workflow declares no jobs".to_string()));
        }

        // Unknown needs and cycles are both planning failures
        JobPlanner::plan(workflow, None)?;

        for (job_id, job) in &workflow.jobs {
            if job.steps.is_empty() {
                return Err(RunnerError::Parse(format!("job '{}' has no steps", job_id)));
            }

            let mut seen = HashSet::new();
            for (step_idx, step) in job.steps.iter().enumerate() {
                let step_name = step.name.as_deref().unwrap_or("unnamed");
                match (step.run.is_some(), step.uses.is_some()) {
                    (false, false) => {
                        return Err(RunnerError::Parse(format!(
                            "step {} '{}' in job '{}' must have either 'run' or 'uses'",
                            step_idx, step_name, job_id
                        )))
                    }
                    (true, true) => {
                        return Err(RunnerError::Parse(format!(
                            "step {} '{}' in job '{}' cannot have both 'run' and 'uses'",
                            step_idx, step_name, job_id
                        )))
                    }
                    _ => {}
                }

                let id = step.id_or_index(step_idx);
                if !seen.insert(id.clone()) {
                    return Err(RunnerError::Parse(format!(
                        "duplicate step id '{}' in job '{}'",
                        id, job_id
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_workflow() {
        let yaml = r#"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: echo "Hello"
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        assert!(workflow.name.is_none());
        assert!(workflow.jobs.contains_key("build"));
    }

    #[test]
    fn test_validate_missing_dependency() {
        let yaml = r#"
on: push
jobs:
  test:
    needs: build
    steps:
      - run: cargo test
"#;
        let err = WorkflowParser::parse_and_validate(yaml).unwrap_err();
        assert!(matches!(err, RunnerError::Planning(_)));
        assert!(err.to_string().contains("build"));
    }

    #[test]
    fn test_validate_circular_dependency() {
        let yaml = r#"
on: push
jobs:
  a:
    needs: c
    steps: [{run: echo a}]
  b:
    needs: a
    steps: [{run: echo b}]
  c:
    needs: b
    steps: [{run: echo c}]
"#;
        let err = WorkflowParser::parse_and_validate(yaml).unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_validate_empty_job() {
        let yaml = r#"
on: push
jobs:
  build:
    steps: []
"#;
        let err = WorkflowParser::parse_and_validate(yaml).unwrap_err();
        assert!(err.to_string().contains("no steps"));
    }

    #[test]
    fn test_validate_step_without_run_or_uses() {
        let yaml = r#"
on: push
jobs:
  build:
    steps:
      - name: Nothing
"#;
        let err = WorkflowParser::parse_and_validate(yaml).unwrap_err();
        assert!(err.to_string().contains("either 'run' or 'uses'"));
    }

    #[test]
    fn test_validate_step_with_both_run_and_uses() {
        let yaml = r#"
on: push
jobs:
  build:
    steps:
      - run: echo
        uses: actions/checkout@v4
"#;
        let err = WorkflowParser::parse_and_validate(yaml).unwrap_err();
        assert!(err.to_string().contains("cannot have both"));
    }

    #[test]
    fn test_validate_duplicate_step_ids() {
        let yaml = r#"
on: push
jobs:
  build:
    steps:
      - id: one
        run: echo a
      - id: one
        run: echo b
"#;
        let err = WorkflowParser::parse_and_validate(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate step id"));
    }

    #[test]
    fn test_validate_no_jobs() {
        let err = WorkflowParser::parse_and_validate("on: push\njobs: {}\n").unwrap_err();
        assert!(err.to_string().contains("no jobs"));
    }

    #[test]
    fn test_parse_complex_workflow() {
        let yaml = r#"
name: Release
on:
  push:
    branches: [main]
env:
  CARGO_TERM_COLOR: always
jobs:
  build:
    strategy:
      matrix:
        os: [ubuntu-latest, macos-latest]
    steps:
      - uses: actions/checkout@v4
      - id: version
        run: echo "version=1.0.0" >> $GITHUB_OUTPUT
    outputs:
      version: ${{ steps.version.outputs.version }}
  publish:
    needs: build
    if: github.ref == 'refs/heads/main'
    steps:
      - run: echo ${{ needs.build.outputs.version }}
"#;
        let workflow = WorkflowParser::parse_and_validate(yaml).unwrap();
        assert_eq!(workflow.name.as_deref(), Some("Release"));
        assert_eq!(workflow.jobs.len(), 2);
        assert!(workflow.jobs["build"].matrix().is_some());
    }
}
