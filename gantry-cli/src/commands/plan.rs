use crate::commands::load_workflow;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::eyre;
use color_eyre::Result;

use workflow_engine::execution::graph::parallel_levels;
use workflow_engine::workflow::Workflow;
use workflow_engine::{JobPlanner, MatrixExpander};

/// Show the order jobs would run in
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,

    /// Plan only this job and the jobs it needs
    #[arg(long, value_name = "JOB")]
    pub job: Option<String>,
}

/// One planned job as printed by `gantry plan`
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedJob {
    pub id: String,
    pub name: String,
    pub needs: Vec<String>,
    /// Matrix combinations; 1 for a job without a matrix
    pub runs: usize,
}

pub fn planned_jobs(workflow: &Workflow, job: Option<&str>) -> Result<Vec<PlannedJob>> {
    let order = JobPlanner::plan(workflow, job).map_err(|e| eyre!("{}", e))?;
    order
        .into_iter()
        .map(|id| {
            let job = workflow
                .jobs
                .get(&id)
                .ok_or_else(|| eyre!("planned job '{}' is not declared", id))?;
            let runs = job.matrix().map(|m| MatrixExpander::expand(m).len()).unwrap_or(0).max(1);
            Ok(PlannedJob {
                name: job.display_name(&id),
                needs: job.needs.to_vec(),
                runs,
                id,
            })
        })
        .collect()
}

pub fn execute(args: PlanArgs) -> Result<()> {
    let workflow = load_workflow(&args.workflow)?;
    let jobs = planned_jobs(&workflow, args.job.as_deref())?;

    output::header(&format!("Plan for '{}'", workflow.display_name("workflow")));
    for (position, job) in jobs.iter().enumerate() {
        let needs = if job.needs.is_empty() {
            String::new()
        } else {
            format!(" needs [{}]", job.needs.join(", "))
        };
        let runs = if job.runs == 1 {
            "1 run".to_string()
        } else {
            format!("{} matrix runs", job.runs)
        };
        println!("  {:>2}. {} ({}){} - {}", position + 1, job.id, job.name, needs, runs);
    }

    let order: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();
    let levels = parallel_levels(&workflow, &order);
    if levels.len() < order.len() {
        println!();
        output::dim("  Jobs that can run together with --parallel:");
        for (level, ids) in levels.iter().enumerate() {
            output::dim(&format!("    {}: {}", level + 1, ids.join(", ")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_engine::WorkflowParser;

    const WORKFLOW: &str = r#"
on: push
jobs:
  lint:
    steps: [{ run: lint }]
  test:
    name: Unit tests
    strategy:
      matrix:
        os: [linux, mac]
        rust: [stable, beta]
        exclude:
          - os: mac
            rust: beta
    steps: [{ run: test }]
  release:
    needs: [lint, test]
    steps: [{ run: release }]
"#;

    #[test]
    fn test_planned_jobs_with_matrix_sizes() {
        let workflow = WorkflowParser::parse(WORKFLOW).unwrap();
        let jobs = planned_jobs(&workflow, None).unwrap();

        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["lint", "test", "release"]);
        assert_eq!(jobs[1].name, "Unit tests");
        assert_eq!(jobs[1].runs, 3);
        assert_eq!(jobs[0].runs, 1);
        assert_eq!(jobs[2].needs, vec!["lint", "test"]);
    }

    #[test]
    fn test_plan_single_job() {
        let workflow = WorkflowParser::parse(WORKFLOW).unwrap();
        let jobs = planned_jobs(&workflow, Some("lint")).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(planned_jobs(&workflow, Some("nope")).is_err());
    }
}
