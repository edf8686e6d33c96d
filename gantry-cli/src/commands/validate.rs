use crate::commands::load_workflow;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use workflow_engine::{JobPlanner, WorkflowParser};

/// Validate a workflow YAML file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let path = &args.workflow;

    // Step 1: Parse YAML syntax
    output::status("Validating", &path.display().to_string());
    let workflow = match load_workflow(path) {
        Ok(workflow) => workflow,
        Err(e) => {
            output::error(&format!("Parse error: {}", e));
            std::process::exit(1);
        }
    };
    output::check("YAML syntax valid");

    let steps_count: usize = workflow.jobs.values().map(|j| j.steps.len()).sum();
    output::check(&format!(
        "Structure: {} jobs, {} steps, triggered by {}",
        workflow.jobs.len(),
        steps_count,
        workflow.on.events().join(", ")
    ));

    // Step 2: Semantic validation, including the job graph
    if let Err(e) = WorkflowParser::validate(&workflow) {
        output::error(&e.to_string());
        std::process::exit(1);
    }
    output::check("Semantic validation passed");

    // Step 3: Full plan
    let plan = JobPlanner::plan(&workflow, None)?;
    output::check(&format!("Job order: {}", plan.join(" -> ")));

    println!();
    output::success("Workflow is valid");
    Ok(())
}
