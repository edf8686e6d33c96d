use crate::commands::{load_workflow, parse_pairs};
use crate::output;

use std::path::PathBuf;
use std::thread;

use clap::Args;
use color_eyre::eyre::eyre;
use color_eyre::Result;

use workflow_engine::execution::Journal;
use workflow_engine::{
    event_journal, Conclusion, EvalMode, ExecutionEvent, ExecutorConfig, JournalEntry, WorkflowExecutor,
    WorkflowParser,
};

/// Run a workflow locally
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,

    /// Run only this job and the jobs it needs
    #[arg(long, value_name = "JOB")]
    pub job: Option<String>,

    /// Load executor settings from a YAML file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Set a secret (can be repeated)
    #[arg(long = "secret", value_name = "NAME=VALUE")]
    pub secrets: Vec<String>,

    /// Set a workflow input (can be repeated)
    #[arg(long = "input", value_name = "NAME=VALUE")]
    pub inputs: Vec<String>,

    /// Fail on expression errors instead of substituting ''
    #[arg(long)]
    pub strict: bool,

    /// Number of jobs allowed to run at once
    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Event name exposed as github.event_name
    #[arg(long, value_name = "NAME")]
    pub event: Option<String>,

    /// Workspace directory (default: enclosing git repository)
    #[arg(long, short = 'w', value_name = "DIR")]
    pub workspace: Option<PathBuf>,
}

impl RunArgs {
    /// Config file (or defaults) with the command line applied on top
    pub fn config(&self) -> Result<ExecutorConfig> {
        let mut config = match &self.config {
            Some(path) => ExecutorConfig::from_file(path).map_err(|e| eyre!("{}: {}", path.display(), e))?,
            None => ExecutorConfig::new(),
        };

        if let Some(workspace) = &self.workspace {
            config = config.with_workspace(std::fs::canonicalize(workspace)?);
        }
        for (name, value) in parse_pairs(&self.secrets, "secret")? {
            config = config.with_secret(name, value);
        }
        for (name, value) in parse_pairs(&self.inputs, "input")? {
            config = config.with_input(name, value);
        }
        if self.strict {
            config = config.with_eval_mode(EvalMode::Strict);
        }
        if let Some(parallel) = self.parallel {
            config = config.with_max_parallel_jobs(parallel);
        }
        if let Some(event) = &self.event {
            let payload = config.event.clone();
            config = config.with_event(event.clone(), payload);
        }
        Ok(config)
    }
}

pub async fn execute(args: RunArgs) -> Result<()> {
    output::status("Parsing", &args.workflow.display().to_string());
    let workflow = load_workflow(&args.workflow)?;
    WorkflowParser::validate(&workflow).map_err(|e| eyre!("Invalid workflow: {}", e))?;
    let config = args.config()?;

    output::info(&format!(
        "Workflow '{}': {} jobs, workspace {}",
        workflow.display_name("workflow"),
        workflow.jobs.len(),
        config.workspace.display()
    ));

    let journal = event_journal();
    let renderer = {
        let journal = journal.clone();
        thread::spawn(move || render(&journal))
    };

    let executor = WorkflowExecutor::new(config).with_journal(journal.clone());
    let result = executor.execute(workflow, args.job.as_deref()).await;
    journal.close();
    if renderer.join().is_err() {
        output::warning("progress output stopped early");
    }

    let run = result.map_err(|e| eyre!("Run aborted: {}", e))?;
    if !run.conclusion.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Drain the journal until it is closed, printing every event
fn render(journal: &Journal<ExecutionEvent>) {
    while let JournalEntry::Entry(event) = journal.read_entry() {
        render_event(&event);
    }
}

fn render_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::WorkflowStarted {
            workflow_name,
            run_id,
            total_jobs,
        } => {
            println!();
            output::header(&format!("Workflow '{}' ({} jobs)", workflow_name, total_jobs));
            output::dim(&format!("  run {}", run_id));
        }

        ExecutionEvent::WorkflowCompleted {
            workflow_name,
            conclusion,
            duration,
        } => {
            println!();
            let message = format!(
                "Workflow '{}' {} in {:.2}s",
                workflow_name,
                conclusion,
                duration.as_secs_f64()
            );
            if conclusion.is_success() {
                output::success(&message);
            } else {
                output::failure(&message);
            }
        }

        ExecutionEvent::JobStarted {
            job_id,
            display_name,
            matrix_instance,
            total_steps,
        } => {
            let label = if display_name.is_empty() { job_id } else { display_name };
            output::job_header(label, matrix_instance.as_deref(), *total_steps);
        }

        ExecutionEvent::JobCompleted {
            job_id,
            conclusion,
            duration,
        } => {
            output::concluded(
                *conclusion,
                &format!("    Job '{}' {} ({:.2}s)", job_id, conclusion, duration.as_secs_f64()),
            );
        }

        ExecutionEvent::JobSkipped { job_id, reason } => {
            output::warning(&format!("    Job '{}' skipped: {}", job_id, reason));
        }

        ExecutionEvent::StepStarted {
            display_name, stage, ..
        } => match stage {
            workflow_engine::execution::StepStage::Main => println!("      [Step] {}", display_name),
            other => println!("      [Step] {} ({})", display_name, other),
        },

        ExecutionEvent::StepOutput { output, depth, .. } => {
            for line in output.lines() {
                output::step_output(line, *depth);
            }
        }

        ExecutionEvent::StepCompleted {
            outcome,
            conclusion,
            duration,
            exit_code,
            ..
        } => {
            let exit_info = match exit_code {
                Some(code) if *code != 0 => format!(" (exit code: {})", code),
                _ => String::new(),
            };
            let outcome_info = if outcome != conclusion {
                format!(" [outcome {}]", outcome)
            } else {
                String::new()
            };
            output::concluded(
                *conclusion,
                &format!(
                    "        {} ({:.2}s){}{}",
                    conclusion.as_str().to_uppercase(),
                    duration.as_secs_f64(),
                    exit_info,
                    outcome_info
                ),
            );
        }

        ExecutionEvent::StepSkipped {
            step_id, stage, reason, ..
        } => {
            output::concluded(
                Conclusion::Skipped,
                &format!("      [Step] {} ({}) skipped: {}", step_id, stage, reason),
            );
        }

        ExecutionEvent::Annotation {
            level, annotation, ..
        } => output::annotation(*level, annotation),
    }
}
