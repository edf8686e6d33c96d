pub mod plan;
pub mod run;
pub mod validate;

use std::path::Path;

use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;

use workflow_engine::{Workflow, WorkflowParser};

/// Read a workflow file without validating it
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    if !path.exists() {
        bail!("Workflow file not found: {}", path.display());
    }
    WorkflowParser::from_file(path).map_err(|e| eyre!("{}: {}", path.display(), e))
}

/// Split repeated `NAME=VALUE` flags
pub fn parse_pairs(values: &[String], flag: &str) -> Result<Vec<(String, String)>> {
    values
        .iter()
        .map(|raw| match raw.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
            _ => Err(eyre!("Invalid --{} '{}'. Expected NAME=VALUE", flag, raw)),
        })
        .collect()
}
