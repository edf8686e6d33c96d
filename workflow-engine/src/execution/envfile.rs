// Environment Files
// GITHUB_ENV / GITHUB_PATH / GITHUB_OUTPUT / GITHUB_STATE / GITHUB_STEP_SUMMARY handling

use crate::execution::context::ExecutionContext;
use crate::{RunnerError, RunnerResult};

use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-stage files a step process appends to
#[derive(Debug, Clone)]
pub struct EnvFiles {
    dir: PathBuf,
    env: PathBuf,
    path: PathBuf,
    output: PathBuf,
    state: PathBuf,
    summary: PathBuf,
}

/// What a stage wrote to its files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvFileContents {
    pub env: IndexMap<String, String>,
    pub paths: Vec<String>,
    pub outputs: IndexMap<String, String>,
    pub state: IndexMap<String, String>,
    pub summary: String,
}

impl EnvFiles {
    /// Create empty files in a fresh directory under `temp_dir`
    pub fn create(temp_dir: &Path) -> RunnerResult<Self> {
        let dir = temp_dir.join(format!("files-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir)?;

        let files = Self {
            env: dir.join("env"),
            path: dir.join("path"),
            output: dir.join("output"),
            state: dir.join("state"),
            summary: dir.join("step_summary"),
            dir,
        };
        for file in [&files.env, &files.path, &files.output, &files.state, &files.summary] {
            fs::write(file, "")?;
        }
        Ok(files)
    }

    /// Directory holding the files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Variables pointing the process at the files
    pub fn exports(&self) -> IndexMap<String, String> {
        let mut vars = IndexMap::new();
        for (name, path) in [
            ("GITHUB_ENV", &self.env),
            ("GITHUB_PATH", &self.path),
            ("GITHUB_OUTPUT", &self.output),
            ("GITHUB_STATE", &self.state),
            ("GITHUB_STEP_SUMMARY", &self.summary),
        ] {
            vars.insert(name.to_string(), path.to_string_lossy().to_string());
        }
        vars
    }

    pub fn collect(&self) -> RunnerResult<EnvFileContents> {
        Ok(EnvFileContents {
            env: parse_key_values(&read(&self.env)?)?,
            paths: read(&self.path)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            outputs: parse_key_values(&read(&self.output)?)?,
            state: parse_key_values(&read(&self.state)?)?,
            summary: read(&self.summary)?,
        })
    }

    /// Parse the files and apply them to the open step
    pub fn apply(&self, ctx: &mut ExecutionContext) -> RunnerResult<()> {
        let contents = self.collect()?;
        for (name, value) in &contents.env {
            ctx.set_step_env(name, value)?;
        }
        for path in &contents.paths {
            ctx.add_step_path(path)?;
        }
        for (name, value) in &contents.outputs {
            ctx.set_step_output(name, value)?;
        }
        for (name, value) in &contents.state {
            ctx.set_step_state(name, value)?;
        }
        if !contents.summary.is_empty() {
            ctx.set_step_summary(&contents.summary)?;
        }
        Ok(())
    }

    pub fn remove(&self) -> RunnerResult<()> {
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

fn read(path: &Path) -> RunnerResult<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err.into()),
    }
}

/// Parse `key=value` lines and `key<<DELIMITER` heredocs.
///
/// Blank lines are ignored. A heredoc runs until a line equal to its
/// delimiter; its lines are joined with `\n`.
pub fn parse_key_values(content: &str) -> RunnerResult<IndexMap<String, String>> {
    let mut values = IndexMap::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let heredoc = line.find("<<");
        let equals = line.find('=');
        match (heredoc, equals) {
            (Some(h), eq) if eq.map_or(true, |e| h < e) => {
                let key = &line[..h];
                let delimiter = &line[h + 2..];
                if key.is_empty() || delimiter.is_empty() {
                    return Err(RunnerError::execution(format!("invalid heredoc line: '{}'", line)));
                }
                let mut body = Vec::new();
                let mut closed = false;
                for next in lines.by_ref() {
                    let next = next.trim_end_matches('\r');
                    if next == delimiter {
                        closed = true;
                        break;
                    }
                    body.push(next);
                }
                if !closed {
                    return Err(RunnerError::execution(format!(
                        "missing delimiter '{}' for '{}'",
                        delimiter, key
                    )));
                }
                values.insert(key.to_string(), body.join("\n"));
            }
            (_, Some(e)) if e > 0 => {
                values.insert(line[..e].to_string(), line[e + 1..].to_string());
            }
            _ => {
                return Err(RunnerError::execution(format!(
                    "invalid environment file line: '{}'",
                    line
                )))
            }
        }
    }

    Ok(values)
}
