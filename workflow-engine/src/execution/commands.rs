// Workflow Commands
// Parses `::name k=v::message` and `##[name k=v]message` lines from step output

use crate::execution::context::ExecutionContext;
use crate::execution::events::{Annotation, AnnotationLevel, ExecutionEvent};
use crate::RunnerResult;

use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, error, info, warn};

// Word and space classes are spelled out as ASCII; `\w` and `\s` would also
// match Unicode letters and spaces.
const COMMAND_PATTERN: &str =
    r"^::([0-9A-Za-z_-]+)(?:[\t\n\f\r ]+((?:[0-9A-Za-z_-]+=[^,]+,)*[0-9A-Za-z_-]+=[^,]+))??::(.*?)$";
const LEGACY_PATTERN: &str = r"##\[([^\t\n\f\r ]+)([^\]]*)\](.*)?$";

// Both patterns are constants covered by the tests below, so compiling them cannot fail at runtime.
static COMMAND_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(COMMAND_PATTERN).expect("Invalid command pattern"));
static LEGACY_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(LEGACY_PATTERN).expect("Invalid legacy pattern"));

/// A parsed command line
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowCommand {
    pub name: String,
    pub parameters: IndexMap<String, String>,
    pub value: String,
}

/// Parse one output line; anything that is not a command yields `None`.
pub fn parse_command(line: &str) -> Option<WorkflowCommand> {
    if let Some(caps) = COMMAND_REGEX.captures(line) {
        let parameters = caps
            .get(2)
            .map(|m| parse_parameters(m.as_str(), ','))
            .unwrap_or_default();
        return Some(WorkflowCommand {
            name: caps[1].to_string(),
            parameters,
            value: unescape_data(caps.get(3).map_or("", |m| m.as_str())),
        });
    }

    let caps = LEGACY_REGEX.captures(line)?;
    Some(WorkflowCommand {
        name: caps[1].to_string(),
        parameters: parse_parameters(caps.get(2).map_or("", |m| m.as_str()), ';'),
        value: unescape_data(caps.get(3).map_or("", |m| m.as_str())),
    })
}

fn parse_parameters(raw: &str, separator: char) -> IndexMap<String, String> {
    raw.split(separator)
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            Some((key.to_string(), unescape_property(value)))
        })
        .collect()
}

fn unescape_data(value: &str) -> String {
    value
        .replace("%0D", "\r")
        .replace("%0A", "\n")
        .replace("%25", "%")
}

fn unescape_property(value: &str) -> String {
    value
        .replace("%0D", "\r")
        .replace("%0A", "\n")
        .replace("%3A", ":")
        .replace("%2C", ",")
        .replace("%25", "%")
}

/// Commands the processor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Group,
    EndGroup,
    Debug,
    Notice,
    Warning,
    Error,
    SetEnv,
    SetOutput,
    SaveState,
    AddMask,
    AddMatcher,
    AddPath,
}

impl CommandKind {
    pub const ALL: [CommandKind; 12] = [
        CommandKind::Group,
        CommandKind::EndGroup,
        CommandKind::Debug,
        CommandKind::Notice,
        CommandKind::Warning,
        CommandKind::Error,
        CommandKind::SetEnv,
        CommandKind::SetOutput,
        CommandKind::SaveState,
        CommandKind::AddMask,
        CommandKind::AddMatcher,
        CommandKind::AddPath,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "group" => CommandKind::Group,
            "endgroup" => CommandKind::EndGroup,
            "debug" => CommandKind::Debug,
            "notice" => CommandKind::Notice,
            "warning" => CommandKind::Warning,
            "error" => CommandKind::Error,
            "set-env" => CommandKind::SetEnv,
            "set-output" => CommandKind::SetOutput,
            "save-state" => CommandKind::SaveState,
            "add-mask" => CommandKind::AddMask,
            "add-matcher" => CommandKind::AddMatcher,
            "add-path" => CommandKind::AddPath,
            _ => return None,
        };
        Some(kind)
    }

    /// Commands that change the execution context
    pub fn mutates_context(&self) -> bool {
        matches!(
            self,
            CommandKind::SetEnv | CommandKind::SetOutput | CommandKind::SaveState | CommandKind::AddPath
        )
    }
}

/// What processing a line amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum LineDisposition {
    /// Plain output, to be shown as-is
    Output(String),
    /// A command this processor handled
    Handled(CommandKind),
    /// A command excluded from this processor
    Ignored(CommandKind),
}

/// Applies workflow commands found in step output.
///
/// An instance only handles the commands not in its exclusion set, so one
/// output stream can be fed through a logging processor and an environment
/// processor without duplicating either effect.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    excluded: HashSet<CommandKind>,
    group_depth: usize,
}

impl CommandProcessor {
    pub fn new(excluded: impl IntoIterator<Item = CommandKind>) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
            group_depth: 0,
        }
    }

    /// Handles only log-facing commands
    pub fn logging() -> Self {
        Self::new(CommandKind::ALL.into_iter().filter(CommandKind::mutates_context))
    }

    /// Handles only context-mutating commands
    pub fn environment() -> Self {
        Self::new(CommandKind::ALL.into_iter().filter(|k| !k.mutates_context()))
    }

    /// Current `::group::` nesting
    pub fn depth(&self) -> usize {
        self.group_depth
    }

    pub fn handles(&self, kind: CommandKind) -> bool {
        !self.excluded.contains(&kind)
    }

    pub fn process(&mut self, line: &str, ctx: &mut ExecutionContext) -> RunnerResult<LineDisposition> {
        let Some(command) = parse_command(line) else {
            return Ok(LineDisposition::Output(line.to_string()));
        };
        let Some(kind) = CommandKind::from_name(&command.name) else {
            debug!(command = %command.name, "unknown workflow command");
            return Ok(LineDisposition::Output(line.to_string()));
        };
        if !self.handles(kind) {
            return Ok(LineDisposition::Ignored(kind));
        }

        let job_id = ctx.job_id().unwrap_or_default().to_string();
        let step_id = ctx.step_id().unwrap_or_default().to_string();
        let name = command.parameters.get("name").cloned();

        match kind {
            CommandKind::Group => {
                info!(job = %job_id, step = %step_id, "group: {}", command.value);
                self.group_depth += 1;
            }
            CommandKind::EndGroup => {
                self.group_depth = self.group_depth.saturating_sub(1);
            }
            CommandKind::Debug | CommandKind::Notice | CommandKind::Warning | CommandKind::Error => {
                let level = match kind {
                    CommandKind::Debug => AnnotationLevel::Debug,
                    CommandKind::Notice => AnnotationLevel::Notice,
                    CommandKind::Warning => AnnotationLevel::Warning,
                    _ => AnnotationLevel::Error,
                };
                let annotation = annotation_from(&command);
                log_annotation(&job_id, &step_id, level, &annotation);
                ctx.emit(ExecutionEvent::annotation(job_id, step_id, level, annotation));
            }
            CommandKind::SetEnv => match name {
                Some(name) => ctx.set_step_env(&name, &command.value)?,
                None => warn!(step = %step_id, "set-env without a name"),
            },
            CommandKind::SetOutput => match name {
                Some(name) => ctx.set_step_output(&name, &command.value)?,
                None => warn!(step = %step_id, "set-output without a name"),
            },
            CommandKind::SaveState => match name {
                Some(name) => ctx.set_step_state(&name, &command.value)?,
                None => warn!(step = %step_id, "save-state without a name"),
            },
            CommandKind::AddPath => ctx.add_step_path(&command.value)?,
            CommandKind::AddMask => {
                debug!(step = %step_id, "mask registered ({} chars)", command.value.len());
            }
            CommandKind::AddMatcher => {
                debug!(step = %step_id, matcher = %command.value, "problem matcher registered");
            }
        }

        Ok(LineDisposition::Handled(kind))
    }
}

fn annotation_from(command: &WorkflowCommand) -> Annotation {
    let number = |key: &str| command.parameters.get(key).and_then(|v| v.trim().parse().ok());
    Annotation {
        message: command.value.clone(),
        title: command.parameters.get("title").cloned(),
        file: command.parameters.get("file").cloned(),
        line: number("line"),
        col: number("col"),
        end_line: number("endLine"),
        end_column: number("endColumn"),
    }
}

fn log_annotation(job_id: &str, step_id: &str, level: AnnotationLevel, a: &Annotation) {
    let file = a.file.as_deref().unwrap_or("");
    let title = a.title.as_deref().unwrap_or("");
    match level {
        AnnotationLevel::Debug => debug!(job = %job_id, step = %step_id, file, line = a.line, title, "{}", a.message),
        AnnotationLevel::Notice => info!(job = %job_id, step = %step_id, file, line = a.line, col = a.col, end_line = a.end_line, end_column = a.end_column, title, "{}", a.message),
        AnnotationLevel::Warning => warn!(job = %job_id, step = %step_id, file, line = a.line, col = a.col, end_line = a.end_line, end_column = a.end_column, title, "{}", a.message),
        AnnotationLevel::Error => error!(job = %job_id, step = %step_id, file, line = a.line, col = a.col, end_line = a.end_line, end_column = a.end_column, title, "{}", a.message),
    }
}
