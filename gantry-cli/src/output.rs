// Output formatting helpers for CLI commands

use workflow_engine::execution::{Annotation, AnnotationLevel};
use workflow_engine::Conclusion;

/// Print a status message: "  Status message"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

/// Print a failure message with X
pub fn failure(message: &str) {
    eprintln!("\x1b[1;31m  \u{2717}\x1b[0m {}", message);
}

/// Print a check/pass item
pub fn check(message: &str) {
    eprintln!("\x1b[32m  \u{2713}\x1b[0m {}", message);
}

pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

/// Print a dim/muted message
pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}

/// Print a line colored by conclusion: green, red, yellow or dim
pub fn concluded(conclusion: Conclusion, message: &str) {
    let color = match conclusion {
        Conclusion::Success => "32",
        Conclusion::Failure => "31",
        Conclusion::Cancelled => "33",
        Conclusion::Skipped => "2",
    };
    eprintln!("\x1b[{}m{}\x1b[0m", color, message);
}

/// Print a job header
pub fn job_header(name: &str, matrix: Option<&str>, total_steps: usize) {
    match matrix {
        Some(matrix) => eprintln!("\x1b[1;34m    Job\x1b[0m '{}' ({}) ({} steps)", name, matrix, total_steps),
        None => eprintln!("\x1b[1;34m    Job\x1b[0m '{}' ({} steps)", name, total_steps),
    }
}

/// Print step output, indented by the open group depth
pub fn step_output(line: &str, depth: usize) {
    if let Some(message) = line.strip_prefix("##[error]") {
        eprintln!("\x1b[31m        {}| {}\x1b[0m", "  ".repeat(depth), message);
    } else {
        println!("        {}| {}", "  ".repeat(depth), line);
    }
}

/// Print a workflow command annotation with its location
pub fn annotation(level: AnnotationLevel, annotation: &Annotation) {
    let mut location = String::new();
    if let Some(file) = &annotation.file {
        location.push_str(file);
        if let Some(line) = annotation.line {
            location.push_str(&format!(":{}", line));
            if let Some(col) = annotation.col {
                location.push_str(&format!(":{}", col));
            }
        }
        location.push(' ');
    }
    let title = annotation
        .title
        .as_deref()
        .map(|t| format!("{}: ", t))
        .unwrap_or_default();
    let text = format!("        [{}] {}{}{}", level.as_str(), location, title, annotation.message);
    match level {
        AnnotationLevel::Error => eprintln!("\x1b[31m{}\x1b[0m", text),
        AnnotationLevel::Warning => eprintln!("\x1b[33m{}\x1b[0m", text),
        AnnotationLevel::Notice => eprintln!("\x1b[36m{}\x1b[0m", text),
        AnnotationLevel::Debug => dim(&text),
    }
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}
