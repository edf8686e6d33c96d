// Built-in Functions for Workflow Expressions
// String helpers, JSON conversion, hashFiles and the job status functions

use crate::expression::evaluator::{values_equal, EvalError, VariableProvider};
use crate::expression::value::Value;

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Registry of built-in functions
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinFunctions;

impl BuiltinFunctions {
    pub fn new() -> Self {
        Self
    }

    /// Call a built-in function; names are case-insensitive
    pub fn call(
        &self,
        name: &str,
        args: Vec<Value>,
        provider: &dyn VariableProvider,
    ) -> Result<Value, EvalError> {
        match name.to_lowercase().as_str() {
            // String functions
            "contains" => self.fn_contains(args),
            "startswith" => self.fn_startswith(args),
            "endswith" => self.fn_endswith(args),
            "format" => self.fn_format(args),
            "join" => self.fn_join(args),

            // Conversion functions
            "tojson" => self.fn_to_json(args),
            "fromjson" => self.fn_from_json(args),

            // Filesystem
            "hashfiles" => self.fn_hash_files(args, provider),

            // Status functions
            "success" => self.status_is(args, provider, "success"),
            "failure" => self.status_is(args, provider, "failure"),
            "cancelled" => self.status_is(args, provider, "cancelled"),
            "always" => {
                self.require_args(&args, 0, "always")?;
                Ok(Value::Bool(true))
            }

            _ => Err(EvalError::new(format!("unknown function: {}", name))),
        }
    }

    fn fn_contains(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 2, "contains")?;

        match (&args[0], &args[1]) {
            (Value::Array(items), needle) => {
                Ok(Value::Bool(items.iter().any(|item| values_equal(item, needle))))
            }
            (haystack, needle) => Ok(Value::Bool(
                haystack
                    .as_string()
                    .to_lowercase()
                    .contains(&needle.as_string().to_lowercase()),
            )),
        }
    }

    fn fn_startswith(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 2, "startsWith")?;
        let s = args[0].as_string().to_lowercase();
        let prefix = args[1].as_string().to_lowercase();
        Ok(Value::Bool(s.starts_with(&prefix)))
    }

    fn fn_endswith(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 2, "endsWith")?;
        let s = args[0].as_string().to_lowercase();
        let suffix = args[1].as_string().to_lowercase();
        Ok(Value::Bool(s.ends_with(&suffix)))
    }

    /// `format('{0} {1}', a, b)` with `{{` and `}}` as literal braces
    fn fn_format(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let Some((template, rest)) = args.split_first() else {
            return Err(EvalError::new("format() requires at least 1 argument"));
        };

        let template = template.as_string();
        let chars: Vec<char> = template.chars().collect();
        let mut out = String::with_capacity(template.len());
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '{' if chars.get(i + 1) == Some(&'{') => {
                    out.push('{');
                    i += 2;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    out.push('}');
                    i += 2;
                }
                '{' => {
                    let close = chars[i + 1..]
                        .iter()
                        .position(|c| *c == '}')
                        .map(|p| i + 1 + p)
                        .ok_or_else(|| {
                            EvalError::new(format!("format(): unclosed '{{' in '{}'", template))
                        })?;
                    let digits: String = chars[i + 1..close].iter().collect();
                    let index: usize = digits.parse().map_err(|_| {
                        EvalError::new(format!("format(): invalid placeholder '{{{}}}'", digits))
                    })?;
                    let arg = rest.get(index).ok_or_else(|| {
                        EvalError::new(format!(
                            "format(): placeholder {{{}}} has no matching argument",
                            index
                        ))
                    })?;
                    out.push_str(&arg.as_string());
                    i = close + 1;
                }
                '}' => {
                    return Err(EvalError::new(format!(
                        "format(): unmatched '}}' in '{}'",
                        template
                    )))
                }
                c => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        Ok(Value::String(out))
    }

    fn fn_join(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        if args.is_empty() || args.len() > 2 {
            return Err(EvalError::new(format!(
                "join() requires 1 or 2 argument(s), got {}",
                args.len()
            )));
        }

        let separator = args.get(1).map(Value::as_string).unwrap_or_else(|| ",".to_string());

        match &args[0] {
            Value::Array(items) => {
                let strings: Vec<String> = items.iter().map(Value::as_string).collect();
                Ok(Value::String(strings.join(&separator)))
            }
            other if other.is_primitive() => Ok(Value::String(other.as_string())),
            _ => Ok(Value::String(String::new())),
        }
    }

    fn fn_to_json(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "toJSON")?;
        Ok(Value::String(args[0].to_json()))
    }

    fn fn_from_json(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "fromJSON")?;
        let text = args[0].as_string();
        let parsed: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| EvalError::new(format!("fromJSON(): {}", e)))?;
        Ok(Value::from(parsed))
    }

    /// SHA-256 over the per-file digests of every file matched under the
    /// workspace; `!pattern` excludes. No match yields an empty string.
    fn fn_hash_files(
        &self,
        args: Vec<Value>,
        provider: &dyn VariableProvider,
    ) -> Result<Value, EvalError> {
        if args.is_empty() {
            return Err(EvalError::new("hashFiles() requires at least 1 argument"));
        }

        let workspace = provider.github().get("workspace").as_string();
        let root = if workspace.is_empty() {
            std::env::current_dir().map_err(|e| EvalError::new(e.to_string()))?
        } else {
            PathBuf::from(workspace)
        };

        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        for arg in &args {
            let pattern = arg.as_string();
            match pattern.strip_prefix('!') {
                Some(negated) => excludes.push(compile_pattern(&root, negated)?),
                None => includes.push(pattern),
            }
        }

        let mut files = BTreeSet::new();
        for pattern in includes {
            let full = root.join(&pattern);
            let entries = glob::glob(&full.to_string_lossy())
                .map_err(|e| EvalError::new(format!("hashFiles('{}'): {}", pattern, e)))?;
            for path in entries.flatten() {
                if path.is_file() && path.starts_with(&root) {
                    files.insert(path);
                }
            }
        }

        let mut combined = Sha256::new();
        let mut matched = false;
        for file in files.iter().filter(|f| !excludes.iter().any(|p| p.matches_path(f))) {
            let content = std::fs::read(file)
                .map_err(|e| EvalError::new(format!("hashFiles(): {}: {}", file.display(), e)))?;
            combined.update(Sha256::digest(&content));
            matched = true;
        }

        if !matched {
            return Ok(Value::String(String::new()));
        }
        Ok(Value::String(format!("{:x}", combined.finalize())))
    }

    fn status_is(
        &self,
        args: Vec<Value>,
        provider: &dyn VariableProvider,
        expected: &str,
    ) -> Result<Value, EvalError> {
        self.require_args(&args, 0, expected)?;
        let status = provider.job().get("status").as_string();
        let status = if status.is_empty() { "success".to_string() } else { status };
        Ok(Value::Bool(status.eq_ignore_ascii_case(expected)))
    }

    fn require_args(&self, args: &[Value], count: usize, name: &str) -> Result<(), EvalError> {
        if args.len() != count {
            return Err(EvalError::new(format!(
                "{}() requires {} argument(s), got {}",
                name,
                count,
                args.len()
            )));
        }
        Ok(())
    }
}

fn compile_pattern(root: &Path, pattern: &str) -> Result<glob::Pattern, EvalError> {
    let full = root.join(pattern);
    glob::Pattern::new(&full.to_string_lossy())
        .map_err(|e| EvalError::new(format!("hashFiles('!{}'): {}", pattern, e)))
}
