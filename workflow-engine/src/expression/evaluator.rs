// Expression Engine Evaluator
// Evaluates ${{ }} expressions against a pluggable variable provider

use crate::expression::functions::BuiltinFunctions;
use crate::expression::lexer::{extract_expressions, Segment};
use crate::expression::parser::{BinaryOp, Expr, ExprParser};
use crate::expression::value::Value;
use crate::workflow::models::ExprValue;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::warn;

/// Evaluation error
#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evaluation error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Resolves the named values an expression can start from.
///
/// Every method returns an owned snapshot; missing contexts should return
/// an empty object rather than null so that `env.FOO` yields null instead
/// of failing.
pub trait VariableProvider: Send + Sync {
    fn github(&self) -> Value;
    fn runner(&self) -> Value;
    fn env(&self) -> Value;
    fn job(&self) -> Value;
    fn steps(&self) -> Value;
    fn secrets(&self) -> Value;
    fn strategy(&self) -> Value;
    fn matrix(&self) -> Value;
    fn needs(&self) -> Value;
    fn inputs(&self) -> Value;

    fn infinity(&self) -> Value {
        Value::Number(f64::INFINITY)
    }

    fn nan(&self) -> Value {
        Value::Number(f64::NAN)
    }
}

/// Look up a top-level identifier; names are case-insensitive.
pub fn resolve_identifier(provider: &dyn VariableProvider, name: &str) -> Result<Value, EvalError> {
    let value = match name.to_ascii_lowercase().as_str() {
        "github" => provider.github(),
        "runner" => provider.runner(),
        "env" => provider.env(),
        "job" => provider.job(),
        "steps" => provider.steps(),
        "secrets" => provider.secrets(),
        "strategy" => provider.strategy(),
        "matrix" => provider.matrix(),
        "needs" => provider.needs(),
        "inputs" => provider.inputs(),
        "infinity" => provider.infinity(),
        "nan" => provider.nan(),
        _ => return Err(EvalError::new(format!("unknown identifier: {}", name))),
    };
    Ok(value)
}

/// Provider used while a step runs an action: `inputs` comes from the
/// action's resolved inputs, everything else from the wrapped provider.
///
/// Composite actions also replace `steps` with their nested steps.
pub struct ActionInputsProvider<'a> {
    inner: &'a dyn VariableProvider,
    inputs: Value,
    steps: Option<Value>,
}

impl<'a> ActionInputsProvider<'a> {
    pub fn new(inner: &'a dyn VariableProvider, inputs: IndexMap<String, String>) -> Self {
        Self {
            inner,
            inputs: Value::object_from_strings(&inputs),
            steps: None,
        }
    }

    pub fn with_steps(mut self, steps: Value) -> Self {
        self.steps = Some(steps);
        self
    }
}

impl VariableProvider for ActionInputsProvider<'_> {
    fn github(&self) -> Value {
        self.inner.github()
    }
    fn runner(&self) -> Value {
        self.inner.runner()
    }
    fn env(&self) -> Value {
        self.inner.env()
    }
    fn job(&self) -> Value {
        self.inner.job()
    }
    fn steps(&self) -> Value {
        match &self.steps {
            Some(steps) => steps.clone(),
            None => self.inner.steps(),
        }
    }
    fn secrets(&self) -> Value {
        self.inner.secrets()
    }
    fn strategy(&self) -> Value {
        self.inner.strategy()
    }
    fn matrix(&self) -> Value {
        self.inner.matrix()
    }
    fn needs(&self) -> Value {
        self.inner.needs()
    }
    fn inputs(&self) -> Value {
        self.inputs.clone()
    }
    fn infinity(&self) -> Value {
        self.inner.infinity()
    }
    fn nan(&self) -> Value {
        self.inner.nan()
    }
}

/// Provider backed by a plain map of context name to value.
///
/// Handy for evaluating against a fixed snapshot, e.g. job outputs or tests.
#[derive(Debug, Clone, Default)]
pub struct StaticVariables {
    contexts: IndexMap<String, Value>,
}

impl StaticVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.contexts.insert(name.to_string(), value);
        self
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.contexts.insert(name.to_string(), value);
    }

    fn context(&self, name: &str) -> Value {
        self.contexts
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Object(IndexMap::new()))
    }
}

impl VariableProvider for StaticVariables {
    fn github(&self) -> Value {
        self.context("github")
    }
    fn runner(&self) -> Value {
        self.context("runner")
    }
    fn env(&self) -> Value {
        self.context("env")
    }
    fn job(&self) -> Value {
        self.context("job")
    }
    fn steps(&self) -> Value {
        self.context("steps")
    }
    fn secrets(&self) -> Value {
        self.context("secrets")
    }
    fn strategy(&self) -> Value {
        self.context("strategy")
    }
    fn matrix(&self) -> Value {
        self.context("matrix")
    }
    fn needs(&self) -> Value {
        self.context("needs")
    }
    fn inputs(&self) -> Value {
        self.context("inputs")
    }
}

/// Expression evaluator over a parsed AST
pub struct Evaluator<'a> {
    provider: &'a dyn VariableProvider,
    functions: BuiltinFunctions,
}

impl<'a> Evaluator<'a> {
    pub fn new(provider: &'a dyn VariableProvider) -> Self {
        Self {
            provider,
            functions: BuiltinFunctions::new(),
        }
    }

    /// Parse and evaluate a bare expression (no `${{ }}` wrapper)
    pub fn eval_str(&self, input: &str) -> Result<Value, EvalError> {
        let expr = ExprParser::parse_str(input).map_err(|e| EvalError::new(e.to_string()))?;
        self.eval(&expr)
    }

    /// Evaluate an expression AST
    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval_node(expr).map(|(value, _)| value)
    }

    /// Evaluate a node; the flag marks arrays produced by an object filter,
    /// whose subsequent dereferences apply element-wise.
    fn eval_node(&self, expr: &Expr) -> Result<(Value, bool), EvalError> {
        let plain = |value: Value| Ok((value, false));
        match expr {
            Expr::Null => plain(Value::Null),
            Expr::Bool(b) => plain(Value::Bool(*b)),
            Expr::Number(n) => plain(Value::Number(*n)),
            Expr::String(s) => plain(Value::String(s.clone())),
            Expr::Identifier(name) => plain(resolve_identifier(self.provider, name)?),
            Expr::FunctionCall { name, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                plain(self.functions.call(name, values, self.provider)?)
            }
            Expr::Member { object, property } => {
                let (target, filtered) = self.eval_node(object)?;
                let key = Value::String(property.clone());
                Ok(dereference(target, filtered, &key))
            }
            Expr::Index { object, index } => {
                let (target, filtered) = self.eval_node(object)?;
                let key = self.eval(index)?;
                Ok(dereference(target, filtered, &key))
            }
            Expr::Filter { object } => {
                let (target, filtered) = self.eval_node(object)?;
                let sources = if filtered {
                    match target {
                        Value::Array(items) => items,
                        _ => Vec::new(),
                    }
                } else {
                    vec![target]
                };
                let mut out = Vec::new();
                for source in sources {
                    match source {
                        Value::Array(items) => out.extend(items),
                        Value::Object(map) => out.extend(map.into_values()),
                        _ => {}
                    }
                }
                Ok((Value::Array(out), true))
            }
            Expr::Not(inner) => plain(Value::Bool(!self.eval(inner)?.is_truthy())),
            Expr::Binary { op, left, right } => plain(self.eval_binary(*op, left, right)?),
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, EvalError> {
        // && and || short-circuit and yield an operand, not a boolean
        match op {
            BinaryOp::And => {
                let lhs = self.eval(left)?;
                return if lhs.is_truthy() { self.eval(right) } else { Ok(lhs) };
            }
            BinaryOp::Or => {
                let lhs = self.eval(left)?;
                return if lhs.is_truthy() { Ok(lhs) } else { self.eval(right) };
            }
            _ => {}
        }

        let lhs = self.eval(left)?;
        let rhs = self.eval(right)?;

        let result = match op {
            BinaryOp::Eq => values_equal(&lhs, &rhs),
            BinaryOp::Ne => !values_equal(&lhs, &rhs),
            BinaryOp::Lt => compare(&lhs, &rhs) == Some(Ordering::Less),
            BinaryOp::Le => matches!(compare(&lhs, &rhs), Some(Ordering::Less | Ordering::Equal)),
            BinaryOp::Gt => compare(&lhs, &rhs) == Some(Ordering::Greater),
            BinaryOp::Ge => matches!(
                compare(&lhs, &rhs),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };

        Ok(Value::Bool(result))
    }
}

fn dereference(target: Value, filtered: bool, key: &Value) -> (Value, bool) {
    if filtered {
        let items = match target {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        let picked = items
            .iter()
            .map(|item| index_value(item, key))
            .filter(|v| *v != Value::Null)
            .collect();
        return (Value::Array(picked), true);
    }
    (index_value(&target, key), false)
}

fn index_value(target: &Value, key: &Value) -> Value {
    match target {
        Value::Object(_) => target.get(&key.as_string()),
        Value::Array(items) => {
            let n = key.to_number();
            if n.is_nan() || n < 0.0 || n.fract() != 0.0 {
                Value::Null
            } else {
                items.get(n as usize).cloned().unwrap_or(Value::Null)
            }
        }
        _ => Value::Null,
    }
}

/// Loose equality: case-insensitive strings, numeric coercion across
/// primitive types, and no structural equality for arrays or objects.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::String(x), Value::String(y)) => x.to_lowercase() == y.to_lowercase(),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        _ if a.is_primitive() && b.is_primitive() => {
            let (x, y) = (a.to_number(), b.to_number());
            x == y
        }
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.to_lowercase().cmp(&y.to_lowercase())),
        _ if a.is_primitive() && b.is_primitive() => a.to_number().partial_cmp(&b.to_number()),
        _ => None,
    }
}

/// How evaluation failures are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    /// Errors propagate to the caller
    Strict,
    /// Errors are logged and replaced by an empty string
    #[default]
    Lenient,
}

/// Destination types for literal-or-expression fields
pub trait FromValue: Sized {
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn from_value(value: &Value) -> Option<Self> {
        let n = match value {
            Value::Number(n) => *n,
            Value::String(s) => crate::expression::lexer::parse_number(s.trim())?,
            _ => return None,
        };
        (n.is_finite() && n.fract() == 0.0).then_some(n as i64)
    }
}

impl FromValue for f64 {
    const TYPE_NAME: &'static str = "number";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(*n),
            Value::String(s) => crate::expression::lexer::parse_number(s.trim()),
            _ => None,
        }
    }
}

const STATUS_FUNCTIONS: [&str; 4] = ["success", "failure", "cancelled", "always"];

/// Front door for evaluating workflow fields
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEngine {
    mode: EvalMode,
}

impl ExpressionEngine {
    pub fn new(mode: EvalMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    /// Replace every `${{ }}` span with its value, in source order.
    ///
    /// Null values become an empty string. In lenient mode a failing span
    /// is logged and replaced by an empty string.
    pub fn eval_string(
        &self,
        provider: &dyn VariableProvider,
        text: &str,
    ) -> Result<String, EvalError> {
        let evaluator = Evaluator::new(provider);
        let mut out = String::with_capacity(text.len());

        for segment in extract_expressions(text) {
            match segment {
                Segment::Text(t) => out.push_str(&t),
                Segment::Expression(expr) => match evaluator.eval_str(&expr) {
                    Ok(value) => out.push_str(&value.as_string()),
                    Err(err) => self.recover(err, &expr)?,
                },
            }
        }

        Ok(out)
    }

    /// Evaluate a field, keeping the value's type when the field is a
    /// single `${{ }}` span and falling back to string interpolation otherwise.
    pub fn eval_value(&self, provider: &dyn VariableProvider, text: &str) -> Result<Value, EvalError> {
        let segments = extract_expressions(text);
        if let [Segment::Expression(expr)] = segments.as_slice() {
            return match Evaluator::new(provider).eval_str(expr) {
                Ok(value) => Ok(value),
                Err(err) => self.recover(err, expr).map(|_| Value::String(String::new())),
            };
        }
        self.eval_string(provider, text).map(Value::String)
    }

    /// Evaluate a literal-or-expression field into its destination type.
    ///
    /// Coercion failures are errors in every mode.
    pub fn eval_typed<T: FromValue + Clone>(
        &self,
        provider: &dyn VariableProvider,
        field: &ExprValue<T>,
    ) -> Result<T, EvalError> {
        match field {
            ExprValue::Literal(value) => Ok(value.clone()),
            ExprValue::Expression(text) => {
                let value = self.eval_value(provider, text)?;
                T::from_value(&value).ok_or_else(|| {
                    EvalError::new(format!(
                        "'{}' evaluated to '{}', which is not a {}",
                        text,
                        value.as_string(),
                        T::TYPE_NAME
                    ))
                })
            }
        }
    }

    /// Like [`Self::eval_typed`] for optional fields, falling back to
    /// `default` when absent and, in lenient mode, when evaluation fails.
    pub fn eval_typed_or<T: FromValue + Clone>(
        &self,
        provider: &dyn VariableProvider,
        field: Option<&ExprValue<T>>,
        default: T,
    ) -> Result<T, EvalError> {
        let Some(field) = field else {
            return Ok(default);
        };
        match self.eval_typed(provider, field) {
            Ok(value) => Ok(value),
            Err(err) if self.mode == EvalMode::Lenient => {
                warn!(error = %err.message, "using default for unevaluable field");
                Ok(default)
            }
            Err(err) => Err(err),
        }
    }

    /// Evaluate an `if:` condition.
    ///
    /// The `${{ }}` wrapper is optional. A condition without a status
    /// function is implicitly `success() && (<condition>)`; a missing
    /// condition is `success()`.
    pub fn eval_condition(
        &self,
        provider: &dyn VariableProvider,
        condition: Option<&str>,
    ) -> Result<bool, EvalError> {
        let raw = condition.map(str::trim).unwrap_or("");
        let source = match extract_expressions(raw).as_slice() {
            [] => "success()".to_string(),
            [Segment::Expression(inner)] => inner.clone(),
            [Segment::Text(text)] => text.clone(),
            _ => {
                // Mixed text and spans interpolate to a string first
                let text = self.eval_string(provider, raw)?;
                return Ok(Value::String(text).is_truthy());
            }
        };

        let parsed = match ExprParser::parse_str(&source) {
            Ok(expr) => expr,
            Err(err) => {
                self.recover(EvalError::new(err.to_string()), &source)?;
                return Ok(false);
            }
        };

        let expr = if mentions_status_function(&parsed) {
            parsed
        } else {
            Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(Expr::FunctionCall {
                    name: "success".to_string(),
                    args: Vec::new(),
                }),
                right: Box::new(parsed),
            }
        };

        match Evaluator::new(provider).eval(&expr) {
            Ok(value) => Ok(value.is_truthy()),
            Err(err) => {
                self.recover(err, &source)?;
                Ok(false)
            }
        }
    }

    fn recover(&self, err: EvalError, expr: &str) -> Result<(), EvalError> {
        match self.mode {
            EvalMode::Strict => Err(err),
            EvalMode::Lenient => {
                warn!(expression = %expr, error = %err.message, "expression evaluation failed");
                Ok(())
            }
        }
    }
}

fn mentions_status_function(expr: &Expr) -> bool {
    match expr {
        Expr::FunctionCall { name, args } => {
            STATUS_FUNCTIONS.iter().any(|f| name.eq_ignore_ascii_case(f))
                || args.iter().any(mentions_status_function)
        }
        Expr::Member { object, .. } | Expr::Filter { object } => mentions_status_function(object),
        Expr::Index { object, index } => {
            mentions_status_function(object) || mentions_status_function(index)
        }
        Expr::Not(inner) => mentions_status_function(inner),
        Expr::Binary { left, right, .. } => {
            mentions_status_function(left) || mentions_status_function(right)
        }
        _ => false,
    }
}
