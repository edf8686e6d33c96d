// Matrix Strategy Expansion
// Expands matrix strategies into concrete job run combinations

use crate::expression::Value as ExprValue;
use crate::workflow::Matrix;

use indexmap::IndexMap;
use serde_json::Value;

/// A single matrix combination
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixInstance {
    /// Position in the expansion, starting at 0
    pub index: usize,
    /// Display suffix, e.g. `ubuntu, 18.04`
    pub name: String,
    /// Variable values for this combination, in dimension order
    pub variables: IndexMap<String, Value>,
}

impl MatrixInstance {
    fn new(index: usize, variables: IndexMap<String, Value>) -> Self {
        let name = variables
            .values()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            index,
            name,
            variables,
        }
    }

    /// The `matrix` context for expressions
    pub fn to_context(&self) -> ExprValue {
        ExprValue::Object(
            self.variables
                .iter()
                .map(|(k, v)| (k.clone(), ExprValue::from(v)))
                .collect(),
        )
    }
}

/// Matrix expander for job strategies
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a matrix into its combinations.
    ///
    /// The cartesian product of the dimensions, minus every combination that
    /// matches an `exclude` entry on all of that entry's keys. Each `include`
    /// entry is then merged into every combination that agrees with it on
    /// the dimension keys it names, or appended when none does. Includes are
    /// never excluded.
    ///
    /// No dimensions and no includes yields an empty list; callers run the
    /// job once, unparameterized.
    pub fn expand(matrix: &Matrix) -> Vec<MatrixInstance> {
        let mut combinations = Self::cartesian(&matrix.dimensions);

        combinations.retain(|combo| {
            !matrix
                .exclude
                .iter()
                .any(|exclude| Self::matches_all(combo, exclude))
        });

        let mut appended = Vec::new();
        for include in &matrix.include {
            let mut merged = false;
            for combo in combinations.iter_mut() {
                if Self::agrees_on_dimensions(combo, include, &matrix.dimensions) {
                    for (key, value) in include {
                        combo.insert(key.clone(), value.clone());
                    }
                    merged = true;
                }
            }
            if !merged {
                appended.push(include.clone());
            }
        }
        combinations.extend(appended);

        combinations
            .into_iter()
            .enumerate()
            .map(|(index, variables)| MatrixInstance::new(index, variables))
            .collect()
    }

    fn cartesian(dimensions: &IndexMap<String, Vec<Value>>) -> Vec<IndexMap<String, Value>> {
        if dimensions.is_empty() {
            return Vec::new();
        }

        let mut combos: Vec<IndexMap<String, Value>> = vec![IndexMap::new()];
        for (key, values) in dimensions {
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for value in values {
                    let mut extended = combo.clone();
                    extended.insert(key.clone(), value.clone());
                    next.push(extended);
                }
            }
            combos = next;
        }
        combos
    }

    /// Every key of `partial` is present in `combo` with an equal value
    fn matches_all(combo: &IndexMap<String, Value>, partial: &IndexMap<String, Value>) -> bool {
        partial
            .iter()
            .all(|(key, value)| combo.get(key).is_some_and(|v| values_match(v, value)))
    }

    fn agrees_on_dimensions(
        combo: &IndexMap<String, Value>,
        include: &IndexMap<String, Value>,
        dimensions: &IndexMap<String, Vec<Value>>,
    ) -> bool {
        include
            .iter()
            .filter(|(key, _)| dimensions.contains_key(*key))
            .all(|(key, value)| combo.get(key).is_some_and(|v| values_match(v, value)))
    }
}

fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(yaml: &str) -> Matrix {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn summary(instances: &[MatrixInstance]) -> Vec<String> {
        instances.iter().map(|i| i.name.clone()).collect()
    }

    #[test]
    fn test_exclude_then_include() {
        let m = matrix(
            r#"
OS: [ubuntu, windows]
version: ["18.04", "20.04"]
exclude:
  - OS: windows
    version: "18.04"
include:
  - OS: ubuntu
    version: "20.04"
    arch: x64
"#,
        );
        let instances = MatrixExpander::expand(&m);
        assert_eq!(
            summary(&instances),
            vec!["ubuntu, 18.04", "ubuntu, 20.04, x64", "windows, 20.04"]
        );
        assert_eq!(instances[1].variables["arch"], Value::from("x64"));
        assert!(!instances[0].variables.contains_key("arch"));
        assert_eq!(instances[2].index, 2);
    }

    #[test]
    fn test_unmatched_include_is_appended() {
        let m = matrix(
            r#"
os: [ubuntu]
include:
  - os: macos
    experimental: true
"#,
        );
        let instances = MatrixExpander::expand(&m);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].variables["os"], Value::from("macos"));
        assert_eq!(instances[1].variables["experimental"], Value::Bool(true));
    }

    #[test]
    fn test_include_without_dimension_keys_extends_every_combination() {
        let m = matrix(
            r#"
node: [18, 20]
include:
  - npm: 9
"#,
        );
        let instances = MatrixExpander::expand(&m);
        assert_eq!(instances.len(), 2);
        assert!(instances.iter().all(|i| i.variables["npm"] == Value::from(9)));
    }

    #[test]
    fn test_includes_are_not_excluded() {
        let m = matrix(
            r#"
os: [linux]
exclude:
  - os: windows
include:
  - os: windows
"#,
        );
        let instances = MatrixExpander::expand(&m);
        assert_eq!(summary(&instances), vec!["linux", "windows"]);
    }

    #[test]
    fn test_no_dimensions_yields_nothing() {
        let m = Matrix::default();
        assert!(MatrixExpander::expand(&m).is_empty());
    }

    #[test]
    fn test_numbers_match_across_representations() {
        let m = matrix(
            r#"
node: [18, 20]
exclude:
  - node: 18.0
"#,
        );
        let instances = MatrixExpander::expand(&m);
        assert_eq!(summary(&instances), vec!["20"]);
    }

    #[test]
    fn test_matrix_context() {
        let m = matrix("os: [ubuntu]\n");
        let ctx = MatrixExpander::expand(&m)[0].to_context();
        assert_eq!(ctx.get("OS"), ExprValue::from("ubuntu"));
    }
}
