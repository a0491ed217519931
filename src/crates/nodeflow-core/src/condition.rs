//! Loop termination conditions.
//!
//! A condition pairs a JSON-path-lite (`$` is the root, `$.a.b.c` a nested
//! key lookup) with exactly one comparison operator. Missing operators are a
//! construction-time error; evaluation failures (missing path, non-numeric
//! comparison) carry messages naming the path, operator, actual value and
//! types so a failing loop is diagnosable from its error alone.

use crate::error::{FlowError, Result};
use crate::revision::json_type_name;
use serde_json::Value;

/// Comparison applied to the value at the condition path.
#[derive(Debug, Clone)]
pub enum ConditionOp {
    /// Structural equality.
    Equals(Value),
    /// Structural inequality.
    NotEquals(Value),
    /// Numeric `<`; both sides must be numbers.
    LessThan(Value),
    /// Numeric `>`; both sides must be numbers.
    GreaterThan(Value),
}

impl ConditionOp {
    fn name(&self) -> &'static str {
        match self {
            ConditionOp::Equals(_) => "equals",
            ConditionOp::NotEquals(_) => "not_equals",
            ConditionOp::LessThan(_) => "less_than",
            ConditionOp::GreaterThan(_) => "greater_than",
        }
    }
}

/// A loop termination condition.
#[derive(Debug, Clone)]
pub struct Condition {
    path: String,
    op: ConditionOp,
}

/// Look up a JSON-path-lite inside a value.
fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() || path == "$" {
        return Some(root);
    }
    let keys = path.strip_prefix("$.").unwrap_or(path);
    let mut current = root;
    for key in keys.split('.') {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

impl Condition {
    /// Build a condition from a path and operator.
    pub fn new(path: impl Into<String>, op: ConditionOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Build a condition from its descriptor value, e.g.
    /// `{path: "$.n.count", greater_than: 2}`.
    ///
    /// Fails fast when the condition is not an object or names no operator.
    /// When several operator keys are present, the first of
    /// `equals → not_equals → less_than → greater_than` wins.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(obj) = value.as_object() else {
            return Err(FlowError::Condition(format!(
                "condition must be an object, got {}",
                json_type_name(value)
            )));
        };
        let path = obj
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("$")
            .to_string();
        let op = if let Some(reference) = obj.get("equals") {
            ConditionOp::Equals(reference.clone())
        } else if let Some(reference) = obj.get("not_equals") {
            ConditionOp::NotEquals(reference.clone())
        } else if let Some(reference) = obj.get("less_than") {
            ConditionOp::LessThan(reference.clone())
        } else if let Some(reference) = obj.get("greater_than") {
            ConditionOp::GreaterThan(reference.clone())
        } else {
            return Err(FlowError::Condition(
                "condition requires one of: equals, not_equals, less_than, greater_than"
                    .to_string(),
            ));
        };
        Ok(Self { path, op })
    }

    /// Evaluate against an output value. `Ok(true)` breaks the loop.
    pub fn evaluate(&self, output: &Value) -> Result<bool> {
        let Some(value) = lookup_path(output, &self.path) else {
            return Err(FlowError::Condition(format!(
                "path not found: path='{}' operator={} actual_value=None actual_type=missing",
                self.path,
                self.op.name()
            )));
        };

        match &self.op {
            ConditionOp::Equals(reference) => Ok(value == reference),
            ConditionOp::NotEquals(reference) => Ok(value != reference),
            ConditionOp::LessThan(reference) => {
                let (actual, bound) = self.numeric_pair(value, reference)?;
                Ok(actual < bound)
            }
            ConditionOp::GreaterThan(reference) => {
                let (actual, bound) = self.numeric_pair(value, reference)?;
                Ok(actual > bound)
            }
        }
    }

    fn numeric_pair(&self, value: &Value, reference: &Value) -> Result<(f64, f64)> {
        match (value.as_f64(), reference.as_f64()) {
            (Some(actual), Some(bound)) => Ok((actual, bound)),
            _ => Err(FlowError::Condition(format!(
                "type mismatch: path='{}' operator={} actual_value={} actual_type={} ref={} ref_type={}",
                self.path,
                self.op.name(),
                value,
                json_type_name(value),
                reference,
                json_type_name(reference)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_path_compares_whole_output() {
        let condition = Condition::from_value(&json!({"path": "$", "equals": {"n": 1}})).unwrap();
        assert!(condition.evaluate(&json!({"n": 1})).unwrap());
        assert!(!condition.evaluate(&json!({"n": 2})).unwrap());
    }

    #[test]
    fn nested_path_lookup() {
        let condition =
            Condition::from_value(&json!({"path": "$.n.count", "greater_than": 2})).unwrap();
        assert!(!condition.evaluate(&json!({"n": {"count": 2}})).unwrap());
        assert!(condition.evaluate(&json!({"n": {"count": 3}})).unwrap());
    }

    #[test]
    fn missing_operator_fails_at_construction() {
        let err = Condition::from_value(&json!({"path": "$.x"})).unwrap_err();
        assert!(matches!(err, FlowError::Condition(_)));
        assert!(Condition::from_value(&json!("nope")).is_err());
    }

    #[test]
    fn operator_precedence_prefers_equals() {
        let condition =
            Condition::from_value(&json!({"path": "$", "equals": 1, "greater_than": 5})).unwrap();
        // equals wins over greater_than
        assert!(condition.evaluate(&json!(1)).unwrap());
    }

    #[test]
    fn missing_path_is_descriptive() {
        let condition =
            Condition::from_value(&json!({"path": "$.a.b", "equals": 1})).unwrap();
        let err = condition.evaluate(&json!({"a": {}})).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("$.a.b"));
        assert!(msg.contains("equals"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn non_numeric_comparison_is_descriptive() {
        let condition =
            Condition::from_value(&json!({"path": "$.v", "less_than": 5})).unwrap();
        let err = condition.evaluate(&json!({"v": "three"})).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("less_than"));
        assert!(msg.contains("string"));
        assert!(msg.contains("number"));
    }

    #[test]
    fn not_equals_is_structural() {
        let condition =
            Condition::from_value(&json!({"path": "$.v", "not_equals": [1, 2]})).unwrap();
        assert!(!condition.evaluate(&json!({"v": [1, 2]})).unwrap());
        assert!(condition.evaluate(&json!({"v": [2, 1]})).unwrap());
    }

    #[test]
    fn numeric_comparison_mixes_int_and_float() {
        let condition =
            Condition::from_value(&json!({"path": "$.v", "greater_than": 2.5})).unwrap();
        assert!(condition.evaluate(&json!({"v": 3})).unwrap());
        assert!(!condition.evaluate(&json!({"v": 2})).unwrap());
    }
}
