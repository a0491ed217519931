//! Reference-string resolution.
//!
//! Port bindings and param values may be reference strings of the form
//! `${src.key}`. The source selects where the value is looked up:
//!
//! - `${inputs.key}`: the pipeline's input map
//! - `${params.key}`: the pipeline's param map
//! - `${node-id.port}`: the latest saved output of a producer node
//!
//! Input resolution is strict: a failed lookup yields [`Resolved::Unresolved`]
//! and the scheduler treats the node as not executable. Param resolution is
//! best-effort: a failed lookup leaves the literal reference string in place.
//! Resolution never fails; non-string bindings and non-matching strings pass
//! through unchanged.

use crate::schedule::OutputStore;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Outcome of resolving one port binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The binding resolved to a value (or was a literal).
    Value(Value),
    /// The binding is a reference whose target does not currently exist.
    Unresolved,
}

impl Resolved {
    /// True when the binding resolved to a value.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolved::Value(_))
    }
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // src and key contain no '.' and no '}'
    PATTERN.get_or_init(|| Regex::new(r"^\$\{([^}.]+)\.([^}.]+)\}$").expect("valid pattern"))
}

/// Parse a trimmed string as a reference, returning `(source, key)`.
///
/// Returns `None` when the string is not exactly one `${src.key}` pattern
/// (such strings are literals, not references).
pub fn parse_reference(value: &str) -> Option<(&str, &str)> {
    let captures = reference_pattern().captures(value.trim())?;
    let source = captures.get(1)?.as_str();
    let key = captures.get(2)?.as_str();
    Some((source, key))
}

fn lookup(
    source: &str,
    key: &str,
    outputs: &OutputStore,
    pipeline_inputs: &Map<String, Value>,
    pipeline_params: &Map<String, Value>,
) -> Resolved {
    match source {
        "inputs" => match pipeline_inputs.get(key) {
            Some(value) => Resolved::Value(value.clone()),
            None => Resolved::Unresolved,
        },
        "params" => match pipeline_params.get(key) {
            Some(value) => Resolved::Value(value.clone()),
            None => Resolved::Unresolved,
        },
        producer => match outputs.latest_output(producer).and_then(|out| out.get(key)) {
            Some(value) => Resolved::Value(value.clone()),
            None => Resolved::Unresolved,
        },
    }
}

/// Resolve the input bindings of one node against the current outputs,
/// pipeline inputs and pipeline params.
///
/// Every binding appears in the result; unresolvable references map to
/// [`Resolved::Unresolved`] and the caller decides whether that blocks
/// execution.
pub fn resolve_inputs(
    bindings: &Map<String, Value>,
    outputs: &OutputStore,
    pipeline_inputs: &Map<String, Value>,
    pipeline_params: &Map<String, Value>,
) -> HashMap<String, Resolved> {
    let mut resolved = HashMap::with_capacity(bindings.len());
    for (port, binding) in bindings {
        let value = match binding {
            Value::String(s) => match parse_reference(s) {
                Some((source, key)) => {
                    lookup(source, key, outputs, pipeline_inputs, pipeline_params)
                }
                None => Resolved::Value(binding.clone()),
            },
            other => Resolved::Value(other.clone()),
        };
        resolved.insert(port.clone(), value);
    }
    resolved
}

/// Resolve reference strings inside a param map.
///
/// Only the `inputs` and `params` sources apply to params; node-output
/// references and failed lookups are left as their literal reference string.
/// Nested maps are resolved recursively; all other values pass through.
pub fn resolve_params(
    params_def: &Map<String, Value>,
    pipeline_params: &Map<String, Value>,
    pipeline_inputs: &Map<String, Value>,
) -> Map<String, Value> {
    let mut resolved = Map::new();
    for (key, value) in params_def {
        let resolved_value = match value {
            Value::String(s) => match parse_reference(s) {
                Some(("params", name)) => pipeline_params
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| value.clone()),
                Some(("inputs", name)) => pipeline_inputs
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| value.clone()),
                _ => value.clone(),
            },
            Value::Object(nested) => Value::Object(resolve_params(
                nested,
                pipeline_params,
                pipeline_inputs,
            )),
            other => other.clone(),
        };
        resolved.insert(key.clone(), resolved_value);
    }
    resolved
}
