//! Output revision stamping.
//!
//! Every output port value produced by a successful `run` is stamped with a
//! content-derived identity in `_meta.revision`: the SHA-256 of the value's
//! canonical JSON form with all `_meta` keys stripped recursively. Ports that
//! opt out via `_meta.hash_skip: true` receive a fresh random UUID instead,
//! and a caller-supplied `_meta.revision` is always left untouched.
//!
//! Canonical form is deterministic JSON: sorted keys, no insignificant
//! whitespace, UTF-8 (serde_json's default map is BTree-backed, so plain
//! serialization already satisfies this).

use crate::error::{FlowError, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Serialize a JSON value to its canonical byte form.
pub fn canonical_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Recursively remove `_meta` keys from all object levels.
pub fn strip_meta(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "_meta")
                .map(|(key, inner)| (key.clone(), strip_meta(inner)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_meta).collect()),
        other => other.clone(),
    }
}

/// Compute the content revision of one output port value.
fn content_revision(port_value: &Map<String, Value>) -> Result<String> {
    let payload = strip_meta(&Value::Object(port_value.clone()));
    let canonical = canonical_json(&payload)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{:x}", digest))
}

/// Stamp `_meta.revision` onto every port of an output map, in place.
///
/// Each port value must be a JSON object. A port that already carries
/// `_meta.revision` is left alone; `_meta.hash_skip: true` yields a random
/// UUID; otherwise the revision is the SHA-256 hex of the canonicalized
/// payload. Errors are captured by the node kernel as `fatal`.
pub fn stamp_revisions(output: &mut Map<String, Value>) -> Result<()> {
    for (port, value) in output.iter_mut() {
        let Some(obj) = value.as_object_mut() else {
            return Err(FlowError::OutputPort {
                port: port.clone(),
                error: format!("value must be an object, got {}", json_type_name(value)),
            });
        };

        let meta = obj.get("_meta");
        if meta.and_then(|m| m.get("revision")).is_some() {
            continue;
        }
        let hash_skip = meta
            .and_then(|m| m.get("hash_skip"))
            .and_then(Value::as_bool)
            == Some(true);

        let revision = if hash_skip {
            Uuid::new_v4().to_string()
        } else {
            content_revision(obj)?
        };

        let meta_slot = obj
            .entry("_meta".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(meta_obj) = meta_slot.as_object_mut() else {
            return Err(FlowError::OutputPort {
                port: port.clone(),
                error: format!(
                    "_meta must be an object, got {}",
                    json_type_name(meta_slot)
                ),
            });
        };
        meta_obj.insert("revision".to_string(), Value::String(revision));
    }
    Ok(())
}

/// Name of a JSON value's type, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
