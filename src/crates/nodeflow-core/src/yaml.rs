//! YAML pipeline descriptors.
//!
//! A pipeline file declares a version, free-form params and a graph: an
//! ordered node list plus the designated final node. The node order is
//! authoritative: the scheduler scans it on every step, so determinism
//! depends on it.
//!
//! ```yaml
//! version: "1.2"
//! params:
//!   limit: {max_idle_sec: 5}
//! graph:
//!   nodes:
//!     - id: "greet"
//!       type: "hello"
//!       params: {message: "hi"}
//!   final: "greet"
//! ```

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Descriptor version this engine executes (exact match).
pub const SUPPORTED_VERSION: &str = "1.2";

/// One node declaration inside a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique node id within the graph.
    pub id: String,

    /// Node type resolved through the factory; `"pipeline"` and `"loop"`
    /// are reserved for nested containers.
    #[serde(rename = "type")]
    pub node_type: String,

    /// Input port bindings. String values of the form `${src.key}` are
    /// references; everything else is a literal.
    #[serde(default)]
    pub inputs: Map<String, Value>,

    /// Node params, resolved against pipeline inputs/params at each
    /// invocation.
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// An ordered node list plus the designated final node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDescriptor {
    /// Nodes in authoritative scheduling order.
    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,

    /// Id of the node whose output the pipeline returns on success.
    #[serde(rename = "final", default)]
    pub final_id: String,
}

impl GraphDescriptor {
    /// Validate the graph structure.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(FlowError::Schema("graph.nodes required".to_string()));
        }
        if self.final_id.is_empty() {
            return Err(FlowError::Schema("graph.final required".to_string()));
        }

        let mut ids = std::collections::HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(FlowError::Schema(format!(
                    "Duplicate node id: {}",
                    node.id
                )));
            }
        }
        if !ids.contains(self.final_id.as_str()) {
            return Err(FlowError::Schema(format!(
                "graph.final '{}' is not a declared node",
                self.final_id
            )));
        }
        Ok(())
    }
}

/// Top-level pipeline descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    /// Descriptor version; must equal [`SUPPORTED_VERSION`] exactly.
    #[serde(default)]
    pub version: Option<String>,

    /// Free-form pipeline params; may contain a `limit` block.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// The graph to execute.
    #[serde(default)]
    pub graph: GraphDescriptor,
}

impl PipelineDescriptor {
    /// Load a pipeline descriptor from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a pipeline descriptor from a YAML string.
    pub fn from_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate version and graph structure.
    pub fn validate(&self) -> Result<()> {
        match self.version.as_deref() {
            Some(SUPPORTED_VERSION) => {}
            other => return Err(FlowError::version_mismatch(other)),
        }
        self.graph.validate()
    }
}

/// Required flag of one declared input port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortSpec {
    /// Whether the port must resolve before the node may run.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl Default for PortSpec {
    fn default() -> Self {
        Self { required: true }
    }
}

/// Declared input ports of a node type.
///
/// An empty schema (no `node.yaml` for the type) means every declared
/// binding is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSchema {
    /// Port name → spec.
    #[serde(default)]
    pub inputs: BTreeMap<String, PortSpec>,
}

impl InputSchema {
    /// The ports that must resolve before the node may run, given its
    /// declared bindings.
    pub fn required_ports(&self, bindings: &Map<String, Value>) -> Vec<String> {
        if self.inputs.is_empty() {
            bindings.keys().cloned().collect()
        } else {
            self.inputs
                .iter()
                .filter(|(_, spec)| spec.required)
                .map(|(port, _)| port.clone())
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pipeline_yaml() {
        let yaml = r#"
version: "1.2"
params:
  k: 3
graph:
  nodes:
    - id: "node-a"
      type: "helloType"
      inputs: {portX: "${inputs.raw}", portY: "${node-b.out}"}
      params: {message: "hi", k: "${params.k}"}
  final: "node-a"
"#;
        let descriptor = PipelineDescriptor::from_str(yaml).unwrap();
        assert!(descriptor.validate().is_ok());
        assert_eq!(descriptor.graph.nodes.len(), 1);
        assert_eq!(descriptor.graph.final_id, "node-a");
        assert_eq!(descriptor.graph.nodes[0].node_type, "helloType");
        assert_eq!(
            descriptor.graph.nodes[0].inputs["portX"],
            json!("${inputs.raw}")
        );
    }

    #[test]
    fn missing_version_is_a_version_mismatch() {
        let yaml = r#"
graph:
  nodes:
    - {id: "a", type: "t"}
  final: "a"
"#;
        let descriptor = PipelineDescriptor::from_str(yaml).unwrap();
        assert!(matches!(
            descriptor.validate(),
            Err(FlowError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn wrong_version_is_a_version_mismatch() {
        let yaml = r#"
version: "1.1"
graph:
  nodes:
    - {id: "a", type: "t"}
  final: "a"
"#;
        let descriptor = PipelineDescriptor::from_str(yaml).unwrap();
        let err = descriptor.validate().unwrap_err();
        assert!(format!("{}", err).contains("1.1"));
    }

    #[test]
    fn missing_nodes_and_final_are_schema_errors() {
        let no_nodes = PipelineDescriptor::from_str("version: \"1.2\"\ngraph: {final: \"a\"}\n").unwrap();
        assert!(matches!(no_nodes.validate(), Err(FlowError::Schema(_))));

        let no_final = PipelineDescriptor::from_str(
            "version: \"1.2\"\ngraph:\n  nodes:\n    - {id: \"a\", type: \"t\"}\n",
        )
        .unwrap();
        assert!(matches!(no_final.validate(), Err(FlowError::Schema(_))));
    }

    #[test]
    fn duplicate_ids_and_unknown_final_are_rejected() {
        let dup = PipelineDescriptor::from_str(
            r#"
version: "1.2"
graph:
  nodes:
    - {id: "a", type: "t"}
    - {id: "a", type: "t"}
  final: "a"
"#,
        )
        .unwrap();
        assert!(matches!(dup.validate(), Err(FlowError::Schema(_))));

        let bad_final = PipelineDescriptor::from_str(
            r#"
version: "1.2"
graph:
  nodes:
    - {id: "a", type: "t"}
  final: "ghost"
"#,
        )
        .unwrap();
        assert!(matches!(bad_final.validate(), Err(FlowError::Schema(_))));
    }

    #[test]
    fn empty_schema_requires_all_bindings() {
        let schema = InputSchema::default();
        let bindings = match json!({"x": "${a.out}", "y": 1}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let mut required = schema.required_ports(&bindings);
        required.sort();
        assert_eq!(required, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn schema_marks_optional_ports() {
        let schema: InputSchema = serde_yaml::from_str(
            r#"
inputs:
  x: {required: true}
  y: {required: false}
  z: {}
"#,
        )
        .unwrap();
        let bindings = Map::new();
        let required = schema.required_ports(&bindings);
        assert_eq!(required, vec!["x".to_string(), "z".to_string()]);
    }
}
