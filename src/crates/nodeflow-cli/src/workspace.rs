//! Workspace adapter: node schemas and config layering from disk.
//!
//! A workspace directory holds per-type node metadata:
//!
//! ```text
//! <workspace>/
//!   nodes/
//!     <type>/
//!       node.yaml    # version + declared input ports
//!       config.yaml  # default params, overridden by descriptor params
//! ```
//!
//! Behaviors themselves come from the compile-time registry; the workspace
//! only contributes schemas and param defaults.

use nodeflow_core::{
    FlowError, InputSchema, NodeBehavior, NodeFactory, PipelineDescriptor, PortSpec, Result,
    GraphDescriptor, LOOP_TYPE, PIPELINE_TYPE, SUPPORTED_VERSION,
};
use nodeflow_nodes::NodeRegistry;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Shape of a `node.yaml` file.
#[derive(Debug, Deserialize)]
struct NodeManifest {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    inputs: BTreeMap<String, PortSpec>,
}

/// A [`NodeFactory`] backed by a registry plus on-disk node metadata.
pub struct WorkspaceFactory {
    root: PathBuf,
    registry: NodeRegistry,
}

impl WorkspaceFactory {
    /// Create a factory for a workspace directory.
    pub fn new(root: impl Into<PathBuf>, registry: NodeRegistry) -> Self {
        Self {
            root: root.into(),
            registry,
        }
    }

    fn node_dir(&self, node_type: &str) -> PathBuf {
        self.root.join("nodes").join(node_type)
    }
}

impl NodeFactory for WorkspaceFactory {
    fn create(&self, node_type: &str) -> Result<Box<dyn NodeBehavior>> {
        self.registry.create(node_type)
    }

    fn input_schema(&self, node_type: &str) -> Result<InputSchema> {
        let manifest_path = self.node_dir(node_type).join("node.yaml");
        if !manifest_path.exists() {
            // Missing manifest: fall back to the registry's schema.
            return self.registry.input_schema(node_type);
        }
        let content = std::fs::read_to_string(&manifest_path)?;
        let manifest: NodeManifest = serde_yaml::from_str(&content)?;
        match manifest.version.as_deref() {
            Some(SUPPORTED_VERSION) => {}
            other => {
                return Err(FlowError::VersionMismatch {
                    found: other.unwrap_or("missing").to_string(),
                    supported: SUPPORTED_VERSION,
                })
            }
        }
        Ok(InputSchema {
            inputs: manifest.inputs,
        })
    }
}

/// Recursively merge `overlay` over `base`: maps merge key-wise, everything
/// else (scalars, lists) is overridden by the overlay.
pub fn deep_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        match (merged.get(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                let combined = deep_merge(existing, incoming);
                merged.insert(key.clone(), Value::Object(combined));
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Layer each node type's `config.yaml` defaults under its descriptor
/// params, recursing into nested container graphs.
pub fn apply_node_configs(descriptor: &mut PipelineDescriptor, workspace: &Path) -> Result<()> {
    apply_to_graph(&mut descriptor.graph, workspace)
}

fn apply_to_graph(graph: &mut GraphDescriptor, workspace: &Path) -> Result<()> {
    for node in &mut graph.nodes {
        match node.node_type.as_str() {
            PIPELINE_TYPE | LOOP_TYPE => {
                if let Some(graph_value) = node.params.get_mut("graph") {
                    let mut nested: GraphDescriptor =
                        serde_json::from_value(graph_value.clone())?;
                    apply_to_graph(&mut nested, workspace)?;
                    *graph_value = serde_json::to_value(&nested)?;
                }
            }
            node_type => {
                let defaults = load_node_config(workspace, node_type)?;
                if !defaults.is_empty() {
                    node.params = deep_merge(&defaults, &node.params);
                }
            }
        }
    }
    Ok(())
}

fn load_node_config(workspace: &Path, node_type: &str) -> Result<Map<String, Value>> {
    let path = workspace.join("nodes").join(node_type).join("config.yaml");
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(&path)?;
    let value: Value = serde_yaml::from_str(&content)?;
    Ok(value.as_object().cloned().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_nodes::default_registry;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn deep_merge_overrides_scalars_and_merges_maps() {
        let base = object(json!({
            "message": "default",
            "limit": {"max_iterations": 5, "max_idle_sec": 1.0},
            "tags": [1, 2],
        }));
        let overlay = object(json!({
            "message": "override",
            "limit": {"max_iterations": 3},
            "tags": [9],
        }));

        let merged = deep_merge(&base, &overlay);

        assert_eq!(merged["message"], json!("override"));
        // Maps merge recursively.
        assert_eq!(merged["limit"]["max_iterations"], json!(3));
        assert_eq!(merged["limit"]["max_idle_sec"], json!(1.0));
        // Lists are overridden, not concatenated.
        assert_eq!(merged["tags"], json!([9]));
    }

    #[test]
    fn missing_manifest_falls_back_to_the_registry() {
        let root = tempfile::tempdir().unwrap();
        let factory = WorkspaceFactory::new(root.path(), default_registry());
        let schema = factory.input_schema("hello").unwrap();
        assert!(schema.inputs.is_empty());
    }

    #[test]
    fn manifest_version_is_enforced() {
        let root = tempfile::tempdir().unwrap();
        let node_dir = root.path().join("nodes").join("custom");
        std::fs::create_dir_all(&node_dir).unwrap();
        std::fs::write(
            node_dir.join("node.yaml"),
            "version: \"1.1\"\ninputs:\n  x: {required: true}\n",
        )
        .unwrap();

        let factory = WorkspaceFactory::new(root.path(), default_registry());
        let err = factory.input_schema("custom").unwrap_err();
        assert!(matches!(err, FlowError::VersionMismatch { .. }));

        std::fs::write(
            node_dir.join("node.yaml"),
            "version: \"1.2\"\ninputs:\n  x: {required: false}\n",
        )
        .unwrap();
        let schema = factory.input_schema("custom").unwrap();
        assert!(!schema.inputs["x"].required);
    }

    #[test]
    fn node_configs_layer_under_descriptor_params() {
        let root = tempfile::tempdir().unwrap();
        let node_dir = root.path().join("nodes").join("hello");
        std::fs::create_dir_all(&node_dir).unwrap();
        std::fs::write(
            node_dir.join("config.yaml"),
            "message: \"from config\"\nextra: 7\n",
        )
        .unwrap();

        let mut descriptor = PipelineDescriptor::from_str(
            r#"
version: "1.2"
graph:
  nodes:
    - {id: "h", type: "hello", params: {message: "from descriptor"}}
  final: "h"
"#,
        )
        .unwrap();

        apply_node_configs(&mut descriptor, root.path()).unwrap();

        let params = &descriptor.graph.nodes[0].params;
        // Descriptor params win; config fills the gaps.
        assert_eq!(params["message"], json!("from descriptor"));
        assert_eq!(params["extra"], json!(7));
    }
}
