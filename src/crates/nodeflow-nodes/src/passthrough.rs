//! The passthrough node: forwards its input ports unchanged.
//!
//! Input port values that are already stamped output objects keep their
//! revision: forwarding preserves content identity.

use async_trait::async_trait;
use nodeflow_core::{NodeBehavior, OutputMap, RunOutcome};
use serde_json::{Map, Value};

/// Emits every input port as an output port with the same name and value.
#[derive(Debug)]
pub struct PassthroughNode;

#[async_trait]
impl NodeBehavior for PassthroughNode {
    async fn run(
        &mut self,
        inputs: &Map<String, Value>,
        _params: &Map<String, Value>,
    ) -> RunOutcome {
        let mut output = OutputMap::new();
        for (port, value) in inputs {
            output.insert(port.clone(), value.clone());
        }
        RunOutcome::output(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_core::NodeCell;
    use serde_json::json;

    #[tokio::test]
    async fn forwards_ports_and_keeps_existing_revisions() {
        let mut cell = NodeCell::new(Box::new(PassthroughNode));
        let inputs = match json!({
            "a": {"v": 1, "_meta": {"revision": "upstream"}},
            "b": {"v": 2},
        }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };

        let output = cell.execute(&inputs, &Map::new()).await;

        assert_eq!(output["a"]["_meta"]["revision"], json!("upstream"));
        assert_eq!(output["b"]["v"], json!(2));
        assert!(output["b"]["_meta"]["revision"].is_string());
    }
}
