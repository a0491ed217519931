//! The hello node: emits a greeting message.

use async_trait::async_trait;
use nodeflow_core::{NodeBehavior, OutputMap, RunOutcome};
use serde_json::{json, Map, Value};

const DEFAULT_MESSAGE: &str = "Hello, World!";

/// Emits `{message: {data: <params.message>}}`.
#[derive(Debug, Default)]
pub struct HelloNode;

#[async_trait]
impl NodeBehavior for HelloNode {
    async fn run(
        &mut self,
        _inputs: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> RunOutcome {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MESSAGE);
        let mut output = OutputMap::new();
        output.insert("message".to_string(), json!({"data": message}));
        RunOutcome::output(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_core::NodeCell;

    #[tokio::test]
    async fn emits_the_configured_message() {
        let mut cell = NodeCell::new(Box::new(HelloNode));
        let params = match json!({"message": "hi"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let output = cell.execute(&Map::new(), &params).await;
        assert_eq!(output["message"]["data"], json!("hi"));
        assert_eq!(
            output["message"]["_meta"]["revision"],
            json!("e2f00ba955e8dc29cc3558e76fee43604b52bec17187e8c03bc1377fc6e5b749")
        );
    }

    #[tokio::test]
    async fn falls_back_to_the_default_message() {
        let mut cell = NodeCell::new(Box::new(HelloNode));
        let output = cell.execute(&Map::new(), &Map::new()).await;
        assert_eq!(output["message"]["data"], json!("Hello, World!"));
    }
}
