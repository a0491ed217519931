//! The counter node: a per-instance monotonic count.
//!
//! Because node instances survive across loop iterations, the count keeps
//! climbing each time an enclosing loop re-enters the node, which makes
//! this the canonical loop-body progress marker.

use async_trait::async_trait;
use nodeflow_core::{NodeBehavior, OutputMap, RunOutcome};
use serde_json::{json, Map, Value};

/// Emits `{n: {count: <calls so far>}}`, stepping by `params.step`
/// (default 1).
#[derive(Debug, Default)]
pub struct CounterNode {
    count: i64,
}

#[async_trait]
impl NodeBehavior for CounterNode {
    async fn run(
        &mut self,
        _inputs: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> RunOutcome {
        let step = params.get("step").and_then(Value::as_i64).unwrap_or(1);
        self.count += step;
        let mut output = OutputMap::new();
        output.insert("n".to_string(), json!({"count": self.count}));
        RunOutcome::output(output)
    }
}
