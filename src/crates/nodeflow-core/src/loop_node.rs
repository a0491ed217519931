//! The loop container: a structural node iterating a pipeline.
//!
//! A loop wraps one inner [`PipelineNode`] and re-invokes it (same node
//! instances every iteration, so state a node learns in iteration N is
//! visible in N+1) until a [`Condition`] on the final node's latest output
//! holds, the inner pipeline terminates non-successfully, or
//! `params.limit.max_iterations` is exceeded.

use crate::condition::Condition;
use crate::error::{FlowError, Result};
use crate::factory::NodeFactory;
use crate::node::{run_contract, KernelState, NodeBehavior, OutputMap, PauseState, RunOutcome};
use crate::pipeline::{PipelineNode, ResumeReport};
use crate::status::Status;
use crate::yaml::GraphDescriptor;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug)]
struct LoopCore {
    condition: Condition,
    pipeline: PipelineNode,
}

impl LoopCore {
    #[tracing::instrument(skip_all)]
    async fn iterate(
        &mut self,
        inputs: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> RunOutcome {
        let max_iterations = params
            .get("limit")
            .and_then(|l| l.get("max_iterations"))
            .and_then(Value::as_u64);

        let mut iteration: u64 = 0;
        loop {
            iteration += 1;
            if let Some(max) = max_iterations {
                if iteration > max {
                    tracing::warn!(max_iterations = max, "iteration budget exceeded");
                    return RunOutcome::limit(format!("max_iterations={} exceeded", max));
                }
            }
            tracing::debug!(iteration, "running loop body");

            self.pipeline.execute(inputs, params).await;
            match self.pipeline.read_status() {
                Status::Fatal => return RunOutcome::Fatal { error: None },
                Status::Pause => {
                    let reason = self
                        .pipeline
                        .read_pause()
                        .map(|pause| pause.reason.clone())
                        .unwrap_or_else(|| "inner pipeline paused".to_string());
                    return RunOutcome::pause(reason);
                }
                Status::Limit => {
                    return RunOutcome::limit_with_output(
                        "inner pipeline hit a limit".to_string(),
                        self.pipeline.get_final_output(),
                    );
                }
                Status::Done => {
                    // The condition reads the final node's latest output,
                    // the single source of truth for condition input.
                    let latest = self
                        .pipeline
                        .get_latest_output(self.pipeline.final_id())
                        .cloned()
                        .unwrap_or_default();
                    match self.condition.evaluate(&Value::Object(latest)) {
                        Ok(true) => {
                            tracing::info!(iteration, "loop condition satisfied");
                            return RunOutcome::output(self.pipeline.get_final_output());
                        }
                        Ok(false) => continue,
                        Err(error) => return RunOutcome::fatal(error),
                    }
                }
                _ => continue,
            }
        }
    }
}

#[async_trait]
impl NodeBehavior for LoopCore {
    async fn run(
        &mut self,
        inputs: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> RunOutcome {
        self.iterate(inputs, params).await
    }
}

/// A structural node iterating a pipeline until a condition holds.
#[derive(Debug)]
pub struct LoopNode {
    state: KernelState,
    core: LoopCore,
}

impl LoopNode {
    /// Build a loop around a graph and a termination condition.
    pub fn new(
        graph: GraphDescriptor,
        condition: Condition,
        factory: Arc<dyn NodeFactory>,
    ) -> Result<Self> {
        Ok(Self {
            state: KernelState::default(),
            core: LoopCore {
                condition,
                pipeline: PipelineNode::new(graph, factory)?,
            },
        })
    }

    /// Build a nested loop from a node descriptor's params (`params.graph`
    /// holds the body, `params.condition` the termination condition).
    ///
    /// Fails fast when the condition is missing or names no operator.
    pub(crate) fn from_params(
        params: &Map<String, Value>,
        factory: &Arc<dyn NodeFactory>,
    ) -> Result<Self> {
        let graph_value = params
            .get("graph")
            .ok_or_else(|| FlowError::Schema("loop node requires params.graph".to_string()))?;
        let graph: GraphDescriptor = serde_json::from_value(graph_value.clone())?;
        let condition_value = params.get("condition").ok_or_else(|| {
            FlowError::Condition(
                "loop requires a condition (path + equals/not_equals/less_than/greater_than)"
                    .to_string(),
            )
        })?;
        let condition = Condition::from_value(condition_value)?;
        Self::new(graph, condition, factory.clone())
    }

    /// Execute the loop once under the node contract.
    pub async fn execute(
        &mut self,
        inputs: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> OutputMap {
        run_contract(&mut self.state, &mut self.core, inputs, params).await
    }

    /// Current status.
    pub fn read_status(&self) -> Status {
        self.state.status
    }

    /// Ordered fatal causes of the inner pipeline's subtree, then this
    /// loop's own cause (e.g. a condition failure) if it failed itself.
    pub fn read_errors(&self) -> Vec<&FlowError> {
        let mut errors = self.core.pipeline.read_errors();
        if self.state.status == Status::Fatal {
            if let Some(own) = self.state.error.as_ref() {
                errors.push(own);
            }
        }
        errors
    }

    /// Pause details, exposed only while paused.
    pub fn read_pause(&self) -> Option<&PauseState> {
        if self.state.status == Status::Pause {
            self.state.pause.as_ref()
        } else {
            None
        }
    }

    /// `execute()` invocations of this loop plus its whole subtree.
    pub fn read_node_calls(&self) -> u64 {
        self.state.node_calls + self.core.pipeline.read_node_calls()
    }

    /// The inner pipeline's final output.
    pub fn get_final_output(&self) -> OutputMap {
        self.core.pipeline.get_final_output()
    }

    /// Resume the paused inner pipeline, one layer deep.
    ///
    /// Legal only while this loop's status is `pause`. The loop's own
    /// status is left untouched; iteration cannot continue from a resume
    /// sweep; a driver re-executes the loop once the inner pipeline has
    /// progressed.
    pub async fn resume(&mut self, resume_inputs: &Map<String, Value>) -> Result<ResumeReport> {
        if self.state.status != Status::Pause {
            return Err(FlowError::InvalidState(format!(
                "resume() requires status 'pause', current status is '{}'",
                self.state.status
            )));
        }
        self.core.pipeline.resume(resume_inputs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Count {
        n: i64,
    }

    #[async_trait]
    impl NodeBehavior for Count {
        async fn run(
            &mut self,
            _inputs: &Map<String, Value>,
            _params: &Map<String, Value>,
        ) -> RunOutcome {
            self.n += 1;
            let mut output = OutputMap::new();
            output.insert("n".to_string(), json!({"count": self.n}));
            RunOutcome::output(output)
        }
    }

    struct CountFactory;

    impl NodeFactory for CountFactory {
        fn create(&self, _node_type: &str) -> Result<Box<dyn NodeBehavior>> {
            Ok(Box::new(Count { n: 0 }))
        }
    }

    fn body_graph() -> GraphDescriptor {
        serde_yaml::from_str(
            r#"
nodes:
  - {id: "tick", type: "count"}
final: "tick"
"#,
        )
        .unwrap()
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn terminates_when_condition_holds() {
        let condition =
            Condition::from_value(&json!({"path": "$.n.count", "greater_than": 2})).unwrap();
        let mut loop_node = LoopNode::new(body_graph(), condition, Arc::new(CountFactory)).unwrap();

        let output = loop_node.execute(&Map::new(), &Map::new()).await;

        assert_eq!(loop_node.read_status(), Status::Done);
        assert_eq!(output["n"]["count"], json!(3));
        // Three iterations: 3 pipeline calls + 3 leaf calls + the loop itself.
        assert_eq!(loop_node.read_node_calls(), 7);
    }

    #[tokio::test]
    async fn max_iterations_breach_is_limit() {
        let condition =
            Condition::from_value(&json!({"path": "$.n.count", "greater_than": 1000})).unwrap();
        let mut loop_node = LoopNode::new(body_graph(), condition, Arc::new(CountFactory)).unwrap();
        let loop_params = params(json!({"limit": {"max_iterations": 3}}));

        let output = loop_node.execute(&Map::new(), &loop_params).await;

        assert_eq!(loop_node.read_status(), Status::Limit);
        assert!(output.is_empty());
        // Exactly three body iterations ran before the breach.
        assert_eq!(loop_node.core.pipeline.read_node_calls(), 6);
    }

    #[tokio::test]
    async fn condition_failure_is_fatal_with_cause() {
        let condition =
            Condition::from_value(&json!({"path": "$.n.ghost", "greater_than": 1})).unwrap();
        let mut loop_node = LoopNode::new(body_graph(), condition, Arc::new(CountFactory)).unwrap();

        let output = loop_node.execute(&Map::new(), &Map::new()).await;

        assert!(output.is_empty());
        assert_eq!(loop_node.read_status(), Status::Fatal);
        let errors = loop_node.read_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], FlowError::Condition(_)));
    }

    #[test]
    fn from_params_requires_condition() {
        let factory: Arc<dyn NodeFactory> = Arc::new(CountFactory);
        let missing = params(json!({
            "graph": {"nodes": [{"id": "tick", "type": "count"}], "final": "tick"},
        }));
        assert!(matches!(
            LoopNode::from_params(&missing, &factory),
            Err(FlowError::Condition(_))
        ));

        let no_operator = params(json!({
            "graph": {"nodes": [{"id": "tick", "type": "count"}], "final": "tick"},
            "condition": {"path": "$.n.count"},
        }));
        assert!(matches!(
            LoopNode::from_params(&no_operator, &factory),
            Err(FlowError::Condition(_))
        ));
    }
}
