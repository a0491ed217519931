//! The node contract and execution kernel.
//!
//! A node is anything with `execute(inputs, params) → output map` plus the
//! `read_status` / `read_error` / `read_node_calls` observers. Leaf nodes are
//! user-implemented [`NodeBehavior`]s wrapped in a [`NodeCell`]; structural
//! nodes ([`PipelineNode`](crate::pipeline::PipelineNode),
//! [`LoopNode`](crate::loop_node::LoopNode)) are containers that obey the
//! same contract.
//!
//! # The execute contract
//!
//! `execute()` never fails and always returns a map (empty for
//! non-productive terminations). Its internal order is fixed:
//!
//! 1. increment the call counter
//! 2. transition to `executing`
//! 3. pre-limit hook; a breach ends the call as `limit` with `{}`
//! 4. run the behavior; `Pause` / `Limit` / `Fatal` outcomes become the
//!    matching status
//! 5. stamp `_meta.revision` onto every output port; a stamping failure is
//!    `fatal`
//! 6. post-limit hook; a breach ends the call as `limit`, but the output is
//!    still returned (it is valid and propagated)
//! 7. transition to `done`
//!
//! Behaviors signal suspension and limits through [`RunOutcome`] variants
//! rather than by unwinding, so the kernel is a plain match.

use crate::error::FlowError;
use crate::loop_node::LoopNode;
use crate::pipeline::PipelineNode;
use crate::revision::stamp_revisions;
use crate::status::Status;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// An output map: named output ports to their JSON object values.
pub type OutputMap = Map<String, Value>;

/// Result of one behavior `run`.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run produced output ports.
    Output(OutputMap),
    /// The behavior suspended itself awaiting external input.
    ///
    /// `resume_schema` is advisory: it tells the outside world what the
    /// resume inputs should look like; the engine does not interpret it.
    Pause {
        reason: String,
        resume_schema: Map<String, Value>,
    },
    /// The behavior hit a limit. `output` is usually empty; containers use
    /// it to surface a partial result alongside the `limit` status.
    Limit { reason: String, output: OutputMap },
    /// The behavior failed. `error` is `None` when the cause was already
    /// recorded elsewhere (a failed child of a container).
    Fatal { error: Option<FlowError> },
}

impl RunOutcome {
    /// A productive run with the given output ports.
    pub fn output(output: OutputMap) -> Self {
        RunOutcome::Output(output)
    }

    /// Suspend, with no resume schema.
    pub fn pause(reason: impl Into<String>) -> Self {
        RunOutcome::Pause {
            reason: reason.into(),
            resume_schema: Map::new(),
        }
    }

    /// Suspend, advertising the expected resume inputs.
    pub fn pause_with_schema(reason: impl Into<String>, resume_schema: Map<String, Value>) -> Self {
        RunOutcome::Pause {
            reason: reason.into(),
            resume_schema,
        }
    }

    /// A limit breach with no output.
    pub fn limit(reason: impl Into<String>) -> Self {
        RunOutcome::Limit {
            reason: reason.into(),
            output: OutputMap::new(),
        }
    }

    /// A limit breach that still surfaces a (possibly partial) output.
    pub fn limit_with_output(reason: impl Into<String>, output: OutputMap) -> Self {
        RunOutcome::Limit {
            reason: reason.into(),
            output,
        }
    }

    /// A failure with its cause.
    pub fn fatal(error: FlowError) -> Self {
        RunOutcome::Fatal { error: Some(error) }
    }
}

/// Pause details recorded by the kernel when a behavior suspends.
#[derive(Debug, Clone)]
pub struct PauseState {
    /// Why the behavior paused.
    pub reason: String,
    /// Advisory schema of the expected resume inputs.
    pub resume_schema: Map<String, Value>,
}

/// A leaf node behavior.
///
/// Implementations read their resolved `inputs` and frozen `params` (both
/// immutable borrows, so params cannot be mutated mid-call) and return a
/// [`RunOutcome`]. The limit hooks let a behavior interpret its
/// `params.limit` block; both default to "no limit".
#[async_trait]
pub trait NodeBehavior: Send {
    /// Run once. Output port values must be JSON objects.
    async fn run(&mut self, inputs: &Map<String, Value>, params: &Map<String, Value>)
        -> RunOutcome;

    /// Return true to end the call as `limit` before `run` is invoked.
    fn check_limit_pre(&mut self, _params: &Map<String, Value>) -> bool {
        false
    }

    /// Return true to end the call as `limit` after a successful `run`.
    /// The run's output is still returned to the caller.
    fn check_limit_post(&mut self, _params: &Map<String, Value>, _run_succeeded: bool) -> bool {
        false
    }
}

/// Mutable kernel state shared by leaf cells and structural containers.
#[derive(Debug, Default)]
pub(crate) struct KernelState {
    pub(crate) status: Status,
    pub(crate) error: Option<FlowError>,
    pub(crate) pause: Option<PauseState>,
    pub(crate) node_calls: u64,
}

impl KernelState {
    /// Enter `execute()`: count the call and transition to `executing`.
    fn begin(&mut self) {
        self.node_calls += 1;
        self.error = None;
        self.pause = None;
        self.status = Status::Executing;
    }

    /// Settle a run outcome into status + returned output.
    ///
    /// `Output` leaves the status at `executing` for the caller to finish
    /// (post-limit hook, promotion to `done`).
    fn finish(&mut self, outcome: RunOutcome) -> OutputMap {
        match outcome {
            RunOutcome::Output(mut output) => match stamp_revisions(&mut output) {
                Ok(()) => output,
                Err(error) => {
                    self.status = Status::Fatal;
                    self.error = Some(error);
                    OutputMap::new()
                }
            },
            RunOutcome::Pause {
                reason,
                resume_schema,
            } => {
                self.pause = Some(PauseState {
                    reason,
                    resume_schema,
                });
                self.status = Status::Pause;
                OutputMap::new()
            }
            RunOutcome::Limit { reason, output } => {
                tracing::debug!(%reason, "node limited");
                self.status = Status::Limit;
                output
            }
            RunOutcome::Fatal { error } => {
                self.status = Status::Fatal;
                self.error = error;
                OutputMap::new()
            }
        }
    }

    /// Promote a still-executing call to `done`.
    fn promote(&mut self) {
        if self.status == Status::Executing {
            self.status = Status::Done;
        }
    }
}

/// Drive one behavior call through the full execute contract.
pub(crate) async fn run_contract<B>(
    state: &mut KernelState,
    behavior: &mut B,
    inputs: &Map<String, Value>,
    params: &Map<String, Value>,
) -> OutputMap
where
    B: NodeBehavior + ?Sized,
{
    state.begin();

    if behavior.check_limit_pre(params) {
        state.status = Status::Limit;
        return OutputMap::new();
    }

    let outcome = behavior.run(inputs, params).await;
    let produced = matches!(outcome, RunOutcome::Output(_));
    let result = state.finish(outcome);

    if produced && state.status == Status::Executing && behavior.check_limit_post(params, true) {
        state.status = Status::Limit;
        return result;
    }

    state.promote();
    result
}

/// A leaf node: a user behavior plus its kernel state.
pub struct NodeCell {
    behavior: Box<dyn NodeBehavior>,
    state: KernelState,
}

impl std::fmt::Debug for NodeCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCell")
            .field("behavior", &"<dyn NodeBehavior>")
            .field("state", &self.state)
            .finish()
    }
}

impl NodeCell {
    /// Wrap a behavior into a fresh `ready` cell.
    pub fn new(behavior: Box<dyn NodeBehavior>) -> Self {
        Self {
            behavior,
            state: KernelState::default(),
        }
    }

    /// Execute the behavior once under the kernel contract.
    pub async fn execute(
        &mut self,
        inputs: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> OutputMap {
        run_contract(&mut self.state, self.behavior.as_mut(), inputs, params).await
    }

    /// Current status.
    pub fn read_status(&self) -> Status {
        self.state.status
    }

    /// The failure cause, exposed only while the status is `fatal`.
    pub fn read_error(&self) -> Option<&FlowError> {
        if self.state.status == Status::Fatal {
            self.state.error.as_ref()
        } else {
            None
        }
    }

    /// Pause details, exposed only while the status is `pause`.
    pub fn read_pause(&self) -> Option<&PauseState> {
        if self.state.status == Status::Pause {
            self.state.pause.as_ref()
        } else {
            None
        }
    }

    /// Number of `execute()` invocations on this cell.
    pub fn read_node_calls(&self) -> u64 {
        self.state.node_calls
    }
}

/// A scheduled node instance: leaf or structural container.
///
/// The scheduler holds every child through this enum so the step loop, the
/// observers and the resume sweep can treat leaves and containers uniformly
/// while still reaching the container-specific surface where needed.
#[derive(Debug)]
pub enum NodeInstance {
    /// A user-implemented leaf behavior.
    Leaf(NodeCell),
    /// A nested pipeline.
    Pipeline(PipelineNode),
    /// A nested loop.
    Loop(LoopNode),
}

impl NodeInstance {
    /// Execute this node once.
    pub async fn execute(
        &mut self,
        inputs: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> OutputMap {
        match self {
            NodeInstance::Leaf(cell) => cell.execute(inputs, params).await,
            NodeInstance::Pipeline(pipeline) => pipeline.execute(inputs, params).await,
            NodeInstance::Loop(loop_node) => loop_node.execute(inputs, params).await,
        }
    }

    /// Current status.
    pub fn read_status(&self) -> Status {
        match self {
            NodeInstance::Leaf(cell) => cell.read_status(),
            NodeInstance::Pipeline(pipeline) => pipeline.read_status(),
            NodeInstance::Loop(loop_node) => loop_node.read_status(),
        }
    }

    /// `execute()` invocations: a leaf counts itself, containers count
    /// themselves plus their whole subtree.
    pub fn read_node_calls(&self) -> u64 {
        match self {
            NodeInstance::Leaf(cell) => cell.read_node_calls(),
            NodeInstance::Pipeline(pipeline) => pipeline.read_node_calls(),
            NodeInstance::Loop(loop_node) => loop_node.read_node_calls(),
        }
    }

    /// Fatal causes: a leaf reports its own (if any), containers report the
    /// ordered causes of their subtree.
    pub fn read_errors(&self) -> Vec<&FlowError> {
        match self {
            NodeInstance::Leaf(cell) => cell.read_error().into_iter().collect(),
            NodeInstance::Pipeline(pipeline) => pipeline.read_errors(),
            NodeInstance::Loop(loop_node) => loop_node.read_errors(),
        }
    }

    /// Pause details, when paused.
    pub fn read_pause(&self) -> Option<&PauseState> {
        match self {
            NodeInstance::Leaf(cell) => cell.read_pause(),
            NodeInstance::Pipeline(pipeline) => pipeline.read_pause(),
            NodeInstance::Loop(loop_node) => loop_node.read_pause(),
        }
    }

    /// True for containers (pipelines and loops).
    pub fn is_structural(&self) -> bool {
        !matches!(self, NodeInstance::Leaf(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl NodeBehavior for Echo {
        async fn run(
            &mut self,
            inputs: &Map<String, Value>,
            _params: &Map<String, Value>,
        ) -> RunOutcome {
            let mut port = Map::new();
            port.insert("x".to_string(), inputs.get("x").cloned().unwrap_or(Value::Null));
            let mut output = OutputMap::new();
            output.insert("out".to_string(), Value::Object(port));
            RunOutcome::output(output)
        }
    }

    struct PauseOnce {
        paused: bool,
    }

    #[async_trait]
    impl NodeBehavior for PauseOnce {
        async fn run(
            &mut self,
            inputs: &Map<String, Value>,
            _params: &Map<String, Value>,
        ) -> RunOutcome {
            if !self.paused {
                self.paused = true;
                let mut schema = Map::new();
                schema.insert("token".to_string(), json!({"required": true}));
                return RunOutcome::pause_with_schema("waiting for token", schema);
            }
            let mut output = OutputMap::new();
            output.insert(
                "ok".to_string(),
                json!({"value": inputs.get("token").cloned().unwrap_or(Value::Null)}),
            );
            RunOutcome::output(output)
        }
    }

    struct AlwaysFatal;

    #[async_trait]
    impl NodeBehavior for AlwaysFatal {
        async fn run(
            &mut self,
            _inputs: &Map<String, Value>,
            _params: &Map<String, Value>,
        ) -> RunOutcome {
            RunOutcome::fatal(FlowError::node_fatal("boom"))
        }
    }

    struct HookLimited {
        pre: bool,
        post: bool,
    }

    #[async_trait]
    impl NodeBehavior for HookLimited {
        async fn run(
            &mut self,
            _inputs: &Map<String, Value>,
            _params: &Map<String, Value>,
        ) -> RunOutcome {
            let mut output = OutputMap::new();
            output.insert("out".to_string(), json!({"v": 1}));
            RunOutcome::output(output)
        }

        fn check_limit_pre(&mut self, _params: &Map<String, Value>) -> bool {
            self.pre
        }

        fn check_limit_post(&mut self, _params: &Map<String, Value>, _ok: bool) -> bool {
            self.post
        }
    }

    #[tokio::test]
    async fn productive_call_stamps_and_completes() {
        let mut cell = NodeCell::new(Box::new(Echo));
        let mut inputs = Map::new();
        inputs.insert("x".to_string(), json!(5));

        let output = cell.execute(&inputs, &Map::new()).await;

        assert_eq!(cell.read_status(), Status::Done);
        assert_eq!(cell.read_node_calls(), 1);
        assert_eq!(output["out"]["x"], json!(5));
        assert!(output["out"]["_meta"]["revision"].is_string());
    }

    #[tokio::test]
    async fn reentry_from_done_counts_again() {
        let mut cell = NodeCell::new(Box::new(Echo));
        cell.execute(&Map::new(), &Map::new()).await;
        cell.execute(&Map::new(), &Map::new()).await;
        assert_eq!(cell.read_status(), Status::Done);
        assert_eq!(cell.read_node_calls(), 2);
    }

    #[tokio::test]
    async fn pause_returns_empty_and_records_schema() {
        let mut cell = NodeCell::new(Box::new(PauseOnce { paused: false }));
        let output = cell.execute(&Map::new(), &Map::new()).await;

        assert!(output.is_empty());
        assert_eq!(cell.read_status(), Status::Pause);
        assert_eq!(cell.read_node_calls(), 1);
        let pause = cell.read_pause().expect("pause state");
        assert_eq!(pause.reason, "waiting for token");
        assert!(pause.resume_schema.contains_key("token"));

        // Resumed with the token, the behavior completes.
        let mut resume = Map::new();
        resume.insert("token".to_string(), json!(42));
        let output = cell.execute(&resume, &Map::new()).await;
        assert_eq!(cell.read_status(), Status::Done);
        assert_eq!(cell.read_node_calls(), 2);
        assert_eq!(output["ok"]["value"], json!(42));
        assert!(cell.read_pause().is_none());
    }

    #[tokio::test]
    async fn fatal_exposes_error_only_while_fatal() {
        let mut cell = NodeCell::new(Box::new(AlwaysFatal));
        let output = cell.execute(&Map::new(), &Map::new()).await;

        assert!(output.is_empty());
        assert_eq!(cell.read_status(), Status::Fatal);
        assert!(cell.read_error().is_some());
        assert_eq!(cell.read_node_calls(), 1);
    }

    #[tokio::test]
    async fn pre_limit_skips_run_but_counts_call() {
        let mut cell = NodeCell::new(Box::new(HookLimited {
            pre: true,
            post: false,
        }));
        let output = cell.execute(&Map::new(), &Map::new()).await;

        assert!(output.is_empty());
        assert_eq!(cell.read_status(), Status::Limit);
        assert_eq!(cell.read_node_calls(), 1);
    }

    #[tokio::test]
    async fn post_limit_still_returns_output() {
        let mut cell = NodeCell::new(Box::new(HookLimited {
            pre: false,
            post: true,
        }));
        let output = cell.execute(&Map::new(), &Map::new()).await;

        assert_eq!(cell.read_status(), Status::Limit);
        // The output is valid and propagated even though the call ends limited.
        assert_eq!(output["out"]["v"], json!(1));
        assert!(output["out"]["_meta"]["revision"].is_string());
    }

    struct BadOutput;

    #[async_trait]
    impl NodeBehavior for BadOutput {
        async fn run(
            &mut self,
            _inputs: &Map<String, Value>,
            _params: &Map<String, Value>,
        ) -> RunOutcome {
            let mut output = OutputMap::new();
            output.insert("out".to_string(), json!(17));
            RunOutcome::output(output)
        }
    }

    #[tokio::test]
    async fn stamping_failure_is_fatal() {
        let mut cell = NodeCell::new(Box::new(BadOutput));
        let output = cell.execute(&Map::new(), &Map::new()).await;

        assert!(output.is_empty());
        assert_eq!(cell.read_status(), Status::Fatal);
        assert!(matches!(
            cell.read_error(),
            Some(FlowError::OutputPort { .. })
        ));
    }
}
