//! The pipeline container: a structural node wrapping a sub-graph.
//!
//! A pipeline obeys the node contract itself (`execute` / `read_status` /
//! `read_error` / `read_node_calls`) and drives its children to quiescence:
//!
//! ```text
//! execute(inputs, params)
//!   └─ drive loop:
//!        step() ──run first executable child── save output
//!        ├─ re-check pipeline limits (max_total_node_calls)
//!        ├─ aggregate child statuses
//!        │    fatal | limit | pause  → terminate with that status
//!        │    done + final node done → success, return final output
//!        └─ no progress → idle clock; max_idle_sec breach → limit
//! ```
//!
//! The container exclusively owns its scheduler, node instances and output
//! store; children are never reached from outside their parent. Node
//! instances survive across `execute` calls, so an enclosing loop re-enters
//! `done` nodes with their internal state intact.

use crate::error::{FlowError, Result};
use crate::factory::NodeFactory;
use crate::node::{run_contract, KernelState, NodeBehavior, NodeInstance, OutputMap, PauseState, RunOutcome};
use crate::resolve::resolve_params;
use crate::schedule::{OutputStore, Scheduler};
use crate::status::{aggregate, Status};
use crate::yaml::GraphDescriptor;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sleep between unproductive steps while waiting out an idle budget.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Pipeline-level limits read from `params.limit`.
#[derive(Debug, Clone, Copy, Default)]
struct PipelineLimits {
    max_total_node_calls: Option<u64>,
    max_idle_sec: Option<f64>,
}

impl PipelineLimits {
    fn from_params(params: &Map<String, Value>) -> Self {
        let limit = params.get("limit").and_then(Value::as_object);
        Self {
            max_total_node_calls: limit
                .and_then(|l| l.get("max_total_node_calls"))
                .and_then(Value::as_u64),
            max_idle_sec: limit.and_then(|l| l.get("max_idle_sec")).and_then(Value::as_f64),
        }
    }

    fn calls_breach(&self, calls: u64) -> Option<String> {
        match self.max_total_node_calls {
            Some(max) if calls > max => Some(format!("max_total_node_calls={} exceeded", max)),
            _ => None,
        }
    }
}

/// Result of one `resume()` sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeReport {
    /// Ids of the children that were resumed, in declared order.
    pub resumed: Vec<String>,
    /// Status of every child after the sweep.
    pub statuses: BTreeMap<String, Status>,
}

/// The drive-to-quiescence behavior behind [`PipelineNode`].
#[derive(Debug)]
pub(crate) struct PipelineCore {
    final_id: String,
    scheduler: Scheduler,
    store: OutputStore,
    /// Pipeline inputs/params captured at the last run entry; the resume
    /// sweep resolves leaf params against these.
    last_scope: Option<(Map<String, Value>, Map<String, Value>)>,
}

impl PipelineCore {
    fn final_output(&self) -> OutputMap {
        self.store
            .latest_output(&self.final_id)
            .cloned()
            .unwrap_or_default()
    }

    #[tracing::instrument(skip_all, fields(final_node = %self.final_id))]
    async fn drive(
        &mut self,
        inputs: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> RunOutcome {
        self.last_scope = Some((inputs.clone(), params.clone()));
        let limits = PipelineLimits::from_params(params);
        self.scheduler.begin_drive();

        if let Some(reason) = limits.calls_breach(self.scheduler.child_calls()) {
            tracing::warn!(%reason, "pipeline limit breached at entry");
            return RunOutcome::limit(reason);
        }

        let mut idle_since: Option<Instant> = None;
        loop {
            let progressed = self.scheduler.step(&mut self.store, inputs, params).await;
            if progressed {
                idle_since = None;
            }

            if let Some(reason) = limits.calls_breach(self.scheduler.child_calls()) {
                tracing::warn!(%reason, "pipeline limit breached");
                return RunOutcome::limit_with_output(reason, self.final_output());
            }

            match aggregate(&self.scheduler.statuses()) {
                Status::Fatal => {
                    tracing::warn!(
                        nodes = ?self.scheduler.ids_with_status(Status::Fatal),
                        "child failed, terminating pipeline"
                    );
                    return RunOutcome::Fatal { error: None };
                }
                Status::Limit => {
                    let limited = self.scheduler.ids_with_status(Status::Limit);
                    tracing::warn!(nodes = ?limited, "child hit a limit, terminating pipeline");
                    return RunOutcome::limit(format!(
                        "limited children: {}",
                        limited.join(", ")
                    ));
                }
                Status::Pause => {
                    let paused = self.scheduler.ids_with_status(Status::Pause);
                    tracing::info!(nodes = ?paused, "pipeline paused");
                    return RunOutcome::pause(format!("paused children: {}", paused.join(", ")));
                }
                Status::Done if self.scheduler.status_of(&self.final_id) == Some(Status::Done) => {
                    tracing::info!("pipeline completed");
                    return RunOutcome::output(self.final_output());
                }
                _ => {}
            }

            if !progressed {
                let since = *idle_since.get_or_insert_with(Instant::now);
                match limits.max_idle_sec {
                    None => {
                        tracing::warn!("pipeline is idle and no further progress is possible");
                        return RunOutcome::limit_with_output(
                            "pipeline idle with no executable node".to_string(),
                            self.final_output(),
                        );
                    }
                    Some(budget) if since.elapsed().as_secs_f64() >= budget => {
                        tracing::warn!(max_idle_sec = budget, "idle budget exceeded");
                        return RunOutcome::limit_with_output(
                            format!("max_idle_sec={} exceeded", budget),
                            self.final_output(),
                        );
                    }
                    Some(_) => tokio::time::sleep(IDLE_POLL).await,
                }
            }
        }
    }
}

#[async_trait]
impl NodeBehavior for PipelineCore {
    async fn run(
        &mut self,
        inputs: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> RunOutcome {
        self.drive(inputs, params).await
    }
}

/// A structural node executing a graph of children.
#[derive(Debug)]
pub struct PipelineNode {
    state: KernelState,
    core: PipelineCore,
}

impl PipelineNode {
    /// Build a pipeline container, instantiating every declared node
    /// through the factory.
    pub fn new(graph: GraphDescriptor, factory: Arc<dyn NodeFactory>) -> Result<Self> {
        graph.validate()?;
        let scheduler = Scheduler::build(&graph, &factory)?;
        Ok(Self {
            state: KernelState::default(),
            core: PipelineCore {
                final_id: graph.final_id,
                scheduler,
                store: OutputStore::new(),
                last_scope: None,
            },
        })
    }

    /// Build a nested pipeline from a node descriptor's params
    /// (`params.graph` holds the sub-graph).
    pub(crate) fn from_params(
        params: &Map<String, Value>,
        factory: &Arc<dyn NodeFactory>,
    ) -> Result<Self> {
        let graph_value = params.get("graph").ok_or_else(|| {
            FlowError::Schema("pipeline node requires params.graph".to_string())
        })?;
        let graph: GraphDescriptor = serde_json::from_value(graph_value.clone())?;
        Self::new(graph, factory.clone())
    }

    /// Execute the pipeline once under the node contract.
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

    /// Ordered fatal causes of the subtree, then this container's own
    /// cause if it failed itself.
    pub fn read_errors(&self) -> Vec<&FlowError> {
        let mut errors: Vec<&FlowError> = self
            .core
            .scheduler
            .nodes()
            .iter()
            .flat_map(|node| node.instance.read_errors())
            .collect();
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

    /// `execute()` invocations of this container plus its whole subtree.
    pub fn read_node_calls(&self) -> u64 {
        self.state.node_calls + self.core.scheduler.child_calls()
    }

    /// Id of the designated final node.
    pub fn final_id(&self) -> &str {
        &self.core.final_id
    }

    /// The latest non-empty output of one child.
    pub fn get_latest_output(&self, node_id: &str) -> Option<&OutputMap> {
        self.core.store.latest_output(node_id)
    }

    /// The final node's latest output, or empty if it has not produced one.
    pub fn get_final_output(&self) -> OutputMap {
        self.core.final_output()
    }

    /// Resume paused children, one layer deep.
    ///
    /// Legal only while this container's status is `pause`; otherwise
    /// [`FlowError::InvalidState`] is returned and no child is touched.
    /// Children are swept in declared order: structural children are
    /// resumed recursively (their final output saved on success; a fatal
    /// child stops the sweep), leaf children are re-executed with the
    /// resume inputs. The container's status is recomputed from its
    /// children afterwards; drivers may call `resume` repeatedly until the
    /// status progresses past `pause`.
    pub async fn resume(&mut self, resume_inputs: &Map<String, Value>) -> Result<ResumeReport> {
        if self.state.status != Status::Pause {
            return Err(FlowError::InvalidState(format!(
                "resume() requires status 'pause', current status is '{}'",
                self.state.status
            )));
        }

        let (scope_inputs, scope_params) = self.core.last_scope.clone().unwrap_or_default();
        let mut resumed = Vec::new();
        let node_count = self.core.scheduler.nodes().len();

        enum Swept {
            Leaf(OutputMap),
            Structural(Status, OutputMap),
        }

        for index in 0..node_count {
            let (id, descriptor_params) = {
                let node = &self.core.scheduler.nodes()[index];
                if node.instance.read_status() != Status::Pause {
                    continue;
                }
                (node.descriptor.id.clone(), node.descriptor.params.clone())
            };

            tracing::info!(node = %id, "resuming child");
            let swept = {
                let node = &mut self.core.scheduler.nodes_mut()[index];
                match &mut node.instance {
                    NodeInstance::Leaf(cell) => {
                        let node_params =
                            resolve_params(&descriptor_params, &scope_params, &scope_inputs);
                        Swept::Leaf(cell.execute(resume_inputs, &node_params).await)
                    }
                    NodeInstance::Pipeline(child) => {
                        Box::pin(child.resume(resume_inputs)).await?;
                        Swept::Structural(child.read_status(), child.get_final_output())
                    }
                    NodeInstance::Loop(child) => {
                        Box::pin(child.resume(resume_inputs)).await?;
                        Swept::Structural(child.read_status(), child.get_final_output())
                    }
                }
            };
            resumed.push(id.clone());

            match swept {
                Swept::Leaf(output) => self.core.store.save_output(id, output),
                Swept::Structural(Status::Fatal, _) => {
                    tracing::warn!(node = %id, "resumed child failed, stopping sweep");
                    break;
                }
                Swept::Structural(_, final_output) => {
                    self.core.store.save_output(id, final_output)
                }
            }
        }

        self.state.status = aggregate(&self.core.scheduler.statuses());
        let statuses = self
            .core
            .scheduler
            .nodes()
            .iter()
            .map(|node| (node.descriptor.id.clone(), node.instance.read_status()))
            .collect();
        Ok(ResumeReport { resumed, statuses })
    }
}
