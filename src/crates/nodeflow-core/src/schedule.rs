//! The scheduler: output store, executability oracle and the step primitive.
//!
//! Scheduling is deliberately minimal. One call to [`Scheduler::step`] scans
//! the node descriptors in declared order, executes the first node that is
//! ready to run, saves its output, and returns. Everything above (driving
//! to quiescence, limits, idle detection, status aggregation) lives in the
//! pipeline container. There is no concurrency: one node per step,
//! synchronously awaited.

use crate::error::Result;
use crate::factory::NodeFactory;
use crate::loop_node::LoopNode;
use crate::node::{NodeCell, NodeInstance, OutputMap};
use crate::pipeline::PipelineNode;
use crate::resolve::{resolve_inputs, resolve_params, Resolved};
use crate::status::Status;
use crate::yaml::{GraphDescriptor, NodeDescriptor};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Reserved node type for a nested pipeline container.
pub const PIPELINE_TYPE: &str = "pipeline";
/// Reserved node type for a nested loop container.
pub const LOOP_TYPE: &str = "loop";

/// Latest outputs per node id.
///
/// Owned by the pipeline container and mutated only from within `step()`
/// (and the resume sweep). A node's entry is written only when its most
/// recent `execute()` returned a non-empty map, so a `done` node's last
/// output stays readable.
#[derive(Debug, Default)]
pub struct OutputStore {
    latest: HashMap<String, OutputMap>,
}

impl OutputStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's output. Empty maps are not recorded; the previous
    /// output (if any) stays current.
    pub fn save_output(&mut self, node_id: impl Into<String>, output: OutputMap) {
        if output.is_empty() {
            return;
        }
        self.latest.insert(node_id.into(), output);
    }

    /// The latest non-empty output of a node, if it has produced one.
    pub fn latest_output(&self, node_id: &str) -> Option<&OutputMap> {
        self.latest.get(node_id)
    }
}

/// Decide whether a node may run: its status admits execution (`ready`, or
/// `done` for re-entry by an enclosing loop) and every required input port
/// resolved. `pause`, `limit` and `fatal` are sticky until a parent
/// intervenes.
pub fn is_executable(
    status: Status,
    required_ports: &[String],
    resolved: &HashMap<String, Resolved>,
) -> bool {
    if !matches!(status, Status::Ready | Status::Done) {
        return false;
    }
    required_ports
        .iter()
        .all(|port| resolved.get(port).map(Resolved::is_resolved).unwrap_or(false))
}

/// One declared node with its instance and scheduling bookkeeping.
#[derive(Debug)]
pub(crate) struct ScheduledNode {
    pub(crate) descriptor: NodeDescriptor,
    pub(crate) required_ports: Vec<String>,
    pub(crate) instance: NodeInstance,
    /// Whether this node has run in the current drive. A node executes at
    /// most once per drive; the mark is cleared when a new drive begins, so
    /// an enclosing loop re-enters `done` nodes on its next invocation.
    ran_in_drive: bool,
}

/// Executes a graph's nodes one step at a time, in declared order.
#[derive(Debug)]
pub struct Scheduler {
    nodes: Vec<ScheduledNode>,
}

impl Scheduler {
    /// Instantiate every declared node through the factory.
    ///
    /// The reserved types `"pipeline"` and `"loop"` build nested containers
    /// from the descriptor's params; everything else is a leaf behavior.
    pub fn build(graph: &GraphDescriptor, factory: &Arc<dyn NodeFactory>) -> Result<Self> {
        let mut nodes = Vec::with_capacity(graph.nodes.len());
        for descriptor in &graph.nodes {
            let instance = match descriptor.node_type.as_str() {
                PIPELINE_TYPE => NodeInstance::Pipeline(PipelineNode::from_params(
                    &descriptor.params,
                    factory,
                )?),
                LOOP_TYPE => {
                    NodeInstance::Loop(LoopNode::from_params(&descriptor.params, factory)?)
                }
                node_type => {
                    NodeInstance::Leaf(NodeCell::new(factory.create(node_type)?))
                }
            };
            let required_ports = if instance.is_structural() {
                descriptor.inputs.keys().cloned().collect()
            } else {
                factory
                    .input_schema(&descriptor.node_type)?
                    .required_ports(&descriptor.inputs)
            };
            nodes.push(ScheduledNode {
                descriptor: descriptor.clone(),
                required_ports,
                instance,
                ran_in_drive: false,
            });
        }
        Ok(Self { nodes })
    }

    /// Begin a new drive: every node becomes selectable again (status
    /// permitting). Called by the container at the start of each `run`.
    pub fn begin_drive(&mut self) {
        for node in &mut self.nodes {
            node.ran_in_drive = false;
        }
    }

    /// Execute the first executable node in declared order.
    ///
    /// Returns `true` when a node ran (its non-empty output saved to the
    /// store), `false` when nothing is executable.
    pub async fn step(
        &mut self,
        store: &mut OutputStore,
        pipeline_inputs: &Map<String, Value>,
        pipeline_params: &Map<String, Value>,
    ) -> bool {
        for index in 0..self.nodes.len() {
            let resolved = {
                let node = &self.nodes[index];
                if node.ran_in_drive {
                    continue;
                }
                let resolved = resolve_inputs(
                    &node.descriptor.inputs,
                    store,
                    pipeline_inputs,
                    pipeline_params,
                );
                if !is_executable(node.instance.read_status(), &node.required_ports, &resolved) {
                    continue;
                }
                resolved
            };

            // Unresolved optional ports are omitted from the inputs map.
            let mut node_inputs = Map::new();
            for (port, value) in resolved {
                if let Resolved::Value(value) = value {
                    node_inputs.insert(port, value);
                }
            }

            let node = &mut self.nodes[index];
            let node_params =
                resolve_params(&node.descriptor.params, pipeline_params, pipeline_inputs);

            tracing::debug!(node = %node.descriptor.id, "executing node");
            let output = node.instance.execute(&node_inputs, &node_params).await;
            node.ran_in_drive = true;
            tracing::debug!(
                node = %node.descriptor.id,
                status = %node.instance.read_status(),
                ports = output.len(),
                "node finished"
            );
            store.save_output(node.descriptor.id.clone(), output);
            return true;
        }
        false
    }

    /// Current statuses of all nodes, in declared order.
    pub fn statuses(&self) -> Vec<Status> {
        self.nodes
            .iter()
            .map(|node| node.instance.read_status())
            .collect()
    }

    /// Ids of nodes currently in the given status, in declared order.
    pub fn ids_with_status(&self, status: Status) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| node.instance.read_status() == status)
            .map(|node| node.descriptor.id.clone())
            .collect()
    }

    /// Current status of one node, by id.
    pub fn status_of(&self, node_id: &str) -> Option<Status> {
        self.nodes
            .iter()
            .find(|node| node.descriptor.id == node_id)
            .map(|node| node.instance.read_status())
    }

    /// Sum of `read_node_calls()` over all children.
    pub fn child_calls(&self) -> u64 {
        self.nodes
            .iter()
            .map(|node| node.instance.read_node_calls())
            .sum()
    }

    pub(crate) fn nodes(&self) -> &[ScheduledNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [ScheduledNode] {
        &mut self.nodes
    }
}
