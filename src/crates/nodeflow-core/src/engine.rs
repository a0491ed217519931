//! Top-level pipeline entry point.

use crate::error::Result;
use crate::factory::NodeFactory;
use crate::node::OutputMap;
use crate::pipeline::PipelineNode;
use crate::status::Status;
use crate::yaml::PipelineDescriptor;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Outcome of one top-level pipeline execution.
#[derive(Debug, Serialize)]
pub struct PipelineRun {
    /// Terminal status of the root container.
    pub status: Status,
    /// The final node's output on success; possibly partial on `limit`,
    /// empty otherwise.
    pub output: OutputMap,
    /// Rendered fatal causes from the whole tree, in declared order.
    pub errors: Vec<String>,
    /// Total `execute()` invocations across the tree, root included.
    pub node_calls: u64,
}

/// Validate a descriptor, build the root pipeline container and execute it.
///
/// Returns `Err` only for descriptor/build failures (version mismatch,
/// invalid graph, unknown node types); execution failures are reported
/// through [`PipelineRun::status`] and [`PipelineRun::errors`].
#[tracing::instrument(skip_all)]
pub async fn run_pipeline(
    descriptor: PipelineDescriptor,
    factory: Arc<dyn NodeFactory>,
    initial_inputs: Map<String, Value>,
) -> Result<PipelineRun> {
    descriptor.validate()?;
    let PipelineDescriptor { graph, params, .. } = descriptor;

    let mut root = PipelineNode::new(graph, factory)?;
    tracing::info!("starting pipeline execution");
    let output = root.execute(&initial_inputs, &params).await;
    let status = root.read_status();
    tracing::info!(%status, "pipeline execution finished");

    Ok(PipelineRun {
        status,
        output,
        errors: root
            .read_errors()
            .iter()
            .map(|error| error.to_string())
            .collect(),
        node_calls: root.read_node_calls(),
    })
}
