//! # nodeflow-core - Dataflow Pipeline Execution
//!
//! NodeFlow executes a directed graph of computational *nodes* declared in a
//! YAML descriptor. Each node consumes named input ports and produces named
//! output ports; edges are declared as reference strings (`${producer.port}`,
//! `${inputs.x}`, `${params.k}`) that the engine resolves at scheduling time.
//!
//! The engine provides:
//!
//! - **A uniform node contract**: `execute(inputs, params)` with a fixed
//!   status machine (`ready → executing → done | pause | limit | fatal`),
//!   call counting, and content-hash revision stamping of every output
//! - **A deterministic scheduler**: nodes are inspected in declared order,
//!   one runs per step, outputs become visible to downstream nodes
//!   atomically
//! - **Structural composition**: pipelines and loops are themselves nodes;
//!   containers aggregate child statuses, propagate pause/resume, and
//!   enforce `max_total_node_calls` / `max_idle_sec` / `max_iterations`
//!   limits
//! - **Pause & resume**: a node suspends by returning a pause outcome; the
//!   parent container sticks at `pause` until `resume()` re-drives the
//!   paused children with the supplied inputs
//!
//! Execution is single-threaded cooperative: one logical thread of control
//! per execution scope. Node `run` is async so behaviors may perform I/O,
//! but the scheduler never runs two nodes concurrently.
//!
//! ## Quick start
//!
//! ```rust
//! use nodeflow_core::{
//!     run_pipeline, NodeBehavior, NodeFactory, PipelineDescriptor, RunOutcome, Status,
//! };
//! use async_trait::async_trait;
//! use serde_json::{json, Map, Value};
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl NodeBehavior for Hello {
//!     async fn run(&mut self, _inputs: &Map<String, Value>, params: &Map<String, Value>) -> RunOutcome {
//!         let message = params.get("message").and_then(Value::as_str).unwrap_or("Hello, World!");
//!         let mut output = Map::new();
//!         output.insert("message".to_string(), json!({"data": message}));
//!         RunOutcome::output(output)
//!     }
//! }
//!
//! struct Registry;
//!
//! impl NodeFactory for Registry {
//!     fn create(&self, _node_type: &str) -> nodeflow_core::Result<Box<dyn NodeBehavior>> {
//!         Ok(Box::new(Hello))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> nodeflow_core::Result<()> {
//! let descriptor = PipelineDescriptor::from_str(r#"
//! version: "1.2"
//! graph:
//!   nodes:
//!     - {id: "greet", type: "hello", params: {message: "hi"}}
//!   final: "greet"
//! "#)?;
//!
//! let run = run_pipeline(descriptor, Arc::new(Registry), Map::new()).await?;
//! assert_eq!(run.status, Status::Done);
//! assert_eq!(run.output["message"]["data"], json!("hi"));
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod engine;
pub mod error;
pub mod factory;
pub mod loop_node;
pub mod node;
pub mod pipeline;
pub mod resolve;
pub mod revision;
pub mod schedule;
pub mod status;
pub mod yaml;

pub use condition::{Condition, ConditionOp};
pub use engine::{run_pipeline, PipelineRun};
pub use error::{FlowError, Result};
pub use factory::NodeFactory;
pub use loop_node::LoopNode;
pub use node::{NodeBehavior, NodeCell, NodeInstance, OutputMap, PauseState, RunOutcome};
pub use pipeline::{PipelineNode, ResumeReport};
pub use resolve::{parse_reference, resolve_inputs, resolve_params, Resolved};
pub use revision::{canonical_json, stamp_revisions, strip_meta};
pub use schedule::{is_executable, OutputStore, Scheduler, LOOP_TYPE, PIPELINE_TYPE};
pub use status::{aggregate, Status};
pub use yaml::{
    GraphDescriptor, InputSchema, NodeDescriptor, PipelineDescriptor, PortSpec, SUPPORTED_VERSION,
};
