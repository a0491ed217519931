//! # nodeflow-nodes - Built-in node behaviors
//!
//! Ready-made [`NodeBehavior`](nodeflow_core::NodeBehavior) implementations
//! and the [`NodeRegistry`], the in-memory
//! [`NodeFactory`](nodeflow_core::NodeFactory) through which they (and any
//! embedder-registered types) reach the engine.

pub mod counter;
pub mod hello;
pub mod passthrough;
pub mod registry;

pub use counter::CounterNode;
pub use hello::HelloNode;
pub use passthrough::PassthroughNode;
pub use registry::{default_registry, BehaviorConstructor, NodeRegistry};
