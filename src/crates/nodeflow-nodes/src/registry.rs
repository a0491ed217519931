//! Node registry: the in-memory [`NodeFactory`] implementation.
//!
//! The registry maps node type strings to behavior constructors and their
//! input schemas. Embedders register their own types next to the built-ins;
//! the engine only ever sees the [`NodeFactory`] trait.

use nodeflow_core::{FlowError, InputSchema, NodeBehavior, NodeFactory, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor producing a fresh behavior instance per graph node.
pub type BehaviorConstructor = Arc<dyn Fn() -> Box<dyn NodeBehavior> + Send + Sync>;

struct RegisteredNode {
    constructor: BehaviorConstructor,
    schema: InputSchema,
}

/// A name → constructor registry implementing [`NodeFactory`].
#[derive(Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, RegisteredNode>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type with an empty input schema (every declared
    /// binding required).
    pub fn register<F>(&mut self, node_type: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn NodeBehavior> + Send + Sync + 'static,
    {
        self.register_with_schema(node_type, InputSchema::default(), constructor);
    }

    /// Register a node type with its declared input schema.
    pub fn register_with_schema<F>(
        &mut self,
        node_type: impl Into<String>,
        schema: InputSchema,
        constructor: F,
    ) where
        F: Fn() -> Box<dyn NodeBehavior> + Send + Sync + 'static,
    {
        self.nodes.insert(
            node_type.into(),
            RegisteredNode {
                constructor: Arc::new(constructor),
                schema,
            },
        );
    }

    /// Registered node type names, sorted.
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl NodeFactory for NodeRegistry {
    fn create(&self, node_type: &str) -> Result<Box<dyn NodeBehavior>> {
        let registered = self
            .nodes
            .get(node_type)
            .ok_or_else(|| FlowError::UnknownNodeType(node_type.to_string()))?;
        tracing::debug!(node_type, "creating node behavior");
        Ok((registered.constructor)())
    }

    fn input_schema(&self, node_type: &str) -> Result<InputSchema> {
        Ok(self
            .nodes
            .get(node_type)
            .map(|registered| registered.schema.clone())
            .unwrap_or_default())
    }
}

/// Registry pre-populated with the built-in behaviors.
pub fn default_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register("hello", || Box::new(crate::hello::HelloNode::default()));
    registry.register("counter", || Box::new(crate::counter::CounterNode::default()));
    registry.register("passthrough", || {
        Box::new(crate::passthrough::PassthroughNode)
    });
    registry
}
