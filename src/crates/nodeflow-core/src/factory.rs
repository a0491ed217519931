//! The boundary through which user node implementations enter the engine.
//!
//! The engine never loads user code itself. A [`NodeFactory`] maps node type
//! strings to fresh [`NodeBehavior`] instances and to their declared input
//! schemas; how the factory finds implementations (a compile-time registry,
//! a plugin system, a workspace adapter) is the embedder's concern.

use crate::error::Result;
use crate::node::NodeBehavior;
use crate::yaml::InputSchema;

/// Creates node behaviors and reports their input schemas.
pub trait NodeFactory: Send + Sync {
    /// Create a fresh behavior for a node type.
    ///
    /// Returns [`FlowError::UnknownNodeType`](crate::FlowError::UnknownNodeType)
    /// when the type has no registered implementation.
    fn create(&self, node_type: &str) -> Result<Box<dyn NodeBehavior>>;

    /// The declared input ports of a node type.
    ///
    /// The default, an empty schema, makes every declared binding of the
    /// node required.
    fn input_schema(&self, _node_type: &str) -> Result<InputSchema> {
        Ok(InputSchema::default())
    }
}
