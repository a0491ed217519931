//! Error types for descriptor loading and pipeline execution.
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//! Note that most failures during execution never surface as `Err`: the node
//! kernel converts behavior failures into the `fatal` status and containers
//! aggregate child statuses instead of propagating errors upward. The one
//! exception on the public API is [`FlowError::InvalidState`], raised when
//! `resume()` is called on a container that is not paused.

use thiserror::Error;

/// Convenience result type using [`FlowError`].
pub type Result<T> = std::result::Result<T, FlowError>;

/// Error type for all NodeFlow operations.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Descriptor version is missing or does not match the engine version.
    #[error("Unsupported descriptor version: {found}. Engine supports: {supported}")]
    VersionMismatch {
        /// The version string found in the descriptor ("missing" if absent)
        found: String,
        /// The version this engine supports
        supported: &'static str,
    },

    /// Descriptor structure is invalid (missing nodes, missing final, ...).
    #[error("Descriptor invalid: {0}")]
    Schema(String),

    /// The node factory has no behavior registered for a node type.
    #[error("Unknown node type: '{0}'")]
    UnknownNodeType(String),

    /// A node behavior failed while running.
    ///
    /// Captured by the node kernel as the `fatal` status; readable through
    /// `read_error()` on the node and aggregated by structural containers.
    #[error("Node execution failed: {0}")]
    NodeFatal(String),

    /// An output port value violated the output contract (non-object value,
    /// malformed `_meta`).
    #[error("Output port '{port}': {error}")]
    OutputPort {
        /// Name of the offending output port
        port: String,
        /// Description of the violation
        error: String,
    },

    /// A loop condition could not be constructed or evaluated.
    #[error("Condition error: {0}")]
    Condition(String),

    /// A public API call was made in a state that does not allow it
    /// (e.g. `resume()` while not paused).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error while reading descriptor files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Create a [`FlowError::NodeFatal`] from any displayable cause.
    pub fn node_fatal(error: impl Into<String>) -> Self {
        Self::NodeFatal(error.into())
    }

    /// Create a [`FlowError::VersionMismatch`] for a found version string.
    pub(crate) fn version_mismatch(found: Option<&str>) -> Self {
        Self::VersionMismatch {
            found: found.unwrap_or("missing").to_string(),
            supported: crate::yaml::SUPPORTED_VERSION,
        }
    }
}
