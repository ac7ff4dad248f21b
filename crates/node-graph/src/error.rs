//! Error types for the node graph

use thiserror::Error;

use crate::types::{LinkId, NodeId};

/// Result type alias using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur while mutating or (de)serializing a graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node id did not resolve in the graph it was looked up in
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A link id did not resolve
    #[error("Link not found: {0}")]
    LinkNotFound(LinkId),

    /// A slot index is out of range for the node
    #[error("Slot {slot} not found on node {node_id} ({direction})")]
    SlotNotFound {
        node_id: NodeId,
        slot: usize,
        direction: &'static str,
    },

    /// A sub-graph id did not resolve
    #[error("Sub-graph not found: {0}")]
    SubgraphNotFound(String),

    /// A node exists but is not a sub-graph node
    #[error("Node {0} is not a sub-graph node")]
    NotASubgraphNode(NodeId),

    /// A widget name did not resolve on a node
    #[error("Widget '{widget}' not found on node {node_id}")]
    WidgetNotFound { node_id: NodeId, widget: String },

    /// A link could not be created between the given slots
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    /// Slot types do not accept each other
    #[error("Incompatible slot types: {output} -> {input}")]
    IncompatibleTypes { output: String, input: String },

    /// The node type is not known to the registry
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// The selection cannot be used for the requested operation
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// A reference inside a pasted payload did not map to a fresh id
    #[error("Identity remap failed: {0}")]
    IdentityRemap(String),

    /// An imported graph failed structural validation
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Create an invalid link error with a message
    pub fn invalid_link(msg: impl Into<String>) -> Self {
        Self::InvalidLink(msg.into())
    }

    /// Create an identity remap error with a message
    pub fn remap(msg: impl Into<String>) -> Self {
        Self::IdentityRemap(msg.into())
    }
}
