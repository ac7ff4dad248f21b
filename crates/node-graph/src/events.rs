//! Layout change events
//!
//! Emitted by the [`LayoutStore`](crate::layout::LayoutStore) to its
//! subscribers, one event per single mutation or per transaction.

use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Where a layout change came from
///
/// Every source triggers the same one-way push to the renderer; the tag only
/// lets subscribers tell a drag apart from a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutSource {
    /// Editor command (add node, paste, undo, ...)
    External,
    /// Pointer drag of one or more nodes
    Drag,
    /// Renderer reporting its own measurements
    Canvas,
}

/// What happened to the affected nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutChangeKind {
    Create,
    Update,
    Delete,
    /// Transaction mixing several kinds
    Batch,
}

/// A batched notification `{ source, type, nodeIds }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutChange {
    pub source: LayoutSource,
    #[serde(rename = "type")]
    pub kind: LayoutChangeKind,
    pub node_ids: Vec<NodeId>,
}

impl LayoutChange {
    pub fn new(source: LayoutSource, kind: LayoutChangeKind, node_ids: Vec<NodeId>) -> Self {
        Self { source, kind, node_ids }
    }

    /// Fold another kind into this batch
    pub(crate) fn merge_kind(
        current: Option<LayoutChangeKind>,
        next: LayoutChangeKind,
    ) -> LayoutChangeKind {
        match current {
            None => next,
            Some(kind) if kind == next => kind,
            Some(_) => LayoutChangeKind::Batch,
        }
    }
}
