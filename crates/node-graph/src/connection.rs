//! Connection compatibility between a drag source and a drop candidate
//!
//! Both ends are closed enums over the slot direction, so every pairing is
//! matched explicitly. Nothing here fails: an endpoint that no longer
//! resolves is simply incompatible.

use crate::graph::Graph;
use crate::hit_test::{SlotDirection, SlotHit};
use crate::types::{NodeId, SlotType};

/// The slot a link drag started from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotDragSource {
    /// A fresh link leaving an output
    Output { node_id: NodeId, slot: usize },
    /// A link being dragged backwards from an unconnected input
    Input { node_id: NodeId, slot: usize },
}

impl SlotDragSource {
    pub fn node_id(&self) -> NodeId {
        match self {
            SlotDragSource::Output { node_id, .. } | SlotDragSource::Input { node_id, .. } => {
                *node_id
            }
        }
    }

    pub fn slot(&self) -> usize {
        match self {
            SlotDragSource::Output { slot, .. } | SlotDragSource::Input { slot, .. } => *slot,
        }
    }

    pub fn direction(&self) -> SlotDirection {
        match self {
            SlotDragSource::Output { .. } => SlotDirection::Output,
            SlotDragSource::Input { .. } => SlotDirection::Input,
        }
    }
}

impl From<SlotHit> for SlotDragSource {
    fn from(hit: SlotHit) -> Self {
        match hit.direction {
            SlotDirection::Output => SlotDragSource::Output {
                node_id: hit.node_id,
                slot: hit.slot,
            },
            SlotDirection::Input => SlotDragSource::Input {
                node_id: hit.node_id,
                slot: hit.slot,
            },
        }
    }
}

/// The slot under the pointer while a drag is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotDropCandidate {
    Input { node_id: NodeId, slot: usize },
    Output { node_id: NodeId, slot: usize },
}

impl SlotDropCandidate {
    pub fn node_id(&self) -> NodeId {
        match self {
            SlotDropCandidate::Input { node_id, .. }
            | SlotDropCandidate::Output { node_id, .. } => *node_id,
        }
    }

    pub fn slot(&self) -> usize {
        match self {
            SlotDropCandidate::Input { slot, .. } | SlotDropCandidate::Output { slot, .. } => *slot,
        }
    }
}

impl From<SlotHit> for SlotDropCandidate {
    fn from(hit: SlotHit) -> Self {
        match hit.direction {
            SlotDirection::Input => SlotDropCandidate::Input {
                node_id: hit.node_id,
                slot: hit.slot,
            },
            SlotDirection::Output => SlotDropCandidate::Output {
                node_id: hit.node_id,
                slot: hit.slot,
            },
        }
    }
}

fn input_type(graph: &Graph, node_id: NodeId, slot: usize) -> Option<SlotType> {
    Some(graph.node(node_id)?.input(slot)?.slot_type.clone())
}

fn output_type(graph: &Graph, node_id: NodeId, slot: usize) -> Option<SlotType> {
    Some(graph.node(node_id)?.output(slot)?.slot_type.clone())
}

/// Whether dropping on `candidate` would make a valid link
///
/// Only output→input and input→output pairs qualify. The source node's
/// [`can_connect_to`](crate::node::Node::can_connect_to) decides the rest,
/// called with the source side's type first.
pub fn is_connection_compatible(
    graph: &Graph,
    source: &SlotDragSource,
    candidate: &SlotDropCandidate,
) -> bool {
    let (first, second) = match (source, candidate) {
        (
            SlotDragSource::Output { node_id, slot },
            SlotDropCandidate::Input {
                node_id: target,
                slot: target_slot,
            },
        ) => (output_type(graph, *node_id, *slot), input_type(graph, *target, *target_slot)),
        (
            SlotDragSource::Input { node_id, slot },
            SlotDropCandidate::Output {
                node_id: origin,
                slot: origin_slot,
            },
        ) => (input_type(graph, *node_id, *slot), output_type(graph, *origin, *origin_slot)),
        (SlotDragSource::Output { .. }, SlotDropCandidate::Output { .. })
        | (SlotDragSource::Input { .. }, SlotDropCandidate::Input { .. }) => return false,
    };
    let (Some(first), Some(second)) = (first, second) else {
        return false;
    };
    let (Some(from), Some(to)) = (graph.node(source.node_id()), graph.node(candidate.node_id()))
    else {
        return false;
    };
    from.can_connect_to(to, &first, &second)
}
