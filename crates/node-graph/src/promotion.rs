//! Widget promotion records
//!
//! Whether an interior widget is promoted to its sub-graph node's boundary is
//! tracked here, outside of nodes and widgets. One [`PromotionStore`] lives as
//! long as its root graph and is passed to whatever needs it.

use std::collections::{HashMap, HashSet};

use crate::node::Node;
use crate::types::{GraphId, NodeId, NodeLocator};

/// Promotion records scoped to one root graph
#[derive(Debug, Clone)]
pub struct PromotionStore {
    root_graph_id: GraphId,
    /// Sub-graph node → promoted `(interior node, widget name)` pairs
    records: HashMap<NodeLocator, HashSet<(NodeId, String)>>,
}

impl PromotionStore {
    pub fn new(root_graph_id: GraphId) -> Self {
        Self {
            root_graph_id,
            records: HashMap::new(),
        }
    }

    pub fn root_graph_id(&self) -> GraphId {
        self.root_graph_id
    }

    /// Record a widget as promoted; returns false if it already was
    pub fn promote(
        &mut self,
        subgraph_node: NodeLocator,
        interior_node: NodeId,
        widget: &str,
    ) -> bool {
        self.records
            .entry(subgraph_node)
            .or_default()
            .insert((interior_node, widget.to_string()))
    }

    /// Drop a promotion; returns false if it was not recorded
    pub fn demote(
        &mut self,
        subgraph_node: NodeLocator,
        interior_node: NodeId,
        widget: &str,
    ) -> bool {
        let Some(entries) = self.records.get_mut(&subgraph_node) else {
            return false;
        };
        let removed = entries.remove(&(interior_node, widget.to_string()));
        if entries.is_empty() {
            self.records.remove(&subgraph_node);
        }
        removed
    }

    pub fn is_promoted(
        &self,
        subgraph_node: NodeLocator,
        interior_node: NodeId,
        widget: &str,
    ) -> bool {
        self.records
            .get(&subgraph_node)
            .is_some_and(|entries| entries.contains(&(interior_node, widget.to_string())))
    }

    /// All promoted pairs recorded for a sub-graph node
    pub fn promoted_for(
        &self,
        subgraph_node: NodeLocator,
    ) -> impl Iterator<Item = &(NodeId, String)> {
        self.records.get(&subgraph_node).into_iter().flatten()
    }

    /// Forget every record of a sub-graph node; returns how many were dropped
    pub fn clear_subgraph_node(&mut self, subgraph_node: NodeLocator) -> usize {
        self.records.remove(&subgraph_node).map_or(0, |entries| entries.len())
    }

    /// Forget records of a removed node and of every sub-graph node nested in it
    pub fn forget_node(&mut self, graph_id: GraphId, node: &Node) -> usize {
        let Some(instance) = node.as_subgraph() else {
            return 0;
        };
        let mut cleared = self.clear_subgraph_node(NodeLocator::new(graph_id, node.id));
        let interior_id = instance.subgraph.id();
        for interior in instance.subgraph.graph.nodes() {
            cleared += self.forget_node(interior_id, interior);
        }
        cleared
    }

    pub fn len(&self) -> usize {
        self.records.values().map(|e| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Whether a sub-graph node still has enabled interior widgets that are not
/// promoted
///
/// Widgets with the same name on different interior nodes count separately.
/// Disabled widgets never count. Non-sub-graph nodes have none.
pub fn has_unpromoted_widgets(store: &PromotionStore, locator: NodeLocator, node: &Node) -> bool {
    let Some(instance) = node.as_subgraph() else {
        return false;
    };
    instance.subgraph.graph.nodes().iter().any(|interior| {
        interior
            .widgets
            .iter()
            .filter(|w| !w.computed_disabled)
            .any(|w| !store.is_promoted(locator, interior.id, &w.name))
    })
}
