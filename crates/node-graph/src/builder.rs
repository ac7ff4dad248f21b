//! Fluent builder for graphs
//!
//! Provides a compact API for constructing graphs programmatically, mostly
//! for hosts seeding a canvas and for tests.

use crate::error::Result;
use crate::graph::Graph;
use crate::link::Group;
use crate::node::{InputSlot, Node, OutputSlot, Widget};
use crate::types::{NodeId, Rect};

/// Fluent builder for constructing a [`Graph`]
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new()
///     .add_node(1, "LoadImage", (0.0, 0.0))
///     .with_output("IMAGE", "IMAGE")
///     .add_node(2, "PreviewImage", (300.0, 0.0))
///     .with_input("images", "IMAGE")
///     .add_link(1, 0, 2, 0)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    links: Vec<(NodeId, usize, NodeId, usize)>,
    groups: Vec<Group>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with an explicit id
    pub fn add_node(
        mut self,
        id: impl Into<NodeId>,
        node_type: impl Into<String>,
        position: (f64, f64),
    ) -> Self {
        self.nodes.push(Node::new(node_type).with_id(id).at(position.0, position.1));
        self
    }

    /// Add a prepared node
    pub fn push_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an input slot to the most recently added node
    pub fn with_input(mut self, name: impl Into<String>, slot_type: &str) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.inputs.push(InputSlot::new(name, slot_type));
        }
        self
    }

    /// Add an output slot to the most recently added node
    pub fn with_output(mut self, name: impl Into<String>, slot_type: &str) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.outputs.push(OutputSlot::new(name, slot_type));
        }
        self
    }

    /// Add a widget to the most recently added node
    pub fn with_widget(
        mut self,
        name: impl Into<String>,
        widget_type: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.widgets.push(Widget::new(name, widget_type, value));
        }
        self
    }

    /// Connect two slots; links are created in insertion order on build
    pub fn add_link(
        mut self,
        origin: impl Into<NodeId>,
        origin_slot: usize,
        target: impl Into<NodeId>,
        target_slot: usize,
    ) -> Self {
        self.links.push((origin.into(), origin_slot, target.into(), target_slot));
        self
    }

    pub fn add_group(mut self, title: impl Into<String>, bounding: Rect) -> Self {
        self.groups.push(Group::new(title, bounding));
        self
    }

    /// Build a root graph, validating every link
    pub fn build(self) -> Result<Graph> {
        self.build_into(Graph::new())
    }

    /// Populate an existing (usually empty) graph
    pub fn build_into(self, mut graph: Graph) -> Result<Graph> {
        for node in self.nodes {
            graph.add_node(node);
        }
        for (origin, origin_slot, target, target_slot) in self.links {
            graph.connect(origin, origin_slot, target, target_slot)?;
        }
        for group in self.groups {
            graph.add_group(group);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    #[test]
    fn test_builder_basic() {
        let graph = GraphBuilder::new()
            .add_node(1, "LoadImage", (0.0, 0.0))
            .with_output("IMAGE", "IMAGE")
            .with_widget("image", "combo", serde_json::json!("a.png"))
            .add_node(2, "PreviewImage", (300.0, 0.0))
            .with_input("images", "IMAGE")
            .add_link(1, 0, 2, 0)
            .add_group("Inputs", Rect::new(-10.0, -10.0, 200.0, 100.0))
            .build()
            .unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.groups().len(), 1);
        assert_eq!(graph.node(NodeId(2)).unwrap().pos.x, 300.0);
        assert!(graph.node(NodeId(1)).unwrap().widget("image").is_some());
    }

    #[test]
    fn test_builder_rejects_bad_link() {
        let result = GraphBuilder::new()
            .add_node(1, "a", (0.0, 0.0))
            .with_output("out", "IMAGE")
            .add_node(2, "b", (0.0, 0.0))
            .with_input("in", "LATENT")
            .add_link(1, 0, 2, 0)
            .build();
        assert!(matches!(result, Err(GraphError::IncompatibleTypes { .. })));
    }
}
