//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use node_graph::{
    CanvasRenderer, Graph, InputSlot, Node, NodeId, OutputSlot, Point, Rect, Size, SlotMetrics,
};

/// Graph with `A` (one `OUT:IMAGE` output) and `B` (one `IN:IMAGE` input)
pub fn make_pair() -> (Graph, NodeId, NodeId) {
    let mut graph = Graph::new();
    let a = graph.add_node(
        Node::new("A")
            .at(0.0, 0.0)
            .with_size(140.0, 60.0)
            .with_output(OutputSlot::new("OUT", "IMAGE")),
    );
    let b = graph.add_node(
        Node::new("B")
            .at(300.0, 0.0)
            .with_size(140.0, 60.0)
            .with_input(InputSlot::new("IN", "IMAGE")),
    );
    (graph, a, b)
}

pub fn output_anchor(graph: &Graph, node: NodeId, slot: usize) -> Point {
    SlotMetrics::default()
        .output_anchor(graph.node(node).expect("node exists"), slot)
        .expect("slot exists")
}

pub fn input_anchor(graph: &Graph, node: NodeId, slot: usize) -> Point {
    SlotMetrics::default()
        .input_anchor(graph.node(node).expect("node exists"), slot)
        .expect("slot exists")
}

/// Renderer double that records every write and redraw.
#[derive(Debug)]
pub struct RecordingRenderer {
    pub nodes: BTreeMap<NodeId, (Point, Size)>,
    pub hidden: BTreeSet<NodeId>,
    pub position_writes: usize,
    pub size_writes: usize,
    pub redraws: usize,
    pub offset: Point,
    pub scale: f64,
    pub viewport: Size,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            hidden: BTreeSet::new(),
            position_writes: 0,
            size_writes: 0,
            redraws: 0,
            offset: Point::default(),
            scale: 1.0,
            viewport: Size::new(1024.0, 768.0),
        }
    }

    pub fn add(&mut self, id: NodeId, pos: Point, size: Size) {
        self.nodes.insert(id, (pos, size));
    }
}

impl CanvasRenderer for RecordingRenderer {
    fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn node_position(&self, id: NodeId) -> Option<Point> {
        self.nodes.get(&id).map(|(p, _)| *p)
    }

    fn node_size(&self, id: NodeId) -> Option<Size> {
        self.nodes.get(&id).map(|(_, s)| *s)
    }

    fn set_node_position(&mut self, id: NodeId, position: Point) {
        if let Some(entry) = self.nodes.get_mut(&id) {
            entry.0 = position;
            self.position_writes += 1;
        }
    }

    fn set_node_size(&mut self, id: NodeId, size: Size) {
        if let Some(entry) = self.nodes.get_mut(&id) {
            entry.1 = size;
            self.size_writes += 1;
        }
    }

    fn request_redraw(&mut self) {
        self.redraws += 1;
    }

    fn offset(&self) -> Point {
        self.offset
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn viewport_size(&self) -> Size {
        self.viewport
    }

    fn rendered_node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    fn element_bounds(&self, id: NodeId) -> Option<Rect> {
        self.nodes.get(&id).map(|(p, s)| Rect::from_pos_size(*p, *s))
    }

    fn set_node_visible(&mut self, id: NodeId, visible: bool) {
        if visible {
            self.hidden.remove(&id);
        } else {
            self.hidden.insert(id);
        }
    }
}
