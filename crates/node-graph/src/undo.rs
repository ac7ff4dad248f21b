//! Undo/redo history of graph snapshots
//!
//! Each entry is the zstd-compressed JSON of an [`ExportedGraph`], so a
//! snapshot covers nested sub-graphs and restores through
//! [`import_graph`](crate::serialization::import_graph).

use std::collections::VecDeque;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::serialization::{export_graph, ExportedGraph};

const COMPRESSION_LEVEL: i32 = 3;

/// Undo/redo stack using compressed snapshots
#[derive(Debug)]
pub struct UndoStack {
    /// Compressed graph states (zstd)
    snapshots: VecDeque<Vec<u8>>,
    /// Current position in the stack
    current: usize,
    /// Maximum number of snapshots to keep
    max_snapshots: usize,
}

impl UndoStack {
    /// Create a new undo stack with the specified maximum size
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: 0,
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// Snapshot a live graph
    pub fn record(&mut self, graph: &Graph) -> Result<()> {
        self.push(&export_graph(graph))
    }

    /// Push a snapshot, dropping any redo history
    pub fn push(&mut self, snapshot: &ExportedGraph) -> Result<()> {
        let json = serde_json::to_vec(snapshot)?;
        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)
            .map_err(|e| GraphError::Compression(e.to_string()))?;

        if !self.snapshots.is_empty() {
            self.snapshots.truncate(self.current + 1);
        }
        self.snapshots.push_back(compressed);

        let overflow = self.snapshots.len().saturating_sub(self.max_snapshots);
        self.snapshots.drain(..overflow);
        self.current = self.snapshots.len() - 1;
        log::trace!("Undo snapshot {} of {} recorded", self.current + 1, self.snapshots.len());
        Ok(())
    }

    /// Step back one snapshot; `None` at the oldest entry
    pub fn undo(&mut self) -> Option<Result<ExportedGraph>> {
        let target = self.current.checked_sub(1)?;
        Some(self.seek(target))
    }

    /// Step forward one snapshot; `None` at the newest entry
    pub fn redo(&mut self) -> Option<Result<ExportedGraph>> {
        let target = self.current + 1;
        (target < self.snapshots.len()).then(|| self.seek(target))
    }

    pub fn current(&self) -> Option<Result<ExportedGraph>> {
        (!self.snapshots.is_empty()).then(|| self.decompress(self.current))
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.current = 0;
    }

    /// Total compressed size of all snapshots in bytes
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(|s| s.len()).sum()
    }

    fn seek(&mut self, index: usize) -> Result<ExportedGraph> {
        let snapshot = self.decompress(index)?;
        self.current = index;
        Ok(snapshot)
    }

    fn decompress(&self, index: usize) -> Result<ExportedGraph> {
        let compressed = self
            .snapshots
            .get(index)
            .ok_or_else(|| GraphError::Compression(format!("no snapshot at {}", index)))?;
        let json = zstd::decode_all(&compressed[..])
            .map_err(|e| GraphError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::serialization::import_graph;
    use crate::types::NodeId;

    fn make_graph(title: &str) -> Graph {
        let mut graph = Graph::new();
        graph.add_node(Node::new("test").with_id(1).with_title(title));
        graph
    }

    fn title(snapshot: ExportedGraph) -> String {
        snapshot.nodes[0].title.clone().unwrap()
    }

    #[test]
    fn test_push_and_undo() {
        let mut stack = UndoStack::new(10);

        stack.record(&make_graph("first")).unwrap();
        stack.record(&make_graph("second")).unwrap();
        stack.record(&make_graph("third")).unwrap();

        assert_eq!(title(stack.current().unwrap().unwrap()), "third");
        assert_eq!(title(stack.undo().unwrap().unwrap()), "second");
        assert_eq!(title(stack.undo().unwrap().unwrap()), "first");
        assert!(stack.undo().is_none());
    }

    #[test]
    fn test_redo() {
        let mut stack = UndoStack::new(10);
        stack.record(&make_graph("first")).unwrap();
        stack.record(&make_graph("second")).unwrap();

        stack.undo();
        assert_eq!(title(stack.redo().unwrap().unwrap()), "second");
        assert!(stack.redo().is_none());
    }

    #[test]
    fn test_push_truncates_redo() {
        let mut stack = UndoStack::new(10);
        stack.record(&make_graph("first")).unwrap();
        stack.record(&make_graph("second")).unwrap();
        stack.undo();

        stack.record(&make_graph("third")).unwrap();
        assert!(!stack.can_redo());
        assert_eq!(title(stack.current().unwrap().unwrap()), "third");
    }

    #[test]
    fn test_max_snapshots() {
        let mut stack = UndoStack::new(3);
        for i in 0..5 {
            stack.record(&make_graph(&format!("graph_{}", i))).unwrap();
        }

        assert_eq!(stack.len(), 3);
        assert_eq!(title(stack.current().unwrap().unwrap()), "graph_4");
        stack.undo();
        stack.undo();
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_corrupt_snapshot_keeps_position() {
        let mut stack = UndoStack::new(10);
        stack.record(&make_graph("first")).unwrap();
        stack.record(&make_graph("second")).unwrap();
        stack.snapshots[0] = vec![0, 1, 2, 3];

        assert!(matches!(stack.undo(), Some(Err(GraphError::Compression(_)))));
        assert!(stack.can_undo());
        assert!(!stack.can_redo());
        assert_eq!(title(stack.current().unwrap().unwrap()), "second");
    }

    #[test]
    fn test_snapshot_restores_graph() {
        let mut graph = make_graph("first");
        graph.add_node(Node::new("test").with_id(2));

        let mut stack = UndoStack::default();
        stack.record(&graph).unwrap();
        assert!(stack.compressed_size() > 0);

        let restored = import_graph(&stack.current().unwrap().unwrap()).unwrap();
        assert_eq!(restored.id(), graph.id());
        assert_eq!(restored.node_ids(), vec![NodeId(1), NodeId(2)]);
    }
}
