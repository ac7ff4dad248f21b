//! Editor command surface
//!
//! [`GraphEditor`] owns the root graph together with the state that lives
//! alongside it: promotion records, the layout store, selection, clipboard,
//! link drag and undo history. Every command mutates the graph synchronously
//! and records one undo snapshot.

use std::collections::HashSet;

use uuid::Uuid;

use crate::clipboard::{copy_nodes, paste, ClipboardPayload, PasteResult};
use crate::config::EditorConfig;
use crate::drag::{DragOutcome, LinkDragController, PointerId};
use crate::error::{GraphError, Result};
use crate::events::LayoutSource;
use crate::extensions::{
    unpromoted_widgets_badge, DrawCommand, RenderDecorators, UNPROMOTED_WIDGETS_DECORATOR,
};
use crate::graph::Graph;
use crate::hit_test::{nodes_in_rect, SlotMetrics};
use crate::layout::{LayoutStore, NodeLayout};
use crate::node::{Node, ProxyWidget};
use crate::promotion::PromotionStore;
use crate::registry::NodeTypeRegistry;
use crate::serialization::{
    export_graph, export_subgraph, import_graph, ExportedGraph, ExportedSubgraph,
};
use crate::subgraph::{convert_to_subgraph, ConvertResult};
use crate::types::{GraphId, NodeId, NodeLocator, Point, Rect};
use crate::undo::UndoStack;
use crate::validation::{validate_graph, ValidationError};

/// A sub-graph definition ready to be stored as a reusable blueprint
#[derive(Debug, Clone)]
pub struct PublishedSubgraph {
    pub definition: ExportedSubgraph,
    /// Definitions of sub-graphs nested inside `definition`
    pub dependencies: Vec<ExportedSubgraph>,
}

/// Editing session over one root graph
pub struct GraphEditor {
    graph: Graph,
    config: EditorConfig,
    registry: NodeTypeRegistry,
    promotions: PromotionStore,
    layout: LayoutStore,
    history: UndoStack,
    selection: Vec<NodeId>,
    clipboard: Option<ClipboardPayload>,
    drag: LinkDragController,
    decorators: RenderDecorators,
}

impl GraphEditor {
    /// Start a session on an empty graph
    pub fn new(config: EditorConfig, registry: NodeTypeRegistry) -> Result<Self> {
        Self::with_graph(Graph::new(), config, registry)
    }

    /// Start a session on an existing graph
    ///
    /// Promotion records are rebuilt from the sub-graph nodes' proxy widgets.
    pub fn with_graph(
        graph: Graph,
        config: EditorConfig,
        registry: NodeTypeRegistry,
    ) -> Result<Self> {
        let drag = LinkDragController::new(SlotMetrics::from(&config))
            .with_replace_input_links(config.replace_input_links);
        let mut decorators = RenderDecorators::new();
        decorators.register(UNPROMOTED_WIDGETS_DECORATOR, unpromoted_widgets_badge);

        let mut editor = Self {
            promotions: promotions_from_graph(&graph),
            layout: LayoutStore::new(),
            history: UndoStack::new(config.max_undo_snapshots),
            selection: Vec::new(),
            clipboard: None,
            drag,
            decorators,
            registry,
            config,
            graph,
        };
        editor.layout.sync_from_graph(LayoutSource::External, &editor.graph);
        editor.history.record(&editor.graph)?;
        Ok(editor)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    pub fn promotions(&self) -> &PromotionStore {
        &self.promotions
    }

    /// Shared handle to the layout store
    pub fn layout(&self) -> LayoutStore {
        self.layout.clone()
    }

    pub fn selection(&self) -> &[NodeId] {
        &self.selection
    }

    pub fn clipboard(&self) -> Option<&ClipboardPayload> {
        self.clipboard.as_ref()
    }

    pub fn drag(&self) -> &LinkDragController {
        &self.drag
    }

    pub fn decorators_mut(&mut self) -> &mut RenderDecorators {
        &mut self.decorators
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Instantiate a registered node type at a canvas position
    pub fn add_node_at(&mut self, node_type: &str, pos: Point) -> Result<NodeId> {
        let node = self.registry.create_node(node_type)?.at(pos.x, pos.y);
        let id = self.graph.add_node(node);
        self.mirror_layouts(&[id]);
        self.commit("add node")?;
        Ok(id)
    }

    /// Remove every selected node and its links
    pub fn delete_selection(&mut self) -> Result<usize> {
        let selection = std::mem::take(&mut self.selection);
        let graph_id = self.graph.id();
        let mut removed = Vec::new();
        for id in selection {
            let Ok(node) = self.graph.remove_node(id) else {
                continue;
            };
            self.promotions.forget_node(graph_id, &node);
            removed.push(id);
        }
        if removed.is_empty() {
            return Ok(0);
        }

        self.layout.transaction(LayoutSource::External, |tx| {
            for id in &removed {
                tx.remove_node(*id);
            }
        });
        self.commit("delete selection")?;
        Ok(removed.len())
    }

    /// Replace the selection with a new sub-graph node
    pub fn convert_selection_to_subgraph(&mut self, name: &str) -> Result<ConvertResult> {
        let selection = self.selection.clone();

        // Promotion records of selected sub-graph nodes move with them
        let root_id = self.graph.id();
        let moved: Vec<(NodeId, Vec<(NodeId, String)>)> = selection
            .iter()
            .map(|id| {
                let records = self
                    .promotions
                    .promoted_for(NodeLocator::new(root_id, *id))
                    .cloned()
                    .collect();
                (*id, records)
            })
            .collect();

        let result = convert_to_subgraph(&mut self.graph, &selection, name)?;

        for (id, records) in moved {
            self.promotions.clear_subgraph_node(NodeLocator::new(root_id, id));
            let locator = NodeLocator::new(result.subgraph_id, id);
            for (interior, widget) in records {
                self.promotions.promote(locator, interior, &widget);
            }
        }

        self.layout.transaction(LayoutSource::External, |tx| {
            for id in &selection {
                tx.remove_node(*id);
            }
        });
        self.mirror_layouts(&[result.node_id]);
        self.selection = vec![result.node_id];
        self.commit("convert to sub-graph")?;
        Ok(result)
    }

    /// Export a sub-graph node's definition as a new blueprint
    ///
    /// The blueprint gets a fresh id and a bumped revision; the live
    /// sub-graph is left untouched.
    pub fn publish_subgraph(&self, node_id: NodeId) -> Result<PublishedSubgraph> {
        let node = self.graph.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let instance = node.as_subgraph().ok_or(GraphError::NotASubgraphNode(node_id))?;

        let mut dependencies = Vec::new();
        let mut definition = export_subgraph(&instance.subgraph, &mut dependencies);
        definition.id = Uuid::new_v4();
        definition.revision += 1;

        log::info!(
            "Published sub-graph {} as {} (revision {})",
            instance.subgraph.id(),
            definition.id,
            definition.revision
        );
        Ok(PublishedSubgraph {
            definition,
            dependencies,
        })
    }

    /// Replace the selection; unknown ids are dropped
    pub fn select(&mut self, ids: &[NodeId]) {
        let mut seen = HashSet::new();
        self.selection = ids
            .iter()
            .copied()
            .filter(|id| self.graph.contains_node(*id) && seen.insert(*id))
            .collect();
    }

    /// Select every node overlapping a canvas rectangle
    pub fn select_in_rect(&mut self, rect: &Rect) {
        self.selection = nodes_in_rect(&self.graph, rect);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Copy the selection into the editor clipboard
    pub fn copy_selection(&mut self) -> Result<ClipboardPayload> {
        if self.selection.is_empty() {
            return Err(GraphError::InvalidSelection("nothing selected".to_string()));
        }
        let payload = copy_nodes(&self.graph, &self.selection)?;
        self.clipboard = Some(payload.clone());
        Ok(payload)
    }

    /// Paste the editor clipboard
    pub fn paste(&mut self, offset: Point) -> Result<PasteResult> {
        let payload = self
            .clipboard
            .clone()
            .ok_or_else(|| GraphError::InvalidSelection("clipboard is empty".to_string()))?;
        self.paste_payload(&payload, offset)
    }

    /// Paste an external payload; the pasted nodes become the selection
    pub fn paste_payload(
        &mut self,
        payload: &ClipboardPayload,
        offset: Point,
    ) -> Result<PasteResult> {
        let result = paste(&mut self.graph, payload, offset)?;

        let root_id = self.graph.id();
        for id in &result.nodes {
            if let Some(node) = self.graph.node(*id) {
                register_proxies(&mut self.promotions, root_id, node);
            }
        }

        self.mirror_layouts(&result.nodes);
        self.selection = result.nodes.clone();
        self.commit("paste")?;
        Ok(result)
    }

    /// Move nodes by a delta as one layout batch
    ///
    /// Returns how many nodes moved.
    pub fn move_nodes(&mut self, ids: &[NodeId], dx: f64, dy: f64) -> Result<usize> {
        let moved: Vec<NodeId> = self.layout.transaction(LayoutSource::Drag, |tx| {
            ids.iter().copied().filter(|id| tx.move_by(*id, dx, dy)).collect()
        });
        if moved.is_empty() {
            return Ok(0);
        }

        for id in &moved {
            if let (Some(layout), Some(node)) = (self.layout.get(*id), self.graph.node_mut(*id)) {
                node.pos = layout.position;
            }
        }
        self.commit("move nodes")?;
        Ok(moved.len())
    }

    /// Expose an interior widget on its sub-graph node
    ///
    /// Returns false if the widget was already promoted.
    pub fn promote_widget(
        &mut self,
        subgraph_node: NodeId,
        interior_node: NodeId,
        widget: &str,
    ) -> Result<bool> {
        let locator = self.check_promotable(subgraph_node, interior_node, widget)?;
        if !self.promotions.promote(locator, interior_node, widget) {
            return Ok(false);
        }

        let proxy = ProxyWidget::new(interior_node, widget);
        if let Some(instance) = self.graph.node_mut(subgraph_node).and_then(Node::as_subgraph_mut) {
            if !instance.proxy_widgets.contains(&proxy) {
                instance.proxy_widgets.push(proxy);
            }
        }
        self.commit("promote widget")?;
        Ok(true)
    }

    /// Undo a promotion; returns false if the widget was not promoted
    pub fn demote_widget(
        &mut self,
        subgraph_node: NodeId,
        interior_node: NodeId,
        widget: &str,
    ) -> Result<bool> {
        let node = self.graph.node(subgraph_node).ok_or(GraphError::NodeNotFound(subgraph_node))?;
        if !node.is_subgraph() {
            return Err(GraphError::NotASubgraphNode(subgraph_node));
        }
        let locator = self.graph.locator(subgraph_node);
        if !self.promotions.demote(locator, interior_node, widget) {
            return Ok(false);
        }

        if let Some(instance) = self.graph.node_mut(subgraph_node).and_then(Node::as_subgraph_mut) {
            instance
                .proxy_widgets
                .retain(|p| !(p.node_id == interior_node && p.widget_name == widget));
        }
        self.commit("demote widget")?;
        Ok(true)
    }

    /// Promoted widgets of a sub-graph node, in display order
    pub fn proxy_widgets(&self, subgraph_node: NodeId) -> Option<&[ProxyWidget]> {
        self.graph
            .node(subgraph_node)
            .and_then(Node::as_subgraph)
            .map(|instance| instance.proxy_widgets.as_slice())
    }

    // ------------------------------------------------------------------
    // Link dragging
    // ------------------------------------------------------------------

    pub fn pointer_down(&mut self, pointer_id: PointerId, pos: Point) -> bool {
        self.drag.pointer_down(&self.graph, pointer_id, pos)
    }

    pub fn pointer_move(&mut self, pointer_id: PointerId, pos: Point) {
        self.drag.pointer_move(&self.graph, pointer_id, pos);
    }

    /// Finish a link drag, recording history when the graph changed
    ///
    /// A drop the graph rejects comes back as `Cancelled`; an error means the
    /// link was made but could not be recorded.
    pub fn pointer_up(&mut self, pointer_id: PointerId, pos: Point) -> Result<DragOutcome> {
        let outcome = self.drag.pointer_up(&mut self.graph, pointer_id, pos);
        match outcome {
            DragOutcome::Committed { .. } | DragOutcome::Retargeted { .. } => {
                self.commit("link drag")?;
            }
            DragOutcome::Cancelled | DragOutcome::Ignored => {}
        }
        Ok(outcome)
    }

    pub fn cancel_drag(&mut self) -> DragOutcome {
        self.drag.cancel()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Restore the previous snapshot; `None` when there is nothing to undo
    pub fn undo(&mut self) -> Option<Result<()>> {
        let snapshot = self.history.undo()?;
        Some(snapshot.and_then(|s| self.restore(&s)))
    }

    /// Re-apply an undone snapshot; `None` when there is nothing to redo
    pub fn redo(&mut self) -> Option<Result<()>> {
        let snapshot = self.history.redo()?;
        Some(snapshot.and_then(|s| self.restore(&s)))
    }

    // ------------------------------------------------------------------
    // Persistence and inspection
    // ------------------------------------------------------------------

    pub fn export(&self) -> ExportedGraph {
        export_graph(&self.graph)
    }

    /// Replace the session's graph; history starts over
    pub fn load(&mut self, exported: &ExportedGraph) -> Result<()> {
        self.restore(exported)?;
        self.history.clear();
        self.history.record(&self.graph)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        validate_graph(&self.graph, Some(&self.registry))
    }

    /// Draw commands of every registered decorator
    pub fn decorations(&self) -> Vec<(NodeId, Vec<DrawCommand>)> {
        self.decorators.decorate_graph(&self.graph, Some(&self.promotions))
    }

    fn check_promotable(
        &self,
        subgraph_node: NodeId,
        interior_node: NodeId,
        widget: &str,
    ) -> Result<NodeLocator> {
        let node = self.graph.node(subgraph_node).ok_or(GraphError::NodeNotFound(subgraph_node))?;
        let instance = node.as_subgraph().ok_or(GraphError::NotASubgraphNode(subgraph_node))?;
        let interior = instance
            .subgraph
            .graph
            .node(interior_node)
            .ok_or(GraphError::NodeNotFound(interior_node))?;
        if interior.widget(widget).is_none() {
            return Err(GraphError::WidgetNotFound {
                node_id: interior_node,
                widget: widget.to_string(),
            });
        }
        Ok(self.graph.locator(subgraph_node))
    }

    fn mirror_layouts(&self, ids: &[NodeId]) {
        self.layout.transaction(LayoutSource::External, |tx| {
            for id in ids {
                if let Some(node) = self.graph.node(*id) {
                    tx.set_layout(*id, NodeLayout::new(node.pos, node.size));
                }
            }
        });
    }

    fn restore(&mut self, snapshot: &ExportedGraph) -> Result<()> {
        let graph = import_graph(snapshot)?;
        self.promotions = promotions_from_graph(&graph);
        self.graph = graph;
        self.selection.retain(|id| self.graph.contains_node(*id));
        if self.drag.cancel() == DragOutcome::Cancelled {
            log::debug!("Dropped active link drag while restoring");
        }
        self.layout.sync_from_graph(LayoutSource::External, &self.graph);
        log::debug!("Restored graph snapshot (revision {})", self.graph.revision);
        Ok(())
    }

    fn commit(&mut self, action: &str) -> Result<()> {
        self.graph.revision += 1;
        self.history.record(&self.graph)?;
        log::debug!("{} (revision {})", action, self.graph.revision);
        Ok(())
    }
}

impl std::fmt::Debug for GraphEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEditor")
            .field("graph", &self.graph.id())
            .field("nodes", &self.graph.node_count())
            .field("selection", &self.selection)
            .field("history", &self.history.len())
            .finish()
    }
}

/// Promotion records implied by every proxy widget list in a graph tree
fn promotions_from_graph(graph: &Graph) -> PromotionStore {
    let mut store = PromotionStore::new(graph.id());
    for node in graph.nodes() {
        register_proxies(&mut store, graph.id(), node);
    }
    store
}

fn register_proxies(store: &mut PromotionStore, graph_id: GraphId, node: &Node) {
    let Some(instance) = node.as_subgraph() else {
        return;
    };
    let locator = NodeLocator::new(graph_id, node.id);
    for proxy in &instance.proxy_widgets {
        store.promote(locator, proxy.node_id, &proxy.widget_name);
    }
    let interior_id = instance.subgraph.id();
    for interior in instance.subgraph.graph.nodes() {
        register_proxies(store, interior_id, interior);
    }
}
