//! Node Graph - editing engine for node-based visual programs
//!
//! This crate holds the editor-side model of a node graph and the machinery
//! that edits it:
//!
//! - Graph data model with nested sub-graphs and cascading link removal
//! - Link dragging with slot compatibility checks
//! - Sub-graph conversion and widget promotion
//! - Export/import and clipboard paste with identity remapping
//! - Compressed snapshot-based undo/redo
//! - A reactive layout store projected one way into a canvas renderer
//!
//! # Architecture
//!
//! - `Graph`: nodes, links, groups and reroutes of one scope
//! - `GraphEditor`: command surface owning the root graph and its side state
//! - `LinkDragController`: pointer-driven drag-link state machine
//! - `PromotionStore`: which interior widgets are exposed on sub-graph nodes
//! - `LayoutStore` / `LayoutSync`: authoritative node layout and renderer push
//!
//! # Example
//!
//! ```ignore
//! use node_graph::{EditorConfig, GraphEditor, NodeTypeRegistry, Point};
//!
//! let mut editor = GraphEditor::new(EditorConfig::default(), registry)?;
//! let a = editor.add_node_at("LoadImage", Point::new(0.0, 0.0))?;
//! editor.select(&[a]);
//! editor.copy_selection()?;
//! editor.paste(Point::new(40.0, 40.0))?;
//! ```

pub mod builder;
pub mod canvas_sync;
pub mod clipboard;
pub mod config;
pub mod connection;
pub mod drag;
pub mod editor;
pub mod error;
pub mod events;
pub mod extensions;
pub mod graph;
pub mod layout;
pub mod link;
pub mod node;
pub mod promotion;
pub mod reconciler;
pub mod registry;
pub mod serialization;
pub mod subgraph;
pub mod types;
pub mod undo;
pub mod validation;

// Re-export key types
pub use builder::GraphBuilder;
pub use canvas_sync::{
    push_layouts, CanvasRenderer, FrameLoop, LayoutSync, SyncReport, TransformSync, ViewportCuller,
};
pub use clipboard::{copy_nodes, copy_selection, paste, ClipboardPayload, PasteResult};
pub use config::EditorConfig;
pub use connection::{is_connection_compatible, SlotDragSource, SlotDropCandidate};
pub use drag::{DragOutcome, DragState, LinkDragController};
pub use editor::{GraphEditor, PublishedSubgraph};
pub use error::{GraphError, Result};
pub use events::{LayoutChange, LayoutChangeKind, LayoutSource};
pub use extensions::{DrawCommand, RenderDecorators};
pub use graph::{Graph, GraphState};
pub use hit_test::{find_slot_at, SlotDirection, SlotHit, SlotMetrics};
pub use layout::{LayoutStore, LayoutSubscription, NodeLayout};
pub use link::{Group, Link, Reroute};
pub use node::{
    InputSlot, Node, NodeKind, NodeMode, OutputSlot, ProxyWidget, SubgraphInstance, Widget,
};
pub use promotion::{has_unpromoted_widgets, PromotionStore};
pub use reconciler::{PromotedWidgetReconciler, PromotedWidgetView};
pub use registry::{NodeTypeDefinition, NodeTypeRegistry, SlotTemplate, WidgetTemplate};
pub use serialization::{export_graph, import_graph, ExportedGraph, ExportedNode, ExportedSubgraph};
pub use subgraph::{convert_to_subgraph, ConvertResult, Subgraph};
pub use types::{
    GraphId, LinkId, NodeId, NodeLocator, Point, Rect, Size, SlotType, SubgraphId,
    SUBGRAPH_INPUT_ID, SUBGRAPH_OUTPUT_ID,
};
pub use undo::UndoStack;
pub use validation::{validate_graph, ValidationError};
