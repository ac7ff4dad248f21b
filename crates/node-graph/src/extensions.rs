//! Render decorators
//!
//! Hosts register named callbacks that add draw commands on top of a node's
//! regular rendering (badges, outlines, labels). Decorators run in
//! registration order; registering an existing name replaces it in place.
//!
//! # Example
//!
//! ```ignore
//! let mut decorators = RenderDecorators::new();
//! decorators.register("bypass-outline", |ctx| {
//!     if ctx.node.mode == NodeMode::Bypass {
//!         vec![DrawCommand::outline(ctx.node.bounding(), "#a0f")]
//!     } else {
//!         Vec::new()
//!     }
//! });
//! let commands = decorators.decorate_graph(&graph, Some(&promotions));
//! ```

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::node::Node;
use crate::promotion::{has_unpromoted_widgets, PromotionStore};
use crate::types::{NodeId, Point, Rect};

/// Name under which [`unpromoted_widgets_badge`] is usually registered
pub const UNPROMOTED_WIDGETS_DECORATOR: &str = "unpromoted-widgets";

/// Primitive drawn by a decorator, in canvas space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DrawCommand {
    Outline { rect: Rect, color: String, width: f64 },
    Badge { anchor: Point, text: String, color: String },
    Label { pos: Point, text: String },
}

impl DrawCommand {
    pub fn outline(rect: Rect, color: impl Into<String>) -> Self {
        Self::Outline {
            rect,
            color: color.into(),
            width: 2.0,
        }
    }

    pub fn badge(anchor: Point, text: impl Into<String>, color: impl Into<String>) -> Self {
        Self::Badge {
            anchor,
            text: text.into(),
            color: color.into(),
        }
    }
}

/// What a decorator sees for one node
pub struct DecorationContext<'a> {
    pub graph: &'a Graph,
    pub node: &'a Node,
    pub promotions: Option<&'a PromotionStore>,
}

type Decorator = Box<dyn Fn(&DecorationContext<'_>) -> Vec<DrawCommand>>;

/// Ordered registry of named render decorators
#[derive(Default)]
pub struct RenderDecorators {
    entries: Vec<(String, Decorator)>,
}

impl RenderDecorators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decorator
    ///
    /// Returns true if a decorator of the same name was replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        decorator: impl Fn(&DecorationContext<'_>) -> Vec<DrawCommand> + 'static,
    ) -> bool {
        let name = name.into();
        let decorator: Decorator = Box::new(decorator);
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => {
                entry.1 = decorator;
                true
            }
            None => {
                self.entries.push((name, decorator));
                false
            }
        }
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        self.entries.len() != before
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every decorator for one node
    pub fn decorate(&self, ctx: &DecorationContext<'_>) -> Vec<DrawCommand> {
        self.entries.iter().flat_map(|(_, decorator)| decorator(ctx)).collect()
    }

    /// Decorate every node of a graph, omitting nodes with no commands
    pub fn decorate_graph(
        &self,
        graph: &Graph,
        promotions: Option<&PromotionStore>,
    ) -> Vec<(NodeId, Vec<DrawCommand>)> {
        graph
            .nodes()
            .iter()
            .filter_map(|node| {
                let commands = self.decorate(&DecorationContext {
                    graph,
                    node,
                    promotions,
                });
                (!commands.is_empty()).then_some((node.id, commands))
            })
            .collect()
    }
}

impl std::fmt::Debug for RenderDecorators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDecorators").field("names", &self.names()).finish()
    }
}

/// Badge on sub-graph nodes that still hide some interior widget
pub fn unpromoted_widgets_badge(ctx: &DecorationContext<'_>) -> Vec<DrawCommand> {
    let Some(promotions) = ctx.promotions else {
        return Vec::new();
    };
    if !ctx.node.is_subgraph() {
        return Vec::new();
    }
    let locator = ctx.graph.locator(ctx.node.id);
    if !has_unpromoted_widgets(promotions, locator, ctx.node) {
        return Vec::new();
    }
    let bounds = ctx.node.bounding();
    vec![DrawCommand::badge(Point::new(bounds.right(), bounds.y), "+", "#888")]
}
