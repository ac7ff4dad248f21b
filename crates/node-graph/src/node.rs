//! Nodes, slots and widgets
//!
//! A [`Node`] is owned by exactly one [`Graph`](crate::graph::Graph). A node
//! of kind [`NodeKind::Subgraph`] additionally owns an interior graph and the
//! ordered list of widgets it surfaces from that graph.

use serde::{Deserialize, Serialize};

use crate::subgraph::Subgraph;
use crate::types::{LinkId, NodeId, Point, Rect, Size, SlotType};

/// Id carried by a node that has not been added to a graph yet
pub const UNASSIGNED_NODE_ID: NodeId = NodeId(-1);

/// Execution mode of a node, persisted as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum NodeMode {
    #[default]
    Always,
    OnEvent,
    Never,
    OnTrigger,
    Bypass,
}

impl From<NodeMode> for u8 {
    fn from(mode: NodeMode) -> Self {
        match mode {
            NodeMode::Always => 0,
            NodeMode::OnEvent => 1,
            NodeMode::Never => 2,
            NodeMode::OnTrigger => 3,
            NodeMode::Bypass => 4,
        }
    }
}

impl TryFrom<u8> for NodeMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeMode::Always),
            1 => Ok(NodeMode::OnEvent),
            2 => Ok(NodeMode::Never),
            3 => Ok(NodeMode::OnTrigger),
            4 => Ok(NodeMode::Bypass),
            other => Err(format!("unknown node mode {}", other)),
        }
    }
}

/// Visual state flags of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFlags {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub collapsed: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
}

/// Marks an input slot as backed by a widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetLocator {
    pub name: String,
}

/// An input connection point
#[derive(Debug, Clone, PartialEq)]
pub struct InputSlot {
    pub name: String,
    pub label: Option<String>,
    pub slot_type: SlotType,
    /// The single incoming link, if connected
    pub link: Option<LinkId>,
    /// Set when the slot stands in for a widget of the same node
    pub widget: Option<WidgetLocator>,
    /// Render-only hit area
    pub bounding: Option<Rect>,
    /// Render-only cached anchor position
    pub pos: Option<Point>,
}

impl InputSlot {
    pub fn new(name: impl Into<String>, slot_type: impl Into<SlotType>) -> Self {
        Self {
            name: name.into(),
            label: None,
            slot_type: slot_type.into(),
            link: None,
            widget: None,
            bounding: None,
            pos: None,
        }
    }

    /// Back this input with the widget of the given name
    pub fn with_widget(mut self, widget_name: impl Into<String>) -> Self {
        self.widget = Some(WidgetLocator {
            name: widget_name.into(),
        });
        self
    }
}

/// An output connection point
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSlot {
    pub name: String,
    pub label: Option<String>,
    pub slot_type: SlotType,
    /// Outgoing links; outputs fan out to any number of inputs
    pub links: Vec<LinkId>,
    /// Render-only hit area
    pub bounding: Option<Rect>,
}

impl OutputSlot {
    pub fn new(name: impl Into<String>, slot_type: impl Into<SlotType>) -> Self {
        Self {
            name: name.into(),
            label: None,
            slot_type: slot_type.into(),
            links: Vec::new(),
            bounding: None,
        }
    }
}

/// A named, typed, value-holding control on a node
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub name: String,
    pub widget_type: String,
    pub value: serde_json::Value,
    pub options: serde_json::Value,
    /// Widgets whose enabling condition is false
    pub computed_disabled: bool,
}

impl Widget {
    pub fn new(
        name: impl Into<String>,
        widget_type: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            widget_type: widget_type.into(),
            value,
            options: serde_json::Value::Null,
            computed_disabled: false,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.computed_disabled = true;
        self
    }
}

/// Reference from a sub-graph node to a widget of one of its interior nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyWidget {
    pub node_id: NodeId,
    pub widget_name: String,
}

impl ProxyWidget {
    pub fn new(node_id: NodeId, widget_name: impl Into<String>) -> Self {
        Self {
            node_id,
            widget_name: widget_name.into(),
        }
    }

    /// The persisted `[nodeIdAsString, widgetName]` pair
    pub fn to_pair(&self) -> [String; 2] {
        [self.node_id.to_string(), self.widget_name.clone()]
    }
}

/// Sub-graph specific state of a node
#[derive(Debug, Clone)]
pub struct SubgraphInstance {
    pub subgraph: Subgraph,
    /// Ordered promoted widgets surfaced on the outer node
    pub proxy_widgets: Vec<ProxyWidget>,
}

/// What kind of node this is
#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    #[default]
    Regular,
    Subgraph(Box<SubgraphInstance>),
}

/// A node instance in a graph
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub node_type: String,
    pub title: String,
    pub pos: Point,
    pub size: Size,
    pub flags: NodeFlags,
    pub order: u32,
    pub mode: NodeMode,
    pub inputs: Vec<InputSlot>,
    pub outputs: Vec<OutputSlot>,
    pub widgets: Vec<Widget>,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub kind: NodeKind,
}

impl Node {
    /// Create a detached regular node; the owning graph assigns its id
    pub fn new(node_type: impl Into<String>) -> Self {
        let node_type = node_type.into();
        Self {
            id: UNASSIGNED_NODE_ID,
            title: node_type.clone(),
            node_type,
            pos: Point::default(),
            size: Size::new(140.0, 60.0),
            flags: NodeFlags::default(),
            order: 0,
            mode: NodeMode::Always,
            inputs: Vec::new(),
            outputs: Vec::new(),
            widgets: Vec::new(),
            properties: serde_json::Map::new(),
            kind: NodeKind::Regular,
        }
    }

    /// Create a node wrapping a sub-graph; its type name is the sub-graph id
    pub fn subgraph(subgraph: Subgraph) -> Self {
        let mut node = Node::new(subgraph.id().to_string());
        node.title = subgraph.name.clone();
        node.inputs = subgraph
            .inputs
            .iter()
            .map(|io| InputSlot::new(io.name.clone(), io.slot_type.clone()))
            .collect();
        node.outputs = subgraph
            .outputs
            .iter()
            .map(|io| OutputSlot::new(io.name.clone(), io.slot_type.clone()))
            .collect();
        node.kind = NodeKind::Subgraph(Box::new(SubgraphInstance {
            subgraph,
            proxy_widgets: Vec::new(),
        }));
        node
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.pos = Point::new(x, y);
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = Size::new(width, height);
        self
    }

    pub fn with_input(mut self, input: InputSlot) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: OutputSlot) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.widgets.push(widget);
        self
    }

    /// Canvas-space bounding box
    pub fn bounding(&self) -> Rect {
        Rect::from_pos_size(self.pos, self.size)
    }

    pub fn is_subgraph(&self) -> bool {
        matches!(self.kind, NodeKind::Subgraph(_))
    }

    pub fn as_subgraph(&self) -> Option<&SubgraphInstance> {
        match &self.kind {
            NodeKind::Subgraph(instance) => Some(instance),
            NodeKind::Regular => None,
        }
    }

    pub fn as_subgraph_mut(&mut self) -> Option<&mut SubgraphInstance> {
        match &mut self.kind {
            NodeKind::Subgraph(instance) => Some(instance),
            NodeKind::Regular => None,
        }
    }

    pub fn widget(&self, name: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.name == name)
    }

    pub fn widget_mut(&mut self, name: &str) -> Option<&mut Widget> {
        self.widgets.iter_mut().find(|w| w.name == name)
    }

    pub fn input(&self, slot: usize) -> Option<&InputSlot> {
        self.inputs.get(slot)
    }

    pub fn output(&self, slot: usize) -> Option<&OutputSlot> {
        self.outputs.get(slot)
    }

    pub fn find_input_slot(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == name)
    }

    pub fn find_output_slot(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == name)
    }

    /// Node-level connection predicate
    ///
    /// `self` is the node the connection starts from and `other` the node it
    /// ends on. Types are passed in drag order: for output→input drags the
    /// output type comes first, for input→output drags the input type does.
    /// A node never connects to itself.
    pub fn can_connect_to(&self, other: &Node, first: &SlotType, second: &SlotType) -> bool {
        if self.id == other.id {
            return false;
        }
        first.is_compatible_with(second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let node = Node::new("KSampler")
            .with_id(4)
            .at(10.0, 20.0)
            .with_size(200.0, 100.0)
            .with_input(InputSlot::new("model", "MODEL"))
            .with_input(InputSlot::new("seed", "INT").with_widget("seed"))
            .with_output(OutputSlot::new("LATENT", "LATENT"))
            .with_widget(Widget::new("seed", "number", serde_json::json!(42)));

        assert_eq!(node.id, NodeId(4));
        assert_eq!(node.find_input_slot("seed"), Some(1));
        assert_eq!(node.find_output_slot("LATENT"), Some(0));
        assert_eq!(node.bounding(), Rect::new(10.0, 20.0, 200.0, 100.0));
        assert!(node.inputs[1].widget.is_some());
        assert!(!node.is_subgraph());
    }

    #[test]
    fn test_can_connect_to_rejects_same_node() {
        let a = Node::new("a").with_id(1);
        let b = Node::new("b").with_id(2);
        let image = SlotType::named("IMAGE");
        assert!(a.can_connect_to(&b, &image, &image));
        assert!(!a.can_connect_to(&a, &image, &image));
        assert!(!a.can_connect_to(&b, &image, &SlotType::named("MASK")));
    }

    #[test]
    fn test_node_mode_roundtrip() {
        let json = serde_json::to_string(&NodeMode::Bypass).unwrap();
        assert_eq!(json, "4");
        let mode: NodeMode = serde_json::from_str("2").unwrap();
        assert_eq!(mode, NodeMode::Never);
        assert!(serde_json::from_str::<NodeMode>("9").is_err());
    }
}
