//! Node type registry
//!
//! Maps node type strings to definitions describing the slots, widgets and
//! default size a freshly added node of that type gets. Hosts register their
//! palette here; "add node at position" instantiates from it.
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = NodeTypeRegistry::new();
//! registry.register(
//!     NodeTypeDefinition::new("LoadImage", "Load Image")
//!         .with_output(SlotTemplate::new("IMAGE", "IMAGE"))
//!         .with_widget(WidgetTemplate::new("image", "combo", json!("example.png"))),
//! );
//! let node = registry.create_node("LoadImage")?;
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::node::{InputSlot, Node, OutputSlot, Widget};
use crate::types::{Size, SlotType};

/// Slot declared by a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotTemplate {
    pub name: String,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// For inputs: the widget of the same node backing this slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,
}

impl SlotTemplate {
    pub fn new(name: impl Into<String>, slot_type: impl Into<SlotType>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            label: None,
            widget: None,
        }
    }

    pub fn with_widget(mut self, widget: impl Into<String>) -> Self {
        self.widget = Some(widget.into());
        self
    }
}

/// Widget declared by a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetTemplate {
    pub name: String,
    #[serde(rename = "type")]
    pub widget_type: String,
    #[serde(default)]
    pub default: serde_json::Value,
    #[serde(default)]
    pub options: serde_json::Value,
}

impl WidgetTemplate {
    pub fn new(
        name: impl Into<String>,
        widget_type: impl Into<String>,
        default: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            widget_type: widget_type.into(),
            default,
            options: serde_json::Value::Null,
        }
    }
}

/// Everything needed to instantiate a node of one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeDefinition {
    /// Unique type identifier (e.g. "KSampler")
    pub node_type: String,
    /// Default title of new nodes
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default)]
    pub inputs: Vec<SlotTemplate>,
    #[serde(default)]
    pub outputs: Vec<SlotTemplate>,
    #[serde(default)]
    pub widgets: Vec<WidgetTemplate>,
}

impl NodeTypeDefinition {
    pub fn new(node_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            title: title.into(),
            category: String::new(),
            size: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            widgets: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = Some(Size::new(width, height));
        self
    }

    pub fn with_input(mut self, slot: SlotTemplate) -> Self {
        self.inputs.push(slot);
        self
    }

    pub fn with_output(mut self, slot: SlotTemplate) -> Self {
        self.outputs.push(slot);
        self
    }

    pub fn with_widget(mut self, widget: WidgetTemplate) -> Self {
        self.widgets.push(widget);
        self
    }

    /// Build a detached node from this definition
    pub fn instantiate(&self, default_size: Size) -> Node {
        let mut node = Node::new(self.node_type.clone()).with_title(self.title.clone());
        node.size = self.size.unwrap_or(default_size);
        node.inputs = self
            .inputs
            .iter()
            .map(|t| {
                let mut slot = InputSlot::new(t.name.clone(), t.slot_type.clone());
                slot.label = t.label.clone();
                match &t.widget {
                    Some(widget) => slot.with_widget(widget.clone()),
                    None => slot,
                }
            })
            .collect();
        node.outputs = self
            .outputs
            .iter()
            .map(|t| {
                let mut slot = OutputSlot::new(t.name.clone(), t.slot_type.clone());
                slot.label = t.label.clone();
                slot
            })
            .collect();
        node.widgets = self
            .widgets
            .iter()
            .map(|t| {
                let mut widget =
                    Widget::new(t.name.clone(), t.widget_type.clone(), t.default.clone());
                widget.options = t.options.clone();
                widget
            })
            .collect();
        node
    }
}

/// Registry of node types available to the editor
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    entries: HashMap<String, NodeTypeDefinition>,
    default_size: Size,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            default_size: Size::new(140.0, 60.0),
        }
    }

    /// Size for definitions that declare none
    pub fn with_default_size(mut self, size: Size) -> Self {
        self.default_size = size;
        self
    }

    /// Register a node type, replacing any previous definition
    pub fn register(&mut self, definition: NodeTypeDefinition) {
        self.entries.insert(definition.node_type.clone(), definition);
    }

    /// Register every definition of a JSON array
    pub fn register_json(&mut self, json: &str) -> Result<usize> {
        let definitions: Vec<NodeTypeDefinition> = serde_json::from_str(json)?;
        let count = definitions.len();
        for definition in definitions {
            self.register(definition);
        }
        log::debug!("Registered {} node types from JSON", count);
        Ok(count)
    }

    pub fn get(&self, node_type: &str) -> Option<&NodeTypeDefinition> {
        self.entries.get(node_type)
    }

    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// Registered type names, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Definitions grouped by category
    pub fn by_category(&self) -> HashMap<&str, Vec<&NodeTypeDefinition>> {
        let mut grouped: HashMap<&str, Vec<&NodeTypeDefinition>> = HashMap::new();
        for definition in self.entries.values() {
            grouped.entry(definition.category.as_str()).or_default().push(definition);
        }
        grouped
    }

    /// Build a detached node of the given type
    pub fn create_node(&self, node_type: &str) -> Result<Node> {
        self.get(node_type)
            .map(|d| d.instantiate(self.default_size))
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_string()))
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` with the same type.
    pub fn merge(&mut self, other: NodeTypeRegistry) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_registry() -> NodeTypeRegistry {
        let mut registry = NodeTypeRegistry::new();
        registry.register(
            NodeTypeDefinition::new("KSampler", "KSampler")
                .with_category("sampling")
                .with_size(300.0, 260.0)
                .with_input(SlotTemplate::new("model", "MODEL"))
                .with_input(SlotTemplate::new("seed", "INT").with_widget("seed"))
                .with_output(SlotTemplate::new("LATENT", "LATENT"))
                .with_widget(WidgetTemplate::new("seed", "number", serde_json::json!(0))),
        );
        registry
    }

    #[test]
    fn test_create_node_from_definition() {
        let registry = make_registry();
        let node = registry.create_node("KSampler").unwrap();

        assert_eq!(node.node_type, "KSampler");
        assert_eq!(node.size, Size::new(300.0, 260.0));
        assert_eq!(node.inputs.len(), 2);
        assert_eq!(node.inputs[1].widget.as_ref().map(|w| w.name.as_str()), Some("seed"));
        assert_eq!(node.widget("seed").unwrap().value, serde_json::json!(0));
    }

    #[test]
    fn test_unknown_type() {
        let registry = make_registry();
        assert!(matches!(
            registry.create_node("Nope"),
            Err(GraphError::UnknownNodeType(t)) if t == "Nope"
        ));
    }

    #[test]
    fn test_register_json_and_merge() {
        let mut other = NodeTypeRegistry::new();
        let count = other
            .register_json(
                r#"[
                    {"nodeType": "Note", "title": "Note",
                     "widgets": [{"name": "text", "type": "text"}]},
                    {"nodeType": "KSampler", "title": "Sampler (override)"}
                ]"#,
            )
            .unwrap();
        assert_eq!(count, 2);

        let mut registry = make_registry().with_default_size(Size::new(10.0, 10.0));
        registry.merge(other);
        assert_eq!(registry.node_types(), vec!["KSampler", "Note"]);
        assert_eq!(registry.get("KSampler").unwrap().title, "Sampler (override)");
        assert_eq!(registry.create_node("Note").unwrap().size, Size::new(10.0, 10.0));
    }
}
