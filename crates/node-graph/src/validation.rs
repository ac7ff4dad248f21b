//! Structural validation of graphs
//!
//! Checks that the link table, slot back-references, proxy widgets and id
//! counters agree with each other. Nested sub-graphs are validated too.

use std::collections::HashSet;

use crate::graph::Graph;
use crate::node::NodeKind;
use crate::registry::NodeTypeRegistry;
use crate::types::{LinkId, NodeId, SubgraphId};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two nodes share an id
    DuplicateNodeId { node_id: NodeId },
    /// A link endpoint does not resolve to a node
    DanglingLink { link_id: LinkId, node_id: NodeId },
    /// A link endpoint names a slot the node does not have
    SlotOutOfRange {
        link_id: LinkId,
        node_id: NodeId,
        slot: usize,
    },
    /// An input's `link` disagrees with the link table
    InputLinkMismatch {
        node_id: NodeId,
        slot: usize,
        link_id: Option<LinkId>,
    },
    /// An output's `links` is missing a link or lists a foreign one
    OutputLinkMismatch {
        node_id: NodeId,
        slot: usize,
        link_id: LinkId,
    },
    /// A proxy widget names an interior node that does not exist
    ProxyWidgetMissingNode { node_id: NodeId, interior_node_id: NodeId },
    /// A proxy widget names a widget its interior node does not have
    ProxyWidgetMissingWidget {
        node_id: NodeId,
        interior_node_id: NodeId,
        widget: String,
    },
    /// A counter is lower than an id already in use
    CounterBehind {
        counter: &'static str,
        value: u64,
        max_used: u64,
    },
    /// A node has a type unknown to the registry
    UnknownNodeType { node_id: NodeId, node_type: String },
    /// An error inside a nested sub-graph
    InSubgraph {
        subgraph_id: SubgraphId,
        error: Box<ValidationError>,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => {
                write!(f, "Node id {} is used more than once", node_id)
            }
            Self::DanglingLink { link_id, node_id } => {
                write!(f, "Link {} references missing node {}", link_id, node_id)
            }
            Self::SlotOutOfRange { link_id, node_id, slot } => {
                write!(f, "Link {} references missing slot {} on node {}", link_id, slot, node_id)
            }
            Self::InputLinkMismatch { node_id, slot, link_id } => match link_id {
                Some(link_id) => write!(
                    f,
                    "Input {} of node {} points at link {} which does not target it",
                    slot, node_id, link_id
                ),
                None => write!(f, "Input {} of node {} lost its link reference", slot, node_id),
            },
            Self::OutputLinkMismatch { node_id, slot, link_id } => {
                write!(f, "Output {} of node {} disagrees about link {}", slot, node_id, link_id)
            }
            Self::ProxyWidgetMissingNode {
                node_id,
                interior_node_id,
            } => write!(
                f,
                "Sub-graph node {} promotes a widget of missing interior node {}",
                node_id, interior_node_id
            ),
            Self::ProxyWidgetMissingWidget {
                node_id,
                interior_node_id,
                widget,
            } => write!(
                f,
                "Sub-graph node {} promotes missing widget '{}' of interior node {}",
                node_id, widget, interior_node_id
            ),
            Self::CounterBehind {
                counter,
                value,
                max_used,
            } => write!(f, "Counter {} is {} but id {} is in use", counter, value, max_used),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node {}", node_type, node_id)
            }
            Self::InSubgraph { subgraph_id, error } => {
                write!(f, "In sub-graph {}: {}", subgraph_id, error)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a graph and every sub-graph nested in it
///
/// Returns all validation errors found (not just the first).
/// Pass a registry to also check node types; sub-graph nodes are exempt.
pub fn validate_graph(graph: &Graph, registry: Option<&NodeTypeRegistry>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_node_ids(graph, &mut errors);
    validate_link_endpoints(graph, &mut errors);
    validate_back_references(graph, &mut errors);
    validate_counters(graph, &mut errors);
    validate_proxy_widgets(graph, &mut errors);

    if let Some(registry) = registry {
        for node in graph.nodes().iter().filter(|n| !n.is_subgraph()) {
            if !registry.has_node_type(&node.node_type) {
                errors.push(ValidationError::UnknownNodeType {
                    node_id: node.id,
                    node_type: node.node_type.clone(),
                });
            }
        }
    }

    for node in graph.nodes() {
        if let NodeKind::Subgraph(instance) = &node.kind {
            let subgraph_id = instance.subgraph.id();
            errors.extend(
                validate_graph(&instance.subgraph.graph, registry)
                    .into_iter()
                    .map(|error| ValidationError::InSubgraph {
                        subgraph_id,
                        error: Box::new(error),
                    }),
            );
        }
    }

    errors
}

fn validate_node_ids(graph: &Graph, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for node in graph.nodes() {
        if !seen.insert(node.id) {
            errors.push(ValidationError::DuplicateNodeId { node_id: node.id });
        }
    }
}

/// Boundary ids are endpoints only inside sub-graphs and carry no slots here
fn validate_link_endpoints(graph: &Graph, errors: &mut Vec<ValidationError>) {
    for link in graph.links() {
        let ends = [
            (link.origin_id, link.origin_slot, true),
            (link.target_id, link.target_slot, false),
        ];
        for (node_id, slot, is_origin) in ends {
            if node_id.is_boundary() && graph.is_interior() {
                continue;
            }
            let Some(node) = graph.node(node_id) else {
                errors.push(ValidationError::DanglingLink {
                    link_id: link.id,
                    node_id,
                });
                continue;
            };
            let slot_count = if is_origin { node.outputs.len() } else { node.inputs.len() };
            if slot >= slot_count {
                errors.push(ValidationError::SlotOutOfRange {
                    link_id: link.id,
                    node_id,
                    slot,
                });
            }
        }
    }
}

fn validate_back_references(graph: &Graph, errors: &mut Vec<ValidationError>) {
    for node in graph.nodes() {
        for (slot, input) in node.inputs.iter().enumerate() {
            let Some(link_id) = input.link else {
                continue;
            };
            let matches = graph
                .get_link(link_id)
                .is_some_and(|l| l.target_id == node.id && l.target_slot == slot);
            if !matches {
                errors.push(ValidationError::InputLinkMismatch {
                    node_id: node.id,
                    slot,
                    link_id: Some(link_id),
                });
            }
        }
        for (slot, output) in node.outputs.iter().enumerate() {
            for link_id in &output.links {
                let matches = graph
                    .get_link(*link_id)
                    .is_some_and(|l| l.origin_id == node.id && l.origin_slot == slot);
                if !matches {
                    errors.push(ValidationError::OutputLinkMismatch {
                        node_id: node.id,
                        slot,
                        link_id: *link_id,
                    });
                }
            }
        }
    }

    for link in graph.links() {
        if let Some(input) = graph.node(link.target_id).and_then(|n| n.input(link.target_slot)) {
            if input.link != Some(link.id) {
                errors.push(ValidationError::InputLinkMismatch {
                    node_id: link.target_id,
                    slot: link.target_slot,
                    link_id: None,
                });
            }
        }
        if let Some(output) = graph.node(link.origin_id).and_then(|n| n.output(link.origin_slot)) {
            if !output.links.contains(&link.id) {
                errors.push(ValidationError::OutputLinkMismatch {
                    node_id: link.origin_id,
                    slot: link.origin_slot,
                    link_id: link.id,
                });
            }
        }
    }
}

fn validate_counters(graph: &Graph, errors: &mut Vec<ValidationError>) {
    let state = graph.state();
    let max_node = graph.nodes().iter().map(|n| n.id.0).max().unwrap_or(0);
    if max_node > state.last_node_id {
        errors.push(ValidationError::CounterBehind {
            counter: "lastNodeId",
            value: state.last_node_id.max(0) as u64,
            max_used: max_node as u64,
        });
    }
    let max_link = graph.links().map(|l| l.id.0).max().unwrap_or(0);
    if max_link > state.last_link_id {
        errors.push(ValidationError::CounterBehind {
            counter: "lastLinkId",
            value: state.last_link_id,
            max_used: max_link,
        });
    }
    let max_group = graph.groups().iter().map(|g| g.id.0).max().unwrap_or(0);
    if max_group > state.last_group_id {
        errors.push(ValidationError::CounterBehind {
            counter: "lastGroupId",
            value: state.last_group_id,
            max_used: max_group,
        });
    }
    let max_reroute = graph.reroutes().map(|r| r.id.0).max().unwrap_or(0);
    if max_reroute > state.last_reroute_id {
        errors.push(ValidationError::CounterBehind {
            counter: "lastRerouteId",
            value: state.last_reroute_id,
            max_used: max_reroute,
        });
    }
}

fn validate_proxy_widgets(graph: &Graph, errors: &mut Vec<ValidationError>) {
    for node in graph.nodes() {
        let Some(instance) = node.as_subgraph() else {
            continue;
        };
        for proxy in &instance.proxy_widgets {
            match instance.subgraph.graph.node(proxy.node_id) {
                None => errors.push(ValidationError::ProxyWidgetMissingNode {
                    node_id: node.id,
                    interior_node_id: proxy.node_id,
                }),
                Some(interior) if interior.widget(&proxy.widget_name).is_none() => {
                    errors.push(ValidationError::ProxyWidgetMissingWidget {
                        node_id: node.id,
                        interior_node_id: proxy.node_id,
                        widget: proxy.widget_name.clone(),
                    })
                }
                Some(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{InputSlot, Node, OutputSlot, ProxyWidget, Widget};
    use crate::registry::NodeTypeDefinition;
    use crate::subgraph::Subgraph;

    fn make_node(id: i64) -> Node {
        Node::new("test")
            .with_id(id)
            .with_input(InputSlot::new("in", "IMAGE"))
            .with_output(OutputSlot::new("out", "IMAGE"))
    }

    fn make_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(make_node(1));
        graph.add_node(make_node(2));
        graph.connect(NodeId(1), 0, NodeId(2), 0).unwrap();
        graph
    }

    #[test]
    fn test_valid_graph() {
        assert!(validate_graph(&make_graph(), None).is_empty());
    }

    #[test]
    fn test_detects_removed_slot() {
        let mut graph = make_graph();
        graph.node_mut(NodeId(2)).unwrap().inputs.clear();

        let errors = validate_graph(&graph, None);
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::SlotOutOfRange { node_id, .. } if *node_id == NodeId(2)
        )));
    }

    #[test]
    fn test_detects_back_reference_mismatch() {
        let mut graph = make_graph();
        graph.node_mut(NodeId(1)).unwrap().outputs[0].links.clear();
        graph.node_mut(NodeId(2)).unwrap().inputs[0].link = Some(LinkId(99));

        let errors = validate_graph(&graph, None);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::OutputLinkMismatch { .. })));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::InputLinkMismatch { link_id: Some(LinkId(99)), .. }
        )));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InputLinkMismatch { link_id: None, .. })));
    }

    #[test]
    fn test_collects_nested_proxy_widget_errors() {
        let mut subgraph = Subgraph::new("S");
        subgraph
            .graph
            .add_node(make_node(1).with_widget(Widget::new(
                "seed",
                "number",
                serde_json::json!(0),
            )));
        let subgraph_id = subgraph.id();
        let mut node = Node::subgraph(subgraph).with_id(5);
        if let Some(instance) = node.as_subgraph_mut() {
            instance.proxy_widgets.push(ProxyWidget::new(NodeId(1), "seed"));
            instance.proxy_widgets.push(ProxyWidget::new(NodeId(1), "steps"));
            instance.proxy_widgets.push(ProxyWidget::new(NodeId(7), "seed"));
            instance.subgraph.graph.node_mut(NodeId(1)).unwrap().inputs.clear();
            instance.subgraph.graph.add_node(make_node(2));
            instance.subgraph.graph.connect(NodeId(2), 0, NodeId(2), 0).unwrap();
            instance.subgraph.graph.node_mut(NodeId(2)).unwrap().outputs.clear();
        }
        let mut graph = Graph::new();
        graph.add_node(node);

        let errors = validate_graph(&graph, None);
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::ProxyWidgetMissingWidget { .. }
                    | ValidationError::ProxyWidgetMissingNode { .. }))
                .count(),
            2
        );
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::InSubgraph { subgraph_id: id, .. } if *id == subgraph_id
        )));
    }

    #[test]
    fn test_unknown_node_type_with_registry() {
        let graph = make_graph();
        let mut registry = NodeTypeRegistry::new();
        assert_eq!(validate_graph(&graph, Some(&registry)).len(), 2);

        registry.register(NodeTypeDefinition::new("test", "Test"));
        assert!(validate_graph(&graph, Some(&registry)).is_empty());
    }
}
