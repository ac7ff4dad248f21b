//! Persisted graph shape
//!
//! [`export_graph`] produces the serializable form of a graph and
//! [`import_graph`] restores it. Render-only data never reaches the export:
//! slot bounding boxes are dropped, widget-backed inputs lose their cached
//! position, and a slot's widget reference keeps only the widget name.
//!
//! Sub-graph nodes are written with `type` set to their sub-graph id and
//! `properties.proxyWidgets` holding `[nodeId, widgetName]` string pairs. The
//! sub-graphs themselves go into `definitions.subgraphs`, flattened across
//! all nesting levels.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::graph::{Graph, GraphScope, GraphState};
use crate::link::{Group, Link, Reroute};
use crate::node::{
    InputSlot, Node, NodeFlags, NodeKind, NodeMode, OutputSlot, ProxyWidget, SubgraphInstance,
    Widget, WidgetLocator,
};
use crate::subgraph::{BoundaryNode, Subgraph, SubgraphIo, SubgraphWidget};
use crate::types::{LinkId, NodeId, Point, Size, SlotType, SubgraphId};

/// Property key holding a sub-graph node's promoted widgets
pub const PROXY_WIDGETS_KEY: &str = "proxyWidgets";

/// Version written into exported graphs
pub const EXPORT_VERSION: u32 = 1;

/// Exported input slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    #[serde(default)]
    pub link: Option<LinkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<WidgetLocator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Point>,
}

/// Exported output slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedOutput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    #[serde(default)]
    pub links: Vec<LinkId>,
}

/// Exported widget state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedWidget {
    pub name: String,
    #[serde(rename = "type")]
    pub widget_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

/// Exported node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub pos: Point,
    pub size: Size,
    #[serde(default)]
    pub flags: NodeFlags,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub mode: NodeMode,
    #[serde(default)]
    pub inputs: Vec<ExportedInput>,
    #[serde(default)]
    pub outputs: Vec<ExportedOutput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widgets: Vec<ExportedWidget>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Exported sub-graph definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSubgraph {
    pub id: SubgraphId,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub revision: u32,
    #[serde(default)]
    pub state: GraphState,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    pub name: String,
    pub input_node: BoundaryNode,
    pub output_node: BoundaryNode,
    #[serde(default)]
    pub inputs: Vec<SubgraphIo>,
    #[serde(default)]
    pub outputs: Vec<SubgraphIo>,
    #[serde(default)]
    pub widgets: Vec<SubgraphWidget>,
    #[serde(default)]
    pub nodes: Vec<ExportedNode>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reroutes: Vec<Reroute>,
}

fn default_version() -> u32 {
    EXPORT_VERSION
}

/// Shared definitions referenced from nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedDefinitions {
    #[serde(default)]
    pub subgraphs: Vec<ExportedSubgraph>,
}

impl ExportedDefinitions {
    fn is_empty(&self) -> bool {
        self.subgraphs.is_empty()
    }
}

/// Exported root graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedGraph {
    pub id: Uuid,
    #[serde(default)]
    pub revision: u64,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub state: GraphState,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub nodes: Vec<ExportedNode>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reroutes: Vec<Reroute>,
    #[serde(default, skip_serializing_if = "ExportedDefinitions::is_empty")]
    pub definitions: ExportedDefinitions,
}

impl ExportedGraph {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Export a graph and every sub-graph nested in it
pub fn export_graph(graph: &Graph) -> ExportedGraph {
    let mut subgraphs = Vec::new();
    let nodes = graph
        .nodes()
        .iter()
        .map(|n| export_node(n, &mut subgraphs))
        .collect();
    ExportedGraph {
        id: graph.id(),
        revision: graph.revision,
        version: EXPORT_VERSION,
        state: graph.state(),
        config: graph.config.clone(),
        nodes,
        links: export_links(graph),
        groups: graph.groups().to_vec(),
        reroutes: graph.reroutes().cloned().collect(),
        definitions: ExportedDefinitions { subgraphs },
    }
}

fn export_links(graph: &Graph) -> Vec<Link> {
    graph.links().cloned().collect()
}

fn export_input(input: &InputSlot) -> ExportedInput {
    let widget_backed = input.widget.is_some();
    ExportedInput {
        name: input.name.clone(),
        label: input.label.clone(),
        slot_type: input.slot_type.clone(),
        link: input.link,
        widget: input.widget.as_ref().map(|w| WidgetLocator { name: w.name.clone() }),
        pos: if widget_backed { None } else { input.pos },
    }
}

fn export_output(output: &OutputSlot) -> ExportedOutput {
    ExportedOutput {
        name: output.name.clone(),
        label: output.label.clone(),
        slot_type: output.slot_type.clone(),
        links: output.links.clone(),
    }
}

/// Export one node; sub-graph definitions it needs are appended to
/// `subgraphs` unless already present
pub fn export_node(node: &Node, subgraphs: &mut Vec<ExportedSubgraph>) -> ExportedNode {
    let mut properties = node.properties.clone();
    if let NodeKind::Subgraph(instance) = &node.kind {
        if !instance.proxy_widgets.is_empty() {
            let pairs: Vec<[String; 2]> =
                instance.proxy_widgets.iter().map(ProxyWidget::to_pair).collect();
            properties.insert(PROXY_WIDGETS_KEY.to_string(), serde_json::json!(pairs));
        }
        export_subgraph_into(&instance.subgraph, subgraphs);
    }

    ExportedNode {
        id: node.id,
        node_type: match &node.kind {
            NodeKind::Subgraph(instance) => instance.subgraph.id().to_string(),
            NodeKind::Regular => node.node_type.clone(),
        },
        title: Some(node.title.clone()),
        pos: node.pos,
        size: node.size,
        flags: node.flags,
        order: node.order,
        mode: node.mode,
        inputs: node.inputs.iter().map(export_input).collect(),
        outputs: node.outputs.iter().map(export_output).collect(),
        widgets: node
            .widgets
            .iter()
            .map(|w| ExportedWidget {
                name: w.name.clone(),
                widget_type: w.widget_type.clone(),
                value: w.value.clone(),
                options: w.options.clone(),
            })
            .collect(),
        properties,
    }
}

fn export_subgraph_into(subgraph: &Subgraph, subgraphs: &mut Vec<ExportedSubgraph>) {
    if subgraphs.iter().any(|s| s.id == subgraph.id()) {
        return;
    }
    let exported = export_subgraph(subgraph, subgraphs);
    subgraphs.push(exported);
}

/// Export a sub-graph definition; nested definitions go into `subgraphs`
pub fn export_subgraph(
    subgraph: &Subgraph,
    subgraphs: &mut Vec<ExportedSubgraph>,
) -> ExportedSubgraph {
    let graph = &subgraph.graph;
    let nodes = graph.nodes().iter().map(|n| export_node(n, subgraphs)).collect();
    ExportedSubgraph {
        id: subgraph.id(),
        version: subgraph.version,
        revision: subgraph.revision,
        state: graph.state(),
        config: graph.config.clone(),
        name: subgraph.name.clone(),
        input_node: subgraph.input_node,
        output_node: subgraph.output_node,
        inputs: subgraph.inputs.clone(),
        outputs: subgraph.outputs.clone(),
        widgets: subgraph.widgets.clone(),
        nodes,
        links: export_links(graph),
        groups: graph.groups().to_vec(),
        reroutes: graph.reroutes().cloned().collect(),
    }
}

/// Definitions indexed by id
pub(crate) type SubgraphDefs<'a> = HashMap<SubgraphId, &'a ExportedSubgraph>;

pub(crate) fn index_definitions(subgraphs: &[ExportedSubgraph]) -> SubgraphDefs<'_> {
    subgraphs.iter().map(|s| (s.id, s)).collect()
}

/// Restore a graph from its exported form
pub fn import_graph(exported: &ExportedGraph) -> Result<Graph> {
    let defs = index_definitions(&exported.definitions.subgraphs);
    let mut graph = Graph::with_id(exported.id, GraphScope::Root);
    let mut stack = Vec::new();
    populate(
        &mut graph,
        Contents {
            nodes: &exported.nodes,
            links: &exported.links,
            groups: &exported.groups,
            reroutes: &exported.reroutes,
        },
        &defs,
        &mut stack,
    )?;
    graph.raise_state(exported.state);
    graph.config = exported.config.clone();
    graph.revision = exported.revision;
    log::debug!(
        "Imported graph {} ({} nodes, {} links, {} sub-graph definitions)",
        graph.id(),
        graph.node_count(),
        graph.link_count(),
        defs.len()
    );
    Ok(graph)
}

/// Nodes, links and visual aids of one graph level
pub(crate) struct Contents<'a> {
    pub nodes: &'a [ExportedNode],
    pub links: &'a [Link],
    pub groups: &'a [Group],
    pub reroutes: &'a [Reroute],
}

fn populate(
    graph: &mut Graph,
    contents: Contents<'_>,
    defs: &SubgraphDefs<'_>,
    stack: &mut Vec<SubgraphId>,
) -> Result<()> {
    for exported in contents.nodes {
        let node = build_node(exported, defs, stack)?;
        if node.id.0 <= 0 || graph.contains_node(node.id) {
            return Err(GraphError::InvalidGraph(format!(
                "node id {} is invalid or duplicated in graph {}",
                node.id,
                graph.id()
            )));
        }
        graph.add_node(node);
    }
    for reroute in contents.reroutes {
        graph.insert_reroute(reroute.clone());
    }
    for link in contents.links {
        graph.add_link(link.clone())?;
    }
    for group in contents.groups {
        graph.insert_group(group.clone());
    }
    Ok(())
}

/// The sub-graph definition a node instantiates, if any
pub(crate) fn subgraph_type<'a>(
    node: &ExportedNode,
    defs: &SubgraphDefs<'a>,
) -> Option<&'a ExportedSubgraph> {
    let id = Uuid::parse_str(&node.node_type).ok()?;
    defs.get(&id).copied()
}

/// Parse `properties.proxyWidgets`
pub fn parse_proxy_widgets(
    properties: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<ProxyWidget>> {
    let Some(value) = properties.get(PROXY_WIDGETS_KEY) else {
        return Ok(Vec::new());
    };
    let pairs: Vec<(String, String)> = serde_json::from_value(value.clone())?;
    pairs
        .into_iter()
        .map(|(node_id, widget)| {
            let id: NodeId = node_id
                .parse()
                .map_err(|_| {
                    GraphError::InvalidGraph(format!(
                        "proxy widget node id '{}' is not numeric",
                        node_id
                    ))
                })?;
            Ok(ProxyWidget::new(id, widget))
        })
        .collect()
}

/// Build a detached node from its exported form
///
/// Slot link references are left empty; they are restored when the links
/// are added to the owning graph.
pub(crate) fn build_node(
    exported: &ExportedNode,
    defs: &SubgraphDefs<'_>,
    stack: &mut Vec<SubgraphId>,
) -> Result<Node> {
    let mut node = Node::new(exported.node_type.clone()).with_id(exported.id);
    node.title = exported.title.clone().unwrap_or_else(|| exported.node_type.clone());
    node.pos = exported.pos;
    node.size = exported.size;
    node.flags = exported.flags;
    node.order = exported.order;
    node.mode = exported.mode;
    node.inputs = exported
        .inputs
        .iter()
        .map(|i| InputSlot {
            name: i.name.clone(),
            label: i.label.clone(),
            slot_type: i.slot_type.clone(),
            link: None,
            widget: i.widget.clone(),
            bounding: None,
            pos: i.pos,
        })
        .collect();
    node.outputs = exported
        .outputs
        .iter()
        .map(|o| OutputSlot {
            name: o.name.clone(),
            label: o.label.clone(),
            slot_type: o.slot_type.clone(),
            links: Vec::new(),
            bounding: None,
        })
        .collect();
    node.widgets = exported
        .widgets
        .iter()
        .map(|w| {
            let mut widget = Widget::new(w.name.clone(), w.widget_type.clone(), w.value.clone());
            widget.options = w.options.clone();
            widget
        })
        .collect();
    node.properties = exported.properties.clone();

    if let Some(definition) = subgraph_type(exported, defs) {
        let proxy_widgets = parse_proxy_widgets(&node.properties)?;
        node.properties.remove(PROXY_WIDGETS_KEY);
        let subgraph = build_subgraph(definition, defs, stack)?;
        node.kind = NodeKind::Subgraph(Box::new(SubgraphInstance {
            subgraph,
            proxy_widgets,
        }));
    } else if Uuid::parse_str(&exported.node_type).is_ok() {
        return Err(GraphError::InvalidGraph(format!(
            "node {} instantiates sub-graph {} which has no definition",
            exported.id, exported.node_type
        )));
    }
    Ok(node)
}

pub(crate) fn build_subgraph(
    definition: &ExportedSubgraph,
    defs: &SubgraphDefs<'_>,
    stack: &mut Vec<SubgraphId>,
) -> Result<Subgraph> {
    if stack.contains(&definition.id) {
        return Err(GraphError::InvalidGraph(format!(
            "sub-graph {} contains itself",
            definition.id
        )));
    }
    stack.push(definition.id);

    let mut graph = Graph::interior(definition.id);
    populate(
        &mut graph,
        Contents {
            nodes: &definition.nodes,
            links: &definition.links,
            groups: &definition.groups,
            reroutes: &definition.reroutes,
        },
        defs,
        stack,
    )?;
    graph.raise_state(definition.state);
    graph.config = definition.config.clone();

    let mut subgraph = Subgraph::with_graph(definition.name.clone(), graph);
    subgraph.inputs = definition.inputs.clone();
    subgraph.outputs = definition.outputs.clone();
    subgraph.input_node = definition.input_node;
    subgraph.output_node = definition.output_node;
    subgraph.widgets = definition.widgets.clone();
    subgraph.version = definition.version;
    subgraph.revision = definition.revision;
    subgraph.sync_boundary_links();

    stack.pop();
    Ok(subgraph)
}
