//! Sub-graphs: graphs nested inside a node
//!
//! A sub-graph node exposes its interior at the boundary in two ways:
//! - free connection slots, wired inside to the reserved boundary nodes
//!   ([`SUBGRAPH_INPUT_ID`] and [`SUBGRAPH_OUTPUT_ID`])
//! - promoted widgets, see [`crate::promotion`]
//!
//! # Example
//!
//! ```ignore
//! let result = convert_to_subgraph(&mut graph, &[NodeId(3), NodeId(4)], "Upscale")?;
//! let node = graph.node(result.node_id).unwrap();
//! assert!(node.is_subgraph());
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::link::Link;
use crate::node::Node;
use crate::types::{
    LinkId, NodeId, Point, Rect, SlotType, SubgraphId, SUBGRAPH_INPUT_ID, SUBGRAPH_OUTPUT_ID,
};

/// One boundary input or output of a sub-graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphIo {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    /// Interior links attached to this boundary slot
    #[serde(default)]
    pub link_ids: Vec<LinkId>,
}

impl SubgraphIo {
    pub fn new(name: impl Into<String>, slot_type: SlotType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            label: None,
            slot_type,
            link_ids: Vec::new(),
        }
    }
}

/// Position of a boundary pseudo-node inside the sub-graph canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryNode {
    pub id: NodeId,
    pub bounding: Rect,
}

/// A widget exposed by the sub-graph definition itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphWidget {
    /// Interior node owning the widget
    pub id: NodeId,
    pub name: String,
}

/// An interior graph together with its boundary definition
#[derive(Debug, Clone)]
pub struct Subgraph {
    pub name: String,
    pub graph: Graph,
    pub inputs: Vec<SubgraphIo>,
    pub outputs: Vec<SubgraphIo>,
    pub input_node: BoundaryNode,
    pub output_node: BoundaryNode,
    pub widgets: Vec<SubgraphWidget>,
    pub version: u32,
    pub revision: u32,
}

impl Subgraph {
    /// Create an empty sub-graph with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_graph(name, Graph::interior(Uuid::new_v4()))
    }

    pub fn with_graph(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            name: name.into(),
            graph,
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_node: BoundaryNode {
                id: SUBGRAPH_INPUT_ID,
                bounding: Rect::new(-200.0, 0.0, 120.0, 60.0),
            },
            output_node: BoundaryNode {
                id: SUBGRAPH_OUTPUT_ID,
                bounding: Rect::new(200.0, 0.0, 120.0, 60.0),
            },
            widgets: Vec::new(),
            version: 1,
            revision: 0,
        }
    }

    /// The sub-graph id, shared with its interior graph
    pub fn id(&self) -> SubgraphId {
        self.graph.id()
    }

    pub fn add_input(&mut self, name: impl Into<String>, slot_type: SlotType) -> usize {
        self.inputs.push(SubgraphIo::new(name, slot_type));
        self.inputs.len() - 1
    }

    pub fn add_output(&mut self, name: impl Into<String>, slot_type: SlotType) -> usize {
        self.outputs.push(SubgraphIo::new(name, slot_type));
        self.outputs.len() - 1
    }

    /// Wire boundary input `index` to an interior input slot
    pub fn connect_input(
        &mut self,
        index: usize,
        target: NodeId,
        target_slot: usize,
    ) -> Result<LinkId> {
        if index >= self.inputs.len() {
            return Err(GraphError::SlotNotFound {
                node_id: SUBGRAPH_INPUT_ID,
                slot: index,
                direction: "output",
            });
        }
        let link_id = self.graph.connect(SUBGRAPH_INPUT_ID, index, target, target_slot)?;
        self.inputs[index].link_ids.push(link_id);
        Ok(link_id)
    }

    /// Wire an interior output slot to boundary output `index`
    pub fn connect_output(
        &mut self,
        index: usize,
        origin: NodeId,
        origin_slot: usize,
    ) -> Result<LinkId> {
        if index >= self.outputs.len() {
            return Err(GraphError::SlotNotFound {
                node_id: SUBGRAPH_OUTPUT_ID,
                slot: index,
                direction: "input",
            });
        }
        let link_id = self.graph.connect(origin, origin_slot, SUBGRAPH_OUTPUT_ID, index)?;
        self.outputs[index].link_ids.push(link_id);
        Ok(link_id)
    }

    /// Rebuild the boundary `link_ids` lists from the interior link table
    pub fn sync_boundary_links(&mut self) {
        for io in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            io.link_ids.clear();
        }
        for link in self.graph.links() {
            if link.origin_id == SUBGRAPH_INPUT_ID {
                if let Some(io) = self.inputs.get_mut(link.origin_slot) {
                    io.link_ids.push(link.id);
                }
            }
            if link.target_id == SUBGRAPH_OUTPUT_ID {
                if let Some(io) = self.outputs.get_mut(link.target_slot) {
                    io.link_ids.push(link.id);
                }
            }
        }
    }
}

/// Result of converting a selection into a sub-graph node
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// The new sub-graph node in the parent graph
    pub node_id: NodeId,
    pub subgraph_id: SubgraphId,
    /// Links that moved into the interior unchanged
    pub internalized_links: Vec<LinkId>,
    /// Parent links that crossed the selection boundary (now replaced)
    pub boundary_links: Vec<LinkId>,
}

/// Boundary slot grouping: one entry per distinct origin slot
struct BoundaryGroup {
    origin: (NodeId, usize),
    name: String,
    slot_type: SlotType,
    links: Vec<Link>,
}

fn group_by_origin(links: Vec<Link>, graph: &Graph) -> Vec<BoundaryGroup> {
    let mut groups: Vec<BoundaryGroup> = Vec::new();
    for link in links {
        let origin = (link.origin_id, link.origin_slot);
        if let Some(group) = groups.iter_mut().find(|g| g.origin == origin) {
            group.links.push(link);
            continue;
        }
        let name = graph
            .node(link.origin_id)
            .and_then(|n| n.outputs.get(link.origin_slot))
            .map(|s| s.name.clone())
            .unwrap_or_else(|| link.link_type.to_string());
        groups.push(BoundaryGroup {
            origin,
            name,
            slot_type: link.link_type.clone(),
            links: vec![link],
        });
    }
    groups
}

/// Move a selection of nodes into a new sub-graph node
///
/// This will:
/// 1. Move the selected nodes into a fresh interior graph (ids preserved)
/// 2. Move links with both ends inside the selection along with them
/// 3. Turn each distinct outside origin feeding the selection into a
///    sub-graph input, and each distinct inside origin feeding the outside
///    into a sub-graph output
/// 4. Place the sub-graph node at the selection's center and re-link it
pub fn convert_to_subgraph(
    graph: &mut Graph,
    selection: &[NodeId],
    name: impl Into<String>,
) -> Result<ConvertResult> {
    if selection.is_empty() {
        return Err(GraphError::InvalidSelection("cannot convert an empty selection".to_string()));
    }
    let selected: HashSet<NodeId> = selection.iter().copied().collect();
    for id in &selected {
        if !graph.contains_node(*id) {
            return Err(GraphError::NodeNotFound(*id));
        }
    }

    let mut internal = Vec::new();
    let mut entering = Vec::new();
    let mut leaving = Vec::new();
    for link in graph.links() {
        let origin_inside = selected.contains(&link.origin_id);
        let target_inside = selected.contains(&link.target_id);
        match (origin_inside, target_inside) {
            (true, true) => internal.push(link.clone()),
            (false, true) => entering.push(link.clone()),
            (true, false) => leaving.push(link.clone()),
            (false, false) => {}
        }
    }
    let input_groups = group_by_origin(entering, graph);
    let output_groups = group_by_origin(leaving, graph);

    let bounds = graph
        .nodes_bounding(selection)
        .ok_or_else(|| GraphError::InvalidSelection("selection has no nodes".to_string()))?;

    let mut subgraph = Subgraph::new(name);
    let boundary_y = bounds.center().y - 30.0;
    subgraph.input_node.bounding = Rect::new(bounds.x - 180.0, boundary_y, 120.0, 60.0);
    subgraph.output_node.bounding = Rect::new(bounds.right() + 60.0, boundary_y, 120.0, 60.0);

    // Remove in selection order so interior node order follows it
    let mut ordered: Vec<NodeId> = Vec::new();
    for id in selection {
        if !ordered.contains(id) {
            ordered.push(*id);
        }
    }
    for id in &ordered {
        let node = graph.remove_node(*id)?;
        subgraph.graph.add_node(node);
    }

    let internalized_links: Vec<LinkId> = internal.iter().map(|l| l.id).collect();
    for mut link in internal {
        link.parent_id = None;
        subgraph.graph.add_link(link)?;
    }

    for group in &input_groups {
        let index = subgraph.add_input(group.name.clone(), group.slot_type.clone());
        for link in &group.links {
            subgraph.connect_input(index, link.target_id, link.target_slot)?;
        }
    }
    for group in &output_groups {
        let index = subgraph.add_output(group.name.clone(), group.slot_type.clone());
        subgraph.connect_output(index, group.origin.0, group.origin.1)?;
    }

    let subgraph_id = subgraph.id();
    let mut node = Node::subgraph(subgraph);
    let center = bounds.center();
    node.pos = Point::new(center.x - node.size.width / 2.0, center.y - node.size.height / 2.0);
    let node_id = graph.add_node(node);

    let mut boundary_links = Vec::new();
    for (index, group) in input_groups.iter().enumerate() {
        graph.connect(group.origin.0, group.origin.1, node_id, index)?;
        boundary_links.extend(group.links.iter().map(|l| l.id));
    }
    for (index, group) in output_groups.iter().enumerate() {
        for link in &group.links {
            graph.connect(node_id, index, link.target_id, link.target_slot)?;
            boundary_links.push(link.id);
        }
    }

    log::info!(
        "Converted {} nodes into sub-graph {} (node {}, {} inputs, {} outputs)",
        ordered.len(),
        subgraph_id,
        node_id,
        input_groups.len(),
        output_groups.len()
    );

    Ok(ConvertResult {
        node_id,
        subgraph_id,
        internalized_links,
        boundary_links,
    })
}
