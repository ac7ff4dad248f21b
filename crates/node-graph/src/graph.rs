//! The graph data model
//!
//! A [`Graph`] owns its nodes, links, groups and reroutes and hands out ids
//! from monotonically increasing counters. Every mutation keeps the link table
//! and the slot back-references (`InputSlot::link`, `OutputSlot::links`) in
//! step, so no call ever leaves a dangling link behind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::link::{Group, Link, Reroute};
use crate::node::{InputSlot, Node, NodeKind, UNASSIGNED_NODE_ID};
use crate::subgraph::Subgraph;
use crate::types::{
    GraphId, GroupId, LinkId, NodeId, NodeKey, NodeLocator, Point, Rect, RerouteId, SlotType,
    SubgraphId, SUBGRAPH_INPUT_ID, SUBGRAPH_OUTPUT_ID,
};

/// Id counters of a graph; they never decrease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphState {
    pub last_node_id: i64,
    pub last_link_id: u64,
    pub last_group_id: u64,
    pub last_reroute_id: u64,
}

/// Whether a graph is the root or the interior of a sub-graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphScope {
    Root,
    /// Interior graphs accept links to the reserved boundary node ids
    Interior,
}

/// A graph of nodes connected by links
#[derive(Debug, Clone)]
pub struct Graph {
    id: GraphId,
    scope: GraphScope,
    nodes: Vec<Node>,
    links: BTreeMap<LinkId, Link>,
    groups: Vec<Group>,
    reroutes: BTreeMap<RerouteId, Reroute>,
    state: GraphState,
    /// Bumped on every structural mutation
    pub revision: u64,
    /// Free-form persisted configuration
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create an empty root graph with a fresh id
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4(), GraphScope::Root)
    }

    /// Create an empty interior graph
    pub fn interior(id: SubgraphId) -> Self {
        Self::with_id(id, GraphScope::Interior)
    }

    pub fn with_id(id: GraphId, scope: GraphScope) -> Self {
        Self {
            id,
            scope,
            nodes: Vec::new(),
            links: BTreeMap::new(),
            groups: Vec::new(),
            reroutes: BTreeMap::new(),
            state: GraphState::default(),
            revision: 0,
            config: serde_json::Map::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn scope(&self) -> GraphScope {
        self.scope
    }

    pub fn is_interior(&self) -> bool {
        self.scope == GraphScope::Interior
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Raise counters to at least the given values; never lowers them
    pub fn raise_state(&mut self, other: GraphState) {
        self.state.last_node_id = self.state.last_node_id.max(other.last_node_id);
        self.state.last_link_id = self.state.last_link_id.max(other.last_link_id);
        self.state.last_group_id = self.state.last_group_id.max(other.last_group_id);
        self.state.last_reroute_id = self.state.last_reroute_id.max(other.last_reroute_id);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn reroutes(&self) -> impl Iterator<Item = &Reroute> {
        self.reroutes.values()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Look a node up by id or by a string coercible to an id
    pub fn get_node_by_id<'k>(&self, key: impl Into<NodeKey<'k>>) -> Option<&Node> {
        let id = key.into().to_id()?;
        self.node(id)
    }

    /// Hand out the next node id
    pub fn allocate_node_id(&mut self) -> NodeId {
        self.state.last_node_id += 1;
        NodeId(self.state.last_node_id)
    }

    /// Hand out the next link id
    pub fn allocate_link_id(&mut self) -> LinkId {
        self.state.last_link_id += 1;
        LinkId(self.state.last_link_id)
    }

    /// Add a node, keeping its id when it is free and assigning a fresh one
    /// otherwise
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        if node.id == UNASSIGNED_NODE_ID || node.id.0 <= 0 || self.contains_node(node.id) {
            node.id = self.allocate_node_id();
        } else {
            self.state.last_node_id = self.state.last_node_id.max(node.id.0);
        }
        node.order = self.nodes.len() as u32;
        let id = node.id;
        log::debug!("Graph {}: added node {} ({})", self.id, id, node.node_type);
        self.nodes.push(node);
        self.revision += 1;
        id
    }

    /// Remove a node and every link incident to it
    ///
    /// Links are detached before the node is dropped. A removed sub-graph
    /// node takes its interior graph with it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(GraphError::NodeNotFound(id))?;

        let incident: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| l.touches(id))
            .map(|l| l.id)
            .collect();
        for link_id in incident {
            self.remove_link(link_id)?;
        }

        let node = self.nodes.remove(index);
        self.revision += 1;
        log::debug!("Graph {}: removed node {}", self.id, id);
        Ok(node)
    }

    pub fn get_link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Links arriving at a node
    pub fn incoming_links(&self, node_id: NodeId) -> impl Iterator<Item = &Link> + '_ {
        self.links.values().filter(move |l| l.target_id == node_id)
    }

    /// Links leaving a node
    pub fn outgoing_links(&self, node_id: NodeId) -> impl Iterator<Item = &Link> + '_ {
        self.links.values().filter(move |l| l.origin_id == node_id)
    }

    /// The link currently attached to an input slot
    pub fn input_link(&self, node_id: NodeId, slot: usize) -> Option<LinkId> {
        self.node(node_id)?.inputs.get(slot)?.link
    }

    fn input_slot_mut(&mut self, node_id: NodeId, slot: usize) -> Option<&mut InputSlot> {
        self.node_mut(node_id)?.inputs.get_mut(slot)
    }

    /// Resolve the origin end of a prospective link to its slot type
    ///
    /// Boundary ids resolve to `None` (type known only to the owning
    /// sub-graph).
    fn origin_type(&self, origin_id: NodeId, origin_slot: usize) -> Result<Option<SlotType>> {
        if origin_id.is_boundary() {
            if origin_id != SUBGRAPH_INPUT_ID || !self.is_interior() {
                return Err(GraphError::invalid_link(format!(
                    "node {} cannot be a link origin in this graph",
                    origin_id
                )));
            }
            return Ok(None);
        }
        let node = self.node(origin_id).ok_or(GraphError::NodeNotFound(origin_id))?;
        let output = node.outputs.get(origin_slot).ok_or(GraphError::SlotNotFound {
            node_id: origin_id,
            slot: origin_slot,
            direction: "output",
        })?;
        Ok(Some(output.slot_type.clone()))
    }

    fn target_type(&self, target_id: NodeId, target_slot: usize) -> Result<Option<SlotType>> {
        if target_id.is_boundary() {
            if target_id != SUBGRAPH_OUTPUT_ID || !self.is_interior() {
                return Err(GraphError::invalid_link(format!(
                    "node {} cannot be a link target in this graph",
                    target_id
                )));
            }
            return Ok(None);
        }
        let node = self.node(target_id).ok_or(GraphError::NodeNotFound(target_id))?;
        let input = node.inputs.get(target_slot).ok_or(GraphError::SlotNotFound {
            node_id: target_id,
            slot: target_slot,
            direction: "input",
        })?;
        Ok(Some(input.slot_type.clone()))
    }

    /// Connect an output slot to an input slot, replacing any link already on
    /// the input
    pub fn connect(
        &mut self,
        origin_id: NodeId,
        origin_slot: usize,
        target_id: NodeId,
        target_slot: usize,
    ) -> Result<LinkId> {
        let output_type = self.origin_type(origin_id, origin_slot)?;
        let input_type = self.target_type(target_id, target_slot)?;
        if let (Some(output), Some(input)) = (&output_type, &input_type) {
            if !output.is_compatible_with(input) {
                return Err(GraphError::IncompatibleTypes {
                    output: output.to_string(),
                    input: input.to_string(),
                });
            }
        }
        let link_type = output_type.or(input_type).unwrap_or_default();
        let id = self.allocate_link_id();
        let link = Link::new(id, origin_id, origin_slot, target_id, target_slot, link_type);
        self.insert_link(link)?;
        log::debug!(
            "Graph {}: linked {}[{}] -> {}[{}] as {}",
            self.id,
            origin_id,
            origin_slot,
            target_id,
            target_slot,
            id
        );
        Ok(id)
    }

    /// Insert a link that already carries its id (import, paste, sub-graph
    /// conversion)
    pub fn add_link(&mut self, link: Link) -> Result<LinkId> {
        if self.links.contains_key(&link.id) {
            return Err(GraphError::invalid_link(format!("duplicate link id {}", link.id)));
        }
        self.origin_type(link.origin_id, link.origin_slot)?;
        self.target_type(link.target_id, link.target_slot)?;
        self.state.last_link_id = self.state.last_link_id.max(link.id.0);
        let id = link.id;
        self.insert_link(link)?;
        Ok(id)
    }

    fn insert_link(&mut self, link: Link) -> Result<()> {
        if let Some(existing) = self.input_link(link.target_id, link.target_slot) {
            self.remove_link(existing)?;
        }
        if let Some(node) = self.node_mut(link.origin_id) {
            if let Some(output) = node.outputs.get_mut(link.origin_slot) {
                output.links.push(link.id);
            }
        }
        if let Some(input) = self.input_slot_mut(link.target_id, link.target_slot) {
            input.link = Some(link.id);
        }
        if let Some(parent) = link.parent_id {
            if let Some(reroute) = self.reroutes.get_mut(&parent) {
                reroute.link_ids.insert(link.id);
            }
        }
        self.links.insert(link.id, link);
        self.revision += 1;
        Ok(())
    }

    /// Remove a link and detach it from both endpoints and any reroutes
    pub fn remove_link(&mut self, id: LinkId) -> Result<Link> {
        let link = self.links.remove(&id).ok_or(GraphError::LinkNotFound(id))?;
        if let Some(node) = self.node_mut(link.origin_id) {
            if let Some(output) = node.outputs.get_mut(link.origin_slot) {
                output.links.retain(|l| *l != id);
            }
        }
        if let Some(input) = self.input_slot_mut(link.target_id, link.target_slot) {
            if input.link == Some(id) {
                input.link = None;
            }
        }
        for reroute in self.reroutes.values_mut() {
            reroute.link_ids.remove(&id);
        }
        self.revision += 1;
        Ok(link)
    }

    /// Disconnect whatever link feeds an input slot
    pub fn disconnect_input(&mut self, node_id: NodeId, slot: usize) -> Option<Link> {
        let link_id = self.input_link(node_id, slot)?;
        self.remove_link(link_id).ok()
    }

    /// Move the target end of an existing link to another input
    pub fn retarget_link(
        &mut self,
        link_id: LinkId,
        new_target: NodeId,
        new_slot: usize,
    ) -> Result<()> {
        let link = self
            .links
            .get(&link_id)
            .cloned()
            .ok_or(GraphError::LinkNotFound(link_id))?;
        if link.target_id == new_target && link.target_slot == new_slot {
            return Ok(());
        }

        let output_type = self.origin_type(link.origin_id, link.origin_slot)?;
        let input_type = self.target_type(new_target, new_slot)?;
        if let (Some(output), Some(input)) = (&output_type, &input_type) {
            if !output.is_compatible_with(input) {
                return Err(GraphError::IncompatibleTypes {
                    output: output.to_string(),
                    input: input.to_string(),
                });
            }
        }

        if let Some(existing) = self.input_link(new_target, new_slot) {
            self.remove_link(existing)?;
        }
        if let Some(input) = self.input_slot_mut(link.target_id, link.target_slot) {
            if input.link == Some(link_id) {
                input.link = None;
            }
        }
        if let Some(input) = self.input_slot_mut(new_target, new_slot) {
            input.link = Some(link_id);
        }
        if let Some(stored) = self.links.get_mut(&link_id) {
            stored.target_id = new_target;
            stored.target_slot = new_slot;
        }
        self.revision += 1;
        log::debug!(
            "Graph {}: retargeted link {} to {}[{}]",
            self.id,
            link_id,
            new_target,
            new_slot
        );
        Ok(())
    }

    /// Add a group, assigning it a fresh id
    pub fn add_group(&mut self, mut group: Group) -> GroupId {
        self.state.last_group_id += 1;
        group.id = GroupId(self.state.last_group_id);
        let id = group.id;
        self.groups.push(group);
        self.revision += 1;
        id
    }

    /// Insert a group that already carries its id
    pub(crate) fn insert_group(&mut self, group: Group) {
        self.state.last_group_id = self.state.last_group_id.max(group.id.0);
        self.groups.push(group);
    }

    pub fn remove_group(&mut self, id: GroupId) -> Option<Group> {
        let pos = self.groups.iter().position(|g| g.id == id)?;
        self.revision += 1;
        Some(self.groups.remove(pos))
    }

    /// Add a reroute waypoint
    pub fn add_reroute(
        &mut self,
        pos: Point,
        parent_id: Option<RerouteId>,
        slot_type: SlotType,
    ) -> RerouteId {
        self.state.last_reroute_id += 1;
        let id = RerouteId(self.state.last_reroute_id);
        self.reroutes.insert(
            id,
            Reroute {
                id,
                pos,
                parent_id,
                link_ids: Default::default(),
                slot_type,
            },
        );
        self.revision += 1;
        id
    }

    /// Insert a reroute that already carries its id
    pub(crate) fn insert_reroute(&mut self, reroute: Reroute) {
        self.state.last_reroute_id = self.state.last_reroute_id.max(reroute.id.0);
        self.reroutes.insert(reroute.id, reroute);
    }

    pub fn get_reroute(&self, id: RerouteId) -> Option<&Reroute> {
        self.reroutes.get(&id)
    }

    /// Route a link through a reroute
    pub fn attach_link_to_reroute(&mut self, link_id: LinkId, reroute_id: RerouteId) -> Result<()> {
        let reroute = self
            .reroutes
            .get_mut(&reroute_id)
            .ok_or_else(|| GraphError::invalid_link(format!("reroute {} not found", reroute_id)))?;
        let link = self.links.get_mut(&link_id).ok_or(GraphError::LinkNotFound(link_id))?;
        reroute.link_ids.insert(link_id);
        link.parent_id = Some(reroute_id);
        Ok(())
    }

    /// Remove a reroute; links and child reroutes that pointed at it fall back
    /// to its parent
    pub fn remove_reroute(&mut self, id: RerouteId) -> Option<Reroute> {
        let removed = self.reroutes.remove(&id)?;
        for link in self.links.values_mut() {
            if link.parent_id == Some(id) {
                link.parent_id = removed.parent_id;
            }
        }
        for reroute in self.reroutes.values_mut() {
            if reroute.parent_id == Some(id) {
                reroute.parent_id = removed.parent_id;
            }
        }
        self.revision += 1;
        Some(removed)
    }

    /// Find an interior sub-graph at any nesting depth
    pub fn find_subgraph(&self, id: SubgraphId) -> Option<&Subgraph> {
        for node in &self.nodes {
            if let NodeKind::Subgraph(instance) = &node.kind {
                if instance.subgraph.id() == id {
                    return Some(&instance.subgraph);
                }
                if let Some(found) = instance.subgraph.graph.find_subgraph(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn find_subgraph_mut(&mut self, id: SubgraphId) -> Option<&mut Subgraph> {
        for node in self.nodes.iter_mut() {
            if let NodeKind::Subgraph(instance) = &mut node.kind {
                if instance.subgraph.id() == id {
                    return Some(&mut instance.subgraph);
                }
                if let Some(found) = instance.subgraph.graph.find_subgraph_mut(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// This graph or any nested interior graph with the given id
    pub fn graph_by_id(&self, id: GraphId) -> Option<&Graph> {
        if self.id == id {
            return Some(self);
        }
        self.find_subgraph(id).map(|s| &s.graph)
    }

    pub fn graph_by_id_mut(&mut self, id: GraphId) -> Option<&mut Graph> {
        if self.id == id {
            return Some(self);
        }
        self.find_subgraph_mut(id).map(|s| &mut s.graph)
    }

    /// Resolve a qualified node address
    pub fn resolve_locator(&self, locator: NodeLocator) -> Option<&Node> {
        self.graph_by_id(locator.graph_id)?.node(locator.node_id)
    }

    /// Locator for a node of this graph
    pub fn locator(&self, node_id: NodeId) -> NodeLocator {
        NodeLocator::new(self.id, node_id)
    }

    /// Bounding box covering the given nodes
    pub fn nodes_bounding(&self, ids: &[NodeId]) -> Option<Rect> {
        ids.iter()
            .filter_map(|id| self.node(*id))
            .map(|n| n.bounding())
            .reduce(|a, b| a.union(&b))
    }
}
