//! Copy and paste with identity remapping
//!
//! A [`ClipboardPayload`] is the export shape of a selection. Pasting gives
//! every node a fresh id in the destination graph. Sub-graph nodes are
//! pasted as independent copies: each gets a fresh sub-graph id, and every
//! interior node id is rewritten through one old→new map that is applied to
//! the interior nodes, the interior links, the definition's widget list and
//! the outer node's `proxyWidgets`. A reference that the map cannot resolve
//! aborts the paste before the destination is touched.
//!
//! # Example
//!
//! ```ignore
//! let payload = copy_nodes(&graph, &[NodeId(3)])?;
//! let pasted = paste(&mut graph, &payload, Point::new(40.0, 40.0))?;
//! let copy = graph.node(pasted.node_map[&NodeId(3)]).unwrap();
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::link::{Group, Link, Reroute};
use crate::node::{Node, ProxyWidget};
use crate::serialization::{
    build_node, export_node, index_definitions, parse_proxy_widgets, subgraph_type, ExportedNode,
    ExportedSubgraph, SubgraphDefs, PROXY_WIDGETS_KEY,
};
use crate::types::{GroupId, LinkId, NodeId, Point, RerouteId, SubgraphId};

/// Clipboard contents: the export shape of a selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipboardPayload {
    #[serde(default)]
    pub nodes: Vec<ExportedNode>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub reroutes: Vec<Reroute>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub subgraphs: Vec<ExportedSubgraph>,
}

impl ClipboardPayload {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.groups.is_empty() && self.reroutes.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Copy nodes and the links running between them
pub fn copy_nodes(graph: &Graph, node_ids: &[NodeId]) -> Result<ClipboardPayload> {
    copy_selection(graph, node_ids, &[])
}

/// Copy nodes, groups, the links between the nodes and the reroutes those
/// links pass through
pub fn copy_selection(
    graph: &Graph,
    node_ids: &[NodeId],
    group_ids: &[GroupId],
) -> Result<ClipboardPayload> {
    if let Some(missing) = node_ids.iter().find(|id| !graph.contains_node(**id)) {
        return Err(GraphError::NodeNotFound(*missing));
    }
    let selected: HashSet<NodeId> = node_ids.iter().copied().collect();
    let mut payload = ClipboardPayload::default();

    for node in graph.nodes().iter().filter(|n| selected.contains(&n.id)) {
        payload.nodes.push(export_node(node, &mut payload.subgraphs));
    }

    let mut reroute_ids = BTreeSet::new();
    for link in graph
        .links()
        .filter(|l| selected.contains(&l.origin_id) && selected.contains(&l.target_id))
    {
        let mut parent = link.parent_id;
        while let Some(id) = parent {
            if !reroute_ids.insert(id) {
                break;
            }
            parent = graph.get_reroute(id).and_then(|r| r.parent_id);
        }
        payload.links.push(link.clone());
    }
    let copied_links: BTreeSet<LinkId> = payload.links.iter().map(|l| l.id).collect();
    for id in reroute_ids {
        if let Some(reroute) = graph.get_reroute(id) {
            let mut reroute = reroute.clone();
            reroute.link_ids.retain(|l| copied_links.contains(l));
            payload.reroutes.push(reroute);
        }
    }

    payload.groups = graph
        .groups()
        .iter()
        .filter(|g| group_ids.contains(&g.id))
        .cloned()
        .collect();

    log::debug!(
        "Copied {} nodes, {} links, {} sub-graph definitions",
        payload.nodes.len(),
        payload.links.len(),
        payload.subgraphs.len()
    );
    Ok(payload)
}

/// What a paste produced
#[derive(Debug, Clone, Default)]
pub struct PasteResult {
    /// Payload node id → new node id, for outer nodes
    pub node_map: HashMap<NodeId, NodeId>,
    /// New outer node ids in payload order
    pub nodes: Vec<NodeId>,
    pub links: Vec<LinkId>,
    pub groups: Vec<GroupId>,
    /// Payload sub-graph id → fresh sub-graph id, one entry per pasted instance
    pub subgraphs: Vec<(SubgraphId, SubgraphId)>,
}

/// Hands out fresh node ids from the destination's counter
struct IdAllocator<'g> {
    graph: &'g Graph,
    next: i64,
}

impl<'g> IdAllocator<'g> {
    fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            next: graph.state().last_node_id + 1,
        }
    }

    fn node_id(&mut self) -> NodeId {
        while self.graph.contains_node(NodeId(self.next)) {
            self.next += 1;
        }
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    fn last(&self) -> i64 {
        self.next - 1
    }
}

/// Paste a payload into `graph`, shifting it by `offset`
///
/// All remapping happens on detached copies first; the graph is only
/// modified once every reference has resolved. When several payload links
/// feed the same input, the last one wins.
pub fn paste(graph: &mut Graph, payload: &ClipboardPayload, offset: Point) -> Result<PasteResult> {
    let defs = index_definitions(&payload.subgraphs);
    let mut result = PasteResult::default();

    // Stage nodes
    let (staged_nodes, last_node_id) = {
        let mut ids = IdAllocator::new(graph);
        let mut staged: Vec<Node> = Vec::with_capacity(payload.nodes.len());
        for exported in &payload.nodes {
            let new_id = ids.node_id();
            if result.node_map.insert(exported.id, new_id).is_some() {
                return Err(GraphError::remap(format!(
                    "node {} appears twice in the payload",
                    exported.id
                )));
            }
            let mut exported = exported.clone();
            exported.id = new_id;
            exported.pos = exported.pos.offset(offset.x, offset.y);

            let mut remapped_defs = Vec::new();
            if let Some(definition) = resolve_subgraph(&exported, &defs)? {
                let remapped =
                    remap_subgraph(
                        definition,
                        &defs,
                        &mut ids,
                        &mut remapped_defs,
                        &mut Vec::new(),
                    )?;
                rewrite_proxy_widgets(&mut exported, &remapped.node_map)?;
                exported.node_type = remapped.id.to_string();
                result.subgraphs.push((definition.id, remapped.id));
            }
            let remapped_index = index_definitions(&remapped_defs);
            let node = build_node(&exported, &remapped_index, &mut Vec::new())?;
            staged.push(node);
        }
        (staged, ids.last())
    };

    // Stage reroutes
    let mut reroute_map: HashMap<RerouteId, RerouteId> = HashMap::new();
    let mut next_reroute = graph.state().last_reroute_id;
    for reroute in &payload.reroutes {
        next_reroute += 1;
        reroute_map.insert(reroute.id, RerouteId(next_reroute));
    }
    let mut staged_reroutes = Vec::with_capacity(payload.reroutes.len());
    for reroute in &payload.reroutes {
        let mut reroute = reroute.clone();
        reroute.id = reroute_map[&reroute.id];
        reroute.pos = reroute.pos.offset(offset.x, offset.y);
        reroute.parent_id = remap_reroute(reroute.parent_id, &reroute_map)?;
        // rebuilt when the links are added
        reroute.link_ids.clear();
        staged_reroutes.push(reroute);
    }

    // Stage links
    let mut staged_links: Vec<Link> = Vec::with_capacity(payload.links.len());
    for link in &payload.links {
        let origin = *result.node_map.get(&link.origin_id).ok_or_else(|| {
            GraphError::remap(format!(
                "link {} origin {} is not in the payload",
                link.id, link.origin_id
            ))
        })?;
        let target = *result.node_map.get(&link.target_id).ok_or_else(|| {
            GraphError::remap(format!(
                "link {} target {} is not in the payload",
                link.id, link.target_id
            ))
        })?;
        let origin_ok = staged_nodes
            .iter()
            .find(|n| n.id == origin)
            .is_some_and(|n| link.origin_slot < n.outputs.len());
        let target_ok = staged_nodes
            .iter()
            .find(|n| n.id == target)
            .is_some_and(|n| link.target_slot < n.inputs.len());
        if !origin_ok || !target_ok {
            return Err(GraphError::invalid_link(format!(
                "link {} references a missing slot",
                link.id
            )));
        }
        let mut staged = link.clone();
        staged.origin_id = origin;
        staged.target_id = target;
        staged.parent_id = remap_reroute(link.parent_id, &reroute_map)?;
        let before = staged_links.len();
        staged_links.retain(|l| (l.target_id, l.target_slot) != (target, link.target_slot));
        if staged_links.len() != before {
            log::debug!(
                "Pasted link {} replaces an earlier link into node {} slot {}",
                link.id,
                target,
                link.target_slot
            );
        }
        staged_links.push(staged);
    }

    // Commit
    for node in staged_nodes {
        let id = graph.add_node(node);
        result.nodes.push(id);
    }
    for reroute in staged_reroutes {
        graph.insert_reroute(reroute);
    }
    for mut link in staged_links {
        link.id = graph.allocate_link_id();
        result.links.push(graph.add_link(link)?);
    }
    for group in &payload.groups {
        let mut group = group.clone();
        group.bounding.x += offset.x;
        group.bounding.y += offset.y;
        result.groups.push(graph.add_group(group));
    }
    let mut state = graph.state();
    state.last_node_id = state.last_node_id.max(last_node_id);
    graph.raise_state(state);

    log::info!(
        "Pasted {} nodes and {} links into graph {} ({} sub-graph copies)",
        result.nodes.len(),
        result.links.len(),
        graph.id(),
        result.subgraphs.len()
    );
    Ok(result)
}

/// The definition a pasted node instantiates, if it is a sub-graph node
///
/// A node whose type names a sub-graph id, or that carries proxy widgets,
/// must resolve to a definition in the payload.
fn resolve_subgraph<'a>(
    node: &ExportedNode,
    defs: &SubgraphDefs<'a>,
) -> Result<Option<&'a ExportedSubgraph>> {
    if let Some(definition) = subgraph_type(node, defs) {
        return Ok(Some(definition));
    }
    if Uuid::parse_str(&node.node_type).is_ok() {
        return Err(GraphError::remap(format!(
            "node {} instantiates sub-graph {} which is not in the payload",
            node.id, node.node_type
        )));
    }
    if node.properties.contains_key(PROXY_WIDGETS_KEY) {
        return Err(GraphError::remap(format!(
            "node {} has proxy widgets but no sub-graph definition",
            node.id
        )));
    }
    Ok(None)
}

fn remap_reroute(
    id: Option<RerouteId>,
    map: &HashMap<RerouteId, RerouteId>,
) -> Result<Option<RerouteId>> {
    match id {
        None => Ok(None),
        Some(id) => map
            .get(&id)
            .copied()
            .map(Some)
            .ok_or_else(|| GraphError::remap(format!("reroute {} is not in the payload", id))),
    }
}

/// A sub-graph definition copied under a fresh id
struct RemappedSubgraph {
    id: SubgraphId,
    node_map: HashMap<NodeId, NodeId>,
}

fn map_node(map: &HashMap<NodeId, NodeId>, id: NodeId, what: &str) -> Result<NodeId> {
    if id.is_boundary() {
        return Ok(id);
    }
    map.get(&id).copied().ok_or_else(|| {
        GraphError::remap(format!(
            "{} references interior node {} which is not in the sub-graph",
            what, id
        ))
    })
}

/// Copy a definition with a fresh id and fresh interior node ids
///
/// Nested sub-graph nodes are remapped recursively; every produced
/// definition is appended to `out`.
fn remap_subgraph(
    definition: &ExportedSubgraph,
    defs: &SubgraphDefs<'_>,
    ids: &mut IdAllocator<'_>,
    out: &mut Vec<ExportedSubgraph>,
    stack: &mut Vec<SubgraphId>,
) -> Result<RemappedSubgraph> {
    if stack.contains(&definition.id) {
        return Err(GraphError::remap(format!("sub-graph {} contains itself", definition.id)));
    }
    stack.push(definition.id);

    let mut copy = definition.clone();
    copy.id = Uuid::new_v4();

    let mut node_map = HashMap::new();
    for node in &copy.nodes {
        if node_map.insert(node.id, ids.node_id()).is_some() {
            return Err(GraphError::remap(format!(
                "interior node {} appears twice in sub-graph {}",
                node.id, definition.id
            )));
        }
    }

    for node in copy.nodes.iter_mut() {
        node.id = node_map[&node.id];
        if let Some(nested) = resolve_subgraph(node, defs)? {
            let remapped = remap_subgraph(nested, defs, ids, out, stack)?;
            rewrite_proxy_widgets(node, &remapped.node_map)?;
            node.node_type = remapped.id.to_string();
        }
    }
    for link in copy.links.iter_mut() {
        link.origin_id = map_node(&node_map, link.origin_id, "link")?;
        link.target_id = map_node(&node_map, link.target_id, "link")?;
    }
    for widget in copy.widgets.iter_mut() {
        widget.id = map_node(&node_map, widget.id, "sub-graph widget")?;
    }
    let max_id = node_map.values().map(|id| id.0).max().unwrap_or(0);
    copy.state.last_node_id = copy.state.last_node_id.max(max_id);

    log::debug!(
        "Remapped sub-graph {} -> {} ({} interior nodes)",
        definition.id,
        copy.id,
        node_map.len()
    );
    let remapped = RemappedSubgraph {
        id: copy.id,
        node_map,
    };
    out.push(copy);
    stack.pop();
    Ok(remapped)
}

/// Rewrite a node's `proxyWidgets` through an interior id map
fn rewrite_proxy_widgets(node: &mut ExportedNode, map: &HashMap<NodeId, NodeId>) -> Result<()> {
    let proxies = parse_proxy_widgets(&node.properties)?;
    if proxies.is_empty() {
        return Ok(());
    }
    let rewritten = proxies
        .iter()
        .map(|p| {
            let id = map_node(map, p.node_id, "proxy widget")?;
            Ok(ProxyWidget::new(id, p.widget_name.clone()))
        })
        .collect::<Result<Vec<_>>>()?;
    let pairs: Vec<[String; 2]> = rewritten.iter().map(ProxyWidget::to_pair).collect();
    node.properties
        .insert(PROXY_WIDGETS_KEY.to_string(), serde_json::json!(pairs));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{InputSlot, OutputSlot, Widget};
    use crate::subgraph::Subgraph;

    fn make_node(id: i64) -> Node {
        Node::new("test")
            .with_id(id)
            .with_input(InputSlot::new("in", "IMAGE"))
            .with_output(OutputSlot::new("out", "IMAGE"))
    }

    #[test]
    fn test_copy_only_internal_links() {
        let mut graph = Graph::new();
        for id in 1..=3 {
            graph.add_node(make_node(id));
        }
        graph.connect(NodeId(1), 0, NodeId(2), 0).unwrap();
        graph.connect(NodeId(2), 0, NodeId(3), 0).unwrap();

        let payload = copy_nodes(&graph, &[NodeId(2), NodeId(3)]).unwrap();
        assert_eq!(payload.nodes.len(), 2);
        assert_eq!(payload.links.len(), 1);
        assert_eq!(payload.links[0].origin_id, NodeId(2));
    }

    #[test]
    fn test_paste_assigns_fresh_ids() {
        let mut graph = Graph::new();
        graph.add_node(make_node(1));
        graph.add_node(make_node(2));
        graph.connect(NodeId(1), 0, NodeId(2), 0).unwrap();

        let payload = copy_nodes(&graph, &[NodeId(1), NodeId(2)]).unwrap();
        let result = paste(&mut graph, &payload, Point::new(10.0, 10.0)).unwrap();

        assert_eq!(result.nodes, vec![NodeId(3), NodeId(4)]);
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.link_count(), 2);
        let link = graph.get_link(result.links[0]).unwrap();
        assert_eq!((link.origin_id, link.target_id), (NodeId(3), NodeId(4)));
        assert_eq!(graph.node(NodeId(3)).unwrap().pos, Point::new(10.0, 10.0));
    }

    fn make_subgraph_payload() -> (Graph, ClipboardPayload) {
        let mut subgraph = Subgraph::new("Sampler");
        subgraph
            .graph
            .add_node(make_node(1).with_widget(Widget::new(
                "seed",
                "number",
                serde_json::json!(5),
            )));
        subgraph.graph.connect(NodeId(1), 0, NodeId(1), 0).unwrap();
        let mut node = Node::subgraph(subgraph).with_id(1);
        if let Some(instance) = node.as_subgraph_mut() {
            instance.proxy_widgets.push(ProxyWidget::new(NodeId(1), "seed"));
        }
        let mut source = Graph::new();
        source.add_node(node);
        let payload = copy_nodes(&source, &[NodeId(1)]).unwrap();
        (source, payload)
    }

    #[test]
    fn test_paste_subgraph_remaps_interior_ids() {
        let (_, payload) = make_subgraph_payload();
        let mut dest = Graph::new();
        dest.add_node(make_node(1));

        let result = paste(&mut dest, &payload, Point::default()).unwrap();
        let pasted = dest.node(result.nodes[0]).unwrap();
        let instance = pasted.as_subgraph().unwrap();
        let interior = &instance.subgraph.graph;

        let k = interior.node_ids()[0];
        assert_ne!(k, NodeId(1));
        let link = interior.links().next().unwrap();
        assert_eq!(link.origin_id, k);
        assert_eq!(link.target_id, k);
        assert_eq!(instance.proxy_widgets, vec![ProxyWidget::new(k, "seed")]);
        assert_ne!(instance.subgraph.id(), payload.subgraphs[0].id);
        assert_eq!(pasted.node_type, instance.subgraph.id().to_string());
        assert!(dest.state().last_node_id >= k.0);
    }

    #[test]
    fn test_unresolved_proxy_widget_aborts_paste() {
        let (_, mut payload) = make_subgraph_payload();
        payload.nodes[0]
            .properties
            .insert(
                PROXY_WIDGETS_KEY.to_string(),
                serde_json::json!([["1", "seed"], ["9", "steps"]]),
            );
        let mut dest = Graph::new();
        dest.add_node(make_node(1));
        let before = dest.state();

        let err = paste(&mut dest, &payload, Point::default()).unwrap_err();
        assert!(matches!(err, GraphError::IdentityRemap(_)));
        assert_eq!(dest.node_count(), 1);
        assert_eq!(dest.state(), before);
    }

    #[test]
    fn test_link_leaving_payload_aborts_paste() {
        let mut graph = Graph::new();
        graph.add_node(make_node(1));
        graph.add_node(make_node(2));
        graph.connect(NodeId(1), 0, NodeId(2), 0).unwrap();
        let mut payload = copy_nodes(&graph, &[NodeId(1), NodeId(2)]).unwrap();
        payload.nodes.retain(|n| n.id == NodeId(2));

        assert!(matches!(
            paste(&mut graph, &payload, Point::default()),
            Err(GraphError::IdentityRemap(_))
        ));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_payload_json_roundtrip() {
        let (_, payload) = make_subgraph_payload();
        let json = payload.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for key in ["nodes", "groups", "reroutes", "links", "subgraphs"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(ClipboardPayload::from_json(&json).unwrap(), payload);
    }
}
