//! Links and the visual aids that travel with them (reroutes and groups)

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{GroupId, LinkId, NodeId, Point, Rect, RerouteId, SlotType};

/// A directed edge from an output slot to an input slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub origin_id: NodeId,
    pub origin_slot: usize,
    pub target_id: NodeId,
    pub target_slot: usize,
    #[serde(rename = "type")]
    pub link_type: SlotType,
    /// Last reroute on the link's path, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RerouteId>,
}

impl Link {
    pub fn new(
        id: LinkId,
        origin_id: NodeId,
        origin_slot: usize,
        target_id: NodeId,
        target_slot: usize,
        link_type: SlotType,
    ) -> Self {
        Self {
            id,
            origin_id,
            origin_slot,
            target_id,
            target_slot,
            link_type,
            parent_id: None,
        }
    }

    /// Whether either endpoint is the given node
    pub fn touches(&self, node_id: NodeId) -> bool {
        self.origin_id == node_id || self.target_id == node_id
    }
}

/// A waypoint on a link's visual path; never a connection endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reroute {
    pub id: RerouteId,
    pub pos: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RerouteId>,
    #[serde(default)]
    pub link_ids: BTreeSet<LinkId>,
    #[serde(default, rename = "type")]
    pub slot_type: SlotType,
}

/// A titled rectangle drawn behind nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub title: String,
    pub bounding: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
}

fn default_font_size() -> f64 {
    24.0
}

impl Group {
    pub fn new(title: impl Into<String>, bounding: Rect) -> Self {
        Self {
            id: GroupId(0),
            title: title.into(),
            bounding,
            color: None,
            font_size: default_font_size(),
        }
    }
}
