//! Core identifier, geometry and slot-type definitions
//!
//! Identifiers are scoped to a single graph. Anything that has to address a
//! node across nesting levels uses a [`NodeLocator`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Identifier of a graph (root or sub-graph)
pub type GraphId = Uuid;

/// Identifier of a sub-graph definition
pub type SubgraphId = Uuid;

/// Identifier of a node, unique within its owning graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub i64);

/// Reserved node id of a sub-graph's boundary input node
pub const SUBGRAPH_INPUT_ID: NodeId = NodeId(-10);

/// Reserved node id of a sub-graph's boundary output node
pub const SUBGRAPH_OUTPUT_ID: NodeId = NodeId(-20);

impl NodeId {
    /// Whether this id refers to a sub-graph boundary node
    pub fn is_boundary(self) -> bool {
        self == SUBGRAPH_INPUT_ID || self == SUBGRAPH_OUTPUT_ID
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<i32> for NodeId {
    fn from(value: i32) -> Self {
        Self(i64::from(value))
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(NodeId)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(v) => Ok(NodeId(v)),
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A node lookup key: either a typed id or a string that coerces to one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKey<'a> {
    Id(NodeId),
    Str(&'a str),
}

impl NodeKey<'_> {
    /// Normalize the key into a node id, if it is coercible
    pub fn to_id(self) -> Option<NodeId> {
        match self {
            NodeKey::Id(id) => Some(id),
            NodeKey::Str(s) => s.parse().ok(),
        }
    }
}

impl From<NodeId> for NodeKey<'_> {
    fn from(id: NodeId) -> Self {
        NodeKey::Id(id)
    }
}

impl From<i64> for NodeKey<'_> {
    fn from(id: i64) -> Self {
        NodeKey::Id(NodeId(id))
    }
}

impl From<i32> for NodeKey<'_> {
    fn from(id: i32) -> Self {
        NodeKey::Id(NodeId::from(id))
    }
}

impl<'a> From<&'a str> for NodeKey<'a> {
    fn from(s: &'a str) -> Self {
        NodeKey::Str(s)
    }
}

impl<'a> From<&'a String> for NodeKey<'a> {
    fn from(s: &'a String) -> Self {
        NodeKey::Str(s.as_str())
    }
}

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

counter_id!(
    /// Identifier of a link, unique within its owning graph
    LinkId
);
counter_id!(
    /// Identifier of a visual group
    GroupId
);
counter_id!(
    /// Identifier of a reroute waypoint
    RerouteId
);

/// Qualified address of a node across nesting levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLocator {
    /// The graph that owns the node
    pub graph_id: GraphId,
    /// The node id inside that graph
    pub node_id: NodeId,
}

impl NodeLocator {
    pub fn new(graph_id: GraphId, node_id: NodeId) -> Self {
        Self { graph_id, node_id }
    }
}

impl fmt::Display for NodeLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.graph_id, self.node_id)
    }
}

/// A point in canvas space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance_sq(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// A width/height pair
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl From<[f64; 2]> for Size {
    fn from([width, height]: [f64; 2]) -> Self {
        Self { width, height }
    }
}

impl From<Size> for [f64; 2] {
    fn from(s: Size) -> Self {
        [s.width, s.height]
    }
}

/// An axis-aligned rectangle, persisted as `[x, y, width, height]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_pos_size(pos: Point, size: Size) -> Self {
        Self::new(pos.x, pos.y, size.width, size.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Overlap test; touching edges do not count as overlap
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Grow the rectangle by `margin` on every side
    pub fn inflate(&self, margin: f64) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + margin * 2.0,
            self.height + margin * 2.0,
        )
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }
}

impl From<[f64; 4]> for Rect {
    fn from([x, y, width, height]: [f64; 4]) -> Self {
        Self { x, y, width, height }
    }
}

impl From<Rect> for [f64; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

/// The type tag of a slot
///
/// Persisted as `"*"` for [`SlotType::Any`], a string for named types
/// (optionally a comma-separated union such as `"IMAGE,MASK"`), or a number
/// for numeric codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SlotType {
    /// Accepts any type
    #[default]
    Any,
    /// Named type or comma-separated union of names
    Named(String),
    /// Numeric type code
    Code(i64),
}

impl SlotType {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() || name == "*" {
            SlotType::Any
        } else {
            SlotType::Named(name)
        }
    }

    /// Check whether a value of this type can flow into `other`
    ///
    /// The relation is symmetric: names compare case-insensitively and two
    /// unions are compatible when they share at least one member.
    pub fn is_compatible_with(&self, other: &SlotType) -> bool {
        match (self, other) {
            (SlotType::Any, _) | (_, SlotType::Any) => true,
            (SlotType::Code(a), SlotType::Code(b)) => a == b,
            (SlotType::Named(a), SlotType::Named(b)) => {
                if a.eq_ignore_ascii_case(b) {
                    return true;
                }
                a.split(',').map(str::trim).any(|left| {
                    b.split(',')
                        .map(str::trim)
                        .any(|right| !left.is_empty() && left.eq_ignore_ascii_case(right))
                })
            }
            _ => false,
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Any => write!(f, "*"),
            SlotType::Named(name) => write!(f, "{}", name),
            SlotType::Code(code) => write!(f, "{}", code),
        }
    }
}

impl From<&str> for SlotType {
    fn from(s: &str) -> Self {
        SlotType::named(s)
    }
}

impl Serialize for SlotType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SlotType::Any => serializer.serialize_str("*"),
            SlotType::Named(name) => serializer.serialize_str(name),
            SlotType::Code(code) => serializer.serialize_i64(*code),
        }
    }
}

impl<'de> Deserialize<'de> for SlotType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(0) => SlotType::Any,
            Raw::Code(code) => SlotType::Code(code),
            Raw::Name(name) => SlotType::named(name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_type_compatibility() {
        let image = SlotType::named("IMAGE");
        let mask = SlotType::named("MASK");
        assert!(image.is_compatible_with(&SlotType::named("image")));
        assert!(SlotType::Any.is_compatible_with(&mask));
        assert!(mask.is_compatible_with(&SlotType::Any));
        assert!(!image.is_compatible_with(&mask));
        assert!(SlotType::named("IMAGE,MASK").is_compatible_with(&mask));
        assert!(mask.is_compatible_with(&SlotType::named("IMAGE, MASK")));
        assert!(!SlotType::Code(1).is_compatible_with(&SlotType::named("1")));
    }

    #[test]
    fn test_slot_type_is_symmetric() {
        let types = [
            SlotType::Any,
            SlotType::named("INT"),
            SlotType::named("FLOAT,INT"),
            SlotType::Code(3),
            SlotType::Code(4),
        ];
        for a in &types {
            for b in &types {
                assert_eq!(a.is_compatible_with(b), b.is_compatible_with(a), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_slot_type_serde() {
        let types = vec![SlotType::Any, SlotType::named("IMAGE"), SlotType::Code(7)];
        let json = serde_json::to_string(&types).unwrap();
        assert_eq!(json, r#"["*","IMAGE",7]"#);
        let back: Vec<SlotType> = serde_json::from_str(r#"["", 0, "LATENT"]"#).unwrap();
        assert_eq!(back, vec![SlotType::Any, SlotType::Any, SlotType::named("LATENT")]);
    }

    #[test]
    fn test_node_id_accepts_numeric_strings() {
        let ids: Vec<NodeId> = serde_json::from_str(r#"[3, "12"]"#).unwrap();
        assert_eq!(ids, vec![NodeId(3), NodeId(12)]);
        assert_eq!(NodeKey::from("7").to_id(), Some(NodeId(7)));
        assert_eq!(NodeKey::from("seven").to_id(), None);
    }

    #[test]
    fn test_rect_geometry() {
        let r = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert!(r.contains(Point::new(100.0, 50.0)));
        assert!(!r.intersects(&Rect::new(100.0, 0.0, 10.0, 10.0)));
        assert!(r.inflate(10.0).intersects(&Rect::new(105.0, 0.0, 10.0, 10.0)));
        assert_eq!(r.center(), Point::new(50.0, 25.0));
        assert_eq!(
            r.union(&Rect::new(-10.0, 10.0, 20.0, 60.0)),
            Rect::new(-10.0, 0.0, 110.0, 70.0)
        );
    }
}
