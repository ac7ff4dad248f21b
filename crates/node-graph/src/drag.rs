//! Drag-to-connect state machine
//!
//! Pointer gestures become links here. A drag goes
//! `Idle → Dragging → (hovering candidates)* → committed | cancelled → Idle`.
//! The graph is only read while dragging and only written on commit.
//!
//! # Example
//!
//! ```ignore
//! let mut drag = LinkDragController::new(SlotMetrics::default());
//! drag.pointer_down(&graph, 1, Point::new(100.0, 40.0));
//! drag.pointer_move(&graph, 1, Point::new(300.0, 40.0));
//! let outcome = drag.pointer_up(&mut graph, 1, Point::new(300.0, 40.0));
//! assert!(matches!(outcome, DragOutcome::Committed { .. }));
//! ```

use crate::connection::{is_connection_compatible, SlotDragSource, SlotDropCandidate};
use crate::graph::Graph;
use crate::hit_test::{find_slot_at, SlotMetrics};
use crate::types::{LinkId, NodeId, Point};

/// Pointer device id
pub type PointerId = u32;

/// An existing link picked up by its input end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegrabbedLink {
    pub link_id: LinkId,
    /// The input the link was attached to when the drag started
    pub node_id: NodeId,
    pub slot: usize,
}

/// The slot under the pointer and whether a drop there would connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoverCandidate {
    pub candidate: SlotDropCandidate,
    pub compatible: bool,
}

/// An in-progress drag
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDrag {
    /// Pointer holding the capture
    pub pointer_id: Option<PointerId>,
    /// Effective source; a re-grabbed link continues from its origin output
    pub source: SlotDragSource,
    pub regrabbed: Option<RegrabbedLink>,
    pub pointer: Point,
    pub hover: Option<HoverCandidate>,
}

/// State of a [`LinkDragController`]
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(ActiveDrag),
}

/// How a drag ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    /// A new link was created
    Committed { link_id: LinkId },
    /// A re-grabbed link now ends on another input
    Retargeted { link_id: LinkId },
    /// The drag ended without touching the graph
    Cancelled,
    /// The event did not belong to an active drag
    Ignored,
}

/// Turns pointer events into validated links
#[derive(Debug, Clone)]
pub struct LinkDragController {
    state: DragState,
    metrics: SlotMetrics,
    replace_input_links: bool,
}

impl LinkDragController {
    pub fn new(metrics: SlotMetrics) -> Self {
        Self {
            state: DragState::Idle,
            metrics,
            replace_input_links: true,
        }
    }

    /// Whether a drop on an already connected input replaces its link
    pub fn with_replace_input_links(mut self, replace: bool) -> Self {
        self.replace_input_links = replace;
        self
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn active(&self) -> Option<&ActiveDrag> {
        match &self.state {
            DragState::Dragging(drag) => Some(drag),
            DragState::Idle => None,
        }
    }

    /// Start a drag if the pointer went down on a slot
    ///
    /// Ignored while another drag holds the capture. Returns whether a drag
    /// started.
    pub fn pointer_down(&mut self, graph: &Graph, pointer_id: PointerId, pos: Point) -> bool {
        if self.is_dragging() {
            log::debug!("Ignoring pointer {} down: a drag is already active", pointer_id);
            return false;
        }
        let Some(hit) = find_slot_at(graph, pos, &self.metrics) else {
            return false;
        };
        self.start(graph, Some(pointer_id), SlotDragSource::from(hit), pos)
    }

    /// Start a drag from an explicit source, without pointer capture
    pub fn begin(&mut self, graph: &Graph, source: SlotDragSource, pos: Point) -> bool {
        if self.is_dragging() {
            return false;
        }
        self.start(graph, None, source, pos)
    }

    fn start(
        &mut self,
        graph: &Graph,
        pointer_id: Option<PointerId>,
        source: SlotDragSource,
        pos: Point,
    ) -> bool {
        let (source, regrabbed) = match source {
            SlotDragSource::Input { node_id, slot } => match graph
                .input_link(node_id, slot)
                .and_then(|id| graph.get_link(id))
            {
                Some(link) => (
                    SlotDragSource::Output {
                        node_id: link.origin_id,
                        slot: link.origin_slot,
                    },
                    Some(RegrabbedLink {
                        link_id: link.id,
                        node_id,
                        slot,
                    }),
                ),
                None => (source, None),
            },
            SlotDragSource::Output { .. } => (source, None),
        };
        if graph.node(source.node_id()).is_none() {
            return false;
        }
        log::debug!(
            "Drag started from {:?} (regrabbed {:?})",
            source,
            regrabbed.map(|r| r.link_id)
        );
        self.state = DragState::Dragging(ActiveDrag {
            pointer_id,
            source,
            regrabbed,
            pointer: pos,
            hover: None,
        });
        true
    }

    /// Track the pointer and re-evaluate the candidate under it
    pub fn pointer_move(
        &mut self,
        graph: &Graph,
        pointer_id: PointerId,
        pos: Point,
    ) -> Option<HoverCandidate> {
        if !self.owns(pointer_id) {
            return None;
        }
        let candidate = find_slot_at(graph, pos, &self.metrics).map(SlotDropCandidate::from);
        self.hover(graph, candidate, pos)
    }

    /// Set the candidate directly; `None` means empty canvas
    pub fn hover(
        &mut self,
        graph: &Graph,
        candidate: Option<SlotDropCandidate>,
        pos: Point,
    ) -> Option<HoverCandidate> {
        let hover = {
            let DragState::Dragging(drag) = &self.state else {
                return None;
            };
            candidate.map(|candidate| HoverCandidate {
                candidate,
                compatible: self.evaluate(graph, drag, &candidate),
            })
        };
        if let DragState::Dragging(drag) = &mut self.state {
            drag.pointer = pos;
            drag.hover = hover;
        }
        hover
    }

    /// End the drag at `pos`, committing if it is over a compatible slot
    pub fn pointer_up(
        &mut self,
        graph: &mut Graph,
        pointer_id: PointerId,
        pos: Point,
    ) -> DragOutcome {
        if !self.owns(pointer_id) {
            return DragOutcome::Ignored;
        }
        let candidate = find_slot_at(graph, pos, &self.metrics).map(SlotDropCandidate::from);
        self.release(graph, candidate)
    }

    /// End the drag over an explicit candidate
    pub fn release(
        &mut self,
        graph: &mut Graph,
        candidate: Option<SlotDropCandidate>,
    ) -> DragOutcome {
        let DragState::Dragging(drag) = std::mem::take(&mut self.state) else {
            return DragOutcome::Ignored;
        };
        let Some(candidate) = candidate else {
            log::debug!("Drag from {:?} dropped on empty canvas", drag.source);
            return DragOutcome::Cancelled;
        };
        // resolution happens again here; the graph may have changed mid-drag
        if !self.evaluate(graph, &drag, &candidate) {
            log::debug!("Drag from {:?} dropped on incompatible {:?}", drag.source, candidate);
            return DragOutcome::Cancelled;
        }
        self.commit(graph, &drag, candidate)
    }

    /// Abort the active drag (escape key, lost capture)
    pub fn cancel(&mut self) -> DragOutcome {
        match std::mem::take(&mut self.state) {
            DragState::Dragging(_) => DragOutcome::Cancelled,
            DragState::Idle => DragOutcome::Ignored,
        }
    }

    fn owns(&self, pointer_id: PointerId) -> bool {
        match &self.state {
            DragState::Dragging(drag) => drag.pointer_id.is_none_or(|id| id == pointer_id),
            DragState::Idle => false,
        }
    }

    fn evaluate(&self, graph: &Graph, drag: &ActiveDrag, candidate: &SlotDropCandidate) -> bool {
        if !is_connection_compatible(graph, &drag.source, candidate) {
            return false;
        }
        if self.replace_input_links {
            return true;
        }
        match candidate {
            SlotDropCandidate::Input { node_id, slot } => match graph.input_link(*node_id, *slot) {
                Some(existing) => drag.regrabbed.is_some_and(|r| r.link_id == existing),
                None => true,
            },
            SlotDropCandidate::Output { .. } => match drag.source {
                SlotDragSource::Input { node_id, slot } => {
                    graph.input_link(node_id, slot).is_none()
                }
                SlotDragSource::Output { .. } => true,
            },
        }
    }

    fn commit(
        &self,
        graph: &mut Graph,
        drag: &ActiveDrag,
        candidate: SlotDropCandidate,
    ) -> DragOutcome {
        let result = match (drag.source, candidate) {
            (
                SlotDragSource::Output { node_id, slot },
                SlotDropCandidate::Input {
                    node_id: target,
                    slot: target_slot,
                },
            ) => {
                match drag.regrabbed {
                    Some(regrabbed)
                        if regrabbed.node_id == target && regrabbed.slot == target_slot =>
                    {
                        return DragOutcome::Cancelled;
                    }
                    Some(regrabbed) => graph
                        .retarget_link(regrabbed.link_id, target, target_slot)
                        .map(|_| DragOutcome::Retargeted {
                            link_id: regrabbed.link_id,
                        }),
                    None => graph
                        .connect(node_id, slot, target, target_slot)
                        .map(|link_id| DragOutcome::Committed { link_id }),
                }
            }
            (
                SlotDragSource::Input { node_id, slot },
                SlotDropCandidate::Output {
                    node_id: origin,
                    slot: origin_slot,
                },
            ) => graph
                .connect(origin, origin_slot, node_id, slot)
                .map(|link_id| DragOutcome::Committed { link_id }),
            _ => return DragOutcome::Cancelled,
        };
        match result {
            Ok(outcome) => {
                log::debug!("Drag committed: {:?}", outcome);
                outcome
            }
            Err(e) => {
                log::warn!("Drag commit failed: {}", e);
                DragOutcome::Cancelled
            }
        }
    }
}

impl Default for LinkDragController {
    fn default() -> Self {
        Self::new(SlotMetrics::default())
    }
}
