//! Canvas synchronization
//!
//! One-way projection of the [`LayoutStore`] into an imperative canvas
//! renderer, plus the per-frame jobs that keep the renderer honest:
//!
//! - [`LayoutSync`]: pushes layout changes, one redraw per batch
//! - [`ViewportCuller`]: throttled visibility toggling
//! - [`TransformSync`]: pull + diff of the renderer's offset and scale
//! - [`FrameLoop`]: host-driven per-frame task list
//!
//! The renderer is shared as `Rc<RefCell<R>>`. A node present in the store
//! but absent from the renderer is skipped for that pass.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::EditorConfig;
use crate::events::{LayoutChange, LayoutChangeKind};
use crate::layout::{LayoutStore, LayoutSubscription};
use crate::types::{NodeId, Point, Rect, Size};

/// The imperative canvas the layout store is projected into
pub trait CanvasRenderer {
    /// Whether the renderer currently has a counterpart for this node
    fn has_node(&self, id: NodeId) -> bool;

    fn node_position(&self, id: NodeId) -> Option<Point>;

    fn node_size(&self, id: NodeId) -> Option<Size>;

    fn set_node_position(&mut self, id: NodeId, position: Point);

    fn set_node_size(&mut self, id: NodeId, size: Size);

    fn request_redraw(&mut self);

    /// Canvas translation, in canvas units
    fn offset(&self) -> Point;

    fn scale(&self) -> f64;

    /// Visible area in screen pixels
    fn viewport_size(&self) -> Size;

    /// Ids of every rendered node element
    fn rendered_node_ids(&self) -> Vec<NodeId>;

    /// Canvas-space bounds of a rendered node element
    fn element_bounds(&self, id: NodeId) -> Option<Rect>;

    fn set_node_visible(&mut self, id: NodeId, visible: bool);
}

/// What one sync pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: Vec<NodeId>,
    pub skipped: Vec<NodeId>,
    pub redrawn: bool,
}

/// Copy layouts of `ids` into the renderer, writing only differing values
///
/// Requests at most one redraw, and only when something was written.
pub fn push_layouts<R: CanvasRenderer + ?Sized>(
    store: &LayoutStore,
    renderer: &mut R,
    ids: &[NodeId],
) -> SyncReport {
    let mut report = SyncReport::default();

    for &id in ids {
        let Some(layout) = store.get(id) else {
            continue;
        };
        if !renderer.has_node(id) {
            report.skipped.push(id);
            continue;
        }

        let mut changed = false;
        if renderer.node_position(id) != Some(layout.position) {
            renderer.set_node_position(id, layout.position);
            changed = true;
        }
        if renderer.node_size(id) != Some(layout.size) {
            renderer.set_node_size(id, layout.size);
            changed = true;
        }
        if changed {
            report.updated.push(id);
        }
    }

    if !report.skipped.is_empty() {
        log::debug!("Layout sync skipped {} nodes missing from renderer", report.skipped.len());
    }
    if !report.updated.is_empty() {
        renderer.request_redraw();
        report.redrawn = true;
    }
    report
}

/// Subscribes to a [`LayoutStore`] and pushes each change into a renderer
///
/// Changes that arrive while the renderer is borrowed elsewhere are kept as
/// pending and pushed with the next change or [`LayoutSync::sync_all`].
pub struct LayoutSync<R: CanvasRenderer + 'static> {
    store: LayoutStore,
    renderer: Rc<RefCell<R>>,
    pending: Rc<RefCell<BTreeSet<NodeId>>>,
    subscription: Option<LayoutSubscription>,
}

impl<R: CanvasRenderer + 'static> LayoutSync<R> {
    pub fn new(store: LayoutStore, renderer: Rc<RefCell<R>>) -> Self {
        Self {
            store,
            renderer,
            pending: Rc::new(RefCell::new(BTreeSet::new())),
            subscription: None,
        }
    }

    /// Start listening; a second call is a no-op
    pub fn start(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        let store = self.store.clone();
        let renderer = self.renderer.clone();
        let pending = self.pending.clone();
        self.subscription = Some(self.store.subscribe(move |change| {
            Self::apply(&store, &renderer, &pending, change);
        }));
        log::debug!("Layout sync started");
    }

    /// Stop listening and release the renderer callback
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            log::debug!("Layout sync stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.subscription.is_some()
    }

    /// Nodes whose changes have not reached the renderer yet
    pub fn pending(&self) -> Vec<NodeId> {
        self.pending.borrow().iter().copied().collect()
    }

    /// Push every node in the store, e.g. after the renderer caught up
    pub fn sync_all(&self) -> SyncReport {
        let ids = self.store.node_ids();
        match self.renderer.try_borrow_mut() {
            Ok(mut renderer) => {
                self.pending.borrow_mut().clear();
                push_layouts(&self.store, &mut *renderer, &ids)
            }
            Err(_) => {
                log::debug!("Renderer busy; deferring full sync of {} nodes", ids.len());
                self.pending.borrow_mut().extend(ids);
                SyncReport::default()
            }
        }
    }

    fn apply(
        store: &LayoutStore,
        renderer: &Rc<RefCell<R>>,
        pending: &RefCell<BTreeSet<NodeId>>,
        change: &LayoutChange,
    ) {
        let mut pending = pending.borrow_mut();
        if change.kind != LayoutChangeKind::Delete {
            pending.extend(change.node_ids.iter().copied());
        }
        if pending.is_empty() {
            return;
        }
        let Ok(mut renderer) = renderer.try_borrow_mut() else {
            log::debug!("Renderer busy; deferring layout of {} nodes", pending.len());
            return;
        };
        let ids: Vec<NodeId> = std::mem::take(&mut *pending).into_iter().collect();
        push_layouts(store, &mut *renderer, &ids);
    }
}

impl<R: CanvasRenderer + 'static> Drop for LayoutSync<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Result of one culling pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CullReport {
    pub visible: usize,
    pub hidden: usize,
}

/// Throttled viewport culling
///
/// Every pass recomputes visibility from scratch; no per-node state is kept.
#[derive(Debug, Clone)]
pub struct ViewportCuller {
    margin_px: f64,
    interval: Duration,
    last_run: Option<Instant>,
}

impl ViewportCuller {
    pub fn new(margin_px: f64, interval: Duration) -> Self {
        Self {
            margin_px,
            interval,
            last_run: None,
        }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.cull_margin_px, config.cull_throttle())
    }

    /// Screen-space box of a canvas-space rect
    pub fn screen_bounds(bounds: Rect, offset: Point, scale: f64) -> Rect {
        Rect::new(
            (bounds.x + offset.x) * scale,
            (bounds.y + offset.y) * scale,
            bounds.width * scale,
            bounds.height * scale,
        )
    }

    /// Run a pass unless the previous one was less than an interval ago
    pub fn maybe_run<R: CanvasRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        now: Instant,
    ) -> Option<CullReport> {
        if let Some(last) = self.last_run {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_run = Some(now);
        Some(self.run(renderer))
    }

    /// Unthrottled pass
    pub fn run<R: CanvasRenderer + ?Sized>(&self, renderer: &mut R) -> CullReport {
        let offset = renderer.offset();
        let scale = renderer.scale();
        let viewport =
            Rect::from_pos_size(Point::default(), renderer.viewport_size()).inflate(self.margin_px);

        let mut report = CullReport::default();
        for id in renderer.rendered_node_ids() {
            let Some(bounds) = renderer.element_bounds(id) else {
                continue;
            };
            let visible = Self::screen_bounds(bounds, offset, scale).intersects(&viewport);
            renderer.set_node_visible(id, visible);
            if visible {
                report.visible += 1;
            } else {
                report.hidden += 1;
            }
        }
        report
    }
}

/// Offset and scale of the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasTransform {
    pub offset: Point,
    pub scale: f64,
}

/// Pull + diff of the renderer transform
#[derive(Debug, Clone, Default)]
pub struct TransformSync {
    last: Option<CanvasTransform>,
}

impl TransformSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the renderer's transform; `Some` only when it changed
    pub fn pull<R: CanvasRenderer + ?Sized>(&mut self, renderer: &R) -> Option<CanvasTransform> {
        let current = CanvasTransform {
            offset: renderer.offset(),
            scale: renderer.scale(),
        };
        if self.last == Some(current) {
            return None;
        }
        self.last = Some(current);
        Some(current)
    }

    pub fn last(&self) -> Option<CanvasTransform> {
        self.last
    }
}

/// Handle returned by [`FrameLoop::request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

type FrameTask = Box<dyn FnMut(Instant)>;

/// Per-frame tasks driven by the host's animation-frame callback
///
/// Tasks run every frame until cancelled. Skipped frames are harmless.
#[derive(Default)]
pub struct FrameLoop {
    tasks: Vec<(FrameHandle, FrameTask)>,
    next_handle: u64,
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop").field("tasks", &self.tasks.len()).finish()
    }
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, task: impl FnMut(Instant) + 'static) -> FrameHandle {
        let handle = FrameHandle(self.next_handle);
        self.next_handle += 1;
        self.tasks.push((handle, Box::new(task)));
        handle
    }

    /// Returns false if the handle was already cancelled
    pub fn cancel(&mut self, handle: FrameHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|(h, _)| *h != handle);
        self.tasks.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Run every task once; returns how many ran
    pub fn run_frame(&mut self, now: Instant) -> usize {
        for (_, task) in self.tasks.iter_mut() {
            task(now);
        }
        self.tasks.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use crate::events::LayoutSource;
    use crate::layout::NodeLayout;

    /// In-memory renderer recording writes and redraws
    #[derive(Debug, Default)]
    pub(crate) struct MockRenderer {
        pub nodes: BTreeMap<NodeId, (Point, Size)>,
        pub hidden: BTreeSet<NodeId>,
        pub redraws: usize,
        pub writes: usize,
        pub offset: Point,
        pub scale: f64,
        pub viewport: Size,
    }

    impl MockRenderer {
        pub(crate) fn new() -> Self {
            Self {
                scale: 1.0,
                viewport: Size::new(800.0, 600.0),
                ..Self::default()
            }
        }

        pub(crate) fn with_node(mut self, id: i64, pos: Point, size: Size) -> Self {
            self.nodes.insert(NodeId(id), (pos, size));
            self
        }
    }

    impl CanvasRenderer for MockRenderer {
        fn has_node(&self, id: NodeId) -> bool {
            self.nodes.contains_key(&id)
        }

        fn node_position(&self, id: NodeId) -> Option<Point> {
            self.nodes.get(&id).map(|(p, _)| *p)
        }

        fn node_size(&self, id: NodeId) -> Option<Size> {
            self.nodes.get(&id).map(|(_, s)| *s)
        }

        fn set_node_position(&mut self, id: NodeId, position: Point) {
            if let Some(entry) = self.nodes.get_mut(&id) {
                entry.0 = position;
                self.writes += 1;
            }
        }

        fn set_node_size(&mut self, id: NodeId, size: Size) {
            if let Some(entry) = self.nodes.get_mut(&id) {
                entry.1 = size;
                self.writes += 1;
            }
        }

        fn request_redraw(&mut self) {
            self.redraws += 1;
        }

        fn offset(&self) -> Point {
            self.offset
        }

        fn scale(&self) -> f64 {
            self.scale
        }

        fn viewport_size(&self) -> Size {
            self.viewport
        }

        fn rendered_node_ids(&self) -> Vec<NodeId> {
            self.nodes.keys().copied().collect()
        }

        fn element_bounds(&self, id: NodeId) -> Option<Rect> {
            self.nodes.get(&id).map(|(p, s)| Rect::from_pos_size(*p, *s))
        }

        fn set_node_visible(&mut self, id: NodeId, visible: bool) {
            if visible {
                self.hidden.remove(&id);
            } else {
                self.hidden.insert(id);
            }
        }
    }

    fn make_store(ids: &[i64]) -> LayoutStore {
        let store = LayoutStore::new();
        store.transaction(LayoutSource::External, |tx| {
            for &id in ids {
                let layout = NodeLayout::new(Point::default(), Size::new(100.0, 50.0));
                tx.set_layout(NodeId(id), layout);
            }
        });
        store
    }

    #[test]
    fn test_push_layouts_writes_only_differences() {
        let store = make_store(&[1, 2]);
        let mut renderer = MockRenderer::new()
            .with_node(1, Point::default(), Size::new(100.0, 50.0))
            .with_node(2, Point::new(5.0, 5.0), Size::new(100.0, 50.0));

        let report = push_layouts(&store, &mut renderer, &[NodeId(1), NodeId(2)]);
        assert_eq!(report.updated, vec![NodeId(2)]);
        assert_eq!(renderer.writes, 1);
        assert_eq!(renderer.redraws, 1);

        let report = push_layouts(&store, &mut renderer, &[NodeId(1), NodeId(2)]);
        assert!(report.updated.is_empty());
        assert!(!report.redrawn);
        assert_eq!(renderer.redraws, 1);
    }

    #[test]
    fn test_sync_skips_missing_renderer_nodes() {
        let store = make_store(&[1, 2]);
        let renderer = Rc::new(RefCell::new(
            MockRenderer::new().with_node(1, Point::default(), Size::default()),
        ));
        let mut sync = LayoutSync::new(store.clone(), renderer.clone());
        sync.start();

        store.transaction(LayoutSource::Drag, |tx| {
            tx.move_by(NodeId(1), 10.0, 0.0);
            tx.move_by(NodeId(2), 10.0, 0.0);
        });

        let r = renderer.borrow();
        assert_eq!(r.nodes[&NodeId(1)].0, Point::new(10.0, 0.0));
        assert!(!r.nodes.contains_key(&NodeId(2)));
        assert_eq!(r.redraws, 1);
    }

    #[test]
    fn test_stop_releases_renderer() {
        let store = make_store(&[1]);
        let renderer = Rc::new(RefCell::new(
            MockRenderer::new().with_node(1, Point::default(), Size::default()),
        ));
        let mut sync = LayoutSync::new(store.clone(), renderer.clone());
        sync.start();
        sync.start();
        assert_eq!(store.listener_count(), 1);
        assert_eq!(Rc::strong_count(&renderer), 3);

        sync.stop();
        assert!(!sync.is_running());
        assert_eq!(store.listener_count(), 0);
        assert_eq!(Rc::strong_count(&renderer), 2);

        store.move_node(LayoutSource::External, NodeId(1), Point::new(1.0, 1.0));
        assert_eq!(renderer.borrow().redraws, 0);

        let report = sync.sync_all();
        assert_eq!(report.updated, vec![NodeId(1)]);
    }

    #[test]
    fn test_busy_renderer_defers_batch() {
        let store = make_store(&[1, 2]);
        let renderer = Rc::new(RefCell::new(
            MockRenderer::new()
                .with_node(1, Point::default(), Size::new(100.0, 50.0))
                .with_node(2, Point::default(), Size::new(100.0, 50.0)),
        ));
        let mut sync = LayoutSync::new(store.clone(), renderer.clone());
        sync.start();

        {
            let held = renderer.borrow();
            store.move_node(LayoutSource::Drag, NodeId(1), Point::new(30.0, 0.0));
            assert_eq!(held.nodes[&NodeId(1)].0, Point::default());
        }
        assert_eq!(sync.pending(), vec![NodeId(1)]);

        store.move_node(LayoutSource::Drag, NodeId(2), Point::new(0.0, 30.0));
        assert!(sync.pending().is_empty());
        let r = renderer.borrow();
        assert_eq!(r.nodes[&NodeId(1)].0, Point::new(30.0, 0.0));
        assert_eq!(r.nodes[&NodeId(2)].0, Point::new(0.0, 30.0));
        assert_eq!(r.redraws, 1);
    }

    #[test]
    fn test_sync_all_flushes_deferred_nodes() {
        let store = make_store(&[1]);
        let renderer = Rc::new(RefCell::new(
            MockRenderer::new().with_node(1, Point::default(), Size::new(100.0, 50.0)),
        ));
        let mut sync = LayoutSync::new(store.clone(), renderer.clone());
        sync.start();

        {
            let _held = renderer.borrow_mut();
            store.move_node(LayoutSource::Drag, NodeId(1), Point::new(7.0, 7.0));
            assert_eq!(sync.sync_all(), SyncReport::default());
        }
        assert_eq!(sync.pending(), vec![NodeId(1)]);

        let report = sync.sync_all();
        assert_eq!(report.updated, vec![NodeId(1)]);
        assert!(sync.pending().is_empty());
        assert_eq!(renderer.borrow().nodes[&NodeId(1)].0, Point::new(7.0, 7.0));
    }

    #[test]
    fn test_culler_uses_offset_scale_and_margin() {
        let mut renderer = MockRenderer::new()
            .with_node(1, Point::new(100.0, 100.0), Size::new(50.0, 50.0))
            .with_node(2, Point::new(900.0, 100.0), Size::new(50.0, 50.0))
            .with_node(3, Point::new(2000.0, 100.0), Size::new(50.0, 50.0));

        let culler = ViewportCuller::new(200.0, Duration::from_millis(100));
        let report = culler.run(&mut renderer);
        assert_eq!(report, CullReport { visible: 2, hidden: 1 });
        assert!(renderer.hidden.contains(&NodeId(3)));

        // Pan left by 1500 canvas units: only node 3 lands in view
        renderer.offset = Point::new(-1500.0, 0.0);
        culler.run(&mut renderer);
        assert_eq!(renderer.hidden, [NodeId(1), NodeId(2)].into_iter().collect());

        // Zoom out so everything fits
        renderer.offset = Point::default();
        renderer.scale = 0.25;
        let report = culler.run(&mut renderer);
        assert_eq!(report.hidden, 0);
        assert!(renderer.hidden.is_empty());
    }

    #[test]
    fn test_culler_throttle() {
        let mut renderer =
            MockRenderer::new().with_node(1, Point::default(), Size::new(10.0, 10.0));
        let mut culler = ViewportCuller::new(0.0, Duration::from_millis(100));
        let start = Instant::now();

        assert!(culler.maybe_run(&mut renderer, start).is_some());
        assert!(culler.maybe_run(&mut renderer, start + Duration::from_millis(50)).is_none());
        assert!(culler.maybe_run(&mut renderer, start + Duration::from_millis(100)).is_some());
    }

    #[test]
    fn test_transform_sync_reports_changes_only() {
        let mut renderer = MockRenderer::new();
        let mut sync = TransformSync::new();

        assert!(sync.pull(&renderer).is_some());
        assert!(sync.pull(&renderer).is_none());

        renderer.scale = 2.0;
        let transform = sync.pull(&renderer).unwrap();
        assert_eq!(transform.scale, 2.0);
        assert_eq!(sync.last(), Some(transform));
    }

    #[test]
    fn test_frame_loop_cancel() {
        let counter = Rc::new(RefCell::new(0));
        let mut frames = FrameLoop::new();
        let c = counter.clone();
        let handle = frames.request(move |_| *c.borrow_mut() += 1);

        let now = Instant::now();
        assert_eq!(frames.run_frame(now), 1);
        assert_eq!(frames.run_frame(now), 1);
        assert!(frames.cancel(handle));
        assert!(!frames.cancel(handle));
        assert_eq!(frames.run_frame(now), 0);
        assert_eq!(*counter.borrow(), 2);
    }
}
