//! Reactive layout store
//!
//! Holds the authoritative position and size of every node. The renderer's
//! own coordinates are a projection of this store, pushed by
//! [`LayoutSync`](crate::canvas_sync::LayoutSync).
//!
//! The store is a cheap handle (`Rc` inside); clones share state. Listeners
//! run after the store borrow is released, so they may read the store.
//!
//! ```ignore
//! let store = LayoutStore::new();
//! let _sub = store.subscribe(|change| println!("{:?}", change.node_ids));
//!
//! // One notification for the whole move
//! store.transaction(LayoutSource::Drag, |tx| {
//!     tx.move_by(NodeId(1), 10.0, 0.0);
//!     tx.move_by(NodeId(2), 10.0, 0.0);
//! });
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::events::{LayoutChange, LayoutChangeKind, LayoutSource};
use crate::graph::Graph;
use crate::types::{NodeId, Point, Rect, Size};

/// Position and size of one node
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeLayout {
    pub position: Point,
    pub size: Size,
}

impl NodeLayout {
    pub fn new(position: Point, size: Size) -> Self {
        Self { position, size }
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_pos_size(self.position, self.size)
    }
}

type Listener = Rc<dyn Fn(&LayoutChange)>;

struct StoreInner {
    layouts: RefCell<BTreeMap<NodeId, NodeLayout>>,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_listener: Cell<u64>,
}

/// Shared node id → layout map with change notifications
#[derive(Clone)]
pub struct LayoutStore {
    inner: Rc<StoreInner>,
}

impl std::fmt::Debug for LayoutStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutStore")
            .field("nodes", &self.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Default for LayoutStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutStore {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StoreInner {
                layouts: RefCell::new(BTreeMap::new()),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<NodeLayout> {
        self.inner.layouts.borrow().get(&id).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.layouts.borrow().contains_key(&id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.layouts.borrow().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.layouts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.layouts.borrow().is_empty()
    }

    /// Register a listener; it stays registered while the guard lives
    pub fn subscribe(&self, listener: impl Fn(&LayoutChange) + 'static) -> LayoutSubscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        let listener: Listener = Rc::new(listener);
        self.inner.listeners.borrow_mut().push((id, listener));
        LayoutSubscription {
            store: Some(Rc::downgrade(&self.inner)),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Insert or replace a node's layout
    pub fn set_layout(&self, source: LayoutSource, id: NodeId, layout: NodeLayout) {
        self.transaction(source, |tx| tx.set_layout(id, layout));
    }

    /// Move a node; returns false for unknown nodes or an unchanged position
    pub fn move_node(&self, source: LayoutSource, id: NodeId, position: Point) -> bool {
        self.transaction(source, |tx| tx.move_node(id, position))
    }

    pub fn resize_node(&self, source: LayoutSource, id: NodeId, size: Size) -> bool {
        self.transaction(source, |tx| tx.resize_node(id, size))
    }

    pub fn remove_node(&self, source: LayoutSource, id: NodeId) -> Option<NodeLayout> {
        self.transaction(source, |tx| tx.remove_node(id))
    }

    /// Run several mutations, then notify once with every touched node
    ///
    /// No notification is sent when nothing changed. The closure must not
    /// call back into this store.
    pub fn transaction<R>(
        &self,
        source: LayoutSource,
        f: impl FnOnce(&mut LayoutTransaction<'_>) -> R,
    ) -> R {
        let (result, change) = {
            let mut layouts = self.inner.layouts.borrow_mut();
            let mut tx = LayoutTransaction {
                layouts: &mut *layouts,
                touched: Vec::new(),
                kind: None,
            };
            let result = f(&mut tx);
            let change = tx.kind.map(|kind| LayoutChange::new(source, kind, tx.touched));
            (result, change)
        };

        if let Some(change) = change {
            self.notify(&change);
        }
        result
    }

    /// Mirror a graph's node positions and sizes, dropping stale entries
    pub fn sync_from_graph(&self, source: LayoutSource, graph: &Graph) {
        self.transaction(source, |tx| {
            let stale: Vec<NodeId> = tx
                .layouts
                .keys()
                .copied()
                .filter(|id| !graph.contains_node(*id))
                .collect();
            for id in stale {
                tx.remove_node(id);
            }
            for node in graph.nodes() {
                tx.set_layout(node.id, NodeLayout::new(node.pos, node.size));
            }
        });
    }

    fn notify(&self, change: &LayoutChange) {
        // Listeners may subscribe or unsubscribe while running
        let listeners: Vec<Listener> =
            self.inner.listeners.borrow().iter().map(|(_, l)| l.clone()).collect();
        log::trace!(
            "Layout change {:?}/{:?} for {} nodes to {} listeners",
            change.source,
            change.kind,
            change.node_ids.len(),
            listeners.len()
        );
        for listener in listeners {
            listener(change);
        }
    }
}

/// Mutable view of the store inside [`LayoutStore::transaction`]
pub struct LayoutTransaction<'a> {
    layouts: &'a mut BTreeMap<NodeId, NodeLayout>,
    touched: Vec<NodeId>,
    kind: Option<LayoutChangeKind>,
}

impl LayoutTransaction<'_> {
    pub fn get(&self, id: NodeId) -> Option<NodeLayout> {
        self.layouts.get(&id).copied()
    }

    pub fn set_layout(&mut self, id: NodeId, layout: NodeLayout) {
        match self.layouts.insert(id, layout) {
            None => self.touch(id, LayoutChangeKind::Create),
            Some(previous) if previous != layout => self.touch(id, LayoutChangeKind::Update),
            Some(_) => {}
        }
    }

    pub fn move_node(&mut self, id: NodeId, position: Point) -> bool {
        let Some(layout) = self.layouts.get_mut(&id) else {
            return false;
        };
        if layout.position == position {
            return false;
        }
        layout.position = position;
        self.touch(id, LayoutChangeKind::Update);
        true
    }

    pub fn move_by(&mut self, id: NodeId, dx: f64, dy: f64) -> bool {
        match self.get(id) {
            Some(layout) => self.move_node(id, layout.position.offset(dx, dy)),
            None => false,
        }
    }

    pub fn resize_node(&mut self, id: NodeId, size: Size) -> bool {
        let Some(layout) = self.layouts.get_mut(&id) else {
            return false;
        };
        if layout.size == size {
            return false;
        }
        layout.size = size;
        self.touch(id, LayoutChangeKind::Update);
        true
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<NodeLayout> {
        let removed = self.layouts.remove(&id);
        if removed.is_some() {
            self.touch(id, LayoutChangeKind::Delete);
        }
        removed
    }

    fn touch(&mut self, id: NodeId, kind: LayoutChangeKind) {
        if !self.touched.contains(&id) {
            self.touched.push(id);
        }
        self.kind = Some(LayoutChange::merge_kind(self.kind, kind));
    }
}

/// Keeps a listener registered; unsubscribes on [`unsubscribe`](Self::unsubscribe) or drop
pub struct LayoutSubscription {
    store: Option<Weak<StoreInner>>,
    id: u64,
}

impl LayoutSubscription {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    pub fn is_active(&self) -> bool {
        self.store
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|inner| inner.listeners.borrow().iter().any(|(id, _)| *id == self.id))
    }

    fn detach(&mut self) {
        if let Some(inner) = self.store.take().and_then(|weak| weak.upgrade()) {
            inner.listeners.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for LayoutSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for LayoutSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutSubscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn make_store() -> LayoutStore {
        let store = LayoutStore::new();
        for i in 1..=3 {
            store.set_layout(
                LayoutSource::External,
                NodeId(i),
                NodeLayout::new(Point::new(i as f64 * 100.0, 0.0), Size::new(50.0, 50.0)),
            );
        }
        store
    }

    fn record(store: &LayoutStore) -> (Rc<RefCell<Vec<LayoutChange>>>, LayoutSubscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = store.subscribe(move |change| sink.borrow_mut().push(change.clone()));
        (seen, sub)
    }

    #[test]
    fn test_single_mutation_notifies_immediately() {
        let store = make_store();
        let (seen, _sub) = record(&store);

        assert!(store.move_node(LayoutSource::Drag, NodeId(1), Point::new(5.0, 5.0)));
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(
            seen.borrow()[0],
            LayoutChange::new(LayoutSource::Drag, LayoutChangeKind::Update, vec![NodeId(1)])
        );

        // Unchanged position and unknown node are silent
        assert!(!store.move_node(LayoutSource::Drag, NodeId(1), Point::new(5.0, 5.0)));
        assert!(!store.move_node(LayoutSource::Drag, NodeId(99), Point::new(5.0, 5.0)));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_transaction_coalesces() {
        let store = make_store();
        let (seen, _sub) = record(&store);

        store.transaction(LayoutSource::Drag, |tx| {
            for i in 1..=3 {
                tx.move_by(NodeId(i), 10.0, 0.0);
            }
            tx.move_by(NodeId(1), 10.0, 0.0);
        });

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, LayoutChangeKind::Update);
        assert_eq!(seen[0].node_ids, vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(store.get(NodeId(1)).unwrap().position, Point::new(120.0, 0.0));
    }

    #[test]
    fn test_mixed_transaction_is_batch() {
        let store = make_store();
        let (seen, _sub) = record(&store);

        store.transaction(LayoutSource::External, |tx| {
            tx.remove_node(NodeId(2));
            tx.resize_node(NodeId(3), Size::new(80.0, 80.0));
        });

        assert_eq!(seen.borrow()[0].kind, LayoutChangeKind::Batch);
        assert!(!store.contains(NodeId(2)));
    }

    #[test]
    fn test_subscription_guard() {
        let store = make_store();
        let (seen, sub) = record(&store);
        assert!(sub.is_active());
        assert_eq!(store.listener_count(), 1);

        sub.unsubscribe();
        assert_eq!(store.listener_count(), 0);
        store.move_node(LayoutSource::Drag, NodeId(1), Point::new(1.0, 1.0));
        assert!(seen.borrow().is_empty());

        {
            let _scoped = store.subscribe(|_| {});
            assert_eq!(store.listener_count(), 1);
        }
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_listener_can_read_store() {
        let store = make_store();
        let reader = store.clone();
        let positions = Rc::new(RefCell::new(Vec::new()));
        let sink = positions.clone();
        let _sub = store.subscribe(move |change| {
            for id in &change.node_ids {
                sink.borrow_mut().push(reader.get(*id).map(|l| l.position));
            }
        });

        store.move_node(LayoutSource::External, NodeId(2), Point::new(7.0, 8.0));
        assert_eq!(*positions.borrow(), vec![Some(Point::new(7.0, 8.0))]);
    }

    #[test]
    fn test_sync_from_graph() {
        let store = make_store();
        let mut graph = Graph::new();
        graph.add_node(Node::new("a").with_id(1).at(1.0, 2.0).with_size(10.0, 10.0));
        graph.add_node(Node::new("b").with_id(4));

        store.sync_from_graph(LayoutSource::External, &graph);
        assert_eq!(store.node_ids(), vec![NodeId(1), NodeId(4)]);
        assert_eq!(
            store.get(NodeId(1)),
            Some(NodeLayout::new(Point::new(1.0, 2.0), Size::new(10.0, 10.0)))
        );
    }
}
