//! Identity-stable views over a sub-graph node's promoted widgets
//!
//! A reactive UI diffs the returned list by reference. The reconciler keeps
//! handles stable across reorders so that only positions change, and hands
//! back the previous output untouched when the input list itself is
//! unchanged.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::node::ProxyWidget;

/// Default view handle for a promoted widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedWidgetView {
    pub node_id: String,
    pub widget_name: String,
}

impl PromotedWidgetView {
    pub fn from_entry(entry: &ProxyWidget) -> Self {
        Self {
            node_id: entry.node_id.to_string(),
            widget_name: entry.widget_name.clone(),
        }
    }
}

/// Reconciles ordered `(interior node, widget)` entries into view handles
///
/// - the same `Rc` input returns the same `Rc` output
/// - a reordered input keeps every handle, only positions move
/// - duplicate entries collapse to their first occurrence
/// - entries missing from a call are evicted; coming back builds a new handle
pub struct PromotedWidgetReconciler<V> {
    last_input: Option<Rc<Vec<ProxyWidget>>>,
    last_output: Rc<Vec<Rc<V>>>,
    cache: HashMap<ProxyWidget, Rc<V>>,
}

impl<V> Default for PromotedWidgetReconciler<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PromotedWidgetReconciler<V> {
    pub fn new() -> Self {
        Self {
            last_input: None,
            last_output: Rc::new(Vec::new()),
            cache: HashMap::new(),
        }
    }

    /// Produce the view list for `entries`, building missing handles with
    /// `make`
    pub fn reconcile(
        &mut self,
        entries: &Rc<Vec<ProxyWidget>>,
        mut make: impl FnMut(&ProxyWidget) -> V,
    ) -> Rc<Vec<Rc<V>>> {
        if let Some(last) = &self.last_input {
            if Rc::ptr_eq(last, entries) {
                return Rc::clone(&self.last_output);
            }
        }

        let mut seen: HashSet<&ProxyWidget> = HashSet::new();
        let mut views = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            if !seen.insert(entry) {
                continue;
            }
            let view = self
                .cache
                .entry(entry.clone())
                .or_insert_with(|| Rc::new(make(entry)));
            views.push(Rc::clone(view));
        }
        self.cache.retain(|key, _| seen.contains(key));

        self.last_input = Some(Rc::clone(entries));
        self.last_output = Rc::new(views);
        Rc::clone(&self.last_output)
    }

    /// Number of cached handles
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn entry(node: i64, widget: &str) -> ProxyWidget {
        ProxyWidget::new(NodeId(node), widget)
    }

    fn reconcile(
        reconciler: &mut PromotedWidgetReconciler<PromotedWidgetView>,
        entries: &Rc<Vec<ProxyWidget>>,
    ) -> Rc<Vec<Rc<PromotedWidgetView>>> {
        reconciler.reconcile(entries, PromotedWidgetView::from_entry)
    }

    #[test]
    fn test_same_input_returns_same_output() {
        let mut reconciler = PromotedWidgetReconciler::new();
        let input = Rc::new(vec![entry(1, "seed"), entry(2, "steps")]);
        let first = reconcile(&mut reconciler, &input);
        let second = reconcile(&mut reconciler, &input);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_reorder_preserves_handles() {
        let mut reconciler = PromotedWidgetReconciler::new();
        let first = reconcile(&mut reconciler, &Rc::new(vec![entry(1, "a"), entry(2, "b")]));
        let second = reconcile(&mut reconciler, &Rc::new(vec![entry(2, "b"), entry(1, "a")]));

        assert!(Rc::ptr_eq(&first[0], &second[1]));
        assert!(Rc::ptr_eq(&first[1], &second[0]));
    }

    #[test]
    fn test_duplicates_collapse_to_first() {
        let mut reconciler = PromotedWidgetReconciler::new();
        let views = reconcile(
            &mut reconciler,
            &Rc::new(vec![entry(1, "a"), entry(2, "b"), entry(1, "a")]),
        );
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].widget_name, "a");
        assert_eq!(views[1].widget_name, "b");
    }

    #[test]
    fn test_evicted_entries_get_new_handles() {
        let mut reconciler = PromotedWidgetReconciler::new();
        let first = reconcile(&mut reconciler, &Rc::new(vec![entry(1, "a"), entry(2, "b")]));
        let second = reconcile(&mut reconciler, &Rc::new(vec![entry(2, "b")]));
        assert_eq!(reconciler.cached(), 1);
        let third = reconcile(&mut reconciler, &Rc::new(vec![entry(2, "b"), entry(1, "a")]));

        assert!(Rc::ptr_eq(&first[1], &second[0]));
        assert!(Rc::ptr_eq(&second[0], &third[0]));
        assert!(!Rc::ptr_eq(&first[0], &third[1]));
        assert_eq!(*first[0], *third[1]);
    }

    #[test]
    fn test_same_widget_name_on_different_nodes_is_distinct() {
        let mut reconciler = PromotedWidgetReconciler::new();
        let views = reconcile(&mut reconciler, &Rc::new(vec![entry(1, "seed"), entry(2, "seed")]));
        assert_eq!(views.len(), 2);
        assert!(!Rc::ptr_eq(&views[0], &views[1]));
    }
}
