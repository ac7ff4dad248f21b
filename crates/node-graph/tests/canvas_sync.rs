//! Layout store → renderer projection through an editor session.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use common::RecordingRenderer;
use node_graph::{
    EditorConfig, GraphEditor, LayoutChange, LayoutChangeKind, LayoutSource, LayoutSync,
    NodeTypeDefinition, NodeTypeRegistry, Point, SlotTemplate, ViewportCuller,
};

fn make_editor() -> GraphEditor {
    let mut registry = NodeTypeRegistry::new();
    registry.register(
        NodeTypeDefinition::new("Note", "Note")
            .with_size(100.0, 40.0)
            .with_input(SlotTemplate::new("in", "*")),
    );
    GraphEditor::new(EditorConfig::default(), registry).unwrap()
}

/// Editor with three nodes mirrored into a renderer
fn make_synced() -> (GraphEditor, Rc<RefCell<RecordingRenderer>>, LayoutSync<RecordingRenderer>) {
    let mut editor = make_editor();
    let renderer = Rc::new(RefCell::new(RecordingRenderer::new()));
    for i in 0..3 {
        let id = editor.add_node_at("Note", Point::new(i as f64 * 150.0, 0.0)).unwrap();
        let layout = editor.layout().get(id).unwrap();
        renderer.borrow_mut().add(id, layout.position, layout.size);
    }
    let mut sync = LayoutSync::new(editor.layout(), renderer.clone());
    sync.start();
    (editor, renderer, sync)
}

#[test]
fn test_multi_node_move_redraws_once() {
    let (mut editor, renderer, _sync) = make_synced();
    let ids = editor.graph().node_ids();

    let events = Rc::new(RefCell::new(Vec::<LayoutChange>::new()));
    let sink = events.clone();
    let _sub = editor.layout().subscribe(move |change| sink.borrow_mut().push(change.clone()));

    assert_eq!(editor.move_nodes(&ids, 10.0, 20.0).unwrap(), 3);

    let r = renderer.borrow();
    assert_eq!(r.redraws, 1);
    assert_eq!(r.position_writes, 3);
    assert_eq!(r.size_writes, 0);
    for id in &ids {
        assert_eq!(r.nodes[id].0, editor.graph().node(*id).unwrap().pos);
    }

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, LayoutSource::Drag);
    assert_eq!(events[0].kind, LayoutChangeKind::Update);
    assert_eq!(events[0].node_ids, ids);
}

#[test]
fn test_unchanged_layout_is_not_rewritten() {
    let (editor, renderer, sync) = make_synced();
    let store = editor.layout();
    let id = editor.graph().node_ids()[0];
    let current = store.get(id).unwrap().position;

    assert!(!store.move_node(LayoutSource::External, id, current));
    let report = sync.sync_all();
    assert!(report.updated.is_empty());
    assert_eq!(renderer.borrow().redraws, 0);
}

#[test]
fn test_node_missing_from_renderer_is_picked_up_later() {
    let (mut editor, renderer, sync) = make_synced();
    let id = editor.add_node_at("Note", Point::new(600.0, 0.0)).unwrap();
    assert!(!renderer.borrow().nodes.contains_key(&id));

    // Renderer catches up with a stale rect
    renderer.borrow_mut().add(id, Point::default(), Default::default());
    let report = sync.sync_all();
    assert_eq!(report.updated, vec![id]);
    assert_eq!(renderer.borrow().nodes[&id].0, Point::new(600.0, 0.0));
    assert_eq!(renderer.borrow().redraws, 1);
}

#[test]
fn test_undo_pushes_restored_layout() {
    let (mut editor, renderer, _sync) = make_synced();
    let id = editor.graph().node_ids()[0];
    editor.move_nodes(&[id], 30.0, 0.0).unwrap();
    assert_eq!(renderer.borrow().nodes[&id].0, Point::new(30.0, 0.0));

    editor.undo().unwrap().unwrap();
    assert_eq!(renderer.borrow().nodes[&id].0, Point::new(0.0, 0.0));
    assert_eq!(renderer.borrow().redraws, 2);
}

#[test]
fn test_culling_after_pan() {
    let (_editor, renderer, _sync) = make_synced();
    let mut culler = ViewportCuller::new(50.0, Duration::from_millis(100));
    let start = Instant::now();

    let report = culler.maybe_run(&mut *renderer.borrow_mut(), start).unwrap();
    assert_eq!(report.hidden, 0);

    renderer.borrow_mut().offset = Point::new(-5000.0, 0.0);
    assert!(culler.maybe_run(&mut *renderer.borrow_mut(), start).is_none());
    let report = culler
        .maybe_run(&mut *renderer.borrow_mut(), start + Duration::from_millis(150))
        .unwrap();
    assert_eq!(report.visible, 0);
    assert_eq!(renderer.borrow().hidden.len(), 3);
}
