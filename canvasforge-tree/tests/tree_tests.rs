use canvasforge_tree::geometry::{handle_placement, resize, rotation_handle_placement};
use canvasforge_tree::{
    parse_snapshot, parse_snapshot_yaml, ComponentNode, ComponentTree, Direction, GenerationPayload,
    NodeId, NodePatch, Point, Rect, TreeError, TreeStore, Value, ValueMap, MAX_NESTING_DEPTH,
    MAX_VALUE_DEPTH,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::fs;
use std::path::PathBuf;

fn get_fixture_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("fixtures");
    path.push(filename);
    path
}

fn read_fixture(filename: &str) -> String {
    fs::read_to_string(get_fixture_path(filename)).unwrap()
}

// Fixture snapshots
#[test]
fn test_landing_page_fixture() {
    let tree = parse_snapshot(&read_fixture("landing-page.json")).unwrap();
    assert_eq!(tree.roots().len(), 2);
    assert_eq!(tree.len(), 4);
    let badge = tree.get(&"badge".into()).unwrap();
    assert_eq!(badge.rotation, 12.5);
    assert!(badge.code().unwrap().contains("h('span'"));
    assert_eq!(tree.parent_of(&"cta".into()), Some(&NodeId::from("hero")));
}

#[test]
fn test_gallery_yaml_fixture() {
    let tree = parse_snapshot_yaml(&read_fixture("gallery.yaml")).unwrap();
    assert_eq!(tree.len(), 3);
    let photo = tree.get(&"photo-2".into()).unwrap();
    assert_eq!(photo.position.x, 200.0);
    assert_eq!(photo.props["src"], Value::from("/assets/two.png"));
}

#[test]
fn test_invalid_duplicate_id_fixture() {
    let result = parse_snapshot(&read_fixture("invalid-duplicate-id.json"));
    assert_eq!(result.unwrap_err(), TreeError::DuplicateId { id: "card".into() });
}

#[test]
fn test_invalid_negative_size_fixture() {
    let result = parse_snapshot(&read_fixture("invalid-negative-size.json"));
    assert!(matches!(result.unwrap_err(), TreeError::InvalidGeometry { .. }));
}

#[test]
fn test_invalid_rotation_fixture() {
    let result = parse_snapshot_yaml(&read_fixture("invalid-rotation.yaml"));
    assert!(matches!(result.unwrap_err(), TreeError::InvalidGeometry { .. }));
}

#[test]
fn test_malformed_json() {
    let result = parse_snapshot("[{\"id\": \"a\"");
    assert!(matches!(result.unwrap_err(), TreeError::Serialization(_)));
}

// Serialization
#[test]
fn test_serialize_round_trip() {
    let tree = parse_snapshot(&read_fixture("landing-page.json")).unwrap();
    let json = tree.serialize().unwrap();
    let again = ComponentTree::deserialize(&json).unwrap();
    assert_eq!(again, tree);
    assert_eq!(again.serialize().unwrap(), json);
}

#[test]
fn test_snapshot_is_isolated_from_later_edits() {
    let mut store = TreeStore::new();
    store
        .insert(None, None, ComponentNode::new("card", "container").with_size(100.0, 50.0))
        .unwrap();
    let snapshot = store.snapshot();

    store
        .update(&"card".into(), &NodePatch::size(300.0, 200.0))
        .unwrap();
    store.remove(&"card".into()).unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].size.width, 100.0);
    assert!(store.tree().is_empty());
}

// Editing through the store
#[test]
fn test_update_missing_id_is_not_found() {
    let mut store = TreeStore::new();
    let err = store
        .update(&"ghost".into(), &NodePatch::position(1.0, 2.0))
        .unwrap_err();
    assert_eq!(err, TreeError::NotFound { id: "ghost".into() });
}

#[test]
fn test_update_is_shallow_merge() {
    let mut store = TreeStore::new();
    store
        .insert(
            None,
            None,
            ComponentNode::new("btn", "button")
                .with_prop("label", "Old")
                .with_style("color", "red")
                .with_position(5.0, 5.0),
        )
        .unwrap();

    let mut props = ValueMap::new();
    props.insert("label".into(), Value::from("New"));
    store.update(&"btn".into(), &NodePatch::props(props)).unwrap();

    let btn = store.get(&"btn".into()).unwrap();
    assert_eq!(btn.props["label"], Value::from("New"));
    assert_eq!(btn.styles["color"], Value::from("red"));
    assert_eq!(btn.position.x, 5.0);
}

#[test]
fn test_reparent_into_own_child_is_rejected() {
    let mut tree = parse_snapshot(&read_fixture("landing-page.json")).unwrap();
    let before = tree.clone();
    let err = tree
        .reparent(&"hero".into(), Some(&"cta".into()), None)
        .unwrap_err();
    assert!(matches!(err, TreeError::CycleDetected { .. }));
    assert_eq!(tree, before);
}

#[test]
fn test_reparent_moves_subtree() {
    let mut tree = parse_snapshot(&read_fixture("landing-page.json")).unwrap();
    tree.reparent(&"badge".into(), Some(&"hero".into()), Some(0))
        .unwrap();
    assert_eq!(tree.roots().len(), 1);
    assert_eq!(tree.roots()[0].children[0].id.as_str(), "badge");
    assert_eq!(tree.depth_of(&"badge".into()), Some(1));
}

#[test]
fn test_ingest_generation_then_undo() {
    let mut store = TreeStore::with_tree(
        parse_snapshot(&read_fixture("landing-page.json")).unwrap(),
        100,
    );
    let payload: GenerationPayload = serde_json::from_str(
        r#"{
            "components": [{"id": "cta", "type": "button", "props": {"label": "Buy"}}],
            "layout": {"cta": {"x": 10, "y": 10, "width": 120, "height": 32}}
        }"#,
    )
    .unwrap();

    let ids = store.ingest(payload, Some(&"hero".into())).unwrap();
    assert_eq!(ids.len(), 1);
    // "cta" is already in the document, so the generated node gets a fresh id.
    assert_ne!(ids[0].as_str(), "cta");
    let added = store.get(&ids[0]).unwrap();
    assert_eq!(added.size.width, 120.0);
    assert_eq!(store.tree().parent_of(&ids[0]), Some(&NodeId::from("hero")));

    assert!(store.undo());
    assert!(store.get(&ids[0]).is_none());
    assert_eq!(store.tree().len(), 4);
}

#[test]
fn test_undo_is_bounded() {
    let tree = ComponentTree::from_roots(vec![ComponentNode::new("a", "text")]).unwrap();
    let mut store = TreeStore::with_tree(tree, 3);
    for _ in 0..5 {
        store.move_by(&"a".into(), Point::new(1.0, 0.0)).unwrap();
    }
    let mut steps = 0;
    while store.undo() {
        steps += 1;
    }
    assert_eq!(steps, 3);
    assert_eq!(store.get(&"a".into()).unwrap().position.x, 2.0);
}

// Handle geometry
#[test]
fn test_handle_css() {
    assert_eq!(
        handle_placement(Direction::SE).css(),
        "bottom:-4px;right:-4px;cursor:se-resize"
    );
    assert_eq!(
        handle_placement(Direction::N).css(),
        "top:-4px;left:50%;transform:translateX(-50%);cursor:n-resize"
    );
    assert!(rotation_handle_placement().css().ends_with("cursor:grab"));
}

#[test]
fn test_unknown_direction() {
    let err = "up".parse::<Direction>().unwrap_err();
    assert_eq!(err, TreeError::UnknownDirection("up".into()));
}

/// Alternating map/list nesting `depth` containers deep.
fn nested_value(depth: usize) -> Value {
    let mut value = Value::from(0.5);
    for i in 0..depth {
        value = if i % 2 == 0 {
            Value::List(vec![value, Value::from("x")])
        } else {
            let mut map = ValueMap::new();
            map.insert(format!("k{i}"), value);
            Value::Map(map)
        };
    }
    value
}

/// A single chain of `depth` components; the innermost carries `leaf_prop`.
fn chain(depth: usize, leaf_prop: Value) -> ComponentNode {
    let mut node = ComponentNode::new(format!("n{}", depth - 1), "text").with_prop("render", leaf_prop);
    for i in (0..depth - 1).rev() {
        node = ComponentNode::new(format!("n{i}"), "container").with_child(node);
    }
    node
}

// Nesting limits
#[test]
fn test_deepest_document_round_trips() {
    let tree =
        ComponentTree::from_roots(vec![chain(MAX_NESTING_DEPTH, nested_value(MAX_VALUE_DEPTH))])
            .unwrap();
    let json = tree.serialize().unwrap();
    assert_eq!(ComponentTree::deserialize(&json).unwrap(), tree);

    // Wrapped the way the version history stores it.
    let blob = format!(
        r#"[{{"id":"00000000-0000-4000-8000-000000000000","timestamp":"2026-01-01T00:00:00Z","name":"deep","components":{}}}]"#,
        json
    );
    let reparsed: Vec<serde_json::Value> = serde_json::from_str(&blob).unwrap();
    assert_eq!(reparsed.len(), 1);
}

#[test]
fn test_document_past_depth_limit_rejected() {
    let err = ComponentTree::from_roots(vec![chain(MAX_NESTING_DEPTH + 1, Value::Null)]).unwrap_err();
    assert_eq!(
        err,
        TreeError::MaxNestingDepthExceeded {
            max_depth: MAX_NESTING_DEPTH
        }
    );
}

#[test]
fn test_values_that_cannot_round_trip_are_rejected() {
    let err = ComponentTree::from_roots(vec![chain(1, Value::Number(f64::INFINITY))]).unwrap_err();
    assert!(matches!(err, TreeError::InvalidValue { .. }));

    let mut tree = ComponentTree::from_roots(vec![ComponentNode::new("a", "text")]).unwrap();
    let before = tree.clone();
    let mut props = ValueMap::new();
    props.insert("render".into(), Value::Number(f64::NAN));
    let err = tree.update(&"a".into(), &NodePatch::props(props)).unwrap_err();
    assert!(matches!(err, TreeError::InvalidValue { .. }));

    let mut styles = ValueMap::new();
    styles.insert("shadow".into(), nested_value(MAX_VALUE_DEPTH + 1));
    let err = tree.update(&"a".into(), &NodePatch::styles(styles)).unwrap_err();
    assert!(matches!(err, TreeError::InvalidValue { .. }));
    assert_eq!(tree, before);
}

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000_000i64..1_000_000).prop_map(Value::from),
        "[a-z#0-9 ]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(8, 48, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

fn arb_props() -> impl Strategy<Value = ValueMap> {
    prop::collection::btree_map("[a-z]{1,8}", arb_value(), 0..3)
}

fn arb_node() -> impl Strategy<Value = ComponentNode> {
    let leaf = (arb_props(), arb_props()).prop_map(|(props, styles)| {
        let mut node = ComponentNode::new("leaf", "text");
        node.props = props;
        node.styles = styles;
        node
    });
    leaf.prop_recursive(MAX_NESTING_DEPTH as u32 - 1, 64, 3, |inner| {
        (prop::collection::vec(inner, 0..3), arb_props()).prop_map(|(children, props)| {
            let mut node = ComponentNode::new("branch", "container");
            node.props = props;
            node.children = children;
            node
        })
    })
}

/// Give every node a unique id in pre-order.
fn renumber(node: &mut ComponentNode, next: &mut usize) {
    node.id = NodeId::from(format!("node-{}", next));
    *next += 1;
    for child in &mut node.children {
        renumber(child, next);
    }
}

proptest! {
    #[test]
    fn prop_resize_never_inverts(
        w in 0.0f64..1000.0,
        h in 0.0f64..1000.0,
        dx in -5000.0f64..5000.0,
        dy in -5000.0f64..5000.0,
        dir in prop::sample::select(Direction::ALL.to_vec()),
    ) {
        let rect = Rect::new(10.0, 20.0, w, h);
        let out = resize(&rect, dir, Point::new(dx, dy));
        prop_assert!(out.width >= 0.0);
        prop_assert!(out.height >= 0.0);
        if !dir.has_east() && !dir.has_west() {
            prop_assert_eq!(out.width, rect.width);
            prop_assert_eq!(out.x, rect.x);
        }
        if !dir.has_north() && !dir.has_south() {
            prop_assert_eq!(out.height, rect.height);
            prop_assert_eq!(out.y, rect.y);
        }
    }

    #[test]
    fn prop_snapshot_round_trips(
        x in -10_000i32..10_000,
        y in -10_000i32..10_000,
        w in 0u32..4096,
        h in 0u32..4096,
        quarter_turns in 0u32..1440,
        label in "[a-zA-Z0-9 ]{0,16}",
        children in 0usize..6,
    ) {
        let mut root = ComponentNode::new("root", "container")
            .with_position(x as f64, y as f64)
            .with_size(w as f64, h as f64)
            .with_rotation(quarter_turns as f64 / 4.0)
            .with_prop("label", label.as_str());
        for i in 0..children {
            root = root.with_child(ComponentNode::new(format!("child-{i}"), "text").with_prop("index", i as i64));
        }
        let tree = ComponentTree::from_roots(vec![root]).unwrap();
        let json = tree.serialize().unwrap();
        prop_assert_eq!(ComponentTree::deserialize(&json).unwrap(), tree);
    }

    #[test]
    fn prop_nested_forest_round_trips(roots in prop::collection::vec(arb_node(), 1..4)) {
        let mut roots = roots;
        let mut next = 0;
        for root in &mut roots {
            renumber(root, &mut next);
        }
        let tree = ComponentTree::from_roots(roots).unwrap();
        let json = tree.serialize().unwrap();
        prop_assert_eq!(ComponentTree::deserialize(&json).unwrap(), tree);
    }

    #[test]
    fn prop_deep_chain_round_trips(depth in 1usize..=MAX_NESTING_DEPTH, value in arb_value()) {
        let tree = ComponentTree::from_roots(vec![chain(depth, value)]).unwrap();
        let json = tree.serialize().unwrap();
        prop_assert_eq!(ComponentTree::deserialize(&json).unwrap(), tree);
    }
}
