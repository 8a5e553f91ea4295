use std::path::Path;

use canvas_router::cleanup::clean_view_state;
use canvas_router::handlers::{
    AddEdge, AddNode, DeleteEdge, DeleteNode, MoveNode, Position, SetGeometry, Size,
};
use canvas_router::routing::{Side, world_rect};
use canvas_router::{
    Applied, DomainGraph, EditError, EditIntent, Editor, EditorConfig, Geometry, Obstacle, Point,
    ROOT_ID, RoutingStatus, ViewState, test_edge_collision,
};

fn add(id: &str, parent: &str, x: f32, y: f32) -> EditIntent {
    EditIntent::AddNode(AddNode {
        node_id: Some(id.into()),
        parent_id: Some(parent.into()),
        position: Some(Position {
            x: Some(x),
            y: Some(y),
        }),
        ..AddNode::default()
    })
}

fn add_group(id: &str, parent: &str, x: f32, y: f32) -> EditIntent {
    EditIntent::AddNode(AddNode {
        node_id: Some(id.into()),
        parent_id: Some(parent.into()),
        position: Some(Position {
            x: Some(x),
            y: Some(y),
        }),
        is_group: true,
        ..AddNode::default()
    })
}

fn edge(id: &str, source: &str, target: &str) -> EditIntent {
    EditIntent::AddEdge(AddEdge {
        edge_id: Some(id.into()),
        source: Some(source.into()),
        target: Some(target.into()),
        owner_id: None,
    })
}

fn move_to(id: &str, new_parent: &str, old_parent: &str) -> EditIntent {
    EditIntent::MoveNode(MoveNode {
        node_id: Some(id.into()),
        new_parent_id: Some(new_parent.into()),
        old_parent_id: Some(old_parent.into()),
    })
}

fn delete(id: &str) -> EditIntent {
    EditIntent::DeleteNode(DeleteNode {
        node_id: Some(id.into()),
    })
}

fn drag(id: &str, geometry: Geometry) -> EditIntent {
    EditIntent::SetGeometry(SetGeometry {
        node_id: Some(id.into()),
        geometry,
    })
}

fn run(editor: &mut Editor, intents: impl IntoIterator<Item = EditIntent>) {
    for intent in intents {
        editor.submit(intent);
    }
    let report = editor.drain();
    for outcome in &report.outcomes {
        assert!(outcome.is_ok(), "{outcome:?}");
    }
}

fn assert_live(domain: &DomainGraph, view: &ViewState) {
    for id in domain.node_ids() {
        assert!(view.node.contains_key(&id), "node `{id}` has no geometry");
        if domain.is_group(&id) {
            assert_eq!(view.group.get(&id), view.node.get(&id), "group `{id}` mirror");
        }
    }
    for id in view.node.keys() {
        assert!(domain.contains(id) && id != ROOT_ID, "stale node entry `{id}`");
    }
    for id in view.group.keys() {
        assert!(domain.is_group(id), "stale group entry `{id}`");
    }
    for id in view.edge.keys() {
        assert!(domain.find_edge(id).is_some(), "stale edge entry `{id}`");
    }
    for id in view.layout_mode.keys() {
        assert!(domain.contains(id), "stale layout mode `{id}`");
    }
}

fn world_position(editor: &Editor, id: &str) -> Point {
    world_rect(editor.domain(), editor.view(), id)
        .map(|rect| rect.origin())
        .unwrap_or_else(|| panic!("`{id}` has no world rect"))
}

fn assert_no_collision(editor: &Editor, edge_id: &str) {
    let frame = editor.frame();
    let routed = frame.edge(edge_id).unwrap();
    let obstacles: Vec<Obstacle> = frame
        .nodes
        .iter()
        .map(|node| Obstacle::node(node.id.clone(), Geometry::new(node.x, node.y, node.w, node.h)))
        .filter(|obstacle| obstacle.id != routed.source && obstacle.id != routed.target)
        .collect();
    let n = routed.path.len();
    let report = test_edge_collision(
        routed.path[0],
        routed.path[n - 1],
        &routed.path[1..n - 1],
        &obstacles,
    );
    assert!(!report.collides, "{:?} hits {:?}", routed.path, report.details);
}

#[test]
fn every_reachable_state_stays_live() {
    let mut editor = Editor::default();
    let script = vec![
        add_group("g", ROOT_ID, 400.0, 0.0),
        add("a", "g", 10.0, 40.0),
        add("b", "g", 150.0, 40.0),
        add("c", ROOT_ID, 0.0, 300.0),
        edge("ab", "a", "b"),
        edge("ca", "c", "a"),
        delete("ghost"),
        move_to("b", ROOT_ID, "g"),
        move_to("g", "a", ROOT_ID),
        drag("c", Geometry::new(40.0, 320.0, 96.0, 96.0)),
        drag("c", Geometry::new(40.0, 320.0, 0.0, 96.0)),
        move_to("a", ROOT_ID, "g"),
        add("d", "g", 5.0, 5.0),
        EditIntent::DeleteEdge(DeleteEdge {
            edge_id: Some("ab".into()),
        }),
        delete("c"),
    ];
    for intent in script {
        editor.submit(intent);
        editor.drain();
        assert_live(editor.domain(), editor.view());
        for edge in editor.domain().edges() {
            assert!(editor.view().edge.contains_key(&edge.id), "edge `{}` unrouted", edge.id);
        }
    }
    assert!(!editor.domain().contains("c"));
    assert!(editor.domain().find_edge("ca").is_none());
}

#[test]
fn cleanup_is_idempotent() {
    let mut editor = Editor::default();
    run(
        &mut editor,
        [
            add_group("g", ROOT_ID, 0.0, 0.0),
            add("a", "g", 10.0, 10.0),
            add("b", ROOT_ID, 400.0, 0.0),
            edge("e", "a", "b"),
        ],
    );
    let mut dirty = editor.view().clone();
    dirty.node.insert("ghost".into(), Geometry::new(0.0, 0.0, 1.0, 1.0));
    dirty.group.insert("b".into(), Geometry::new(0.0, 0.0, 1.0, 1.0));
    dirty.edge.insert("gone".into(), Default::default());

    let once = clean_view_state(editor.domain(), &dirty);
    let twice = clean_view_state(editor.domain(), &once);
    assert_eq!(once, twice);
    assert_eq!(&once, editor.view());
}

#[test]
fn delete_cascades_to_incident_edges() {
    let mut editor = Editor::default();
    run(
        &mut editor,
        [
            add_group("g", ROOT_ID, 0.0, 0.0),
            add("inner", "g", 10.0, 10.0),
            add("x", ROOT_ID, 500.0, 0.0),
            add("y", ROOT_ID, 500.0, 300.0),
            edge("into", "x", "inner"),
            edge("out", "inner", "y"),
            edge("keep", "x", "y"),
            delete("g"),
        ],
    );
    let ids: Vec<&str> = editor.domain().edges().into_iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["keep"]);
    assert!(!editor.view().edge.contains_key("into"));
    assert!(!editor.view().edge.contains_key("out"));
    assert!(editor.view().edge.contains_key("keep"));
    assert!(editor.frame().edge("into").is_none());
}

#[test]
fn move_round_trip_restores_world_position() {
    let mut editor = Editor::default();
    run(
        &mut editor,
        [
            add_group("outer", ROOT_ID, 500.0, 500.0),
            add_group("nested", "outer", 30.0, 40.0),
            add("anchor", "nested", 0.0, 0.0),
            add("n", ROOT_ID, 713.5, 652.25),
        ],
    );
    let before = world_position(&editor, "n");

    run(&mut editor, [move_to("n", "nested", ROOT_ID)]);
    assert_eq!(editor.domain().parent_of("n"), Some("nested"));
    assert!(world_position(&editor, "n").approx_eq(before, 1e-3));

    run(&mut editor, [move_to("n", ROOT_ID, "nested")]);
    assert_eq!(editor.domain().parent_of("n"), Some(ROOT_ID));
    let after = world_position(&editor, "n");
    assert!(after.approx_eq(before, 1e-3), "{before:?} -> {after:?}");
}

#[test]
fn moving_into_a_group_rewrites_the_relative_position() {
    let mut editor = Editor::default();
    run(
        &mut editor,
        [
            add_group("group1", ROOT_ID, 500.0, 500.0),
            add("member", "group1", 150.0, 60.0),
            add("n1", ROOT_ID, 520.0, 520.0),
        ],
    );
    let applied = editor.apply(move_to("n1", "group1", ROOT_ID)).unwrap();
    assert_eq!(applied, Applied::Changed);
    let stored = editor.view().node["n1"];
    assert_eq!((stored.x, stored.y), (20.0, 20.0));
    assert_eq!(editor.frame().node("n1").unwrap().x, 520.0);
}

#[test]
fn deleting_a_group_clears_its_members_and_edges() {
    let mut editor = Editor::default();
    run(
        &mut editor,
        [
            add_group("group1", ROOT_ID, 0.0, 0.0),
            add("n1", "group1", 10.0, 40.0),
            add("n2", "group1", 160.0, 40.0),
            edge("e", "n1", "n2"),
        ],
    );
    assert!(editor.view().edge.contains_key("e"));
    assert!(editor.view().group.contains_key("group1"));

    run(&mut editor, [delete("group1")]);
    let view = editor.view();
    for id in ["group1", "n1", "n2"] {
        assert!(!view.node.contains_key(id));
        assert!(!view.group.contains_key(id));
    }
    assert!(!view.edge.contains_key("e"));
    assert!(editor.domain().root().children.iter().all(|c| c.id != "group1"));
    assert!(view.is_empty());
}

#[test]
fn edge_around_a_blocking_node() {
    let mut editor = Editor::default();
    run(
        &mut editor,
        [
            add("n1", ROOT_ID, 100.0, 100.0),
            add("n2", ROOT_ID, 300.0, 100.0),
            add("x", ROOT_ID, 200.0, 100.0),
            edge("e", "n1", "n2"),
        ],
    );
    let routed = &editor.view().edge["e"];
    assert_eq!(routed.routing_status, RoutingStatus::Ok, "{:?}", routed.message);
    assert!(routed.waypoints.len() >= 3, "{:?}", routed.waypoints);
    assert_no_collision(&editor, "e");
}

#[test]
fn edge_threads_between_several_obstacles() {
    let mut editor = Editor::default();
    run(
        &mut editor,
        [
            add("src", ROOT_ID, 0.0, 200.0),
            add("dst", ROOT_ID, 800.0, 220.0),
            add("m1", ROOT_ID, 200.0, 150.0),
            add("m2", ROOT_ID, 380.0, 260.0),
            add("m3", ROOT_ID, 560.0, 120.0),
            edge("e", "src", "dst"),
        ],
    );
    assert_eq!(editor.view().edge["e"].routing_status, RoutingStatus::Ok);
    assert_no_collision(&editor, "e");
    for pair in editor.view().edge["e"].waypoints.windows(2) {
        assert!(pair[0].x == pair[1].x || pair[0].y == pair[1].y);
    }
}

#[test]
fn far_away_node_does_not_break_routing() {
    let mut editor = Editor::default();
    let wall = EditIntent::AddNode(AddNode {
        node_id: Some("wall".into()),
        parent_id: Some(ROOT_ID.into()),
        position: Some(Position {
            x: Some(200.0),
            y: Some(-300.0),
        }),
        size: Some(Size { w: 96.0, h: 700.0 }),
        ..AddNode::default()
    });
    run(
        &mut editor,
        [
            add("a", ROOT_ID, 0.0, 0.0),
            add("b", ROOT_ID, 400.0, 0.0),
            wall,
            add("far", ROOT_ID, 6000.0, 6000.0),
            add("farther", ROOT_ID, -9000.0, 12000.0),
            edge("e", "a", "b"),
        ],
    );
    let routed = &editor.view().edge["e"];
    assert_eq!(routed.routing_status, RoutingStatus::Ok, "{:?}", routed.message);
    assert!(routed.waypoints.len() >= 3, "{:?}", routed.waypoints);
    assert_no_collision(&editor, "e");
}

#[test]
fn fan_out_offsets_are_symmetric() {
    let config = EditorConfig::default();
    let spacing = config.router.port_spacing;
    let mut editor = Editor::new(config);
    run(
        &mut editor,
        [
            add("hub", ROOT_ID, 0.0, 0.0),
            add("t1", ROOT_ID, 400.0, -200.0),
            add("t2", ROOT_ID, 400.0, 0.0),
            add("t3", ROOT_ID, 400.0, 200.0),
            edge("h1", "hub", "t1"),
            edge("h2", "hub", "t2"),
            edge("h3", "hub", "t3"),
        ],
    );
    let ctx = editor.router().context().unwrap();
    let mut offsets: Vec<f32> = ctx
        .arbiter()
        .fan_out("hub", Side::Right)
        .iter()
        .map(|(_, _, assignment)| assignment.offset)
        .collect();
    offsets.sort_by(f32::total_cmp);
    assert_eq!(offsets.len(), 3);
    assert_eq!(offsets[0], -offsets[2]);
    assert_eq!(offsets[1], 0.0);
    for pair in offsets.windows(2) {
        assert!((pair[1] - pair[0] - spacing).abs() < 1e-4, "{offsets:?}");
    }

    let mut starts: Vec<f32> = ["h1", "h2", "h3"]
        .iter()
        .map(|id| editor.view().edge[*id].waypoints[0].y)
        .collect();
    starts.sort_by(f32::total_cmp);
    starts.dedup();
    assert_eq!(starts.len(), 3);
}

#[test]
fn dragging_keeps_routes_valid() {
    let mut editor = Editor::default();
    run(
        &mut editor,
        [
            add("a", ROOT_ID, 0.0, 0.0),
            add("b", ROOT_ID, 500.0, 0.0),
            add("wall", ROOT_ID, 250.0, -50.0),
            edge("e", "a", "b"),
        ],
    );
    for step in 0..12 {
        let y = -150.0 + step as f32 * 25.0;
        run(&mut editor, [drag("a", Geometry::new(0.0, y, 96.0, 96.0))]);
        let routed = &editor.view().edge["e"];
        assert_eq!(routed.routing_status, RoutingStatus::Ok, "step {step}: {:?}", routed.message);
        assert_no_collision(&editor, "e");
    }
}

#[test]
fn rejected_edits_leave_state_untouched() {
    let mut editor = Editor::default();
    run(&mut editor, [add("a", ROOT_ID, 0.0, 0.0)]);
    let before = editor.snapshot();

    let missing = EditIntent::AddNode(AddNode {
        node_id: Some("b".into()),
        position: None,
        size: Some(Size { w: 10.0, h: 10.0 }),
        ..AddNode::default()
    });
    assert_eq!(
        editor.apply(missing).unwrap_err(),
        EditError::MissingPosition { node_id: "b".into() }
    );
    assert!(matches!(
        editor.apply(delete(ROOT_ID)).unwrap_err(),
        EditError::RootImmutable
    ));
    assert!(matches!(
        editor.apply(move_to("a", "nowhere", ROOT_ID)).unwrap_err(),
        EditError::UnknownNode(_)
    ));
    assert_eq!(editor.snapshot(), before);
}

#[test]
fn replays_scene_fixtures() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("scenes");
    // Keep this list explicit so new scenes must be added intentionally.
    let fixtures = ["blocked_line.json", "nested_groups.json", "fan_out.json"];
    for name in fixtures {
        let path = root.join(name);
        let raw = std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("fixture missing: {name}"));
        let scene: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let intents: Vec<EditIntent> = serde_json::from_value(scene["intents"].clone()).unwrap();

        let mut editor = Editor::default();
        for intent in intents {
            editor.submit(intent);
        }
        let report = editor.drain();
        for outcome in &report.outcomes {
            assert!(outcome.is_ok(), "{name}: {outcome:?}");
        }
        assert_live(editor.domain(), editor.view());
        let frame = editor.frame();
        assert_eq!(frame.edges.len(), editor.domain().edges().len(), "{name}");
        for routed in &frame.edges {
            assert!(routed.path.len() >= 2, "{name}: {}", routed.id);
        }
    }
}
