//! End-to-end sweep: load a performance, process it, realize the template,
//! wire a graph, and check the keys written onto the realized duplicates.

use cadenza::engine::{EngineContext, OpStatus};
use cadenza::error::EngineError;
use cadenza::node_graph::resolve::reshape_function_node;
use cadenza::node_graph::{Node, NodeGraph};
use cadenza::properties::{declare_property, Value};
use cadenza::scene::KeyTarget;

const PERFORMANCE: &str = r#"[
    {
        "name": "lead",
        "notes": [
            {"midi": 60, "time": 0.0, "duration": 1.0, "velocity": 0.5},
            {"midi": 64, "time": 2.0, "duration": 0.1, "velocity": 0.9}
        ]
    }
]"#;

/// doc (track list) -> track -> notes -> note, each hop one `JsonSource`.
fn wire_document_chain(graph: &mut NodeGraph) {
    for id in ["doc", "track", "note_list", "note"] {
        graph.add_node(Node::json_source(id));
    }
    graph.connect("doc", "Array", "track", "Data");
    graph.connect("track", "notes", "note_list", "Data");
    graph.connect("note_list", "Array", "note", "Data");
}

fn build_graph() -> NodeGraph {
    let mut graph = NodeGraph::new();
    wire_document_chain(&mut graph);

    let mut function = Node::function_call("velocity_fn");
    reshape_function_node(&mut function, "adjust_velocity");
    if let Some(socket) = function.inputs.iter_mut().find(|s| s.name == "multiplier") {
        socket.float_value = 3.0;
    }
    if let Some(socket) = function.inputs.iter_mut().find(|s| s.name == "max_value") {
        socket.float_value = 10.0;
    }
    graph.add_node(function);

    graph.add_node(Node::math_binding("binding", "scale_x", 0.25, 0.75));
    graph.connect("doc", "Array", "binding", "Track");
    graph.connect("note_list", "Array", "binding", "Note");
    graph.connect("note", "midi", "binding", "Midi");
    graph.connect("note", "duration", "binding", "Duration");
    graph.connect("note", "time", "binding", "Time");
    graph.connect("note", "velocity", "velocity_fn", "velocity");
    graph.connect("velocity_fn", "Output", "binding", "Value");
    graph
}

fn context() -> EngineContext {
    let mut ctx = EngineContext::with_seed(24.0, 11);
    let template = ctx.scene.add_collection("Towers", None);
    let tower = ctx.scene.add_entity("tower", Some(template));
    if let Some(e) = ctx.scene.entity_mut(tower) {
        declare_property(&mut e.bag, "scale_x", Value::Float(1.0));
    }
    ctx.template_choice = Some("Towers".to_string());
    ctx
}

#[test]
fn full_pipeline_writes_the_four_key_window() {
    let mut ctx = context();
    assert_eq!(ctx.load_performance_str(PERFORMANCE), OpStatus::Finished);
    assert_eq!(ctx.process_document(), OpStatus::Finished);
    assert_eq!(ctx.realize_collections(), OpStatus::Finished);
    ctx.graphs.push(build_graph());

    assert_eq!(ctx.apply_music().unwrap(), OpStatus::Finished);

    let target = KeyTarget::parse("scale_x").unwrap();
    let collection = ctx
        .scene
        .find_collection_with_tags(0, 60)
        .expect("realized duplicate for midi 60");
    let carrier = ctx
        .scene
        .all_objects(collection)
        .into_iter()
        .find(|&id| !ctx.scene.keyframes(id, &target).is_empty())
        .expect("an entity received keys");

    let keys = ctx.scene.keyframes(carrier, &target);
    let frames: Vec<i64> = keys.iter().map(|k| k.frame).collect();
    let values: Vec<f64> = keys.iter().map(|k| k.value).collect();
    // One-second note at 24 fps, peak fractions 0.25/0.75.
    assert_eq!(frames, vec![0, 6, 18, 24]);
    // Base 1.0 at the ends, adjust_velocity(0.5 * 3.0) = 1.5 at the peak.
    assert_eq!(values, vec![1.0, 1.5, 1.5, 1.0]);
}

#[test]
fn short_notes_get_no_keys() {
    let mut ctx = context();
    ctx.load_performance_str(PERFORMANCE);
    ctx.process_document();
    ctx.realize_collections();
    ctx.graphs.push(build_graph());
    ctx.apply_music().unwrap();

    // midi 64 lasts 0.1s: under four frames, silently skipped.
    let target = KeyTarget::parse("scale_x").unwrap();
    let collection = ctx.scene.find_collection_with_tags(0, 64).unwrap();
    for id in ctx.scene.all_objects(collection) {
        assert!(ctx.scene.keyframes(id, &target).is_empty());
    }
}

#[test]
fn path_into_an_incompatible_shape_aborts_the_sweep() {
    let mut ctx = context();
    ctx.load_performance_str(PERFORMANCE);
    ctx.process_document();
    ctx.realize_collections();

    let mut graph = build_graph();
    // Rebind Note to the track's name: descending `[]` into a string is a
    // document/graph mismatch, not a skippable miss.
    graph.connect("track", "name", "binding", "Note");
    ctx.graphs.push(graph);

    let err = ctx.apply_music().unwrap_err();
    assert!(matches!(err, EngineError::Path { .. }));

    // The abort happens before any key is written.
    let target = KeyTarget::parse("scale_x").unwrap();
    for id in ctx.scene.entity_ids() {
        assert!(ctx.scene.keyframes(id, &target).is_empty());
    }
}

#[test]
fn disabled_tracks_are_left_untouched() {
    let mut ctx = context();
    ctx.load_performance_str(PERFORMANCE);
    ctx.process_document();
    ctx.realize_collections();
    ctx.graphs.push(build_graph());
    ctx.track_section_mut(0).unwrap().enabled = false;

    ctx.apply_music().unwrap();

    let target = KeyTarget::parse("scale_x").unwrap();
    for id in ctx.scene.entity_ids() {
        assert!(ctx.scene.keyframes(id, &target).is_empty());
    }
}
