use super::*;
use serde_json::json;

fn socket_names(sockets: &[Socket]) -> Vec<&str> {
    sockets.iter().map(|s| s.name.as_str()).collect()
}

#[test]
fn json_reshape_object_creates_one_output_per_key() {
    let mut node = Node::json_source("src");
    reshape_json_node(&mut node, r#"{"a": 1, "b": "two"}"#, "$");

    assert_eq!(socket_names(&node.outputs), vec!["a", "b"]);
    let a = node.output("a").unwrap();
    assert_eq!(a.float_value, 1.0);
    assert_eq!(a.json_path, "$.a");
    let b = node.output("b").unwrap();
    assert_eq!(b.json_data, "two");
    assert_eq!(b.json_path, "$.b");
}

#[test]
fn json_reshape_shrinks_to_the_new_key_set() {
    // Scenario: feed {"a":1,"b":2}, then re-feed {"a":1}; exactly one
    // output named "a" must remain.
    let mut node = Node::json_source("src");
    reshape_json_node(&mut node, r#"{"a": 1, "b": 2}"#, "$");
    assert_eq!(node.outputs.len(), 2);

    reshape_json_node(&mut node, r#"{"a": 1}"#, "$");
    assert_eq!(socket_names(&node.outputs), vec!["a"]);
}

#[test]
fn json_reshape_is_a_stable_fixed_point() {
    let mut node = Node::json_source("src");
    reshape_json_node(&mut node, r#"{"a": 1, "b": 2}"#, "$.x");
    let first = node.outputs.clone();
    reshape_json_node(&mut node, r#"{"a": 1, "b": 2}"#, "$.x");
    assert_eq!(node.outputs, first);
}

#[test]
fn json_reshape_array_exposes_single_element_socket() {
    let mut node = Node::json_source("src");
    reshape_json_node(&mut node, r#"[{"midi": 60}, {"midi": 64}]"#, "$.notes");

    // Only element 0's shape is inspected.
    assert_eq!(socket_names(&node.outputs), vec!["Array"]);
    let array = node.output("Array").unwrap();
    assert_eq!(array.json_path, "$.notes.[]");
    assert_eq!(array.json_data, json!({"midi": 60}).to_string());
}

#[test]
fn json_reshape_scalar_payload_removes_all_outputs() {
    let mut node = Node::json_source("src");
    reshape_json_node(&mut node, r#"{"a": 1}"#, "$");
    reshape_json_node(&mut node, "42", "$");
    assert!(node.outputs.is_empty());
}

#[test]
fn json_reshape_invalid_payload_leaves_sockets_alone() {
    let mut node = Node::json_source("src");
    reshape_json_node(&mut node, r#"{"a": 1}"#, "$");
    reshape_json_node(&mut node, "not json", "$");
    assert_eq!(socket_names(&node.outputs), vec!["a"]);
}

#[test]
fn function_reshape_matches_declared_parameter_order() {
    let mut node = Node::function_call("fx");
    reshape_function_node(&mut node, "adjust_velocity");
    assert_eq!(
        socket_names(&node.inputs),
        vec!["velocity", "multiplier", "min_value", "max_value"]
    );

    // Switching functions swaps the socket set wholesale.
    reshape_function_node(&mut node, "weighted_offset");
    assert_eq!(
        socket_names(&node.inputs),
        vec!["factor_a", "factor_b", "offset"]
    );

    reshape_function_node(&mut node, "no_such_function");
    assert!(node.inputs.is_empty());
}

#[test]
fn connect_replaces_the_previous_producer() {
    let mut graph = NodeGraph::new();
    graph.add_node(Node::float_source("a", 1.0));
    graph.add_node(Node::float_source("b", 2.0));
    let mut call = Node::function_call("fx");
    reshape_function_node(&mut call, "weighted_offset");
    graph.add_node(call);

    graph.connect("a", "Float", "fx", "factor_a");
    graph.connect("b", "Float", "fx", "factor_a");

    let upstream = graph.upstream_socket("fx", "factor_a").unwrap();
    assert_eq!(upstream.float_value, 2.0);
    assert_eq!(
        graph
            .links
            .iter()
            .filter(|l| l.to_node == "fx" && l.to_socket == "factor_a")
            .count(),
        1
    );
}

#[test]
fn resolve_mixes_linked_and_literal_inputs() {
    let mut graph = NodeGraph::new();

    let mut src = Node::json_source("src");
    reshape_json_node(&mut src, r#"{"velocity": 0.5}"#, "$.notes.[]");
    graph.add_node(src);

    let mut call = Node::function_call("fx");
    reshape_function_node(&mut call, "adjust_velocity");
    for socket in call.inputs.iter_mut() {
        match socket.name.as_str() {
            "multiplier" => socket.float_value = 2.0,
            "min_value" => socket.float_value = 0.0,
            "max_value" => socket.float_value = 1.0,
            _ => {}
        }
    }
    graph.add_node(call);

    graph.connect("src", "velocity", "fx", "velocity");

    let resolved = resolve_function(&graph, "fx").unwrap();
    assert_eq!(resolved.function, "adjust_velocity");
    assert_eq!(
        resolved.inputs[0],
        (
            "velocity".to_string(),
            ResolvedInput::BoundPath("$.notes.[].velocity".to_string())
        )
    );
    assert_eq!(
        resolved.inputs[1],
        ("multiplier".to_string(), ResolvedInput::Literal(2.0))
    );
}

#[test]
fn resolve_requires_a_selected_function() {
    let mut graph = NodeGraph::new();
    graph.add_node(Node::function_call("fx"));
    assert!(resolve_function(&graph, "fx").is_none());
}

#[test]
fn json_source_delegates_to_an_upstream_payload() {
    let mut graph = NodeGraph::new();

    let mut root = Node::json_source("root");
    reshape_json_node(
        &mut root,
        r#"{"notes": [{"midi": 60}]}"#,
        "$",
    );
    graph.add_node(root);
    graph.add_node(Node::json_source("notes"));
    graph.connect("root", "notes", "notes", "Data");

    // Unlinked: the fallback raw text is ingested at the root.
    refresh_json_source(&mut graph, "root", r#"{"notes": [{"midi": 60}]}"#);
    // Linked: payload and path come from the upstream socket.
    refresh_json_source(&mut graph, "notes", "{}");

    let notes = graph.node("notes").unwrap();
    let array = notes.output("Array").unwrap();
    assert_eq!(array.json_path, "$.notes.[]");
}

#[test]
fn bound_paths_requires_all_five_data_sockets() {
    let mut graph = NodeGraph::new();

    let mut notes = Node::json_source("notes");
    reshape_json_node(
        &mut notes,
        r#"{"midi": 60, "duration": 1.0, "time": 0.0}"#,
        "$.tracks.[].notes.[]",
    );
    graph.add_node(notes);

    let mut tracks = Node::json_source("tracks");
    reshape_json_node(&mut tracks, r#"{"notes": []}"#, "$.tracks.[]");
    graph.add_node(tracks);

    graph.add_node(Node::math_binding("bind", "scale_x", 0.25, 0.75));

    graph.connect("tracks", "notes", "bind", "Track");
    graph.connect("notes", "midi", "bind", "Note");
    graph.connect("notes", "midi", "bind", "Midi");
    graph.connect("notes", "duration", "bind", "Duration");
    assert!(bound_paths(&graph, "bind").is_none());

    graph.connect("notes", "time", "bind", "Time");
    let paths = bound_paths(&graph, "bind").unwrap();
    assert_eq!(paths.midi, "$.tracks.[].notes.[].midi");
    assert_eq!(paths.time, "$.tracks.[].notes.[].time");
}
