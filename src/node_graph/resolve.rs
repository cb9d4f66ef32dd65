use log::warn;
use serde_json::Value;

use super::functions;
use super::model::{Node, NodeGraph, NodeKind, Socket};

/// Writes a JSON value into a socket: numbers land in the float slot,
/// strings in the payload slot, nested shapes are re-serialized.
fn write_socket_value(socket: &mut Socket, value: &Value, path: &str) {
    match value {
        Value::String(s) => socket.json_data = s.clone(),
        Value::Number(n) => socket.float_value = n.as_f64().unwrap_or(0.0),
        other => socket.json_data = other.to_string(),
    }
    socket.json_path = path.to_string();
}

/// Syncs a `JsonSource` node's outputs to the shape of `payload`.
///
/// Object => one output per key, path-annotated `base.key`. Non-empty array
/// => exactly one output named "Array" seeded from element 0 with path
/// `base.[]` (only element 0's shape is inspected). Anything else => no
/// outputs. Set semantics: stale sockets are removed, missing ones created,
/// existing ones updated in place. Re-running with an identical payload is
/// a no-op.
pub fn reshape_json_node(node: &mut Node, payload: &str, base_path: &str) {
    let data: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(err) => {
            warn!("node '{}': payload is not valid JSON: {err}", node.id);
            return;
        }
    };

    if let NodeKind::JsonSource { stored, path } = &mut node.kind {
        *stored = payload.to_string();
        *path = base_path.to_string();
    }

    let mut required: Vec<(String, Value, String)> = Vec::new();
    match &data {
        Value::Object(map) => {
            for (key, value) in map {
                required.push((key.clone(), value.clone(), format!("{base_path}.{key}")));
            }
        }
        Value::Array(items) if !items.is_empty() => {
            required.push((
                "Array".to_string(),
                items[0].clone(),
                format!("{base_path}.[]"),
            ));
        }
        _ => {}
    }

    node.outputs
        .retain(|s| required.iter().any(|(name, _, _)| name == &s.name));
    for (name, value, path) in required {
        match node.output_mut(&name) {
            Some(socket) => write_socket_value(socket, &value, &path),
            None => {
                let mut socket = Socket::new(&name);
                write_socket_value(&mut socket, &value, &path);
                node.outputs.push(socket);
            }
        }
    }
}

/// Replaces a `FunctionCall` node's inputs with one socket per declared
/// parameter of the selected registry function, in declared order. An
/// unknown key leaves the node with no inputs.
pub fn reshape_function_node(node: &mut Node, key: &str) {
    if let NodeKind::FunctionCall { selected } = &mut node.kind {
        *selected = key.to_string();
    }
    node.inputs.clear();
    match functions::function(key) {
        Some(def) => {
            for param in def.params {
                node.inputs.push(Socket::new(param));
            }
        }
        None => warn!("node '{}': unknown function '{key}'", node.id),
    }
}

/// Re-derives a `JsonSource` node's payload and reshapes its outputs.
///
/// A linked `Data` input delegates to the upstream socket's payload and
/// recorded path; otherwise the raw performance text is ingested with the
/// `$` root.
pub fn refresh_json_source(graph: &mut NodeGraph, node_id: &str, fallback_raw: &str) {
    let (payload, path) = match graph.upstream_socket(node_id, "Data") {
        Some(upstream) => (upstream.json_data.clone(), upstream.json_path.clone()),
        None => (fallback_raw.to_string(), "$".to_string()),
    };
    if let Some(node) = graph.node_mut(node_id) {
        reshape_json_node(node, &payload, &path);
    }
}

/// A function input after single-hop resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedInput {
    /// A locally-edited or upstream literal float.
    Literal(f64),
    /// A raw JSON payload carried on the socket.
    Json(String),
    /// A path descriptor recorded by an upstream `JsonSource`.
    BoundPath(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCall {
    pub function: String,
    pub inputs: Vec<(String, ResolvedInput)>,
}

fn classify(socket: &Socket) -> ResolvedInput {
    if !socket.json_path.is_empty() {
        ResolvedInput::BoundPath(socket.json_path.clone())
    } else if !socket.json_data.is_empty() {
        ResolvedInput::Json(socket.json_data.clone())
    } else {
        ResolvedInput::Literal(socket.float_value)
    }
}

/// Resolves a `FunctionCall` node: the selected function key plus one
/// resolved input per socket, pulling linked sockets from their upstream
/// producer and unlinked ones from their own locally-edited value. Single
/// hop, demand-pulled; there is no whole-graph execution pass.
pub fn resolve_function(graph: &NodeGraph, node_id: &str) -> Option<ResolvedCall> {
    let node = graph.node(node_id)?;
    let NodeKind::FunctionCall { selected } = &node.kind else {
        return None;
    };
    if selected.is_empty() {
        return None;
    }

    let mut inputs = Vec::with_capacity(node.inputs.len());
    for socket in &node.inputs {
        let resolved = match graph.upstream_socket(node_id, &socket.name) {
            Some(upstream) => classify(upstream),
            None => classify(socket),
        };
        inputs.push((socket.name.clone(), resolved));
    }

    Some(ResolvedCall {
        function: selected.clone(),
        inputs,
    })
}

/// The recorded document paths bound to a `MathBinding` node's five data
/// sockets. `None` unless every one of them is linked.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPaths {
    pub track: String,
    pub note: String,
    pub midi: String,
    pub duration: String,
    pub time: String,
}

pub fn bound_paths(graph: &NodeGraph, node_id: &str) -> Option<BoundPaths> {
    let path_of = |socket: &str| -> Option<String> {
        graph
            .upstream_socket(node_id, socket)
            .map(|s| s.json_path.clone())
            .filter(|p| !p.is_empty())
    };
    Some(BoundPaths {
        track: path_of("Track")?,
        note: path_of("Note")?,
        midi: path_of("Midi")?,
        duration: path_of("Duration")?,
        time: path_of("Time")?,
    })
}
