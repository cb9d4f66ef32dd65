use serde::{Deserialize, Serialize};

/// A typed named slot on a node. Carries a locally-edited float, an
/// optional raw JSON payload, and the dot-path locating its logical origin
/// inside the performance document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Socket {
    pub name: String,
    pub float_value: f64,
    pub json_data: String,
    pub json_path: String,
}

impl Socket {
    pub fn new(name: &str) -> Socket {
        Socket {
            name: name.to_string(),
            ..Socket::default()
        }
    }
}

/// Closed set of node variants. Socket sets for `JsonSource` and
/// `FunctionCall` are kept consistent with the current payload shape /
/// selected function by the reshape functions in `resolve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    TextSource {
        text: String,
    },
    FloatSource {
        value: f64,
    },
    JsonSource {
        /// Last payload the node was fed, kept for idempotent re-updates.
        stored: String,
        path: String,
    },
    FunctionCall {
        selected: String,
    },
    MathBinding {
        /// Normalized ramp fractions into the peak window.
        start: f64,
        end: f64,
        /// Tracked property the scheduler writes keys onto.
        target_property: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub inputs: Vec<Socket>,
    pub outputs: Vec<Socket>,
}

impl Node {
    pub fn text_source(id: &str, text: &str) -> Node {
        let mut out = Socket::new("Text");
        out.json_data = text.to_string();
        Node {
            id: id.to_string(),
            kind: NodeKind::TextSource {
                text: text.to_string(),
            },
            inputs: Vec::new(),
            outputs: vec![out],
        }
    }

    pub fn float_source(id: &str, value: f64) -> Node {
        let mut out = Socket::new("Float");
        out.float_value = value;
        Node {
            id: id.to_string(),
            kind: NodeKind::FloatSource { value },
            inputs: Vec::new(),
            outputs: vec![out],
        }
    }

    /// A JSON-ingestion node. Outputs appear once the node is fed a payload
    /// (see `resolve::refresh_json_source`).
    pub fn json_source(id: &str) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::JsonSource {
                stored: String::new(),
                path: String::new(),
            },
            inputs: vec![Socket::new("Data")],
            outputs: Vec::new(),
        }
    }

    /// A registry-function call. Inputs appear when a function is selected
    /// (see `resolve::reshape_function_node`).
    pub fn function_call(id: &str) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::FunctionCall {
                selected: String::new(),
            },
            inputs: Vec::new(),
            outputs: vec![Socket::new("Output")],
        }
    }

    /// The scheduler-facing binding node: six fixed inputs, two ramp
    /// fractions, one target property.
    pub fn math_binding(id: &str, target_property: &str, start: f64, end: f64) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::MathBinding {
                start,
                end,
                target_property: target_property.to_string(),
            },
            inputs: ["Track", "Note", "Midi", "Value", "Duration", "Time"]
                .iter()
                .map(|n| Socket::new(n))
                .collect(),
            outputs: Vec::new(),
        }
    }

    pub fn input(&self, name: &str) -> Option<&Socket> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Socket> {
        self.outputs.iter().find(|s| s.name == name)
    }

    pub fn output_mut(&mut self, name: &str) -> Option<&mut Socket> {
        self.outputs.iter_mut().find(|s| s.name == name)
    }
}

/// A single directed producer -> consumer edge between two sockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub from_node: String,
    pub from_socket: String,
    pub to_node: String,
    pub to_socket: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeGraph {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl NodeGraph {
    pub fn new() -> NodeGraph {
        NodeGraph::default()
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Connects a producer output to a consumer input. An input socket has
    /// at most one upstream producer; reconnecting replaces the old link.
    pub fn connect(&mut self, from_node: &str, from_socket: &str, to_node: &str, to_socket: &str) {
        self.links
            .retain(|l| !(l.to_node == to_node && l.to_socket == to_socket));
        self.links.push(Link {
            from_node: from_node.to_string(),
            from_socket: from_socket.to_string(),
            to_node: to_node.to_string(),
            to_socket: to_socket.to_string(),
        });
    }

    pub fn incoming(&self, to_node: &str, to_socket: &str) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| l.to_node == to_node && l.to_socket == to_socket)
    }

    pub fn is_linked(&self, node: &str, socket: &str) -> bool {
        self.incoming(node, socket).is_some()
    }

    /// The upstream producer socket feeding an input, if any.
    pub fn upstream_socket(&self, to_node: &str, to_socket: &str) -> Option<&Socket> {
        let link = self.incoming(to_node, to_socket)?;
        self.node(&link.from_node)?.output(&link.from_socket)
    }

    /// The upstream producer node feeding an input, if any.
    pub fn upstream_node(&self, to_node: &str, to_socket: &str) -> Option<&Node> {
        let link = self.incoming(to_node, to_socket)?;
        self.node(&link.from_node)
    }

    pub fn math_binding_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::MathBinding { .. }))
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn json_source_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::JsonSource { .. }))
            .map(|n| n.id.clone())
            .collect()
    }
}
