mod model;

pub mod functions;
pub mod resolve;

pub use model::{Link, Node, NodeGraph, NodeKind, Socket};
pub use resolve::{
    bound_paths, refresh_json_source, reshape_function_node, reshape_json_node, resolve_function,
    BoundPaths, ResolvedCall, ResolvedInput,
};

#[cfg(test)]
mod tests;
