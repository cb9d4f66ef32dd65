pub mod analysis;
pub mod distribute;
pub mod engine;
pub mod error;
pub mod node_graph;
pub mod paths;
pub mod properties;
pub mod realize;
pub mod scene;
pub mod scheduler;

pub use engine::{EngineContext, OpStatus, Report, ReportLevel};
pub use error::{EngineError, Result};
