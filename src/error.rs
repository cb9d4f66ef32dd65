use thiserror::Error;

/// Failures surfaced by engine operations.
///
/// Anything recoverable (unknown collection, unknown function, too-short
/// note) is logged and skipped at the call site rather than raised; these
/// variants cover the cases that cancel or abort an operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No file path / no active target was supplied.
    #[error("missing input: {0}")]
    InputMissing(String),

    /// The performance document (or a socket payload standing in for one)
    /// failed to parse.
    #[error("failed to parse {context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A path segment tried to descend into a value of an incompatible
    /// shape. Aborts the whole sweep.
    #[error("path '{path}': segment '{segment}' cannot index into a non-object value")]
    Path { path: String, segment: String },

    /// A keyframe target string addressed neither a tracked custom property
    /// nor a known transform channel.
    #[error("invalid keyframe target '{0}'")]
    Target(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
