//! Engine errors.

use std::path::PathBuf;

use thiserror::Error;

use pitgrid_core::{ChunkId, CoreError};

/// Errors from running an external simulation tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Failed to spawn the tool process.
    #[error("Failed to spawn '{program}': {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool process exited with an error.
    #[error("'{program}' exited with code {code}: {stderr}")]
    ProcessError {
        program: String,
        code: i32,
        stderr: String,
    },

    /// Tool reported success but did not produce its output.
    #[error("'{program}' did not produce {}", .path.display())]
    MissingOutput { program: String, path: PathBuf },

    /// I/O error around the tool invocation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single failed fan-out instance.
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub chunk: ChunkId,
    pub error: String,
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Two nodes share a name.
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// A node names a node that was never declared.
    #[error("Node '{node}' depends on unknown node '{missing}'")]
    UnknownNode { node: String, missing: String },

    /// A node reads an output no prior node declares.
    #[error("Node '{node}' reads undeclared output '{output}' of '{from}'")]
    UnknownOutput {
        node: String,
        from: String,
        output: String,
    },

    /// A node reads a graph input that was never declared.
    #[error("Node '{node}' reads undeclared graph input '{input}'")]
    UnknownInput { node: String, input: String },

    /// The dependency graph has a cycle.
    #[error("Dependency cycle through nodes: {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// A node is not reachable from any graph input.
    #[error("Node '{0}' is not reachable from the graph inputs")]
    Unreachable(String),

    /// A graph input was not supplied at run time.
    #[error("Missing graph input: {0}")]
    MissingInput(String),

    /// A node asked for an input it was not given.
    #[error("Node '{node}' has no input named '{input}'")]
    MissingArtifact { node: String, input: String },

    /// An input held a different artifact kind.
    #[error("Input '{input}' expected {expected}, got {actual}")]
    ArtifactType {
        input: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A node failed.
    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: Box<EngineError>,
    },

    /// One or more fan-out instances failed.
    #[error("Fan-out '{node}' failed for {} of {total} chunks: {}", .failed.len(), summarize(.failed))]
    FanOutFailed {
        node: String,
        total: usize,
        failed: Vec<ChunkFailure>,
    },

    /// A spawned task panicked or was aborted.
    #[error("Task join error: {0}")]
    Join(String),

    /// Domain error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// External tool error.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// I/O error.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON error.
    #[error("JSON error in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Malformed data file.
    #[error("Malformed {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl EngineError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a JSON error with the path it concerns.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

fn summarize(failed: &[ChunkFailure]) -> String {
    failed
        .iter()
        .map(|f| format!("{} ({})", f.chunk, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
