//! Core domain errors.

use thiserror::Error;

use crate::ids::{ChunkId, WorkUnitId};

/// Core domain errors for pitgrid.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metric name not recognised.
    #[error("Unsupported metric '{0}'. Choose from: illuminance, irradiance, luminance, radiance")]
    InvalidMetric(String),

    /// Sky string could not be parsed.
    #[error("Invalid sky specification '{sky}': {reason}")]
    InvalidSky { sky: String, reason: String },

    /// Two work units share an identifier.
    #[error("Duplicate work unit: {0}")]
    DuplicateWorkUnit(WorkUnitId),

    /// A chunk names a work unit the manifest does not list.
    #[error("Chunk {0} belongs to no work unit in the manifest")]
    OrphanChunk(ChunkId),

    /// Chunks produced for a work unit do not add up to it.
    #[error("Partition invariant violated for {work_unit}: expected {expected} items, chunks hold {actual}")]
    PartitionInvariant {
        work_unit: WorkUnitId,
        expected: usize,
        actual: usize,
    },

    /// The manifest lists a chunk with no result.
    #[error("Missing result for chunk {chunk} of work unit {work_unit}")]
    MissingChunkResult {
        work_unit: WorkUnitId,
        chunk: ChunkId,
    },

    /// A result arrived for a chunk the manifest does not list.
    #[error("Unexpected result for chunk {0} (not in manifest)")]
    UnexpectedChunkResult(ChunkId),

    /// More than one result arrived for the same chunk.
    #[error("Duplicate result for chunk {0}")]
    DuplicateChunkResult(ChunkId),

    /// A chunk result does not hold one value per item.
    #[error("Chunk {chunk} returned {actual} values, expected {expected}")]
    ChunkCountMismatch {
        chunk: ChunkId,
        expected: usize,
        actual: usize,
    },

    /// A merged result does not match its work unit.
    #[error("Merged result for {work_unit} holds {actual} values, expected {expected}")]
    ItemCountMismatch {
        work_unit: WorkUnitId,
        expected: usize,
        actual: usize,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
