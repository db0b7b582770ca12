//! Newtype wrappers for identifiers to ensure type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a work unit (one sensor grid).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkUnitId(String);

impl WorkUnitId {
    /// Create a new WorkUnitId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkUnitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkUnitId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identity of a chunk: its parent work unit and its position within it.
///
/// Displayed as `parent/index`. The flat `full_id` form is what gets embedded
/// in file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    /// Work unit this chunk was cut from.
    pub work_unit: WorkUnitId,
    /// Zero-based position of the chunk within its work unit.
    pub index: usize,
}

impl ChunkId {
    /// Create a new ChunkId.
    pub fn new(work_unit: impl Into<WorkUnitId>, index: usize) -> Self {
        Self {
            work_unit: work_unit.into(),
            index,
        }
    }

    /// Globally unique flat identifier, e.g. `office_0003`.
    ///
    /// The suffix after the last underscore is always the index, so the
    /// mapping stays injective even when work unit ids contain underscores.
    pub fn full_id(&self) -> String {
        format!("{}_{:04}", self.work_unit, self.index)
    }

    /// Parse a flat identifier produced by [`ChunkId::full_id`].
    pub fn parse_full_id(full_id: &str) -> Option<Self> {
        let (parent, index) = full_id.rsplit_once('_')?;
        if parent.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self::new(parent, index.parse().ok()?))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.work_unit, self.index)
    }
}

/// Unique identifier for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Create a new RunId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random RunId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a PipelineEvent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    /// Generate a new random EventId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
