//! Pipeline events for tracking execution stages.

use crate::ids::{ChunkId, EventId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A pipeline event: one node or chunk changing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Unique event identifier.
    pub id: EventId,
    /// Run this event belongs to.
    pub run_id: RunId,
    /// Graph node the event concerns.
    pub node: String,
    /// Chunk, for fan-out instance events.
    pub chunk: Option<ChunkId>,
    /// Type of event.
    pub event_type: PipelineEventType,
    /// Unix timestamp (milliseconds) when event occurred.
    pub timestamp_ms: i64,
    /// Event-specific metadata (error, duration_ms, ...).
    pub metadata: HashMap<String, String>,
}

impl PipelineEvent {
    /// Create a new pipeline event.
    pub fn new(
        run_id: RunId,
        node: impl Into<String>,
        chunk: Option<ChunkId>,
        event_type: PipelineEventType,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            run_id,
            node: node.into(),
            chunk,
            event_type,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            metadata,
        }
    }

    /// Create a NodeStarted event.
    pub fn node_started(run_id: RunId, node: &str) -> Self {
        Self::new(run_id, node, None, PipelineEventType::NodeStarted, HashMap::new())
    }

    /// Create a NodeCompleted event.
    pub fn node_completed(run_id: RunId, node: &str, duration_ms: i64) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("duration_ms".to_string(), duration_ms.to_string());
        Self::new(run_id, node, None, PipelineEventType::NodeCompleted, metadata)
    }

    /// Create a NodeFailed event.
    pub fn node_failed(run_id: RunId, node: &str, error: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), error.to_string());
        Self::new(run_id, node, None, PipelineEventType::NodeFailed, metadata)
    }

    /// Create a NodeSkipped event.
    pub fn node_skipped(run_id: RunId, node: &str) -> Self {
        Self::new(run_id, node, None, PipelineEventType::NodeSkipped, HashMap::new())
    }

    /// Create a FanOutResolved event carrying the instance count.
    pub fn fan_out_resolved(run_id: RunId, node: &str, instances: usize) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("instances".to_string(), instances.to_string());
        Self::new(run_id, node, None, PipelineEventType::FanOutResolved, metadata)
    }

    /// Create a ChunkStarted event.
    pub fn chunk_started(run_id: RunId, node: &str, chunk: ChunkId) -> Self {
        Self::new(run_id, node, Some(chunk), PipelineEventType::ChunkStarted, HashMap::new())
    }

    /// Create a ChunkCompleted event.
    pub fn chunk_completed(run_id: RunId, node: &str, chunk: ChunkId, values: usize) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("values".to_string(), values.to_string());
        Self::new(run_id, node, Some(chunk), PipelineEventType::ChunkCompleted, metadata)
    }

    /// Create a ChunkFailed event.
    pub fn chunk_failed(run_id: RunId, node: &str, chunk: ChunkId, error: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), error.to_string());
        Self::new(run_id, node, Some(chunk), PipelineEventType::ChunkFailed, metadata)
    }
}

/// Type of pipeline event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventType {
    /// Node began executing.
    NodeStarted,
    /// Node finished successfully.
    NodeCompleted,
    /// Node failed.
    NodeFailed,
    /// Node was not started because a dependency failed.
    NodeSkipped,
    /// A fan-out node learned how many instances to run.
    FanOutResolved,
    /// A fan-out instance began.
    ChunkStarted,
    /// A fan-out instance produced its result.
    ChunkCompleted,
    /// A fan-out instance failed.
    ChunkFailed,
}
