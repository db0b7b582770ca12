//! pitgrid Core Domain Types
//!
//! This crate contains the pure part of the point-in-time grid workflow,
//! with no dependencies on:
//! - Async runtime
//! - File system
//! - External simulation tools
//!
//! It owns work partitioning (grids into chunks) and the reverse merge
//! (chunk results back into per-grid results).

pub mod aggregate;
pub mod error;
pub mod event;
pub mod ids;
pub mod metric;
pub mod partition;
pub mod sky;
pub mod status;
pub mod work;

// Re-export commonly used types
pub use aggregate::{aggregate, AggregatedResult, ChunkResult};
pub use error::CoreError;
pub use event::{PipelineEvent, PipelineEventType};
pub use ids::{ChunkId, RunId, WorkUnitId};
pub use metric::Metric;
pub use partition::{partition, PartitionStrategy};
pub use sky::{SkyKind, SkySpec};
pub use status::NodeStatus;
pub use work::{Chunk, ManifestRecord, RedistributionManifest, UnitDistribution, WorkUnit};
