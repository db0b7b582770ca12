//! pitgrid Engine Library
//!
//! This crate runs the point-in-time grid workflow: it builds the task graph,
//! schedules it with bounded parallelism, fans ray tracing out over the
//! chunks produced by partitioning, and publishes the merged results.

pub mod artifact;
pub mod config;
pub mod error;
pub mod fanout;
pub mod graph;
pub mod grid_io;
pub mod layout;
pub mod postprocess;
pub mod recipe;
pub mod scheduler;
pub mod tasks;
pub mod tools;

pub use artifact::{Artifact, Artifacts};
pub use config::{Config, SplitMode};
pub use error::{ChunkFailure, EngineError, ToolError};
pub use fanout::{fan_out, EventSink};
pub use graph::{ChunkTask, GraphBuilder, NodeSpec, OutputRef, Task, TaskGraph};
pub use layout::Layout;
pub use postprocess::{restructure, visualize, ResultFolder, VisualizationArtifact};
pub use recipe::{PointInTimeRecipe, RunRequest};
pub use scheduler::{RunReport, Scheduler};
pub use tools::{CommandRunner, HoneybeeToolchain, ModelFolder, RayTraceRequest, Toolchain};
