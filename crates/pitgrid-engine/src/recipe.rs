//! The point-in-time grid recipe as one parameterized task graph.
//!
//! ```text
//! generate_sky -> adjust_sky --------+
//!                                    v
//! create_rad_folder ------------> create_octree --+
//!        |                                        v
//!        +----> split_grid_folder ===========> ray_tracing (one per chunk)
//!        |              |                         |
//!        |              +----------------> merge_results
//!        |                                        |
//!        +------------------------------> restructure_results --> visualize?
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use pitgrid_core::SkySpec;

use crate::artifact::Artifacts;
use crate::config::Config;
use crate::error::EngineError;
use crate::graph::{GraphBuilder, NodeSpec, OutputRef, TaskGraph, FAN_OUT_RESULTS};
use crate::scheduler::{RunReport, Scheduler};
use crate::tasks::{
    AdjustSky, CreateOctree, CreateRadFolder, GenerateSky, MergeResults, RayTraceChunk,
    Restructure, SplitGridFolder, Visualize, WORKDIR,
};
use crate::tools::{HoneybeeToolchain, Toolchain};

/// Graph input: the building model file.
pub const INPUT_MODEL: &str = "model";
/// Graph input: the parsed sky specification.
pub const INPUT_SKY: &str = "sky";
/// Graph input: the run's working directory.
pub const INPUT_WORKDIR: &str = "workdir";

/// What one run operates on.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub model: PathBuf,
    pub sky: SkySpec,
    pub workdir: PathBuf,
}

impl RunRequest {
    /// Graph inputs for this request.
    pub fn inputs(&self) -> Artifacts {
        Artifacts::new("graph")
            .with(INPUT_MODEL, self.model.clone())
            .with(INPUT_SKY, self.sky.clone())
            .with(INPUT_WORKDIR, self.workdir.clone())
    }
}

/// Builds and runs the point-in-time grid graph.
pub struct PointInTimeRecipe {
    tools: Arc<dyn Toolchain>,
}

impl PointInTimeRecipe {
    pub fn new(tools: Arc<dyn Toolchain>) -> Self {
        Self { tools }
    }

    /// Recipe backed by the external command configured in `config.tool`.
    pub fn honeybee(config: &Config) -> Self {
        Self::new(Arc::new(HoneybeeToolchain::new(config.tool.clone())))
    }

    /// Build the task graph for `config`.
    ///
    /// `config.split` selects the partition strategy and `config.visualize`
    /// adds the optional visualization node.
    pub fn build(&self, config: &Config) -> Result<TaskGraph, EngineError> {
        config.validate()?;
        let tools = &self.tools;

        let mut builder = GraphBuilder::new()
            .input(INPUT_MODEL)
            .input(INPUT_SKY)
            .input(INPUT_WORKDIR)
            .node(
                NodeSpec::task("generate_sky", GenerateSky::new(tools.clone()))
                    .from_input("sky", INPUT_SKY)
                    .from_input(WORKDIR, INPUT_WORKDIR)
                    .output("sky_file"),
            )
            .node(
                NodeSpec::task("adjust_sky", AdjustSky::new(tools.clone()))
                    .from_output("sky_file", "generate_sky", "sky_file")
                    .literal("metric", config.metric)
                    .from_input(WORKDIR, INPUT_WORKDIR)
                    .output("adjusted_sky"),
            )
            .node(
                NodeSpec::task("create_rad_folder", CreateRadFolder::new(tools.clone()))
                    .from_input("model", INPUT_MODEL)
                    .literal("grid_filter", config.grid_filter.clone())
                    .from_input(WORKDIR, INPUT_WORKDIR)
                    .output("model_folder")
                    .output("grid_dir")
                    .output("grids_info"),
            )
            .node(
                NodeSpec::task("create_octree", CreateOctree::new(tools.clone()))
                    .from_output("model_folder", "create_rad_folder", "model_folder")
                    .from_output("sky", "adjust_sky", "adjusted_sky")
                    .from_input(WORKDIR, INPUT_WORKDIR)
                    .needs("adjust_sky")
                    .needs("create_rad_folder")
                    .output("scene_file"),
            )
            .node(
                NodeSpec::task(
                    "split_grid_folder",
                    SplitGridFolder::new(config.partition_strategy()),
                )
                .from_output("grid_dir", "create_rad_folder", "grid_dir")
                .from_input(WORKDIR, INPUT_WORKDIR)
                .needs("create_rad_folder")
                .output("manifest")
                .output("grid_folder")
                .output("dist_info"),
            )
            .node(
                NodeSpec::fan_out(
                    "ray_tracing",
                    RayTraceChunk::new(tools.clone()),
                    OutputRef::new("split_grid_folder", "manifest"),
                )
                .from_output("scene_file", "create_octree", "scene_file")
                .from_output("grid_folder", "split_grid_folder", "grid_folder")
                .literal("metric", config.metric)
                .literal("radiance_parameters", config.radiance_parameters.clone())
                .from_input(WORKDIR, INPUT_WORKDIR),
            )
            .node(
                NodeSpec::task("merge_results", MergeResults)
                    .from_output("results", "ray_tracing", FAN_OUT_RESULTS)
                    .from_output("manifest", "split_grid_folder", "manifest")
                    .from_input(WORKDIR, INPUT_WORKDIR)
                    .output("aggregated")
                    .output("merged_folder"),
            )
            .node(
                NodeSpec::task("restructure_results", Restructure)
                    .from_output("aggregated", "merge_results", "aggregated")
                    .from_output("merged_folder", "merge_results", "merged_folder")
                    .from_output("grids_info", "create_rad_folder", "grids_info")
                    .from_input(WORKDIR, INPUT_WORKDIR)
                    .output("results")
                    .output("grids_info"),
            );

        if config.visualize {
            builder = builder.node(
                NodeSpec::task("visualize", Visualize::new(tools.clone()))
                    .from_input("model", INPUT_MODEL)
                    .from_output("results", "restructure_results", "results")
                    .from_output("grids_info", "restructure_results", "grids_info")
                    .from_input(WORKDIR, INPUT_WORKDIR)
                    .allow_failure()
                    .output("visualization"),
            );
        }

        builder.build()
    }

    /// Build the graph and run it to completion.
    pub async fn run(&self, config: &Config, request: &RunRequest) -> Result<RunReport, EngineError> {
        let graph = self.build(config)?;
        tokio::fs::create_dir_all(&request.workdir)
            .await
            .map_err(|e| EngineError::io(&request.workdir, e))?;

        info!(
            model = %request.model.display(),
            sky = %request.sky,
            metric = %config.metric,
            workdir = %request.workdir.display(),
            "Running point-in-time grid recipe"
        );
        Scheduler::new(config.cpu_count)
            .run(&graph, request.inputs())
            .await
    }
}
