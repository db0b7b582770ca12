//! Concrete pipeline tasks of the point-in-time grid workflow.
//!
//! Every task reads the run's working directory from its `workdir` input and
//! derives file locations from [`Layout`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use pitgrid_core::{aggregate, partition, Chunk, ChunkResult, CoreError, PartitionStrategy};

use crate::artifact::Artifacts;
use crate::error::EngineError;
use crate::graph::{ChunkTask, Task};
use crate::grid_io::{
    clear_output, concat_values, copy_file, load_work_units, read_values, write_chunk_grids,
    write_redist_info,
};
use crate::layout::Layout;
use crate::postprocess;
use crate::tools::{ModelFolder, RayTraceRequest, Toolchain};

/// Input carrying the run's working directory.
pub const WORKDIR: &str = "workdir";

fn layout(inputs: &Artifacts) -> Result<Layout, EngineError> {
    Ok(Layout::new(inputs.path(WORKDIR)?))
}

async fn ensure_dir(path: &std::path::Path) -> Result<(), EngineError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| EngineError::io(path, e))
}

/// Translates the model into a folder of sensor grids and keeps a copy of
/// the grid list under `resources/`.
///
/// Inputs: `model`, `grid_filter`. Outputs: `model_folder`, `grid_dir`,
/// `grids_info`.
pub struct CreateRadFolder {
    tools: Arc<dyn Toolchain>,
}

impl CreateRadFolder {
    pub fn new(tools: Arc<dyn Toolchain>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Task for CreateRadFolder {
    async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
        let layout = layout(inputs)?;
        let model = inputs.path("model")?;
        let grid_filter = inputs.text("grid_filter")?;

        clear_output(&ModelFolder::at(layout.model_dir()).grids_info).await?;
        let folder = self
            .tools
            .translate_model(model, grid_filter, &layout.model_dir())
            .await?;
        let grids_info = layout.grids_info();
        copy_file(&folder.grids_info, &grids_info).await?;

        Ok(Artifacts::new("create_rad_folder")
            .with("model_folder", folder.root)
            .with("grid_dir", folder.grid_dir)
            .with("grids_info", grids_info))
    }
}

/// Inputs: `sky`. Outputs: `sky_file`.
pub struct GenerateSky {
    tools: Arc<dyn Toolchain>,
}

impl GenerateSky {
    pub fn new(tools: Arc<dyn Toolchain>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Task for GenerateSky {
    async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
        let layout = layout(inputs)?;
        let sky = inputs.sky("sky")?;
        ensure_dir(&layout.resources_dir()).await?;

        let out = layout.raw_sky_file();
        clear_output(&out).await?;
        self.tools.generate_sky(sky, &out).await?;
        Ok(Artifacts::new("generate_sky").with("sky_file", out))
    }
}

/// Rewrites the generated sky for the requested metric.
///
/// Inputs: `sky_file`, `metric`. Outputs: `adjusted_sky`.
pub struct AdjustSky {
    tools: Arc<dyn Toolchain>,
}

impl AdjustSky {
    pub fn new(tools: Arc<dyn Toolchain>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Task for AdjustSky {
    async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
        let layout = layout(inputs)?;
        let sky_file = inputs.path("sky_file")?;
        let metric = inputs.metric("metric")?;

        let out = layout.sky_file();
        clear_output(&out).await?;
        self.tools.adjust_sky(sky_file, metric, &out).await?;
        Ok(Artifacts::new("adjust_sky").with("adjusted_sky", out))
    }
}

/// Inputs: `model_folder`, `sky`. Outputs: `scene_file`.
pub struct CreateOctree {
    tools: Arc<dyn Toolchain>,
}

impl CreateOctree {
    pub fn new(tools: Arc<dyn Toolchain>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Task for CreateOctree {
    async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
        let layout = layout(inputs)?;
        let model_folder = inputs.path("model_folder")?;
        let sky = inputs.path("sky")?;

        let out = layout.scene_file();
        clear_output(&out).await?;
        self.tools.compile_scene(model_folder, sky, &out).await?;
        Ok(Artifacts::new("create_octree").with("scene_file", out))
    }
}

/// Partitions the translated grids and materialises one sensor file per
/// chunk.
///
/// Inputs: `grid_dir`. Outputs: `manifest`, `grid_folder`, `dist_info`.
pub struct SplitGridFolder {
    strategy: PartitionStrategy,
}

impl SplitGridFolder {
    pub fn new(strategy: PartitionStrategy) -> Self {
        Self { strategy }
    }
}

#[async_trait]
impl Task for SplitGridFolder {
    async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
        let layout = layout(inputs)?;
        let grid_dir = inputs.path("grid_dir")?;

        let units = load_work_units(grid_dir).await?;
        let manifest = partition(&units, self.strategy)?;
        for unit in manifest.work_units() {
            debug!(
                work_unit = %unit.id,
                sensors = unit.item_count,
                chunks = manifest.chunks_of(&unit.id).count(),
                "Grid partitioned"
            );
        }
        info!(grids = units.len(), chunks = manifest.len(), "Partitioned sensor grids");

        let grid_folder = layout.chunk_grid_dir();
        write_chunk_grids(&manifest, &grid_folder).await?;
        let dist_info = layout.redist_info();
        write_redist_info(&manifest, &dist_info).await?;

        Ok(Artifacts::new("split_grid_folder")
            .with("manifest", manifest)
            .with("grid_folder", grid_folder)
            .with("dist_info", dist_info))
    }
}

/// Traces one chunk and reads its values back.
///
/// Inputs: `scene_file`, `grid_folder`, `metric`, `radiance_parameters`.
/// Writes `initial_results/chunks/{full_id}.res`.
pub struct RayTraceChunk {
    tools: Arc<dyn Toolchain>,
}

impl RayTraceChunk {
    pub fn new(tools: Arc<dyn Toolchain>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl ChunkTask for RayTraceChunk {
    async fn run_chunk(&self, chunk: &Chunk, inputs: &Artifacts) -> Result<ChunkResult, EngineError> {
        let layout = layout(inputs)?;
        let grid = inputs.path("grid_folder")?.join(chunk.grid_file());
        let output = layout.chunk_result_file(chunk);
        ensure_dir(&layout.chunk_results_dir()).await?;

        let request = RayTraceRequest {
            scene: inputs.path("scene_file")?,
            grid: &grid,
            metric: inputs.metric("metric")?,
            radiance_parameters: inputs.text("radiance_parameters")?,
            output: &output,
        };
        clear_output(&output).await?;
        self.tools.ray_trace(&request).await?;

        let values = read_values(&output).await?;
        if values.len() != chunk.count {
            return Err(CoreError::ChunkCountMismatch {
                chunk: chunk.id.clone(),
                expected: chunk.count,
                actual: values.len(),
            }
            .into());
        }
        Ok(ChunkResult::new(chunk.id.clone(), values))
    }
}

/// Fan-in barrier: merges chunk results against the manifest and writes
/// `initial_results/{work_unit}.res` from the chunk files, value text intact.
///
/// Inputs: `results`, `manifest`. Outputs: `aggregated`, `merged_folder`.
pub struct MergeResults;

#[async_trait]
impl Task for MergeResults {
    async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
        let layout = layout(inputs)?;
        let results = inputs.chunk_results("results")?;
        let manifest = inputs.manifest("manifest")?;

        let merged = aggregate(&results, &manifest)?;
        for result in &merged {
            let sources: Vec<_> = manifest
                .chunks_of(&result.work_unit)
                .map(|chunk| layout.chunk_result_file(chunk))
                .collect();
            concat_values(&sources, &layout.merged_result_file(&result.work_unit)).await?;
            debug!(work_unit = %result.work_unit, values = result.len(), "Merged grid results");
        }
        info!(grids = merged.len(), chunks = results.len(), "Chunk results merged");

        Ok(Artifacts::new("merge_results")
            .with("aggregated", merged)
            .with("merged_folder", layout.initial_results_dir()))
    }
}

/// Inputs: `aggregated`, `merged_folder`, `grids_info`. Outputs: `results`,
/// `grids_info`.
pub struct Restructure;

#[async_trait]
impl Task for Restructure {
    async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
        let layout = layout(inputs)?;
        let aggregated = inputs.aggregated("aggregated")?;
        let merged_folder = inputs.path("merged_folder")?;
        let grids_info = inputs.path("grids_info")?;

        let folder = postprocess::restructure(
            &aggregated,
            merged_folder,
            grids_info,
            &layout.results_dir(),
        )
        .await?;
        Ok(Artifacts::new("restructure_results")
            .with("results", folder.root)
            .with("grids_info", folder.grids_info))
    }
}

/// Inputs: `model`, `results`, `grids_info`. Outputs: `visualization`.
pub struct Visualize {
    tools: Arc<dyn Toolchain>,
}

impl Visualize {
    pub fn new(tools: Arc<dyn Toolchain>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Task for Visualize {
    async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
        let layout = layout(inputs)?;
        let artifact = postprocess::visualize(
            self.tools.as_ref(),
            inputs.path("model")?,
            inputs.path("results")?,
            inputs.path("grids_info")?,
            &layout.visualization_file(),
        )
        .await?;
        Ok(Artifacts::new("visualize").with("visualization", artifact.path))
    }
}
