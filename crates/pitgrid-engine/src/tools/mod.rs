//! External simulation tools.
//!
//! Model translation, sky generation, scene compilation, ray tracing and
//! visualization export are done by an external command line program. The
//! [`Toolchain`] trait is the seam; [`HoneybeeToolchain`] drives the real
//! CLI and tests substitute an in-process implementation.

mod command;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use pitgrid_core::{Metric, SkySpec};

use crate::error::ToolError;

pub use command::CommandRunner;

/// Folder written by the model translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFolder {
    /// Translator output root.
    pub root: PathBuf,
    /// Sensor grid files, one `{id}.pts` per grid.
    pub grid_dir: PathBuf,
    /// Grid list (`_info.json`) describing every grid in `grid_dir`.
    pub grids_info: PathBuf,
}

impl ModelFolder {
    /// Conventional layout rooted at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let grid_dir = root.join("grid");
        let grids_info = grid_dir.join("_info.json");
        Self {
            root,
            grid_dir,
            grids_info,
        }
    }
}

/// Everything the ray tracer needs for one chunk.
#[derive(Debug, Clone)]
pub struct RayTraceRequest<'a> {
    pub scene: &'a Path,
    pub grid: &'a Path,
    pub metric: Metric,
    /// Passed through verbatim.
    pub radiance_parameters: &'a str,
    pub output: &'a Path,
}

/// Operations provided by the external simulation tools.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Translate a building model into a folder of sensor grids.
    async fn translate_model(
        &self,
        model: &Path,
        grid_filter: &str,
        out_dir: &Path,
    ) -> Result<ModelFolder, ToolError>;

    /// Write a sky description for `sky`.
    async fn generate_sky(&self, sky: &SkySpec, out_file: &Path) -> Result<(), ToolError>;

    /// Rewrite a sky description for the requested metric.
    async fn adjust_sky(&self, sky_file: &Path, metric: Metric, out_file: &Path)
        -> Result<(), ToolError>;

    /// Compile model and sky into one scene file.
    async fn compile_scene(
        &self,
        model_folder: &Path,
        sky_file: &Path,
        out_file: &Path,
    ) -> Result<(), ToolError>;

    /// Trace one chunk of sensors, one value per line in `request.output`.
    async fn ray_trace(&self, request: &RayTraceRequest<'_>) -> Result<(), ToolError>;

    /// Export a visualization of results against the model.
    async fn visualize(
        &self,
        model: &Path,
        results: &Path,
        grids_info: &Path,
        out_file: &Path,
    ) -> Result<(), ToolError>;
}

/// Toolchain backed by the honeybee-radiance command line.
#[derive(Debug, Clone, Default)]
pub struct HoneybeeToolchain {
    runner: CommandRunner,
}

impl HoneybeeToolchain {
    /// Create a toolchain invoking `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            runner: CommandRunner::new(program),
        }
    }
}

fn split_out(out_file: &Path) -> (String, String) {
    let folder = out_file
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string());
    let name = out_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (folder, name)
}

#[async_trait]
impl Toolchain for HoneybeeToolchain {
    async fn translate_model(
        &self,
        model: &Path,
        grid_filter: &str,
        out_dir: &Path,
    ) -> Result<ModelFolder, ToolError> {
        info!(model = %model.display(), grid_filter = %grid_filter, "Translating model");
        let model_arg = model.display().to_string();
        let out_arg = out_dir.display().to_string();
        self.runner
            .run([
                "translate",
                "model-to-rad-folder",
                model_arg.as_str(),
                "--grid",
                grid_filter,
                "--folder",
                out_arg.as_str(),
            ])
            .await?;

        let folder = ModelFolder::at(out_dir);
        self.runner.expect_output(&folder.grids_info).await?;
        Ok(folder)
    }

    async fn generate_sky(&self, sky: &SkySpec, out_file: &Path) -> Result<(), ToolError> {
        let (folder, name) = split_out(out_file);
        let mut args: Vec<String> = vec!["sky".to_string()];
        args.extend(sky.args().map(str::to_string));
        args.extend(["--folder".to_string(), folder, "--name".to_string(), name]);
        self.runner.run(&args).await?;
        self.runner.expect_output(out_file).await
    }

    async fn adjust_sky(
        &self,
        sky_file: &Path,
        metric: Metric,
        out_file: &Path,
    ) -> Result<(), ToolError> {
        let (folder, name) = split_out(out_file);
        let sky_arg = sky_file.display().to_string();
        self.runner
            .run([
                "sky",
                "adjust-for-metric",
                sky_arg.as_str(),
                "--metric",
                metric.as_str(),
                "--folder",
                folder.as_str(),
                "--name",
                name.as_str(),
            ])
            .await?;
        self.runner.expect_output(out_file).await
    }

    async fn compile_scene(
        &self,
        model_folder: &Path,
        sky_file: &Path,
        out_file: &Path,
    ) -> Result<(), ToolError> {
        let folder_arg = model_folder.display().to_string();
        let sky_arg = sky_file.display().to_string();
        let out_arg = out_file.display().to_string();
        self.runner
            .run([
                "octree",
                "from-folder",
                folder_arg.as_str(),
                "--output",
                out_arg.as_str(),
                "--include-aperture",
                "--sky-file",
                sky_arg.as_str(),
            ])
            .await?;
        self.runner.expect_output(out_file).await
    }

    async fn ray_trace(&self, request: &RayTraceRequest<'_>) -> Result<(), ToolError> {
        let scene_arg = request.scene.display().to_string();
        let grid_arg = request.grid.display().to_string();
        let out_arg = request.output.display().to_string();
        self.runner
            .run([
                "raytrace",
                "point-in-time",
                scene_arg.as_str(),
                grid_arg.as_str(),
                "--rad-params",
                request.radiance_parameters,
                "--metric",
                request.metric.as_str(),
                "--output",
                out_arg.as_str(),
            ])
            .await?;
        self.runner.expect_output(request.output).await
    }

    async fn visualize(
        &self,
        model: &Path,
        results: &Path,
        grids_info: &Path,
        out_file: &Path,
    ) -> Result<(), ToolError> {
        let model_arg = model.display().to_string();
        let results_arg = results.display().to_string();
        let info_arg = grids_info.display().to_string();
        let out_arg = out_file.display().to_string();
        self.runner
            .run([
                "translate",
                "model-to-vis-set",
                model_arg.as_str(),
                "--results",
                results_arg.as_str(),
                "--grids-info",
                info_arg.as_str(),
                "--output-file",
                out_arg.as_str(),
            ])
            .await?;
        self.runner.expect_output(out_file).await
    }
}
