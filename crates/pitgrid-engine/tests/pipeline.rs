//! End-to-end recipe runs against an in-process toolchain.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use pitgrid_core::{Metric, NodeStatus, PipelineEventType, SkySpec};
use pitgrid_engine::grid_io::{read_values, GridRecord};
use pitgrid_engine::{
    Config, EngineError, ModelFolder, PointInTimeRecipe, RayTraceRequest, RunReport, RunRequest,
    SplitMode, ToolError, Toolchain,
};

/// Writes plausible files for every step. A traced sensor's value is its
/// index within the parent grid.
#[derive(Default)]
struct FakeToolchain {
    grids: Vec<(&'static str, usize)>,
    fail_chunks: HashSet<String>,
    fail_visualize: bool,
}

impl FakeToolchain {
    fn with_grids(grids: &[(&'static str, usize)]) -> Self {
        Self {
            grids: grids.to_vec(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn translate_model(
        &self,
        _model: &Path,
        _grid_filter: &str,
        out_dir: &Path,
    ) -> Result<ModelFolder, ToolError> {
        let folder = ModelFolder::at(out_dir);
        tokio::fs::create_dir_all(&folder.grid_dir).await?;
        let mut records = Vec::new();
        for (id, count) in &self.grids {
            let lines: String = (0..*count).map(|i| format!("{} 0.0 0.8 0 0 1\n", i)).collect();
            tokio::fs::write(folder.grid_dir.join(format!("{}.pts", id)), lines).await?;
            records.push(GridRecord {
                full_id: id.to_string(),
                name: id.to_string(),
                count: *count,
            });
        }
        let info = serde_json::to_string(&records).map_err(std::io::Error::other)?;
        tokio::fs::write(&folder.grids_info, info).await?;
        Ok(folder)
    }

    async fn generate_sky(&self, sky: &SkySpec, out_file: &Path) -> Result<(), ToolError> {
        tokio::fs::write(out_file, sky.as_str()).await?;
        Ok(())
    }

    async fn adjust_sky(&self, sky_file: &Path, metric: Metric, out_file: &Path) -> Result<(), ToolError> {
        let sky = tokio::fs::read_to_string(sky_file).await?;
        tokio::fs::write(out_file, format!("{}\n# {}\n", sky, metric)).await?;
        Ok(())
    }

    async fn compile_scene(&self, _model_folder: &Path, _sky: &Path, out_file: &Path) -> Result<(), ToolError> {
        tokio::fs::write(out_file, "scene").await?;
        Ok(())
    }

    async fn ray_trace(&self, request: &RayTraceRequest<'_>) -> Result<(), ToolError> {
        let stem = request
            .grid
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if self.fail_chunks.contains(&stem) {
            return Err(ToolError::ProcessError {
                program: "rtrace".into(),
                code: 1,
                stderr: format!("fatal: {}", stem),
            });
        }

        let grid = tokio::fs::read_to_string(request.grid).await?;
        let values: String = grid
            .lines()
            .map(|l| format!("{}\n", l.split_whitespace().next().unwrap_or("0")))
            .collect();
        tokio::fs::write(request.output, values).await?;
        Ok(())
    }

    async fn visualize(
        &self,
        _model: &Path,
        _results: &Path,
        _grids_info: &Path,
        out_file: &Path,
    ) -> Result<(), ToolError> {
        if self.fail_visualize {
            return Err(ToolError::MissingOutput {
                program: "vis".into(),
                path: out_file.to_path_buf(),
            });
        }
        tokio::fs::write(out_file, "{}").await?;
        Ok(())
    }
}

struct Run {
    _dir: TempDir,
    workdir: PathBuf,
    report: RunReport,
}

async fn run(tools: FakeToolchain, config: Config) -> Run {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.hbjson");
    tokio::fs::write(&model, "{}").await.unwrap();
    let workdir = dir.path().join("run");

    let request = RunRequest {
        model,
        sky: "cie -alt 71.6 -az 185.2 -type 0".parse().unwrap(),
        workdir: workdir.clone(),
    };
    let report = PointInTimeRecipe::new(Arc::new(tools))
        .run(&config, &request)
        .await
        .unwrap();
    Run {
        _dir: dir,
        workdir,
        report,
    }
}

fn config(cpu_count: usize, min_sensor_count: usize) -> Config {
    Config {
        cpu_count,
        min_sensor_count,
        ..Config::default()
    }
}

fn count_events(report: &RunReport, kind: PipelineEventType) -> usize {
    report.events.iter().filter(|e| e.event_type == kind).count()
}

fn indices(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

#[tokio::test]
async fn test_full_recipe_publishes_merged_results() {
    let tools = FakeToolchain::with_grids(&[("office", 1000), ("hall", 300)]);
    let run = run(tools, config(4, 100)).await;
    let report = &run.report;

    assert!(report.is_success(), "run failed: {:?}", report.error);
    for (node, status) in &report.statuses {
        assert_eq!(*status, NodeStatus::Completed, "node {}", node);
    }
    assert_eq!(count_events(report, PipelineEventType::ChunkStarted), 4);
    assert_eq!(count_events(report, PipelineEventType::ChunkCompleted), 4);

    let pit = run.workdir.join("results").join("pit");
    assert_eq!(read_values(&pit.join("office.res")).await.unwrap(), indices(1000));
    assert_eq!(read_values(&pit.join("hall.res")).await.unwrap(), indices(300));
    assert!(pit.join("grids_info.json").exists());
    assert!(run.workdir.join("visualization.vsf").exists());
    assert!(run.workdir.join("initial_results").join("_redist_info.json").exists());

    let sky = tokio::fs::read_to_string(run.workdir.join("resources").join("weather.sky"))
        .await
        .unwrap();
    assert!(sky.ends_with("# illuminance\n"));
}

#[tokio::test]
async fn test_failed_chunk_stops_before_merge() {
    let mut tools = FakeToolchain::with_grids(&[("office", 900)]);
    tools.fail_chunks.insert("office_0001".to_string());
    let run = run(tools, config(3, 100)).await;
    let report = &run.report;

    assert!(!report.is_success());
    assert_eq!(report.status("ray_tracing"), NodeStatus::Failed);
    assert_eq!(report.status("merge_results"), NodeStatus::Skipped);
    assert_eq!(report.status("restructure_results"), NodeStatus::Skipped);
    assert_eq!(report.status("visualize"), NodeStatus::Skipped);

    match &report.error {
        Some(EngineError::NodeFailed { node, source }) => {
            assert_eq!(node, "ray_tracing");
            match source.as_ref() {
                EngineError::FanOutFailed { total, failed, .. } => {
                    assert_eq!(*total, 3);
                    assert_eq!(failed.len(), 1);
                    assert_eq!(failed[0].chunk.full_id(), "office_0001");
                }
                other => panic!("expected fan-out failure, got {:?}", other),
            }
        }
        other => panic!("expected node failure, got {:?}", other),
    }

    let chunks = run.workdir.join("initial_results").join("chunks");
    assert!(chunks.join("office_0000.res").exists());
    assert!(chunks.join("office_0002.res").exists());
    assert!(!chunks.join("office_0001.res").exists());
    assert!(!run.workdir.join("initial_results").join("office.res").exists());
    assert!(!run.workdir.join("results").exists());
}

#[tokio::test]
async fn test_visualization_failure_is_not_fatal() {
    let mut tools = FakeToolchain::with_grids(&[("office", 50)]);
    tools.fail_visualize = true;
    let run = run(tools, config(8, 500)).await;
    let report = &run.report;

    assert!(report.is_success());
    assert_eq!(report.status("visualize"), NodeStatus::Failed);
    assert_eq!(report.soft_failures.len(), 1);
    assert_eq!(report.soft_failures[0].0, "visualize");

    let pit = run.workdir.join("results").join("pit");
    assert_eq!(read_values(&pit.join("office.res")).await.unwrap(), indices(50));
    assert!(!run.workdir.join("visualization.vsf").exists());
}

#[tokio::test]
async fn test_fixed_split_without_visualization() {
    let tools = FakeToolchain::with_grids(&[("office", 450)]);
    let config = Config {
        split: SplitMode::Fixed,
        sensor_count: 200,
        visualize: false,
        ..Config::default()
    };
    let run = run(tools, config).await;
    let report = &run.report;

    assert!(report.is_success());
    assert!(!report.statuses.contains_key("visualize"));
    assert_eq!(count_events(report, PipelineEventType::ChunkStarted), 3);

    let last = tokio::fs::read_to_string(
        run.workdir.join("resources").join("grid").join("office_0002.pts"),
    )
    .await
    .unwrap();
    assert_eq!(last.lines().count(), 50);

    let pit = run.workdir.join("results").join("pit");
    assert_eq!(read_values(&pit.join("office.res")).await.unwrap(), indices(450));
}
