//! Working directory layout of one pipeline run.

use std::path::PathBuf;

use pitgrid_core::{Chunk, WorkUnitId};

/// Folder names and file locations under a run's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Model translator output.
    pub fn model_dir(&self) -> PathBuf {
        self.root.join("model")
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.root.join("resources")
    }

    /// Sky as generated, before the metric adjustment.
    pub fn raw_sky_file(&self) -> PathBuf {
        self.resources_dir().join("sky.sky")
    }

    /// Sky adjusted for the requested metric.
    pub fn sky_file(&self) -> PathBuf {
        self.resources_dir().join("weather.sky")
    }

    /// Compiled scene.
    pub fn scene_file(&self) -> PathBuf {
        self.resources_dir().join("scene.oct")
    }

    /// Copy of the translator's grid list.
    pub fn grids_info(&self) -> PathBuf {
        self.resources_dir().join("grids_info.json")
    }

    /// Chunk sensor files and their `_info.json` records.
    pub fn chunk_grid_dir(&self) -> PathBuf {
        self.resources_dir().join("grid")
    }

    pub fn chunk_grid_file(&self, chunk: &Chunk) -> PathBuf {
        self.chunk_grid_dir().join(chunk.grid_file())
    }

    pub fn initial_results_dir(&self) -> PathBuf {
        self.root.join("initial_results")
    }

    /// Per-unit chunk ranges written by the partitioner.
    pub fn redist_info(&self) -> PathBuf {
        self.initial_results_dir().join("_redist_info.json")
    }

    /// Raw per-chunk results, one file per fan-out instance.
    pub fn chunk_results_dir(&self) -> PathBuf {
        self.initial_results_dir().join("chunks")
    }

    pub fn chunk_result_file(&self, chunk: &Chunk) -> PathBuf {
        self.chunk_results_dir().join(chunk.result_file())
    }

    /// Merged result of one work unit.
    pub fn merged_result_file(&self, unit: &WorkUnitId) -> PathBuf {
        self.initial_results_dir().join(format!("{}.res", unit))
    }

    /// Published numeric results.
    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results").join("pit")
    }

    pub fn visualization_file(&self) -> PathBuf {
        self.root.join("visualization.vsf")
    }
}
