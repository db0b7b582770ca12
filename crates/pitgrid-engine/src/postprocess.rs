//! Publishing merged results.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use pitgrid_core::AggregatedResult;

use crate::error::EngineError;
use crate::grid_io::{clear_output, copy_file};
use crate::tools::Toolchain;

/// Name of the grid metadata file placed next to published results.
pub const GRIDS_INFO_FILE: &str = "grids_info.json";

/// Published numeric results: one `{work_unit}.res` per grid plus the grid
/// metadata needed to map values back onto the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFolder {
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
    pub grids_info: PathBuf,
}

/// Exported visualization of a result folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizationArtifact {
    pub path: PathBuf,
}

/// Relocate the merged `{work_unit}.res` files from `merged_dir` into `dest`
/// and copy the grid metadata alongside. File contents are copied byte for
/// byte.
pub async fn restructure(
    aggregated: &[AggregatedResult],
    merged_dir: &Path,
    grids_info: &Path,
    dest: &Path,
) -> Result<ResultFolder, EngineError> {
    let mut files = Vec::with_capacity(aggregated.len());
    for result in aggregated {
        let name = format!("{}.res", result.work_unit);
        let path = dest.join(&name);
        copy_file(&merged_dir.join(&name), &path).await?;
        files.push(path);
    }

    let info_copy = dest.join(GRIDS_INFO_FILE);
    copy_file(grids_info, &info_copy).await?;

    info!(dest = %dest.display(), grids = files.len(), "Results restructured");
    Ok(ResultFolder {
        root: dest.to_path_buf(),
        files,
        grids_info: info_copy,
    })
}

/// Export a visualization of `results` against `model`.
///
/// Callers treat a failure here as non-fatal; the numeric results stand.
pub async fn visualize(
    tools: &dyn Toolchain,
    model: &Path,
    results: &Path,
    grids_info: &Path,
    out_file: &Path,
) -> Result<VisualizationArtifact, EngineError> {
    clear_output(out_file).await?;
    match tools.visualize(model, results, grids_info, out_file).await {
        Ok(()) => {
            info!(out = %out_file.display(), "Visualization exported");
            Ok(VisualizationArtifact {
                path: out_file.to_path_buf(),
            })
        }
        Err(e) => {
            warn!(error = %e, "Visualization export failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitgrid_core::WorkUnitId;

    use crate::grid_io::read_values;

    #[tokio::test]
    async fn test_restructure_keeps_values_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let info = dir.path().join("grids_info.json");
        tokio::fs::write(&info, "[]").await.unwrap();
        let merged = dir.path().join("initial_results");
        tokio::fs::create_dir_all(&merged).await.unwrap();
        tokio::fs::write(merged.join("office.res"), "1.205000e+02\n98\n0.25\n")
            .await
            .unwrap();
        tokio::fs::write(merged.join("hall.res"), "7.0\n").await.unwrap();

        let aggregated = vec![
            AggregatedResult {
                work_unit: WorkUnitId::new("office"),
                values: vec![120.5, 98.0, 0.25],
            },
            AggregatedResult {
                work_unit: WorkUnitId::new("hall"),
                values: vec![7.0],
            },
        ];
        let dest = dir.path().join("results").join("pit");
        let folder = restructure(&aggregated, &merged, &info, &dest).await.unwrap();

        assert_eq!(folder.files.len(), 2);
        assert_eq!(
            tokio::fs::read_to_string(dest.join("office.res")).await.unwrap(),
            "1.205000e+02\n98\n0.25\n"
        );
        assert_eq!(
            read_values(&dest.join("office.res")).await.unwrap(),
            vec![120.5, 98.0, 0.25]
        );
        assert_eq!(tokio::fs::read_to_string(&folder.grids_info).await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_restructure_missing_grids_info_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = restructure(&[], dir.path(), &dir.path().join("nope.json"), dir.path()).await;
        assert!(matches!(result, Err(EngineError::Io { .. })));
    }
}
