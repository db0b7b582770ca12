//! Reading and writing sensor grids, manifests and result files.
//!
//! Sensor files hold one sensor per line; result files hold one numeric
//! value per line in sensor order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use pitgrid_core::{
    ChunkId, ChunkResult, CoreError, RedistributionManifest, UnitDistribution, WorkUnit,
};

use crate::error::EngineError;

/// Name of the grid list inside a grid folder.
pub const GRID_INFO_FILE: &str = "_info.json";

/// One entry of a grid folder's `_info.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRecord {
    pub full_id: String,
    #[serde(default)]
    pub name: String,
    pub count: usize,
}

/// Load the work units listed in `grid_dir/_info.json`.
pub async fn load_work_units(grid_dir: &Path) -> Result<Vec<WorkUnit>, EngineError> {
    let info = grid_dir.join(GRID_INFO_FILE);
    let records: Vec<GridRecord> = read_json(&info).await?;
    let units = records
        .into_iter()
        .map(|r| {
            let source = grid_dir.join(format!("{}.pts", r.full_id));
            let name = if r.name.is_empty() { r.full_id.clone() } else { r.name };
            WorkUnit::new(r.full_id, r.count, source).with_name(name)
        })
        .collect::<Vec<_>>();
    debug!(grid_dir = %grid_dir.display(), grids = units.len(), "Loaded grid list");
    Ok(units)
}

/// Write one sensor file per chunk into `out_dir` plus its `_info.json`.
///
/// Each parent file must hold exactly the number of sensors its work unit
/// declares.
pub async fn write_chunk_grids(
    manifest: &RedistributionManifest,
    out_dir: &Path,
) -> Result<(), EngineError> {
    fs::create_dir_all(out_dir)
        .await
        .map_err(|e| EngineError::io(out_dir, e))?;

    for unit in manifest.work_units() {
        let text = fs::read_to_string(&unit.source)
            .await
            .map_err(|e| EngineError::io(&unit.source, e))?;
        let sensors: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if sensors.len() != unit.item_count {
            return Err(CoreError::ItemCountMismatch {
                work_unit: unit.id.clone(),
                expected: unit.item_count,
                actual: sensors.len(),
            }
            .into());
        }

        for chunk in manifest.chunks_of(&unit.id) {
            let path = out_dir.join(chunk.grid_file());
            let mut body = sensors[chunk.start..chunk.end()].join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            fs::write(&path, body)
                .await
                .map_err(|e| EngineError::io(&path, e))?;
        }
        debug!(work_unit = %unit.id, "Wrote chunk sensor files");
    }

    let records = manifest.to_records("");
    write_json(&out_dir.join(GRID_INFO_FILE), &records).await?;
    info!(
        grids = manifest.work_units().len(),
        chunks = manifest.len(),
        out_dir = %out_dir.display(),
        "Chunk grids written"
    );
    Ok(())
}

/// Persist per-unit chunk ranges.
pub async fn write_redist_info(
    manifest: &RedistributionManifest,
    path: &Path,
) -> Result<(), EngineError> {
    write_json(path, &manifest.distribution()).await
}

/// Rebuild a manifest from persisted chunk ranges.
pub async fn read_redist_info(path: &Path) -> Result<RedistributionManifest, EngineError> {
    let dist: Vec<UnitDistribution> = read_json(path).await?;
    Ok(RedistributionManifest::from_distribution(dist)?)
}

/// Read a result file.
pub async fn read_values(path: &Path) -> Result<Vec<f64>, EngineError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| EngineError::io(path, e))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            line.trim().parse::<f64>().map_err(|e| EngineError::Malformed {
                path: path.to_path_buf(),
                reason: format!("line {}: {}", n + 1, e),
            })
        })
        .collect()
}

/// Concatenate result files into `dest`, keeping each value's text as
/// written. Blank lines are dropped.
pub async fn concat_values(sources: &[PathBuf], dest: &Path) -> Result<(), EngineError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineError::io(parent, e))?;
    }
    let mut body = String::new();
    for source in sources {
        let text = fs::read_to_string(source)
            .await
            .map_err(|e| EngineError::io(source, e))?;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            body.push_str(line);
            body.push('\n');
        }
    }
    fs::write(dest, body)
        .await
        .map_err(|e| EngineError::io(dest, e))
}

/// Remove `path` if it exists.
pub async fn clear_output(path: &Path) -> Result<(), EngineError> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::io(path, e)),
    }
}

/// Collect every chunk result file (`{full_id}.res`) in `dir`.
///
/// Files whose stem is not a chunk identifier are ignored. Results come
/// back sorted by chunk id.
pub async fn read_chunk_results(dir: &Path) -> Result<Vec<ChunkResult>, EngineError> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| EngineError::io(dir, e))?;
    let mut found: Vec<(ChunkId, PathBuf)> = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| EngineError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("res") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match ChunkId::parse_full_id(stem) {
            Some(id) => found.push((id, path)),
            None => warn!(path = %path.display(), "Ignoring result file with no chunk id"),
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));

    let mut results = Vec::with_capacity(found.len());
    for (id, path) in found {
        results.push(ChunkResult::new(id, read_values(&path).await?));
    }
    Ok(results)
}

/// Copy a file, creating the destination folder.
pub async fn copy_file(from: &Path, to: &Path) -> Result<(), EngineError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineError::io(parent, e))?;
    }
    fs::copy(from, to)
        .await
        .map_err(|e| EngineError::io(from, e))?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| EngineError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| EngineError::json(path, e))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineError::io(parent, e))?;
    }
    let text = serde_json::to_string_pretty(value).map_err(|e| EngineError::json(path, e))?;
    fs::write(path, text)
        .await
        .map_err(|e| EngineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitgrid_core::{partition, PartitionStrategy};

    async fn grid_folder(dir: &Path, grids: &[(&str, usize)]) {
        let records: Vec<GridRecord> = grids
            .iter()
            .map(|(id, count)| GridRecord {
                full_id: id.to_string(),
                name: String::new(),
                count: *count,
            })
            .collect();
        for (id, count) in grids {
            let lines: String = (0..*count).map(|i| format!("{} 0 0 0 0 1\n", i)).collect();
            fs::write(dir.join(format!("{}.pts", id)), lines).await.unwrap();
        }
        write_json(&dir.join(GRID_INFO_FILE), &records).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_and_split_grids() {
        let dir = tempfile::tempdir().unwrap();
        grid_folder(dir.path(), &[("office", 5), ("hall", 2)]).await;

        let units = load_work_units(dir.path()).await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "office");
        assert_eq!(units[0].item_count, 5);

        let manifest = partition(&units, PartitionStrategy::FixedSize { max_items: 2 }).unwrap();
        let out = dir.path().join("chunks");
        write_chunk_grids(&manifest, &out).await.unwrap();

        let last = fs::read_to_string(out.join("office_0002.pts")).await.unwrap();
        assert_eq!(last, "4 0 0 0 0 1\n");
        let records: Vec<pitgrid_core::ManifestRecord> =
            read_json(&out.join(GRID_INFO_FILE)).await.unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].full_id, "office_0000");
        assert_eq!(records[0].path, "office_0000.pts");
    }

    #[tokio::test]
    async fn test_sensor_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        grid_folder(dir.path(), &[("office", 5)]).await;
        let units = vec![WorkUnit::new("office", 6, dir.path().join("office.pts"))];
        let manifest = partition(&units, PartitionStrategy::FixedSize { max_items: 3 }).unwrap();

        let result = write_chunk_grids(&manifest, &dir.path().join("out")).await;
        assert!(matches!(
            result,
            Err(EngineError::Core(CoreError::ItemCountMismatch { expected: 6, actual: 5, .. }))
        ));
    }

    #[tokio::test]
    async fn test_redist_info_restores_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let units = vec![WorkUnit::new("a", 7, "a.pts"), WorkUnit::new("b", 3, "b.pts")];
        let manifest = partition(&units, PartitionStrategy::balanced(4, 1, 2)).unwrap();
        let path = dir.path().join("_redist_info.json");

        write_redist_info(&manifest, &path).await.unwrap();
        assert_eq!(read_redist_info(&path).await.unwrap(), manifest);
    }

    #[tokio::test]
    async fn test_values_and_chunk_results() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("g_0001.res"), "3.5\n4.0\n").await.unwrap();
        fs::write(dir.path().join("g_0000.res"), "1\n").await.unwrap();
        fs::write(dir.path().join("notes.res"), "1\n").await.unwrap();

        let results = read_chunk_results(dir.path()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk, ChunkId::new("g", 0));
        assert_eq!(results[1].values, vec![3.5, 4.0]);
    }

    #[tokio::test]
    async fn test_concat_keeps_value_text() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("g_0000.res");
        let b = dir.path().join("g_0001.res");
        fs::write(&a, "1.230000e+02\n0.500\n").await.unwrap();
        fs::write(&b, "\n  7\n").await.unwrap();

        let dest = dir.path().join("merged").join("g.res");
        concat_values(&[a, b], &dest).await.unwrap();
        assert_eq!(
            fs::read_to_string(&dest).await.unwrap(),
            "1.230000e+02\n0.500\n7\n"
        );
    }

    #[tokio::test]
    async fn test_clear_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.oct");
        fs::write(&path, "old").await.unwrap();

        clear_output(&path).await.unwrap();
        assert!(!path.exists());
        clear_output(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_value_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.res");
        fs::write(&path, "1.0\nnan-ish\n").await.unwrap();
        match read_values(&path).await {
            Err(EngineError::Malformed { reason, .. }) => assert!(reason.starts_with("line 2")),
            other => panic!("expected malformed, got {:?}", other),
        }
    }
}
