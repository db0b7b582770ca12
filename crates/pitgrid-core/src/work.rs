//! Work units, chunks and the redistribution manifest.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::error::CoreError;
use crate::ids::{ChunkId, WorkUnitId};

/// One sensor grid: an identified, immutable quantity of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Unique grid identifier.
    pub id: WorkUnitId,

    /// Display name of the grid.
    pub name: String,

    /// Number of sensor points.
    pub item_count: usize,

    /// Location of the grid's sensor file.
    pub source: PathBuf,
}

impl WorkUnit {
    /// Create a new WorkUnit named after its identifier.
    pub fn new(id: impl Into<WorkUnitId>, item_count: usize, source: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            item_count,
            source: source.into(),
        }
    }

    /// Builder method to set a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A contiguous slice of one work unit's items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Parent work unit and chunk index.
    pub id: ChunkId,

    /// Offset of the chunk's first item within its parent.
    pub start: usize,

    /// Number of items in this chunk.
    pub count: usize,
}

impl Chunk {
    /// One past the offset of the last item.
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    /// Flat identifier used in file names.
    pub fn full_id(&self) -> String {
        self.id.full_id()
    }

    /// Sensor file of this chunk, relative to the chunk grid folder.
    pub fn grid_file(&self) -> PathBuf {
        PathBuf::from(format!("{}.pts", self.full_id()))
    }

    /// Result file of this chunk, relative to the chunk result folder.
    pub fn result_file(&self) -> PathBuf {
        PathBuf::from(format!("{}.res", self.full_id()))
    }
}

/// Wire record for one chunk: `{full_id, name, count, path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub full_id: String,
    pub name: String,
    pub count: usize,
    pub path: String,
}

/// How one work unit was split; persisted alongside the chunk records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDistribution {
    pub work_unit: WorkUnit,
    /// `(start, end)` item ranges, one per chunk in index order.
    pub ranges: Vec<(usize, usize)>,
}

/// The ordered set of chunks produced by one partitioning pass.
///
/// Work units appear in input order; chunks follow their work unit order,
/// then ascending index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedistributionManifest {
    work_units: Vec<WorkUnit>,
    chunks: Vec<Chunk>,
}

impl RedistributionManifest {
    /// Assemble a manifest, checking that every work unit is reconstructed
    /// exactly by its chunks.
    pub fn new(work_units: Vec<WorkUnit>, chunks: Vec<Chunk>) -> Result<Self, CoreError> {
        let manifest = Self { work_units, chunks };
        manifest.verify()?;
        Ok(manifest)
    }

    /// Work units covered by this manifest.
    pub fn work_units(&self) -> &[WorkUnit] {
        &self.work_units
    }

    /// All chunks in manifest order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of chunks (the fan-out width).
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if the manifest has no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Look up a work unit.
    pub fn work_unit(&self, id: &WorkUnitId) -> Option<&WorkUnit> {
        self.work_units.iter().find(|w| &w.id == id)
    }

    /// Chunks of one work unit in index order.
    pub fn chunks_of<'a>(&'a self, id: &'a WorkUnitId) -> impl Iterator<Item = &'a Chunk> + 'a {
        self.chunks.iter().filter(move |c| &c.id.work_unit == id)
    }

    /// Look up a chunk by its flat identifier.
    pub fn chunk_by_full_id(&self, full_id: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.full_id() == full_id)
    }

    /// Chunk records in wire format. `grid_dir` prefixes each record path.
    pub fn to_records(&self, grid_dir: &str) -> Vec<ManifestRecord> {
        self.chunks
            .iter()
            .map(|c| {
                let name = self
                    .work_unit(&c.id.work_unit)
                    .map(|w| w.name.clone())
                    .unwrap_or_else(|| c.id.work_unit.to_string());
                let file = c.grid_file();
                let path = if grid_dir.is_empty() {
                    file.display().to_string()
                } else {
                    format!("{}/{}", grid_dir.trim_end_matches('/'), file.display())
                };
                ManifestRecord {
                    full_id: c.full_id(),
                    name,
                    count: c.count,
                    path,
                }
            })
            .collect()
    }

    /// Per-unit distribution info.
    pub fn distribution(&self) -> Vec<UnitDistribution> {
        self.work_units
            .iter()
            .map(|w| UnitDistribution {
                work_unit: w.clone(),
                ranges: self.chunks_of(&w.id).map(|c| (c.start, c.end())).collect(),
            })
            .collect()
    }

    /// Rebuild a manifest from persisted distribution info.
    pub fn from_distribution(dist: Vec<UnitDistribution>) -> Result<Self, CoreError> {
        let mut work_units = Vec::with_capacity(dist.len());
        let mut chunks = Vec::new();
        for unit in dist {
            for (index, (start, end)) in unit.ranges.iter().copied().enumerate() {
                if end < start {
                    return Err(CoreError::Serialization(format!(
                        "chunk {} has inverted range {}..{}",
                        ChunkId::new(unit.work_unit.id.clone(), index),
                        start,
                        end
                    )));
                }
                chunks.push(Chunk {
                    id: ChunkId::new(unit.work_unit.id.clone(), index),
                    start,
                    count: end - start,
                });
            }
            work_units.push(unit.work_unit);
        }
        Self::new(work_units, chunks)
    }

    /// Check identity and conservation: no unknown parents, contiguous
    /// chunk ranges starting at zero, item counts adding up per unit.
    pub fn verify(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for unit in &self.work_units {
            if !seen.insert(&unit.id) {
                return Err(CoreError::DuplicateWorkUnit(unit.id.clone()));
            }
        }

        let mut next_offset: HashMap<&WorkUnitId, (usize, usize)> = HashMap::new();
        for chunk in &self.chunks {
            if !seen.contains(&chunk.id.work_unit) {
                return Err(CoreError::OrphanChunk(chunk.id.clone()));
            }
            let (expected_index, expected_start) =
                next_offset.entry(&chunk.id.work_unit).or_insert((0, 0));
            if chunk.id.index != *expected_index || chunk.start != *expected_start {
                return Err(CoreError::PartitionInvariant {
                    work_unit: chunk.id.work_unit.clone(),
                    expected: *expected_start,
                    actual: chunk.start,
                });
            }
            *expected_index += 1;
            *expected_start = chunk.end();
        }

        for unit in &self.work_units {
            let covered = next_offset.get(&unit.id).map(|(_, end)| *end);
            match covered {
                Some(end) if end == unit.item_count => {}
                Some(end) => {
                    return Err(CoreError::PartitionInvariant {
                        work_unit: unit.id.clone(),
                        expected: unit.item_count,
                        actual: end,
                    })
                }
                None => {
                    return Err(CoreError::PartitionInvariant {
                        work_unit: unit.id.clone(),
                        expected: unit.item_count,
                        actual: 0,
                    })
                }
            }
        }
        Ok(())
    }
}
