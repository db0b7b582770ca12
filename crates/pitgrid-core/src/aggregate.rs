//! Fan-in: merging chunk results back into one result per work unit.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::CoreError;
use crate::ids::{ChunkId, WorkUnitId};
use crate::work::RedistributionManifest;

/// Simulation output for one chunk, one value per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk: ChunkId,
    pub values: Vec<f64>,
}

impl ChunkResult {
    /// Create a new ChunkResult.
    pub fn new(chunk: ChunkId, values: Vec<f64>) -> Self {
        Self { chunk, values }
    }
}

/// Merged output for one work unit, named after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub work_unit: WorkUnitId,
    pub values: Vec<f64>,
}

impl AggregatedResult {
    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Merge chunk results against the manifest that produced the chunks.
///
/// Every chunk listed in the manifest must have exactly one result holding
/// one value per item, and no result may name a chunk outside the manifest.
/// Any violation fails the whole merge; nothing partial is returned.
/// Output order follows the manifest's work unit order.
pub fn aggregate(
    results: &[ChunkResult],
    manifest: &RedistributionManifest,
) -> Result<Vec<AggregatedResult>, CoreError> {
    let listed: HashSet<&ChunkId> = manifest.chunks().iter().map(|c| &c.id).collect();
    let mut by_chunk: HashMap<&ChunkId, &ChunkResult> = HashMap::with_capacity(results.len());
    for result in results {
        if !listed.contains(&result.chunk) {
            return Err(CoreError::UnexpectedChunkResult(result.chunk.clone()));
        }
        if by_chunk.insert(&result.chunk, result).is_some() {
            return Err(CoreError::DuplicateChunkResult(result.chunk.clone()));
        }
    }

    let mut merged = Vec::with_capacity(manifest.work_units().len());
    for unit in manifest.work_units() {
        let mut values = Vec::with_capacity(unit.item_count);
        for chunk in manifest.chunks_of(&unit.id) {
            let result = by_chunk
                .get(&chunk.id)
                .ok_or_else(|| CoreError::MissingChunkResult {
                    work_unit: unit.id.clone(),
                    chunk: chunk.id.clone(),
                })?;
            if result.values.len() != chunk.count {
                return Err(CoreError::ChunkCountMismatch {
                    chunk: chunk.id.clone(),
                    expected: chunk.count,
                    actual: result.values.len(),
                });
            }
            values.extend_from_slice(&result.values);
        }

        if values.len() != unit.item_count {
            return Err(CoreError::ItemCountMismatch {
                work_unit: unit.id.clone(),
                expected: unit.item_count,
                actual: values.len(),
            });
        }

        merged.push(AggregatedResult {
            work_unit: unit.id.clone(),
            values,
        });
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{partition, PartitionStrategy};
    use crate::work::WorkUnit;

    fn manifest() -> RedistributionManifest {
        let units = [WorkUnit::new("g1", 5, "g1.pts"), WorkUnit::new("g2", 2, "g2.pts")];
        partition(&units, PartitionStrategy::balanced(4, 1, 2)).unwrap()
    }

    fn results_for(manifest: &RedistributionManifest) -> Vec<ChunkResult> {
        manifest
            .chunks()
            .iter()
            .map(|c| ChunkResult::new(c.id.clone(), (c.start..c.end()).map(|i| i as f64).collect()))
            .collect()
    }

    #[test]
    fn test_merges_in_chunk_order() {
        let manifest = manifest();
        let mut results = results_for(&manifest);
        results.reverse();

        let merged = aggregate(&results, &manifest).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].work_unit, WorkUnitId::new("g1"));
        assert_eq!(merged[0].values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(merged[1].values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_idempotent() {
        let manifest = manifest();
        let results = results_for(&manifest);
        let first = aggregate(&results, &manifest).unwrap();
        let second = aggregate(&results, &manifest).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_chunk_is_fatal() {
        let manifest = RedistributionManifest::new(
            vec![WorkUnit::new("g1", 4, "g1.pts")],
            vec![
                crate::work::Chunk { id: ChunkId::new("g1", 0), start: 0, count: 2 },
                crate::work::Chunk { id: ChunkId::new("g1", 1), start: 2, count: 2 },
            ],
        )
        .unwrap();
        let results = vec![ChunkResult::new(ChunkId::new("g1", 0), vec![1.0, 2.0])];

        match aggregate(&results, &manifest) {
            Err(CoreError::MissingChunkResult { work_unit, chunk }) => {
                assert_eq!(work_unit, WorkUnitId::new("g1"));
                assert_eq!(chunk, ChunkId::new("g1", 1));
            }
            other => panic!("expected missing chunk error, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_chunk_is_fatal() {
        let manifest = manifest();
        let mut results = results_for(&manifest);
        results.push(ChunkResult::new(ChunkId::new("g1", 9), vec![]));
        assert!(matches!(
            aggregate(&results, &manifest),
            Err(CoreError::UnexpectedChunkResult(_))
        ));

        let mut results = results_for(&manifest);
        results.push(ChunkResult::new(ChunkId::new("stale", 0), vec![1.0]));
        assert!(matches!(
            aggregate(&results, &manifest),
            Err(CoreError::UnexpectedChunkResult(_))
        ));
    }

    #[test]
    fn test_merges_many_chunks() {
        let units: Vec<WorkUnit> = (0..50)
            .map(|i| WorkUnit::new(format!("grid{}", i), 400, format!("grid{}.pts", i)))
            .collect();
        let manifest = partition(&units, PartitionStrategy::FixedSize { max_items: 2 }).unwrap();
        assert_eq!(manifest.len(), 10_000);

        let merged = aggregate(&results_for(&manifest), &manifest).unwrap();
        assert_eq!(merged.len(), 50);
        assert!(merged.iter().all(|r| r.len() == 400));
        assert_eq!(merged[49].values[399], 399.0);
    }

    #[test]
    fn test_duplicate_chunk_is_fatal() {
        let manifest = manifest();
        let mut results = results_for(&manifest);
        results.push(results[0].clone());
        assert!(matches!(
            aggregate(&results, &manifest),
            Err(CoreError::DuplicateChunkResult(_))
        ));
    }

    #[test]
    fn test_short_chunk_is_fatal() {
        let manifest = manifest();
        let mut results = results_for(&manifest);
        results[0].values.pop();
        assert!(matches!(
            aggregate(&results, &manifest),
            Err(CoreError::ChunkCountMismatch { .. })
        ));
    }
}
