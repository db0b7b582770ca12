//! Splitting work units into bounded-size chunks.
//!
//! Two strategies exist. [`PartitionStrategy::Balanced`] sizes chunks from a
//! CPU budget with a minimum chunk size floor, and the floor always wins.
//! [`PartitionStrategy::FixedSize`] cuts every work unit into runs of at most
//! `max_items`, the last chunk holding the remainder.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::ChunkId;
use crate::work::{Chunk, RedistributionManifest, WorkUnit};

/// How to size chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum PartitionStrategy {
    /// Balance chunks across the CPU budget.
    Balanced {
        /// Total parallel slots available.
        cpu_count: usize,
        /// Slots consumed by one chunk.
        cpus_per_unit: usize,
        /// Smallest chunk worth scheduling. Takes precedence over `cpu_count`.
        min_chunk_size: usize,
    },
    /// Chunks of at most `max_items` each.
    FixedSize { max_items: usize },
}

impl PartitionStrategy {
    /// Balanced strategy.
    pub fn balanced(cpu_count: usize, cpus_per_unit: usize, min_chunk_size: usize) -> Self {
        Self::Balanced {
            cpu_count,
            cpus_per_unit,
            min_chunk_size,
        }
    }

    /// Reject out-of-range parameters.
    pub fn validate(&self) -> Result<(), CoreError> {
        match *self {
            Self::Balanced {
                cpu_count,
                cpus_per_unit,
                min_chunk_size,
            } => {
                if cpu_count < 1 {
                    return Err(CoreError::InvalidConfig("cpu_count must be at least 1".into()));
                }
                if cpus_per_unit < 1 {
                    return Err(CoreError::InvalidConfig(
                        "cpus_per_unit must be at least 1".into(),
                    ));
                }
                if min_chunk_size < 1 {
                    return Err(CoreError::InvalidConfig(
                        "min_sensor_count must be at least 1".into(),
                    ));
                }
            }
            Self::FixedSize { max_items } => {
                if max_items < 1 {
                    return Err(CoreError::InvalidConfig("sensor_count must be at least 1".into()));
                }
            }
        }
        Ok(())
    }
}

/// Number of chunks the balanced strategy gives one work unit.
///
/// `floor(cpu_count / cpus_per_unit)` slots are shared evenly between work
/// units, then capped so no chunk drops below `min_chunk_size`. Never zero.
pub fn balanced_chunk_count(
    item_count: usize,
    num_work_units: usize,
    cpu_count: usize,
    cpus_per_unit: usize,
    min_chunk_size: usize,
) -> usize {
    let slots = cpu_count / cpus_per_unit.max(1);
    let per_unit = slots / num_work_units.max(1);
    let by_size = item_count / min_chunk_size.max(1);
    per_unit.min(by_size).max(1)
}

/// Split `item_count` items into `k` ordered sizes differing by at most one.
/// The first `item_count % k` chunks take the extra item.
pub fn even_sizes(item_count: usize, k: usize) -> Vec<usize> {
    let k = k.max(1);
    let base = item_count / k;
    let extra = item_count % k;
    (0..k).map(|i| base + usize::from(i < extra)).collect()
}

fn fixed_sizes(item_count: usize, max_items: usize) -> Vec<usize> {
    if item_count == 0 {
        return vec![0];
    }
    let full = item_count / max_items;
    let mut sizes = vec![max_items; full];
    if item_count % max_items != 0 {
        sizes.push(item_count % max_items);
    }
    sizes
}

/// Partition work units into a redistribution manifest.
///
/// Manifest order follows `work_units`, then chunk index.
pub fn partition(
    work_units: &[WorkUnit],
    strategy: PartitionStrategy,
) -> Result<RedistributionManifest, CoreError> {
    strategy.validate()?;

    let mut chunks = Vec::new();
    for unit in work_units {
        let sizes = match strategy {
            PartitionStrategy::Balanced {
                cpu_count,
                cpus_per_unit,
                min_chunk_size,
            } => {
                let k = balanced_chunk_count(
                    unit.item_count,
                    work_units.len(),
                    cpu_count,
                    cpus_per_unit,
                    min_chunk_size,
                );
                even_sizes(unit.item_count, k)
            }
            PartitionStrategy::FixedSize { max_items } => fixed_sizes(unit.item_count, max_items),
        };

        let mut start = 0;
        for (index, count) in sizes.into_iter().enumerate() {
            chunks.push(Chunk {
                id: ChunkId::new(unit.id.clone(), index),
                start,
                count,
            });
            start += count;
        }

        if start != unit.item_count {
            return Err(CoreError::PartitionInvariant {
                work_unit: unit.id.clone(),
                expected: unit.item_count,
                actual: start,
            });
        }
    }

    RedistributionManifest::new(work_units.to_vec(), chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorkUnitId;

    fn unit(id: &str, count: usize) -> WorkUnit {
        WorkUnit::new(id, count, format!("{}.pts", id))
    }

    fn sizes_of(manifest: &RedistributionManifest, id: &str) -> Vec<usize> {
        let id = WorkUnitId::new(id);
        manifest.chunks_of(&id).map(|c| c.count).collect()
    }

    #[test]
    fn test_two_chunks_of_500() {
        let manifest = partition(&[unit("g", 1000)], PartitionStrategy::balanced(50, 1, 500)).unwrap();
        assert_eq!(sizes_of(&manifest, "g"), vec![500, 500]);
    }

    #[test]
    fn test_min_size_forces_single_chunk() {
        let manifest = partition(&[unit("g", 1000)], PartitionStrategy::balanced(50, 1, 2000)).unwrap();
        assert_eq!(sizes_of(&manifest, "g"), vec![1000]);
    }

    #[test]
    fn test_each_unit_gets_a_chunk_when_cpus_are_scarce() {
        let units = [unit("a", 10), unit("b", 2000), unit("c", 300)];
        let manifest = partition(&units, PartitionStrategy::balanced(4, 1, 1)).unwrap();
        for id in ["a", "b", "c"] {
            assert!(!sizes_of(&manifest, id).is_empty());
        }
        // floor(4 / 3) = 1 slot per unit
        assert_eq!(manifest.len(), 3);
    }

    #[test]
    fn test_fewer_cpus_than_units() {
        let units: Vec<_> = (0..5).map(|i| unit(&format!("g{}", i), 100)).collect();
        let manifest = partition(&units, PartitionStrategy::balanced(2, 1, 1)).unwrap();
        assert_eq!(manifest.len(), 5);
    }

    #[test]
    fn test_uneven_split_front_loads_remainder() {
        let manifest = partition(&[unit("g", 10)], PartitionStrategy::balanced(3, 1, 1)).unwrap();
        assert_eq!(sizes_of(&manifest, "g"), vec![4, 3, 3]);
        let starts: Vec<_> = manifest.chunks().iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![0, 4, 7]);
    }

    #[test]
    fn test_cpus_per_unit_divides_budget() {
        let manifest = partition(&[unit("g", 1000)], PartitionStrategy::balanced(8, 2, 1)).unwrap();
        assert_eq!(manifest.len(), 4);
    }

    #[test]
    fn test_manifest_order_follows_input() {
        let units = [unit("z", 4), unit("a", 4)];
        let manifest = partition(&units, PartitionStrategy::balanced(4, 1, 1)).unwrap();
        let ids: Vec<_> = manifest.chunks().iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, vec!["z/0", "z/1", "a/0", "a/1"]);
    }

    #[test]
    fn test_roundtrip_and_min_size_law() {
        for count in [0usize, 1, 7, 499, 500, 501, 999, 1000, 1001, 12_345] {
            for cpu in [1usize, 2, 3, 7, 50, 64] {
                for min in [1usize, 2, 10, 500, 2000] {
                    let manifest =
                        partition(&[unit("g", count)], PartitionStrategy::balanced(cpu, 1, min))
                            .unwrap();
                    let chunks = manifest.chunks();

                    let items: Vec<usize> = chunks.iter().flat_map(|c| c.start..c.end()).collect();
                    assert_eq!(items, (0..count).collect::<Vec<_>>());

                    assert!(chunks.len() == 1 || chunks.iter().all(|c| c.count >= min));

                    let max = chunks.iter().map(|c| c.count).max().unwrap_or(0);
                    let min_seen = chunks.iter().map(|c| c.count).min().unwrap_or(0);
                    assert!(max - min_seen <= 1);
                }
            }
        }
    }

    #[test]
    fn test_fixed_size_strategy() {
        let manifest =
            partition(&[unit("g", 450)], PartitionStrategy::FixedSize { max_items: 200 }).unwrap();
        assert_eq!(sizes_of(&manifest, "g"), vec![200, 200, 50]);
    }

    #[test]
    fn test_empty_unit_gets_one_empty_chunk() {
        let manifest = partition(&[unit("g", 0)], PartitionStrategy::balanced(4, 1, 1)).unwrap();
        assert_eq!(sizes_of(&manifest, "g"), vec![0]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(matches!(
            partition(&[unit("g", 1)], PartitionStrategy::balanced(0, 1, 1)),
            Err(CoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            partition(&[unit("g", 1)], PartitionStrategy::balanced(4, 1, 0)),
            Err(CoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            partition(&[unit("g", 1)], PartitionStrategy::FixedSize { max_items: 0 }),
            Err(CoreError::InvalidConfig(_))
        ));
    }
}
