//! Point-in-time usage summary for monitoring.

use crate::location::{BlockStoreLocation, TierAlias};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Usage of a single directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirUsage {
    /// Directory locator.
    pub location: BlockStoreLocation,
    /// Backing path.
    pub path: PathBuf,
    /// Capacity in bytes.
    pub capacity_bytes: u64,
    /// Committed plus temp bytes.
    pub used_bytes: u64,
    /// Number of committed blocks.
    pub block_count: usize,
    /// Number of temp blocks.
    pub temp_block_count: usize,
}

impl DirUsage {
    /// Bytes still free.
    pub fn available_bytes(&self) -> u64 {
        self.capacity_bytes - self.used_bytes
    }
}

/// Snapshot of capacity and usage per tier alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockStoreMeta {
    /// Capacity per tier alias.
    pub capacity_bytes_on_tiers: BTreeMap<TierAlias, u64>,
    /// Used bytes per tier alias.
    pub used_bytes_on_tiers: BTreeMap<TierAlias, u64>,
    /// Committed block count per tier alias.
    pub block_count_on_tiers: BTreeMap<TierAlias, usize>,
    /// Per-directory detail in hierarchy order.
    pub dirs: Vec<DirUsage>,
}

impl BlockStoreMeta {
    /// Total capacity across all tiers.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes_on_tiers.values().sum()
    }

    /// Total used bytes across all tiers.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes_on_tiers.values().sum()
    }

    /// Total committed blocks.
    pub fn block_count(&self) -> usize {
        self.block_count_on_tiers.values().sum()
    }

    /// Used capacity as a percentage (0.0 - 100.0).
    pub fn utilization(&self) -> f64 {
        let capacity = self.capacity_bytes();
        if capacity == 0 {
            0.0
        } else {
            (self.used_bytes() as f64 / capacity as f64) * 100.0
        }
    }
}
