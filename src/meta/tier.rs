//! Immutable storage layout: tiers and their directories.
//!
//! The layout is fixed when the metadata manager is constructed. Mutable
//! byte accounting lives in the manager, keyed by [`DirId`], so layout
//! references can be handed out without holding any lock.

use crate::error::{BlockStoreError, BlockStoreResult};
use crate::location::{BlockStoreLocation, TierAlias};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable arena index of a directory: position of its tier in level order
/// and position of the directory within that tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId {
    tier: usize,
    dir: usize,
}

impl DirId {
    pub(crate) const fn new(tier: usize, dir: usize) -> Self {
        Self { tier, dir }
    }

    /// Position of the owning tier in ascending level order.
    pub fn tier_index(&self) -> usize {
        self.tier
    }

    /// Index of the directory within its tier.
    pub fn dir_index(&self) -> usize {
        self.dir
    }
}

impl fmt::Display for DirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tier, self.dir)
    }
}

/// Layout input for one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSpec {
    /// Filesystem path backing the directory.
    pub path: PathBuf,
    /// Capacity in bytes.
    pub capacity: u64,
}

/// Layout input for one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSpec {
    /// Stable tier alias.
    pub alias: TierAlias,
    /// Tier level, 0 being the fastest.
    pub level: u32,
    /// Directories of this tier in index order.
    pub dirs: Vec<DirSpec>,
}

impl TierSpec {
    /// Create a tier spec with no directories.
    pub fn new(alias: TierAlias, level: u32) -> Self {
        Self {
            alias,
            level,
            dirs: Vec::new(),
        }
    }

    /// Append a directory.
    pub fn with_dir(mut self, path: impl Into<PathBuf>, capacity: u64) -> Self {
        self.dirs.push(DirSpec {
            path: path.into(),
            capacity,
        });
        self
    }
}

/// A capacity-bounded directory within a tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDir {
    id: DirId,
    tier_alias: TierAlias,
    tier_level: u32,
    path: PathBuf,
    capacity: u64,
}

impl StorageDir {
    /// Arena index of this directory.
    pub fn id(&self) -> DirId {
        self.id
    }

    /// Index within the owning tier.
    pub fn index(&self) -> usize {
        self.id.dir
    }

    /// Alias of the owning tier.
    pub fn tier_alias(&self) -> TierAlias {
        self.tier_alias
    }

    /// Level of the owning tier.
    pub fn tier_level(&self) -> u32 {
        self.tier_level
    }

    /// Backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capacity in bytes, fixed at construction.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Locator for this directory.
    pub fn location(&self) -> BlockStoreLocation {
        BlockStoreLocation::dir(self.tier_alias, self.tier_level, self.id.dir)
    }
}

/// An ordered storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTier {
    alias: TierAlias,
    level: u32,
    dirs: Vec<StorageDir>,
}

impl StorageTier {
    /// Tier alias.
    pub fn alias(&self) -> TierAlias {
        self.alias
    }

    /// Tier level.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Directories in index order.
    pub fn dirs(&self) -> &[StorageDir] {
        &self.dirs
    }

    /// Directory at `index`.
    pub fn dir(&self, index: usize) -> Option<&StorageDir> {
        self.dirs.get(index)
    }

    /// Sum of directory capacities.
    pub fn capacity(&self) -> u64 {
        self.dirs.iter().map(|d| d.capacity).sum()
    }
}

/// Validate tier specs and build the layout in hierarchy order.
///
/// Aliases must be unique, levels strictly increasing and every tier must
/// have at least one directory.
pub(crate) fn build_layout(specs: Vec<TierSpec>) -> BlockStoreResult<Vec<StorageTier>> {
    if specs.is_empty() {
        return Err(BlockStoreError::InvalidArgument(
            "at least one tier is required".to_string(),
        ));
    }

    let mut tiers: Vec<StorageTier> = Vec::with_capacity(specs.len());
    for (tier_index, spec) in specs.into_iter().enumerate() {
        if tiers.iter().any(|t| t.alias == spec.alias) {
            return Err(BlockStoreError::InvalidArgument(format!(
                "duplicate tier alias {}",
                spec.alias
            )));
        }
        if let Some(prev) = tiers.last() {
            if spec.level <= prev.level {
                return Err(BlockStoreError::InvalidArgument(format!(
                    "tier {} has level {} which does not follow level {}",
                    spec.alias, spec.level, prev.level
                )));
            }
        }
        if spec.dirs.is_empty() {
            return Err(BlockStoreError::InvalidArgument(format!(
                "tier {} has no directories",
                spec.alias
            )));
        }

        let dirs = spec
            .dirs
            .into_iter()
            .enumerate()
            .map(|(dir_index, d)| StorageDir {
                id: DirId::new(tier_index, dir_index),
                tier_alias: spec.alias,
                tier_level: spec.level,
                path: d.path,
                capacity: d.capacity,
            })
            .collect();

        tiers.push(StorageTier {
            alias: spec.alias,
            level: spec.level,
            dirs,
        });
    }

    Ok(tiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<TierSpec> {
        vec![
            TierSpec::new(1, 0).with_dir("/ramdisk", 1000),
            TierSpec::new(3, 1)
                .with_dir("/disk1", 3000)
                .with_dir("/disk2", 5000),
        ]
    }

    #[test]
    fn test_build_layout() {
        let tiers = build_layout(specs()).unwrap();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[1].alias(), 3);
        assert_eq!(tiers[1].level(), 1);
        assert_eq!(tiers[1].capacity(), 8000);

        let dir = tiers[1].dir(1).unwrap();
        assert_eq!(dir.id(), DirId::new(1, 1));
        assert_eq!(dir.capacity(), 5000);
        assert_eq!(dir.path(), Path::new("/disk2"));
        assert_eq!(dir.location(), BlockStoreLocation::dir(3, 1, 1));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let specs = vec![
            TierSpec::new(1, 0).with_dir("/a", 10),
            TierSpec::new(1, 1).with_dir("/b", 10),
        ];
        assert!(matches!(
            build_layout(specs),
            Err(BlockStoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_levels_must_increase() {
        let specs = vec![
            TierSpec::new(1, 1).with_dir("/a", 10),
            TierSpec::new(2, 1).with_dir("/b", 10),
        ];
        assert!(build_layout(specs).is_err());
    }

    #[test]
    fn test_empty_layouts_rejected() {
        assert!(build_layout(Vec::new()).is_err());
        assert!(build_layout(vec![TierSpec::new(1, 0)]).is_err());
    }
}
