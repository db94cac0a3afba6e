//! Filtered, read-only view of the metadata manager used for eviction planning.
//!
//! A view hides blocks that must not be evicted (pinned by readers) and
//! directories excluded by policy. It holds only the manager reference and
//! the exclusion set: every query reads current manager state, so totals
//! can never drift from the manager. Views are built fresh per planning call.

use crate::error::{BlockStoreError, BlockStoreResult};
use crate::location::{BlockId, BlockStoreLocation, TierAlias};
use crate::manager::BlockMetadataManager;
use crate::meta::{BlockMeta, DirId, StorageDir, StorageTier};
use ahash::RandomState;
use std::collections::HashSet;

/// Blocks and directories hidden from eviction planning.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    blocks: HashSet<BlockId, RandomState>,
    dirs: HashSet<DirId, RandomState>,
}

impl Exclusions {
    /// Exclude nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude the given blocks.
    pub fn with_blocks(mut self, blocks: impl IntoIterator<Item = BlockId>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    /// Exclude the given directories.
    pub fn with_dirs(mut self, dirs: impl IntoIterator<Item = DirId>) -> Self {
        self.dirs.extend(dirs);
        self
    }

    /// Whether `block_id` is hidden.
    pub fn is_block_excluded(&self, block_id: BlockId) -> bool {
        self.blocks.contains(&block_id)
    }

    /// Whether `dir` is hidden.
    pub fn is_dir_excluded(&self, dir: DirId) -> bool {
        self.dirs.contains(&dir)
    }
}

/// Read-only projection of a [`BlockMetadataManager`] without excluded
/// blocks and directories.
pub struct BlockMetadataManagerView<'a> {
    manager: &'a BlockMetadataManager,
    exclusions: Exclusions,
}

impl<'a> BlockMetadataManagerView<'a> {
    /// Create a view over `manager` hiding `exclusions`.
    pub fn new(manager: &'a BlockMetadataManager, exclusions: Exclusions) -> Self {
        Self {
            manager,
            exclusions,
        }
    }

    /// The underlying manager.
    pub fn manager(&self) -> &'a BlockMetadataManager {
        self.manager
    }

    /// The exclusion set.
    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    /// All tiers in ascending level order.
    pub fn tiers(&self) -> &'a [StorageTier] {
        self.manager.tiers()
    }

    /// Tier with the given alias.
    pub fn tier(&self, alias: TierAlias) -> BlockStoreResult<&'a StorageTier> {
        self.manager.tier(alias)
    }

    /// Tier following `alias`, if any.
    pub fn next_tier(&self, alias: TierAlias) -> BlockStoreResult<Option<&'a StorageTier>> {
        self.manager.next_tier(alias)
    }

    /// Tiers strictly below `level`.
    pub fn tiers_below(&self, level: u32) -> &'a [StorageTier] {
        self.manager.tiers_below(level)
    }

    /// Whether `dir` is visible in this view.
    pub fn is_dir_visible(&self, dir: DirId) -> bool {
        !self.exclusions.is_dir_excluded(dir)
    }

    /// Visible directories matching `scope`, in hierarchy order.
    pub fn dirs_in(&self, scope: &BlockStoreLocation) -> BlockStoreResult<Vec<&'a StorageDir>> {
        let mut dirs = self.manager.dirs_in(scope)?;
        dirs.retain(|dir| self.is_dir_visible(dir.id()));
        Ok(dirs)
    }

    /// Free bytes over the visible directories matching `scope`.
    pub fn available_bytes(&self, scope: &BlockStoreLocation) -> BlockStoreResult<u64> {
        Ok(self
            .dirs_in(scope)?
            .iter()
            .map(|dir| self.manager.dir_available_bytes(dir.id()))
            .sum())
    }

    /// Free bytes in one directory.
    pub fn dir_available_bytes(&self, dir: &StorageDir) -> u64 {
        self.manager.dir_available_bytes(dir.id())
    }

    /// Evictable blocks of one directory in ascending block id order.
    ///
    /// Empty when the directory is excluded.
    pub fn dir_evictable_blocks(&self, dir: &StorageDir) -> Vec<BlockMeta> {
        if !self.is_dir_visible(dir.id()) {
            return Vec::new();
        }
        let mut blocks = self.manager.dir_blocks(dir.id());
        blocks.retain(|b| !self.exclusions.is_block_excluded(b.block_id()));
        blocks
    }

    /// Evictable blocks of every visible directory matching `scope`.
    pub fn evictable_blocks(&self, scope: &BlockStoreLocation) -> BlockStoreResult<Vec<BlockMeta>> {
        Ok(self
            .dirs_in(scope)?
            .into_iter()
            .flat_map(|dir| self.dir_evictable_blocks(dir))
            .collect())
    }

    /// Bytes held by evictable blocks in one directory.
    pub fn dir_evictable_bytes(&self, dir: &StorageDir) -> u64 {
        self.dir_evictable_blocks(dir).iter().map(|b| b.size()).sum()
    }

    /// Bytes held by evictable blocks matching `scope`.
    pub fn evictable_bytes(&self, scope: &BlockStoreLocation) -> BlockStoreResult<u64> {
        Ok(self
            .evictable_blocks(scope)?
            .iter()
            .map(|b| b.size())
            .sum())
    }

    /// Metadata of a visible, evictable block.
    ///
    /// Excluded blocks and blocks in excluded directories are reported as
    /// not found.
    pub fn block_meta(&self, block_id: BlockId) -> BlockStoreResult<BlockMeta> {
        if self.exclusions.is_block_excluded(block_id) {
            return Err(BlockStoreError::BlockNotFound(block_id));
        }
        let block = self.manager.block_meta(block_id)?;
        if !self.is_dir_visible(block.dir_id()) {
            return Err(BlockStoreError::BlockNotFound(block_id));
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{TempBlockMeta, TierSpec};

    fn manager() -> BlockMetadataManager {
        let manager = BlockMetadataManager::new(vec![
            TierSpec::new(1, 0).with_dir("/ramdisk", 1000),
            TierSpec::new(3, 1)
                .with_dir("/disk1", 3000)
                .with_dir("/disk2", 5000),
        ])
        .unwrap();

        for (block_id, size, loc) in [
            (1, 100, BlockStoreLocation::dir(1, 0, 0)),
            (2, 200, BlockStoreLocation::dir(1, 0, 0)),
            (3, 300, BlockStoreLocation::dir(3, 1, 1)),
        ] {
            let dir = manager.dir(&loc).unwrap();
            let temp = TempBlockMeta::new(1, block_id, size, dir);
            manager.add_temp_block_meta(&temp).unwrap();
            manager.commit_temp_block_meta(&temp).unwrap();
        }
        manager
    }

    #[test]
    fn test_unfiltered_view_matches_manager() {
        let manager = manager();
        let view = BlockMetadataManagerView::new(&manager, Exclusions::new());

        let any = BlockStoreLocation::any_tier();
        assert_eq!(
            view.available_bytes(&any).unwrap(),
            manager.available_bytes(&any).unwrap()
        );
        assert_eq!(view.evictable_bytes(&any).unwrap(), 600);
        assert_eq!(view.block_meta(3).unwrap().size(), 300);
    }

    #[test]
    fn test_pinned_blocks_hidden() {
        let manager = manager();
        let view = BlockMetadataManagerView::new(&manager, Exclusions::new().with_blocks([2]));

        assert!(view.block_meta(2).unwrap_err().is_not_found());
        let ids: Vec<_> = view
            .evictable_blocks(&BlockStoreLocation::any_dir_in_tier(1))
            .unwrap()
            .iter()
            .map(|b| b.block_id())
            .collect();
        assert_eq!(ids, vec![1]);

        // pinned bytes still occupy space
        assert_eq!(
            view.available_bytes(&BlockStoreLocation::dir(1, 0, 0))
                .unwrap(),
            700
        );
    }

    #[test]
    fn test_excluded_dirs_hidden() {
        let manager = manager();
        let excluded = manager.dir(&BlockStoreLocation::dir(3, 1, 1)).unwrap().id();
        let view = BlockMetadataManagerView::new(&manager, Exclusions::new().with_dirs([excluded]));

        assert_eq!(
            view.available_bytes(&BlockStoreLocation::any_dir_in_tier(3))
                .unwrap(),
            3000
        );
        assert_eq!(view.dirs_in(&BlockStoreLocation::any_tier()).unwrap().len(), 2);
        assert!(view.block_meta(3).is_err());
        assert_eq!(
            view.evictable_bytes(&BlockStoreLocation::any_tier()).unwrap(),
            300
        );
    }

    #[test]
    fn test_view_tracks_manager_changes() {
        let manager = manager();
        let view = BlockMetadataManagerView::new(&manager, Exclusions::new());
        let loc = BlockStoreLocation::dir(1, 0, 0);
        assert_eq!(view.available_bytes(&loc).unwrap(), 700);

        let block = manager.block_meta(1).unwrap();
        manager.remove_block_meta(&block).unwrap();
        assert_eq!(view.available_bytes(&loc).unwrap(), 800);
    }
}
