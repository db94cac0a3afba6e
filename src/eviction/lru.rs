//! Least-recently-used eviction.
//!
//! Each access or commit stamps the block with the next value of a logical
//! clock. Planning orders evictable blocks by ascending stamp; blocks the
//! evictor has never seen sort first with stamp zero, ties broken by block id.

use super::planner;
use crate::error::BlockStoreResult;
use crate::events::BlockEventListener;
use crate::eviction::EvictionPlan;
use crate::location::{BlockId, BlockStoreLocation, SessionId};
use crate::meta::BlockMeta;
use crate::view::BlockMetadataManagerView;
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// LRU evictor state.
pub struct LruEvictor {
    cascading: bool,
    clock: AtomicU64,
    last_access: Mutex<HashMap<BlockId, u64, RandomState>>,
}

impl LruEvictor {
    /// Create an evictor that knows about every block visible in `view`.
    pub fn new(view: &BlockMetadataManagerView<'_>, cascading: bool) -> Self {
        let evictor = Self {
            cascading,
            clock: AtomicU64::new(0),
            last_access: Mutex::new(HashMap::default()),
        };
        if let Ok(blocks) = view.evictable_blocks(&BlockStoreLocation::any_tier()) {
            for block in blocks {
                evictor.touch(block.block_id());
            }
        }
        evictor
    }

    /// Whether victims are pushed to lower tiers instead of evicted.
    pub fn is_cascading(&self) -> bool {
        self.cascading
    }

    fn touch(&self, block_id: BlockId) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_access.lock().insert(block_id, tick);
    }

    fn forget(&self, block_id: BlockId) {
        self.last_access.lock().remove(&block_id);
    }

    /// Evictable blocks, least recently used first.
    pub(crate) fn ordered_blocks(
        &self,
        view: &BlockMetadataManagerView<'_>,
    ) -> BlockStoreResult<Vec<BlockMeta>> {
        let mut blocks = view.evictable_blocks(&BlockStoreLocation::any_tier())?;
        let last_access = self.last_access.lock();
        blocks.sort_by_key(|b| {
            (
                last_access.get(&b.block_id()).copied().unwrap_or(0),
                b.block_id(),
            )
        });
        Ok(blocks)
    }

    pub(crate) fn free_space_with_view(
        &self,
        bytes: u64,
        location: &BlockStoreLocation,
        view: &BlockMetadataManagerView<'_>,
    ) -> BlockStoreResult<Option<EvictionPlan>> {
        let ordered = self.ordered_blocks(view)?;
        if self.cascading {
            planner::plan_cascading(view, bytes, location, &ordered)
        } else {
            planner::plan_direct(view, bytes, location, &ordered)
        }
    }
}

impl BlockEventListener for LruEvictor {
    fn on_access_block(&self, _session_id: SessionId, block_id: BlockId) {
        self.touch(block_id);
    }

    fn on_commit_block(
        &self,
        _session_id: SessionId,
        block_id: BlockId,
        _location: &BlockStoreLocation,
    ) {
        self.touch(block_id);
    }

    fn on_abort_block(&self, _session_id: SessionId, block_id: BlockId) {
        self.forget(block_id);
    }

    fn on_remove_block(&self, _session_id: SessionId, block_id: BlockId) {
        self.forget(block_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::BlockMetadataManager;
    use crate::meta::{TempBlockMeta, TierSpec};
    use crate::view::Exclusions;

    fn manager() -> BlockMetadataManager {
        let manager =
            BlockMetadataManager::new(vec![TierSpec::new(1, 0).with_dir("/ramdisk", 300)]).unwrap();
        for block_id in 1..=3 {
            let dir = manager.dir(&BlockStoreLocation::dir(1, 0, 0)).unwrap();
            let temp = TempBlockMeta::new(1, block_id, 100, dir);
            manager.add_temp_block_meta(&temp).unwrap();
            manager.commit_temp_block_meta(&temp).unwrap();
        }
        manager
    }

    #[test]
    fn test_access_reorders() {
        let manager = manager();
        let view = BlockMetadataManagerView::new(&manager, Exclusions::new());
        let evictor = LruEvictor::new(&view, false);

        evictor.on_access_block(1, 1);
        let ids: Vec<_> = evictor
            .ordered_blocks(&view)
            .unwrap()
            .iter()
            .map(|b| b.block_id())
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let plan = evictor
            .free_space_with_view(100, &BlockStoreLocation::any_tier(), &view)
            .unwrap()
            .unwrap();
        assert_eq!(plan.to_evict().len(), 1);
        assert_eq!(plan.to_evict()[0].0, 2);
    }

    #[test]
    fn test_unknown_blocks_sort_first() {
        let manager = manager();
        let view = BlockMetadataManagerView::new(&manager, Exclusions::new());
        let evictor = LruEvictor::new(&view, false);
        evictor.on_remove_block(1, 2);

        let first = evictor.ordered_blocks(&view).unwrap()[0];
        assert_eq!(first.block_id(), 2);
    }
}
