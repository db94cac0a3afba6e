//! Least-recently/frequently-used eviction.
//!
//! Every block carries a combined recency and frequency value (CRF). On each
//! access at logical time `t` the value decays and is bumped:
//!
//! ```text
//! crf(t) = crf(t_last) * F(t - t_last) + 1
//! F(x)   = (1 / attenuation_factor) ^ (step_factor * x)
//! ```
//!
//! Planning decays every value to the current time and evicts the lowest
//! first. A step factor near zero behaves like LFU, near one like LRU.

use super::planner;
use crate::error::BlockStoreResult;
use crate::events::BlockEventListener;
use crate::eviction::EvictionPlan;
use crate::location::{BlockId, BlockStoreLocation, SessionId};
use crate::meta::BlockMeta;
use crate::view::BlockMetadataManagerView;
use ahash::RandomState;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default step factor.
pub const DEFAULT_STEP_FACTOR: f64 = 0.25;

/// Default attenuation factor.
pub const DEFAULT_ATTENUATION_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
struct Crf {
    value: f64,
    updated_at: u64,
}

/// LRFU evictor state.
pub struct LrfuEvictor {
    cascading: bool,
    step_factor: f64,
    attenuation_factor: f64,
    clock: AtomicU64,
    crf: Mutex<HashMap<BlockId, Crf, RandomState>>,
}

impl LrfuEvictor {
    /// Create an evictor that knows about every block visible in `view`.
    ///
    /// Existing blocks start with a CRF of zero.
    pub fn new(
        view: &BlockMetadataManagerView<'_>,
        cascading: bool,
        step_factor: f64,
        attenuation_factor: f64,
    ) -> Self {
        let mut crf = HashMap::default();
        if let Ok(blocks) = view.evictable_blocks(&BlockStoreLocation::any_tier()) {
            for block in blocks {
                crf.insert(
                    block.block_id(),
                    Crf {
                        value: 0.0,
                        updated_at: 0,
                    },
                );
            }
        }
        Self {
            cascading,
            step_factor,
            attenuation_factor,
            clock: AtomicU64::new(0),
            crf: Mutex::new(crf),
        }
    }

    /// Whether victims are pushed to lower tiers instead of evicted.
    pub fn is_cascading(&self) -> bool {
        self.cascading
    }

    fn weight(&self, elapsed: u64) -> f64 {
        (1.0 / self.attenuation_factor).powf(self.step_factor * elapsed as f64)
    }

    fn touch(&self, block_id: BlockId) {
        let now = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        let mut crf = self.crf.lock();
        let entry = crf.entry(block_id).or_insert(Crf {
            value: 0.0,
            updated_at: now,
        });
        entry.value = entry.value * self.weight(now - entry.updated_at) + 1.0;
        entry.updated_at = now;
    }

    fn forget(&self, block_id: BlockId) {
        self.crf.lock().remove(&block_id);
    }

    /// Current CRF of a block, zero when unknown.
    pub fn crf(&self, block_id: BlockId) -> f64 {
        let now = self.clock.load(Ordering::Relaxed);
        self.crf
            .lock()
            .get(&block_id)
            .map(|c| c.value * self.weight(now.saturating_sub(c.updated_at)))
            .unwrap_or(0.0)
    }

    /// Evictable blocks, lowest CRF first.
    pub(crate) fn ordered_blocks(
        &self,
        view: &BlockMetadataManagerView<'_>,
    ) -> BlockStoreResult<Vec<BlockMeta>> {
        let blocks = view.evictable_blocks(&BlockStoreLocation::any_tier())?;
        let now = self.clock.load(Ordering::Relaxed);
        let crf = self.crf.lock();
        let mut ranked: Vec<(f64, BlockMeta)> = blocks
            .into_iter()
            .map(|block| {
                let value = crf
                    .get(&block.block_id())
                    .map(|c| c.value * self.weight(now.saturating_sub(c.updated_at)))
                    .unwrap_or(0.0);
                (value, block)
            })
            .collect();
        drop(crf);

        ranked.sort_by(|(a, x), (b, y)| {
            a.partial_cmp(b)
                .unwrap_or(CmpOrdering::Equal)
                .then(x.block_id().cmp(&y.block_id()))
        });
        Ok(ranked.into_iter().map(|(_, block)| block).collect())
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

impl BlockEventListener for LrfuEvictor {
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
