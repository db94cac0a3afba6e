//! Greedy eviction.
//!
//! Keeps no access history. Picks the first directory whose free plus
//! evictable bytes cover the request, takes its blocks in block id order and
//! tries to place each victim in a lower tier before evicting it.

use super::planner;
use crate::error::BlockStoreResult;
use crate::events::BlockEventListener;
use crate::eviction::EvictionPlan;
use crate::location::BlockStoreLocation;
use crate::view::BlockMetadataManagerView;

/// Stateless greedy evictor.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyEvictor;

impl GreedyEvictor {
    /// Create a greedy evictor.
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn free_space_with_view(
        &self,
        bytes: u64,
        location: &BlockStoreLocation,
        view: &BlockMetadataManagerView<'_>,
    ) -> BlockStoreResult<Option<EvictionPlan>> {
        planner::plan_greedy(view, bytes, location)
    }
}

impl BlockEventListener for GreedyEvictor {}
