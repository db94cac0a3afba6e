//! Eviction plans.

use crate::location::{BlockId, BlockStoreLocation};
use crate::meta::BlockMeta;
use std::fmt;

/// A block relocation within an eviction plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockTransferInfo {
    block_id: BlockId,
    src_location: BlockStoreLocation,
    dst_location: BlockStoreLocation,
}

impl BlockTransferInfo {
    /// Describe moving `block_id` from `src_location` to `dst_location`.
    ///
    /// Both locations name specific directories.
    pub fn new(
        block_id: BlockId,
        src_location: BlockStoreLocation,
        dst_location: BlockStoreLocation,
    ) -> Self {
        debug_assert!(src_location.is_specific());
        debug_assert!(dst_location.is_specific());
        Self {
            block_id,
            src_location,
            dst_location,
        }
    }

    /// Block to relocate.
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Where the block lived when the plan was computed.
    pub fn src_location(&self) -> BlockStoreLocation {
        self.src_location
    }

    /// Destination directory.
    pub fn dst_location(&self) -> BlockStoreLocation {
        self.dst_location
    }
}

/// Blocks to evict outright and blocks to relocate, produced by an
/// [`crate::Evictor`].
///
/// Entries are applied in order: every eviction first, then every move in
/// list order. Cascading plans rely on this, since a move into a lower tier
/// may depend on moves out of that tier listed before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    to_evict: Vec<(BlockId, BlockStoreLocation)>,
    to_move: Vec<BlockTransferInfo>,
}

impl EvictionPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks to evict, with the location each occupied at planning time.
    pub fn to_evict(&self) -> &[(BlockId, BlockStoreLocation)] {
        &self.to_evict
    }

    /// Blocks to relocate.
    pub fn to_move(&self) -> &[BlockTransferInfo] {
        &self.to_move
    }

    /// True when no action is needed.
    pub fn is_empty(&self) -> bool {
        self.to_evict.is_empty() && self.to_move.is_empty()
    }

    /// Ids of every block the plan touches.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.to_evict
            .iter()
            .map(|(id, _)| *id)
            .chain(self.to_move.iter().map(|m| m.block_id))
    }

    /// Whether the plan touches `block_id`.
    pub fn contains(&self, block_id: BlockId) -> bool {
        self.block_ids().any(|id| id == block_id)
    }

    pub(crate) fn evict(&mut self, block: &BlockMeta) {
        self.to_evict.push((block.block_id(), block.location()));
    }

    pub(crate) fn transfer(&mut self, block: &BlockMeta, dst_location: BlockStoreLocation) {
        self.to_move.push(BlockTransferInfo::new(
            block.block_id(),
            block.location(),
            dst_location,
        ));
    }
}

impl fmt::Display for EvictionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "evict {} block(s), move {} block(s)",
            self.to_evict.len(),
            self.to_move.len()
        )
    }
}

/// Metadata changes applied while executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutedPlan {
    /// Metadata of the evicted blocks as they were before removal.
    pub evicted: Vec<BlockMeta>,
    /// `(before, after)` metadata of every moved block.
    pub moved: Vec<(BlockMeta, BlockMeta)>,
}

impl ExecutedPlan {
    /// Bytes released by evictions.
    pub fn evicted_bytes(&self) -> u64 {
        self.evicted.iter().map(|b| b.size()).sum()
    }
}
