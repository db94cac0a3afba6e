//! Pinned block tracking.
//!
//! Blocks held open by readers must never be planned for eviction or
//! movement. The block store asks a [`PinnedBlocks`] source for the current
//! pin set each time it builds a view for planning.

use crate::location::BlockId;
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Source of the block ids currently pinned by readers.
pub trait PinnedBlocks: Send + Sync {
    /// Snapshot of the pinned block ids.
    fn pinned(&self) -> HashSet<BlockId, RandomState>;
}

/// Reference-counted pin set.
///
/// A block stays pinned until every `pin_block` is matched by an
/// `unpin_block`.
#[derive(Debug, Default)]
pub struct PinSet {
    counts: Mutex<HashMap<BlockId, usize, RandomState>>,
}

impl PinSet {
    /// Create an empty pin set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pin on `block_id`, returning the new pin count.
    pub fn pin_block(&self, block_id: BlockId) -> usize {
        let mut counts = self.counts.lock();
        let count = counts.entry(block_id).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop a pin on `block_id`, returning the remaining pin count.
    ///
    /// Unpinning a block that is not pinned is a no-op.
    pub fn unpin_block(&self, block_id: BlockId) -> usize {
        let mut counts = self.counts.lock();
        match counts.get_mut(&block_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                counts.remove(&block_id);
                0
            }
            None => 0,
        }
    }

    /// Whether `block_id` holds at least one pin.
    pub fn is_pinned(&self, block_id: BlockId) -> bool {
        self.counts.lock().contains_key(&block_id)
    }
}

impl PinnedBlocks for PinSet {
    fn pinned(&self) -> HashSet<BlockId, RandomState> {
        self.counts.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_counts() {
        let pins = PinSet::new();
        assert_eq!(pins.pin_block(1), 1);
        assert_eq!(pins.pin_block(1), 2);
        pins.pin_block(2);

        assert_eq!(pins.unpin_block(1), 1);
        assert!(pins.is_pinned(1));
        assert_eq!(pins.unpin_block(1), 0);
        assert!(!pins.is_pinned(1));
        assert_eq!(pins.unpin_block(1), 0);

        let pinned = pins.pinned();
        assert_eq!(pinned.len(), 1);
        assert!(pinned.contains(&2));
    }
}
