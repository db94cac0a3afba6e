//! Block lifecycle notifications.
//!
//! The block store reports accesses and metadata changes to listeners.
//! Evictors use these notifications to keep their access-order bookkeeping
//! current; the bookkeeping is never derived from manager state.

use crate::location::{BlockId, BlockStoreLocation, SessionId};

/// Receiver of block lifecycle events.
///
/// Every method has an empty default so listeners implement only what they
/// track.
pub trait BlockEventListener: Send + Sync {
    /// A committed block was read or otherwise touched by a session.
    fn on_access_block(&self, _session_id: SessionId, _block_id: BlockId) {}

    /// A temp block was committed at `location`.
    fn on_commit_block(
        &self,
        _session_id: SessionId,
        _block_id: BlockId,
        _location: &BlockStoreLocation,
    ) {
    }

    /// A temp block was aborted.
    fn on_abort_block(&self, _session_id: SessionId, _block_id: BlockId) {}

    /// A committed block moved between directories.
    fn on_move_block(
        &self,
        _session_id: SessionId,
        _block_id: BlockId,
        _old_location: &BlockStoreLocation,
        _new_location: &BlockStoreLocation,
    ) {
    }

    /// A committed block was removed or evicted.
    fn on_remove_block(&self, _session_id: SessionId, _block_id: BlockId) {}
}
