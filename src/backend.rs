//! Byte-level storage backend.
//!
//! The metadata manager only tracks where bytes live. A [`StorageBackend`]
//! performs the matching physical work. The block store calls it outside
//! every manager lock: commits reach the backend before the metadata changes,
//! everything else after. A failed move is undone in the metadata together
//! with every later move of the same plan.

use crate::error::BlockStoreResult;
use crate::location::SessionId;
use crate::meta::{BlockMeta, TempBlockMeta};

/// Physical block operations.
///
/// Every method defaults to success so backends implement only what they
/// store.
pub trait StorageBackend: Send + Sync {
    /// Make the bytes written for a temp block durable at its final path.
    fn commit_block(&self, _session_id: SessionId, _temp: &TempBlockMeta) -> BlockStoreResult<()> {
        Ok(())
    }

    /// Discard the bytes written for a temp block.
    fn abort_block(&self, _session_id: SessionId, _temp: &TempBlockMeta) -> BlockStoreResult<()> {
        Ok(())
    }

    /// Copy a committed block from `src` to `dst` and delete the source.
    fn move_block(&self, _src: &BlockMeta, _dst: &BlockMeta) -> BlockStoreResult<()> {
        Ok(())
    }

    /// Delete a committed block.
    fn remove_block(&self, _block: &BlockMeta) -> BlockStoreResult<()> {
        Ok(())
    }
}

/// Backend that stores nothing. Used when only accounting is needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

impl StorageBackend for NoopBackend {}

