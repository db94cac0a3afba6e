//! Committed and temp block metadata.

use crate::location::{BlockId, BlockStoreLocation, SessionId};
use crate::meta::tier::{DirId, StorageDir};

/// Metadata of a committed block.
///
/// This is a value snapshot: a move produces a new `BlockMeta` with the new
/// location and the previous value no longer describes the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockMeta {
    block_id: BlockId,
    size: u64,
    dir: DirId,
    location: BlockStoreLocation,
}

impl BlockMeta {
    pub(crate) fn new(block_id: BlockId, size: u64, dir: &StorageDir) -> Self {
        Self {
            block_id,
            size,
            dir: dir.id(),
            location: dir.location(),
        }
    }

    pub(crate) fn from_temp(temp: &TempBlockMeta) -> Self {
        Self {
            block_id: temp.block_id,
            size: temp.size,
            dir: temp.dir,
            location: temp.location,
        }
    }

    /// Block id.
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Arena index of the owning directory.
    pub fn dir_id(&self) -> DirId {
        self.dir
    }

    /// Physical location (always a specific directory).
    pub fn location(&self) -> BlockStoreLocation {
        self.location
    }
}

/// Metadata of a block under active write.
///
/// The size grows while the owning session streams data; only
/// [`crate::BlockMetadataManager::resize_temp_block_meta`] changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempBlockMeta {
    session_id: SessionId,
    block_id: BlockId,
    size: u64,
    dir: DirId,
    location: BlockStoreLocation,
}

impl TempBlockMeta {
    /// Describe a temp block of `initial_size` bytes to be placed in `dir`.
    pub fn new(session_id: SessionId, block_id: BlockId, initial_size: u64, dir: &StorageDir) -> Self {
        Self {
            session_id,
            block_id,
            size: initial_size,
            dir: dir.id(),
            location: dir.location(),
        }
    }

    /// Owning session.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Block id.
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Bytes currently reserved.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Arena index of the owning directory.
    pub fn dir_id(&self) -> DirId {
        self.dir
    }

    /// Physical location (always a specific directory).
    pub fn location(&self) -> BlockStoreLocation {
        self.location
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
    }
}
