//! Error types for block store operations.

use crate::location::{BlockId, BlockStoreLocation, SessionId, TierAlias};

/// Errors that can occur while manipulating block metadata.
///
/// Variants fall into three families:
///
/// - **Not found**: a tier, directory, block or temp block referenced by id or
///   alias does not exist. See [`BlockStoreError::is_not_found`].
/// - **Out of space**: a capacity-respecting operation could not find a
///   directory with enough room. Callers are expected to evict and retry once.
/// - **Invalid argument**: the caller supplied a malformed location or size.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockStoreError {
    /// No tier is configured with this alias.
    #[error("tier with alias {0} not found")]
    TierNotFound(TierAlias),

    /// The tier exists but has no directory at this index.
    #[error("dir {dir} not found in tier with alias {alias}")]
    DirNotFound {
        /// Alias of the tier that was searched.
        alias: TierAlias,
        /// Requested directory index.
        dir: usize,
    },

    /// No committed block with this id.
    #[error("block meta not found for block {0}")]
    BlockNotFound(BlockId),

    /// No temp block with this id.
    #[error("temp block meta not found for block {0}")]
    TempBlockNotFound(BlockId),

    /// The location (or every directory in the scope) lacks room.
    #[error("location {location} does not have enough space for {bytes} bytes")]
    OutOfSpace {
        /// Requested scope.
        location: BlockStoreLocation,
        /// Bytes that could not be accommodated.
        bytes: u64,
    },

    /// Malformed location, level, size or layout.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The block id is already tracked as temp or committed.
    #[error("block {0} already exists")]
    BlockAlreadyExists(BlockId),

    /// A session touched a temp block owned by another session.
    #[error("temp block {block} is owned by session {owner}, not session {session}")]
    WrongSession {
        /// Temp block id.
        block: BlockId,
        /// Session that created the temp block.
        owner: SessionId,
        /// Session that issued the operation.
        session: SessionId,
    },

    /// An eviction plan no longer matches the manager state.
    #[error("stale eviction plan: {0}")]
    StalePlan(String),

    /// The storage backend failed a byte-level operation.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl BlockStoreError {
    /// True for the tier/dir/block/temp-block lookup failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TierNotFound(_)
                | Self::DirNotFound { .. }
                | Self::BlockNotFound(_)
                | Self::TempBlockNotFound(_)
        )
    }

    /// True when the caller should try evicting and then retry.
    pub fn is_out_of_space(&self) -> bool {
        matches!(self, Self::OutOfSpace { .. })
    }
}

/// Result type for block store operations.
pub type BlockStoreResult<T> = Result<T, BlockStoreError>;
