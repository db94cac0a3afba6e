//! Metadata types for the tier hierarchy and the blocks it holds.
//!
//! - [`StorageTier`] / [`StorageDir`]: immutable layout, addressed by [`DirId`]
//! - [`BlockMeta`]: a committed block
//! - [`TempBlockMeta`]: a block under active write, owned by one session
//! - [`BlockStoreMeta`]: usage snapshot for monitoring

mod block;
mod store_meta;
mod tier;

pub use block::{BlockMeta, TempBlockMeta};
pub use store_meta::{BlockStoreMeta, DirUsage};
pub use tier::{DirId, DirSpec, StorageDir, StorageTier, TierSpec};

pub(crate) use tier::build_layout;
