//! tierstore: worker-side tiered block metadata and eviction planning.
//!
//! A worker stores fixed blocks across a hierarchy of storage tiers (memory,
//! SSD, HDD), each made of one or more capacity-bounded directories. This
//! crate tracks where every block lives, reserves space for blocks under
//! write, and plans which blocks to evict or demote when a tier fills up.
//!
//! - **Locations**: `BlockStoreLocation` addresses a directory or a scope
//! - **Metadata**: `StorageTier`, `StorageDir`, `BlockMeta`, `TempBlockMeta`
//! - **Manager**: `BlockMetadataManager`, the source of truth for accounting
//! - **View**: `BlockMetadataManagerView`, the manager minus pinned blocks
//! - **Eviction**: `Evictor` (LRU, LRFU, Greedy) producing `EvictionPlan`s
//! - **Store**: `TieredBlockStore`, the allocate / evict / retry path
//!
//! # Architecture
//!
//! ```text
//!                  +--------------------+
//!                  |  TieredBlockStore  |
//!                  +---------+----------+
//!          allocate / move   |    free_space
//!        +-------------------+-------------------+
//!        v                                       v
//! +---------------+      read-only      +------------------+
//! | BlockMetadata | <------------------ | BlockMetadata    |
//! | Manager       |                     | ManagerView      |
//! |               |                     | (minus pinned)   |
//! | tier 0  dirs  |                     +--------+---------+
//! | tier 1  dirs  |                              |
//! | ...           |                              v
//! |               |    execute_plan     +------------------+
//! |               | <------------------ |     Evictor      |
//! +---------------+    EvictionPlan     +------------------+
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tierstore::*;
//!
//! let store = TieredBlockStore::builder(vec![
//!     TierSpec::new(1, 0).with_dir("/mnt/ramdisk", 1 << 30),
//!     TierSpec::new(3, 1).with_dir("/mnt/disk1", 8 << 30),
//! ])
//! .evictor(EvictorConfig::new(EvictorKind::Lru).with_cascading(true))
//! .build()?;
//!
//! let temp = store.create_block_meta(session, block, &BlockStoreLocation::any_tier(), 4096)?;
//! store.commit_block(session, temp.block_id())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core types
mod error;
mod location;
mod meta;

pub use error::{BlockStoreError, BlockStoreResult};
pub use location::{BlockId, BlockStoreLocation, SessionId, TierAlias};
pub use meta::{
    BlockMeta, BlockStoreMeta, DirId, DirSpec, DirUsage, StorageDir, StorageTier, TempBlockMeta,
    TierSpec,
};

// Accounting
mod manager;
mod view;

pub use manager::BlockMetadataManager;
pub use view::{BlockMetadataManagerView, Exclusions};

// Eviction
mod events;
mod eviction;

pub use events::BlockEventListener;
pub use eviction::{
    BlockTransferInfo, DEFAULT_ATTENUATION_FACTOR, DEFAULT_STEP_FACTOR, EvictionPlan, Evictor,
    EvictorConfig, EvictorKind, ExecutedPlan, GreedyEvictor, LrfuEvictor, LruEvictor,
};

// Block store
mod backend;
mod pin;
mod store;

pub use backend::{NoopBackend, StorageBackend};
pub use pin::{PinSet, PinnedBlocks};
pub use store::{DEFAULT_PLAN_RETRIES, TieredBlockStore, TieredBlockStoreBuilder};

// Ambient
pub mod config;
pub mod logging;
mod metrics;
