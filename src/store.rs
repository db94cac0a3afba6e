//! Tiered block store.
//!
//! [`TieredBlockStore`] ties the metadata manager, an evictor, a storage
//! backend and the reader pin set together into the block I/O path used by
//! a worker:
//!
//! ```text
//! create / request space
//!     |
//!     v
//! manager allocation --OutOfSpace--> free_space --> retry once
//!                                       |
//!                                       v
//!                         view (minus pinned blocks)
//!                                       |
//!                                       v
//!                          evictor plan --None--> OutOfSpace
//!                                       |
//!                                       v
//!                          manager.execute_plan --StalePlan--> replan
//!                                       |
//!                                       v
//!                       backend removes / moves bytes
//! ```
//!
//! Allocation, eviction and moves change metadata first so other threads
//! observe the space as taken; commit reaches the backend before the block
//! becomes visible. Backend work never runs under the manager lock. A failed
//! backend move is rolled back in the metadata, along with the later moves
//! of its plan, and the backend error is returned.

use crate::backend::{NoopBackend, StorageBackend};
use crate::error::{BlockStoreError, BlockStoreResult};
use crate::events::BlockEventListener;
use crate::eviction::{Evictor, EvictorConfig, ExecutedPlan};
use crate::location::{BlockId, BlockStoreLocation, SessionId};
use crate::manager::BlockMetadataManager;
use crate::meta::{BlockMeta, BlockStoreMeta, TempBlockMeta, TierSpec};
use crate::metrics;
use crate::pin::{PinSet, PinnedBlocks};
use crate::view::{BlockMetadataManagerView, Exclusions};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default number of times a stale eviction plan is recomputed.
pub const DEFAULT_PLAN_RETRIES: usize = 3;

/// Builder for [`TieredBlockStore`].
pub struct TieredBlockStoreBuilder {
    tiers: Vec<TierSpec>,
    evictor: EvictorConfig,
    backend: Box<dyn StorageBackend>,
    pins: Arc<dyn PinnedBlocks>,
    listeners: Vec<Arc<dyn BlockEventListener>>,
    plan_retries: usize,
}

impl TieredBlockStoreBuilder {
    /// Start a builder for the given tier layout.
    pub fn new(tiers: Vec<TierSpec>) -> Self {
        Self {
            tiers,
            evictor: EvictorConfig::default(),
            backend: Box::new(NoopBackend),
            pins: Arc::new(PinSet::new()),
            listeners: Vec::new(),
            plan_retries: DEFAULT_PLAN_RETRIES,
        }
    }

    /// Eviction strategy and options.
    pub fn evictor(mut self, config: EvictorConfig) -> Self {
        self.evictor = config;
        self
    }

    /// Backend performing byte operations.
    pub fn backend(mut self, backend: impl StorageBackend + 'static) -> Self {
        self.backend = Box::new(backend);
        self
    }

    /// Source of pinned block ids.
    pub fn pins(mut self, pins: Arc<dyn PinnedBlocks>) -> Self {
        self.pins = pins;
        self
    }

    /// Additional listener for block events.
    pub fn listener(mut self, listener: Arc<dyn BlockEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// How many times a stale plan is recomputed before giving up.
    pub fn plan_retries(mut self, plan_retries: usize) -> Self {
        self.plan_retries = plan_retries;
        self
    }

    /// Build the store.
    pub fn build(self) -> BlockStoreResult<TieredBlockStore> {
        let manager = BlockMetadataManager::new(self.tiers)?;
        let evictor = {
            let view = BlockMetadataManagerView::new(&manager, Exclusions::new());
            Evictor::new(&self.evictor, &view)?
        };
        Ok(TieredBlockStore {
            manager,
            evictor,
            backend: self.backend,
            pins: self.pins,
            listeners: self.listeners,
            plan_retries: self.plan_retries,
            eviction_lock: Mutex::new(()),
        })
    }
}

/// Block store over a tier hierarchy.
pub struct TieredBlockStore {
    manager: BlockMetadataManager,
    evictor: Evictor,
    backend: Box<dyn StorageBackend>,
    pins: Arc<dyn PinnedBlocks>,
    listeners: Vec<Arc<dyn BlockEventListener>>,
    plan_retries: usize,
    // serializes plan computation and execution
    eviction_lock: Mutex<()>,
}

impl TieredBlockStore {
    /// Start building a store for the given tier layout.
    pub fn builder(tiers: Vec<TierSpec>) -> TieredBlockStoreBuilder {
        TieredBlockStoreBuilder::new(tiers)
    }

    /// The metadata manager.
    pub fn manager(&self) -> &BlockMetadataManager {
        &self.manager
    }

    /// The evictor.
    pub fn evictor(&self) -> &Evictor {
        &self.evictor
    }

    /// Capacity and usage snapshot.
    pub fn block_store_meta(&self) -> BlockStoreMeta {
        self.manager.block_store_meta()
    }

    /// Create a temp block of `initial_bytes` somewhere in `location`.
    ///
    /// The first directory with room wins. When none has room, space is
    /// freed once through the evictor and allocation is retried.
    pub fn create_block_meta(
        &self,
        session_id: SessionId,
        block_id: BlockId,
        location: &BlockStoreLocation,
        initial_bytes: u64,
    ) -> BlockStoreResult<TempBlockMeta> {
        if self.manager.has_block_meta(block_id) || self.manager.has_temp_block_meta(block_id) {
            return Err(BlockStoreError::BlockAlreadyExists(block_id));
        }
        match self.try_create(session_id, block_id, location, initial_bytes) {
            Err(e) if e.is_out_of_space() => {
                self.free_space(session_id, initial_bytes, location)?;
                self.try_create(session_id, block_id, location, initial_bytes)
            }
            result => result,
        }
    }

    fn try_create(
        &self,
        session_id: SessionId,
        block_id: BlockId,
        location: &BlockStoreLocation,
        initial_bytes: u64,
    ) -> BlockStoreResult<TempBlockMeta> {
        let dir = self
            .manager
            .dirs_in(location)?
            .into_iter()
            .find(|dir| self.manager.dir_available_bytes(dir.id()) >= initial_bytes)
            .ok_or_else(|| {
                metrics::OUT_OF_SPACE.increment();
                BlockStoreError::OutOfSpace {
                    location: *location,
                    bytes: initial_bytes,
                }
            })?;
        let temp = TempBlockMeta::new(session_id, block_id, initial_bytes, dir);
        self.manager.add_temp_block_meta(&temp)?;
        Ok(temp)
    }

    /// Grow a temp block by `additional_bytes`, freeing space in its
    /// directory if needed.
    pub fn request_space(
        &self,
        session_id: SessionId,
        block_id: BlockId,
        additional_bytes: u64,
    ) -> BlockStoreResult<TempBlockMeta> {
        let temp = self.owned_temp_block(session_id, block_id)?;
        let new_size = temp.size().checked_add(additional_bytes).ok_or_else(|| {
            BlockStoreError::InvalidArgument(format!(
                "temp block {} cannot grow by {} bytes",
                block_id, additional_bytes
            ))
        })?;
        match self.manager.resize_temp_block_meta(&temp, new_size) {
            Err(e) if e.is_out_of_space() => {
                self.free_space(session_id, additional_bytes, &temp.location())?;
                self.manager.resize_temp_block_meta(&temp, new_size)
            }
            result => result,
        }
    }

    /// Commit a temp block written by `session_id`.
    pub fn commit_block(
        &self,
        session_id: SessionId,
        block_id: BlockId,
    ) -> BlockStoreResult<BlockMeta> {
        let temp = self.owned_temp_block(session_id, block_id)?;
        self.backend.commit_block(session_id, &temp)?;
        let block = self.manager.commit_temp_block_meta(&temp)?;
        self.notify(|l| l.on_commit_block(session_id, block_id, &block.location()));
        Ok(block)
    }

    /// Abort a temp block written by `session_id`, releasing its bytes.
    pub fn abort_block(&self, session_id: SessionId, block_id: BlockId) -> BlockStoreResult<()> {
        let temp = self.owned_temp_block(session_id, block_id)?;
        self.manager.abort_temp_block_meta(&temp)?;
        self.notify(|l| l.on_abort_block(session_id, block_id));
        self.backend.abort_block(session_id, &temp)
    }

    /// Remove a committed block.
    pub fn remove_block(&self, session_id: SessionId, block_id: BlockId) -> BlockStoreResult<()> {
        let block = self.manager.block_meta(block_id)?;
        self.manager.remove_block_meta(&block)?;
        self.notify(|l| l.on_remove_block(session_id, block_id));
        self.backend.remove_block(&block)
    }

    /// Move a committed block into `dst`.
    ///
    /// A no-op when the block already belongs to `dst`. If the backend copy
    /// fails the metadata move is undone.
    pub fn move_block(
        &self,
        session_id: SessionId,
        block_id: BlockId,
        dst: &BlockStoreLocation,
    ) -> BlockStoreResult<BlockMeta> {
        let src = self.manager.block_meta(block_id)?;
        let moved = self.manager.move_block_meta(&src, dst)?;
        if moved.location() == src.location() {
            return Ok(moved);
        }
        if let Err(e) = self.backend.move_block(&src, &moved) {
            self.rollback_moves(&[(src, moved)]);
            return Err(e);
        }
        self.notify(|l| {
            l.on_move_block(session_id, block_id, &src.location(), &moved.location())
        });
        Ok(moved)
    }

    /// Record a read of a committed block.
    pub fn access_block(&self, session_id: SessionId, block_id: BlockId) -> BlockStoreResult<()> {
        if !self.manager.has_block_meta(block_id) {
            return Err(BlockStoreError::BlockNotFound(block_id));
        }
        self.notify(|l| l.on_access_block(session_id, block_id));
        Ok(())
    }

    /// Make `bytes` free in some directory of `location`.
    ///
    /// Plans against a view that hides pinned blocks, executes the plan
    /// atomically and replans when the plan went stale in between. Fails
    /// with `OutOfSpace` when no plan exists or every attempt went stale,
    /// and with the backend error when a planned move could not be copied.
    pub fn free_space(
        &self,
        session_id: SessionId,
        bytes: u64,
        location: &BlockStoreLocation,
    ) -> BlockStoreResult<()> {
        let _guard = self.eviction_lock.lock();
        let out_of_space = || {
            metrics::OUT_OF_SPACE.increment();
            BlockStoreError::OutOfSpace {
                location: *location,
                bytes,
            }
        };

        for attempt in 0..=self.plan_retries {
            let view = self.view();
            let plan = self
                .evictor
                .free_space_with_view(bytes, location, &view)?
                .ok_or_else(out_of_space)?;
            if plan.is_empty() {
                return Ok(());
            }

            match self.manager.execute_plan(&plan) {
                Ok(executed) => return self.apply_executed(session_id, &executed),
                Err(BlockStoreError::StalePlan(reason)) => {
                    metrics::EVICTION_PLANS_STALE.increment();
                    warn!(attempt, %reason, "eviction plan went stale, replanning");
                }
                Err(e) => return Err(e),
            }
        }
        Err(out_of_space())
    }

    /// Remove every temp block of a session, returning what was removed.
    pub fn cleanup_session(&self, session_id: SessionId) -> Vec<TempBlockMeta> {
        let block_ids: Vec<BlockId> = self
            .manager
            .session_temp_blocks(session_id)
            .iter()
            .map(|temp| temp.block_id())
            .collect();
        let removed = self
            .manager
            .cleanup_session_temp_blocks(session_id, &block_ids);
        for temp in &removed {
            self.notify(|l| l.on_abort_block(session_id, temp.block_id()));
            if let Err(e) = self.backend.abort_block(session_id, temp) {
                warn!(block_id = temp.block_id(), error = %e, "failed to discard temp block bytes");
            }
        }
        removed
    }

    /// View hiding the currently pinned blocks.
    fn view(&self) -> BlockMetadataManagerView<'_> {
        BlockMetadataManagerView::new(
            &self.manager,
            Exclusions::new().with_blocks(self.pins.pinned()),
        )
    }

    fn owned_temp_block(
        &self,
        session_id: SessionId,
        block_id: BlockId,
    ) -> BlockStoreResult<TempBlockMeta> {
        let temp = self.manager.temp_block_meta(block_id)?;
        if temp.session_id() != session_id {
            return Err(BlockStoreError::WrongSession {
                block: block_id,
                owner: temp.session_id(),
                session: session_id,
            });
        }
        Ok(temp)
    }

    /// Run the backend work for an executed plan.
    ///
    /// Moves run in plan order. At the first failed copy that move and every
    /// later one, none of which reached the backend, are undone in the
    /// metadata and the backend error is returned.
    fn apply_executed(&self, session_id: SessionId, executed: &ExecutedPlan) -> BlockStoreResult<()> {
        for block in &executed.evicted {
            self.notify(|l| l.on_remove_block(session_id, block.block_id()));
            if let Err(e) = self.backend.remove_block(block) {
                warn!(block_id = block.block_id(), error = %e, "failed to delete evicted block");
            }
        }
        for (index, (src, dst)) in executed.moved.iter().enumerate() {
            if let Err(e) = self.backend.move_block(src, dst) {
                warn!(block_id = src.block_id(), error = %e, "failed to move block bytes");
                self.rollback_moves(&executed.moved[index..]);
                return Err(e);
            }
            self.notify(|l| {
                l.on_move_block(session_id, src.block_id(), &src.location(), &dst.location())
            });
        }
        Ok(())
    }

    fn rollback_moves(&self, moves: &[(BlockMeta, BlockMeta)]) {
        metrics::BACKEND_ROLLBACKS.add(moves.len() as u64);
        match self.manager.revert_moves(moves) {
            Ok(()) => debug!(count = moves.len(), "rolled back block moves"),
            Err(e) => error!(
                count = moves.len(),
                error = %e,
                "failed to roll back block moves"
            ),
        }
    }

    fn notify(&self, event: impl Fn(&dyn BlockEventListener)) {
        event(&self.evictor);
        for listener in &self.listeners {
            event(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for TieredBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredBlockStore")
            .field("manager", &self.manager)
            .field("evictor", &self.evictor)
            .field("plan_retries", &self.plan_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::EvictorKind;

    fn store() -> TieredBlockStore {
        TieredBlockStore::builder(vec![
            TierSpec::new(1, 0).with_dir("/ramdisk", 1000),
            TierSpec::new(3, 1).with_dir("/disk1", 3000),
        ])
        .evictor(EvictorConfig::new(EvictorKind::Lru))
        .build()
        .unwrap()
    }

    #[test]
    fn test_wrong_session_rejected() {
        let store = store();
        store
            .create_block_meta(1, 10, &BlockStoreLocation::any_tier(), 100)
            .unwrap();
        assert_eq!(
            store.commit_block(2, 10),
            Err(BlockStoreError::WrongSession {
                block: 10,
                owner: 1,
                session: 2
            })
        );
        store.commit_block(1, 10).unwrap();
    }

    #[test]
    fn test_create_evicts_when_full() {
        let store = store();
        let mem = BlockStoreLocation::any_dir_in_tier(1);
        store.create_block_meta(1, 1, &mem, 1000).unwrap();
        store.commit_block(1, 1).unwrap();

        let temp = store.create_block_meta(1, 2, &mem, 500).unwrap();
        assert_eq!(temp.location(), BlockStoreLocation::dir(1, 0, 0));
        assert!(!store.manager().has_block_meta(1));
    }
}
