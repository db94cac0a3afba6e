//! Block metadata manager.
//!
//! The manager owns the tier hierarchy and is the single source of truth for
//! block placement and per-directory byte accounting.
//!
//! # Structure
//!
//! ```text
//! BlockMetadataManager
//! +-- tiers: Vec<StorageTier>        immutable layout, ascending level
//! +-- state: RwLock<State>
//!       +-- dirs[tier][dir]: DirState   used bytes + blocks + temp blocks
//!       +-- blocks: BlockId -> DirId    committed index
//!       +-- temp_blocks: BlockId -> DirId
//! ```
//!
//! # Thread Safety
//!
//! Every mutation takes the state write lock for its full duration, so a
//! capacity check and the accounting update it guards are atomic. Queries
//! take the read lock briefly and return owned values.

use crate::error::{BlockStoreError, BlockStoreResult};
use crate::eviction::{EvictionPlan, ExecutedPlan};
use crate::location::{BlockId, BlockStoreLocation, SessionId, TierAlias};
use crate::meta::{
    BlockMeta, BlockStoreMeta, DirId, DirUsage, StorageDir, StorageTier, TempBlockMeta, TierSpec,
    build_layout,
};
use crate::metrics;
use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Mutable accounting for one directory.
#[derive(Debug)]
struct DirState {
    capacity: u64,
    used: u64,
    blocks: HashMap<BlockId, BlockMeta, RandomState>,
    temp_blocks: HashMap<BlockId, TempBlockMeta, RandomState>,
}

impl DirState {
    fn new(capacity: u64) -> Self {
        Self {
            capacity,
            used: 0,
            blocks: HashMap::default(),
            temp_blocks: HashMap::default(),
        }
    }

    fn available(&self) -> u64 {
        self.capacity - self.used
    }

    fn reserve(&mut self, bytes: u64) {
        debug_assert!(bytes <= self.available(), "reservation exceeds capacity");
        self.used += bytes;
    }

    fn release(&mut self, bytes: u64) {
        debug_assert!(bytes <= self.used, "release exceeds used bytes");
        self.used -= bytes;
    }
}

#[derive(Debug)]
struct State {
    dirs: Vec<Vec<DirState>>,
    blocks: HashMap<BlockId, DirId, RandomState>,
    temp_blocks: HashMap<BlockId, DirId, RandomState>,
}

impl State {
    fn dir(&self, id: DirId) -> &DirState {
        &self.dirs[id.tier_index()][id.dir_index()]
    }

    fn dir_mut(&mut self, id: DirId) -> &mut DirState {
        &mut self.dirs[id.tier_index()][id.dir_index()]
    }

    fn block(&self, block_id: BlockId) -> Option<&BlockMeta> {
        let dir = self.blocks.get(&block_id)?;
        self.dir(*dir).blocks.get(&block_id)
    }

    fn temp_block(&self, block_id: BlockId) -> Option<&TempBlockMeta> {
        let dir = self.temp_blocks.get(&block_id)?;
        self.dir(*dir).temp_blocks.get(&block_id)
    }

    fn take_temp_block(&mut self, block_id: BlockId) -> Option<TempBlockMeta> {
        let dir = self.temp_blocks.remove(&block_id)?;
        let dir_state = self.dir_mut(dir);
        let temp = dir_state.temp_blocks.remove(&block_id)?;
        dir_state.release(temp.size());
        Some(temp)
    }

    fn take_block(&mut self, block_id: BlockId) -> Option<BlockMeta> {
        let dir = self.blocks.remove(&block_id)?;
        let dir_state = self.dir_mut(dir);
        let block = dir_state.blocks.remove(&block_id)?;
        dir_state.release(block.size());
        Some(block)
    }

    fn insert_block(&mut self, block: BlockMeta) {
        let dir_state = self.dir_mut(block.dir_id());
        dir_state.reserve(block.size());
        dir_state.blocks.insert(block.block_id(), block);
        self.blocks.insert(block.block_id(), block.dir_id());
    }

    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        for dir in self.dirs.iter().flatten() {
            let sum: u64 = dir.blocks.values().map(|b| b.size()).sum::<u64>()
                + dir.temp_blocks.values().map(|t| t.size()).sum::<u64>();
            debug_assert_eq!(sum, dir.used, "dir used bytes out of sync");
            debug_assert!(dir.used <= dir.capacity, "dir over capacity");
        }
        for id in self.blocks.keys() {
            debug_assert!(
                !self.temp_blocks.contains_key(id),
                "block {} is both temp and committed",
                id
            );
        }
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self) {}
}

/// Used bytes of `dir` as of the plan entries replayed so far.
fn planned_used(state: &State, used: &mut HashMap<DirId, u64, RandomState>, dir: DirId) -> u64 {
    *used.entry(dir).or_insert_with(|| state.dir(dir).used)
}

/// Look up a block named by a plan entry, checking it is still where the
/// plan expects and that no earlier entry claimed it.
fn planned_block(
    state: &State,
    seen: &mut HashSet<BlockId, RandomState>,
    block_id: BlockId,
    expected: BlockStoreLocation,
) -> BlockStoreResult<BlockMeta> {
    if !seen.insert(block_id) {
        return Err(BlockStoreError::StalePlan(format!(
            "block {} appears more than once",
            block_id
        )));
    }
    match state.block(block_id) {
        Some(block) if block.location() == expected => Ok(*block),
        Some(block) => Err(BlockStoreError::StalePlan(format!(
            "block {} is at {}, plan expected {}",
            block_id,
            block.location(),
            expected
        ))),
        None => Err(BlockStoreError::StalePlan(format!(
            "block {} no longer exists",
            block_id
        ))),
    }
}

/// Owner of the tier/directory hierarchy and all block placement metadata.
pub struct BlockMetadataManager {
    tiers: Vec<StorageTier>,
    aliases: HashMap<TierAlias, usize, RandomState>,
    state: RwLock<State>,
}

impl BlockMetadataManager {
    /// Build a manager for the given layout.
    ///
    /// Fails with `InvalidArgument` on duplicate aliases, non-increasing
    /// levels or tiers without directories.
    pub fn new(specs: Vec<TierSpec>) -> BlockStoreResult<Self> {
        let tiers = build_layout(specs)?;
        let aliases = tiers
            .iter()
            .enumerate()
            .map(|(index, tier)| (tier.alias(), index))
            .collect();
        let dirs = tiers
            .iter()
            .map(|tier| {
                tier.dirs()
                    .iter()
                    .map(|dir| DirState::new(dir.capacity()))
                    .collect()
            })
            .collect();

        Ok(Self {
            tiers,
            aliases,
            state: RwLock::new(State {
                dirs,
                blocks: HashMap::default(),
                temp_blocks: HashMap::default(),
            }),
        })
    }

    // Layout queries

    /// Tier with the given alias.
    pub fn tier(&self, alias: TierAlias) -> BlockStoreResult<&StorageTier> {
        self.aliases
            .get(&alias)
            .map(|index| &self.tiers[*index])
            .ok_or(BlockStoreError::TierNotFound(alias))
    }

    /// All tiers in ascending level order.
    pub fn tiers(&self) -> &[StorageTier] {
        &self.tiers
    }

    /// Tiers strictly below `level`, in ascending level order.
    pub fn tiers_below(&self, level: u32) -> &[StorageTier] {
        let start = self.tiers.partition_point(|tier| tier.level() <= level);
        &self.tiers[start..]
    }

    /// Tier following `alias` in hierarchy order, if any.
    pub fn next_tier(&self, alias: TierAlias) -> BlockStoreResult<Option<&StorageTier>> {
        let index = self
            .aliases
            .get(&alias)
            .ok_or(BlockStoreError::TierNotFound(alias))?;
        Ok(self.tiers.get(index + 1))
    }

    /// Directory named by a specific location.
    ///
    /// Scope locations are rejected with `InvalidArgument`, as is a level that
    /// disagrees with the tier's configured level.
    pub fn dir(&self, location: &BlockStoreLocation) -> BlockStoreResult<&StorageDir> {
        match *location {
            BlockStoreLocation::Dir { alias, level, dir } => {
                let tier = self.tier(alias)?;
                if tier.level() != level {
                    return Err(BlockStoreError::InvalidArgument(format!(
                        "tier {} is at level {}, not {}",
                        alias,
                        tier.level(),
                        level
                    )));
                }
                tier.dir(dir)
                    .ok_or(BlockStoreError::DirNotFound { alias, dir })
            }
            _ => Err(BlockStoreError::InvalidArgument(format!(
                "{} does not name a specific dir",
                location
            ))),
        }
    }

    /// Directory by arena index.
    pub fn dir_by_id(&self, id: DirId) -> &StorageDir {
        &self.tiers[id.tier_index()].dirs()[id.dir_index()]
    }

    /// Directories matching `scope`, in hierarchy order.
    pub fn dirs_in(&self, scope: &BlockStoreLocation) -> BlockStoreResult<Vec<&StorageDir>> {
        match scope {
            BlockStoreLocation::AnyTier => Ok(self.tiers.iter().flat_map(|t| t.dirs()).collect()),
            BlockStoreLocation::AnyDirInTier { alias } => {
                Ok(self.tier(*alias)?.dirs().iter().collect())
            }
            BlockStoreLocation::Dir { .. } => Ok(vec![self.dir(scope)?]),
        }
    }

    // Accounting queries

    /// Sum of free bytes over every directory in `location`.
    pub fn available_bytes(&self, location: &BlockStoreLocation) -> BlockStoreResult<u64> {
        let dirs = self.dirs_in(location)?;
        let state = self.state.read();
        Ok(dirs.iter().map(|dir| state.dir(dir.id()).available()).sum())
    }

    /// Free bytes in one directory.
    pub fn dir_available_bytes(&self, id: DirId) -> u64 {
        self.state.read().dir(id).available()
    }

    /// Used bytes (committed plus temp) in one directory.
    pub fn dir_used_bytes(&self, id: DirId) -> u64 {
        self.state.read().dir(id).used
    }

    /// Committed blocks in one directory, in ascending block id order.
    pub fn dir_blocks(&self, id: DirId) -> Vec<BlockMeta> {
        let state = self.state.read();
        let mut blocks: Vec<BlockMeta> = state.dir(id).blocks.values().copied().collect();
        blocks.sort_unstable_by_key(|b| b.block_id());
        blocks
    }

    /// Whether a temp block with this id exists.
    pub fn has_temp_block_meta(&self, block_id: BlockId) -> bool {
        self.state.read().temp_blocks.contains_key(&block_id)
    }

    /// Whether a committed block with this id exists.
    pub fn has_block_meta(&self, block_id: BlockId) -> bool {
        self.state.read().blocks.contains_key(&block_id)
    }

    /// Committed block metadata.
    pub fn block_meta(&self, block_id: BlockId) -> BlockStoreResult<BlockMeta> {
        self.state
            .read()
            .block(block_id)
            .copied()
            .ok_or(BlockStoreError::BlockNotFound(block_id))
    }

    /// Temp block metadata.
    pub fn temp_block_meta(&self, block_id: BlockId) -> BlockStoreResult<TempBlockMeta> {
        self.state
            .read()
            .temp_block(block_id)
            .copied()
            .ok_or(BlockStoreError::TempBlockNotFound(block_id))
    }

    /// Every temp block owned by `session_id`.
    pub fn session_temp_blocks(&self, session_id: SessionId) -> Vec<TempBlockMeta> {
        let state = self.state.read();
        state
            .dirs
            .iter()
            .flatten()
            .flat_map(|dir| dir.temp_blocks.values())
            .filter(|temp| temp.session_id() == session_id)
            .copied()
            .collect()
    }

    /// Capacity and usage snapshot.
    pub fn block_store_meta(&self) -> BlockStoreMeta {
        let state = self.state.read();
        let mut meta = BlockStoreMeta::default();
        for tier in &self.tiers {
            let mut capacity = 0;
            let mut used = 0;
            let mut blocks = 0;
            for dir in tier.dirs() {
                let dir_state = state.dir(dir.id());
                capacity += dir_state.capacity;
                used += dir_state.used;
                blocks += dir_state.blocks.len();
                meta.dirs.push(DirUsage {
                    location: dir.location(),
                    path: dir.path().to_path_buf(),
                    capacity_bytes: dir_state.capacity,
                    used_bytes: dir_state.used,
                    block_count: dir_state.blocks.len(),
                    temp_block_count: dir_state.temp_blocks.len(),
                });
            }
            meta.capacity_bytes_on_tiers.insert(tier.alias(), capacity);
            meta.used_bytes_on_tiers.insert(tier.alias(), used);
            meta.block_count_on_tiers.insert(tier.alias(), blocks);
        }
        meta
    }

    // Temp block mutations

    /// Register a temp block in its target directory, reserving its size.
    pub fn add_temp_block_meta(&self, temp: &TempBlockMeta) -> BlockStoreResult<()> {
        self.check_dir(temp.dir_id(), &temp.location())?;
        let mut state = self.state.write();

        let block_id = temp.block_id();
        if state.blocks.contains_key(&block_id) || state.temp_blocks.contains_key(&block_id) {
            return Err(BlockStoreError::BlockAlreadyExists(block_id));
        }

        let dir_state = state.dir_mut(temp.dir_id());
        if temp.size() > dir_state.available() {
            metrics::OUT_OF_SPACE.increment();
            return Err(BlockStoreError::OutOfSpace {
                location: temp.location(),
                bytes: temp.size(),
            });
        }
        dir_state.reserve(temp.size());
        dir_state.temp_blocks.insert(block_id, *temp);
        state.temp_blocks.insert(block_id, temp.dir_id());
        state.check_invariants();

        metrics::TEMP_BLOCKS_CREATED.increment();
        debug!(
            session_id = temp.session_id(),
            block_id,
            bytes = temp.size(),
            location = %temp.location(),
            "added temp block"
        );
        Ok(())
    }

    /// Grow a temp block to `new_size` bytes, returning the updated meta.
    ///
    /// The growth must fit in the owning directory. Shrinking is rejected.
    pub fn resize_temp_block_meta(
        &self,
        temp: &TempBlockMeta,
        new_size: u64,
    ) -> BlockStoreResult<TempBlockMeta> {
        let block_id = temp.block_id();
        let mut state = self.state.write();
        let dir = *state
            .temp_blocks
            .get(&block_id)
            .ok_or(BlockStoreError::TempBlockNotFound(block_id))?;

        let dir_state = state.dir_mut(dir);
        let current = dir_state
            .temp_blocks
            .get(&block_id)
            .copied()
            .ok_or(BlockStoreError::TempBlockNotFound(block_id))?;
        if new_size < current.size() {
            return Err(BlockStoreError::InvalidArgument(format!(
                "cannot shrink temp block {} from {} to {} bytes",
                block_id,
                current.size(),
                new_size
            )));
        }

        let delta = new_size - current.size();
        if delta > dir_state.available() {
            metrics::OUT_OF_SPACE.increment();
            return Err(BlockStoreError::OutOfSpace {
                location: current.location(),
                bytes: delta,
            });
        }
        dir_state.reserve(delta);
        let updated = dir_state
            .temp_blocks
            .get_mut(&block_id)
            .map(|t| {
                t.set_size(new_size);
                *t
            })
            .ok_or(BlockStoreError::TempBlockNotFound(block_id))?;
        state.check_invariants();

        debug!(block_id, new_size, delta, "resized temp block");
        Ok(updated)
    }

    /// Remove a temp block and release its bytes.
    pub fn abort_temp_block_meta(&self, temp: &TempBlockMeta) -> BlockStoreResult<()> {
        let block_id = temp.block_id();
        let mut state = self.state.write();
        let removed = state
            .take_temp_block(block_id)
            .ok_or(BlockStoreError::TempBlockNotFound(block_id))?;
        state.check_invariants();

        metrics::BLOCKS_ABORTED.increment();
        debug!(block_id, bytes = removed.size(), "aborted temp block");
        Ok(())
    }

    /// Turn a temp block into a committed block in the same directory.
    ///
    /// Used bytes do not change.
    pub fn commit_temp_block_meta(&self, temp: &TempBlockMeta) -> BlockStoreResult<BlockMeta> {
        let block_id = temp.block_id();
        let mut state = self.state.write();
        let dir = state
            .temp_blocks
            .remove(&block_id)
            .ok_or(BlockStoreError::TempBlockNotFound(block_id))?;

        let dir_state = state.dir_mut(dir);
        let temp = dir_state
            .temp_blocks
            .remove(&block_id)
            .ok_or(BlockStoreError::TempBlockNotFound(block_id))?;
        let block = BlockMeta::from_temp(&temp);
        dir_state.blocks.insert(block_id, block);
        state.blocks.insert(block_id, dir);
        state.check_invariants();

        metrics::BLOCKS_COMMITTED.increment();
        debug!(block_id, bytes = block.size(), location = %block.location(), "committed block");
        Ok(block)
    }

    /// Remove every listed temp block owned by `session_id`.
    ///
    /// Ids that are no longer temp blocks (already committed or aborted) or
    /// that belong to another session are skipped. Returns the removed metas.
    pub fn cleanup_session_temp_blocks(
        &self,
        session_id: SessionId,
        block_ids: &[BlockId],
    ) -> Vec<TempBlockMeta> {
        let mut state = self.state.write();
        let mut removed = Vec::new();
        for &block_id in block_ids {
            match state.temp_block(block_id) {
                Some(temp) if temp.session_id() == session_id => {}
                Some(temp) => {
                    tracing::warn!(
                        block_id,
                        session_id,
                        owner = temp.session_id(),
                        "skipping cleanup of temp block owned by another session"
                    );
                    continue;
                }
                None => continue,
            }
            if let Some(temp) = state.take_temp_block(block_id) {
                removed.push(temp);
            }
        }
        state.check_invariants();

        if !removed.is_empty() {
            metrics::SESSION_TEMP_BLOCKS_CLEANED.add(removed.len() as u64);
            debug!(session_id, count = removed.len(), "cleaned up session temp blocks");
        }
        removed
    }

    // Committed block mutations

    /// Remove a committed block and release its bytes.
    pub fn remove_block_meta(&self, block: &BlockMeta) -> BlockStoreResult<()> {
        let block_id = block.block_id();
        let mut state = self.state.write();
        let removed = state
            .take_block(block_id)
            .ok_or(BlockStoreError::BlockNotFound(block_id))?;
        state.check_invariants();

        metrics::BLOCKS_REMOVED.increment();
        debug!(block_id, bytes = removed.size(), "removed block");
        Ok(())
    }

    /// Relocate a committed block to `dst`.
    ///
    /// A scope destination is resolved to the first directory, in ascending
    /// tier level then directory index, with enough free bytes. Moving a
    /// block to a scope it already belongs to is a no-op.
    pub fn move_block_meta(
        &self,
        block: &BlockMeta,
        dst: &BlockStoreLocation,
    ) -> BlockStoreResult<BlockMeta> {
        let candidates = self.dirs_in(dst)?;
        let block_id = block.block_id();
        let mut state = self.state.write();
        let current = *state
            .block(block_id)
            .ok_or(BlockStoreError::BlockNotFound(block_id))?;

        if current.location().belongs_to(dst) {
            debug!(block_id, location = %dst, "move is a no-op");
            return Ok(current);
        }

        let target = candidates
            .into_iter()
            .find(|dir| state.dir(dir.id()).available() >= current.size())
            .ok_or_else(|| {
                metrics::OUT_OF_SPACE.increment();
                BlockStoreError::OutOfSpace {
                    location: *dst,
                    bytes: current.size(),
                }
            })?;

        state.take_block(block_id);
        let moved = BlockMeta::new(block_id, current.size(), target);
        state.insert_block(moved);
        state.check_invariants();

        metrics::BLOCKS_MOVED.increment();
        debug!(
            block_id,
            from = %current.location(),
            to = %moved.location(),
            "moved block"
        );
        Ok(moved)
    }

    /// Apply an eviction plan atomically.
    ///
    /// The whole plan is validated against current state before anything
    /// changes: every listed block must still be committed at the location
    /// recorded in the plan, no block may appear twice, and replaying the
    /// evictions and then the moves in order must never overfill a
    /// directory. On any mismatch nothing is applied and `StalePlan` is
    /// returned.
    pub fn execute_plan(&self, plan: &EvictionPlan) -> BlockStoreResult<ExecutedPlan> {
        let mut moves = Vec::with_capacity(plan.to_move().len());
        for transfer in plan.to_move() {
            let dst = self
                .dir(&transfer.dst_location())
                .map_err(|e| BlockStoreError::StalePlan(e.to_string()))?;
            moves.push((transfer, dst));
        }

        let mut state = self.state.write();

        let mut seen: HashSet<BlockId, RandomState> = HashSet::default();
        let mut used: HashMap<DirId, u64, RandomState> = HashMap::default();

        let mut evictions = Vec::with_capacity(plan.to_evict().len());
        for &(block_id, location) in plan.to_evict() {
            let block = planned_block(&state, &mut seen, block_id, location)?;
            let dir_used = planned_used(&state, &mut used, block.dir_id());
            used.insert(block.dir_id(), dir_used - block.size());
            evictions.push(block);
        }

        let mut transfers = Vec::with_capacity(moves.len());
        for (transfer, dst) in moves {
            let block = planned_block(
                &state,
                &mut seen,
                transfer.block_id(),
                transfer.src_location(),
            )?;
            let src_used = planned_used(&state, &mut used, block.dir_id());
            used.insert(block.dir_id(), src_used - block.size());

            let dst_used = planned_used(&state, &mut used, dst.id()) + block.size();
            if dst_used > dst.capacity() {
                return Err(BlockStoreError::StalePlan(format!(
                    "{} lacks {} bytes for block {}",
                    dst.location(),
                    dst_used - dst.capacity(),
                    block.block_id()
                )));
            }
            used.insert(dst.id(), dst_used);
            transfers.push((block, dst));
        }

        let mut executed = ExecutedPlan::default();
        for block in evictions {
            state.take_block(block.block_id());
            executed.evicted.push(block);
        }
        for (block, dst) in transfers {
            state.take_block(block.block_id());
            let moved = BlockMeta::new(block.block_id(), block.size(), dst);
            state.insert_block(moved);
            executed.moved.push((block, moved));
        }
        state.check_invariants();
        drop(state);

        metrics::BLOCKS_EVICTED.add(executed.evicted.len() as u64);
        metrics::BLOCKS_MOVED.add(executed.moved.len() as u64);
        info!(
            evicted = executed.evicted.len(),
            evicted_bytes = executed.evicted_bytes(),
            moved = executed.moved.len(),
            "executed eviction plan"
        );
        Ok(executed)
    }

    /// Undo `(before, after)` block moves, last move first.
    ///
    /// Every block must still sit where its move put it and every source
    /// directory must have room to take it back; otherwise nothing is
    /// undone and `StalePlan` is returned.
    pub(crate) fn revert_moves(&self, moves: &[(BlockMeta, BlockMeta)]) -> BlockStoreResult<()> {
        let mut state = self.state.write();
        let mut seen: HashSet<BlockId, RandomState> = HashSet::default();
        let mut used: HashMap<DirId, u64, RandomState> = HashMap::default();

        for (before, after) in moves.iter().rev() {
            let block = planned_block(&state, &mut seen, after.block_id(), after.location())?;
            let moved_used = planned_used(&state, &mut used, block.dir_id());
            used.insert(block.dir_id(), moved_used - block.size());

            let src = before.dir_id();
            let src_used = planned_used(&state, &mut used, src) + block.size();
            if src_used > state.dir(src).capacity {
                return Err(BlockStoreError::StalePlan(format!(
                    "{} has no room to take back block {}",
                    before.location(),
                    block.block_id()
                )));
            }
            used.insert(src, src_used);
        }

        for (before, after) in moves.iter().rev() {
            state.take_block(after.block_id());
            state.insert_block(*before);
        }
        state.check_invariants();
        drop(state);

        debug!(count = moves.len(), "reverted block moves");
        Ok(())
    }

    /// Ensure `id` and `location` name the same directory of this manager.
    fn check_dir(&self, id: DirId, location: &BlockStoreLocation) -> BlockStoreResult<()> {
        let dir = self.dir(location)?;
        if dir.id() != id {
            return Err(BlockStoreError::InvalidArgument(format!(
                "{} does not match dir {}",
                location, id
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for BlockMetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockMetadataManager")
            .field("tiers", &self.tiers)
            .finish_non_exhaustive()
    }
}
