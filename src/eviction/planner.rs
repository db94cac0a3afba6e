//! Eviction planning over a manager view.
//!
//! Planning never mutates the manager. Bytes that a partially built plan
//! will release from or add to a directory are tracked in a [`Ledger`], so
//! later planning steps see each directory as it will look once the plan
//! is applied.
//!
//! Three algorithms are provided:
//!
//! - [`plan_direct`]: evict victims from a single directory in the scope.
//! - [`plan_cascading`]: move victims one tier down, recursively making room
//!   there, and evict only what cannot be placed or lives in the last tier.
//! - [`plan_greedy`]: pick the first directory that can be freed, take
//!   victims in block id order and transfer each to any lower-tier directory
//!   with room, evicting the rest.

use crate::error::BlockStoreResult;
use crate::eviction::plan::EvictionPlan;
use crate::location::{BlockId, BlockStoreLocation};
use crate::meta::{BlockMeta, DirId, StorageDir};
use crate::view::BlockMetadataManagerView;
use ahash::RandomState;
use std::collections::{HashMap, HashSet};

/// Planned byte movement per directory plus blocks already claimed.
pub(crate) struct Ledger<'v, 'a> {
    view: &'v BlockMetadataManagerView<'a>,
    moved_out: HashMap<DirId, u64, RandomState>,
    moved_in: HashMap<DirId, u64, RandomState>,
    claimed: HashSet<BlockId, RandomState>,
}

impl<'v, 'a> Ledger<'v, 'a> {
    pub(crate) fn new(view: &'v BlockMetadataManagerView<'a>) -> Self {
        Self {
            view,
            moved_out: HashMap::default(),
            moved_in: HashMap::default(),
            claimed: HashSet::default(),
        }
    }

    /// Free bytes of `dir` once the planned entries are applied.
    pub(crate) fn available(&self, dir: &StorageDir) -> u64 {
        let out = self.moved_out.get(&dir.id()).copied().unwrap_or(0);
        let incoming = self.moved_in.get(&dir.id()).copied().unwrap_or(0);
        (self.view.dir_available_bytes(dir) + out).saturating_sub(incoming)
    }

    fn is_claimed(&self, block_id: BlockId) -> bool {
        self.claimed.contains(&block_id)
    }

    fn mark_out(&mut self, block: &BlockMeta) {
        self.claimed.insert(block.block_id());
        *self.moved_out.entry(block.dir_id()).or_insert(0) += block.size();
    }

    fn mark_in(&mut self, dir: &StorageDir, bytes: u64) {
        *self.moved_in.entry(dir.id()).or_insert(0) += bytes;
    }

    /// First visible directory in `scope` that already has `bytes` free.
    fn select_dir_with_space(
        &self,
        bytes: u64,
        scope: &BlockStoreLocation,
    ) -> BlockStoreResult<Option<&'a StorageDir>> {
        Ok(self
            .view
            .dirs_in(scope)?
            .into_iter()
            .find(|dir| self.available(dir) >= bytes))
    }

    /// Walk `ordered` and gather victims per directory until one directory
    /// in `scope` would have `bytes` free after evicting its victims.
    fn collect_victims(
        &self,
        bytes: u64,
        scope: &BlockStoreLocation,
        ordered: &[BlockMeta],
    ) -> Option<(&'a StorageDir, Vec<BlockMeta>)> {
        let manager = self.view.manager();
        let mut candidates: HashMap<DirId, (u64, Vec<BlockMeta>), RandomState> =
            HashMap::default();

        for block in ordered {
            if self.is_claimed(block.block_id())
                || !block.location().belongs_to(scope)
                || !self.view.is_dir_visible(block.dir_id())
            {
                continue;
            }
            let dir = manager.dir_by_id(block.dir_id());
            let entry = candidates
                .entry(dir.id())
                .or_insert_with(|| (self.available(dir), Vec::new()));
            entry.0 += block.size();
            entry.1.push(*block);
            if entry.0 >= bytes {
                let victims = std::mem::take(&mut entry.1);
                return Some((dir, victims));
            }
        }
        None
    }

    /// Cascading step: returns the directory in `scope` that will have
    /// `bytes` free once `plan` is applied.
    fn cascade(
        &mut self,
        bytes: u64,
        scope: &BlockStoreLocation,
        ordered: &[BlockMeta],
        plan: &mut EvictionPlan,
    ) -> BlockStoreResult<Option<&'a StorageDir>> {
        if let Some(dir) = self.select_dir_with_space(bytes, scope)? {
            return Ok(Some(dir));
        }

        let (dir, victims) = match self.collect_victims(bytes, scope, ordered) {
            Some(found) => found,
            None => return Ok(None),
        };

        let next_tier = self.view.next_tier(dir.tier_alias())?;
        for victim in victims {
            self.mark_out(&victim);
            let dst = match next_tier {
                None => None,
                Some(tier) => {
                    let next_scope = BlockStoreLocation::any_dir_in_tier(tier.alias());
                    match self.select_dir_with_space(victim.size(), &next_scope)? {
                        Some(dst) => Some(dst),
                        None => self.cascade(victim.size(), &next_scope, ordered, plan)?,
                    }
                }
            };
            match dst {
                Some(dst) => {
                    self.mark_in(dst, victim.size());
                    plan.transfer(&victim, dst.location());
                }
                None => plan.evict(&victim),
            }
        }
        Ok(Some(dir))
    }
}

/// Evict victims, oldest first in `ordered`, from the first directory in
/// `scope` that can reach `bytes` free.
pub(crate) fn plan_direct(
    view: &BlockMetadataManagerView<'_>,
    bytes: u64,
    scope: &BlockStoreLocation,
    ordered: &[BlockMeta],
) -> BlockStoreResult<Option<EvictionPlan>> {
    let ledger = Ledger::new(view);
    let mut plan = EvictionPlan::new();
    if ledger.select_dir_with_space(bytes, scope)?.is_some() {
        return Ok(Some(plan));
    }

    match ledger.collect_victims(bytes, scope, ordered) {
        Some((_, victims)) => {
            for victim in &victims {
                plan.evict(victim);
            }
            Ok(Some(plan))
        }
        None => Ok(None),
    }
}

/// Free `bytes` in `scope` by pushing victims down the hierarchy.
pub(crate) fn plan_cascading(
    view: &BlockMetadataManagerView<'_>,
    bytes: u64,
    scope: &BlockStoreLocation,
    ordered: &[BlockMeta],
) -> BlockStoreResult<Option<EvictionPlan>> {
    let mut ledger = Ledger::new(view);
    let mut plan = EvictionPlan::new();
    match ledger.cascade(bytes, scope, ordered, &mut plan)? {
        Some(_) => Ok(Some(plan)),
        None => Ok(None),
    }
}

/// Free `bytes` in the first directory of `scope` whose free plus evictable
/// bytes suffice, transferring victims to lower tiers where they fit.
pub(crate) fn plan_greedy(
    view: &BlockMetadataManagerView<'_>,
    bytes: u64,
    scope: &BlockStoreLocation,
) -> BlockStoreResult<Option<EvictionPlan>> {
    let mut ledger = Ledger::new(view);
    let mut plan = EvictionPlan::new();
    if ledger.select_dir_with_space(bytes, scope)?.is_some() {
        return Ok(Some(plan));
    }

    let selected = view
        .dirs_in(scope)?
        .into_iter()
        .find(|dir| ledger.available(dir) + view.dir_evictable_bytes(dir) >= bytes);
    let selected = match selected {
        Some(dir) => dir,
        None => return Ok(None),
    };

    let mut free = ledger.available(selected);
    let mut victims = Vec::new();
    for block in view.dir_evictable_blocks(selected) {
        if free >= bytes {
            break;
        }
        free += block.size();
        victims.push(block);
    }

    let lower_dirs: Vec<&StorageDir> = view
        .tiers_below(selected.tier_level())
        .iter()
        .flat_map(|tier| tier.dirs())
        .filter(|dir| view.is_dir_visible(dir.id()))
        .collect();

    for victim in victims {
        ledger.mark_out(&victim);
        let dst = lower_dirs
            .iter()
            .copied()
            .find(|dir| ledger.available(dir) >= victim.size());
        match dst {
            Some(dst) => {
                ledger.mark_in(dst, victim.size());
                plan.transfer(&victim, dst.location());
            }
            None => plan.evict(&victim),
        }
    }
    Ok(Some(plan))
}
