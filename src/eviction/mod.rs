//! Eviction planning.
//!
//! An [`Evictor`] answers one question: which blocks must be evicted or
//! moved so that some directory in a location has a given number of free
//! bytes? It answers with an [`EvictionPlan`] computed against a
//! [`BlockMetadataManagerView`] and never touches the manager itself.
//!
//! # Strategies
//!
//! ```text
//! +---------+-------------------------------+---------------------------+
//! | kind    | victim order                  | placement                 |
//! +---------+-------------------------------+---------------------------+
//! | lru     | least recently accessed first | direct or cascading       |
//! | lrfu    | lowest decayed CRF first      | direct or cascading       |
//! | greedy  | ascending block id            | lower tier, else evict    |
//! +---------+-------------------------------+---------------------------+
//! ```
//!
//! Direct plans evict every victim from a single directory. Cascading plans
//! move each victim to the next tier, recursively making room there, and
//! evict only from the last tier or when no room can be found.
//!
//! Every plan satisfies the same contract: applying it leaves at least one
//! directory in the requested location with the requested free bytes, it
//! names only evictable blocks visible in the view, and it never overfills a
//! destination. `None` means no such plan exists.

mod greedy;
mod lrfu;
mod lru;
mod plan;
mod planner;

pub use greedy::GreedyEvictor;
pub use lrfu::{DEFAULT_ATTENUATION_FACTOR, DEFAULT_STEP_FACTOR, LrfuEvictor};
pub use lru::LruEvictor;
pub use plan::{BlockTransferInfo, EvictionPlan, ExecutedPlan};

use crate::error::{BlockStoreError, BlockStoreResult};
use crate::events::BlockEventListener;
use crate::location::{BlockId, BlockStoreLocation, SessionId};
use crate::metrics;
use crate::view::BlockMetadataManagerView;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Eviction strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictorKind {
    /// Least recently used.
    #[default]
    Lru,
    /// First directory that can be freed, victims by block id.
    Greedy,
    /// Least recently/frequently used.
    Lrfu,
}

impl FromStr for EvictorKind {
    type Err = BlockStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "greedy" => Ok(Self::Greedy),
            "lrfu" => Ok(Self::Lrfu),
            other => Err(BlockStoreError::InvalidArgument(format!(
                "unknown evictor: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for EvictorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lru => write!(f, "lru"),
            Self::Greedy => write!(f, "greedy"),
            Self::Lrfu => write!(f, "lrfu"),
        }
    }
}

/// Evictor construction options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictorConfig {
    /// Strategy.
    pub kind: EvictorKind,
    /// Push victims down the hierarchy instead of evicting them (lru, lrfu).
    pub cascading: bool,
    /// LRFU step factor in `[0, 1]`.
    pub step_factor: f64,
    /// LRFU attenuation factor, at least 2.
    pub attenuation_factor: f64,
}

impl Default for EvictorConfig {
    fn default() -> Self {
        Self {
            kind: EvictorKind::Lru,
            cascading: false,
            step_factor: DEFAULT_STEP_FACTOR,
            attenuation_factor: DEFAULT_ATTENUATION_FACTOR,
        }
    }
}

impl EvictorConfig {
    /// Options for `kind` with defaults for everything else.
    pub fn new(kind: EvictorKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Enable or disable cascading placement.
    pub fn with_cascading(mut self, cascading: bool) -> Self {
        self.cascading = cascading;
        self
    }

    /// Set the LRFU step factor.
    pub fn with_step_factor(mut self, step_factor: f64) -> Self {
        self.step_factor = step_factor;
        self
    }

    /// Set the LRFU attenuation factor.
    pub fn with_attenuation_factor(mut self, attenuation_factor: f64) -> Self {
        self.attenuation_factor = attenuation_factor;
        self
    }

    /// Check the LRFU factors are in range.
    pub fn validate(&self) -> BlockStoreResult<()> {
        if !(0.0..=1.0).contains(&self.step_factor) {
            return Err(BlockStoreError::InvalidArgument(format!(
                "step factor {} must be within [0, 1]",
                self.step_factor
            )));
        }
        if self.attenuation_factor.is_nan() || self.attenuation_factor < 2.0 {
            return Err(BlockStoreError::InvalidArgument(format!(
                "attenuation factor {} must be at least 2",
                self.attenuation_factor
            )));
        }
        Ok(())
    }
}

/// Eviction planner over a closed set of strategies.
pub enum Evictor {
    /// See [`LruEvictor`].
    Lru(LruEvictor),
    /// See [`GreedyEvictor`].
    Greedy(GreedyEvictor),
    /// See [`LrfuEvictor`].
    Lrfu(LrfuEvictor),
}

impl Evictor {
    /// Build the evictor named by `config`, seeding its bookkeeping with the
    /// blocks currently visible in `view`.
    pub fn new(
        config: &EvictorConfig,
        view: &BlockMetadataManagerView<'_>,
    ) -> BlockStoreResult<Self> {
        config.validate()?;
        let evictor = match config.kind {
            EvictorKind::Lru => Self::Lru(LruEvictor::new(view, config.cascading)),
            EvictorKind::Greedy => Self::Greedy(GreedyEvictor::new()),
            EvictorKind::Lrfu => Self::Lrfu(LrfuEvictor::new(
                view,
                config.cascading,
                config.step_factor,
                config.attenuation_factor,
            )),
        };
        debug!(kind = %evictor.kind(), cascading = config.cascading, "created evictor");
        Ok(evictor)
    }

    /// Strategy of this evictor.
    pub fn kind(&self) -> EvictorKind {
        match self {
            Self::Lru(_) => EvictorKind::Lru,
            Self::Greedy(_) => EvictorKind::Greedy,
            Self::Lrfu(_) => EvictorKind::Lrfu,
        }
    }

    /// Plan how to make `bytes` free in some directory of `location`.
    ///
    /// Returns an empty plan when a directory already has room and `None`
    /// when no plan over the evictable blocks of `view` can achieve it.
    /// Fails only when `location` names an unknown tier or directory.
    pub fn free_space_with_view(
        &self,
        bytes: u64,
        location: &BlockStoreLocation,
        view: &BlockMetadataManagerView<'_>,
    ) -> BlockStoreResult<Option<EvictionPlan>> {
        let plan = match self {
            Self::Lru(evictor) => evictor.free_space_with_view(bytes, location, view)?,
            Self::Greedy(evictor) => evictor.free_space_with_view(bytes, location, view)?,
            Self::Lrfu(evictor) => evictor.free_space_with_view(bytes, location, view)?,
        };

        match &plan {
            Some(plan) => {
                metrics::EVICTION_PLANS.increment();
                debug!(bytes, location = %location, plan = %plan, "planned eviction");
            }
            None => {
                metrics::EVICTION_PLANS_INFEASIBLE.increment();
                debug!(bytes, location = %location, "no eviction plan can free space");
            }
        }
        Ok(plan)
    }

    fn listener(&self) -> &dyn BlockEventListener {
        match self {
            Self::Lru(evictor) => evictor,
            Self::Greedy(evictor) => evictor,
            Self::Lrfu(evictor) => evictor,
        }
    }
}

impl fmt::Debug for Evictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evictor").field("kind", &self.kind()).finish()
    }
}

impl BlockEventListener for Evictor {
    fn on_access_block(&self, session_id: SessionId, block_id: BlockId) {
        self.listener().on_access_block(session_id, block_id);
    }

    fn on_commit_block(
        &self,
        session_id: SessionId,
        block_id: BlockId,
        location: &BlockStoreLocation,
    ) {
        self.listener()
            .on_commit_block(session_id, block_id, location);
    }

    fn on_abort_block(&self, session_id: SessionId, block_id: BlockId) {
        self.listener().on_abort_block(session_id, block_id);
    }

    fn on_move_block(
        &self,
        session_id: SessionId,
        block_id: BlockId,
        old_location: &BlockStoreLocation,
        new_location: &BlockStoreLocation,
    ) {
        self.listener()
            .on_move_block(session_id, block_id, old_location, new_location);
    }

    fn on_remove_block(&self, session_id: SessionId, block_id: BlockId) {
        self.listener().on_remove_block(session_id, block_id);
    }
}
