//! Block store metrics.

use metriken::{Counter, metric};

// Temp block lifecycle
#[metric(
    name = "temp_blocks_created",
    description = "Total temp blocks registered for writing"
)]
pub static TEMP_BLOCKS_CREATED: Counter = Counter::new();

#[metric(
    name = "blocks_committed",
    description = "Total temp blocks committed"
)]
pub static BLOCKS_COMMITTED: Counter = Counter::new();

#[metric(name = "blocks_aborted", description = "Total temp blocks aborted")]
pub static BLOCKS_ABORTED: Counter = Counter::new();

#[metric(
    name = "session_temp_blocks_cleaned",
    description = "Total temp blocks removed by session cleanup"
)]
pub static SESSION_TEMP_BLOCKS_CLEANED: Counter = Counter::new();

// Committed block lifecycle
#[metric(
    name = "blocks_removed",
    description = "Total committed blocks removed"
)]
pub static BLOCKS_REMOVED: Counter = Counter::new();

#[metric(
    name = "blocks_moved",
    description = "Total committed blocks moved between directories"
)]
pub static BLOCKS_MOVED: Counter = Counter::new();

#[metric(
    name = "blocks_evicted",
    description = "Total committed blocks evicted by eviction plans"
)]
pub static BLOCKS_EVICTED: Counter = Counter::new();

// Space accounting
#[metric(
    name = "out_of_space",
    description = "Total operations rejected for lack of space"
)]
pub static OUT_OF_SPACE: Counter = Counter::new();

// Eviction planning
#[metric(
    name = "eviction_plans",
    description = "Total eviction plans computed"
)]
pub static EVICTION_PLANS: Counter = Counter::new();

#[metric(
    name = "eviction_plans_infeasible",
    description = "Total eviction requests with no feasible plan"
)]
pub static EVICTION_PLANS_INFEASIBLE: Counter = Counter::new();

#[metric(
    name = "eviction_plans_stale",
    description = "Total eviction plans discarded at execution time"
)]
pub static EVICTION_PLANS_STALE: Counter = Counter::new();

#[metric(
    name = "backend_rollbacks",
    description = "Total metadata moves rolled back after a backend failure"
)]
pub static BACKEND_ROLLBACKS: Counter = Counter::new();
