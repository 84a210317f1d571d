//! Capture, bounding, and reuse of procedural destruction.
//!
//! The pipeline owned by this crate: physics collisions become append-only
//! [`BreakEvent`]s, generated break geometry is tracked and evicted by the
//! [`BrokenMeshBudget`], expensive mesh-island extraction runs through the
//! [`DeferredFractureScheduler`], and single-player tree cuts may be served
//! from the [`TreeBreakageReuseCache`] instead of re-fracturing.

mod budget;
mod event_log;
mod identifier;
mod save;
mod scheduler;
mod tree_reuse;

pub use budget::{BrokenMeshBudget, BrokenMeshRecord, BudgetDebugEntry};
pub use event_log::{
    BreakEvent, BreakEventRef, BreakEventState, BreakTarget, BreakEventLog, BrokenObjectRecord,
    BrokenObjectTable,
};
pub use identifier::{IdentifierRegistry, ObjectIdentifier, RESOLVE_EPS, selector_hash};
pub use save::SaveState;
pub use scheduler::{DeferredFractureScheduler, FractureTask, SubmitOutcome};
pub use tree_reuse::{TreeBreakInstance, TreeBreakageReuseCache, TreePieceThunk};
