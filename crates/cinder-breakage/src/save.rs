//! Save-game payload for the destruction state.
//!
//! The log itself is the persistence format: loading replays every event
//! through the live fracture path, so only the events, the broken-object
//! identities, and the removal journal need to round-trip.

use serde::{Deserialize, Serialize};

use crate::event_log::{BreakEvent, BrokenObjectRecord};

/// Serialized destruction state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub break_events: Vec<BreakEvent>,
    /// Broken-object records whose owner is an entity.
    pub broken_ent_parts: Vec<BrokenObjectRecord>,
    /// Broken-object records whose owner is static geometry.
    pub broken_veg_parts: Vec<BrokenObjectRecord>,
    /// Destroyed glass-pane chunk ids.
    pub broken_2d_chunks: Vec<u32>,
    /// Broken-mesh removal journal (`entity<<8|part`, `-1` frame markers).
    pub mesh_removals: Vec<i64>,
    /// Budget ceiling active when the save was taken.
    pub mem_limit_kb: u32,
}
