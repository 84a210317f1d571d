//! Breakage throttling counters.
//!
//! Two independent brakes on runaway destruction: a broken-tree counter
//! that denies deform breaks while saturated, and a per-frame glass counter
//! that forces auto-shatter once too many panes break in one frame.

use cinder_config::BreakageConfig;
use tracing::debug;

#[derive(Debug)]
pub struct BreakageThrottling {
    tree_counter: u32,
    tree_counter_max: u32,
    tree_counter_inc: u32,
    tree_counter_dec: u32,
    glass_events: u32,
    glass_counter_inc: u32,
    max_panes_per_frame: u32,
}

impl BreakageThrottling {
    pub fn new(cfg: &BreakageConfig) -> Self {
        Self {
            tree_counter: 0,
            tree_counter_max: cfg.tree_counter_max,
            tree_counter_inc: cfg.tree_counter_inc,
            tree_counter_dec: cfg.tree_counter_dec,
            glass_events: 0,
            glass_counter_inc: cfg.glass_counter_inc,
            max_panes_per_frame: cfg.max_panes_per_frame,
        }
    }

    /// Whether a deform (tree) break may proceed. Vehicles always break
    /// through; everything else charges the counter and is denied while it
    /// sits above the maximum. A maximum of 0 disables the throttle.
    pub fn allow_deform_break(&mut self, impactor_is_vehicle: bool) -> bool {
        if self.tree_counter_max == 0 {
            return true;
        }
        if !impactor_is_vehicle && self.tree_counter > self.tree_counter_max {
            debug!(counter = self.tree_counter, "deform break throttled");
            return false;
        }
        self.tree_counter += self.tree_counter_inc;
        true
    }

    /// Charge one glass break. Returns true when this frame has seen enough
    /// panes that further breaks should auto-shatter instead of fracturing.
    pub fn note_glass_event(&mut self) -> bool {
        self.glass_events += self.glass_counter_inc;
        self.glass_events > self.max_panes_per_frame
    }

    /// Per-frame decay.
    pub fn end_frame(&mut self) {
        self.tree_counter = self.tree_counter.saturating_sub(self.tree_counter_dec);
        self.glass_events = 0;
    }

    pub fn tree_counter(&self) -> u32 {
        self.tree_counter
    }
}
