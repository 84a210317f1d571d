//! Two-lane event dispatch.
//!
//! The physics engine reports each event on one of two lanes. The immediate
//! lane fires synchronously inside the physics step, possibly from a worker
//! thread; handlers there must not block and may only veto propagation. The
//! logged lane buffers events until the main thread drains them once per
//! frame, after the step has settled, in arrival order.

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::trace;

use crate::events::PhysicsEvent;

/// Return value of an immediate handler: whether the engine should continue
/// propagating the contact. A breakable surface that will fracture suppresses
/// further physical response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Allow,
    Suppress,
}

/// Handler invoked in-step, potentially from the physics thread.
pub type ImmediateHandler = Box<dyn Fn(&PhysicsEvent) -> EventOutcome + Send + Sync>;

/// Cloneable handle physics workers use to queue logged events.
pub type LoggedDrain = Receiver<PhysicsEvent>;

/// Routes physics events to the immediate handlers and the logged queue.
pub struct EventDispatch {
    immediate: Vec<ImmediateHandler>,
    logged_tx: Sender<PhysicsEvent>,
    logged_rx: Receiver<PhysicsEvent>,
}

impl Default for EventDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatch {
    pub fn new() -> Self {
        let (logged_tx, logged_rx) = unbounded();
        Self {
            immediate: Vec::new(),
            logged_tx,
            logged_rx,
        }
    }

    /// Register a handler for the immediate lane. Handlers run in
    /// registration order; the first `Suppress` wins.
    pub fn register_immediate(&mut self, handler: ImmediateHandler) {
        self.immediate.push(handler);
    }

    /// Sender for the logged lane, cloneable into physics worker threads.
    pub fn logged_sender(&self) -> Sender<PhysicsEvent> {
        self.logged_tx.clone()
    }

    /// Dispatch on the immediate lane and also queue the event for the
    /// logged drain. Called by the physics step.
    pub fn dispatch(&self, event: PhysicsEvent) -> EventOutcome {
        let outcome = self.dispatch_immediate(&event);
        // Suppressed contacts are still logged; the end-of-frame pass is
        // where break events get recorded.
        if self.logged_tx.send(event).is_err() {
            trace!("logged event dropped, drain side closed");
        }
        outcome
    }

    /// Run only the immediate handlers.
    pub fn dispatch_immediate(&self, event: &PhysicsEvent) -> EventOutcome {
        for handler in &self.immediate {
            if handler(event) == EventOutcome::Suppress {
                return EventOutcome::Suppress;
            }
        }
        EventOutcome::Allow
    }

    /// Drain every event queued since the last drain, in arrival order.
    /// Main thread only, once per frame.
    pub fn drain_logged(&self) -> Vec<PhysicsEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.logged_rx.try_recv() {
            events.push(event);
        }
        events
    }
}
