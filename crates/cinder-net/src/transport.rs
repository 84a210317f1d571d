//! Delivery seam for break messages.

use crate::messages::BreakMessage;

/// Reliable, unordered, per-message delivery of break messages.
///
/// The session layer implements this over its own sockets; the replicator
/// only needs send and a per-frame drain of arrivals.
pub trait BreakTransport {
    /// Broadcast to every connected replica. Messages flagged
    /// `only_on_client_join` are additionally queued for participants that
    /// join later.
    fn broadcast(&mut self, message: &BreakMessage, only_on_client_join: bool);

    /// Send to the authority (client side only).
    fn send_to_server(&mut self, message: &BreakMessage);

    /// Drain messages received since the last call, in arrival order.
    /// Arrival order carries no guarantees relative to send order.
    fn drain_received(&mut self) -> Vec<BreakMessage>;
}
