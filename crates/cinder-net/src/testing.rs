//! Transport fakes for replicator and facade tests.

use crate::messages::BreakMessage;
use crate::transport::BreakTransport;

/// Records everything sent; tests feed received messages in by hand.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub broadcasts: Vec<(BreakMessage, bool)>,
    pub to_server: Vec<BreakMessage>,
    pub inbox: Vec<BreakMessage>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message as if it arrived from the network.
    pub fn receive(&mut self, message: BreakMessage) {
        self.inbox.push(message);
    }
}

impl BreakTransport for RecordingTransport {
    fn broadcast(&mut self, message: &BreakMessage, only_on_client_join: bool) {
        self.broadcasts.push((message.clone(), only_on_client_join));
    }

    fn send_to_server(&mut self, message: &BreakMessage) {
        self.to_server.push(message.clone());
    }

    fn drain_received(&mut self) -> Vec<BreakMessage> {
        std::mem::take(&mut self.inbox)
    }
}
