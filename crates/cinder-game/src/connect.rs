//! Session bring-up and host-migration listener.
//!
//! The connect sequence steps through fixed phases; each phase polls engine
//! state until its condition holds. A connection is declared dead only when
//! the channel is gone AND it has been stale past the threshold; either
//! alone is survivable (reconnect in progress, or a long load).

use cinder_net::BreakTransport;
use cinder_replicator::BreakReplicator;
use tracing::{debug, info};

/// Seconds without channel traffic before a missing channel is fatal.
pub const STALE_CHANNEL_S: f32 = 30.0;

/// Where session bring-up currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPhase {
    WaitForConnection,
    WaitForPlayer,
    WaitForInGame,
    Done,
}

/// One poll's worth of engine state, fed to [`ConnectState::step`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectProbe {
    pub has_channel: bool,
    pub player_spawned: bool,
    pub in_game: bool,
    /// Seconds since the channel last carried traffic.
    pub channel_stale_s: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Waiting,
    Done,
    Failed,
}

/// Connect-sequence state machine.
#[derive(Debug)]
pub struct ConnectState {
    phase: ConnectPhase,
}

impl ConnectState {
    pub fn new() -> Self {
        Self {
            phase: ConnectPhase::WaitForConnection,
        }
    }

    pub fn phase(&self) -> ConnectPhase {
        self.phase
    }

    pub fn step(&mut self, probe: &ConnectProbe) -> ConnectOutcome {
        // Dead only when both hold at once
        if !probe.has_channel && probe.channel_stale_s >= STALE_CHANNEL_S {
            debug!(stale_s = probe.channel_stale_s, "connection declared dead");
            return ConnectOutcome::Failed;
        }

        match self.phase {
            ConnectPhase::WaitForConnection => {
                if probe.has_channel {
                    self.phase = ConnectPhase::WaitForPlayer;
                }
                ConnectOutcome::Waiting
            }
            ConnectPhase::WaitForPlayer => {
                if probe.player_spawned {
                    self.phase = ConnectPhase::WaitForInGame;
                }
                ConnectOutcome::Waiting
            }
            ConnectPhase::WaitForInGame => {
                if probe.in_game {
                    self.phase = ConnectPhase::Done;
                    info!("session connected");
                    return ConnectOutcome::Done;
                }
                ConnectOutcome::Waiting
            }
            ConnectPhase::Done => ConnectOutcome::Done,
        }
    }
}

impl Default for ConnectState {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives role changes through the replicator, optionally delaying the
/// promoted side so migration feature tests can attach deterministically.
#[derive(Debug)]
pub struct HostMigrationListener {
    server_delay_s: f32,
    promote_timer: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerStatus {
    Idle,
    /// Promotion accepted, waiting out the configured grace delay.
    Waiting,
    Promoted,
}

impl HostMigrationListener {
    pub fn new(server_delay_s: f32) -> Self {
        Self {
            server_delay_s,
            promote_timer: None,
        }
    }

    /// This machine was chosen as the new host.
    pub fn on_promote(&mut self) {
        info!(delay_s = self.server_delay_s, "host migration: promoting");
        self.promote_timer = Some(self.server_delay_s);
    }

    /// This machine lost authority.
    pub fn on_demote(&mut self, replicator: &mut BreakReplicator) {
        info!("host migration: demoting");
        self.promote_timer = None;
        replicator.on_demote();
    }

    /// Advance the promote delay; completes the promotion when it elapses.
    pub fn update(
        &mut self,
        dt: f32,
        replicator: &mut BreakReplicator,
        transport: &mut dyn BreakTransport,
    ) -> ListenerStatus {
        let Some(timer) = self.promote_timer.as_mut() else {
            return ListenerStatus::Idle;
        };
        *timer -= dt;
        if *timer > 0.0 {
            return ListenerStatus::Waiting;
        }
        self.promote_timer = None;
        replicator.on_promote(transport);
        ListenerStatus::Promoted
    }
}
