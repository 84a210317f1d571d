//! The break replication state machine.
//!
//! Authority side: physics callbacks are bracketed by `begin_break` and
//! `end_event`; everything observed in between is absorbed into one stream
//! per target object. A stream with no new events for a few frames is
//! finalized, quantized, and broadcast. Replica side: received streams wait
//! for their target to resolve, for its render mesh, for exclusive access to
//! the entity, and for lower sub-order streams, then re-run the break
//! through the same fracture entry point the authority used.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use cinder_breakage::{IdentifierRegistry, ObjectIdentifier};
use cinder_config::NetworkConfig;
use cinder_net::{
    BreakMessage, BreakPayload, BreakTransport, PlaneBreakPayload, QuantParams, StreamMessage,
};
use cinder_physics::{EntityId, PhysicalOwner, WorldAccess};

use crate::stream::{BreakKind, BreakStream, StreamMode, decode_stream, encode_stream};

/// Hard cap on streams per session.
pub const MAX_STREAMS: u32 = 4096;

/// Which side of the session this replicator plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Applies a resolved break to the local world.
///
/// The game facade implements this; it owns the event log, budget, and
/// fracture wiring that playback must re-enter.
pub trait BreakApplier {
    /// Returns the entities the break spawned, in spawn order, or `None`
    /// when the break could not be applied.
    fn apply_break(
        &mut self,
        world: &mut dyn WorldAccess,
        target: PhysicalOwner,
        kind: &BreakKind,
    ) -> Option<Vec<EntityId>>;
}

/// Two-way map between local entity ids and session-scoped net ids.
#[derive(Debug, Default)]
pub struct BindingTable {
    net_to_local: FxHashMap<u32, EntityId>,
    local_to_net: FxHashMap<EntityId, u32>,
    next_net_id: u32,
}

impl BindingTable {
    pub fn bind(&mut self, net: u32, local: EntityId) {
        self.net_to_local.insert(net, local);
        self.local_to_net.insert(local, net);
    }

    /// Authority side: net id for a local entity, allocating on first use.
    pub fn allocate(&mut self, local: EntityId) -> u32 {
        if let Some(net) = self.local_to_net.get(&local) {
            return *net;
        }
        self.next_net_id += 1;
        let net = self.next_net_id;
        self.bind(net, local);
        net
    }

    pub fn local(&self, net: u32) -> Option<EntityId> {
        self.net_to_local.get(&net).copied()
    }

    pub fn net(&self, local: EntityId) -> Option<u32> {
        self.local_to_net.get(&local).copied()
    }

    pub fn unbind_local(&mut self, local: EntityId) {
        if let Some(net) = self.local_to_net.remove(&local) {
            self.net_to_local.remove(&net);
        }
    }
}

/// Record/playback state machine for replicated breaks.
pub struct BreakReplicator {
    cfg: NetworkConfig,
    quant: QuantParams,
    role: Role,
    streams: BTreeMap<u32, BreakStream>,
    /// Product net ids per received stream, bound as playback spawns.
    pending_products: FxHashMap<u32, Vec<u32>>,
    next_break_idx: u32,
    highest_received: Option<u32>,
    /// Stream bracketed by the current begin/end pair.
    active: Option<u32>,
    registry: IdentifierRegistry,
    bindings: BindingTable,
    level_time: f32,
}

impl BreakReplicator {
    pub fn new(cfg: NetworkConfig, role: Role) -> Self {
        let quant = QuantParams {
            max_world_size: cfg.max_world_size_m,
            offset: glam::Vec3::new(cfg.world_offset_x, cfg.world_offset_y, 0.0),
        };
        Self {
            cfg,
            quant,
            role,
            streams: BTreeMap::new(),
            pending_products: FxHashMap::default(),
            next_break_idx: 0,
            highest_received: None,
            active: None,
            registry: IdentifierRegistry::default(),
            bindings: BindingTable::default(),
            level_time: 0.0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn registry_mut(&mut self) -> &mut IdentifierRegistry {
        &mut self.registry
    }

    pub fn bindings_mut(&mut self) -> &mut BindingTable {
        &mut self.bindings
    }

    pub fn stream_mode(&self, break_idx: u32) -> Option<StreamMode> {
        self.streams.get(&break_idx).map(|s| s.mode)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Reset for a level change.
    pub fn clear(&mut self) {
        self.streams.clear();
        self.pending_products.clear();
        self.next_break_idx = 0;
        self.highest_received = None;
        self.active = None;
        self.registry.clear();
        self.level_time = 0.0;
    }

    // -----------------------------------------------------------------------
    // Authority: recording
    // -----------------------------------------------------------------------

    /// Open (or re-open) the stream for a break on `identifier`. Events
    /// until `end_event` are absorbed into it. Returns false when the
    /// session's stream budget is spent.
    pub fn begin_break(&mut self, identifier: ObjectIdentifier, kind: BreakKind) -> bool {
        if self.role != Role::Server {
            return false;
        }

        // Absorption: a recording stream for the same object keeps
        // collecting instead of opening a new stream per callback.
        if let Some((idx, stream)) = self
            .streams
            .iter_mut()
            .rev()
            .find(|(_, s)| s.mode == StreamMode::Recording && s.identifier == identifier)
        {
            stream.idle_frames = 0;
            self.active = Some(*idx);
            return true;
        }

        if self.next_break_idx >= MAX_STREAMS {
            warn!(
                break_idx = self.next_break_idx,
                "stream budget exhausted, break not replicated"
            );
            return false;
        }

        // Sub-order: next per-object sequence number, found by scanning
        // backwards for the most recent stream on the same object.
        let sub_break_idx = self
            .streams
            .values()
            .rev()
            .find(|s| s.identifier == identifier)
            .map(|s| s.sub_break_idx + 1)
            .unwrap_or(0);

        let break_idx = self.next_break_idx;
        self.next_break_idx += 1;
        self.streams.insert(
            break_idx,
            BreakStream::recording(break_idx, sub_break_idx, identifier, kind),
        );
        self.active = Some(break_idx);
        true
    }

    /// Absorb a joint failure into the active stream.
    pub fn absorb_joint(&mut self, joint: i32) {
        if let Some(stream) = self.active.and_then(|i| self.streams.get_mut(&i)) {
            stream.push_joint_break(joint);
        }
    }

    /// Absorb a spawned product entity into the active stream.
    pub fn absorb_product(&mut self, entity: EntityId) {
        if let Some(stream) = self.active.and_then(|i| self.streams.get_mut(&i)) {
            stream.push_product(entity);
        }
    }

    /// Mark the active stream for client-join replay. Secondary plane
    /// breaks must reach late joiners even after the initial broadcast.
    pub fn mark_client_join_replay(&mut self) {
        if let Some(stream) = self.active.and_then(|i| self.streams.get_mut(&i)) {
            stream.only_on_client_join = true;
        }
    }

    /// Close the begin/end bracket.
    pub fn end_event(&mut self) {
        self.active = None;
    }

    // -----------------------------------------------------------------------
    // Host migration
    // -----------------------------------------------------------------------

    /// Losing authority: anything still recording can never be finalized.
    pub fn on_demote(&mut self) {
        self.role = Role::Client;
        self.active = None;
        for stream in self.streams.values_mut() {
            if stream.mode == StreamMode::Recording {
                debug!(break_idx = stream.break_idx, "recording abandoned on demote");
                stream.mode = StreamMode::Invalid;
            }
        }
    }

    /// Gaining authority: the finished log is re-broadcast join-only so
    /// clients connecting after the migration still receive history.
    pub fn on_promote(&mut self, transport: &mut dyn BreakTransport) {
        self.role = Role::Server;
        for stream in self.streams.values() {
            if stream.mode != StreamMode::Finished {
                continue;
            }
            match encode_stream(stream, &self.quant, |id| self.bindings.net(id)) {
                Some(message) => transport.broadcast(&BreakMessage::Stream(message), true),
                None => debug!(
                    break_idx = stream.break_idx,
                    "finished stream unencodable after promote"
                ),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Replica: client-side sends
    // -----------------------------------------------------------------------

    /// Report a locally broken glass pane to the authority. The server
    /// plays it back directly without entering its stream log.
    pub fn send_client_glass_break(
        &mut self,
        transport: &mut dyn BreakTransport,
        identifier: &ObjectIdentifier,
        kind: &BreakKind,
    ) {
        let BreakKind::PlaneBreak { .. } = kind else {
            return;
        };
        let stream = BreakStream::recording(0, 0, *identifier, kind.clone());
        let Some(message) = encode_stream(&stream, &self.quant, |id| self.bindings.net(id)) else {
            debug!("client glass break target has no binding, not sent");
            return;
        };
        let BreakPayload::PlaneBreak(payload) = message.payload else {
            return;
        };
        transport.send_to_server(&BreakMessage::ClientGlassBreak(payload));
    }

    // -----------------------------------------------------------------------
    // Frame update
    // -----------------------------------------------------------------------

    /// Per-frame drive: drain the transport, finalize cooled-down
    /// recordings, and play back what is ready.
    pub fn update(
        &mut self,
        dt: f32,
        world: &mut dyn WorldAccess,
        applier: &mut dyn BreakApplier,
        transport: &mut dyn BreakTransport,
    ) {
        self.level_time += dt;

        for message in transport.drain_received() {
            match message {
                BreakMessage::Stream(msg) => self.accept_stream(msg),
                BreakMessage::ClientGlassBreak(payload) => {
                    self.apply_client_glass_break(world, applier, payload);
                }
            }
        }

        if self.role == Role::Server {
            self.finalize_cooled_recordings(transport);
        }
        self.run_playback(world, applier);
    }

    fn accept_stream(&mut self, msg: StreamMessage) {
        if self.role == Role::Server {
            debug!(break_idx = msg.break_idx, "authority ignoring stream broadcast");
            return;
        }
        if msg.break_idx >= MAX_STREAMS {
            warn!(break_idx = msg.break_idx, "stream index out of range, dropped");
            return;
        }

        let pending = self
            .streams
            .values()
            .filter(|s| matches!(s.mode, StreamMode::Playing | StreamMode::Dummy))
            .count();
        if pending >= self.cfg.max_pending_streams {
            warn!(
                break_idx = msg.break_idx,
                pending, "pending stream capacity reached, message dropped"
            );
            return;
        }

        // Placeholders for indices skipped by reordering or loss; each fills
        // in when (if) its message arrives.
        let first_gap = self.highest_received.map(|h| h + 1).unwrap_or(0);
        for gap in first_gap..msg.break_idx {
            self.streams
                .entry(gap)
                .or_insert_with(|| BreakStream::dummy(gap));
        }
        self.highest_received = Some(
            self.highest_received
                .map_or(msg.break_idx, |h| h.max(msg.break_idx)),
        );

        let replaceable = match self.streams.get(&msg.break_idx) {
            None => true,
            Some(existing) => existing.mode == StreamMode::Dummy,
        };
        if !replaceable {
            debug!(break_idx = msg.break_idx, "duplicate stream ignored");
            return;
        }

        let (stream, product_net_ids) =
            decode_stream(&msg, &self.quant, |net| self.bindings.local(net));
        self.pending_products.insert(msg.break_idx, product_net_ids);
        self.streams.insert(msg.break_idx, stream);
    }

    fn apply_client_glass_break(
        &mut self,
        world: &mut dyn WorldAccess,
        applier: &mut dyn BreakApplier,
        payload: PlaneBreakPayload,
    ) {
        if self.role != Role::Server {
            return;
        }
        let msg = StreamMessage {
            break_idx: 0,
            sub_break_idx: 0,
            only_on_client_join: false,
            payload: BreakPayload::PlaneBreak(payload),
        };
        let (stream, _) = decode_stream(&msg, &self.quant, |net| self.bindings.local(net));
        match stream.identifier.resolve(world, &self.registry) {
            Some(target) => {
                applier.apply_break(world, target, &stream.kind);
            }
            None => debug!("client glass break target not found"),
        }
    }

    fn finalize_cooled_recordings(&mut self, transport: &mut dyn BreakTransport) {
        let cooled: Vec<u32> = self
            .streams
            .iter_mut()
            .filter_map(|(idx, s)| {
                if s.mode != StreamMode::Recording {
                    return None;
                }
                // Streams touched this frame had their idle count reset
                s.idle_frames += 1;
                (s.idle_frames > self.cfg.recording_frames).then_some(*idx)
            })
            .collect();

        for idx in cooled {
            let Some(stream) = self.streams.get(&idx) else {
                continue;
            };
            let only_on_join = stream.only_on_client_join;
            let products = stream.products.clone();
            let target_entity = match stream.identifier {
                ObjectIdentifier::Entity(id) => Some(id),
                _ => None,
            };

            // Net ids must exist before the encode closure looks them up
            for id in products {
                self.bindings.allocate(id);
            }
            if let Some(id) = target_entity {
                self.bindings.allocate(id);
            }

            let message = self
                .streams
                .get(&idx)
                .and_then(|s| encode_stream(s, &self.quant, |id| self.bindings.net(id)));

            if let Some(stream) = self.streams.get_mut(&idx) {
                match message {
                    Some(message) => {
                        transport.broadcast(&BreakMessage::Stream(message), only_on_join);
                        stream.mode = StreamMode::Finished;
                    }
                    None => {
                        warn!(break_idx = idx, "stream target unencodable, dropped");
                        stream.mode = StreamMode::Invalid;
                    }
                }
            }
        }
    }

    fn run_playback(&mut self, world: &mut dyn WorldAccess, applier: &mut dyn BreakApplier) {
        // Close out post-apply grace periods from earlier frames
        for stream in self.streams.values_mut() {
            if stream.mode == StreamMode::Playing && stream.idle_frames > 0 {
                stream.idle_frames -= 1;
                if stream.idle_frames == 0 {
                    stream.mode = StreamMode::Finished;
                }
            }
        }

        let settled = self.level_time >= self.cfg.level_settle_time_s;
        let pending: Vec<u32> = self
            .streams
            .iter()
            .filter(|(_, s)| s.mode == StreamMode::Playing && s.idle_frames == 0)
            .map(|(idx, _)| *idx)
            .collect();

        let mut played = 0u32;
        for idx in pending {
            if played >= self.cfg.max_playbacks_per_frame {
                break;
            }
            if self.try_play_stream(idx, settled, world, applier) {
                played += 1;
            }
        }
    }

    /// Attempt playback of one stream; returns true if it was applied.
    fn try_play_stream(
        &mut self,
        idx: u32,
        settled: bool,
        world: &mut dyn WorldAccess,
        applier: &mut dyn BreakApplier,
    ) -> bool {
        let Some(stream) = self.streams.get(&idx) else {
            return false;
        };
        let identifier = stream.identifier;
        let sub_break_idx = stream.sub_break_idx;
        let kind = stream.kind.clone();
        let part = stream.part();

        let Some(target) = identifier.resolve(world, &self.registry) else {
            // The settle window gives level load a chance to spawn
            // everything before the invalid-find clock starts.
            if settled {
                self.bump_find_frames(idx, "stream target never resolved, dropped");
            }
            return false;
        };

        if let PhysicalOwner::Entity(id) = target {
            // Exclusivity: one stream at a time per entity
            let busy = self.streams.values().any(|s| {
                s.break_idx != idx
                    && s.mode == StreamMode::Playing
                    && s.idle_frames > 0
                    && s.identifier == ObjectIdentifier::Entity(id)
            });
            if busy {
                return false;
            }
            if !world.render_mesh_ready(id, part) {
                if settled {
                    self.bump_find_frames(idx, "render mesh never ready, dropped");
                }
                return false;
            }
        }

        // Sub-order: earlier breaks on the same object, and any unreceived
        // lower stream, must go first. But only wait so long.
        let blocked = self.streams.values().any(|s| {
            (s.mode == StreamMode::Dummy && s.break_idx < idx)
                || (s.break_idx != idx
                    && s.mode == StreamMode::Playing
                    && s.identifier == identifier
                    && s.sub_break_idx < sub_break_idx)
        });
        if blocked {
            let force = if let Some(stream) = self.streams.get_mut(&idx) {
                stream.dependency_frames += 1;
                stream.dependency_frames > self.cfg.max_frames_to_wait_dependency
            } else {
                false
            };
            if !force {
                return false;
            }
            debug!(
                break_idx = idx,
                sub_break_idx, "forcing playback past missing predecessor"
            );
        }

        let spawned = applier.apply_break(world, target, &kind);

        let product_net_ids = self.pending_products.remove(&idx).unwrap_or_default();
        if let Some(spawned) = &spawned {
            // Bind authority product ids to our spawned entities, in order
            for (net, local) in product_net_ids.iter().zip(spawned) {
                self.bindings.bind(*net, *local);
            }
            // First break of a static object leaves an entity behind; bind
            // it so later streams on the same object resolve directly.
            if let (ObjectIdentifier::Static { hash, .. }, Some(first)) =
                (identifier, spawned.first())
            {
                self.registry.bind(hash, *first);
            }
        }

        let grace = self.cfg.playback_frames.max(1);
        let Some(stream) = self.streams.get_mut(&idx) else {
            return false;
        };
        match spawned {
            Some(spawned_ids) => {
                stream.products = spawned_ids;
                stream.idle_frames = grace;
                true
            }
            None => {
                debug!(break_idx = idx, "break application failed, stream dropped");
                stream.mode = StreamMode::Invalid;
                false
            }
        }
    }

    fn bump_find_frames(&mut self, idx: u32, drop_reason: &'static str) {
        if let Some(stream) = self.streams.get_mut(&idx) {
            stream.find_frames += 1;
            if stream.find_frames > self.cfg.max_frames_to_find_entity {
                debug!(break_idx = idx, drop_reason);
                stream.mode = StreamMode::Invalid;
            }
        }
    }
}
