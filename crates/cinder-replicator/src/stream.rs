//! Break streams and their wire conversion.
//!
//! A stream is one replicated break: everything absorbed from the physics
//! callbacks between `begin_event` and finalization, addressed globally by
//! `break_idx` and per-object by `sub_break_idx`.

use glam::Vec3;
use tracing::warn;

use cinder_breakage::ObjectIdentifier;
use cinder_net::{
    BreakPayload, DeformBreakPayload, FINE_SAMPLE_M, PartBreakPayload, PlaneBreakPayload,
    QuantParams, COARSE_SAMPLE_M, StreamMessage, WireIdentifier, decode_dir, decode_f16,
    decode_mass, encode_dir, encode_f16, encode_mass,
};
use cinder_physics::{EntityId, PartId};

/// Fixed cap on products and joint breaks per stream. Overflow is dropped
/// with a warning rather than failing the stream.
pub const MAX_PRODUCTS: usize = 63;

/// Lifecycle of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Authority side: absorbing events.
    Recording,
    /// Replica side: received, waiting to play or playing.
    Playing,
    /// Applied (or sent) and closed.
    Finished,
    /// Placeholder for a `break_idx` whose message has not arrived yet.
    Dummy,
    /// Dropped: target never resolved or payload unusable.
    Invalid,
}

/// Unquantized break parameters, the in-memory twin of the wire payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum BreakKind {
    PartBreak {
        part: PartId,
        point: Vec3,
        dir: Vec3,
        energy: f32,
        mass: f32,
        seed: u32,
    },
    PlaneBreak {
        part: PartId,
        point: Vec3,
        dir: Vec3,
        speed: f32,
        mass: f32,
        material: i32,
        seed: u32,
        auto_shatter: bool,
        first_break: bool,
    },
    DeformBreak {
        part: PartId,
        point: Vec3,
        dir: Vec3,
        cut_height: f32,
        cut_size: f32,
        seed: u32,
    },
}

/// One break stream.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakStream {
    pub break_idx: u32,
    pub sub_break_idx: u16,
    pub identifier: ObjectIdentifier,
    pub kind: BreakKind,
    pub mode: StreamMode,
    pub only_on_client_join: bool,
    /// Joints that gave way while recording, in absorption order.
    pub joint_breaks: Vec<i32>,
    /// Product entities, local ids. On the wire they travel as net ids.
    pub products: Vec<EntityId>,
    /// Recording: frames since the last absorbed event.
    /// Playing: frames left in the post-apply grace period.
    pub idle_frames: u32,
    /// Frames spent failing to resolve the target.
    pub find_frames: u32,
    /// Frames spent waiting on a lower sub-order stream.
    pub dependency_frames: u32,
}

impl BreakStream {
    pub fn recording(
        break_idx: u32,
        sub_break_idx: u16,
        identifier: ObjectIdentifier,
        kind: BreakKind,
    ) -> Self {
        Self {
            break_idx,
            sub_break_idx,
            identifier,
            kind,
            mode: StreamMode::Recording,
            only_on_client_join: false,
            joint_breaks: Vec::new(),
            products: Vec::new(),
            idle_frames: 0,
            find_frames: 0,
            dependency_frames: 0,
        }
    }

    /// Placeholder for a break index whose message has not arrived.
    pub fn dummy(break_idx: u32) -> Self {
        let mut stream = Self::recording(
            break_idx,
            0,
            ObjectIdentifier::Unresolved,
            BreakKind::PartBreak {
                part: 0,
                point: Vec3::ZERO,
                dir: Vec3::Z,
                energy: 0.0,
                mass: 0.0,
                seed: 0,
            },
        );
        stream.mode = StreamMode::Dummy;
        stream
    }

    pub fn part(&self) -> PartId {
        match self.kind {
            BreakKind::PartBreak { part, .. }
            | BreakKind::PlaneBreak { part, .. }
            | BreakKind::DeformBreak { part, .. } => part,
        }
    }

    pub fn push_joint_break(&mut self, joint: i32) {
        if self.joint_breaks.len() >= MAX_PRODUCTS {
            warn!(
                break_idx = self.break_idx,
                joint, "stream joint-break capacity reached, dropping"
            );
            return;
        }
        self.joint_breaks.push(joint);
        self.idle_frames = 0;
    }

    pub fn push_product(&mut self, entity: EntityId) {
        if self.products.len() >= MAX_PRODUCTS {
            warn!(
                break_idx = self.break_idx,
                %entity,
                "stream product capacity reached, dropping"
            );
            return;
        }
        self.products.push(entity);
        self.idle_frames = 0;
    }
}

// ---------------------------------------------------------------------------
// Wire conversion
// ---------------------------------------------------------------------------

/// Map a local identifier to its wire form.
pub fn identifier_to_wire(
    identifier: &ObjectIdentifier,
    quant: &QuantParams,
    net_id_of: impl Fn(EntityId) -> Option<u32>,
) -> Option<WireIdentifier> {
    match *identifier {
        ObjectIdentifier::Unresolved => None,
        ObjectIdentifier::Entity(id) => net_id_of(id).map(WireIdentifier::Entity),
        ObjectIdentifier::Static { center, hash } => Some(WireIdentifier::Static {
            center: quant.encode_pos(center, COARSE_SAMPLE_M),
            hash,
        }),
    }
}

/// Map a wire identifier back to a local one. Entity net ids stay as
/// identifiers until the binding table resolves them.
pub fn identifier_from_wire(
    wire: &WireIdentifier,
    quant: &QuantParams,
    local_id_of: impl Fn(u32) -> Option<EntityId>,
) -> ObjectIdentifier {
    match *wire {
        WireIdentifier::Entity(net) => match local_id_of(net) {
            Some(id) => ObjectIdentifier::Entity(id),
            None => ObjectIdentifier::Unresolved,
        },
        WireIdentifier::Static { center, hash } => ObjectIdentifier::Static {
            center: quant.decode_pos(center, COARSE_SAMPLE_M),
            hash,
        },
    }
}

/// Quantize a finalized stream for broadcast.
pub fn encode_stream(
    stream: &BreakStream,
    quant: &QuantParams,
    net_id_of: impl Fn(EntityId) -> Option<u32>,
) -> Option<StreamMessage> {
    let identifier = identifier_to_wire(&stream.identifier, quant, &net_id_of)?;
    let products: Vec<u32> = stream
        .products
        .iter()
        .filter_map(|id| net_id_of(*id))
        .collect();

    let payload = match stream.kind {
        BreakKind::PartBreak {
            part,
            point,
            dir,
            energy,
            mass,
            seed,
        } => BreakPayload::PartBreak(PartBreakPayload {
            identifier,
            part,
            point: quant.encode_pos(point, FINE_SAMPLE_M),
            dir: encode_dir(dir),
            energy: encode_f16(energy),
            mass: encode_mass(mass),
            seed,
            joint_breaks: stream.joint_breaks.clone(),
            products,
        }),
        BreakKind::PlaneBreak {
            part,
            point,
            dir,
            speed,
            mass,
            material,
            seed,
            auto_shatter,
            first_break,
        } => BreakPayload::PlaneBreak(PlaneBreakPayload {
            identifier,
            part,
            point: quant.encode_pos(point, FINE_SAMPLE_M),
            dir: encode_dir(dir),
            speed: encode_f16(speed),
            mass: encode_mass(mass),
            material,
            seed,
            auto_shatter,
            first_break,
            products,
        }),
        BreakKind::DeformBreak {
            part,
            point,
            dir,
            cut_height,
            cut_size,
            seed,
        } => BreakPayload::DeformBreak(DeformBreakPayload {
            identifier,
            part,
            point: quant.encode_pos(point, FINE_SAMPLE_M),
            dir: encode_dir(dir),
            cut_height: encode_f16(cut_height),
            cut_size: encode_f16(cut_size),
            seed,
            products,
        }),
    };

    Some(StreamMessage {
        break_idx: stream.break_idx,
        sub_break_idx: stream.sub_break_idx,
        only_on_client_join: stream.only_on_client_join,
        payload,
    })
}

/// Reconstruct a playable stream from a received message. Product net ids
/// are returned separately; they bind as playback spawns entities.
pub fn decode_stream(
    message: &StreamMessage,
    quant: &QuantParams,
    local_id_of: impl Fn(u32) -> Option<EntityId>,
) -> (BreakStream, Vec<u32>) {
    let identifier = identifier_from_wire(&message.payload.identifier(), quant, &local_id_of);

    let (kind, joint_breaks, product_net_ids) = match &message.payload {
        BreakPayload::PartBreak(p) => (
            BreakKind::PartBreak {
                part: p.part,
                point: quant.decode_pos(p.point, FINE_SAMPLE_M),
                dir: decode_dir(p.dir.0, p.dir.1),
                energy: decode_f16(p.energy),
                mass: decode_mass(p.mass),
                seed: p.seed,
            },
            p.joint_breaks.clone(),
            p.products.clone(),
        ),
        BreakPayload::PlaneBreak(p) => (
            BreakKind::PlaneBreak {
                part: p.part,
                point: quant.decode_pos(p.point, FINE_SAMPLE_M),
                dir: decode_dir(p.dir.0, p.dir.1),
                speed: decode_f16(p.speed),
                mass: decode_mass(p.mass),
                material: p.material,
                seed: p.seed,
                auto_shatter: p.auto_shatter,
                first_break: p.first_break,
            },
            Vec::new(),
            p.products.clone(),
        ),
        BreakPayload::DeformBreak(p) => (
            BreakKind::DeformBreak {
                part: p.part,
                point: quant.decode_pos(p.point, FINE_SAMPLE_M),
                dir: decode_dir(p.dir.0, p.dir.1),
                cut_height: decode_f16(p.cut_height),
                cut_size: decode_f16(p.cut_size),
                seed: p.seed,
            },
            Vec::new(),
            p.products.clone(),
        ),
    };

    let stream = BreakStream {
        break_idx: message.break_idx,
        sub_break_idx: message.sub_break_idx,
        identifier,
        kind,
        mode: StreamMode::Playing,
        only_on_client_join: message.only_on_client_join,
        joint_breaks,
        products: Vec::new(),
        idle_frames: 0,
        find_frames: 0,
        dependency_frames: 0,
    };
    (stream, product_net_ids)
}
