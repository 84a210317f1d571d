//! Break replication messages.
//!
//! All messages are serialized with [`postcard`] and prefixed with a
//! protocol version byte. Payload geometry is pre-quantized with the codecs
//! in [`crate::quant`]; the structs here carry only the quantized integers
//! so the wire cost is explicit.

use serde::{Deserialize, Serialize};

use cinder_physics::PartId;

/// Current wire-protocol version. Prepended to every serialized message.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Identifiers on the wire
// ---------------------------------------------------------------------------

/// Wire form of an object identifier. Entity ids are network ids bound by
/// the session layer; static targets travel as coarse center + hash.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WireIdentifier {
    Entity(u32),
    Static { center: [u32; 3], hash: u32 },
}

// ---------------------------------------------------------------------------
// Stream payloads
// ---------------------------------------------------------------------------

/// A rigid part broke off (joint failure, part detach).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartBreakPayload {
    pub identifier: WireIdentifier,
    pub part: PartId,
    /// Impact point, fine grid.
    pub point: [u32; 3],
    /// Impact direction, 8-bit yaw + pitch.
    pub dir: (u8, u8),
    /// Impact energy, truncated float.
    pub energy: u16,
    /// Impactor mass, 8-bit log scale.
    pub mass: u8,
    pub seed: u32,
    /// Joints that gave way, in absorption order.
    pub joint_breaks: Vec<i32>,
    /// Network ids of spawned product entities, in spawn order.
    pub products: Vec<u32>,
}

/// A glass-like surface fractured in-plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaneBreakPayload {
    pub identifier: WireIdentifier,
    pub part: PartId,
    /// Impact point, fine grid.
    pub point: [u32; 3],
    /// Impact velocity direction, 8-bit yaw + pitch.
    pub dir: (u8, u8),
    /// Impact speed, truncated float.
    pub speed: u16,
    /// Impactor mass, 8-bit log scale.
    pub mass: u8,
    pub material: i32,
    pub seed: u32,
    pub auto_shatter: bool,
    /// First break on this pane; drives client-join replay.
    pub first_break: bool,
    pub products: Vec<u32>,
}

/// A bendable object (tree, pole) deformed and was cut.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeformBreakPayload {
    pub identifier: WireIdentifier,
    pub part: PartId,
    /// Cut point, fine grid.
    pub point: [u32; 3],
    /// Cut direction, 8-bit yaw + pitch.
    pub dir: (u8, u8),
    /// Cut height above the instance origin, truncated float.
    pub cut_height: u16,
    /// Cut radius, truncated float.
    pub cut_size: u16,
    pub seed: u32,
    pub products: Vec<u32>,
}

/// One break stream's payload; the enum discriminant is the stream kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BreakPayload {
    PartBreak(PartBreakPayload),
    PlaneBreak(PlaneBreakPayload),
    DeformBreak(DeformBreakPayload),
}

impl BreakPayload {
    pub fn identifier(&self) -> WireIdentifier {
        match self {
            BreakPayload::PartBreak(p) => p.identifier,
            BreakPayload::PlaneBreak(p) => p.identifier,
            BreakPayload::DeformBreak(p) => p.identifier,
        }
    }
}

/// One finalized break stream as broadcast by the authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamMessage {
    /// Global order id. Streams touching the same object must be applied
    /// in increasing order of this index.
    pub break_idx: u32,
    /// Per-object sequence number.
    pub sub_break_idx: u16,
    /// Replay this stream for participants that join later.
    pub only_on_client_join: bool,
    pub payload: BreakPayload,
}

// ---------------------------------------------------------------------------
// Top-level enum
// ---------------------------------------------------------------------------

/// Top-level break replication message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BreakMessage {
    /// Authority broadcast of a finalized stream.
    Stream(StreamMessage),
    /// Client-initiated glass break, applied by the server without
    /// entering the stream log.
    ClientGlassBreak(PlaneBreakPayload),
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during message deserialization.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard deserialization failed.
    #[error("deserialization error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serialize a [`BreakMessage`] into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded BreakMessage]`
pub fn serialize_message(msg: &BreakMessage) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned binary payload into a [`BreakMessage`].
pub fn deserialize_message(data: &[u8]) -> Result<BreakMessage, MessageError> {
    if data.is_empty() {
        return Err(MessageError::EmptyPayload);
    }

    let version = data[0];
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }

    let msg = postcard::from_bytes(&data[1..])?;
    Ok(msg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
