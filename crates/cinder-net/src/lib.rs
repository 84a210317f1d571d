//! Wire protocol for replicated breaks.
//!
//! Break payloads are quantized against the world bounds, serialized with
//! [`postcard`] behind a protocol version byte, and framed with a `u32`
//! little-endian length prefix. Delivery itself happens behind the
//! [`BreakTransport`] trait; the protocol assumes reliable, unordered,
//! per-message transport.

mod framing;
mod messages;
mod quant;
mod transport;

pub use framing::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use messages::{
    BreakMessage, BreakPayload, DeformBreakPayload, MessageError, PROTOCOL_VERSION,
    PartBreakPayload, PlaneBreakPayload, StreamMessage, WireIdentifier, deserialize_message,
    serialize_message,
};
pub use quant::{
    COARSE_SAMPLE_M, FINE_SAMPLE_M, QuantParams, decode_dir, decode_f16, decode_mass, encode_dir,
    encode_f16, encode_mass,
};
pub use transport::BreakTransport;

pub mod testing;
