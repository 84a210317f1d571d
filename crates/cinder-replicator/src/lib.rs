//! Break replication: records authoritative destruction as ordered streams
//! and plays them back on replicas.

pub mod replicator;
pub mod stream;

pub use replicator::{BindingTable, BreakApplier, BreakReplicator, MAX_STREAMS, Role};
pub use stream::{
    BreakKind, BreakStream, MAX_PRODUCTS, StreamMode, decode_stream, encode_stream,
    identifier_from_wire, identifier_to_wire,
};
