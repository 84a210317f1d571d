//! Physics-engine event boundary for the destruction runtime.
//!
//! The physics engine itself lives behind traits; this crate defines the
//! event payloads it emits, the two dispatch lanes they arrive on (immediate
//! in-step callbacks and logged end-of-frame drains), and the seams through
//! which fracture work and world mutation are requested.

mod dispatch;
mod events;
mod ids;
pub mod testing;
mod world;

pub use dispatch::{EventDispatch, EventOutcome, ImmediateHandler, LoggedDrain};
pub use events::{
    BboxOverlapEvent, CollisionEvent, CollisionSide, CreatedPartEvent, EntityDeletedEvent,
    JointBrokenEvent, MeshUpdatedEvent, PhysicsEvent, PostStepEvent, RemovedPartsEvent,
    StateChangeEvent, TargetTransform,
};
pub use ids::{EntityId, MaterialId, PartId, PhysicalOwner, StaticHandle, broken_mesh_key};
pub use world::{
    FractureIslands, FractureProcessor, ImpactOutcome, MeshAssetId, MeshHandle, PieceSpawnParams,
    PlaneImpactRequest, StructuralBreakParams, WorldAccess,
};
