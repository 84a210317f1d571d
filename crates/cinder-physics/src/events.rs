//! Event payloads emitted by the physics engine.
//!
//! Collision payloads are serializable because break events store them for
//! save-game replay.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::ids::{MaterialId, PartId, PhysicalOwner};

/// One side of a collision pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionSide {
    pub owner: PhysicalOwner,
    pub velocity: Vec3,
    pub mass: f32,
    pub material: MaterialId,
    pub part: PartId,
}

/// A contact the physics engine decided was energetic enough to report.
///
/// Index 0 is the impactor, index 1 the surface being hit; this matches the
/// order breakable-surface handlers expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub point: Vec3,
    pub normal: Vec3,
    pub sides: [CollisionSide; 2],
    pub penetration: f32,
    /// Backface flag from the collision query, needed to orient plane cuts.
    pub backface: bool,
    /// Seed captured at contact time so fracture is reproducible on replay.
    pub seed: u32,
}

/// Target transform snapshot taken when a collision is turned into a break
/// event, so replay can reposition the target before re-running fracture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for TargetTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

/// A new physical part came into existence (fracture product, severed limb).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreatedPartEvent {
    pub owner: PhysicalOwner,
    /// Entity the new part was attached to; same as `owner` unless the
    /// engine spawned a fresh debris entity.
    pub new_owner: PhysicalOwner,
    pub source_part: PartId,
    pub new_part: PartId,
    /// Total parts remaining on the source after the split.
    pub remaining_parts: u32,
    pub cut_position: Vec3,
    pub cut_direction: Vec3,
    /// Scaled cut radius, drives tree-reuse matching.
    pub cut_size: f32,
    pub impulse: Vec3,
    pub angular_impulse: Vec3,
    /// True when the engine performed a deform (bend/crumple) rather than a
    /// detach split.
    pub deformed: bool,
}

/// Parts were removed from an entity (hole punched, pane destroyed).
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedPartsEvent {
    pub owner: PhysicalOwner,
    /// Bitmask base id: removed part ids are `base + bit index`.
    pub base_part: PartId,
    pub removed_mask: u64,
}

/// A structural joint between parts gave way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointBrokenEvent {
    pub owner: PhysicalOwner,
    pub joint: i32,
    pub part: PartId,
    pub epicenter: Vec3,
}

/// The mesh of a part changed outside the breakage path (further
/// deformation, boolean carve).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshUpdatedEvent {
    pub owner: PhysicalOwner,
    pub part: PartId,
    /// True when the update happened on a piece spawned by a previous break.
    pub is_secondary_piece: bool,
}

/// A physical entity was deleted; all bookkeeping referencing it must drop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityDeletedEvent {
    pub owner: PhysicalOwner,
}

/// A simulated entity finished a physics step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostStepEvent {
    pub owner: PhysicalOwner,
    pub dt: f32,
}

/// An entity started or stopped simulating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateChangeEvent {
    pub owner: PhysicalOwner,
    pub awake: bool,
}

/// A moving entity's bounds overlapped a trigger region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BboxOverlapEvent {
    pub owner: PhysicalOwner,
    pub other: PhysicalOwner,
}

/// Every event kind the destruction core consumes from the physics engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsEvent {
    Collision(CollisionEvent),
    PostStep(PostStepEvent),
    StateChange(StateChangeEvent),
    CreatedPart(CreatedPartEvent),
    JointBroken(JointBrokenEvent),
    MeshUpdated(MeshUpdatedEvent),
    RemovedParts(RemovedPartsEvent),
    EntityDeleted(EntityDeletedEvent),
    BboxOverlap(BboxOverlapEvent),
}

impl PhysicsEvent {
    /// The object the event is primarily about.
    pub fn owner(&self) -> PhysicalOwner {
        match self {
            PhysicsEvent::Collision(e) => e.sides[1].owner,
            PhysicsEvent::PostStep(e) => e.owner,
            PhysicsEvent::StateChange(e) => e.owner,
            PhysicsEvent::CreatedPart(e) => e.owner,
            PhysicsEvent::JointBroken(e) => e.owner,
            PhysicsEvent::MeshUpdated(e) => e.owner,
            PhysicsEvent::RemovedParts(e) => e.owner,
            PhysicsEvent::EntityDeleted(e) => e.owner,
            PhysicsEvent::BboxOverlap(e) => e.owner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{EntityId, StaticHandle};

    fn side(owner: PhysicalOwner) -> CollisionSide {
        CollisionSide {
            owner,
            velocity: Vec3::ZERO,
            mass: 1.0,
            material: -1,
            part: 0,
        }
    }

    #[test]
    fn test_collision_owner_is_surface_side() {
        let ev = PhysicsEvent::Collision(CollisionEvent {
            point: Vec3::ZERO,
            normal: Vec3::Z,
            sides: [
                side(PhysicalOwner::Entity(EntityId(1))),
                side(PhysicalOwner::StaticGeometry(StaticHandle(2))),
            ],
            penetration: 0.0,
            backface: false,
            seed: 0,
        });
        assert_eq!(ev.owner(), PhysicalOwner::StaticGeometry(StaticHandle(2)));
    }

    #[test]
    fn test_collision_event_serde_roundtrip() {
        let ev = CollisionEvent {
            point: Vec3::new(1.0, 2.0, 3.0),
            normal: Vec3::Y,
            sides: [
                side(PhysicalOwner::Entity(EntityId(10))),
                side(PhysicalOwner::Entity(EntityId(20))),
            ],
            penetration: 0.05,
            backface: true,
            seed: 42,
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: CollisionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}
