//! Opaque handles for physical objects.

use serde::{Deserialize, Serialize};

/// Handle to a live physical entity.
///
/// Entity ids are machine-local: a replica resolving a replicated break must
/// never assume the authority's id maps to the same object here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ent:{}", self.0)
    }
}

/// Part index within a physical entity (geometry slot).
pub type PartId = i32;

/// Surface/material index from the physics engine. `-1` means none.
pub type MaterialId = i32;

/// Handle to a piece of static world geometry (brush, vegetation instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticHandle(pub u64);

/// What a physics event is about: a spawned entity or static world geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOwner {
    Entity(EntityId),
    StaticGeometry(StaticHandle),
}

impl PhysicalOwner {
    pub fn entity(self) -> Option<EntityId> {
        match self {
            PhysicalOwner::Entity(id) => Some(id),
            PhysicalOwner::StaticGeometry(_) => None,
        }
    }
}

/// Key identifying one broken-mesh record: entity id in the upper bits,
/// part id (mod 256) in the lower byte.
pub fn broken_mesh_key(entity: EntityId, part: PartId) -> u64 {
    ((entity.0 as u64) << 8) | (part as u64 & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_mesh_key_packs_entity_and_part() {
        let key = broken_mesh_key(EntityId(7), 3);
        assert_eq!(key, (7 << 8) | 3);
    }

    #[test]
    fn test_broken_mesh_key_masks_part_to_byte() {
        assert_eq!(
            broken_mesh_key(EntityId(1), 0x1ff),
            broken_mesh_key(EntityId(1), 0xff)
        );
        assert_ne!(
            broken_mesh_key(EntityId(1), 1),
            broken_mesh_key(EntityId(2), 1)
        );
    }

    #[test]
    fn test_owner_entity_accessor() {
        assert_eq!(
            PhysicalOwner::Entity(EntityId(4)).entity(),
            Some(EntityId(4))
        );
        assert_eq!(PhysicalOwner::StaticGeometry(StaticHandle(9)).entity(), None);
    }
}
