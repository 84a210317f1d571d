//! Cross-machine naming of breakable objects.
//!
//! Entity ids differ between machines, so replicated breaks name their
//! target either through an explicit entity binding or by the position and
//! structural hash of the static geometry it was built from.

use glam::Vec3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cinder_physics::{EntityId, PhysicalOwner, WorldAccess};

/// Search radius when resolving a static identifier by proximity. Generous
/// because the recorded center is quantized coarsely on the wire.
pub const RESOLVE_EPS: f32 = 30.0;

/// Stable name for a physical object, resolvable on a remote machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ObjectIdentifier {
    Unresolved,
    Entity(EntityId),
    Static { center: Vec3, hash: u32 },
}

impl PartialEq for ObjectIdentifier {
    /// Two identifiers are equal when they name the same object: same
    /// holding entity, or same structural hash. Centers are not compared;
    /// they are quantized differently on each side.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ObjectIdentifier::Entity(a), ObjectIdentifier::Entity(b)) => a == b,
            (ObjectIdentifier::Static { hash: a, .. }, ObjectIdentifier::Static { hash: b, .. }) => {
                a == b
            }
            (ObjectIdentifier::Unresolved, ObjectIdentifier::Unresolved) => true,
            _ => false,
        }
    }
}

impl ObjectIdentifier {
    /// Build an identifier for whatever a physics event pointed at.
    pub fn from_owner(world: &dyn WorldAccess, owner: PhysicalOwner) -> Self {
        match owner {
            PhysicalOwner::Entity(id) => ObjectIdentifier::Entity(id),
            PhysicalOwner::StaticGeometry(handle) => match world.static_center_and_hash(handle) {
                Some((center, hash)) => ObjectIdentifier::Static { center, hash },
                None => ObjectIdentifier::Unresolved,
            },
        }
    }

    /// Resolve to a live object: direct entity, then registry binding, then
    /// proximity search around the recorded center.
    pub fn resolve(
        &self,
        world: &dyn WorldAccess,
        registry: &IdentifierRegistry,
    ) -> Option<PhysicalOwner> {
        match *self {
            ObjectIdentifier::Unresolved => None,
            ObjectIdentifier::Entity(id) => {
                world.entity_exists(id).then_some(PhysicalOwner::Entity(id))
            }
            ObjectIdentifier::Static { center, hash } => {
                if let Some(id) = registry.lookup(hash) {
                    if world.entity_exists(id) {
                        return Some(PhysicalOwner::Entity(id));
                    }
                }
                let found = world.find_by_position_and_hash(center, RESOLVE_EPS, hash);
                if found.is_none() {
                    debug!(hash, ?center, "static identifier did not resolve");
                }
                found
            }
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, ObjectIdentifier::Unresolved)
    }
}

/// Structural hash of a static object, stable across machines: derived from
/// the instance name, class name, and quantized world position.
pub fn selector_hash(name: &str, class: &str, position: Vec3) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut hash = FNV_OFFSET;
    let mut mix = |bytes: &[u8]| {
        for &b in bytes {
            hash ^= b as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    };
    mix(name.as_bytes());
    mix(class.as_bytes());
    // 1/256 m grid keeps the hash stable under float noise
    for q in [
        (position.x * 256.0).round() as i32,
        (position.y * 256.0).round() as i32,
        (position.z * 256.0).round() as i32,
    ] {
        mix(&q.to_le_bytes());
    }
    hash
}

/// Bindings from structural hashes to the entities that replaced them.
///
/// When a static object breaks, the engine replaces it with a spawned
/// entity; the binding lets later streams resolve the same hash to that
/// entity directly.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    by_hash: FxHashMap<u32, EntityId>,
    by_entity: FxHashMap<EntityId, u32>,
}

impl IdentifierRegistry {
    pub fn bind(&mut self, hash: u32, entity: EntityId) {
        if let Some(old) = self.by_hash.insert(hash, entity) {
            self.by_entity.remove(&old);
        }
        self.by_entity.insert(entity, hash);
    }

    /// Clear the binding when its entity despawns.
    pub fn unbind_entity(&mut self, entity: EntityId) {
        if let Some(hash) = self.by_entity.remove(&entity) {
            self.by_hash.remove(&hash);
        }
    }

    pub fn lookup(&self, hash: u32) -> Option<EntityId> {
        self.by_hash.get(&hash).copied()
    }

    pub fn clear(&mut self) {
        self.by_hash.clear();
        self.by_entity.clear();
    }
}
