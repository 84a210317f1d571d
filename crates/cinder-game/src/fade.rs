//! Fade-out of spawned debris.
//!
//! Multiplayer sessions cannot keep every piece of debris alive forever, so
//! spawned breakage entities fade: after a delay their opacity ramps down,
//! their secondary collisions are disabled at the first fade step, and the
//! entity (with its broken-mesh records) is freed at the end of the ramp.

use cinder_breakage::BrokenMeshBudget;
use cinder_physics::{EntityId, WorldAccess};
use tracing::trace;

#[derive(Debug)]
struct FadeEntry {
    entity: EntityId,
    age_s: f32,
    fading: bool,
}

/// Debris entities scheduled for fade-out.
#[derive(Debug)]
pub struct FadeEntityList {
    entries: Vec<FadeEntry>,
    delay_s: f32,
    time_s: f32,
}

impl FadeEntityList {
    pub fn new(delay_s: f32, time_s: f32) -> Self {
        Self {
            entries: Vec::new(),
            delay_s,
            time_s,
        }
    }

    pub fn push(&mut self, entity: EntityId) {
        if self.entries.iter().any(|e| e.entity == entity) {
            return;
        }
        self.entries.push(FadeEntry {
            entity,
            age_s: 0.0,
            fading: false,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&mut self, entity: EntityId) {
        self.entries.retain(|e| e.entity != entity);
    }

    /// Advance all fades by `dt`, freeing entities whose ramp finished.
    pub fn update(&mut self, dt: f32, world: &mut dyn WorldAccess, budget: &mut BrokenMeshBudget) {
        let delay = self.delay_s;
        let time = self.time_s.max(f32::EPSILON);
        let mut finished: Vec<EntityId> = Vec::new();

        for entry in &mut self.entries {
            entry.age_s += dt;
            if entry.age_s < delay {
                continue;
            }
            if !entry.fading {
                entry.fading = true;
                world.set_collisions_enabled(entry.entity, false);
                trace!(entity = %entry.entity, "debris fade started");
            }
            let t = (entry.age_s - delay) / time;
            if t >= 1.0 {
                finished.push(entry.entity);
            } else {
                world.set_opacity(entry.entity, 1.0 - t);
            }
        }

        for entity in finished {
            budget.free_for_entity(world, entity);
            world.delete_entity(entity);
            self.remove(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_physics::testing::FakeWorld;
    use glam::Vec3;

    #[test]
    fn test_nothing_happens_before_delay() {
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(1), Vec3::ZERO);
        let mut budget = BrokenMeshBudget::new(0);
        let mut fades = FadeEntityList::new(2.0, 1.0);
        fades.push(EntityId(1));

        fades.update(1.0, &mut world, &mut budget);
        assert!(world.opacity.is_empty());
        assert!(world.collisions_disabled.is_empty());
    }

    #[test]
    fn test_collisions_disabled_at_first_fade_step() {
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(1), Vec3::ZERO);
        let mut budget = BrokenMeshBudget::new(0);
        let mut fades = FadeEntityList::new(1.0, 2.0);
        fades.push(EntityId(1));

        fades.update(1.5, &mut world, &mut budget);
        assert!(world.collisions_disabled.contains(&EntityId(1)));
        let opacity = world.opacity[&EntityId(1)];
        assert!(opacity < 1.0 && opacity > 0.0);
    }

    #[test]
    fn test_entity_freed_when_ramp_finishes() {
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(1), Vec3::ZERO);
        let mut budget = BrokenMeshBudget::new(0);
        budget.register_mesh(&mut world, EntityId(1), 0, 4096, None, None);
        let mut fades = FadeEntityList::new(1.0, 1.0);
        fades.push(EntityId(1));

        fades.update(0.5, &mut world, &mut budget);
        fades.update(2.0, &mut world, &mut budget);
        assert!(fades.is_empty());
        assert!(world.deleted.contains(&EntityId(1)));
        assert_eq!(budget.len(), 0);
    }

    #[test]
    fn test_duplicate_push_is_ignored() {
        let mut fades = FadeEntityList::new(1.0, 1.0);
        fades.push(EntityId(7));
        fades.push(EntityId(7));
        assert_eq!(fades.len(), 1);
    }
}
