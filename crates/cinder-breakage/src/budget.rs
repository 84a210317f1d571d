//! Memory budgeting for generated break geometry.
//!
//! Every `(entity, part)` that carries a procedurally generated mesh is
//! tracked with a rounded-KB footprint. When the running total climbs past
//! the configured ceiling, records are evicted farthest-first, preferring
//! parts that have not been drawn recently. The ceiling is soft: when no
//! candidate is evictable the total is allowed to overshoot.

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use cinder_physics::{EntityId, PartId, WorldAccess, broken_mesh_key};

/// A part is "recently drawn" if rendered within this many frames.
const VISIBLE_FRAME_WINDOW: u64 = 10;

/// One tracked broken-mesh record.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokenMeshRecord {
    pub entity: EntityId,
    pub part: PartId,
    pub size_kb: u32,
    /// Seconds until the record frees itself. `None` never expires.
    pub timeout_s: Option<f32>,
    /// Particle effect to play when the record is shattered away.
    pub fracture_fx: Option<String>,
}

/// Snapshot entry for the debug overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetDebugEntry {
    pub entity: EntityId,
    pub part: PartId,
    pub size_kb: u32,
}

/// Bounded registry of generated break geometry.
pub struct BrokenMeshBudget {
    records: FxHashMap<u64, BrokenMeshRecord>,
    total_kb: u32,
    limit_kb: u32,
    /// Journal of freed meshes (`entity<<8|part` per entry, `-1` as a frame
    /// marker), consumed on save-game load to re-free what this session had
    /// already evicted.
    removals: Vec<i64>,
    /// Replay mode: frees are not journaled while loading.
    loading: bool,
}

impl BrokenMeshBudget {
    pub fn new(limit_kb: u32) -> Self {
        Self {
            records: FxHashMap::default(),
            total_kb: 0,
            limit_kb,
            removals: Vec::new(),
            loading: false,
        }
    }

    pub fn set_limit_kb(&mut self, limit_kb: u32) {
        self.limit_kb = limit_kb;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn total_kb(&self) -> u32 {
        self.total_kb
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn removals(&self) -> &[i64] {
        &self.removals
    }

    pub fn take_removals(&mut self) -> Vec<i64> {
        std::mem::take(&mut self.removals)
    }

    /// Register generated geometry for `(entity, part)`.
    ///
    /// An identical re-registration is a no-op; a size change replaces the
    /// record. Afterwards the eviction loop runs until the total fits the
    /// ceiling or no victim remains. The record registered by this call is
    /// never its own victim.
    pub fn register_mesh(
        &mut self,
        world: &mut dyn WorldAccess,
        entity: EntityId,
        part: PartId,
        size_bytes: usize,
        timeout_s: Option<f32>,
        fracture_fx: Option<String>,
    ) {
        let key = broken_mesh_key(entity, part);
        let size_kb = ((size_bytes + 512) >> 10) as u32;

        if let Some(existing) = self.records.get_mut(&key) {
            if existing.size_kb == size_kb {
                return;
            }
            self.total_kb = self.total_kb - existing.size_kb + size_kb;
            existing.size_kb = size_kb;
            existing.timeout_s = timeout_s;
            existing.fracture_fx = fracture_fx;
        } else {
            self.records.insert(
                key,
                BrokenMeshRecord {
                    entity,
                    part,
                    size_kb,
                    timeout_s,
                    fracture_fx,
                },
            );
            self.total_kb += size_kb;
        }

        self.evict_until_within_limit(world, Some(key));
        // Frame marker separates this registration's evictions in the journal
        if !self.loading && self.limit_kb > 0 {
            self.removals.push(-1);
        }
    }

    /// Drop every record owned by a deleted physical entity.
    pub fn free_for_entity(&mut self, world: &mut dyn WorldAccess, entity: EntityId) {
        let keys: Vec<u64> = self
            .records
            .iter()
            .filter(|(_, r)| r.entity == entity)
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            self.free_record(world, key, false);
        }
    }

    /// Count down record timeouts, freeing the expired.
    pub fn update(&mut self, world: &mut dyn WorldAccess, dt: f32) {
        let expired: Vec<u64> = self
            .records
            .iter_mut()
            .filter_map(|(key, record)| {
                let t = record.timeout_s.as_mut()?;
                *t -= dt;
                (*t <= 0.0).then_some(*key)
            })
            .collect();
        for key in expired {
            debug!(key, "broken mesh timed out");
            self.free_record(world, key, true);
        }
    }

    /// Per-record sizes ordered largest first, for the debug overlay.
    pub fn debug_snapshot(&self) -> Vec<BudgetDebugEntry> {
        let mut entries: Vec<BudgetDebugEntry> = self
            .records
            .values()
            .map(|r| BudgetDebugEntry {
                entity: r.entity,
                part: r.part,
                size_kb: r.size_kb,
            })
            .collect();
        entries.sort_by(|a, b| b.size_kb.cmp(&a.size_kb).then(a.entity.cmp(&b.entity)));
        entries
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.total_kb = 0;
        self.removals.clear();
    }

    fn free_record(&mut self, world: &mut dyn WorldAccess, key: u64, release_geometry: bool) {
        if let Some(record) = self.records.remove(&key) {
            self.total_kb -= record.size_kb;
            if release_geometry {
                world.free_broken_mesh(record.entity, record.part);
            }
            if !self.loading {
                self.removals.push(key as i64);
            }
        }
    }

    /// Eviction loop. `protected` is the record being registered right now.
    fn evict_until_within_limit(&mut self, world: &mut dyn WorldAccess, protected: Option<u64>) {
        if self.limit_kb == 0 {
            return;
        }
        let limit = self.limit_kb as u64;
        while (self.total_kb as u64) * limit > limit * limit {
            // Stale records first: their entity is already gone
            let stale: Vec<u64> = self
                .records
                .iter()
                .filter(|(k, r)| Some(**k) != protected && !world.entity_exists(r.entity))
                .map(|(k, _)| *k)
                .collect();
            if !stale.is_empty() {
                for key in stale {
                    info!(key, "dropping broken mesh for deleted entity");
                    self.free_record(world, key, false);
                }
                continue;
            }

            let Some(victim) = self.pick_victim(world, protected) else {
                // Soft ceiling: nothing evictable, stop trying
                break;
            };
            let record = &self.records[&victim];
            info!(
                entity = %record.entity,
                part = record.part,
                size_kb = record.size_kb,
                total_kb = self.total_kb,
                "evicting broken mesh over budget"
            );
            self.free_record(world, victim, true);
        }
    }

    /// Prefer records not drawn within the visibility window; among the
    /// chosen bucket, take the one farthest from the camera.
    fn pick_victim(&self, world: &dyn WorldAccess, protected: Option<u64>) -> Option<u64> {
        let camera = world.camera_position();
        let frame = world.current_frame();

        let mut best_hidden: Option<(u64, f32)> = None;
        let mut best_visible: Option<(u64, f32)> = None;

        for (key, record) in &self.records {
            if Some(*key) == protected {
                continue;
            }
            let Some(transform) = world.entity_transform(record.entity) else {
                continue;
            };
            let dist_sq = transform.position.distance_squared(camera);
            let recently_drawn = world
                .last_drawn_frame(record.entity, record.part)
                .is_some_and(|f| frame.saturating_sub(f) <= VISIBLE_FRAME_WINDOW);

            let bucket = if recently_drawn {
                &mut best_visible
            } else {
                &mut best_hidden
            };
            if bucket.is_none_or(|(_, d)| dist_sq > d) {
                *bucket = Some((*key, dist_sq));
            }
        }

        best_hidden.or(best_visible).map(|(key, _)| key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_physics::testing::FakeWorld;
    use glam::Vec3;

    const KB: usize = 1024;

    fn world_with(entities: &[(u32, Vec3)]) -> FakeWorld {
        let mut world = FakeWorld::new();
        for (id, pos) in entities {
            world.add_entity(EntityId(*id), *pos);
        }
        world
    }

    fn sum_sizes(budget: &BrokenMeshBudget) -> u32 {
        budget.debug_snapshot().iter().map(|e| e.size_kb).sum()
    }

    #[test]
    fn test_size_rounds_to_kb() {
        let mut world = world_with(&[(1, Vec3::ZERO)]);
        let mut budget = BrokenMeshBudget::new(0);
        budget.register_mesh(&mut world, EntityId(1), 0, 1536, None, None);
        assert_eq!(budget.total_kb(), 2);
    }

    #[test]
    fn test_identical_reregistration_is_noop() {
        let mut world = world_with(&[(1, Vec3::ZERO)]);
        let mut budget = BrokenMeshBudget::new(1000);
        budget.register_mesh(&mut world, EntityId(1), 0, 10 * KB, None, None);
        let total = budget.total_kb();
        budget.register_mesh(&mut world, EntityId(1), 0, 10 * KB, None, None);
        assert_eq!(budget.total_kb(), total);
        assert_eq!(budget.len(), 1);
    }

    #[test]
    fn test_resize_applies_delta() {
        let mut world = world_with(&[(1, Vec3::ZERO)]);
        let mut budget = BrokenMeshBudget::new(1000);
        budget.register_mesh(&mut world, EntityId(1), 0, 10 * KB, None, None);
        budget.register_mesh(&mut world, EntityId(1), 0, 30 * KB, None, None);
        assert_eq!(budget.total_kb(), 30);
        assert_eq!(budget.len(), 1);
    }

    #[test]
    fn test_total_equals_sum_of_records() {
        let mut world = world_with(&[(1, Vec3::ZERO), (2, Vec3::X), (3, Vec3::Y)]);
        let mut budget = BrokenMeshBudget::new(100);
        budget.register_mesh(&mut world, EntityId(1), 0, 20 * KB, None, None);
        budget.register_mesh(&mut world, EntityId(2), 0, 30 * KB, None, None);
        budget.register_mesh(&mut world, EntityId(3), 1, 40 * KB, None, None);
        budget.register_mesh(&mut world, EntityId(2), 0, 50 * KB, None, None);
        budget.free_for_entity(&mut world, EntityId(1));
        assert_eq!(budget.total_kb(), sum_sizes(&budget));
    }

    #[test]
    fn test_eviction_prefers_not_recently_drawn() {
        let mut world = world_with(&[
            (1, Vec3::new(100.0, 0.0, 0.0)), // far but visible
            (2, Vec3::new(5.0, 0.0, 0.0)),   // near, not drawn recently
        ]);
        world.frame = 100;
        world.last_drawn.insert((EntityId(1), 0), 99);
        world.last_drawn.insert((EntityId(2), 0), 50);

        let mut budget = BrokenMeshBudget::new(40);
        budget.register_mesh(&mut world, EntityId(1), 0, 20 * KB, None, None);
        budget.register_mesh(&mut world, EntityId(2), 0, 20 * KB, None, None);
        // 50KB registration pushes the total over the 40KB ceiling
        world.add_entity(EntityId(3), Vec3::ZERO);
        budget.register_mesh(&mut world, EntityId(3), 0, 50 * KB, None, None);

        // Entity 2 was the least-recently-visible record
        assert!(world.freed_meshes.contains(&(EntityId(2), 0)));
        assert!(!world.freed_meshes.contains(&(EntityId(3), 0)));
    }

    #[test]
    fn test_eviction_farthest_within_bucket() {
        let mut world = world_with(&[
            (1, Vec3::new(10.0, 0.0, 0.0)),
            (2, Vec3::new(200.0, 0.0, 0.0)),
            (3, Vec3::ZERO),
        ]);
        // Nothing ever drawn: all records are in the hidden bucket
        let mut budget = BrokenMeshBudget::new(50);
        budget.register_mesh(&mut world, EntityId(1), 0, 20 * KB, None, None);
        budget.register_mesh(&mut world, EntityId(2), 0, 20 * KB, None, None);
        budget.register_mesh(&mut world, EntityId(3), 0, 30 * KB, None, None);

        assert!(world.freed_meshes.contains(&(EntityId(2), 0)));
        assert_eq!(budget.total_kb(), sum_sizes(&budget));
    }

    #[test]
    fn test_register_never_evicts_itself() {
        let mut world = world_with(&[(1, Vec3::new(500.0, 0.0, 0.0))]);
        let mut budget = BrokenMeshBudget::new(40);
        // 50KB against 40KB: over budget, but the only record is protected
        budget.register_mesh(&mut world, EntityId(1), 0, 50 * KB, None, None);
        assert_eq!(budget.len(), 1);
        assert!(world.freed_meshes.is_empty());
        assert_eq!(budget.total_kb(), 50);
    }

    #[test]
    fn test_eviction_liveness_under_stream() {
        let limit = 40u32;
        let mut world = FakeWorld::new();
        let mut budget = BrokenMeshBudget::new(limit);
        for i in 0..8u32 {
            world.add_entity(EntityId(i), Vec3::new(i as f32, 0.0, 0.0));
            budget.register_mesh(&mut world, EntityId(i), 0, 20 * KB, None, None);
            // Once at least two records exist, eviction keeps totals bounded
            if i >= 2 {
                assert!(
                    budget.total_kb() <= limit,
                    "total {} exceeded limit after registration {}",
                    budget.total_kb(),
                    i
                );
            }
        }
    }

    #[test]
    fn test_stale_records_dropped_first() {
        let mut world = world_with(&[(1, Vec3::ZERO), (2, Vec3::X)]);
        let mut budget = BrokenMeshBudget::new(40);
        budget.register_mesh(&mut world, EntityId(1), 0, 20 * KB, None, None);
        budget.register_mesh(&mut world, EntityId(2), 0, 20 * KB, None, None);
        // Entity 1 disappears without a deletion notification
        world.entities.remove(&EntityId(1));

        world.add_entity(EntityId(3), Vec3::Y);
        budget.register_mesh(&mut world, EntityId(3), 0, 20 * KB, None, None);

        // The stale record was dropped without freeing engine-side geometry
        assert!(!world.freed_meshes.contains(&(EntityId(1), 0)));
        assert!(budget.debug_snapshot().iter().all(|e| e.entity != EntityId(1)));
        assert_eq!(budget.total_kb(), sum_sizes(&budget));
    }

    #[test]
    fn test_free_for_entity_removes_all_parts() {
        let mut world = world_with(&[(1, Vec3::ZERO)]);
        let mut budget = BrokenMeshBudget::new(0);
        budget.register_mesh(&mut world, EntityId(1), 0, 10 * KB, None, None);
        budget.register_mesh(&mut world, EntityId(1), 1, 10 * KB, None, None);
        budget.free_for_entity(&mut world, EntityId(1));
        assert!(budget.is_empty());
        assert_eq!(budget.total_kb(), 0);
    }

    #[test]
    fn test_timeout_frees_record() {
        let mut world = world_with(&[(1, Vec3::ZERO)]);
        let mut budget = BrokenMeshBudget::new(0);
        budget.register_mesh(&mut world, EntityId(1), 0, 10 * KB, Some(1.0), None);
        budget.update(&mut world, 0.5);
        assert_eq!(budget.len(), 1);
        budget.update(&mut world, 0.6);
        assert!(budget.is_empty());
        assert!(world.freed_meshes.contains(&(EntityId(1), 0)));
    }

    #[test]
    fn test_removal_journal_records_frees() {
        let mut world = world_with(&[(1, Vec3::ZERO)]);
        let mut budget = BrokenMeshBudget::new(0);
        budget.register_mesh(&mut world, EntityId(1), 3, 10 * KB, None, None);
        budget.free_for_entity(&mut world, EntityId(1));
        let key = broken_mesh_key(EntityId(1), 3) as i64;
        assert!(budget.removals().contains(&key));
    }

    #[test]
    fn test_removal_journal_silent_while_loading() {
        let mut world = world_with(&[(1, Vec3::ZERO)]);
        let mut budget = BrokenMeshBudget::new(0);
        budget.set_loading(true);
        budget.register_mesh(&mut world, EntityId(1), 0, 10 * KB, None, None);
        budget.free_for_entity(&mut world, EntityId(1));
        assert!(budget.removals().is_empty());
    }
}
