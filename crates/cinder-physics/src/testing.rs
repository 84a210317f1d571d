//! In-memory fakes for the engine seams, used by downstream crate tests.

use std::sync::Mutex;

use glam::Vec3;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::events::TargetTransform;
use crate::ids::{EntityId, PartId, PhysicalOwner, StaticHandle};
use crate::world::{
    FractureIslands, FractureProcessor, ImpactOutcome, MeshAssetId, MeshHandle, PieceSpawnParams,
    PlaneImpactRequest, StructuralBreakParams, WorldAccess,
};

/// A scriptable world: tests populate the maps, the code under test queries
/// and mutates them.
#[derive(Debug, Default)]
pub struct FakeWorld {
    pub entities: FxHashMap<EntityId, TargetTransform>,
    pub vehicles: FxHashSet<EntityId>,
    pub statics: FxHashMap<StaticHandle, (Vec3, u32)>,
    /// Objects discoverable by position+hash proximity search.
    pub searchable: Vec<(Vec3, u32, PhysicalOwner)>,
    pub camera: Vec3,
    pub frame: u64,
    pub last_drawn: FxHashMap<(EntityId, PartId), u64>,
    pub mesh_ready: bool,
    pub assets: FxHashMap<(EntityId, PartId), MeshAssetId>,
    pub freed_meshes: Vec<(EntityId, PartId)>,
    pub deleted: Vec<EntityId>,
    pub spawned: Vec<PieceSpawnParams>,
    pub structural_breaks: Vec<(PhysicalOwner, StructuralBreakParams)>,
    /// Scripted to refuse structural breaks.
    pub reject_structural: bool,
    pub opacity: FxHashMap<EntityId, f32>,
    pub collisions_disabled: FxHashSet<EntityId>,
    next_spawn_id: u32,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self {
            mesh_ready: true,
            next_spawn_id: 10_000,
            ..Default::default()
        }
    }

    pub fn add_entity(&mut self, id: EntityId, position: Vec3) {
        self.entities.insert(
            id,
            TargetTransform {
                position,
                ..Default::default()
            },
        );
    }

    /// Register a static object discoverable by position+hash search.
    pub fn add_searchable(&mut self, position: Vec3, hash: u32) -> PhysicalOwner {
        let handle = StaticHandle(self.searchable.len() as u64 + 1);
        let owner = PhysicalOwner::StaticGeometry(handle);
        self.statics.insert(handle, (position, hash));
        self.searchable.push((position, hash, owner));
        owner
    }
}

impl WorldAccess for FakeWorld {
    fn entity_transform(&self, id: EntityId) -> Option<TargetTransform> {
        self.entities.get(&id).copied()
    }

    fn set_entity_transform(&mut self, id: EntityId, transform: &TargetTransform) -> bool {
        match self.entities.get_mut(&id) {
            Some(slot) => {
                *slot = *transform;
                true
            }
            None => false,
        }
    }

    fn entity_exists(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    fn is_vehicle(&self, id: EntityId) -> bool {
        self.vehicles.contains(&id)
    }

    fn render_mesh_ready(&self, _id: EntityId, _part: PartId) -> bool {
        self.mesh_ready
    }

    fn camera_position(&self) -> Vec3 {
        self.camera
    }

    fn last_drawn_frame(&self, id: EntityId, part: PartId) -> Option<u64> {
        self.last_drawn.get(&(id, part)).copied()
    }

    fn current_frame(&self) -> u64 {
        self.frame
    }

    fn free_broken_mesh(&mut self, id: EntityId, part: PartId) {
        self.freed_meshes.push((id, part));
    }

    fn delete_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
        self.deleted.push(id);
    }

    fn spawn_piece(&mut self, params: &PieceSpawnParams) -> Option<EntityId> {
        self.spawned.push(*params);
        let id = EntityId(self.next_spawn_id);
        self.next_spawn_id += 1;
        self.entities.insert(
            id,
            TargetTransform {
                position: params.position,
                rotation: params.rotation,
                scale: params.scale,
            },
        );
        Some(id)
    }

    fn apply_structural_break(
        &mut self,
        owner: PhysicalOwner,
        params: &StructuralBreakParams,
    ) -> Option<Vec<EntityId>> {
        if self.reject_structural {
            return None;
        }
        self.structural_breaks.push((owner, *params));
        let id = EntityId(self.next_spawn_id);
        self.next_spawn_id += 1;
        self.entities.insert(
            id,
            TargetTransform {
                position: params.point,
                ..Default::default()
            },
        );
        Some(vec![id])
    }

    fn set_collisions_enabled(&mut self, id: EntityId, enabled: bool) {
        if enabled {
            self.collisions_disabled.remove(&id);
        } else {
            self.collisions_disabled.insert(id);
        }
    }

    fn set_opacity(&mut self, id: EntityId, opacity: f32) {
        self.opacity.insert(id, opacity);
    }

    fn static_center_and_hash(&self, handle: StaticHandle) -> Option<(Vec3, u32)> {
        self.statics.get(&handle).copied()
    }

    fn find_by_position_and_hash(
        &self,
        position: Vec3,
        eps: f32,
        hash: u32,
    ) -> Option<PhysicalOwner> {
        self.searchable
            .iter()
            .find(|(p, h, _)| *h == hash && p.distance(position) <= eps)
            .map(|(_, _, owner)| *owner)
    }

    fn mesh_asset(&self, owner: PhysicalOwner, part: PartId) -> Option<MeshAssetId> {
        owner
            .entity()
            .and_then(|id| self.assets.get(&(id, part)).copied())
    }

    fn part_mesh(&self, owner: PhysicalOwner, part: PartId) -> Option<MeshHandle> {
        // Derived deterministically so tests need no extra scripting
        let key = match owner {
            PhysicalOwner::Entity(id) => crate::ids::broken_mesh_key(id, part),
            PhysicalOwner::StaticGeometry(handle) => (handle.0 << 8) | (part as u64 & 0xff),
        };
        Some(MeshHandle(key))
    }
}

/// Fracture processor that returns scripted outcomes and counts calls.
#[derive(Default)]
pub struct FakeFractureProcessor {
    pub impact_outcome: Mutex<ImpactOutcome>,
    pub islands: Mutex<Option<FractureIslands>>,
    pub impacts: Mutex<Vec<PlaneImpactRequest>>,
    pub extractions: Mutex<Vec<(MeshHandle, i32)>>,
    pub applied: Mutex<Vec<(PlaneImpactRequest, FractureIslands)>>,
}

impl FakeFractureProcessor {
    pub fn breaking_now(islands: Option<FractureIslands>) -> Self {
        let fake = Self::default();
        *fake.impact_outcome.lock().unwrap() = ImpactOutcome::BrokenNow(islands);
        *fake.islands.lock().unwrap() = islands;
        fake
    }
}

impl FractureProcessor for FakeFractureProcessor {
    fn process_plane_impact(&self, request: &PlaneImpactRequest) -> ImpactOutcome {
        self.impacts.lock().unwrap().push(*request);
        *self.impact_outcome.lock().unwrap()
    }

    fn extract_islands(&self, mesh: MeshHandle, seed_triangle: i32) -> Option<FractureIslands> {
        self.extractions.lock().unwrap().push((mesh, seed_triangle));
        *self.islands.lock().unwrap()
    }

    fn apply_islands(&self, request: &PlaneImpactRequest, islands: &FractureIslands) {
        self.applied.lock().unwrap().push((*request, *islands));
    }
}
