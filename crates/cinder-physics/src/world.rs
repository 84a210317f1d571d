//! Seams to the surrounding engine: world mutation and fracture processing.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::events::TargetTransform;
use crate::ids::{EntityId, MaterialId, PartId, PhysicalOwner, StaticHandle};

/// Handle to a concrete mesh instance held by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshHandle(pub u64);

/// Handle to the shared source asset a mesh instance was built from.
/// Two vegetation instances of the same model share one asset id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshAssetId(pub u64);

/// Parameters for one plane-impact fracture request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneImpactRequest {
    pub owner: PhysicalOwner,
    pub part: PartId,
    pub point: Vec3,
    pub velocity: Vec3,
    pub mass: f32,
    pub material: MaterialId,
    pub seed: u32,
    /// Break the whole pane at once instead of carving a partial hole.
    pub auto_shatter: bool,
}

/// Output of island extraction: remaining structure plus the detached piece,
/// if the cut actually separated one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractureIslands {
    pub remaining: MeshHandle,
    pub detached: Option<MeshHandle>,
    /// Approximate memory cost of the generated geometry, for budgeting.
    pub footprint_bytes: usize,
}

/// What the fracture algorithm decided about an impact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImpactOutcome {
    /// Surface absorbed the hit; no geometry change.
    NotBroken,
    /// Broke synchronously; islands are `None` when no piece detached.
    BrokenNow(Option<FractureIslands>),
    /// Break accepted; island extraction runs deferred.
    BrokenDeferred,
    /// Only the render mesh splits deferred; physics already updated.
    BrokenDeferredMeshOnly,
    /// Degenerate input geometry. Treated as a no-op everywhere.
    BadGeometry,
}

impl Default for ImpactOutcome {
    fn default() -> Self {
        ImpactOutcome::NotBroken
    }
}

/// Parameters for re-running a recorded part or deform break on a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructuralBreakParams {
    pub part: PartId,
    pub point: Vec3,
    pub impulse: Vec3,
    /// Vegetation deform cut rather than a rigid part detach.
    pub deform: bool,
    /// Cut height in the target's local space, deform only.
    pub cut_height: f32,
    pub cut_size: f32,
    pub seed: u32,
}

/// Everything needed to clone a previously generated break piece onto a new
/// target (tree-break reuse).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PieceSpawnParams {
    pub mesh: MeshHandle,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    pub impulse: Vec3,
    pub angular_impulse: Vec3,
}

/// The fracture-algorithm boundary.
///
/// `extract_islands` may be called from a worker thread; implementations are
/// expected to be internally synchronized.
pub trait FractureProcessor: Send + Sync {
    /// Evaluate a plane impact against a breakable surface.
    fn process_plane_impact(&self, request: &PlaneImpactRequest) -> ImpactOutcome;

    /// Split the mesh at the recorded seed triangle. `None` means the
    /// geometry would not separate; callers treat that as no split.
    fn extract_islands(&self, mesh: MeshHandle, seed_triangle: i32) -> Option<FractureIslands>;

    /// Apply previously extracted islands to the live world. This is the
    /// back half of a deferred break.
    fn apply_islands(&self, request: &PlaneImpactRequest, islands: &FractureIslands);
}

/// World mutation and queries the destruction core needs from the engine.
pub trait WorldAccess {
    fn entity_transform(&self, id: EntityId) -> Option<TargetTransform>;

    /// Reposition an entity before replaying a recorded break against it.
    fn set_entity_transform(&mut self, id: EntityId, transform: &TargetTransform) -> bool;

    fn entity_exists(&self, id: EntityId) -> bool;

    /// Vehicles bypass the broken-tree throttle.
    fn is_vehicle(&self, id: EntityId) -> bool;

    /// Whether the render mesh for a part has streamed in. Playback of a
    /// replicated break waits on this.
    fn render_mesh_ready(&self, id: EntityId, part: PartId) -> bool;

    fn camera_position(&self) -> Vec3;

    /// Frame index at which the part was last drawn, if ever.
    fn last_drawn_frame(&self, id: EntityId, part: PartId) -> Option<u64>;

    fn current_frame(&self) -> u64;

    /// Release generated break geometry for a part, restoring the original
    /// sub-object or deleting the entity when nothing else remains.
    fn free_broken_mesh(&mut self, id: EntityId, part: PartId);

    fn delete_entity(&mut self, id: EntityId);

    /// Spawn a cloned break piece. Returns the new entity, or `None` if the
    /// engine refused the spawn.
    fn spawn_piece(&mut self, params: &PieceSpawnParams) -> Option<EntityId>;

    /// Re-run a recorded part or deform break: the engine applies the stored
    /// impulse and detaches or cuts the part. Returns the spawned pieces in
    /// spawn order, or `None` when the target rejected the break.
    fn apply_structural_break(
        &mut self,
        owner: PhysicalOwner,
        params: &StructuralBreakParams,
    ) -> Option<Vec<EntityId>>;

    /// Disable secondary collisions on fading debris.
    fn set_collisions_enabled(&mut self, id: EntityId, enabled: bool);

    /// Ramp render opacity for fading debris, 1.0 solid to 0.0 gone.
    fn set_opacity(&mut self, id: EntityId, opacity: f32);

    /// Center position and structural hash of a static geometry instance.
    fn static_center_and_hash(&self, handle: StaticHandle) -> Option<(Vec3, u32)>;

    /// Find a physical object near a position whose structural hash matches.
    fn find_by_position_and_hash(&self, position: Vec3, eps: f32, hash: u32)
    -> Option<PhysicalOwner>;

    /// Shared source asset of a part's mesh, if it has one.
    fn mesh_asset(&self, owner: PhysicalOwner, part: PartId) -> Option<MeshAssetId>;

    /// Concrete mesh instance behind a part.
    fn part_mesh(&self, owner: PhysicalOwner, part: PartId) -> Option<MeshHandle>;
}
