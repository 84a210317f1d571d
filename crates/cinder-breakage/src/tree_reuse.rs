//! Opportunistic reuse of recorded tree cuts.
//!
//! Cutting a tree is expensive. When a new cut lands on another instance of
//! the same source asset at nearly the same height and radius, the pieces
//! generated by the earlier cut are cloned onto the new target instead of
//! re-running the fracture algorithm. Reuse is single-player only: cloned
//! results are not replicated deterministically.

use glam::{Quat, Vec3};
use tracing::debug;

use cinder_physics::{MeshAssetId, MeshHandle, PhysicalOwner, PieceSpawnParams, WorldAccess};

/// One cloned piece of a recorded cut, stored in unscaled asset space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreePieceThunk {
    pub mesh: MeshHandle,
    pub rel_position: Vec3,
    pub rotation: Quat,
    pub impulse: Vec3,
    pub angular_impulse: Vec3,
}

/// A recorded cut: the source it came from and the pieces it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeBreakInstance {
    pub source: PhysicalOwner,
    pub asset: MeshAssetId,
    /// Cut height above the instance origin, in asset space.
    pub cut_height: f32,
    /// Cut radius, in asset space.
    pub cut_size: f32,
    /// True when the source was itself a piece spawned by an earlier break.
    pub secondary: bool,
    pub pieces: Vec<TreePieceThunk>,
}

/// Cache of recorded tree cuts, matched by asset and cut geometry.
pub struct TreeBreakageReuseCache {
    instances: Vec<TreeBreakInstance>,
    /// Maximum height mismatch for a match. 0 disables reuse.
    reuse_dist: f32,
}

impl TreeBreakageReuseCache {
    pub fn new(reuse_dist: f32) -> Self {
        Self {
            instances: Vec::new(),
            reuse_dist,
        }
    }

    pub fn set_reuse_dist(&mut self, reuse_dist: f32) {
        self.reuse_dist = reuse_dist;
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Record a completed cut for later reuse.
    pub fn record(&mut self, instance: TreeBreakInstance) {
        self.instances.push(instance);
    }

    /// Try to serve a new cut from the cache.
    ///
    /// `hit_height` and `cut_size` are in the target's world scale. On a
    /// hit, the recorded pieces are cloned onto the target and `true` is
    /// returned; the caller skips the fracture algorithm entirely.
    pub fn try_reuse(
        &self,
        world: &mut dyn WorldAccess,
        target: PhysicalOwner,
        asset: MeshAssetId,
        hit_height: f32,
        cut_size: f32,
        multiplayer: bool,
    ) -> bool {
        if self.reuse_dist <= 0.0 || multiplayer {
            return false;
        }
        let Some(target_id) = target.entity() else {
            return false;
        };
        let Some(transform) = world.entity_transform(target_id) else {
            return false;
        };
        let scale = transform.scale;

        let Some(instance) = self.instances.iter().find(|cand| {
            cand.asset == asset
                && (cand.cut_height * scale - hit_height).abs() <= self.reuse_dist
                && (cand.cut_size * scale - cut_size).abs() <= cut_size * scale * 0.1
        }) else {
            return false;
        };

        debug!(
            target = %target_id,
            cut_height = instance.cut_height,
            "reusing recorded tree cut"
        );
        for piece in &instance.pieces {
            world.spawn_piece(&PieceSpawnParams {
                mesh: piece.mesh,
                position: transform.position + transform.rotation * (piece.rel_position * scale),
                rotation: transform.rotation * piece.rotation,
                scale,
                impulse: piece.impulse,
                angular_impulse: piece.angular_impulse,
            });
        }
        true
    }

    /// Drop recorded cuts sourced from an instance whose mesh changed.
    /// With `only_if_secondary`, primary-source records survive.
    pub fn remove_entry(&mut self, owner: PhysicalOwner, only_if_secondary: bool) {
        self.instances
            .retain(|inst| inst.source != owner || (only_if_secondary && !inst.secondary));
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }
}
