//! The destruction front door.
//!
//! `ActionGameFacade` owns every core component and wires the physics event
//! boundary into them: logged collisions enter the break log and the
//! fracture seam, created parts feed the tree-reuse cache and the
//! replicator, deletions sweep the budget and bindings. The same collision
//! entry point serves live play and save-game replay; replay mode on the
//! log is the only difference between the two.

use std::sync::{Arc, Mutex};

use glam::{Quat, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use cinder_breakage::{
    BreakEventLog, BreakTarget, BreakEvent, BrokenMeshBudget, BrokenObjectTable,
    DeferredFractureScheduler, FractureTask, ObjectIdentifier, RESOLVE_EPS, SaveState,
    TreeBreakInstance, TreeBreakageReuseCache, TreePieceThunk,
};
use cinder_config::Config;
use cinder_net::BreakTransport;
use cinder_physics::{
    broken_mesh_key, CollisionEvent, CollisionSide, CreatedPartEvent, EntityDeletedEvent,
    EntityId, EventDispatch, EventOutcome, FractureProcessor, ImpactOutcome, JointBrokenEvent,
    MeshAssetId, MeshHandle, MeshUpdatedEvent, PartId, PhysicalOwner, PhysicsEvent,
    PieceSpawnParams, PlaneImpactRequest, RemovedPartsEvent, StructuralBreakParams, WorldAccess,
};
use cinder_replicator::{BreakApplier, BreakKind, BreakReplicator, Role};

use crate::connect::HostMigrationListener;
use crate::fade::FadeEntityList;
use crate::throttle::BreakageThrottling;

/// Per-collision surface-effects context.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialFxProbe {
    /// No material-effects system is available.
    pub effects_unavailable: bool,
    /// The impact point is underwater inside a vis-area.
    pub water_overlap_in_visarea: bool,
}

/// Whether impact surface effects should be skipped for this collision.
/// Literal disjunction of the two conditions; flagged for product-owner
/// confirmation rather than second-guessing the intent.
pub fn material_fx_suppressed(probe: &MaterialFxProbe) -> bool {
    probe.effects_unavailable || probe.water_overlap_in_visarea
}

/// Owns and wires the destruction core.
pub struct ActionGameFacade {
    config: Config,
    multiplayer: bool,
    dispatch: EventDispatch,
    log: BreakEventLog,
    broken_objects: BrokenObjectTable,
    broken_2d_chunks: Vec<u32>,
    budget: BrokenMeshBudget,
    scheduler: DeferredFractureScheduler,
    tree_cache: TreeBreakageReuseCache,
    replicator: BreakReplicator,
    processor: Arc<dyn FractureProcessor>,
    throttle: BreakageThrottling,
    fades: FadeEntityList,
    migration: HostMigrationListener,
    remove_part_journal: Vec<RemovedPartsEvent>,
    /// Surfaces with an in-flight deferred fracture; the immediate veto
    /// handler suppresses further collisions against them.
    breaking_surfaces: Arc<Mutex<FxHashSet<u64>>>,
    rng: SmallRng,
    time: f32,
}

impl ActionGameFacade {
    pub fn new(
        config: Config,
        multiplayer: bool,
        role: Role,
        processor: Arc<dyn FractureProcessor>,
    ) -> Self {
        let breaking_surfaces: Arc<Mutex<FxHashSet<u64>>> = Arc::default();
        let mut dispatch = EventDispatch::new();

        // Immediate path: runs inside the physics step, possibly off the
        // main thread. It only reads the shared set under its mutex and
        // vetoes propagation into surfaces already being fractured.
        let veto_set = Arc::clone(&breaking_surfaces);
        dispatch.register_immediate(Box::new(move |event| {
            if let PhysicsEvent::Collision(c) = event {
                if let PhysicalOwner::Entity(id) = c.sides[1].owner {
                    if let Ok(set) = veto_set.lock() {
                        if set.contains(&broken_mesh_key(id, c.sides[1].part)) {
                            return EventOutcome::Suppress;
                        }
                    }
                }
            }
            EventOutcome::Allow
        }));

        Self {
            multiplayer,
            dispatch,
            log: BreakEventLog::new(),
            broken_objects: BrokenObjectTable::default(),
            broken_2d_chunks: Vec::new(),
            budget: BrokenMeshBudget::new(config.breakage.mem_limit_kb),
            scheduler: DeferredFractureScheduler::new(Arc::clone(&processor)),
            tree_cache: TreeBreakageReuseCache::new(config.breakage.tree_cut_reuse_dist),
            replicator: BreakReplicator::new(config.network.clone(), role),
            processor,
            throttle: BreakageThrottling::new(&config.breakage),
            fades: FadeEntityList::new(config.breakage.fade_delay_s, config.breakage.fade_time_s),
            migration: HostMigrationListener::new(config.network.host_migration_server_delay_s),
            remove_part_journal: Vec::new(),
            breaking_surfaces,
            rng: SmallRng::seed_from_u64(0x5EED_C1DE),
            time: 0.0,
            config,
        }
    }

    /// The physics engine pushes events through this.
    pub fn dispatch(&self) -> &EventDispatch {
        &self.dispatch
    }

    pub fn log(&self) -> &BreakEventLog {
        &self.log
    }

    pub fn broken_objects(&self) -> &BrokenObjectTable {
        &self.broken_objects
    }

    pub fn budget(&self) -> &BrokenMeshBudget {
        &self.budget
    }

    pub fn replicator(&self) -> &BreakReplicator {
        &self.replicator
    }

    pub fn replicator_mut(&mut self) -> &mut BreakReplicator {
        &mut self.replicator
    }

    /// Ordered journal of replicated remove-part events, for kill-cam and
    /// stats consumers.
    pub fn remove_part_events(&self) -> &[RemovedPartsEvent] {
        &self.remove_part_journal
    }

    pub fn on_host_promoted(&mut self) {
        self.migration.on_promote();
    }

    pub fn on_host_demoted(&mut self) {
        self.migration.on_demote(&mut self.replicator);
    }

    /// Whether impact surface effects should play for this collision.
    pub fn should_play_impact_effects(&self, probe: &MaterialFxProbe) -> bool {
        !material_fx_suppressed(probe)
    }

    // -----------------------------------------------------------------------
    // Logged collision entry point (live play and save replay)
    // -----------------------------------------------------------------------

    /// Handle a settled collision. Returns `Suppress` when the surface will
    /// fracture, vetoing further physics propagation.
    pub fn on_collision_logged(
        &mut self,
        world: &mut dyn WorldAccess,
        collision: &CollisionEvent,
        transport: &mut dyn BreakTransport,
    ) -> EventOutcome {
        let impactor = collision.sides[0];
        let surface = collision.sides[1];
        let energy = 0.5 * impactor.mass * impactor.velocity.length_squared();

        let event_ref = self.log.register(world, collision, energy, self.time);

        let auto_shatter = self.throttle.note_glass_event();
        let request = PlaneImpactRequest {
            owner: surface.owner,
            part: surface.part,
            point: collision.point,
            velocity: impactor.velocity,
            mass: impactor.mass,
            material: surface.material,
            seed: collision.seed,
            auto_shatter,
        };

        match self.processor.process_plane_impact(&request) {
            ImpactOutcome::NotBroken => EventOutcome::Allow,
            ImpactOutcome::BadGeometry => {
                // No-op on both the physics and replication layers
                debug!(owner = ?surface.owner, "plane impact on degenerate geometry");
                EventOutcome::Allow
            }
            ImpactOutcome::BrokenNow(islands) => {
                self.finish_plane_break(world, transport, event_ref, &request, islands);
                EventOutcome::Suppress
            }
            ImpactOutcome::BrokenDeferred | ImpactOutcome::BrokenDeferredMeshOnly => {
                self.submit_deferred(world, &request);
                EventOutcome::Suppress
            }
        }
    }

    fn finish_plane_break(
        &mut self,
        world: &mut dyn WorldAccess,
        transport: &mut dyn BreakTransport,
        event_ref: u32,
        request: &PlaneImpactRequest,
        islands: Option<cinder_physics::FractureIslands>,
    ) {
        if let Some(islands) = islands {
            self.processor.apply_islands(request, &islands);
            if let Some(id) = request.owner.entity() {
                let timeout = self.pane_timeout();
                self.budget.register_mesh(
                    world,
                    id,
                    request.part,
                    islands.footprint_bytes,
                    timeout,
                    None,
                );
            }
        }

        let mesh = world
            .part_mesh(request.owner, request.part)
            .unwrap_or(MeshHandle(0));
        let prior = self.broken_objects.len();
        let record_idx = self
            .broken_objects
            .get_or_create(request.owner, request.part, mesh);
        let first_break = self.broken_objects.len() > prior;
        self.log.set_broken_object(event_ref, record_idx);

        if self.log.is_replaying() {
            return;
        }

        let identifier = ObjectIdentifier::from_owner(world, request.owner);
        let kind = BreakKind::PlaneBreak {
            part: request.part,
            point: request.point,
            dir: request.velocity.normalize_or_zero(),
            speed: request.velocity.length(),
            mass: request.mass,
            material: request.material,
            seed: request.seed,
            auto_shatter: request.auto_shatter,
            first_break,
        };
        match self.replicator.role() {
            Role::Server => {
                if self.replicator.begin_break(identifier, kind) {
                    if !first_break {
                        // Secondary pane breaks reach late joiners via replay
                        self.replicator.mark_client_join_replay();
                    }
                    self.replicator.end_event();
                }
            }
            Role::Client => {
                if self.multiplayer {
                    self.replicator
                        .send_client_glass_break(transport, &identifier, &kind);
                }
            }
        }
    }

    fn submit_deferred(&mut self, world: &mut dyn WorldAccess, request: &PlaneImpactRequest) {
        if let Some(id) = request.owner.entity() {
            if let Ok(mut set) = self.breaking_surfaces.lock() {
                set.insert(broken_mesh_key(id, request.part));
            }
        }
        let mesh = world
            .part_mesh(request.owner, request.part)
            .unwrap_or(MeshHandle(0));
        let task = FractureTask {
            request: *request,
            mesh,
            seed_triangle: request.seed as i32,
        };
        let outcome = self.scheduler.submit(task, self.multiplayer);
        trace!(?outcome, "deferred fracture submitted");
    }

    /// Forced glass timeout: overrides material-driven pane timeouts when
    /// configured, spread uniformly to avoid synchronized shatters.
    fn pane_timeout(&mut self) -> Option<f32> {
        let force = self.config.breakage.force_timeout_s;
        let spread = self.config.breakage.force_timeout_spread_s;
        (force > 0.0).then(|| force + self.rng.random::<f32>() * spread)
    }

    // -----------------------------------------------------------------------
    // Tree breakage
    // -----------------------------------------------------------------------

    /// Gate a deform (tree) break through the throttle. Call before asking
    /// the engine to fracture vegetation.
    pub fn allow_deform_break(&mut self, world: &dyn WorldAccess, impactor: PhysicalOwner) -> bool {
        let vehicle = impactor.entity().is_some_and(|id| world.is_vehicle(id));
        self.throttle.allow_deform_break(vehicle)
    }

    /// Serve a tree cut from the reuse cache. `true` means the pieces were
    /// cloned and the fracture algorithm must not run.
    pub fn try_reuse_tree_cut(
        &mut self,
        world: &mut dyn WorldAccess,
        target: PhysicalOwner,
        asset: MeshAssetId,
        hit_height: f32,
        cut_size: f32,
    ) -> bool {
        self.tree_cache
            .try_reuse(world, target, asset, hit_height, cut_size, self.multiplayer)
    }

    // -----------------------------------------------------------------------
    // Other logged events
    // -----------------------------------------------------------------------

    fn on_created_part(&mut self, world: &mut dyn WorldAccess, ev: &CreatedPartEvent) {
        let new_entity = ev.new_owner.entity();

        if ev.deformed {
            self.record_tree_instance(world, ev);
        }

        if self.replicator.role() == Role::Server && !self.log.is_replaying() {
            let identifier = ObjectIdentifier::from_owner(world, ev.owner);
            let kind = if ev.deformed {
                // Cut height travels in trunk-local space, the same frame the
                // reuse cache records
                let cut_height = ev
                    .owner
                    .entity()
                    .and_then(|id| world.entity_transform(id))
                    .map(|t| (ev.cut_position.z - t.position.z) / t.scale.max(f32::EPSILON))
                    .unwrap_or(ev.cut_position.z);
                BreakKind::DeformBreak {
                    part: ev.source_part,
                    point: ev.cut_position,
                    dir: ev.cut_direction,
                    cut_height,
                    cut_size: ev.cut_size,
                    seed: 0,
                }
            } else {
                BreakKind::PartBreak {
                    part: ev.source_part,
                    point: ev.cut_position,
                    dir: ev.cut_direction,
                    energy: ev.impulse.length(),
                    mass: 0.0,
                    seed: 0,
                }
            };
            if self.replicator.begin_break(identifier, kind) {
                if let Some(id) = new_entity {
                    self.replicator.absorb_product(id);
                }
                self.replicator.end_event();
            }
        }

        if self.multiplayer {
            if let Some(id) = new_entity {
                if ev.new_owner != ev.owner {
                    self.fades.push(id);
                }
            }
        }
    }

    fn record_tree_instance(&mut self, world: &mut dyn WorldAccess, ev: &CreatedPartEvent) {
        let Some(asset) = world.mesh_asset(ev.owner, ev.source_part) else {
            return;
        };
        let Some(source_id) = ev.owner.entity() else {
            return;
        };
        let Some(transform) = world.entity_transform(source_id) else {
            return;
        };
        let scale = transform.scale.max(f32::EPSILON);
        let piece = TreePieceThunk {
            mesh: world
                .part_mesh(ev.new_owner, ev.new_part)
                .unwrap_or(MeshHandle(0)),
            rel_position: transform.rotation.inverse() * (ev.cut_position - transform.position)
                / scale,
            rotation: Quat::IDENTITY,
            impulse: ev.impulse,
            angular_impulse: ev.angular_impulse,
        };
        self.tree_cache.record(TreeBreakInstance {
            source: ev.owner,
            asset,
            cut_height: (ev.cut_position.z - transform.position.z) / scale,
            cut_size: ev.cut_size / scale,
            secondary: ev.new_owner != ev.owner,
            pieces: vec![piece],
        });
    }

    fn on_joint_broken(&mut self, world: &dyn WorldAccess, ev: &JointBrokenEvent) {
        if self.replicator.role() != Role::Server || self.log.is_replaying() {
            return;
        }
        let identifier = ObjectIdentifier::from_owner(world, ev.owner);
        let kind = BreakKind::PartBreak {
            part: ev.part,
            point: ev.epicenter,
            dir: Vec3::Z,
            energy: 0.0,
            mass: 0.0,
            seed: 0,
        };
        if self.replicator.begin_break(identifier, kind) {
            self.replicator.absorb_joint(ev.joint);
            self.replicator.end_event();
        }
    }

    fn on_mesh_updated(&mut self, ev: &MeshUpdatedEvent) {
        // Further deformation invalidates recorded cuts for this source
        self.tree_cache.remove_entry(ev.owner, ev.is_secondary_piece);
    }

    fn on_entity_deleted(&mut self, world: &mut dyn WorldAccess, ev: &EntityDeletedEvent) {
        let Some(id) = ev.owner.entity() else {
            return;
        };
        self.budget.free_for_entity(world, id);
        self.tree_cache.remove_entry(ev.owner, false);
        self.fades.remove(id);
        self.replicator.registry_mut().unbind_entity(id);
        self.replicator.bindings_mut().unbind_local(id);
    }

    /// A spawned entity replaced static geometry; bind its hash so later
    /// replicated breaks resolve directly.
    pub fn on_entity_spawned_for_static(&mut self, hash: u32, entity: EntityId) {
        self.replicator.registry_mut().bind(hash, entity);
    }

    // -----------------------------------------------------------------------
    // Frame update
    // -----------------------------------------------------------------------

    pub fn update(
        &mut self,
        dt: f32,
        world: &mut dyn WorldAccess,
        transport: &mut dyn BreakTransport,
    ) {
        self.time += dt;

        for event in self.dispatch.drain_logged() {
            match &event {
                PhysicsEvent::Collision(c) => {
                    self.on_collision_logged(world, c, transport);
                }
                PhysicsEvent::CreatedPart(e) => self.on_created_part(world, e),
                PhysicsEvent::JointBroken(e) => self.on_joint_broken(world, e),
                PhysicsEvent::MeshUpdated(e) => self.on_mesh_updated(e),
                PhysicsEvent::RemovedParts(e) => self.remove_part_journal.push(e.clone()),
                PhysicsEvent::EntityDeleted(e) => self.on_entity_deleted(world, e),
                PhysicsEvent::PostStep(_)
                | PhysicsEvent::StateChange(_)
                | PhysicsEvent::BboxOverlap(_) => {}
            }
        }

        // Deferred fracture results
        for (task, islands) in self.scheduler.poll() {
            if let Some(id) = task.request.owner.entity() {
                if let Ok(mut set) = self.breaking_surfaces.lock() {
                    set.remove(&broken_mesh_key(id, task.request.part));
                }
            }
            match islands {
                Some(islands) => {
                    self.processor.apply_islands(&task.request, &islands);
                    if let Some(id) = task.request.owner.entity() {
                        let timeout = self.pane_timeout();
                        self.budget.register_mesh(
                            world,
                            id,
                            task.request.part,
                            islands.footprint_bytes,
                            timeout,
                            None,
                        );
                    }
                }
                None => trace!(owner = ?task.request.owner, "deferred fracture found no split"),
            }
        }

        // Replication drive; playback re-enters the core through the applier
        let mut applier = PlaybackApplier {
            processor: Arc::clone(&self.processor),
            log: &mut self.log,
            broken_objects: &mut self.broken_objects,
            budget: &mut self.budget,
            fades: &mut self.fades,
            multiplayer: self.multiplayer,
            time: self.time,
        };
        self.replicator.update(dt, world, &mut applier, transport);
        self.migration.update(dt, &mut self.replicator, transport);

        self.budget.update(world, dt);
        if self.multiplayer {
            self.fades.update(dt, world, &mut self.budget);
        }
        self.throttle.end_frame();

        if self.config.debug.draw_broken_meshes {
            for entry in self.budget.debug_snapshot() {
                debug!(
                    entity = %entry.entity,
                    part = entry.part,
                    size_kb = entry.size_kb,
                    "broken mesh"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn save_state(&self) -> SaveState {
        let (broken_ent_parts, broken_veg_parts) = self
            .broken_objects
            .records()
            .iter()
            .copied()
            .partition(|r| matches!(r.owner, PhysicalOwner::Entity(_)));
        SaveState {
            break_events: self.log.events().to_vec(),
            broken_ent_parts,
            broken_veg_parts,
            broken_2d_chunks: self.broken_2d_chunks.clone(),
            mesh_removals: self.budget.removals().to_vec(),
            mem_limit_kb: self.config.breakage.mem_limit_kb,
        }
    }

    /// Rebuild destruction state by replaying the saved log through the
    /// live fracture path.
    pub fn load_state(
        &mut self,
        world: &mut dyn WorldAccess,
        transport: &mut dyn BreakTransport,
        state: &SaveState,
    ) {
        self.log.clear();
        self.broken_objects.clear();
        self.budget.clear();
        self.tree_cache.clear();
        self.remove_part_journal.clear();
        self.broken_2d_chunks = state.broken_2d_chunks.clone();
        self.budget.set_limit_kb(state.mem_limit_kb);
        self.budget.set_loading(true);

        // Re-free meshes the saved session had already evicted
        for &removal in &state.mesh_removals {
            if removal >= 0 {
                let entity = EntityId((removal >> 8) as u32);
                let part = (removal & 0xff) as PartId;
                world.free_broken_mesh(entity, part);
            }
        }

        for (index, event) in state.break_events.iter().enumerate() {
            // Reposition the target the way it stood when the break happened
            if let BreakTarget::Entity { id, transform } = &event.target {
                world.set_entity_transform(*id, transform);
            }
            self.log.store(event.clone());
            self.log.begin_replay_at(index);
            match collision_from_event(world, event) {
                Some(collision) => {
                    self.on_collision_logged(world, &collision, transport);
                }
                None => debug!(index, "saved break target not found, skipped"),
            }
            self.log.end_replay();
        }

        self.budget.set_loading(false);
    }
}

/// Reconstruct the collision a saved break event was built from. The
/// impactor's identity is not persisted; only its kinematics matter to the
/// fracture path.
fn collision_from_event(world: &dyn WorldAccess, event: &BreakEvent) -> Option<CollisionEvent> {
    let surface_owner = match event.target {
        BreakTarget::Entity { id, .. } => PhysicalOwner::Entity(id),
        BreakTarget::Static { center, hash } => {
            world.find_by_position_and_hash(center, RESOLVE_EPS, hash)?
        }
    };
    Some(CollisionEvent {
        point: event.point,
        normal: event.normal,
        sides: [
            CollisionSide {
                owner: surface_owner,
                velocity: event.velocities[0],
                mass: event.masses[0],
                material: event.materials[0],
                part: event.parts[0],
            },
            CollisionSide {
                owner: surface_owner,
                velocity: event.velocities[1],
                mass: event.masses[1],
                material: event.materials[1],
                part: event.parts[1],
            },
        ],
        penetration: event.penetration,
        backface: false,
        seed: event.seed,
    })
}

/// Re-enters the fracture path for replicated breaks arriving from the
/// network. Split out of the facade so the replicator can borrow it while
/// it owns the stream table.
struct PlaybackApplier<'a> {
    processor: Arc<dyn FractureProcessor>,
    log: &'a mut BreakEventLog,
    broken_objects: &'a mut BrokenObjectTable,
    budget: &'a mut BrokenMeshBudget,
    fades: &'a mut FadeEntityList,
    multiplayer: bool,
    time: f32,
}

impl BreakApplier for PlaybackApplier<'_> {
    fn apply_break(
        &mut self,
        world: &mut dyn WorldAccess,
        target: PhysicalOwner,
        kind: &BreakKind,
    ) -> Option<Vec<EntityId>> {
        match kind {
            BreakKind::PlaneBreak {
                part,
                point,
                dir,
                speed,
                mass,
                material,
                seed,
                auto_shatter,
                ..
            } => {
                let request = PlaneImpactRequest {
                    owner: target,
                    part: *part,
                    point: *point,
                    velocity: *dir * *speed,
                    mass: *mass,
                    material: *material,
                    seed: *seed,
                    auto_shatter: *auto_shatter,
                };
                let outcome = self.processor.process_plane_impact(&request);
                if outcome == ImpactOutcome::BadGeometry {
                    return None;
                }

                let mut spawned = Vec::new();
                if let ImpactOutcome::BrokenNow(Some(islands)) = outcome {
                    self.processor.apply_islands(&request, &islands);
                    if let Some(id) = target.entity() {
                        self.budget.register_mesh(
                            world,
                            id,
                            *part,
                            islands.footprint_bytes,
                            None,
                            None,
                        );
                    }
                    if let Some(detached) = islands.detached {
                        if let Some(id) = world.spawn_piece(&PieceSpawnParams {
                            mesh: detached,
                            position: *point,
                            rotation: Quat::IDENTITY,
                            scale: 1.0,
                            impulse: *dir * *speed,
                            angular_impulse: Vec3::ZERO,
                        }) {
                            if self.multiplayer {
                                self.fades.push(id);
                            }
                            spawned.push(id);
                        }
                    }
                }

                // Enter the log so saves taken on this replica replay it
                let breaks_target = break_target_from(world, target, *point);
                let event_ref = self.log.store(BreakEvent {
                    target: breaks_target,
                    point: *point,
                    normal: *dir,
                    velocities: [*dir * *speed, Vec3::ZERO],
                    masses: [*mass, 0.0],
                    materials: [0, *material],
                    parts: [0, *part],
                    penetration: 0.0,
                    energy: 0.5 * *mass * *speed * *speed,
                    seed: *seed,
                    time: self.time,
                    broken_object: -1,
                    state: cinder_breakage::BreakEventState::Generated,
                });
                let mesh = world.part_mesh(target, *part).unwrap_or(MeshHandle(0));
                let record_idx = self.broken_objects.get_or_create(target, *part, mesh);
                self.log.set_broken_object(event_ref, record_idx);

                Some(spawned)
            }
            BreakKind::PartBreak {
                part,
                point,
                dir,
                energy,
                seed,
                ..
            } => self.apply_structural(
                world,
                target,
                &StructuralBreakParams {
                    part: *part,
                    point: *point,
                    impulse: *dir * *energy,
                    deform: false,
                    cut_height: 0.0,
                    cut_size: 0.0,
                    seed: *seed,
                },
            ),
            BreakKind::DeformBreak {
                part,
                point,
                dir,
                cut_height,
                cut_size,
                seed,
            } => self.apply_structural(
                world,
                target,
                &StructuralBreakParams {
                    part: *part,
                    point: *point,
                    impulse: *dir,
                    deform: true,
                    cut_height: *cut_height,
                    cut_size: *cut_size,
                    seed: *seed,
                },
            ),
        }
    }
}

impl PlaybackApplier<'_> {
    /// Part and deform breaks bypass the plane-fracture seam: the engine
    /// re-runs the recorded impulse and cut directly. Spawned pieces come
    /// back for product binding and multiplayer fade-out.
    fn apply_structural(
        &mut self,
        world: &mut dyn WorldAccess,
        target: PhysicalOwner,
        params: &StructuralBreakParams,
    ) -> Option<Vec<EntityId>> {
        let spawned = world.apply_structural_break(target, params)?;
        trace!(?target, pieces = spawned.len(), "structural break replayed");
        if self.multiplayer {
            for id in &spawned {
                self.fades.push(*id);
            }
        }
        Some(spawned)
    }
}

fn break_target_from(world: &dyn WorldAccess, owner: PhysicalOwner, point: Vec3) -> BreakTarget {
    match owner {
        PhysicalOwner::Entity(id) => BreakTarget::Entity {
            id,
            transform: world.entity_transform(id).unwrap_or_default(),
        },
        PhysicalOwner::StaticGeometry(handle) => match world.static_center_and_hash(handle) {
            Some((center, hash)) => BreakTarget::Static { center, hash },
            None => BreakTarget::Static {
                center: point,
                hash: 0,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_breakage::BreakEventState;
    use cinder_net::testing::RecordingTransport;
    use cinder_physics::testing::{FakeFractureProcessor, FakeWorld};
    use cinder_physics::{FractureIslands, TargetTransform};

    fn breaking_processor() -> Arc<FakeFractureProcessor> {
        Arc::new(FakeFractureProcessor::breaking_now(Some(FractureIslands {
            remaining: MeshHandle(1),
            detached: Some(MeshHandle(2)),
            footprint_bytes: 50 * 1024,
        })))
    }

    fn server_facade(processor: Arc<FakeFractureProcessor>) -> ActionGameFacade {
        ActionGameFacade::new(Config::default(), false, Role::Server, processor)
    }

    fn collision_on(owner: PhysicalOwner, part: PartId, point: Vec3) -> CollisionEvent {
        CollisionEvent {
            point,
            normal: Vec3::Z,
            sides: [
                CollisionSide {
                    owner,
                    velocity: Vec3::new(0.0, -20.0, 0.0),
                    mass: 10.0,
                    material: 3,
                    part: 0,
                },
                CollisionSide {
                    owner,
                    velocity: Vec3::ZERO,
                    mass: 0.0,
                    material: 7,
                    part,
                },
            ],
            penetration: 0.01,
            backface: false,
            seed: 42,
        }
    }

    #[test]
    fn test_stored_events_are_processed_and_counted() {
        let mut facade = server_facade(breaking_processor());
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(3), Vec3::ZERO);
        let mut transport = RecordingTransport::default();

        for i in 0..4 {
            let collision =
                collision_on(PhysicalOwner::Entity(EntityId(3)), i, Vec3::new(0.0, 0.0, 1.0));
            facade.on_collision_logged(&mut world, &collision, &mut transport);
        }

        assert_eq!(facade.log().len(), 4);
        assert!(facade
            .log()
            .events()
            .iter()
            .all(|e| e.state == BreakEventState::Processed));
        // One broken-object record per distinct part
        assert_eq!(facade.broken_objects().records().len(), 4);
    }

    #[test]
    fn test_breaking_collision_suppresses_propagation() {
        let mut facade = server_facade(breaking_processor());
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(3), Vec3::ZERO);
        let mut transport = RecordingTransport::default();

        let collision = collision_on(PhysicalOwner::Entity(EntityId(3)), 0, Vec3::ZERO);
        let outcome = facade.on_collision_logged(&mut world, &collision, &mut transport);
        assert_eq!(outcome, EventOutcome::Suppress);
        assert_eq!(facade.budget().len(), 1);
    }

    #[test]
    fn test_unbreakable_surface_allows_propagation() {
        let mut facade = server_facade(Arc::new(FakeFractureProcessor::default()));
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(3), Vec3::ZERO);
        let mut transport = RecordingTransport::default();

        let collision = collision_on(PhysicalOwner::Entity(EntityId(3)), 0, Vec3::ZERO);
        let outcome = facade.on_collision_logged(&mut world, &collision, &mut transport);
        assert_eq!(outcome, EventOutcome::Allow);
        // Events are always appended, broken or not
        assert_eq!(facade.log().len(), 1);
        assert!(facade.broken_objects().is_empty());
    }

    #[test]
    fn test_update_drains_dispatch_into_log() {
        let mut facade = server_facade(breaking_processor());
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(3), Vec3::ZERO);
        let mut transport = RecordingTransport::default();

        let collision = collision_on(PhysicalOwner::Entity(EntityId(3)), 0, Vec3::ZERO);
        facade.dispatch().dispatch(PhysicsEvent::Collision(collision));
        facade.update(0.016, &mut world, &mut transport);
        assert_eq!(facade.log().len(), 1);
    }

    #[test]
    fn test_server_break_is_broadcast_after_cooldown() {
        let mut facade = server_facade(breaking_processor());
        let mut world = FakeWorld::new();
        let target = world.add_searchable(Vec3::new(5.0, 5.0, 1.0), 0x77);
        let mut transport = RecordingTransport::default();

        let collision = collision_on(target, 0, Vec3::new(5.0, 5.0, 1.2));
        facade.on_collision_logged(&mut world, &collision, &mut transport);
        for _ in 0..5 {
            facade.update(0.016, &mut world, &mut transport);
        }
        assert_eq!(transport.broadcasts.len(), 1);
    }

    #[test]
    fn test_deform_break_round_trip_mutates_replica_world() {
        let processor = breaking_processor();
        let mut server =
            ActionGameFacade::new(
            Config::default(),
            true,
            Role::Server,
            Arc::clone(&processor) as Arc<dyn FractureProcessor>,
        );
        let mut sworld = FakeWorld::new();
        // Tree at z = 5, scale 2, cut at z = 7: local cut height 1
        let tree_transform = TargetTransform {
            position: Vec3::new(10.0, 0.0, 5.0),
            scale: 2.0,
            ..Default::default()
        };
        sworld.entities.insert(EntityId(5), tree_transform);
        sworld.assets.insert((EntityId(5), 0), MeshAssetId(900));
        let mut stransport = RecordingTransport::default();

        let cut = CreatedPartEvent {
            owner: PhysicalOwner::Entity(EntityId(5)),
            new_owner: PhysicalOwner::Entity(EntityId(50)),
            source_part: 0,
            new_part: 1,
            remaining_parts: 1,
            cut_position: Vec3::new(10.0, 0.0, 7.0),
            cut_direction: Vec3::X,
            cut_size: 0.3,
            impulse: Vec3::new(4.0, 0.0, 0.0),
            angular_impulse: Vec3::ZERO,
            deformed: true,
        };
        server.dispatch().dispatch(PhysicsEvent::CreatedPart(cut));
        for _ in 0..5 {
            server.update(0.016, &mut sworld, &mut stransport);
        }
        assert_eq!(stransport.broadcasts.len(), 1);

        let mut client =
            ActionGameFacade::new(Config::default(), true, Role::Client, processor);
        let mut cworld = FakeWorld::new();
        cworld.entities.insert(EntityId(15), tree_transform);
        let mut ctransport = RecordingTransport::default();
        // The client knows the server's tree under a different local id
        let tree_net = server.replicator_mut().bindings_mut().net(EntityId(5)).unwrap();
        client.replicator_mut().bindings_mut().bind(tree_net, EntityId(15));
        for (msg, _) in &stransport.broadcasts {
            ctransport.receive(msg.clone());
        }

        client.update(0.016, &mut cworld, &mut ctransport);

        // The replica's world actually changed
        assert_eq!(cworld.structural_breaks.len(), 1);
        let (target, params) = &cworld.structural_breaks[0];
        assert_eq!(*target, PhysicalOwner::Entity(EntityId(15)));
        assert!(params.deform);
        assert!((params.cut_height - 1.0).abs() < 0.01);

        // The cut piece the client spawned binds to the server's product
        let product_net = server.replicator_mut().bindings_mut().net(EntityId(50)).unwrap();
        assert_eq!(
            client.replicator_mut().bindings_mut().local(product_net),
            Some(EntityId(10_000))
        );
    }

    #[test]
    fn test_client_plane_break_reported_to_server() {
        let processor = breaking_processor();
        let mut facade =
            ActionGameFacade::new(Config::default(), true, Role::Client, processor);
        let mut world = FakeWorld::new();
        let target = world.add_searchable(Vec3::new(5.0, 5.0, 1.0), 0x88);
        let mut transport = RecordingTransport::default();

        let collision = collision_on(target, 0, Vec3::new(5.0, 5.0, 1.2));
        facade.on_collision_logged(&mut world, &collision, &mut transport);
        assert_eq!(transport.to_server.len(), 1);
        assert!(transport.broadcasts.is_empty());
    }

    #[test]
    fn test_entity_deleted_sweeps_bookkeeping() {
        let mut facade = server_facade(breaking_processor());
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(3), Vec3::ZERO);
        let mut transport = RecordingTransport::default();

        let collision = collision_on(PhysicalOwner::Entity(EntityId(3)), 0, Vec3::ZERO);
        facade.on_collision_logged(&mut world, &collision, &mut transport);
        assert_eq!(facade.budget().len(), 1);

        facade
            .dispatch()
            .dispatch(PhysicsEvent::EntityDeleted(EntityDeletedEvent {
                owner: PhysicalOwner::Entity(EntityId(3)),
            }));
        facade.update(0.016, &mut world, &mut transport);
        assert_eq!(facade.budget().len(), 0);
    }

    #[test]
    fn test_remove_part_events_are_journaled() {
        let mut facade = server_facade(breaking_processor());
        let mut world = FakeWorld::new();
        let mut transport = RecordingTransport::default();

        facade
            .dispatch()
            .dispatch(PhysicsEvent::RemovedParts(RemovedPartsEvent {
                owner: PhysicalOwner::Entity(EntityId(9)),
                base_part: 4,
                removed_mask: 0b101,
            }));
        facade.update(0.016, &mut world, &mut transport);
        assert_eq!(facade.remove_part_events().len(), 1);
        assert_eq!(facade.remove_part_events()[0].base_part, 4);
    }

    #[test]
    fn test_save_load_roundtrip_is_idempotent() {
        let processor = breaking_processor();
        let mut facade = server_facade(Arc::clone(&processor));
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(3), Vec3::new(1.0, 2.0, 0.0));
        world.add_entity(EntityId(4), Vec3::new(8.0, 2.0, 0.0));
        let mut transport = RecordingTransport::default();

        for (entity, part) in [(3u32, 0), (4, 1), (3, 2)] {
            let collision = collision_on(
                PhysicalOwner::Entity(EntityId(entity)),
                part,
                Vec3::new(entity as f32, 2.0, 0.5),
            );
            facade.on_collision_logged(&mut world, &collision, &mut transport);
        }
        let saved = facade.save_state();
        assert_eq!(saved.break_events.len(), 3);
        assert_eq!(saved.broken_ent_parts.len(), 3);

        // Fresh session, same world: replaying rebuilds identical state
        let mut restored = server_facade(processor);
        restored.load_state(&mut world, &mut transport, &saved);
        assert_eq!(restored.log().len(), 3);
        assert_eq!(
            restored.broken_objects().records(),
            facade.broken_objects().records()
        );
        assert_eq!(restored.save_state().break_events, saved.break_events);
    }

    #[test]
    fn test_load_consumes_removal_journal() {
        let processor = breaking_processor();
        let mut facade = server_facade(processor);
        let mut world = FakeWorld::new();
        let mut transport = RecordingTransport::default();

        let saved = SaveState {
            mesh_removals: vec![(6_i64 << 8) | 2, -1],
            ..SaveState::default()
        };
        facade.load_state(&mut world, &mut transport, &saved);
        assert_eq!(world.freed_meshes, vec![(EntityId(6), 2)]);
    }

    #[test]
    fn test_material_fx_condition_is_a_literal_disjunction() {
        assert!(!material_fx_suppressed(&MaterialFxProbe::default()));
        assert!(material_fx_suppressed(&MaterialFxProbe {
            effects_unavailable: true,
            ..MaterialFxProbe::default()
        }));
        assert!(material_fx_suppressed(&MaterialFxProbe {
            water_overlap_in_visarea: true,
            ..MaterialFxProbe::default()
        }));
    }

    #[test]
    fn test_tree_reuse_hits_in_single_player_only() {
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(5), Vec3::new(10.0, 0.0, 0.0));
        world.add_entity(EntityId(6), Vec3::new(20.0, 0.0, 0.0));
        world
            .assets
            .insert((EntityId(5), 0), MeshAssetId(900));

        let processor = breaking_processor();
        let mut sp = server_facade(Arc::clone(&processor));

        // Record a cut through the created-part path
        let cut = CreatedPartEvent {
            owner: PhysicalOwner::Entity(EntityId(5)),
            new_owner: PhysicalOwner::Entity(EntityId(50)),
            source_part: 0,
            new_part: 1,
            remaining_parts: 1,
            cut_position: Vec3::new(10.0, 0.0, 1.5),
            cut_direction: Vec3::X,
            cut_size: 0.3,
            impulse: Vec3::X,
            angular_impulse: Vec3::ZERO,
            deformed: true,
        };
        sp.on_created_part(&mut world, &cut);

        // Same asset, cut height within tolerance: single player reuses
        assert!(sp.try_reuse_tree_cut(
            &mut world,
            PhysicalOwner::Entity(EntityId(6)),
            MeshAssetId(900),
            1.5,
            0.3,
        ));
        assert_eq!(world.spawned.len(), 1);

        let mut mp = ActionGameFacade::new(Config::default(), true, Role::Server, processor);
        mp.on_created_part(&mut world, &cut);
        assert!(!mp.try_reuse_tree_cut(
            &mut world,
            PhysicalOwner::Entity(EntityId(6)),
            MeshAssetId(900),
            1.5,
            0.3,
        ));
    }

    #[test]
    fn test_deform_break_throttle_gates_non_vehicles() {
        let mut config = Config::default();
        config.breakage.tree_counter_max = 10;
        config.breakage.tree_counter_inc = 8;
        config.breakage.tree_counter_dec = 1;
        let mut facade =
            ActionGameFacade::new(config, false, Role::Server, breaking_processor());
        let mut world = FakeWorld::new();
        world.add_entity(EntityId(1), Vec3::ZERO);
        world.add_entity(EntityId(2), Vec3::ZERO);
        world.vehicles.insert(EntityId(2));

        let walker = PhysicalOwner::Entity(EntityId(1));
        let car = PhysicalOwner::Entity(EntityId(2));
        assert!(facade.allow_deform_break(&world, walker));
        assert!(facade.allow_deform_break(&world, walker));
        assert!(!facade.allow_deform_break(&world, walker));
        assert!(facade.allow_deform_break(&world, car));
    }
}
