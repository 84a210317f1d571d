//! Append-only log of destructive interactions.
//!
//! Events are addressed by their position in the log; recorded indices are
//! shared across the network and with save games, so earlier entries are
//! never reordered or removed while a session is live.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use cinder_physics::{
    CollisionEvent, EntityId, MaterialId, MeshHandle, PartId, PhysicalOwner, TargetTransform,
    WorldAccess,
};

/// Index of an event in the log.
pub type BreakEventRef = u32;

/// Lifecycle of a break event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakEventState {
    Generated,
    Processed,
}

/// What the event targeted, captured with enough state to replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BreakTarget {
    Entity {
        id: EntityId,
        /// Transform at break time; replay repositions the entity first.
        transform: TargetTransform,
    },
    Static {
        center: Vec3,
        hash: u32,
    },
}

/// One destructive interaction, immutable once finalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakEvent {
    pub target: BreakTarget,
    pub point: Vec3,
    pub normal: Vec3,
    pub velocities: [Vec3; 2],
    pub masses: [f32; 2],
    pub materials: [MaterialId; 2],
    pub parts: [PartId; 2],
    pub penetration: f32,
    pub energy: f32,
    pub seed: u32,
    pub time: f32,
    /// Index into the broken-object table, `-1` when none was created.
    /// Stable for the lifetime of the event once set.
    pub broken_object: i32,
    pub state: BreakEventState,
}

impl BreakEvent {
    /// Build an event from a live collision, snapshotting the target.
    pub fn from_collision(
        world: &dyn WorldAccess,
        collision: &CollisionEvent,
        energy: f32,
        time: f32,
    ) -> Self {
        let surface = collision.sides[1];
        let target = match surface.owner {
            PhysicalOwner::Entity(id) => BreakTarget::Entity {
                id,
                transform: world.entity_transform(id).unwrap_or_default(),
            },
            PhysicalOwner::StaticGeometry(handle) => {
                match world.static_center_and_hash(handle) {
                    Some((center, hash)) => BreakTarget::Static { center, hash },
                    // Geometry already gone; keep the impact point so the
                    // proximity search has something to work with.
                    None => BreakTarget::Static {
                        center: collision.point,
                        hash: 0,
                    },
                }
            }
        };
        BreakEvent {
            target,
            point: collision.point,
            normal: collision.normal,
            velocities: [collision.sides[0].velocity, collision.sides[1].velocity],
            masses: [collision.sides[0].mass, collision.sides[1].mass],
            materials: [collision.sides[0].material, collision.sides[1].material],
            parts: [collision.sides[0].part, collision.sides[1].part],
            penetration: collision.penetration,
            energy,
            seed: collision.seed,
            time,
            broken_object: -1,
            state: BreakEventState::Generated,
        }
    }
}

/// One entry per original object that has ever been broken, retaining the
/// pristine mesh for restoration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrokenObjectRecord {
    pub owner: PhysicalOwner,
    pub part: PartId,
    pub original_mesh: MeshHandle,
}

/// Broken-object table, deduplicated by owner and part.
#[derive(Debug, Default)]
pub struct BrokenObjectTable {
    records: Vec<BrokenObjectRecord>,
}

impl BrokenObjectTable {
    /// Index of the record for `(owner, part)`, creating it on first break.
    pub fn get_or_create(
        &mut self,
        owner: PhysicalOwner,
        part: PartId,
        original_mesh: MeshHandle,
    ) -> i32 {
        if let Some(idx) = self
            .records
            .iter()
            .position(|r| r.owner == owner && r.part == part)
        {
            return idx as i32;
        }
        self.records.push(BrokenObjectRecord {
            owner,
            part,
            original_mesh,
        });
        (self.records.len() - 1) as i32
    }

    pub fn get(&self, index: i32) -> Option<&BrokenObjectRecord> {
        usize::try_from(index).ok().and_then(|i| self.records.get(i))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[BrokenObjectRecord] {
        &self.records
    }

    /// Releases all pristine-mesh references.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Callback invoked when an event is stored, for stats/kill-cam bookkeeping.
pub type StoredHook = Box<dyn FnMut(BreakEventRef, &BreakEvent) + Send>;

/// Append-only, index-addressed break event log with a replay mode.
#[derive(Default)]
pub struct BreakEventLog {
    events: Vec<BreakEvent>,
    /// `Some(i)` while replaying: `register` returns event `i` instead of
    /// appending, so replay re-enters the live fracture path without
    /// duplicating entries.
    replay_cursor: Option<usize>,
    on_stored: Option<StoredHook>,
}

impl BreakEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stored_hook(&mut self, hook: StoredHook) {
        self.on_stored = Some(hook);
    }

    /// Record a live collision, or hand back the event currently being
    /// replayed when in replay mode.
    pub fn register(
        &mut self,
        world: &dyn WorldAccess,
        collision: &CollisionEvent,
        energy: f32,
        time: f32,
    ) -> BreakEventRef {
        if let Some(cursor) = self.replay_cursor {
            return cursor as BreakEventRef;
        }
        let event = BreakEvent::from_collision(world, collision, energy, time);
        self.store(event)
    }

    /// Append an event, mark it processed, and notify the host layer.
    pub fn store(&mut self, mut event: BreakEvent) -> BreakEventRef {
        event.state = BreakEventState::Processed;
        let index = self.events.len() as BreakEventRef;
        self.events.push(event);
        if let Some(hook) = self.on_stored.as_mut() {
            hook(index, &self.events[index as usize]);
        }
        trace!(index, "break event stored");
        index
    }

    /// Set the stable broken-object index on an event. Once set it is
    /// never changed.
    pub fn set_broken_object(&mut self, index: BreakEventRef, broken_object: i32) {
        if let Some(event) = self.events.get_mut(index as usize) {
            if event.broken_object < 0 {
                event.broken_object = broken_object;
            }
        }
    }

    pub fn get(&self, index: BreakEventRef) -> Option<&BreakEvent> {
        self.events.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[BreakEvent] {
        &self.events
    }

    pub fn is_replaying(&self) -> bool {
        self.replay_cursor.is_some()
    }

    /// Enter replay mode at the given event index.
    pub fn begin_replay_at(&mut self, index: usize) {
        self.replay_cursor = Some(index);
    }

    pub fn end_replay(&mut self) {
        self.replay_cursor = None;
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.replay_cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_physics::testing::FakeWorld;
    use cinder_physics::{CollisionSide, StaticHandle};

    fn world() -> FakeWorld {
        let mut world = FakeWorld::new();
        for id in 0..16 {
            world.add_entity(EntityId(id), Vec3::ZERO);
        }
        world
            .statics
            .insert(StaticHandle(0xBEEF), (Vec3::new(1.0, 2.0, 3.0), 0xBEEF));
        world
    }

    fn collision(surface: PhysicalOwner) -> CollisionEvent {
        let side = |owner| CollisionSide {
            owner,
            velocity: Vec3::X,
            mass: 10.0,
            material: 3,
            part: 0,
        };
        CollisionEvent {
            point: Vec3::new(5.0, 0.0, 1.0),
            normal: Vec3::Z,
            sides: [side(PhysicalOwner::Entity(EntityId(1))), side(surface)],
            penetration: 0.01,
            backface: false,
            seed: 7,
        }
    }

    #[test]
    fn test_store_appends_and_marks_processed() {
        let world = world();
        let mut log = BreakEventLog::new();
        for i in 0..5 {
            let ev = BreakEvent::from_collision(
                &world,
                &collision(PhysicalOwner::Entity(EntityId(i))),
                100.0,
                0.0,
            );
            assert_eq!(ev.state, BreakEventState::Generated);
            let idx = log.store(ev);
            assert_eq!(idx, i);
        }
        assert_eq!(log.len(), 5);
        assert!(
            log.events()
                .iter()
                .all(|e| e.state == BreakEventState::Processed)
        );
    }

    #[test]
    fn test_register_in_replay_returns_cursor() {
        let world = world();
        let mut log = BreakEventLog::new();
        let ev = BreakEvent::from_collision(
            &world,
            &collision(PhysicalOwner::Entity(EntityId(9))),
            50.0,
            0.0,
        );
        log.store(ev);

        log.begin_replay_at(0);
        let idx = log.register(
            &world,
            &collision(PhysicalOwner::Entity(EntityId(9))),
            50.0,
            1.0,
        );
        assert_eq!(idx, 0);
        assert_eq!(log.len(), 1, "replay must not duplicate entries");
        log.end_replay();

        let idx = log.register(
            &world,
            &collision(PhysicalOwner::Entity(EntityId(9))),
            50.0,
            2.0,
        );
        assert_eq!(idx, 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_static_target_snapshots_center_and_hash() {
        let world = world();
        let ev = BreakEvent::from_collision(
            &world,
            &collision(PhysicalOwner::StaticGeometry(StaticHandle(0xBEEF))),
            10.0,
            0.0,
        );
        match ev.target {
            BreakTarget::Static { center, hash } => {
                assert_eq!(center, Vec3::new(1.0, 2.0, 3.0));
                assert_eq!(hash, 0xBEEF);
            }
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn test_broken_object_index_set_once() {
        let world = world();
        let mut log = BreakEventLog::new();
        let ev = BreakEvent::from_collision(
            &world,
            &collision(PhysicalOwner::Entity(EntityId(2))),
            10.0,
            0.0,
        );
        let idx = log.store(ev);
        assert_eq!(log.get(idx).unwrap().broken_object, -1);

        log.set_broken_object(idx, 4);
        assert_eq!(log.get(idx).unwrap().broken_object, 4);

        // A second assignment is ignored
        log.set_broken_object(idx, 8);
        assert_eq!(log.get(idx).unwrap().broken_object, 4);
    }

    #[test]
    fn test_broken_object_table_dedupes() {
        let mut table = BrokenObjectTable::default();
        let owner = PhysicalOwner::Entity(EntityId(3));
        let a = table.get_or_create(owner, 0, MeshHandle(1));
        let b = table.get_or_create(owner, 0, MeshHandle(1));
        let c = table.get_or_create(owner, 1, MeshHandle(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_stored_hook_sees_index() {
        let world = world();
        let mut log = BreakEventLog::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        log.set_stored_hook(Box::new(move |idx, _ev| {
            seen2.lock().unwrap().push(idx);
        }));
        for i in 0..3 {
            let ev = BreakEvent::from_collision(
                &world,
                &collision(PhysicalOwner::Entity(EntityId(i))),
                1.0,
                0.0,
            );
            log.store(ev);
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }
}
