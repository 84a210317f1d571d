//! Deferred mesh-island extraction.
//!
//! Plane breaks that accept an impact hand the expensive island split to a
//! worker thread. The main thread polls once per frame and consumes finished
//! tasks; a task slot is recycled only after its result is consumed. At most
//! one task per `(mesh, seed triangle)` is in flight.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, warn};

use cinder_physics::{FractureIslands, FractureProcessor, MeshHandle, PlaneImpactRequest};

/// Fixed number of task slots.
const MAX_PENDING: usize = 16;

/// One fracture-island-extraction job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractureTask {
    pub request: PlaneImpactRequest,
    pub mesh: MeshHandle,
    pub seed_triangle: i32,
}

/// What `submit` did with a task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitOutcome {
    /// Queued for the worker; result arrives through `poll`.
    Queued,
    /// A task for the same `(mesh, seed)` is already in flight.
    Coalesced,
    /// Pool saturated in a networked session: processed synchronously.
    /// `None` means the geometry produced no split.
    RanSynchronously(Option<FractureIslands>),
    /// Pool saturated in single player: dropped, the next impact retries.
    Dropped,
}

#[derive(Debug, Clone, Copy)]
enum SlotState {
    Empty,
    Started(FractureTask),
    Done(FractureTask, Option<FractureIslands>),
}

/// Frame-polled scheduler in front of [`FractureProcessor::extract_islands`].
pub struct DeferredFractureScheduler {
    slots: Vec<SlotState>,
    processor: Arc<dyn FractureProcessor>,
    work_tx: Option<Sender<(usize, FractureTask)>>,
    done_rx: Receiver<(usize, Option<FractureIslands>)>,
    worker: Option<JoinHandle<()>>,
}

impl DeferredFractureScheduler {
    pub fn new(processor: Arc<dyn FractureProcessor>) -> Self {
        let (work_tx, work_rx) = unbounded::<(usize, FractureTask)>();
        let (done_tx, done_rx) = unbounded();

        let worker_processor = Arc::clone(&processor);
        let worker = std::thread::Builder::new()
            .name("fracture-worker".to_string())
            .spawn(move || {
                while let Ok((slot, task)) = work_rx.recv() {
                    let islands = worker_processor.extract_islands(task.mesh, task.seed_triangle);
                    if done_tx.send((slot, islands)).is_err() {
                        break;
                    }
                }
            })
            .ok();
        if worker.is_none() {
            warn!("fracture worker failed to start, falling back to synchronous splits");
        }

        Self {
            slots: (0..MAX_PENDING).map(|_| SlotState::Empty).collect(),
            processor,
            work_tx: Some(work_tx),
            done_rx,
            worker,
        }
    }

    /// Submit a job. `multiplayer` selects the saturation fallback:
    /// networked sessions must converge, so they process synchronously
    /// instead of dropping.
    pub fn submit(&mut self, task: FractureTask, multiplayer: bool) -> SubmitOutcome {
        let duplicate = self.slots.iter().any(|slot| match slot {
            SlotState::Started(t) | SlotState::Done(t, _) => {
                t.mesh == task.mesh && t.seed_triangle == task.seed_triangle
            }
            SlotState::Empty => false,
        });
        if duplicate {
            return SubmitOutcome::Coalesced;
        }

        let free = self
            .slots
            .iter()
            .position(|slot| matches!(slot, SlotState::Empty));
        let (Some(index), true) = (free, self.worker.is_some()) else {
            if multiplayer {
                debug!("fracture pool saturated, processing synchronously");
                let islands = self.processor.extract_islands(task.mesh, task.seed_triangle);
                return SubmitOutcome::RanSynchronously(islands);
            }
            debug!("fracture pool saturated, dropping request");
            return SubmitOutcome::Dropped;
        };

        self.slots[index] = SlotState::Started(task);
        if let Some(tx) = &self.work_tx {
            // Worker alive by the check above; a send failure just means it
            // died mid-session, handled on the next submit.
            if tx.send((index, task)).is_err() {
                self.slots[index] = SlotState::Empty;
                self.worker = None;
                return self.submit(task, multiplayer);
            }
        }
        SubmitOutcome::Queued
    }

    /// Collect finished tasks and recycle their slots. Main thread, once
    /// per frame; this is the only place results are consumed.
    pub fn poll(&mut self) -> Vec<(FractureTask, Option<FractureIslands>)> {
        while let Ok((slot, islands)) = self.done_rx.try_recv() {
            if let SlotState::Started(task) = self.slots[slot] {
                self.slots[slot] = SlotState::Done(task, islands);
            }
        }

        let mut finished = Vec::new();
        for slot in &mut self.slots {
            if let SlotState::Done(task, islands) = *slot {
                finished.push((task, islands));
                *slot = SlotState::Empty;
            }
        }
        finished
    }

    /// Number of tasks waiting on the worker.
    pub fn pending(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !matches!(s, SlotState::Empty))
            .count()
    }
}

impl Drop for DeferredFractureScheduler {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.work_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
