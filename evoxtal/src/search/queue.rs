//! The queue manager: advances every crystal's lifecycle against the
//! optimizer back-end, submits pending structures up to the concurrency
//! limit, and serializes `(generation, id)` assignment behind the naming
//! monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rand::Rng;

use crate::genetic::{check_crystal, random_crystal};
use crate::model::{Crystal, Status};
use crate::optimizer::{JobState, LocalOptimizer, QueueSnapshot, SpacegroupProvider};
use crate::persist;
use crate::search::events::{EventBus, SearchEvent};
use crate::search::params::{FailAction, SearchParams};
use crate::search::tracker::{CrystalRef, IndexQueue, Tracker};

/// Per-tick census of the tracker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    pub optimized: usize,
    pub running: usize,
    pub pending: usize,
    pub failing: usize,
    pub total: usize,
}

/// Consecutive refresh failures tolerated before the run is declared
/// fatally broken.
const MAX_REFRESH_FAILURES: u32 = 8;

#[derive(Default)]
struct QueueCache {
    snapshot: QueueSnapshot,
    fetched_at: Option<Instant>,
    consecutive_failures: u32,
    next_attempt: Option<Instant>,
}

/// Holding this guard is the only sanctioned way to pick a new
/// `(generation, id)`; at most one holder exists at a time.
pub struct NamingGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    snapshot: Vec<(u32, u32)>,
}

impl NamingGuard<'_> {
    /// `(generation, id)` of every crystal the tracker knows.
    pub fn snapshot(&self) -> &[(u32, u32)] {
        &self.snapshot
    }

    /// The next free id within `generation`.
    pub fn next_id(&self, generation: u32) -> u32 {
        self.snapshot
            .iter()
            .filter(|(gen, _)| *gen == generation)
            .map(|(_, id)| *id)
            .max()
            .map_or(1, |max| max + 1)
    }
}

pub struct QueueManager<R: Rng> {
    tracker: Arc<Tracker>,
    pending: IndexQueue,
    optimizer: Arc<dyn LocalOptimizer>,
    spacegroup: Option<Arc<dyn SpacegroupProvider>>,
    params: Arc<RwLock<SearchParams>>,
    events: Arc<EventBus>,
    rng: Arc<Mutex<R>>,
    naming: Mutex<()>,
    queue_cache: Mutex<QueueCache>,
    stop: Arc<AtomicBool>,
    fatal: Mutex<Option<String>>,
}

impl<R: Rng> QueueManager<R> {
    pub fn new(
        tracker: Arc<Tracker>,
        optimizer: Arc<dyn LocalOptimizer>,
        spacegroup: Option<Arc<dyn SpacegroupProvider>>,
        params: Arc<RwLock<SearchParams>>,
        events: Arc<EventBus>,
        rng: Arc<Mutex<R>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            tracker,
            pending: IndexQueue::new(),
            optimizer,
            spacegroup,
            params,
            events,
            rng,
            naming: Mutex::new(()),
            queue_cache: Mutex::new(QueueCache::default()),
            stop,
            fatal: Mutex::new(None),
        }
    }

    /// A shared-resource failure that exhausted its retry budget, if any.
    pub fn fatal_error(&self) -> Option<String> {
        self.fatal.lock().clone()
    }

    pub fn optimizer(&self) -> &Arc<dyn LocalOptimizer> {
        &self.optimizer
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Put an already-tracked crystal back on the pending FIFO; used when
    /// resuming a run from disk.
    pub fn requeue(&self, index: usize) {
        self.pending.push_back(index);
    }

    /// One pass of the scheduler loop: refresh the queue snapshot, advance
    /// every non-terminal crystal, then fill free job slots from the
    /// pending FIFO.
    pub fn tick(&self) -> TickReport {
        let params = self.params.read().clone();
        let snapshot = self.refresh_queue(&params);

        for index in self.tracker.indices() {
            let Some(cell) = self.tracker.get(index) else {
                continue;
            };
            let status = cell.read().status;
            match status {
                Status::Submitted | Status::InProcess => {
                    self.advance_running(index, &cell, &snapshot, &params)
                }
                Status::StepOptimized => self.advance_step_optimized(index, &cell, &params),
                Status::Restart => self.restart(index, &cell),
                _ => {}
            }
        }

        self.fill_job_slots(&params);

        let report = self.report();
        self.events.emit(SearchEvent::StatusOverview {
            optimized: report.optimized,
            running: report.running,
            failing: report.failing,
            total: report.total,
        });
        report
    }

    /// Current census without advancing anything.
    pub fn report(&self) -> TickReport {
        let mut report = TickReport {
            total: self.tracker.len(),
            ..Default::default()
        };
        for index in self.tracker.indices() {
            let Some(cell) = self.tracker.get(index) else {
                continue;
            };
            let xtal = cell.read();
            match xtal.status {
                Status::Optimized => report.optimized += 1,
                Status::Submitted | Status::InProcess | Status::StepOptimized | Status::Restart => {
                    report.running += 1
                }
                Status::WaitingForOptimization => report.pending += 1,
                _ => {}
            }
            if xtal.fail_count > 0 && !xtal.status.is_terminal() {
                report.failing += 1;
            }
        }
        report
    }

    /// Cached queue snapshot, refreshed at most once per refresh interval.
    /// Only one caller refreshes at a time; the others block on the cache
    /// and reuse the fresh snapshot. A failed or timed-out refresh keeps
    /// the stale snapshot and retries with exponential backoff; exhausting
    /// the retry budget marks the run fatally broken.
    fn refresh_queue(&self, params: &SearchParams) -> QueueSnapshot {
        let mut cache = self.queue_cache.lock();
        let fresh = cache
            .fetched_at
            .is_some_and(|at| at.elapsed() < params.queue_refresh_interval);
        let backing_off = cache
            .next_attempt
            .is_some_and(|at| Instant::now() < at);
        if !fresh && !backing_off {
            match self.optimizer.get_queue(params.queue_refresh_timeout) {
                Ok(snapshot) => {
                    cache.snapshot = snapshot;
                    cache.fetched_at = Some(Instant::now());
                    cache.consecutive_failures = 0;
                    cache.next_attempt = None;
                }
                Err(err) => {
                    cache.consecutive_failures += 1;
                    let backoff = params.queue_refresh_interval
                        * 2u32.saturating_pow(cache.consecutive_failures.min(6));
                    cache.next_attempt = Some(Instant::now() + backoff);
                    warn!(
                        "queue refresh failed ({err}); keeping previous snapshot, \
                         next attempt in {backoff:?}"
                    );
                    if cache.consecutive_failures >= MAX_REFRESH_FAILURES {
                        *self.fatal.lock() = Some(format!(
                            "queue refresh failed {} consecutive times: {err}",
                            cache.consecutive_failures
                        ));
                    }
                }
            }
        }
        cache.snapshot.clone()
    }

    fn advance_running(
        &self,
        index: usize,
        cell: &CrystalRef,
        snapshot: &QueueSnapshot,
        params: &SearchParams,
    ) {
        let state = {
            let xtal = cell.read();
            self.optimizer.status(&xtal, snapshot)
        };
        match state {
            JobState::Started | JobState::Running | JobState::Queued | JobState::Pending => {
                let mut xtal = cell.write();
                if xtal.status == Status::Submitted {
                    xtal.status = Status::InProcess;
                    self.emit_update(&xtal);
                }
            }
            JobState::Success => {
                let updated = {
                    let mut xtal = cell.write();
                    match self.optimizer.update(&mut xtal) {
                        Ok(()) => {
                            xtal.status = Status::StepOptimized;
                            self.emit_update(&xtal);
                            true
                        }
                        Err(err) => {
                            warn!("failed to read optimizer output for {}: {err}", xtal.tag());
                            false
                        }
                    }
                };
                if updated {
                    self.advance_step_optimized(index, cell, params);
                } else {
                    self.handle_failure(index, cell, params);
                }
            }
            JobState::Error => self.handle_failure(index, cell, params),
            JobState::CommunicationError => {
                let xtal = cell.read();
                warn!(
                    "communication error querying job for {}; leaving status unchanged",
                    xtal.tag()
                );
            }
            JobState::Unknown => {
                let xtal = cell.read();
                debug!("job state unknown for {}; will retry next tick", xtal.tag());
            }
        }
    }

    /// Roll a step-optimized crystal forward: either queue the next
    /// optimization step or finalize it into the optimized pool.
    fn advance_step_optimized(&self, index: usize, cell: &CrystalRef, params: &SearchParams) {
        let total_steps = self.optimizer.total_opt_steps();
        let next_step = cell.read().current_opt_step + 1;

        if next_step < total_steps {
            {
                let mut xtal = cell.write();
                xtal.current_opt_step = next_step;
                xtal.status = Status::WaitingForOptimization;
                xtal.job_id = None;
            }
            let xtal = cell.read();
            if let Err(err) = self.optimizer.write_inputs(&xtal) {
                warn!("cannot write step-{next_step} inputs for {}: {err}", xtal.tag());
            }
            self.emit_update(&xtal);
            drop(xtal);
            self.pending.push_back(index);
            return;
        }

        // Final step complete: wrap, canonicalize, fingerprint.
        let mut xtal = cell.write();
        xtal.wrap_atoms_to_cell();
        if let Err(err) = xtal.canonicalize() {
            warn!("cannot canonicalize optimized structure {}: {err}", xtal.tag());
            xtal.status = Status::Error;
            self.emit_update(&xtal);
            return;
        }
        xtal.find_spacegroup(self.spacegroup.as_deref(), params.spacegroup_tol);
        xtal.status = Status::Optimized;
        self.emit_update(&xtal);
        self.persist_crystal(&xtal, params);
    }

    fn handle_failure(&self, index: usize, cell: &CrystalRef, params: &SearchParams) {
        let within_limit = {
            let mut xtal = cell.write();
            xtal.fail_count += 1;
            xtal.fail_count <= params.fail_limit
        };

        if within_limit {
            self.restart(index, cell);
            return;
        }

        match params.fail_action {
            FailAction::DoNothing => {
                let mut xtal = cell.write();
                xtal.status = Status::Error;
                self.emit_update(&xtal);
            }
            FailAction::Kill => {
                let mut xtal = cell.write();
                if let Err(err) = self.optimizer.delete_job(&mut xtal) {
                    debug!("delete_job for {}: {err}", xtal.tag());
                }
                xtal.status = Status::Killed;
                self.emit_update(&xtal);
            }
            FailAction::Randomize => {
                {
                    let mut xtal = cell.write();
                    if let Err(err) = self.optimizer.delete_job(&mut xtal) {
                        debug!("delete_job for {}: {err}", xtal.tag());
                    }
                }
                if self.randomize_in_place(cell, params) {
                    self.pending.push_back(index);
                } else {
                    let mut xtal = cell.write();
                    warn!("could not randomize {}; leaving in error state", xtal.tag());
                    xtal.status = Status::Error;
                    self.emit_update(&xtal);
                }
            }
        }
    }

    /// Replace the crystal's cell and atoms with a validated fresh random
    /// draw, preserving generation, id and lineage. The failure counter
    /// restarts; the injected generator is never reseeded.
    fn randomize_in_place(&self, cell: &CrystalRef, params: &SearchParams) -> bool {
        let mut rng = self.rng.lock();
        for _ in 0..1000 {
            let Some(mut fresh) = random_crystal(&mut *rng, &params.limits, &params.composition)
            else {
                continue;
            };
            if !check_crystal(&mut fresh, &params.limits, &params.composition) {
                continue;
            }
            let mut xtal = cell.write();
            xtal.replace_geometry(&fresh);
            xtal.fail_count = 0;
            xtal.current_opt_step = 0;
            xtal.enthalpy = None;
            xtal.energy = None;
            xtal.job_id = None;
            xtal.status = Status::WaitingForOptimization;
            if let Err(err) = self.optimizer.write_inputs(&xtal) {
                warn!("cannot write inputs for randomized {}: {err}", xtal.tag());
            }
            self.emit_update(&xtal);
            return true;
        }
        false
    }

    /// Re-write the current step's inputs and requeue the crystal.
    fn restart(&self, index: usize, cell: &CrystalRef) {
        {
            let mut xtal = cell.write();
            if let Err(err) = self.optimizer.delete_job(&mut xtal) {
                debug!("delete_job for {}: {err}", xtal.tag());
            }
            xtal.job_id = None;
            xtal.status = Status::WaitingForOptimization;
        }
        let xtal = cell.read();
        if let Err(err) = self.optimizer.write_inputs(&xtal) {
            warn!("cannot rewrite inputs for {}: {err}", xtal.tag());
        }
        self.emit_update(&xtal);
        drop(xtal);
        self.pending.push_back(index);
    }

    /// Pop pending crystals into free job slots. A requested stop blocks
    /// new submissions; in-flight jobs still complete.
    fn fill_job_slots(&self, params: &SearchParams) {
        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        let limit = if params.limit_running_jobs {
            params.running_job_limit as usize
        } else {
            usize::MAX
        };
        let mut running = self.report().running;
        let mut attempts = self.pending.len();
        while running < limit && attempts > 0 {
            attempts -= 1;
            let Some(index) = self.pending.pop_front() else {
                break;
            };
            let Some(cell) = self.tracker.get(index) else {
                continue;
            };
            if self.submit(&cell) {
                running += 1;
            } else {
                self.pending.push_back(index);
            }
        }
    }

    fn submit(&self, cell: &CrystalRef) -> bool {
        {
            let xtal = cell.read();
            if xtal.status != Status::WaitingForOptimization {
                return true;
            }
            if let Err(err) = self.optimizer.write_inputs(&xtal) {
                warn!("cannot write inputs for {}: {err}", xtal.tag());
                return false;
            }
        }
        let mut xtal = cell.write();
        match self.optimizer.start(&mut xtal) {
            Ok(job_id) => {
                xtal.job_id = Some(job_id);
                xtal.status = Status::Submitted;
                self.emit_update(&xtal);
                true
            }
            Err(err) => {
                warn!("submission failed for {}: {err}", xtal.tag());
                false
            }
        }
    }

    /// Take the naming monitor and a snapshot of all known
    /// `(generation, id)` pairs.
    pub fn lock_for_naming(&self) -> NamingGuard<'_> {
        let guard = self.naming.lock();
        NamingGuard {
            snapshot: self.tracker.name_pairs(),
            _guard: guard,
        }
    }

    /// Accept a freshly named crystal: create its directory, persist its
    /// state, enter it into the tracker and the pending FIFO, and release
    /// the naming monitor.
    pub fn unlock_for_naming(&self, guard: NamingGuard<'_>, mut crystal: Crystal) -> usize {
        let params = self.params.read();
        crystal.status = Status::WaitingForOptimization;

        let dir = params.work_dir.join(crystal.tag());
        if let Err(err) = std::fs::create_dir_all(&dir) {
            warn!("cannot create directory {}: {err}", dir.display());
        } else if let Err(err) = persist::save_crystal(&crystal, &dir) {
            warn!("cannot persist state for {}: {err}", crystal.tag());
        }

        let generation = crystal.generation;
        let id = crystal.id;
        let status = crystal.status;
        let index = self.tracker.append(crystal);
        self.pending.push_back(index);
        self.events.emit(SearchEvent::CrystalUpdated {
            generation,
            id,
            status,
        });
        drop(guard);
        index
    }

    fn persist_crystal(&self, crystal: &Crystal, params: &SearchParams) {
        let dir = params.work_dir.join(crystal.tag());
        if let Err(err) = std::fs::create_dir_all(&dir) {
            warn!("cannot create directory {}: {err}", dir.display());
            return;
        }
        if let Err(err) = persist::save_crystal(crystal, &dir) {
            warn!("cannot persist state for {}: {err}", crystal.tag());
        }
    }

    fn emit_update(&self, crystal: &Crystal) {
        self.events.emit(SearchEvent::CrystalUpdated {
            generation: crystal.generation,
            id: crystal.id,
            status: crystal.status,
        });
    }
}
