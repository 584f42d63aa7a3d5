//! The search driver: owns the run loop, breeds or draws new candidates
//! to keep the queue full, and decides termination.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use rand::Rng;

use crate::base::EvoxtalError;
use crate::genetic::{check_crystal, crossover, permustrain, random_crystal, stripple};
use crate::model::{probability_list, select_index, sort_by_enthalpy, Crystal};
use crate::optimizer::{LocalOptimizer, SpacegroupProvider};
use crate::search::duplicates;
use crate::search::events::EventBus;
use crate::search::params::SearchParams;
use crate::search::queue::{QueueManager, TickReport};
use crate::search::tracker::Tracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Crossover,
    Stripple,
    Permustrain,
}

/// Bound on operator re-picks before falling back to random generation.
const OPERATOR_REPICKS: u32 = 10;
/// Attempts per operator before it is re-picked.
const OPERATOR_ATTEMPTS: u32 = 1000;

pub struct Search<R: Rng> {
    params: Arc<RwLock<SearchParams>>,
    tracker: Arc<Tracker>,
    events: Arc<EventBus>,
    queue: QueueManager<R>,
    rng: Arc<Mutex<R>>,
    stop: Arc<AtomicBool>,
    ticks: AtomicU64,
}

impl<R: Rng> Search<R> {
    pub fn new(
        params: SearchParams,
        optimizer: Arc<dyn LocalOptimizer>,
        spacegroup: Option<Arc<dyn SpacegroupProvider>>,
        rng: R,
    ) -> Self {
        let params = Arc::new(RwLock::new(params));
        let tracker = Arc::new(Tracker::new());
        let events = Arc::new(EventBus::new());
        let rng = Arc::new(Mutex::new(rng));
        let stop = Arc::new(AtomicBool::new(false));
        let queue = QueueManager::new(
            tracker.clone(),
            optimizer,
            spacegroup,
            params.clone(),
            events.clone(),
            rng.clone(),
            stop.clone(),
        );
        Self {
            params,
            tracker,
            events,
            queue,
            rng,
            stop,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn params(&self) -> &Arc<RwLock<SearchParams>> {
        &self.params
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn queue(&self) -> &QueueManager<R> {
        &self.queue
    }

    /// Ask the loop to exit after the current tick. In-flight operations
    /// complete normally; no new submissions start.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// The run is over when the optimized pool reaches its budget, a stop
    /// was requested, or testing mode hit its structure count.
    pub fn is_finished(&self) -> bool {
        if self.stop_requested() {
            return true;
        }
        let params = self.params.read();
        let optimized = self.queue.report().optimized;
        if params.testing_mode && params.test_structs > 0 {
            return optimized >= params.test_structs as usize;
        }
        optimized >= params.structure_budget() as usize
    }

    /// Rebuild a search from a run directory: `run.state` first, then
    /// every referenced crystal directory. Unfinished crystals go back on
    /// the pending queue; submitted ones are re-queried on the next tick.
    pub fn resume(
        run_dir: &std::path::Path,
        optimizer: Arc<dyn LocalOptimizer>,
        spacegroup: Option<Arc<dyn SpacegroupProvider>>,
        rng: R,
    ) -> Result<Self, EvoxtalError> {
        let (params, crystal_dirs) = crate::persist::load_run(run_dir)?;
        let search = Self::new(params, optimizer, spacegroup, rng);
        for dir in crystal_dirs {
            let crystal = crate::persist::load_crystal(&run_dir.join(&dir))?;
            let requeue = matches!(
                crystal.status,
                crate::model::Status::WaitingForOptimization | crate::model::Status::Restart
            );
            let index = search.tracker.append(crystal);
            if requeue {
                search.queue.requeue(index);
            }
        }
        info!("resumed run with {} structures", search.tracker.len());
        Ok(search)
    }

    /// Flush the run state and every crystal's state file to disk.
    pub fn save(&self) -> Result<(), EvoxtalError> {
        let params = self.params.read().clone();
        let mut crystal_dirs = Vec::new();
        for index in self.tracker.indices() {
            let Some(cell) = self.tracker.get(index) else {
                continue;
            };
            let xtal = cell.read();
            let tag = xtal.tag();
            let dir = params.work_dir.join(&tag);
            std::fs::create_dir_all(&dir)?;
            crate::persist::save_crystal(&xtal, &dir)?;
            crystal_dirs.push(tag);
        }
        crate::persist::save_run(&params, &crystal_dirs, &params.work_dir)?;
        Ok(())
    }

    /// Enter a seed structure into generation 1.
    pub fn add_seed(&self, mut crystal: Crystal) -> usize {
        crystal.generation = 1;
        crystal.parents = "Seeded".to_string();
        let guard = self.queue.lock_for_naming();
        crystal.id = guard.next_id(1);
        self.queue.unlock_for_naming(guard, crystal)
    }

    /// Fill the first generation up to `num_initial` with validated
    /// random structures (seeds already added count toward the total).
    pub fn initialize(&self) -> Result<(), EvoxtalError> {
        let target = self.params.read().num_initial as usize;
        while self.tracker.len() < target {
            self.generate_random_structure()?;
        }
        info!("initialized tracker with {} structures", self.tracker.len());
        Ok(())
    }

    /// One invocation of the periodic loop: advance the queue, top up the
    /// candidate pipeline, and run the duplicate sweep on its cadence.
    pub fn step(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        let report = self.queue.tick();

        if let Some(reason) = self.queue.fatal_error() {
            warn!("fatal shared-resource failure: {reason}");
            self.request_stop();
            return report;
        }

        if !self.is_finished() {
            let params = self.params.read().clone();
            let mut active = report.running + report.pending;
            while active < params.cont_structs as usize {
                match self.generate_new_structure() {
                    Ok(()) => active += 1,
                    Err(err) => {
                        warn!("candidate generation failed: {err}");
                        break;
                    }
                }
            }

            if params.sweep_interval > 0 && tick > 0 && tick % params.sweep_interval == 0 {
                duplicates::sweep(&self.tracker, &params, &self.events);
            }
        }

        self.queue.report()
    }

    /// Drive `step` on a fixed cadence until the run finishes. A fatal
    /// shared-resource failure unwinds cleanly with the tracker intact
    /// and is reported to the caller.
    pub fn run(&self, poll: Duration) -> Result<(), EvoxtalError> {
        while !self.is_finished() {
            self.step();
            if self.is_finished() {
                break;
            }
            std::thread::sleep(poll);
        }
        if let Err(err) = self.save() {
            warn!("could not flush run state: {err}");
        }
        if let Some(reason) = self.queue.fatal_error() {
            return Err(EvoxtalError::RunError(reason));
        }
        info!("search loop finished");
        Ok(())
    }

    /// Breed a candidate when at least three optimized parents exist,
    /// otherwise draw a validated random structure.
    pub fn generate_new_structure(&self) -> Result<(), EvoxtalError> {
        if !self.generate_offspring()? {
            self.generate_random_structure()?;
        }
        Ok(())
    }

    fn generate_random_structure(&self) -> Result<(), EvoxtalError> {
        let params = self.params.read().clone();
        for _ in 0..OPERATOR_ATTEMPTS {
            let candidate = {
                let mut rng = self.rng.lock();
                random_crystal(&mut *rng, &params.limits, &params.composition)
            };
            let Some(mut candidate) = candidate else {
                continue;
            };
            if !check_crystal(&mut candidate, &params.limits, &params.composition) {
                continue;
            }
            candidate.generation = 1;
            candidate.parents = "Randomly generated".to_string();
            let guard = self.queue.lock_for_naming();
            candidate.id = guard.next_id(1);
            self.queue.unlock_for_naming(guard, candidate);
            return Ok(());
        }
        Err(EvoxtalError::GenerationFailed)
    }

    /// Returns false when the optimized pool is too small to breed.
    fn generate_offspring(&self) -> Result<bool, EvoxtalError> {
        let params = self.params.read().clone();
        let optimized = self.tracker.optimized_indices();
        if optimized.len() < 3 {
            return Ok(false);
        }

        // Parent pool: best structures by enthalpy, one extra entry that
        // the probability list leaves unweighted.
        let mut pool: Vec<(usize, f64)> = optimized
            .into_iter()
            .filter_map(|index| {
                let cell = self.tracker.get(index)?;
                let xtal = cell.read();
                Some((index, xtal.effective_enthalpy().unwrap_or(f64::MAX)))
            })
            .collect();
        sort_by_enthalpy(&mut pool);
        pool.truncate(params.pop_size as usize + 1);
        let enthalpies: Vec<f64> = pool.iter().map(|entry| entry.1).collect();
        let probs = probability_list(&enthalpies);

        for _ in 0..OPERATOR_REPICKS {
            let op = self.pick_operator(&params);
            for _ in 0..OPERATOR_ATTEMPTS {
                let (mut candidate, parents, generation) = self.breed(op, &pool, &probs, &params);
                if check_crystal(&mut candidate, &params.limits, &params.composition) {
                    candidate.parents = parents;
                    candidate.generation = generation;
                    let guard = self.queue.lock_for_naming();
                    candidate.id = guard.next_id(generation);
                    self.queue.unlock_for_naming(guard, candidate);
                    return Ok(true);
                }
            }
            warn!(
                "unable to produce a valid candidate with {op:?} after {OPERATOR_ATTEMPTS} \
                 attempts; reselecting operator"
            );
        }

        // Persistent operator failure: fall back to random generation so
        // the run keeps moving.
        warn!("all operators failed repeatedly; falling back to random generation");
        self.generate_random_structure()?;
        Ok(true)
    }

    fn pick_operator(&self, params: &SearchParams) -> Operator {
        let r = self.rng.lock().gen_range(0.0..100.0);
        if r < params.p_cross as f64 {
            Operator::Crossover
        } else if r < (params.p_cross + params.p_strip) as f64 {
            Operator::Stripple
        } else {
            Operator::Permustrain
        }
    }

    /// Select parents by enthalpy-weighted probability and apply the
    /// operator. Returns the raw candidate, its lineage description and
    /// its generation number.
    fn breed(
        &self,
        op: Operator,
        pool: &[(usize, f64)],
        probs: &[f64],
        params: &SearchParams,
    ) -> (Crystal, String, u32) {
        let mut rng = self.rng.lock();
        match op {
            Operator::Crossover => {
                let mut slot1 = select_index(&mut *rng, probs);
                let mut slot2 = select_index(&mut *rng, probs);
                while slot1 == slot2 {
                    slot1 = select_index(&mut *rng, probs);
                    slot2 = select_index(&mut *rng, probs);
                }
                let parent1 = self.read_parent(pool[slot1].0);
                let parent2 = self.read_parent(pool[slot2].0);
                let (child, percent1) =
                    crossover(&mut *rng, &parent1, &parent2, params.cross_min_contribution);
                let generation = parent1.generation.max(parent2.generation) + 1;
                let parents = format!(
                    "Crossover: {}x{} ({:.0}%) + {}x{} ({:.0}%)",
                    parent1.generation,
                    parent1.id,
                    percent1,
                    parent2.generation,
                    parent2.id,
                    100.0 - percent1
                );
                (child, parents, generation)
            }
            Operator::Stripple => {
                let slot = select_index(&mut *rng, probs);
                let parent = self.read_parent(pool[slot].0);
                let (child, stdev, amplitude) = stripple(
                    &mut *rng,
                    &parent,
                    params.strip_strain_stdev_min,
                    params.strip_strain_stdev_max,
                    params.strip_amp_min,
                    params.strip_amp_max,
                    params.strip_per1,
                    params.strip_per2,
                );
                let parents = format!(
                    "Stripple: {}x{} stdev={:.5} amp={:.5} waves={},{}",
                    parent.generation,
                    parent.id,
                    stdev,
                    amplitude,
                    params.strip_per1,
                    params.strip_per2
                );
                (child, parents, parent.generation + 1)
            }
            Operator::Permustrain => {
                let slot = select_index(&mut *rng, probs);
                let parent = self.read_parent(pool[slot].0);
                let (child, stdev) =
                    permustrain(&mut *rng, &parent, params.perm_strain_stdev_max, params.perm_ex);
                let parents = format!(
                    "Permustrain: {}x{} stdev={:.5} exch={}",
                    parent.generation, parent.id, stdev, params.perm_ex
                );
                (child, parents, parent.generation + 1)
            }
        }
    }

    fn read_parent(&self, index: usize) -> Crystal {
        self.tracker
            .get(index)
            .expect("parent index comes from the tracker")
            .read()
            .clone()
    }
}
