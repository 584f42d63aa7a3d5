//! The tracker: an arena of every crystal ever accepted into the run.
//!
//! Crystals live behind per-crystal read-write locks; index lists (the
//! pending FIFO, sweep snapshots) refer into the arena by position, so no
//! pointer graphs are needed and serialization order is deterministic.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::model::{Crystal, Status};

pub type CrystalRef = Arc<RwLock<Crystal>>;

#[derive(Default)]
pub struct Tracker {
    arena: RwLock<Vec<CrystalRef>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a crystal; returns its arena index.
    pub fn append(&self, crystal: Crystal) -> usize {
        let mut arena = self.arena.write();
        arena.push(Arc::new(RwLock::new(crystal)));
        arena.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<CrystalRef> {
        self.arena.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.arena.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.read().is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }

    /// Status of each crystal, in arena order.
    pub fn statuses(&self) -> Vec<Status> {
        self.arena
            .read()
            .iter()
            .map(|cell| cell.read().status)
            .collect()
    }

    /// `(generation, id)` of every crystal; the naming monitor snapshots
    /// this to hand out unique pairs.
    pub fn name_pairs(&self) -> Vec<(u32, u32)> {
        self.arena
            .read()
            .iter()
            .map(|cell| {
                let guard = cell.read();
                (guard.generation, guard.id)
            })
            .collect()
    }

    pub fn count_with(&self, predicate: impl Fn(&Crystal) -> bool) -> usize {
        self.arena
            .read()
            .iter()
            .filter(|cell| predicate(&cell.read()))
            .count()
    }

    /// Indices of fully optimized crystals.
    pub fn optimized_indices(&self) -> Vec<usize> {
        self.arena
            .read()
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.read().status == Status::Optimized)
            .map(|(i, _)| i)
            .collect()
    }
}

/// FIFO of arena indices, used for the pending-submission queue.
#[derive(Default)]
pub struct IndexQueue {
    inner: Mutex<VecDeque<usize>>,
}

impl IndexQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, index: usize) {
        self.inner.lock().push_back(index);
    }

    pub fn pop_front(&self) -> Option<usize> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Matrix3;

    use super::{IndexQueue, Tracker};
    use crate::base::Lattice;
    use crate::model::{Crystal, Status};

    fn crystal(generation: u32, id: u32) -> Crystal {
        let mut xtal = Crystal::new(Lattice::new(Matrix3::identity()));
        xtal.generation = generation;
        xtal.id = id;
        xtal
    }

    #[test]
    fn test_append_and_get() {
        let tracker = Tracker::new();
        let i = tracker.append(crystal(1, 1));
        let j = tracker.append(crystal(1, 2));
        assert_eq!((i, j), (0, 1));
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get(1).unwrap().read().id, 2);
        assert!(tracker.get(5).is_none());
    }

    #[test]
    fn test_name_pairs_snapshot() {
        let tracker = Tracker::new();
        tracker.append(crystal(1, 1));
        tracker.append(crystal(2, 1));
        assert_eq!(tracker.name_pairs(), vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn test_count_with() {
        let tracker = Tracker::new();
        let i = tracker.append(crystal(1, 1));
        tracker.append(crystal(1, 2));
        tracker.get(i).unwrap().write().status = Status::Optimized;
        assert_eq!(tracker.count_with(|x| x.status == Status::Optimized), 1);
        assert_eq!(tracker.optimized_indices(), vec![i]);
    }

    #[test]
    fn test_fifo_order() {
        let fifo = IndexQueue::new();
        fifo.push_back(3);
        fifo.push_back(1);
        assert_eq!(fifo.pop_front(), Some(3));
        assert_eq!(fifo.pop_front(), Some(1));
        assert_eq!(fifo.pop_front(), None);
    }
}
