//! A small event bus: scheduler components publish, UI or CLI consumers
//! subscribe. Subscribers receive clones over unbounded channels;
//! disconnected subscribers are dropped on the next emit.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::model::Status;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    CrystalUpdated {
        generation: u32,
        id: u32,
        status: Status,
    },
    StatusOverview {
        optimized: usize,
        running: usize,
        failing: usize,
        total: usize,
    },
    SimilarityFound {
        kept: (u32, u32),
        duplicate: (u32, u32),
    },
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<SearchEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SearchEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: SearchEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::{EventBus, SearchEvent};

    #[test]
    fn test_subscribe_and_emit() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.emit(SearchEvent::StatusOverview {
            optimized: 1,
            running: 2,
            failing: 0,
            total: 3,
        });
        match rx.try_recv().unwrap() {
            SearchEvent::StatusOverview { optimized, total, .. } => {
                assert_eq!(optimized, 1);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        drop(bus.subscribe());
        let rx = bus.subscribe();
        bus.emit(SearchEvent::StatusOverview {
            optimized: 0,
            running: 0,
            failing: 0,
            total: 0,
        });
        assert!(rx.try_recv().is_ok());
    }
}
