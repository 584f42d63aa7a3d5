mod driver;
pub mod duplicates;
mod events;
mod params;
mod queue;
mod tracker;

pub use driver::Search;
pub use events::{EventBus, SearchEvent};
pub use params::{FailAction, SearchParams};
pub use queue::{NamingGuard, QueueManager, TickReport};
pub use tracker::{CrystalRef, IndexQueue, Tracker};
