pub mod error;
pub mod habits;
pub mod scheduler;
pub mod sync;

pub use error::EngineError;
pub use habits::LocalHabits;
pub use scheduler::{spawn_scheduler, SyncTrigger};
pub use sync::{Remote, SyncEngine, SyncOutcome, SyncReport};
