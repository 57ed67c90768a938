pub mod database;
pub mod error;
pub mod habits;
pub mod queue;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use habits::HabitCache;
pub use queue::PendingQueue;
