pub mod error;
pub mod http;
pub mod mock;
pub mod service;

pub use error::RemoteError;
pub use http::HttpRemote;
pub use mock::MockRemote;
pub use service::{
    CompletionService, CompletionUpsert, HabitPatch, HabitService, HabitStats, NewHabit,
    StatsCell, UpsertAck,
};
