pub mod error;
pub mod habit;
pub mod period;
pub mod streak;
pub mod tags;
pub mod validate;

pub use error::ValidationError;
pub use habit::{Completion, Frequency, Habit, HabitId, PendingCompletion};
