use tracing::warn;

use cadence_core::Habit;

use crate::database::Database;
use crate::error::StoreError;
use crate::schema;

/// Persisted habit collection. One JSON array read and replaced wholesale;
/// there are no partial-write semantics.
pub struct HabitCache {
    db: Database,
}

impl HabitCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load the cached collection. An absent entry is an empty collection, and
    /// so is a malformed one: corrupt persisted data must not crash callers.
    pub fn load(&self) -> Result<Vec<Habit>, StoreError> {
        let Some(raw) = self.db.get_value(schema::KEY_HABITS)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(habits) => Ok(habits),
            Err(e) => {
                warn!(error = %e, "habit cache is malformed, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the whole collection. A failure means "change not durable";
    /// retry policy belongs to the caller.
    pub fn replace(&self, habits: &[Habit]) -> Result<(), StoreError> {
        let json = serde_json::to_string(habits)?;
        self.db.put_value(schema::KEY_HABITS, &json)
    }
}
