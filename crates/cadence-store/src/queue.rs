use tracing::warn;

use cadence_core::PendingCompletion;

use crate::database::Database;
use crate::error::StoreError;
use crate::schema;

/// Completions recorded while offline, waiting for the next sync pass.
/// At most one entry per `(habit_id, period_key)`; re-toggling the same
/// period overwrites, so the queue carries the last-written value only.
pub struct PendingQueue {
    db: Database,
}

impl PendingQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn load(&self) -> Result<Vec<PendingCompletion>, StoreError> {
        let Some(raw) = self.db.get_value(schema::KEY_PENDING_COMPLETIONS)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(pending) => Ok(pending),
            Err(e) => {
                warn!(error = %e, "pending queue is malformed, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    pub fn replace(&self, pending: &[PendingCompletion]) -> Result<(), StoreError> {
        let json = serde_json::to_string(pending)?;
        self.db.put_value(schema::KEY_PENDING_COMPLETIONS, &json)
    }

    /// Enqueue a completion, replacing any queued entry for the same
    /// `(habit_id, period_key)`.
    pub fn push(&self, entry: PendingCompletion) -> Result<(), StoreError> {
        let mut pending = self.load()?;
        pending.retain(|p| !(p.habit_id == entry.habit_id && p.period_key == entry.period_key));
        pending.push(entry);
        self.replace(&pending)
    }

}
