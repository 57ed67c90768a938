use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cadence_core::{Frequency, Habit};

use crate::error::RemoteError;

/// Body for `POST /habits`. Temporary offline ids are stripped before a
/// record reaches this shape; the server issues the real id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewHabit {
    pub title: String,
    pub frequency: Frequency,
    pub tags: Vec<String>,
}

/// Body for `PUT /habits/:id`. If `frequency` differs from the stored value
/// the server discards the habit's completion history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HabitPatch {
    pub title: String,
    pub frequency: Frequency,
    pub tags: Vec<String>,
}

/// Body for `POST /completions`: an idempotent upsert on
/// `(habit_id, period_key)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionUpsert {
    pub habit_id: i64,
    #[serde(rename = "date")]
    pub period_key: String,
    pub completed: bool,
    pub frequency: Frequency,
}

/// The server's echo for a completion upsert.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpsertAck {
    pub completed: bool,
    pub frequency: Frequency,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsCell {
    pub date: String,
    pub completed: bool,
}

/// `GET /completions/stats/:habitId` payload, consumed by the stats display
/// only; the reconciler never reads it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HabitStats {
    pub habit: Habit,
    pub week: Vec<StatsCell>,
    pub month: Vec<StatsCell>,
}

/// CRUD against the authoritative habit store.
#[async_trait]
pub trait HabitService: Send + Sync {
    /// Full authoritative list, streak fields server-computed.
    async fn list(&self) -> Result<Vec<Habit>, RemoteError>;
    async fn create(&self, habit: NewHabit) -> Result<Habit, RemoteError>;
    async fn update(&self, id: i64, patch: HabitPatch) -> Result<Habit, RemoteError>;
    async fn delete(&self, id: i64) -> Result<(), RemoteError>;
}

/// Completion upserts and stats against the authoritative store.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn upsert(&self, completion: CompletionUpsert) -> Result<UpsertAck, RemoteError>;
    async fn stats(&self, habit_id: i64) -> Result<HabitStats, RemoteError>;
}
