//! Local mutation surface: every user-facing write lands here, synchronously
//! and optimistically, before any network traffic. The sync engine is the
//! only component that talks to the remote store.

use chrono::NaiveDate;
use tracing::debug;

use cadence_core::{period, validate, Frequency, Habit, HabitId, PendingCompletion};
use cadence_store::{Database, HabitCache, PendingQueue};

use crate::error::EngineError;

pub struct LocalHabits {
    cache: HabitCache,
    queue: PendingQueue,
}

impl LocalHabits {
    pub fn new(db: Database) -> Self {
        Self {
            cache: HabitCache::new(db.clone()),
            queue: PendingQueue::new(db),
        }
    }

    pub fn list(&self) -> Result<Vec<Habit>, EngineError> {
        Ok(self.cache.load()?)
    }

    /// Create a habit offline: temporary id, `created_at` stamped here.
    /// Validation (including normalized title uniqueness) runs on every
    /// write path, never skipped on fallbacks.
    pub fn create(
        &self,
        title: &str,
        frequency: Frequency,
        tags: Vec<String>,
    ) -> Result<Habit, EngineError> {
        let mut habits = self.cache.load()?;
        validate::validate(title, &tags, &habits, None)?;

        let habit = Habit::new_offline(title.trim().to_string(), frequency, tags);
        debug!(id = %habit.id, title = %habit.title, "habit created offline");
        habits.push(habit.clone());
        self.cache.replace(&habits)?;
        Ok(habit)
    }

    /// Edit a habit's fields and mark it for remote update. Offline-created
    /// habits are not flagged: their pending creation already carries the
    /// latest fields.
    pub fn edit(
        &self,
        id: &HabitId,
        title: &str,
        frequency: Frequency,
        tags: Vec<String>,
    ) -> Result<Habit, EngineError> {
        let mut habits = self.cache.load()?;
        validate::validate(title, &tags, &habits, Some(id))?;

        let habit = habits
            .iter_mut()
            .find(|h| &h.id == id && !h.deleted)
            .ok_or_else(|| EngineError::UnknownHabit(id.to_string()))?;
        habit.title = title.trim().to_string();
        habit.frequency = frequency;
        habit.tags = tags;
        if !habit.id.is_offline() {
            habit.updated = true;
        }
        let edited = habit.clone();
        self.cache.replace(&habits)?;
        Ok(edited)
    }

    /// Soft-delete: flag for remote deletion on the next pass. A habit that
    /// never reached the server is simply dropped, along with anything
    /// queued against its temporary id.
    pub fn remove(&self, id: &HabitId) -> Result<(), EngineError> {
        let mut habits = self.cache.load()?;
        if !habits.iter().any(|h| &h.id == id) {
            return Err(EngineError::UnknownHabit(id.to_string()));
        }
        if id.is_offline() {
            habits.retain(|h| &h.id != id);
            let mut pending = self.queue.load()?;
            pending.retain(|p| &p.habit_id != id);
            self.queue.replace(&pending)?;
        } else {
            for habit in habits.iter_mut().filter(|h| &h.id == id) {
                habit.deleted = true;
                habit.updated = false;
            }
        }
        self.cache.replace(&habits)?;
        Ok(())
    }

    /// Record a completion for the period containing `date`, queueing it for
    /// the next sync pass. Re-toggling the same period overwrites the queued
    /// value. The cached habit's display fields are updated optimistically.
    pub fn set_completed(
        &self,
        id: &HabitId,
        date: NaiveDate,
        completed: bool,
    ) -> Result<String, EngineError> {
        let mut habits = self.cache.load()?;
        let frequency = habits
            .iter()
            .find(|h| &h.id == id && !h.deleted)
            .map(|h| h.frequency)
            .ok_or_else(|| EngineError::UnknownHabit(id.to_string()))?;

        let period_key = period::period_key(date, frequency);
        self.queue.push(PendingCompletion {
            habit_id: id.clone(),
            period_key: period_key.clone(),
            completed,
            frequency: Some(frequency),
        })?;

        let current = period::period_key(chrono::Local::now().date_naive(), frequency);
        if period_key == current {
            for habit in habits.iter_mut().filter(|h| &h.id == id) {
                habit.completed_today = completed;
            }
            self.cache.replace(&habits)?;
        }
        Ok(period_key)
    }
}
