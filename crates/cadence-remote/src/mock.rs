//! In-memory remote store for deterministic engine tests without a server.
//! Mirrors the real API's semantics: server-issued integer ids, idempotent
//! completion upserts keyed by `(habit_id, period_key)`, history invalidation
//! on frequency change, cascade delete of completion rows.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use parking_lot::Mutex;

use cadence_core::{period, streak, Completion, Frequency, Habit, HabitId};

use crate::error::RemoteError;
use crate::service::{
    CompletionService, CompletionUpsert, HabitPatch, HabitService, HabitStats, NewHabit,
    StatsCell, UpsertAck,
};

#[derive(Default)]
struct State {
    habits: Vec<StoredHabit>,
    completions: Vec<StoredCompletion>,
    next_id: i64,
}

#[derive(Clone)]
struct StoredHabit {
    id: i64,
    title: String,
    frequency: Frequency,
    tags: Vec<String>,
    created_at: String,
}

#[derive(Clone)]
struct StoredCompletion {
    habit_id: i64,
    period_key: String,
    completed: bool,
}

/// Programmable failures: injected errors are retryable server errors unless
/// `fail_auth` is set, which makes every call fail with `Unauthorized`.
#[derive(Default)]
struct Failures {
    list: bool,
    auth: bool,
    upsert: bool,
    create_titles: HashSet<String>,
    update_ids: HashSet<i64>,
    delete_ids: HashSet<i64>,
}

#[derive(Default)]
pub struct CallCounts {
    pub list: AtomicUsize,
    pub create: AtomicUsize,
    pub update: AtomicUsize,
    pub delete: AtomicUsize,
    pub upsert: AtomicUsize,
}

pub struct MockRemote {
    state: Mutex<State>,
    failures: Mutex<Failures>,
    pub calls: CallCounts,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { next_id: 1, ..State::default() }),
            failures: Mutex::new(Failures::default()),
            calls: CallCounts::default(),
        }
    }

    // Failure injection -----------------------------------------------------

    pub fn fail_list(&self, on: bool) {
        self.failures.lock().list = on;
    }

    pub fn fail_auth(&self, on: bool) {
        self.failures.lock().auth = on;
    }

    pub fn fail_upserts(&self, on: bool) {
        self.failures.lock().upsert = on;
    }

    pub fn fail_create_titled(&self, title: &str) {
        self.failures.lock().create_titles.insert(title.to_string());
    }

    pub fn fail_update_for(&self, id: i64) {
        self.failures.lock().update_ids.insert(id);
    }

    pub fn fail_delete_for(&self, id: i64) {
        self.failures.lock().delete_ids.insert(id);
    }

    pub fn clear_failures(&self) {
        *self.failures.lock() = Failures::default();
    }

    // Seeding / inspection --------------------------------------------------

    /// Insert a habit server-side, returning its issued id.
    pub fn seed_habit(&self, title: &str, frequency: Frequency, tags: &[&str]) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.habits.push(StoredHabit {
            id,
            title: title.to_string(),
            frequency,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: Utc::now().to_rfc3339(),
        });
        id
    }

    pub fn seed_completion(&self, habit_id: i64, period_key: &str, completed: bool) {
        let mut state = self.state.lock();
        state.completions.push(StoredCompletion {
            habit_id,
            period_key: period_key.to_string(),
            completed,
        });
    }

    pub fn habit_ids(&self) -> Vec<i64> {
        self.state.lock().habits.iter().map(|h| h.id).collect()
    }

    pub fn habit_titled(&self, title: &str) -> Option<i64> {
        self.state
            .lock()
            .habits
            .iter()
            .find(|h| h.title == title)
            .map(|h| h.id)
    }

    pub fn completion_rows(&self, habit_id: i64) -> Vec<(String, bool)> {
        self.state
            .lock()
            .completions
            .iter()
            .filter(|c| c.habit_id == habit_id)
            .map(|c| (c.period_key.clone(), c.completed))
            .collect()
    }

    // Internals -------------------------------------------------------------

    fn injected(&self) -> Option<RemoteError> {
        if self.failures.lock().auth {
            Some(RemoteError::Unauthorized("session expired".into()))
        } else {
            None
        }
    }

    fn server_error() -> RemoteError {
        RemoteError::ServerError { status: 500, body: "injected failure".into() }
    }

    fn render(state: &State, stored: &StoredHabit, today: NaiveDate) -> Habit {
        let rows: Vec<Completion> = state
            .completions
            .iter()
            .filter(|c| c.habit_id == stored.id)
            .map(|c| Completion {
                habit_id: HabitId::Remote(c.habit_id),
                period_key: c.period_key.clone(),
                completed: c.completed,
            })
            .collect();
        let current = period::period_key(today, stored.frequency);
        Habit {
            id: HabitId::Remote(stored.id),
            title: stored.title.clone(),
            frequency: stored.frequency,
            tags: stored.tags.clone(),
            created_at: stored.created_at.clone(),
            streak_count: streak::streak(stored.frequency, &rows, today),
            completed_today: rows.iter().any(|r| r.period_key == current && r.completed),
            total_completions: rows.iter().filter(|r| r.completed).count() as u32,
            deleted: false,
            updated: false,
        }
    }
}

#[async_trait]
impl HabitService for MockRemote {
    async fn list(&self) -> Result<Vec<Habit>, RemoteError> {
        self.calls.list.fetch_add(1, Ordering::Relaxed);
        if let Some(e) = self.injected() {
            return Err(e);
        }
        if self.failures.lock().list {
            return Err(Self::server_error());
        }
        let today = Local::now().date_naive();
        let state = self.state.lock();
        Ok(state.habits.iter().map(|h| Self::render(&state, h, today)).collect())
    }

    async fn create(&self, habit: NewHabit) -> Result<Habit, RemoteError> {
        self.calls.create.fetch_add(1, Ordering::Relaxed);
        if let Some(e) = self.injected() {
            return Err(e);
        }
        if self.failures.lock().create_titles.contains(&habit.title) {
            return Err(Self::server_error());
        }
        let id = self.seed_habit(&habit.title, habit.frequency, &[]);
        let mut state = self.state.lock();
        if let Some(stored) = state.habits.iter_mut().find(|h| h.id == id) {
            stored.tags = habit.tags;
        }
        let today = Local::now().date_naive();
        let stored = state.habits.iter().find(|h| h.id == id).cloned();
        Ok(Self::render(&state, &stored.expect("just inserted"), today))
    }

    async fn update(&self, id: i64, patch: HabitPatch) -> Result<Habit, RemoteError> {
        self.calls.update.fetch_add(1, Ordering::Relaxed);
        if let Some(e) = self.injected() {
            return Err(e);
        }
        if self.failures.lock().update_ids.contains(&id) {
            return Err(Self::server_error());
        }
        let mut state = self.state.lock();
        let Some(stored) = state.habits.iter_mut().find(|h| h.id == id) else {
            return Err(RemoteError::NotFound(format!("habit {id}")));
        };
        let frequency_changed = stored.frequency != patch.frequency;
        stored.title = patch.title;
        stored.frequency = patch.frequency;
        stored.tags = patch.tags;
        if frequency_changed {
            // Period keys are not comparable across frequencies.
            state.completions.retain(|c| c.habit_id != id);
        }
        let today = Local::now().date_naive();
        let stored = state.habits.iter().find(|h| h.id == id).cloned();
        Ok(Self::render(&state, &stored.expect("just updated"), today))
    }

    async fn delete(&self, id: i64) -> Result<(), RemoteError> {
        self.calls.delete.fetch_add(1, Ordering::Relaxed);
        if let Some(e) = self.injected() {
            return Err(e);
        }
        if self.failures.lock().delete_ids.contains(&id) {
            return Err(Self::server_error());
        }
        let mut state = self.state.lock();
        let before = state.habits.len();
        state.habits.retain(|h| h.id != id);
        if state.habits.len() == before {
            return Err(RemoteError::NotFound(format!("habit {id}")));
        }
        state.completions.retain(|c| c.habit_id != id);
        Ok(())
    }
}

#[async_trait]
impl CompletionService for MockRemote {
    async fn upsert(&self, completion: CompletionUpsert) -> Result<UpsertAck, RemoteError> {
        self.calls.upsert.fetch_add(1, Ordering::Relaxed);
        if let Some(e) = self.injected() {
            return Err(e);
        }
        if self.failures.lock().upsert {
            return Err(Self::server_error());
        }
        let mut state = self.state.lock();
        if !state.habits.iter().any(|h| h.id == completion.habit_id) {
            return Err(RemoteError::NotFound(format!("habit {}", completion.habit_id)));
        }
        if let Some(row) = state
            .completions
            .iter_mut()
            .find(|c| c.habit_id == completion.habit_id && c.period_key == completion.period_key)
        {
            row.completed = completion.completed;
        } else {
            state.completions.push(StoredCompletion {
                habit_id: completion.habit_id,
                period_key: completion.period_key.clone(),
                completed: completion.completed,
            });
        }
        Ok(UpsertAck { completed: completion.completed, frequency: completion.frequency })
    }

    async fn stats(&self, habit_id: i64) -> Result<HabitStats, RemoteError> {
        if let Some(e) = self.injected() {
            return Err(e);
        }
        let today = Local::now().date_naive();
        let state = self.state.lock();
        let Some(stored) = state.habits.iter().find(|h| h.id == habit_id) else {
            return Err(RemoteError::NotFound(format!("habit {habit_id}")));
        };
        let week_dates: Vec<String> = period::week_dates(today).collect();
        let month_prefix = period::period_key(today, Frequency::Monthly);
        let cells = |keep: &dyn Fn(&str) -> bool| -> Vec<StatsCell> {
            state
                .completions
                .iter()
                .filter(|c| c.habit_id == habit_id && keep(&c.period_key))
                .map(|c| StatsCell { date: c.period_key.clone(), completed: c.completed })
                .collect()
        };
        let week = cells(&|key| week_dates.iter().any(|d| d == key));
        let month = cells(&|key| key.starts_with(&month_prefix));
        Ok(HabitStats {
            habit: Self::render(&state, stored, today),
            week,
            month,
        })
    }
}
