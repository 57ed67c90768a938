//! The reconciler: one pass drains the pending-completion queue, propagates
//! deletes, updates, and creates, then pulls the authoritative habit list.
//!
//! Retryable per-item failures are logged and left dirty/queued for the next
//! pass; non-retryable rejections are dropped so nothing loops forever. Only
//! two things abort a pass early: the local store being unreadable, and
//! an auth failure from the remote (the caller must re-authenticate, silent
//! retry would be wrong).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use cadence_core::{Frequency, Habit, HabitId, PendingCompletion};
use cadence_remote::{CompletionService, CompletionUpsert, HabitPatch, HabitService, NewHabit};
use cadence_store::{Database, HabitCache, PendingQueue};

use crate::error::EngineError;

/// The full remote surface the reconciler needs.
pub trait Remote: HabitService + CompletionService {}
impl<T: HabitService + CompletionService> Remote for T {}

/// Counters for one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub completions_flushed: usize,
    pub deleted: usize,
    pub updated: usize,
    pub created: usize,
    pub failures: usize,
}

#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// A pass was already in flight; this trigger was dropped, not queued.
    AlreadyRunning,
}

pub struct SyncEngine {
    cache: HabitCache,
    queue: PendingQueue,
    remote: Arc<dyn Remote>,
    in_flight: AtomicBool,
}

/// Releases the single-flight guard however the pass ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(db: Database, remote: Arc<dyn Remote>) -> Self {
        Self {
            cache: HabitCache::new(db.clone()),
            queue: PendingQueue::new(db),
            remote,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one reconciliation pass. At most one runs at a time: a call that
    /// finds a pass in flight returns `AlreadyRunning` without queueing.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<SyncOutcome, EngineError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(SyncOutcome::AlreadyRunning);
        }
        let _guard = InFlight(&self.in_flight);

        let mut report = SyncReport::default();
        self.flush_pending(&mut report).await?;
        self.push_deletes(&mut report).await?;
        self.push_updates(&mut report).await?;
        self.push_creates(&mut report).await?;
        self.refresh(&mut report).await?;

        info!(
            flushed = report.completions_flushed,
            deleted = report.deleted,
            updated = report.updated,
            created = report.created,
            failures = report.failures,
            "sync pass finished"
        );
        Ok(SyncOutcome::Completed(report))
    }

    /// Phase 1: drain the pending-completion queue. Runs first so completions
    /// survive even if a later phase fails. Entries that still point at an
    /// offline habit stay queued; phase 4 remaps them once the habit gains a
    /// server id.
    async fn flush_pending(&self, report: &mut SyncReport) -> Result<(), EngineError> {
        let pending = self.queue.load()?;
        if pending.is_empty() {
            return Ok(());
        }
        let habits = self.cache.load()?;

        let mut remaining: Vec<PendingCompletion> = Vec::new();
        let mut auth_failure = None;
        for entry in pending {
            if auth_failure.is_some() {
                remaining.push(entry);
                continue;
            }
            let Some(habit_id) = entry.habit_id.remote() else {
                remaining.push(entry);
                continue;
            };
            let frequency = entry
                .frequency
                .or_else(|| {
                    habits
                        .iter()
                        .find(|h| h.id == entry.habit_id)
                        .map(|h| h.frequency)
                })
                .unwrap_or(Frequency::Daily);

            let payload = CompletionUpsert {
                habit_id,
                period_key: entry.period_key.clone(),
                completed: entry.completed,
                frequency,
            };
            match self.remote.upsert(payload).await {
                Ok(_) => report.completions_flushed += 1,
                Err(e) if e.is_auth() => {
                    remaining.push(entry);
                    auth_failure = Some(e);
                }
                Err(e) if !e.is_retryable() => {
                    // The habit is gone server-side, the row can never land.
                    warn!(habit_id, period = %entry.period_key, error = %e, "completion rejected, dropping");
                    report.failures += 1;
                }
                Err(e) => {
                    warn!(habit_id, period = %entry.period_key, error = %e, "completion flush failed, will retry");
                    report.failures += 1;
                    remaining.push(entry);
                }
            }
        }
        self.queue.replace(&remaining)?;
        match auth_failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Phase 2: propagate deletions. Deleting before updating or creating
    /// avoids wasted calls on habits about to disappear. A deleted habit that
    /// never reached the server has nothing to delete remotely.
    async fn push_deletes(&self, report: &mut SyncReport) -> Result<(), EngineError> {
        let mut habits = self.cache.load()?;
        let targets: Vec<HabitId> =
            habits.iter().filter(|h| h.deleted).map(|h| h.id.clone()).collect();
        if targets.is_empty() {
            return Ok(());
        }

        let mut auth_failure = None;
        for id in targets {
            let Some(remote_id) = id.remote() else {
                habits.retain(|h| h.id != id);
                report.deleted += 1;
                continue;
            };
            match self.remote.delete(remote_id).await {
                Ok(()) => {
                    habits.retain(|h| h.id != id);
                    report.deleted += 1;
                }
                Err(e) if e.is_auth() => {
                    auth_failure = Some(e);
                    break;
                }
                Err(e) if !e.is_retryable() => {
                    // Already gone server-side: treat as deleted.
                    warn!(%id, error = %e, "remote delete rejected, dropping locally");
                    habits.retain(|h| h.id != id);
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(%id, error = %e, "remote delete failed, will retry");
                    report.failures += 1;
                }
            }
        }
        self.cache.replace(&habits)?;
        match auth_failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Phase 3: propagate edits for habits flagged `updated` (never ones
    /// flagged `deleted`, and never offline creations, which carry their
    /// fields through phase 4).
    async fn push_updates(&self, report: &mut SyncReport) -> Result<(), EngineError> {
        let mut habits = self.cache.load()?;
        let targets: Vec<(i64, Habit)> = habits
            .iter()
            .filter(|h| h.updated && !h.deleted)
            .filter_map(|h| h.id.remote().map(|id| (id, h.clone())))
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let mut auth_failure = None;
        for (remote_id, habit) in targets {
            let patch = HabitPatch {
                title: habit.title.clone(),
                frequency: habit.frequency,
                tags: habit.tags.clone(),
            };
            match self.remote.update(remote_id, patch).await {
                Ok(fresh) => {
                    for slot in habits.iter_mut().filter(|h| h.id == habit.id) {
                        *slot = fresh.clone();
                    }
                    report.updated += 1;
                }
                Err(e) if e.is_auth() => {
                    auth_failure = Some(e);
                    break;
                }
                Err(e) => {
                    warn!(id = %habit.id, title = %habit.title, error = %e, "remote update failed, flag kept");
                    report.failures += 1;
                }
            }
        }
        self.cache.replace(&habits)?;
        match auth_failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Phase 4: create offline habits. The temporary id is stripped from the
    /// payload and replaced by the server-issued record; queued completions
    /// pointing at the temporary id are remapped so the next pass can flush
    /// them. The only phase that changes a habit's identity.
    async fn push_creates(&self, report: &mut SyncReport) -> Result<(), EngineError> {
        let mut habits = self.cache.load()?;
        let targets: Vec<Habit> = habits
            .iter()
            .filter(|h| h.id.is_offline() && !h.deleted)
            .cloned()
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let mut auth_failure = None;
        for habit in targets {
            let body = NewHabit {
                title: habit.title.clone(),
                frequency: habit.frequency,
                tags: habit.tags.clone(),
            };
            match self.remote.create(body).await {
                Ok(created) => {
                    let fresh_id = created.id.clone();
                    for slot in habits.iter_mut().filter(|h| h.id == habit.id) {
                        *slot = created.clone();
                    }
                    self.remap_queue(&habit.id, &fresh_id)?;
                    report.created += 1;
                }
                Err(e) if e.is_auth() => {
                    auth_failure = Some(e);
                    break;
                }
                Err(e) => {
                    // The temporary id stays stable across retries, so no
                    // double-create can come from this engine.
                    warn!(id = %habit.id, title = %habit.title, error = %e, "remote create failed, will retry");
                    report.failures += 1;
                }
            }
        }
        self.cache.replace(&habits)?;
        match auth_failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn remap_queue(&self, from: &HabitId, to: &HabitId) -> Result<(), EngineError> {
        let mut pending = self.queue.load()?;
        let mut changed = false;
        for entry in pending.iter_mut().filter(|p| &p.habit_id == from) {
            entry.habit_id = to.clone();
            changed = true;
        }
        if changed {
            self.queue.replace(&pending)?;
        }
        Ok(())
    }

    /// Phase 5: authoritative refresh. The server's list replaces the local
    /// cache; records that still carry unresolved dirty state from this pass
    /// are overlaid on top so their retries survive. After a fully successful
    /// pass nothing is dirty and the cache equals the remote list verbatim.
    async fn refresh(&self, report: &mut SyncReport) -> Result<(), EngineError> {
        let fresh = match self.remote.list().await {
            Ok(fresh) => fresh,
            Err(e) if e.is_auth() => return Err(e.into()),
            Err(e) => {
                // Degraded but fine: phases 1-4 already made their mutations
                // durable, the display data is just stale.
                warn!(error = %e, "authoritative refresh failed");
                report.failures += 1;
                return Ok(());
            }
        };

        let local = self.cache.load()?;
        let mut merged = fresh;
        for habit in local {
            if habit.deleted || habit.updated {
                if let Some(slot) = merged.iter_mut().find(|h| h.id == habit.id) {
                    *slot = habit;
                } else if !habit.deleted {
                    merged.push(habit);
                }
            } else if habit.id.is_offline() {
                merged.push(habit);
            }
        }
        self.cache.replace(&merged)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_remote::MockRemote;
    use chrono::Local;

    fn engine(remote: Arc<MockRemote>) -> (SyncEngine, Database) {
        let db = Database::in_memory().unwrap();
        (SyncEngine::new(db.clone(), remote), db)
    }

    fn offline_habit(title: &str, frequency: Frequency) -> Habit {
        Habit::new_offline(title.into(), frequency, vec!["learning".into()])
    }

    fn synced_habit(id: i64, title: &str) -> Habit {
        let mut h = offline_habit(title, Frequency::Daily);
        h.id = HabitId::Remote(id);
        h
    }

    async fn completed(engine: &SyncEngine) -> SyncReport {
        match engine.sync().await.unwrap() {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::AlreadyRunning => panic!("pass should have run"),
        }
    }

    #[tokio::test]
    async fn full_pass_converges_to_remote_list() {
        let remote = Arc::new(MockRemote::new());
        let keep = remote.seed_habit("Keep", Frequency::Daily, &["health"]);
        let doomed = remote.seed_habit("Doomed", Frequency::Daily, &["health"]);
        let stale = remote.seed_habit("Stale", Frequency::Daily, &["health"]);

        let (engine, _db) = engine(remote.clone());
        let mut local = vec![
            synced_habit(keep, "Keep"),
            synced_habit(doomed, "Doomed"),
            synced_habit(stale, "Stale"),
            offline_habit("Fresh", Frequency::Weekly),
        ];
        local[1].deleted = true;
        local[2].title = "Stale renamed".into();
        local[2].updated = true;
        engine.cache.replace(&local).unwrap();

        let report = completed(&engine).await;
        assert_eq!(report.deleted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.failures, 0);

        let habits = engine.cache.load().unwrap();
        assert_eq!(habits.len(), 3);
        assert!(habits.iter().all(|h| h.is_clean()));
        assert!(habits.iter().any(|h| h.title == "Stale renamed"));
        assert!(habits.iter().any(|h| h.title == "Fresh"));
        assert!(!habits.iter().any(|h| h.title == "Doomed"));
        assert_eq!(remote.habit_titled("Doomed"), None);
    }

    #[tokio::test]
    async fn offline_creation_gains_server_id() {
        let remote = Arc::new(MockRemote::new());
        let (engine, _db) = engine(remote.clone());

        let mut habit = offline_habit("Read", Frequency::Daily);
        habit.id = HabitId::Offline("offline-1700000000000".into());
        engine.cache.replace(std::slice::from_ref(&habit)).unwrap();

        completed(&engine).await;

        let habits = engine.cache.load().unwrap();
        assert_eq!(habits.len(), 1);
        assert!(matches!(habits[0].id, HabitId::Remote(_)));
        assert_eq!(habits[0].streak_count, 0);
        // The temporary id survives nowhere.
        let raw = serde_json::to_string(&habits).unwrap();
        assert!(!raw.contains("offline-1700000000000"));
        assert!(engine.queue.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_failure_keeps_temporary_record_for_retry() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_create_titled("Read");
        let (engine, _db) = engine(remote.clone());
        engine
            .cache
            .replace(&[offline_habit("Read", Frequency::Daily)])
            .unwrap();

        let report = completed(&engine).await;
        assert_eq!(report.created, 0);
        assert_eq!(report.failures, 1);
        let habits = engine.cache.load().unwrap();
        assert!(habits[0].id.is_offline());

        // Next pass succeeds with the same stable temporary id: one create.
        remote.clear_failures();
        completed(&engine).await;
        assert_eq!(remote.habit_ids().len(), 1);
        assert_eq!(remote.calls.create.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn queue_flush_removes_sent_entries_and_keeps_failed() {
        let remote = Arc::new(MockRemote::new());
        let id = remote.seed_habit("Read", Frequency::Daily, &["learning"]);
        let (engine, _db) = engine(remote.clone());
        engine.cache.replace(&[synced_habit(id, "Read")]).unwrap();
        engine
            .queue
            .push(PendingCompletion {
                habit_id: HabitId::Remote(id),
                period_key: "2025-06-03".into(),
                completed: true,
                frequency: Some(Frequency::Daily),
            })
            .unwrap();

        remote.fail_upserts(true);
        let report = completed(&engine).await;
        assert_eq!(report.completions_flushed, 0);
        assert_eq!(engine.queue.load().unwrap().len(), 1);
        assert!(report.failures >= 1);

        remote.fail_upserts(false);
        let report = completed(&engine).await;
        assert_eq!(report.completions_flushed, 1);
        assert!(engine.queue.load().unwrap().is_empty());
        assert_eq!(remote.completion_rows(id), vec![("2025-06-03".into(), true)]);
    }

    #[tokio::test]
    async fn rejected_completion_is_dropped_not_requeued() {
        let remote = Arc::new(MockRemote::new());
        let (engine, _db) = engine(remote.clone());
        // The habit vanished server-side, so the upsert gets a 404 forever.
        engine
            .queue
            .push(PendingCompletion {
                habit_id: HabitId::Remote(7),
                period_key: "2025-06-03".into(),
                completed: true,
                frequency: Some(Frequency::Daily),
            })
            .unwrap();

        let report = completed(&engine).await;
        assert_eq!(report.completions_flushed, 0);
        assert_eq!(report.failures, 1);
        assert!(engine.queue.load().unwrap().is_empty());

        // The drop is final: the next pass sends nothing.
        completed(&engine).await;
        assert_eq!(remote.calls.upsert.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn missing_queue_frequency_falls_back_to_cache_then_daily() {
        let remote = Arc::new(MockRemote::new());
        let weekly = remote.seed_habit("Run", Frequency::Weekly, &["fitness"]);
        let (engine, _db) = engine(remote.clone());
        engine.cache.replace(&[synced_habit(weekly, "Run")]).unwrap();

        engine
            .queue
            .push(PendingCompletion {
                habit_id: HabitId::Remote(weekly),
                period_key: "2025-W23".into(),
                completed: true,
                frequency: None,
            })
            .unwrap();
        // No cache entry for this habit: frequency defaults to daily.
        remote.seed_habit("Ghost", Frequency::Daily, &["health"]);
        let ghost = remote.habit_titled("Ghost").unwrap();
        engine
            .queue
            .push(PendingCompletion {
                habit_id: HabitId::Remote(ghost),
                period_key: "2025-06-03".into(),
                completed: true,
                frequency: None,
            })
            .unwrap();

        let report = completed(&engine).await;
        assert_eq!(report.completions_flushed, 2);
    }

    #[tokio::test]
    async fn partial_update_failure_leaves_only_that_habit_dirty() {
        let remote = Arc::new(MockRemote::new());
        let ok_id = remote.seed_habit("Okay", Frequency::Daily, &["health"]);
        let bad_id = remote.seed_habit("Broken", Frequency::Daily, &["health"]);
        let gone_id = remote.seed_habit("Gone", Frequency::Daily, &["health"]);
        remote.fail_update_for(bad_id);

        let (engine, _db) = engine(remote.clone());
        let mut local = vec![
            synced_habit(ok_id, "Okay edited"),
            synced_habit(bad_id, "Broken edited"),
            synced_habit(gone_id, "Gone"),
            offline_habit("New", Frequency::Daily),
        ];
        local[0].updated = true;
        local[1].updated = true;
        local[2].deleted = true;
        engine.cache.replace(&local).unwrap();

        let report = completed(&engine).await;
        // Phases 2 and 4 completed for unrelated habits.
        assert_eq!(report.deleted, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.failures, 1);

        let habits = engine.cache.load().unwrap();
        let broken = habits.iter().find(|h| h.id == HabitId::Remote(bad_id)).unwrap();
        assert!(broken.updated, "failed habit keeps its flag for retry");
        assert_eq!(broken.title, "Broken edited");
        assert!(habits.iter().filter(|h| h.id != broken.id).all(|h| h.is_clean()));
    }

    #[tokio::test]
    async fn refresh_failure_keeps_post_mutation_state() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_list(true);
        let (engine, _db) = engine(remote.clone());
        engine
            .cache
            .replace(&[offline_habit("Read", Frequency::Daily)])
            .unwrap();

        let report = completed(&engine).await;
        assert_eq!(report.created, 1);
        assert_eq!(report.failures, 1);
        // Creation was durable even though the final fetch failed.
        let habits = engine.cache.load().unwrap();
        assert!(matches!(habits[0].id, HabitId::Remote(_)));
    }

    #[tokio::test]
    async fn auth_failure_aborts_and_preserves_state() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_auth(true);
        let (engine, _db) = engine(remote.clone());
        let mut habit = synced_habit(1, "Read");
        habit.updated = true;
        engine.cache.replace(std::slice::from_ref(&habit)).unwrap();
        engine
            .queue
            .push(PendingCompletion {
                habit_id: HabitId::Remote(1),
                period_key: "2025-06-03".into(),
                completed: true,
                frequency: Some(Frequency::Daily),
            })
            .unwrap();

        let err = engine.sync().await.unwrap_err();
        assert!(matches!(err, EngineError::Remote(e) if e.is_auth()));
        // Nothing was lost: flag and queue entry both intact.
        assert!(engine.cache.load().unwrap()[0].updated);
        assert_eq!(engine.queue.load().unwrap().len(), 1);
        // And the guard was released: a later pass can run.
        remote.fail_auth(false);
        remote.seed_habit("Read", Frequency::Daily, &["health"]);
        completed(&engine).await;
    }

    #[tokio::test]
    async fn queued_completion_for_offline_habit_waits_for_its_id() {
        let remote = Arc::new(MockRemote::new());
        let (engine, _db) = engine(remote.clone());
        let habit = offline_habit("Read", Frequency::Daily);
        engine.cache.replace(std::slice::from_ref(&habit)).unwrap();
        engine
            .queue
            .push(PendingCompletion {
                habit_id: habit.id.clone(),
                period_key: "2025-06-03".into(),
                completed: true,
                frequency: Some(Frequency::Daily),
            })
            .unwrap();

        // First pass: habit is created and the queue entry is remapped to the
        // server id (flush ran before the id existed).
        completed(&engine).await;
        let pending = engine.queue.load().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(matches!(pending[0].habit_id, HabitId::Remote(_)));

        // Second pass flushes it.
        let report = completed(&engine).await;
        assert_eq!(report.completions_flushed, 1);
        assert!(engine.queue.load().unwrap().is_empty());
        let id = remote.habit_titled("Read").unwrap();
        assert_eq!(remote.completion_rows(id), vec![("2025-06-03".into(), true)]);
    }

    #[tokio::test]
    async fn concurrent_trigger_is_dropped() {
        let remote = Arc::new(MockRemote::new());
        let (engine, _db) = engine(remote);

        engine.in_flight.store(true, Ordering::SeqCst);
        assert!(matches!(
            engine.sync().await.unwrap(),
            SyncOutcome::AlreadyRunning
        ));
        engine.in_flight.store(false, Ordering::SeqCst);
        assert!(matches!(
            engine.sync().await.unwrap(),
            SyncOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn flushed_completion_feeds_server_streaks() {
        let remote = Arc::new(MockRemote::new());
        let id = remote.seed_habit("Read", Frequency::Daily, &["learning"]);
        let today = Local::now().date_naive();
        let yesterday = today.pred_opt().unwrap();
        remote.seed_completion(
            id,
            &cadence_core::period::period_key(yesterday, Frequency::Daily),
            true,
        );

        let (engine, _db) = engine(remote.clone());
        engine.cache.replace(&[synced_habit(id, "Read")]).unwrap();
        engine
            .queue
            .push(PendingCompletion {
                habit_id: HabitId::Remote(id),
                period_key: cadence_core::period::period_key(today, Frequency::Daily),
                completed: true,
                frequency: Some(Frequency::Daily),
            })
            .unwrap();

        completed(&engine).await;
        let habits = engine.cache.load().unwrap();
        assert_eq!(habits[0].streak_count, 2);
        assert!(habits[0].completed_today);
        assert_eq!(habits[0].total_completions, 2);
    }
}
