use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use libsql::{Connection, Database};
use valet_core::error::{Result, ValetError};
use valet_core::types::now_unix;
use valet_store::AssistantStore;

use crate::cron::CronExpr;

fn db_err(e: libsql::Error) -> ValetError {
    ValetError::Database(e.to_string())
}

/// Delivery channel for due reminders. Returns true on successful
/// delivery; false leaves the reminder pending (no re-fire is scheduled
/// for that occurrence).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reminder(&self, chat_id: i64, title: &str, description: &str) -> bool;
}

#[async_trait]
impl Notifier for valet_telegram::TelegramBot {
    async fn send_reminder(&self, chat_id: i64, title: &str, description: &str) -> bool {
        match valet_telegram::TelegramBot::send_reminder(self, chat_id, title, description).await {
            Ok(()) => true,
            Err(e) => {
                log!("[sched] telegram delivery failed: {e}");
                false
            }
        }
    }
}

/// A durable scheduled job. Plain data only: everything needed to fire
/// survives a restart in the row itself.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job_id: String,
    pub reminder_id: String,
    pub chat_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub fire_at: i64,
    pub cron: Option<String>,
    pub created_at: i64,
}

/// Durable reminder scheduler over libsql. Jobs live in the
/// `scheduled_jobs` table; the tick loop reads due rows, delivers through
/// the notifier, and advances or removes them.
pub struct Scheduler {
    db: Database,
    store: Arc<AssistantStore>,
    tick: Duration,
    tz_offset: i32,
}

impl Scheduler {
    pub fn new(db: Database, store: Arc<AssistantStore>, tick_seconds: u64, tz_offset: i32) -> Self {
        Self {
            db,
            store,
            tick: Duration::from_secs(tick_seconds),
            tz_offset,
        }
    }

    fn conn(&self) -> Result<Connection> {
        self.db.connect().map_err(db_err)
    }

    /// Initialize the scheduled_jobs table.
    pub async fn init(&self) -> Result<()> {
        self.conn()?
            .execute(
                "CREATE TABLE IF NOT EXISTS scheduled_jobs (
                    job_id TEXT PRIMARY KEY,
                    reminder_id TEXT NOT NULL,
                    chat_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    fire_at INTEGER NOT NULL,
                    cron TEXT,
                    created_at INTEGER NOT NULL
                )",
                (),
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Schedule a one-shot reminder. Re-scheduling the same reminder
    /// replaces the existing job (idempotent upsert keyed by reminder id).
    pub async fn schedule_reminder(
        &self,
        reminder_id: &str,
        fire_at: i64,
        chat_id: i64,
        title: &str,
        description: Option<&str>,
    ) -> Result<String> {
        let job_id = format!("reminder_{reminder_id}");
        self.upsert_job(&job_id, reminder_id, chat_id, title, description, fire_at, None)
            .await?;
        Ok(job_id)
    }

    /// Schedule a recurring reminder from a 5-field cron expression.
    /// The expression is validated here; the stored fire_at is the next
    /// occurrence.
    pub async fn schedule_recurring_reminder(
        &self,
        reminder_id: &str,
        cron_expr: &str,
        chat_id: i64,
        title: &str,
        description: Option<&str>,
    ) -> Result<String> {
        let parsed = CronExpr::parse(cron_expr)?;
        let fire_at = parsed
            .next_fire(now_unix(), self.tz_offset)
            .ok_or_else(|| {
                ValetError::Scheduler(format!("cron expression never fires: '{cron_expr}'"))
            })?;

        let job_id = format!("reminder_recurring_{reminder_id}");
        self.upsert_job(
            &job_id,
            reminder_id,
            chat_id,
            title,
            description,
            fire_at,
            Some(cron_expr),
        )
        .await?;
        Ok(job_id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn upsert_job(
        &self,
        job_id: &str,
        reminder_id: &str,
        chat_id: i64,
        title: &str,
        description: Option<&str>,
        fire_at: i64,
        cron: Option<&str>,
    ) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO scheduled_jobs (job_id, reminder_id, chat_id, title, description, fire_at, cron, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                libsql::params![
                    job_id.to_string(),
                    reminder_id.to_string(),
                    chat_id,
                    title.to_string(),
                    description.map(|s| s.to_string()),
                    fire_at,
                    cron.map(|s| s.to_string()),
                    now_unix()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Remove a job. Returns false when the job was not found.
    pub async fn cancel_reminder(&self, job_id: &str) -> Result<bool> {
        let affected = self
            .conn()?
            .execute(
                "DELETE FROM scheduled_jobs WHERE job_id = ?1",
                libsql::params![job_id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    /// Jobs due at or before `now`, soonest first.
    async fn due_jobs(&self, now: i64) -> Result<Vec<ScheduledJob>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT job_id, reminder_id, chat_id, title, description, fire_at, cron, created_at
                 FROM scheduled_jobs WHERE fire_at <= ?1 ORDER BY fire_at ASC",
                libsql::params![now],
            )
            .await
            .map_err(db_err)?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            jobs.push(ScheduledJob {
                job_id: row.get::<String>(0).map_err(db_err)?,
                reminder_id: row.get::<String>(1).map_err(db_err)?,
                chat_id: row.get::<i64>(2).map_err(db_err)?,
                title: row.get::<String>(3).map_err(db_err)?,
                description: get_optional_string(&row, 4)?,
                fire_at: row.get::<i64>(5).map_err(db_err)?,
                cron: get_optional_string(&row, 6)?,
                created_at: row.get::<i64>(7).map_err(db_err)?,
            });
        }
        Ok(jobs)
    }

    async fn delete_job(&self, job_id: &str) -> Result<()> {
        self.conn()?
            .execute(
                "DELETE FROM scheduled_jobs WHERE job_id = ?1",
                libsql::params![job_id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn advance_job(&self, job_id: &str, next_fire_at: i64) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE scheduled_jobs SET fire_at = ?1 WHERE job_id = ?2",
                libsql::params![next_fire_at, job_id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Main scheduler loop. Runs indefinitely, firing due jobs each tick.
    pub async fn run(&self, notifier: Arc<dyn Notifier>) {
        log!("[sched] started (tick: {:?})", self.tick);

        // Catch up on anything that came due while we were down
        if let Err(e) = self.fire_due(notifier.as_ref()).await {
            log!("[sched] startup check failed: {e}");
        }

        loop {
            tokio::time::sleep(self.tick).await;

            if let Err(e) = self.fire_due(notifier.as_ref()).await {
                log!("[sched] tick failed: {e}");
            }
        }
    }

    /// Fire every due job once. Delivery failure leaves the reminder
    /// pending for this occurrence; no re-fire is scheduled.
    async fn fire_due(&self, notifier: &dyn Notifier) -> Result<()> {
        let now = now_unix();

        for job in self.due_jobs(now).await? {
            let description = job.description.as_deref().unwrap_or("");
            let delivered = notifier
                .send_reminder(job.chat_id, &job.title, description)
                .await;

            if !delivered {
                log!("[sched] delivery failed for {}, left pending", job.job_id);
                continue;
            }

            // The job may fire long after startup: the store opens a
            // fresh connection per call, so this is a new session.
            self.store.mark_reminder_sent(&job.reminder_id).await?;

            match job.cron.as_deref() {
                Some(expr) => match crate::cron::next_fire(expr, now, self.tz_offset) {
                    Some(next) => {
                        self.advance_job(&job.job_id, next).await?;
                        self.store.reset_reminder(&job.reminder_id, next).await?;
                        log!("[sched] fired {}, next at {next}", job.job_id);
                    }
                    None => {
                        self.delete_job(&job.job_id).await?;
                        log!("[sched] fired {}, no further occurrences", job.job_id);
                    }
                },
                None => {
                    self.delete_job(&job.job_id).await?;
                    log!("[sched] fired {}", job.job_id);
                }
            }
        }

        Ok(())
    }
}

/// Read a nullable TEXT column as Option<String>.
fn get_optional_string(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
    let val = row.get::<libsql::Value>(idx).map_err(db_err)?;
    match val {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(s) => Ok(Some(s)),
        other => Err(ValetError::Database(format!(
            "expected text or null at column {idx}, got: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct RecordingNotifier {
        calls: AtomicU32,
        deliver: AtomicBool,
    }

    impl RecordingNotifier {
        fn new(deliver: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                deliver: AtomicBool::new(deliver),
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_reminder(&self, _chat_id: i64, _title: &str, _description: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.deliver.load(Ordering::SeqCst)
        }
    }

    // libsql's local `:memory:` databases are per-connection, and both
    // the scheduler and the store open a fresh connection per call, so
    // tests need real scratch files to share state across calls.
    fn temp_db_path(tag: &str) -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!("valet_sched_test_{tag}_{}_{n}.db", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    async fn test_scheduler() -> (Scheduler, Arc<AssistantStore>) {
        let db = libsql::Builder::new_local(temp_db_path("jobs"))
            .build()
            .await
            .unwrap();
        let store = Arc::new(AssistantStore::new(&temp_db_path("store")).await.unwrap());
        let sched = Scheduler::new(db, Arc::clone(&store), 30, 0);
        sched.init().await.unwrap();
        (sched, store)
    }

    #[tokio::test]
    async fn test_schedule_reminder_upsert() {
        let (sched, _store) = test_scheduler().await;

        let id1 = sched
            .schedule_reminder("r1", 100, 5, "call mom", None)
            .await
            .unwrap();
        let id2 = sched
            .schedule_reminder("r1", 200, 5, "call mom", None)
            .await
            .unwrap();
        assert_eq!(id1, "reminder_r1");
        assert_eq!(id1, id2);

        // One row, carrying the replacement fire time
        let jobs = sched.due_jobs(1_000).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].fire_at, 200);
    }

    #[tokio::test]
    async fn test_cancel_reminder() {
        let (sched, _store) = test_scheduler().await;

        let job_id = sched
            .schedule_reminder("r1", 100, 5, "dentist", None)
            .await
            .unwrap();

        assert!(sched.cancel_reminder(&job_id).await.unwrap());
        assert!(!sched.cancel_reminder(&job_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_recurring_requires_valid_cron() {
        let (sched, _store) = test_scheduler().await;

        assert!(sched
            .schedule_recurring_reminder("r1", "not a cron", 5, "standup", None)
            .await
            .is_err());

        let job_id = sched
            .schedule_recurring_reminder("r1", "0 9 * * *", 5, "standup", None)
            .await
            .unwrap();
        assert_eq!(job_id, "reminder_recurring_r1");
    }

    #[tokio::test]
    async fn test_fire_one_shot_marks_sent_and_deletes_job() {
        let (sched, store) = test_scheduler().await;

        let reminder = store
            .create_reminder(5, "call mom", None, 100, false, None)
            .await
            .unwrap();
        sched
            .schedule_reminder(&reminder.id, 100, 5, "call mom", None)
            .await
            .unwrap();

        let notifier = RecordingNotifier::new(true);
        sched.fire_due(&notifier).await.unwrap();

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        let stored = store.get_reminder(&reminder.id).await.unwrap().unwrap();
        assert!(stored.is_sent);
        assert!(sched.due_jobs(i64::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_leaves_job_and_reminder_pending() {
        let (sched, store) = test_scheduler().await;

        let reminder = store
            .create_reminder(5, "water plants", None, 100, false, None)
            .await
            .unwrap();
        sched
            .schedule_reminder(&reminder.id, 100, 5, "water plants", None)
            .await
            .unwrap();

        let notifier = RecordingNotifier::new(false);
        sched.fire_due(&notifier).await.unwrap();

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        let stored = store.get_reminder(&reminder.id).await.unwrap().unwrap();
        assert!(!stored.is_sent);
        // Job still present for the next tick
        assert_eq!(sched.due_jobs(i64::MAX).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fire_recurring_advances_job() {
        let (sched, store) = test_scheduler().await;

        let reminder = store
            .create_reminder(5, "standup", None, 100, true, Some("0 9 * * *"))
            .await
            .unwrap();
        let job_id = sched
            .schedule_recurring_reminder(&reminder.id, "0 9 * * *", 5, "standup", None)
            .await
            .unwrap();

        // Force the job due now
        sched.advance_job(&job_id, 100).await.unwrap();

        let notifier = RecordingNotifier::new(true);
        sched.fire_due(&notifier).await.unwrap();

        let jobs = sched.due_jobs(i64::MAX).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].fire_at > now_unix());

        // Reminder reset for the next occurrence
        let stored = store.get_reminder(&reminder.id).await.unwrap().unwrap();
        assert!(!stored.is_sent);
        assert_eq!(stored.status, "active");
        assert_eq!(stored.remind_at, jobs[0].fire_at);
    }
}
