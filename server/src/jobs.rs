use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use stakehouse_types::{Error, JobStatus, JobType, PaymentJob, Result};

/// Hard ceiling on admin listing, regardless of the requested limit.
pub const MAX_LIST_LIMIT: usize = 200;

/// Durable payment-job table. The row is the single source of truth for
/// "has this settlement already been attempted/succeeded", and every
/// status transition is a conditional UPDATE guarded by the expected
/// previous status, so two workers can never drive the same job.
pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|err| Error::Configuration(format!("open payment jobs db: {err}")))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| Error::Configuration(format!("open payment jobs db: {err}")))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Records a fresh pending job.
    pub fn enqueue(&self, job: &PaymentJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO payment_jobs
             (id, job_type, status, attempts, last_error, payload, signature, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job.id,
                job.job_type.as_str(),
                job.status.as_str(),
                job.attempts,
                job.last_error,
                job.payload,
                job.signature,
                job.created_at_ms,
                job.updated_at_ms,
            ],
        )
        .map_err(|err| db_error("enqueue payment job", err))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<PaymentJob> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM payment_jobs WHERE id = ?1"),
            params![id],
            map_row,
        )
        .optional()
        .map_err(|err| db_error("load payment job", err))?
        .ok_or_else(|| Error::not_found(format!("payment job {id}")))
    }

    /// Jobs matching `status`, oldest-created first, for operator triage.
    /// `limit` is capped at [`MAX_LIST_LIMIT`]; an explicit zero means
    /// zero.
    pub fn list(&self, status: JobStatus, limit: usize) -> Result<Vec<PaymentJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(MAX_LIST_LIMIT);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM payment_jobs
                 WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2"
            ))
            .map_err(|err| db_error("prepare job listing", err))?;
        let rows = stmt
            .query_map(params![status.as_str(), limit as u64], map_row)
            .map_err(|err| db_error("list payment jobs", err))?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(|err| db_error("decode payment job row", err))?);
        }
        Ok(jobs)
    }

    /// `pending → processing` compare-and-set. Returns false when the job
    /// was not pending (another worker already claimed it, or it is
    /// terminal); the caller must then leave the job alone.
    pub fn claim(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE payment_jobs SET status = 'processing', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, now_ms()],
            )
            .map_err(|err| db_error("claim payment job", err))?;
        Ok(changed == 1)
    }

    /// `processing → succeeded`, recording the confirming signature.
    pub fn mark_succeeded(&self, id: &str, signature: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE payment_jobs
                 SET status = 'succeeded', signature = ?2, last_error = NULL, updated_at = ?3
                 WHERE id = ?1 AND status = 'processing'",
                params![id, signature, now_ms()],
            )
            .map_err(|err| db_error("mark payment job succeeded", err))?;
        Ok(changed == 1)
    }

    /// `processing → failed`, incrementing attempts and recording the
    /// error for triage. The job then waits for an operator.
    pub fn mark_failed(&self, id: &str, error_text: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE payment_jobs
                 SET status = 'failed', attempts = attempts + 1, last_error = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'processing'",
                params![id, error_text, now_ms()],
            )
            .map_err(|err| db_error("mark payment job failed", err))?;
        Ok(changed == 1)
    }

    /// `processing → pending` after a transient failure, consuming one
    /// attempt. Only the worker calls this, and only below the attempt
    /// ceiling.
    pub fn requeue_transient(&self, id: &str, error_text: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE payment_jobs
                 SET status = 'pending', attempts = attempts + 1, last_error = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'processing'",
                params![id, error_text, now_ms()],
            )
            .map_err(|err| db_error("requeue payment job", err))?;
        Ok(changed == 1)
    }

    /// Operator-initiated `failed → pending`: resets the attempt count
    /// and clears the error. The only reverse edge in the state machine;
    /// a succeeded or in-flight job is never eligible.
    pub fn reset_for_retry(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE payment_jobs
                 SET status = 'pending', attempts = 0, last_error = NULL, updated_at = ?2
                 WHERE id = ?1 AND status = 'failed'",
                params![id, now_ms()],
            )
            .map_err(|err| db_error("reset payment job", err))?;
        if changed == 1 {
            return Ok(());
        }
        // Distinguish "unknown id" from "known but not failed".
        let exists = conn
            .query_row(
                "SELECT COUNT(*) FROM payment_jobs WHERE id = ?1",
                params![id],
                |row| row.get::<_, u64>(0),
            )
            .map_err(|err| db_error("check payment job", err))?;
        if exists == 0 {
            Err(Error::not_found(format!("payment job {id}")))
        } else {
            Err(Error::Conflict(format!(
                "payment job {id} is not failed; only failed jobs can be retried"
            )))
        }
    }

    /// Oldest pending job, if any. The worker claims it separately via
    /// [`JobStore::claim`] so concurrent pollers race on the CAS, not on
    /// this read.
    pub fn next_pending(&self) -> Result<Option<PaymentJob>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM payment_jobs
                 WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1"
            ),
            [],
            map_row,
        )
        .optional()
        .map_err(|err| db_error("poll pending payment job", err))
    }
}

const COLUMNS: &str =
    "id, job_type, status, attempts, last_error, payload, signature, created_at, updated_at";

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS payment_jobs (
             id TEXT PRIMARY KEY,
             job_type TEXT NOT NULL,
             status TEXT NOT NULL,
             attempts INTEGER NOT NULL DEFAULT 0,
             last_error TEXT,
             payload TEXT NOT NULL,
             signature TEXT,
             created_at INTEGER NOT NULL,
             updated_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS payment_jobs_status ON payment_jobs(status);
         CREATE INDEX IF NOT EXISTS payment_jobs_created_at ON payment_jobs(created_at);",
    )
    .map_err(|err| Error::Configuration(format!("init payment jobs schema: {err}")))
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentJob> {
    let job_type: String = row.get(1)?;
    let status: String = row.get(2)?;
    // A row that no longer parses is corruption, not a payout.
    let job_type = job_type
        .parse::<JobType>()
        .map_err(|err| column_error(1, err))?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|err| column_error(2, err))?;
    Ok(PaymentJob {
        id: row.get(0)?,
        job_type,
        status,
        attempts: row.get(3)?,
        last_error: row.get(4)?,
        payload: row.get(5)?,
        signature: row.get(6)?,
        created_at_ms: row.get(7)?,
        updated_at_ms: row.get(8)?,
    })
}

fn column_error(index: usize, err: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, err.into())
}

fn db_error(context: &str, err: rusqlite::Error) -> Error {
    Error::Transient(format!("{context}: {err}"))
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn job_at(now_ms: u64) -> PaymentJob {
        PaymentJob::new(JobType::Payout, "{\"type\":\"payout\"}".into(), now_ms)
    }

    #[test]
    fn test_enqueue_then_get() {
        let store = JobStore::open_in_memory().unwrap();
        let job = job_at(1_000);
        store.enqueue(&job).unwrap();
        let loaded = store.get(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.payload, job.payload);
        assert_eq!(loaded.created_at_ms, 1_000);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let store = JobStore::open_in_memory().unwrap();
        assert!(matches!(
            store.get("missing").unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_list_is_oldest_first_and_clamped() {
        let store = JobStore::open_in_memory().unwrap();
        for index in 0..250u64 {
            store.enqueue(&job_at(index)).unwrap();
        }
        let jobs = store.list(JobStatus::Pending, 1_000).unwrap();
        assert_eq!(jobs.len(), MAX_LIST_LIMIT);
        assert!(jobs
            .windows(2)
            .all(|pair| pair[0].created_at_ms <= pair[1].created_at_ms));
        assert_eq!(jobs[0].created_at_ms, 0);
    }

    #[test]
    fn test_claim_is_a_single_winner_compare_and_set() {
        let store = Arc::new(JobStore::open_in_memory().unwrap());
        let job = job_at(1);
        store.enqueue(&job).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let id = job.id.clone();
            handles.push(std::thread::spawn(move || store.claim(&id).unwrap()));
        }
        let wins: usize = handles
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1, "exactly one concurrent claim may succeed");
        assert_eq!(store.get(&job.id).unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn test_full_lifecycle_to_succeeded() {
        let store = JobStore::open_in_memory().unwrap();
        let job = job_at(1);
        store.enqueue(&job).unwrap();
        assert!(store.claim(&job.id).unwrap());
        assert!(store.mark_succeeded(&job.id, "sig123").unwrap());
        let done = store.get(&job.id).unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.signature.as_deref(), Some("sig123"));
        assert!(done.last_error.is_none());
    }

    #[test]
    fn test_mark_failed_requires_processing() {
        let store = JobStore::open_in_memory().unwrap();
        let job = job_at(1);
        store.enqueue(&job).unwrap();
        // Still pending: the guarded update must not fire.
        assert!(!store.mark_failed(&job.id, "boom").unwrap());
        assert!(store.claim(&job.id).unwrap());
        assert!(store.mark_failed(&job.id, "boom").unwrap());
        let failed = store.get(&job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_retry_resets_attempts_and_error() {
        let store = JobStore::open_in_memory().unwrap();
        let job = job_at(1);
        store.enqueue(&job).unwrap();
        store.claim(&job.id).unwrap();
        store.mark_failed(&job.id, "rpc: connection reset").unwrap();

        store.reset_for_retry(&job.id).unwrap();
        let reset = store.get(&job.id).unwrap();
        assert_eq!(reset.status, JobStatus::Pending);
        assert_eq!(reset.attempts, 0);
        assert!(reset.last_error.is_none());
    }

    #[test]
    fn test_retry_unknown_job_is_not_found_and_mutates_nothing() {
        let store = JobStore::open_in_memory().unwrap();
        let job = job_at(1);
        store.enqueue(&job).unwrap();
        assert!(matches!(
            store.reset_for_retry("missing").unwrap_err(),
            Error::NotFound(_)
        ));
        assert_eq!(store.get(&job.id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_retry_of_non_failed_job_is_a_conflict() {
        let store = JobStore::open_in_memory().unwrap();
        let job = job_at(1);
        store.enqueue(&job).unwrap();
        store.claim(&job.id).unwrap();
        store.mark_succeeded(&job.id, "sig").unwrap();
        assert!(matches!(
            store.reset_for_retry(&job.id).unwrap_err(),
            Error::Conflict(_)
        ));
        // A finished payout must stay finished.
        assert_eq!(store.get(&job.id).unwrap().status, JobStatus::Succeeded);
    }

    #[test]
    fn test_requeue_transient_consumes_an_attempt() {
        let store = JobStore::open_in_memory().unwrap();
        let job = job_at(1);
        store.enqueue(&job).unwrap();
        store.claim(&job.id).unwrap();
        assert!(store.requeue_transient(&job.id, "transient: timeout").unwrap());
        let requeued = store.get(&job.id).unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert_eq!(requeued.attempts, 1);
        assert_eq!(requeued.last_error.as_deref(), Some("transient: timeout"));
    }

    #[test]
    fn test_zero_limit_lists_nothing() {
        let store = JobStore::open_in_memory().unwrap();
        store.enqueue(&job_at(1)).unwrap();
        assert!(store.list(JobStatus::Pending, 0).unwrap().is_empty());
        assert_eq!(store.list(JobStatus::Pending, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupted_status_surfaces_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let job = job_at(1);
        {
            let store = JobStore::open(&path).unwrap();
            store.enqueue(&job).unwrap();
        }
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute(
                "UPDATE payment_jobs SET status = 'done' WHERE id = ?1",
                params![job.id],
            )
            .unwrap();
        }
        let store = JobStore::open(&path).unwrap();
        let err = store.get(&job.id).unwrap_err();
        assert!(err.to_string().contains("unknown job status"), "{err}");
    }

    #[test]
    fn test_jobs_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let job = job_at(1);
        {
            let store = JobStore::open(&path).unwrap();
            store.enqueue(&job).unwrap();
            store.claim(&job.id).unwrap();
            store.mark_failed(&job.id, "rpc down").unwrap();
        }
        let store = JobStore::open(&path).unwrap();
        let loaded = store.get(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.last_error.as_deref(), Some("rpc down"));
        assert_eq!(loaded.payload, job.payload);
    }

    #[test]
    fn test_next_pending_returns_oldest() {
        let store = JobStore::open_in_memory().unwrap();
        let older = job_at(10);
        let newer = job_at(20);
        store.enqueue(&newer).unwrap();
        store.enqueue(&older).unwrap();
        assert_eq!(store.next_pending().unwrap().unwrap().id, older.id);
    }
}
