use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a payment job settles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Payout,
    Refund,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payout => "payout",
            Self::Refund => "refund",
        }
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "payout" => Ok(Self::Payout),
            "refund" => Ok(Self::Refund),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a payment job.
///
/// Transitions are monotonic (`pending → processing → succeeded|failed`)
/// with a single exception: an operator-initiated retry moves a job from
/// `failed` back to `pending`. There is no automatic resurrection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one settlement attempt's lifecycle. The row in the
/// `payment_jobs` table is the single source of truth for whether a
/// settlement has been attempted or succeeded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentJob {
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Opaque settlement payload (a JSON-encoded `SettlementRequest`).
    pub payload: String,
    /// Ledger signature of the confirmed settlement, present only on
    /// succeeded jobs.
    pub signature: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl PaymentJob {
    /// A fresh pending job with a random id.
    pub fn new(job_type: JobType, payload: String, now_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            payload,
            signature: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_forms_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_type_string_forms_round_trip() {
        for job_type in [JobType::Payout, JobType::Refund] {
            assert_eq!(job_type.as_str().parse::<JobType>().unwrap(), job_type);
        }
        assert!("mint".parse::<JobType>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_new_job_starts_pending_with_zero_attempts() {
        let job = PaymentJob::new(JobType::Payout, "{}".into(), 1_000);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.last_error.is_none());
        assert_eq!(job.created_at_ms, job.updated_at_ms);
    }
}
