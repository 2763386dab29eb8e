use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, RngCore};
use stakehouse_types::{PaymentJob, SettlementRequest};
use tracing::{error, info, warn};

use crate::Service;

/// Outcome of driving one job through processing, mostly for tests and
/// log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Another worker holds the job; nothing was done.
    Lost,
    Succeeded,
    /// Transient failure below the attempt ceiling; the job is pending
    /// again.
    Requeued,
    Failed,
}

/// Polls the payment-job table and drives pending jobs through the
/// settlement engine. Scheduling is deliberately simple: one claim per
/// tick, equal-jitter sleep between ticks so several workers do not
/// thunder against the same row.
pub struct JobWorker {
    service: Arc<Service>,
}

impl JobWorker {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    pub async fn run(self) {
        let poll = self.service.config.worker_poll_interval;
        info!(poll_ms = poll.as_millis() as u64, "payment job worker started");
        loop {
            match self.tick().await {
                Ok(Some(outcome)) => {
                    if let Some(delay) = backoff_after(outcome, poll) {
                        tokio::time::sleep(delay).await;
                    }
                }
                Ok(None) => tokio::time::sleep(jittered(poll)).await,
                Err(err) => {
                    error!(error = %err, "payment job poll failed");
                    tokio::time::sleep(jittered(poll)).await;
                }
            }
        }
    }

    /// Claims and processes at most one pending job.
    pub async fn tick(&self) -> stakehouse_types::Result<Option<ProcessOutcome>> {
        let Some(job) = self.service.jobs().next_pending()? else {
            return Ok(None);
        };
        Ok(Some(self.process(&job).await?))
    }

    /// Drives one job: CAS-claim, execute the settlement payload, record
    /// the outcome. Only transient errors consume an attempt and requeue;
    /// every other class fails the job immediately and leaves recovery to
    /// an operator.
    pub async fn process(&self, job: &PaymentJob) -> stakehouse_types::Result<ProcessOutcome> {
        let jobs = self.service.jobs();
        if !jobs.claim(&job.id)? {
            // Stale status: another worker won the compare-and-set.
            return Ok(ProcessOutcome::Lost);
        }

        let request: SettlementRequest = match serde_json::from_str(&job.payload) {
            Ok(request) => request,
            Err(err) => {
                let detail = format!("validation_error: undecodable payload: {err}");
                jobs.mark_failed(&job.id, &detail)?;
                error!(job_id = %job.id, error = %err, "payment job payload undecodable");
                return Ok(ProcessOutcome::Failed);
            }
        };

        match self.service.engine().execute(&request).await {
            Ok(result) => {
                jobs.mark_succeeded(&job.id, result.signature())?;
                info!(
                    job_id = %job.id,
                    signature = result.signature(),
                    "payment job settled"
                );
                Ok(ProcessOutcome::Succeeded)
            }
            Err(err) => {
                let detail = format!("{}: {err}", err.class());
                let attempts_after = job.attempts + 1;
                if err.is_transient() && attempts_after < self.service.config.worker_max_attempts {
                    jobs.requeue_transient(&job.id, &detail)?;
                    warn!(
                        job_id = %job.id,
                        attempts = attempts_after,
                        error = %err,
                        "payment job requeued after transient failure"
                    );
                    Ok(ProcessOutcome::Requeued)
                } else {
                    jobs.mark_failed(&job.id, &detail)?;
                    warn!(
                        job_id = %job.id,
                        attempts = attempts_after,
                        error = %err,
                        "payment job failed; operator retry required"
                    );
                    Ok(ProcessOutcome::Failed)
                }
            }
        }
    }
}

/// Pause between ticks. `Succeeded` and `Failed` settle the queue head,
/// so the backlog drains without sleeping. `Lost` means contention and
/// `Requeued` means a transient outage still in progress; both wait a
/// jittered interval so the attempt budget is not burned in one burst.
fn backoff_after(outcome: ProcessOutcome, poll: Duration) -> Option<Duration> {
    match outcome {
        ProcessOutcome::Succeeded | ProcessOutcome::Failed => None,
        ProcessOutcome::Lost | ProcessOutcome::Requeued => Some(jittered(poll)),
    }
}

/// "Equal jitter": delay is in [poll/2, poll], so multiple workers spread
/// out instead of polling in lockstep.
fn jittered(poll: Duration) -> Duration {
    jittered_from(&mut rand::thread_rng(), poll)
}

fn jittered_from(rng: &mut impl RngCore, poll: Duration) -> Duration {
    let poll_ms = poll.as_millis() as u64;
    if poll_ms <= 1 {
        return poll;
    }
    let half_ms = poll_ms / 2;
    let jitter_ms = rng.gen_range(0..=half_ms);
    Duration::from_millis(half_ms.saturating_add(jitter_ms))
}
