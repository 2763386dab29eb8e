use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Request counters for operator dashboards, exposed at `/metrics/http`.
#[derive(Default)]
pub struct HttpMetrics {
    stake_requests: AtomicU64,
    stake_free: AtomicU64,
    payouts_settled: AtomicU64,
    refunds_settled: AtomicU64,
    settlement_errors: AtomicU64,
    jobs_enqueued: AtomicU64,
    jobs_retried: AtomicU64,
    auth_rejects: AtomicU64,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub stake_requests: u64,
    pub stake_free: u64,
    pub payouts_settled: u64,
    pub refunds_settled: u64,
    pub settlement_errors: u64,
    pub jobs_enqueued: u64,
    pub jobs_retried: u64,
    pub auth_rejects: u64,
}

impl HttpMetrics {
    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            stake_requests: self.stake_requests.load(Ordering::Relaxed),
            stake_free: self.stake_free.load(Ordering::Relaxed),
            payouts_settled: self.payouts_settled.load(Ordering::Relaxed),
            refunds_settled: self.refunds_settled.load(Ordering::Relaxed),
            settlement_errors: self.settlement_errors.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            auth_rejects: self.auth_rejects.load(Ordering::Relaxed),
        }
    }

    pub fn inc_stake_requests(&self) {
        self.stake_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stake_free(&self) {
        self.stake_free.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_payouts_settled(&self) {
        self.payouts_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_refunds_settled(&self) {
        self.refunds_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_settlement_errors(&self) {
        self.settlement_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_jobs_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_jobs_retried(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_auth_rejects(&self) {
        self.auth_rejects.fetch_add(1, Ordering::Relaxed);
    }
}
