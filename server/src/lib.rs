use std::sync::Arc;

use stakehouse_types::{Error, JobType, PaymentJob, Result, SettlementRequest};

mod api;
pub use api::Api;

mod config;
pub use config::Config;

mod jobs;
pub use jobs::{now_ms, JobStore, MAX_LIST_LIMIT};

mod ledger;
pub use ledger::{Ledger, SolanaLedger};

mod metrics;
pub use metrics::{HttpMetrics, HttpMetricsSnapshot};

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

mod settlement;
pub use settlement::SettlementEngine;

mod stake;
pub use stake::{Lobby, LobbyDirectory};

mod wallet;
pub use wallet::{EscrowWallet, WalletPool};

mod worker;
pub use worker::{JobWorker, ProcessOutcome};

/// The escrow settlement service: wallet pool, settlement engine, durable
/// payment-job store and lobby directory behind one aggregate, shared by
/// the HTTP API and the job worker.
pub struct Service {
    pub config: Config,
    wallets: Arc<WalletPool>,
    ledger: Arc<dyn Ledger>,
    engine: SettlementEngine,
    jobs: JobStore,
    lobbies: LobbyDirectory,
    metrics: HttpMetrics,
}

impl Service {
    pub fn new(config: Config, ledger: Arc<dyn Ledger>, jobs: JobStore) -> Result<Self> {
        config.validate()?;
        let wallets = Arc::new(WalletPool::from_base58_keys(&config.escrow_wallet_keys)?);
        let house_address = stake::parse_address("house", &config.house_address)
            .map_err(|_| Error::Configuration("house address is not a valid pubkey".into()))?;
        let engine = SettlementEngine::new(Arc::clone(&ledger), Arc::clone(&wallets), house_address);
        Ok(Self {
            config,
            wallets,
            ledger,
            engine,
            jobs,
            lobbies: LobbyDirectory::new(),
            metrics: HttpMetrics::default(),
        })
    }

    pub fn wallets(&self) -> &WalletPool {
        &self.wallets
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn engine(&self) -> &SettlementEngine {
        &self.engine
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn lobbies(&self) -> &LobbyDirectory {
        &self.lobbies
    }

    pub fn http_metrics(&self) -> &HttpMetrics {
        &self.metrics
    }

    /// Records a durable payment job for later processing instead of
    /// settling inline. The job row becomes the deduplication point for
    /// the settlement it carries.
    pub fn enqueue_settlement(&self, request: &SettlementRequest) -> Result<PaymentJob> {
        let job_type = match request {
            SettlementRequest::Payout { .. } => JobType::Payout,
            SettlementRequest::Refund { .. } => JobType::Refund,
        };
        let payload = serde_json::to_string(request)
            .map_err(|err| Error::Validation(format!("encode settlement payload: {err}")))?;
        let job = PaymentJob::new(job_type, payload, now_ms());
        self.jobs.enqueue(&job)?;
        self.metrics.inc_jobs_enqueued();
        Ok(job)
    }
}
