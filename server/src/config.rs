use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use stakehouse_types::{Error, Result, MAX_HOUSE_CUT};

/// Immutable service configuration, constructed once at process start and
/// passed into every component explicitly. Secrets are loaded from the
/// environment, never from argv, and never appear in `Debug` output.
#[derive(Clone)]
pub struct Config {
    /// Address the HTTP API listens on.
    pub listen: SocketAddr,
    /// Ledger RPC endpoint.
    pub rpc_url: String,
    /// Path of the payment-jobs SQLite database.
    pub db_path: PathBuf,
    /// Shared secret authorizing settlement and admin calls.
    pub settlement_secret: String,
    /// Base58-encoded escrow wallet secret keys.
    pub escrow_wallet_keys: Vec<String>,
    /// Address receiving the house leg of payouts.
    pub house_address: String,
    /// House cut applied when a payout request does not carry one.
    pub default_house_cut: f64,
    /// How long a settlement call waits for ledger confirmation.
    pub confirm_timeout: Duration,
    /// Attempt ceiling for transient settlement failures; once reached
    /// the job stays failed until an operator retries it.
    pub worker_max_attempts: u32,
    /// Cadence of the payment-job worker's polling loop.
    pub worker_poll_interval: Duration,
}

impl Config {
    /// Rejects configurations that would be unsafe to boot with.
    pub fn validate(&self) -> Result<()> {
        if self.settlement_secret.trim().is_empty() {
            return Err(Error::Configuration(
                "settlement secret must not be empty".into(),
            ));
        }
        if self.escrow_wallet_keys.is_empty() {
            return Err(Error::Configuration(
                "at least one escrow wallet key is required".into(),
            ));
        }
        if self.house_address.trim().is_empty() {
            return Err(Error::Configuration("house address is required".into()));
        }
        if !self.default_house_cut.is_finite()
            || self.default_house_cut < 0.0
            || self.default_house_cut > MAX_HOUSE_CUT
        {
            return Err(Error::Configuration(format!(
                "default house cut {} out of range [0, {MAX_HOUSE_CUT}]",
                self.default_house_cut
            )));
        }
        if self.confirm_timeout.is_zero() {
            return Err(Error::Configuration(
                "confirm timeout must be positive".into(),
            ));
        }
        if self.worker_max_attempts == 0 {
            return Err(Error::Configuration(
                "worker max attempts must be positive".into(),
            ));
        }
        Ok(())
    }
}

// The settlement secret and wallet keys must not leak through debug logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen", &self.listen)
            .field("rpc_url", &self.rpc_url)
            .field("db_path", &self.db_path)
            .field("settlement_secret", &"<redacted>")
            .field("escrow_wallet_keys", &self.escrow_wallet_keys.len())
            .field("house_address", &self.house_address)
            .field("default_house_cut", &self.default_house_cut)
            .field("confirm_timeout", &self.confirm_timeout)
            .field("worker_max_attempts", &self.worker_max_attempts)
            .field("worker_poll_interval", &self.worker_poll_interval)
            .finish()
    }
}
