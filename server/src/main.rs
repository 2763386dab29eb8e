use anyhow::{Context, Result};
use clap::Parser;
use stakehouse_server::{Api, Config, JobStore, JobWorker, Ledger, Service, SolanaLedger};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stakehouse-server", about = "Escrow settlement service")]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Ledger RPC endpoint.
    #[arg(long, default_value = "https://api.devnet.solana.com")]
    rpc_url: String,

    /// Path to the SQLite database holding payment jobs.
    #[arg(long, default_value = "payment_jobs.db")]
    db_path: PathBuf,

    /// Address receiving the house leg of payouts.
    #[arg(long)]
    house_address: String,

    /// House cut applied when a payout request does not carry one.
    #[arg(long, default_value_t = 0.04)]
    house_cut: f64,

    /// How long a settlement call waits for ledger confirmation, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    confirm_timeout_ms: u64,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();
}

fn env_list(var: &str) -> Vec<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

fn build_config(args: &Args, secret: String, wallet_keys: Vec<String>) -> Result<Config> {
    let worker_max_attempts = std::env::var("WORKER_MAX_ATTEMPTS")
        .ok()
        .map(|value| {
            value
                .parse::<u32>()
                .with_context(|| format!("invalid WORKER_MAX_ATTEMPTS: {value}"))
        })
        .transpose()?
        .unwrap_or(3);
    let worker_poll_ms = std::env::var("WORKER_POLL_MS")
        .ok()
        .map(|value| {
            value
                .parse::<u64>()
                .with_context(|| format!("invalid WORKER_POLL_MS: {value}"))
        })
        .transpose()?
        .unwrap_or(2_000);

    let config = Config {
        listen: SocketAddr::new(args.host, args.port),
        rpc_url: args.rpc_url.clone(),
        db_path: args.db_path.clone(),
        settlement_secret: secret,
        escrow_wallet_keys: wallet_keys,
        house_address: args.house_address.clone(),
        default_house_cut: args.house_cut,
        confirm_timeout: Duration::from_millis(args.confirm_timeout_ms),
        worker_max_attempts,
        worker_poll_interval: Duration::from_millis(worker_poll_ms.max(1)),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing();

    // Secrets come from the environment only, never argv.
    let secret =
        std::env::var("SETTLEMENT_SECRET").context("SETTLEMENT_SECRET must be set")?;
    let wallet_keys = env_list("ESCROW_WALLET_KEYS");
    let config = build_config(&args, secret, wallet_keys)?;

    let ledger: Arc<dyn Ledger> =
        Arc::new(SolanaLedger::new(config.rpc_url.clone(), config.confirm_timeout));
    let jobs = JobStore::open(&config.db_path).context("open payment-job store")?;
    let service = Arc::new(Service::new(config, ledger, jobs)?);
    info!(
        wallets = service.wallets().len(),
        listen = %service.config.listen,
        "settlement service configured"
    );

    let worker = JobWorker::new(service.clone());
    tokio::spawn(async move { worker.run().await });

    let api = Api::new(service.clone());
    let app = api.router();

    let addr = service.config.listen;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from([
            "stakehouse-server",
            "--house-address",
            "11111111111111111111111111111111",
        ])
    }

    #[test]
    fn test_build_config_defaults() {
        let args = base_args();
        let config = build_config(&args, "secret".into(), vec!["key".into()]).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.default_house_cut, 0.04);
        assert_eq!(config.confirm_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_build_config_rejects_missing_wallets() {
        let args = base_args();
        let err = build_config(&args, "secret".into(), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("configuration"), "{err}");
    }

    #[test]
    fn test_env_list_splits_and_trims() {
        std::env::set_var("TEST_ESCROW_KEYS_SPLIT", " a , b ,,c ");
        assert_eq!(env_list("TEST_ESCROW_KEYS_SPLIT"), vec!["a", "b", "c"]);
        assert!(env_list("TEST_ESCROW_KEYS_SPLIT_UNSET").is_empty());
    }
}
