use std::time::Duration;

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use stakehouse_types::{Error, Result};
use tracing::warn;

/// How often the ledger is polled while waiting for a submitted
/// transaction to confirm.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The settlement engine's view of the ledger. Kept minimal so the engine
/// stays a stateless "move funds" primitive and tests can script the
/// ledger's behavior.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// A recent blockhash anchoring transaction validity.
    async fn latest_blockhash(&self) -> Result<Hash>;

    /// Current lamport balance of an account. Unfunded accounts are legal
    /// and report zero.
    async fn balance(&self, address: &Pubkey) -> Result<u64>;

    /// Submits a signed transaction and blocks until the ledger confirms
    /// it. A confirmation timeout yields `Error::Transient` carrying the
    /// already-submitted signature; the transaction may still land, and
    /// only an operator consulting the ledger can tell.
    async fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature>;
}

/// Production ledger backed by a Solana JSON-RPC node.
pub struct SolanaLedger {
    rpc: RpcClient,
    confirm_timeout: Duration,
}

impl SolanaLedger {
    pub fn new(rpc_url: String, confirm_timeout: Duration) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed()),
            confirm_timeout,
        }
    }
}

#[async_trait]
impl Ledger for SolanaLedger {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(classify_client_error)
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64> {
        self.rpc
            .get_balance(address)
            .await
            .map_err(classify_client_error)
    }

    async fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature> {
        let signature = self
            .rpc
            .send_transaction(transaction)
            .await
            .map_err(classify_client_error)?;

        let confirmed = tokio::time::timeout(self.confirm_timeout, async {
            loop {
                match self.rpc.confirm_transaction(&signature).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => tokio::time::sleep(CONFIRM_POLL_INTERVAL).await,
                    Err(err) => return Err(classify_client_error(err)),
                }
            }
        })
        .await;

        match confirmed {
            Ok(Ok(())) => Ok(signature),
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!(%signature, "confirmation timed out; outcome unknown");
                Err(Error::Transient(format!(
                    "confirmation timed out after {:?}; submitted signature {signature} \
                     must be reconciled against the ledger before retrying",
                    self.confirm_timeout
                )))
            }
        }
    }
}

/// Maps an RPC client error onto the settlement taxonomy: an explicit
/// ledger rejection is a `SettlementFailure` needing inspection, while
/// transport failures are `Transient` and safe for the job queue to
/// retry.
fn classify_client_error(err: ClientError) -> Error {
    match err.kind() {
        ClientErrorKind::TransactionError(tx_err) => {
            Error::SettlementFailure(format!("ledger rejected transaction: {tx_err}"))
        }
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            data: RpcResponseErrorData::SendTransactionPreflightFailure(simulation),
            ..
        }) => match &simulation.err {
            Some(tx_err) => {
                Error::SettlementFailure(format!("preflight rejected transaction: {tx_err}"))
            }
            None => Error::Transient(format!("preflight failed: {err}")),
        },
        ClientErrorKind::SigningError(sign_err) => {
            Error::Configuration(format!("signing failed: {sign_err}"))
        }
        _ => Error::Transient(format!("rpc: {err}")),
    }
}
