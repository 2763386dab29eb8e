//! Scriptable ledger for tests: balances are set directly, failures are
//! injected one-shot, and every RPC interaction is counted so tests can
//! assert that a rejected request never touched the ledger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use stakehouse_types::{Error, Result};

use crate::ledger::Ledger;

#[derive(Default)]
pub struct MockLedger {
    balances: Mutex<HashMap<Pubkey, u64>>,
    sent: Mutex<Vec<Transaction>>,
    next_send_error: Mutex<Option<Error>>,
    blockhash_calls: AtomicU64,
    balance_calls: AtomicU64,
    send_calls: AtomicU64,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.balances.lock().unwrap().insert(address, lamports);
    }

    /// The next `send_and_confirm` call fails with `error` instead of
    /// confirming.
    pub fn fail_next_send(&self, error: Error) {
        *self.next_send_error.lock().unwrap() = Some(error);
    }

    /// Transactions that reached the ledger, in submission order.
    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_calls(&self) -> u64 {
        self.send_calls.load(Ordering::Relaxed)
    }

    /// Total RPC interactions of any kind.
    pub fn total_calls(&self) -> u64 {
        self.blockhash_calls.load(Ordering::Relaxed)
            + self.balance_calls.load(Ordering::Relaxed)
            + self.send_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.blockhash_calls.fetch_add(1, Ordering::Relaxed);
        Ok(Hash::new_unique())
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64> {
        self.balance_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature> {
        self.send_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.next_send_error.lock().unwrap().take() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(transaction.clone());
        Ok(Signature::new_unique())
    }
}
