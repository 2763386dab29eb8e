use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use stakehouse_types::{Error, Result};

/// A custodial escrow account with server-held signing capability.
///
/// The keypair never leaves this module except through
/// [`EscrowWallet::keypair`], which is crate-private so signing stays
/// inside the settlement engine's trust boundary.
pub struct EscrowWallet {
    id: String,
    keypair: Keypair,
    active: bool,
}

impl EscrowWallet {
    fn from_base58(id: String, secret: &str) -> Result<Self> {
        let bytes = solana_sdk::bs58::decode(secret.trim())
            .into_vec()
            .map_err(|_| {
                Error::Configuration(format!("escrow wallet {id}: secret is not valid base58"))
            })?;
        let keypair = Keypair::from_bytes(&bytes).map_err(|_| {
            Error::Configuration(format!("escrow wallet {id}: secret is not a valid keypair"))
        })?;
        Ok(Self {
            id,
            keypair,
            active: true,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

// Manual impl: the signing secret must never appear in logs.
impl fmt::Debug for EscrowWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscrowWallet")
            .field("id", &self.id)
            .field("address", &self.address())
            .field("active", &self.active)
            .finish()
    }
}

/// Rotates stake requests across the configured escrow wallets to spread
/// custody risk. Selection is a relaxed atomic round-robin: concurrent
/// callers may receive the same wallet, which is legal because
/// correctness rests on ledger balances rather than in-memory
/// bookkeeping.
#[derive(Debug)]
pub struct WalletPool {
    wallets: Vec<EscrowWallet>,
    cursor: AtomicUsize,
}

impl WalletPool {
    /// Builds the pool from base58-encoded secret keys. Wallet ids are
    /// positional (`escrow-0`, `escrow-1`, ...).
    pub fn from_base58_keys(keys: &[String]) -> Result<Self> {
        let wallets = keys
            .iter()
            .enumerate()
            .map(|(index, secret)| EscrowWallet::from_base58(format!("escrow-{index}"), secret))
            .collect::<Result<Vec<_>>>()?;
        Self::new(wallets)
    }

    pub fn new(wallets: Vec<EscrowWallet>) -> Result<Self> {
        if !wallets.iter().any(|wallet| wallet.active) {
            return Err(Error::Configuration(
                "no active escrow wallet configured".into(),
            ));
        }
        Ok(Self {
            wallets,
            cursor: AtomicUsize::new(0),
        })
    }

    /// One wallet eligible to receive stakes, chosen round-robin over the
    /// active set.
    pub fn active(&self) -> Result<&EscrowWallet> {
        let active: Vec<&EscrowWallet> = self
            .wallets
            .iter()
            .filter(|wallet| wallet.active)
            .collect();
        if active.is_empty() {
            return Err(Error::Configuration(
                "no active escrow wallet configured".into(),
            ));
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % active.len();
        Ok(active[index])
    }

    /// Lookup by public address, used by the settlement engine to find
    /// the signing keypair for a funded escrow account.
    pub fn by_address(&self, address: &Pubkey) -> Option<&EscrowWallet> {
        self.wallets
            .iter()
            .find(|wallet| wallet.address() == *address)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
