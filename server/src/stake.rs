use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use base64::{engine::general_purpose, Engine as _};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use stakehouse_types::{Error, Result};

/// A joinable match with a fixed per-player stake. Zero-stake lobbies are
/// free matches and never produce an on-chain transaction.
#[derive(Clone, Debug)]
pub struct Lobby {
    pub id: String,
    pub stake_lamports: u64,
}

/// In-memory lobby registry fed by the embedding product. Lobby lifecycle
/// (creation, matchmaking, teardown) is product glue; the stake endpoint
/// only needs to resolve an id to a stake amount.
#[derive(Default)]
pub struct LobbyDirectory {
    inner: RwLock<HashMap<String, Lobby>>,
}

impl LobbyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, lobby: Lobby) {
        self.inner
            .write()
            .unwrap()
            .insert(lobby.id.clone(), lobby);
    }

    pub fn get(&self, id: &str) -> Option<Lobby> {
        self.inner.read().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Lobby> {
        self.inner.write().unwrap().remove(id)
    }
}

/// Parses a base58 address, rejecting malformed input before it reaches
/// the ledger. Syntax only; unfunded accounts are legal.
pub fn parse_address(label: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value.trim())
        .map_err(|_| Error::validation(format!("{label} is not a valid address: {value}")))
}

/// Builds the unsigned player→escrow transfer for the client to sign and
/// submit. Purely functional: the only external input is the recent
/// blockhash the caller already fetched.
pub fn build_stake_transaction(
    player: &Pubkey,
    escrow: &Pubkey,
    lamports: u64,
    recent_blockhash: Hash,
) -> Result<Transaction> {
    if lamports == 0 {
        return Err(Error::validation(
            "stake amount must be positive; free matches skip transaction construction",
        ));
    }
    if player == escrow {
        return Err(Error::validation(
            "player and escrow addresses must differ",
        ));
    }
    let instruction = system_instruction::transfer(player, escrow, lamports);
    let mut transaction = Transaction::new_with_payer(&[instruction], Some(player));
    transaction.message.recent_blockhash = recent_blockhash;
    Ok(transaction)
}

/// Wire encoding handed to the client: bincode (the ledger's transaction
/// format) wrapped in base64.
pub fn encode_unsigned(transaction: &Transaction) -> Result<String> {
    let bytes = bincode::serialize(transaction)
        .map_err(|err| Error::Validation(format!("serialize transaction: {err}")))?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Keypair;
    use solana_sdk::signer::Signer;

    #[test]
    fn test_short_address_is_rejected() {
        assert!(matches!(
            parse_address("player", "abc").unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[test]
    fn test_valid_address_parses() {
        let address = Keypair::new().pubkey();
        assert_eq!(
            parse_address("player", &address.to_string()).unwrap(),
            address
        );
    }

    #[test]
    fn test_zero_stake_never_builds_a_transaction() {
        let player = Pubkey::new_unique();
        let escrow = Pubkey::new_unique();
        assert!(build_stake_transaction(&player, &escrow, 0, Hash::new_unique()).is_err());
    }

    #[test]
    fn test_stake_transaction_is_one_transfer_paid_by_player() {
        let player = Pubkey::new_unique();
        let escrow = Pubkey::new_unique();
        let blockhash = Hash::new_unique();
        let transaction =
            build_stake_transaction(&player, &escrow, 1_000_000, blockhash).unwrap();
        assert_eq!(transaction.message.instructions.len(), 1);
        assert_eq!(transaction.message.account_keys[0], player);
        assert_eq!(transaction.message.recent_blockhash, blockhash);
        // Unsigned: the client signs.
        assert!(transaction.signatures.iter().all(|sig| *sig == Default::default()));
    }

    #[test]
    fn test_encoding_round_trips() {
        let player = Pubkey::new_unique();
        let escrow = Pubkey::new_unique();
        let transaction =
            build_stake_transaction(&player, &escrow, 42, Hash::new_unique()).unwrap();
        let encoded = encode_unsigned(&transaction).unwrap();
        let bytes = general_purpose::STANDARD.decode(encoded).unwrap();
        let decoded: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, transaction);
    }

    #[test]
    fn test_lobby_directory_lookup() {
        let lobbies = LobbyDirectory::new();
        lobbies.insert(Lobby {
            id: "lobby-1".into(),
            stake_lamports: 500,
        });
        assert_eq!(lobbies.get("lobby-1").unwrap().stake_lamports, 500);
        assert!(lobbies.get("lobby-2").is_none());
        lobbies.remove("lobby-1");
        assert!(lobbies.get("lobby-1").is_none());
    }
}
