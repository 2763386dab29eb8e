use std::sync::Arc;

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use stakehouse_types::{
    split_pot, Error, Result, SettlementRequest, SettlementResult, LAMPORTS_PER_SIGNATURE,
};
use tracing::info;

use crate::ledger::Ledger;
use crate::stake::parse_address;
use crate::wallet::WalletPool;

/// Moves escrowed funds to their final destination. Stateless by design:
/// the engine trusts its caller to invoke it at most once per logical
/// match outcome, and cross-request deduplication belongs to the payment
/// job queue layered on top.
pub struct SettlementEngine {
    ledger: Arc<dyn Ledger>,
    wallets: Arc<WalletPool>,
    house_address: Pubkey,
}

impl SettlementEngine {
    pub fn new(ledger: Arc<dyn Ledger>, wallets: Arc<WalletPool>, house_address: Pubkey) -> Self {
        Self {
            ledger,
            wallets,
            house_address,
        }
    }

    /// Executes a durable settlement payload (the job queue's entry
    /// point).
    pub async fn execute(&self, request: &SettlementRequest) -> Result<SettlementResult> {
        match request {
            SettlementRequest::Payout {
                escrow,
                winner,
                total_pot,
                house_cut,
            } => self.payout(escrow, winner, *total_pot, *house_cut).await,
            SettlementRequest::Refund {
                escrow,
                recipient,
                amount,
            } => self.refund(escrow, recipient, *amount).await,
        }
    }

    /// Pays `total_pot` out of escrow: the winner leg and the house leg
    /// ride in one transaction, so a partial payout is structurally
    /// impossible.
    pub async fn payout(
        &self,
        escrow: &str,
        winner: &str,
        total_pot: u64,
        house_cut: f64,
    ) -> Result<SettlementResult> {
        let escrow = parse_address("escrow", escrow)?;
        let winner = parse_address("winner", winner)?;
        let split = split_pot(total_pot, house_cut)?;

        let mut legs = vec![(winner, split.winner)];
        if split.house > 0 {
            legs.push((self.house_address, split.house));
        }
        let signature = self.transfer_from_escrow(&escrow, &legs).await?;

        info!(
            %signature,
            %escrow,
            %winner,
            total_pot,
            winner_amount = split.winner,
            house_amount = split.house,
            "payout confirmed"
        );
        Ok(SettlementResult::Payout {
            signature: signature.to_string(),
            winner_amount: split.winner,
            house_amount: split.house,
        })
    }

    /// Returns `amount` from escrow to the player, e.g. after a cancelled
    /// match.
    pub async fn refund(
        &self,
        escrow: &str,
        recipient: &str,
        amount: u64,
    ) -> Result<SettlementResult> {
        let escrow = parse_address("escrow", escrow)?;
        let recipient = parse_address("recipient", recipient)?;
        if amount == 0 {
            return Err(Error::validation("refund amount must be positive"));
        }

        let signature = self
            .transfer_from_escrow(&escrow, &[(recipient, amount)])
            .await?;

        info!(%signature, %escrow, %recipient, amount, "refund confirmed");
        Ok(SettlementResult::Refund {
            signature: signature.to_string(),
            amount,
        })
    }

    /// Signs and submits one transaction carrying every leg, after
    /// checking the escrow holds the total plus fee headroom.
    async fn transfer_from_escrow(
        &self,
        escrow: &Pubkey,
        legs: &[(Pubkey, u64)],
    ) -> Result<Signature> {
        let wallet = self.wallets.by_address(escrow).ok_or_else(|| {
            Error::validation(format!("escrow address {escrow} has no configured wallet"))
        })?;

        // Checked: amounts come from callers and durable job payloads,
        // so a sum near u64::MAX must come back as an error, not a panic.
        let needed = legs
            .iter()
            .try_fold(0u64, |acc, (_, lamports)| acc.checked_add(*lamports))
            .and_then(|total| total.checked_add(LAMPORTS_PER_SIGNATURE))
            .ok_or_else(|| {
                Error::validation("settlement amount overflows the lamport range")
            })?;
        let balance = self.ledger.balance(escrow).await?;
        if balance < needed {
            return Err(Error::InsufficientFunds(format!(
                "escrow {escrow} holds {balance} lamports, needs {needed}"
            )));
        }

        let instructions: Vec<Instruction> = legs
            .iter()
            .map(|(recipient, lamports)| system_instruction::transfer(escrow, recipient, *lamports))
            .collect();
        let blockhash = self.ledger.latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(escrow),
            &[wallet.keypair()],
            blockhash,
        );

        self.ledger.send_and_confirm(&transaction).await
    }
}
