pub mod error;
pub mod job;
pub mod settlement;

pub use error::{Error, Result};
pub use job::{JobStatus, JobType, PaymentJob};
pub use settlement::{
    split_pot, PotSplit, SettlementRequest, SettlementResult, MAX_HOUSE_CUT,
};

/// Base fee (in lamports) charged per signature on a transfer transaction.
/// Used as headroom when prechecking escrow balances.
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;
