use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound on the house's share of a pot. A cut of 1.0 would pay the
/// winner nothing and is treated as caller error.
pub const MAX_HOUSE_CUT: f64 = 0.99;

/// An instruction to disburse escrowed funds, exactly once per logical
/// match outcome. This is also the durable payload of a payment job, so
/// addresses are carried as strings and re-validated at execution time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementRequest {
    Payout {
        escrow: String,
        winner: String,
        total_pot: u64,
        house_cut: f64,
    },
    Refund {
        escrow: String,
        recipient: String,
        amount: u64,
    },
}

/// Outcome of a confirmed settlement. A result exists if and only if the
/// ledger accepted and confirmed the transaction; absence of a signature
/// always means "not executed", never "unknown".
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementResult {
    Payout {
        signature: String,
        winner_amount: u64,
        house_amount: u64,
    },
    Refund {
        signature: String,
        amount: u64,
    },
}

impl SettlementResult {
    pub fn signature(&self) -> &str {
        match self {
            Self::Payout { signature, .. } => signature,
            Self::Refund { signature, .. } => signature,
        }
    }
}

/// A pot divided into its winner and house legs. The legs always sum to
/// the original pot exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PotSplit {
    pub winner: u64,
    pub house: u64,
}

/// Splits `total_pot` lamports between the winner and the house.
///
/// The house leg is the cut rounded to the nearest lamport; the winner
/// leg is the exact remainder, so no lamport is ever created or lost to
/// floating-point rounding.
pub fn split_pot(total_pot: u64, house_cut: f64) -> Result<PotSplit> {
    if total_pot == 0 {
        return Err(Error::validation("total pot must be positive"));
    }
    if !house_cut.is_finite() || house_cut < 0.0 || house_cut > MAX_HOUSE_CUT {
        return Err(Error::validation(format!(
            "house cut {house_cut} out of range [0, {MAX_HOUSE_CUT}]"
        )));
    }
    let house = ((total_pot as f64) * house_cut).round() as u64;
    let house = house.min(total_pot);
    Ok(PotSplit {
        winner: total_pot - house,
        house,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

    #[test]
    fn test_split_is_exact_for_valid_cuts() {
        let pots = [1u64, 2, 999, 1_000_000, 10 * LAMPORTS_PER_SOL, u64::MAX / 2];
        let cuts = [0.0, 0.01, 0.04, 0.05, 0.25, 0.5, 0.75, 0.99];
        for pot in pots {
            for cut in cuts {
                let split = split_pot(pot, cut).unwrap();
                assert_eq!(
                    split.winner + split.house,
                    pot,
                    "legs must sum to pot for pot={pot} cut={cut}"
                );
                assert!(split.house <= pot);
            }
        }
    }

    #[test]
    fn test_four_percent_cut_of_ten_sol() {
        let split = split_pot(10 * LAMPORTS_PER_SOL, 0.04).unwrap();
        // 9.6 SOL to the winner, 0.4 SOL to the house.
        assert_eq!(split.winner, 9_600_000_000);
        assert_eq!(split.house, 400_000_000);
    }

    #[test]
    fn test_zero_cut_pays_winner_everything() {
        let split = split_pot(777, 0.0).unwrap();
        assert_eq!(split.winner, 777);
        assert_eq!(split.house, 0);
    }

    #[test]
    fn test_full_cut_is_rejected() {
        let err = split_pot(100, 1.0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_out_of_range_cuts_are_rejected() {
        for cut in [-0.01, 0.991, 2.0, f64::NAN, f64::INFINITY] {
            assert!(
                split_pot(100, cut).is_err(),
                "cut {cut} should be rejected"
            );
        }
    }

    #[test]
    fn test_zero_pot_is_rejected() {
        assert!(split_pot(0, 0.05).is_err());
    }

    #[test]
    fn test_request_payload_round_trips_through_json() {
        let request = SettlementRequest::Payout {
            escrow: "escrow".into(),
            winner: "winner".into(),
            total_pot: 42,
            house_cut: 0.05,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"type\":\"payout\""));
        let decoded: SettlementRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, request);
    }
}
