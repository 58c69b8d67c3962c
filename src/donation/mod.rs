use serde::{Deserialize, Serialize};

use crate::abi::{AbiValue, Address};
use crate::amount::{parse_base_units, AmountCodec, BaseUnits};
use crate::error::{LedgerError, LedgerResult};

/// One contribution to a campaign, in ledger insertion order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Donation {
    pub donator: Address,
    /// Human units, e.g. `"0.25"`.
    pub donation: String,
    #[serde(with = "crate::campaign::serde_units")]
    pub base_units: BaseUnits,
}

/// Pairs the parallel donor and amount sequences of `getDonators`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DonationAggregator {
    codec: AmountCodec,
}

impl DonationAggregator {
    pub fn new(codec: AmountCodec) -> Self {
        Self { codec }
    }

    pub fn aggregate(
        &self,
        donators: &[Address],
        amounts: &[BaseUnits],
    ) -> LedgerResult<Vec<Donation>> {
        if donators.len() != amounts.len() {
            return Err(LedgerError::DonationArityMismatch {
                donors: donators.len(),
                amounts: amounts.len(),
            });
        }
        Ok(donators
            .iter()
            .zip(amounts)
            .map(|(donator, amount)| Donation {
                donator: donator.clone(),
                donation: self.codec.decode(*amount),
                base_units: *amount,
            })
            .collect())
    }

    /// Unpacks the raw `(address[], uint256[])` view result, then aggregates.
    pub fn aggregate_raw(&self, p_id: u64, raw: &[AbiValue]) -> LedgerResult<Vec<Donation>> {
        let malformed = |reason: String| LedgerError::MalformedDonationRecord { p_id, reason };
        let (donators, amounts) = match raw {
            [AbiValue::Array(donators), AbiValue::Array(amounts)] => (donators, amounts),
            _ => {
                return Err(malformed(format!(
                    "expected (address[], uint256[]), got {} values",
                    raw.len()
                )))
            }
        };

        let donators = donators
            .iter()
            .map(|value| match value {
                AbiValue::Address(address) => Ok(address.clone()),
                other => Err(malformed(format!("donator must be address, got {}", other.abi_type()))),
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        let amounts = amounts
            .iter()
            .map(|value| match value {
                AbiValue::Uint(digits) => parse_base_units(digits)
                    .ok_or_else(|| malformed(format!("donation {digits:?} is not a non-negative integer"))),
                other => Err(malformed(format!("donation must be uint256, got {}", other.abi_type()))),
            })
            .collect::<LedgerResult<Vec<_>>>()?;

        self.aggregate(&donators, &amounts)
    }
}
