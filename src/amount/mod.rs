use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Integer count of the ledger's smallest indivisible unit.
pub type BaseUnits = u128;

pub const ETHER_DECIMALS: u32 = 18; // 1 ETH = 1e18 wei
pub const MAX_DECIMALS: u32 = 38; // 10^38 is the largest power of ten below 2^128

/// Converts human decimal amounts to and from fixed-point base units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountCodec {
    decimals: u32,
}

impl Default for AmountCodec {
    fn default() -> Self {
        Self {
            decimals: ETHER_DECIMALS,
        }
    }
}

impl AmountCodec {
    /// Returns `None` when `decimals` exceeds what a 128-bit register can scale.
    pub fn new(decimals: u32) -> Option<Self> {
        (decimals <= MAX_DECIMALS).then_some(Self { decimals })
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    fn scale(&self) -> BaseUnits {
        10u128.pow(self.decimals)
    }

    /// Parses a plain decimal such as `"1.5"` into base units.
    ///
    /// No sign, no exponent, no surrounding whitespace. Both the integer and
    /// the fractional part (when a `.` is present) need at least one digit.
    /// Trailing fractional zeros beyond the exponent are accepted since they
    /// carry no value; any other excess digit is rejected rather than rounded.
    pub fn encode(&self, input: &str) -> LedgerResult<BaseUnits> {
        let invalid = |reason| LedgerError::InvalidAmountFormat {
            input: input.to_string(),
            reason,
        };
        let out_of_range = || LedgerError::AmountOutOfRange {
            input: input.to_string(),
        };

        let (whole, fraction) = match input.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (input, None),
        };
        if whole.is_empty() {
            return Err(invalid("missing integer part"));
        }
        if !is_digits(whole) {
            return Err(invalid("integer part must be decimal digits"));
        }
        let fraction = match fraction {
            Some("") => return Err(invalid("missing fractional digits")),
            Some(fraction) if !is_digits(fraction) => {
                return Err(invalid("fractional part must be decimal digits"))
            }
            Some(fraction) => fraction,
            None => "",
        };

        let significant = fraction.trim_end_matches('0');
        if significant.len() > self.decimals as usize {
            return Err(LedgerError::PrecisionLoss {
                input: input.to_string(),
                decimals: self.decimals,
            });
        }

        let whole_units = parse_base_units(whole)
            .and_then(|w| w.checked_mul(self.scale()))
            .ok_or_else(out_of_range)?;
        let padding = self.decimals - significant.len() as u32;
        let fraction_units = match significant {
            "" => 0,
            digits => parse_base_units(digits).ok_or_else(out_of_range)? * 10u128.pow(padding),
        };
        whole_units
            .checked_add(fraction_units)
            .ok_or_else(out_of_range)
    }

    /// Renders base units as the shortest decimal string that encodes back to them.
    pub fn decode(&self, units: BaseUnits) -> String {
        let scale = self.scale();
        let whole = units / scale;
        let fraction = units % scale;
        if fraction == 0 {
            return whole.to_string();
        }
        let digits = format!("{:0width$}", fraction, width = self.decimals as usize);
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }

    /// Canonical spelling of a decimal input: `"001.50"` becomes `"1.5"`.
    pub fn canonicalize(&self, input: &str) -> LedgerResult<String> {
        self.encode(input).map(|units| self.decode(units))
    }
}

/// Parses an unsigned decimal integer as the ledger serializes `uint256`.
/// Returns `None` for empty input, non-digits, or values beyond 128 bits.
pub fn parse_base_units(digits: &str) -> Option<BaseUnits> {
    if !is_digits(digits) {
        return None;
    }
    digits.bytes().try_fold(0u128, |acc, b| {
        acc.checked_mul(10)?.checked_add(u128::from(b - b'0'))
    })
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
