use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::abi::{AbiValue, Address};
use crate::amount::{parse_base_units, AmountCodec, BaseUnits};
use crate::error::{LedgerError, LedgerResult};

const SECONDS_PER_DAY: u64 = 86_400;

/// Application-level view of one ledger campaign.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub owner: Address,
    pub title: String,
    pub description: String,
    /// Target in human units, e.g. `"1.5"`.
    pub target: String,
    #[serde(with = "serde_units")]
    pub target_base_units: BaseUnits,
    /// Unix seconds as stored on the ledger. Values past `u64::MAX` saturate.
    pub deadline: u64,
    pub amount_collected: String,
    #[serde(with = "serde_units")]
    pub collected_base_units: BaseUnits,
    pub image: String,
    /// Position in the enumeration this record was read from.
    pub p_id: u64,
}

impl Campaign {
    /// `None` when the deadline lies beyond what chrono can represent.
    pub fn deadline_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.deadline)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    pub fn display_deadline(&self) -> String {
        match self.deadline_at() {
            Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => self.deadline.to_string(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline <= unix_seconds(now)
    }

    pub fn days_left(&self, now: DateTime<Utc>) -> u64 {
        self.deadline.saturating_sub(unix_seconds(now)) / SECONDS_PER_DAY
    }

    /// Collected over target in whole percent, capped at 100.
    pub fn funded_percent(&self) -> u8 {
        if self.target_base_units == 0 {
            return 0;
        }
        let percent = self
            .collected_base_units
            .checked_mul(100)
            .map(|scaled| scaled / self.target_base_units)
            .unwrap_or(100);
        percent.min(100) as u8
    }
}

fn unix_seconds(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp()).unwrap_or(0)
}

/// Maps raw `getCampaigns()` tuples into [`Campaign`]s.
///
/// Tuple layout: `(owner, title, description, target, deadline,
/// amountCollected, image, donators, donations)`. The donor arrays are not
/// part of the campaign model and are ignored here.
#[derive(Clone, Copy, Debug, Default)]
pub struct CampaignMapper {
    codec: AmountCodec,
}

impl CampaignMapper {
    pub fn new(codec: AmountCodec) -> Self {
        Self { codec }
    }

    pub fn map(&self, raw: &AbiValue, index: u64) -> LedgerResult<Campaign> {
        let fields = match raw {
            AbiValue::Tuple(fields) => fields,
            other => {
                return Err(LedgerError::MalformedCampaignRecord {
                    index,
                    reason: format!("expected tuple, got {}", other.abi_type()),
                })
            }
        };
        let record = FieldReader { fields, index };

        let owner = record.address(0, "owner")?;
        let title = record.string(1, "title")?;
        let description = record.string(2, "description")?;
        let target_base_units = record.uint(3, "target")?;
        let deadline = record.timestamp(4, "deadline")?;
        let collected_base_units = record.uint(5, "amountCollected")?;
        let image = record.string(6, "image")?;

        Ok(Campaign {
            owner,
            title,
            description,
            target: self.codec.decode(target_base_units),
            target_base_units,
            deadline,
            amount_collected: self.codec.decode(collected_base_units),
            collected_base_units,
            image,
            p_id: index,
        })
    }
}

struct FieldReader<'a> {
    fields: &'a [AbiValue],
    index: u64,
}

impl FieldReader<'_> {
    fn malformed(&self, reason: String) -> LedgerError {
        LedgerError::MalformedCampaignRecord {
            index: self.index,
            reason,
        }
    }

    fn field(&self, position: usize, name: &str) -> LedgerResult<&AbiValue> {
        self.fields
            .get(position)
            .ok_or_else(|| self.malformed(format!("missing field {name}")))
    }

    fn wrong_kind(&self, name: &str, expected: &str, got: &AbiValue) -> LedgerError {
        self.malformed(format!("{name} must be {expected}, got {}", got.abi_type()))
    }

    fn address(&self, position: usize, name: &str) -> LedgerResult<Address> {
        match self.field(position, name)? {
            AbiValue::Address(address) if !address.is_empty() => Ok(address.clone()),
            AbiValue::Address(_) => Err(self.malformed(format!("{name} is empty"))),
            other => Err(self.wrong_kind(name, "address", other)),
        }
    }

    fn string(&self, position: usize, name: &str) -> LedgerResult<String> {
        match self.field(position, name)? {
            AbiValue::String(value) => Ok(value.clone()),
            other => Err(self.wrong_kind(name, "string", other)),
        }
    }

    fn uint(&self, position: usize, name: &str) -> LedgerResult<BaseUnits> {
        match self.field(position, name)? {
            AbiValue::Uint(digits) => parse_base_units(digits).ok_or_else(|| {
                self.malformed(format!("{name} {digits:?} is not a non-negative integer"))
            }),
            other => Err(self.wrong_kind(name, "uint256", other)),
        }
    }

    fn timestamp(&self, position: usize, name: &str) -> LedgerResult<u64> {
        let seconds = self.uint(position, name)?;
        Ok(u64::try_from(seconds).unwrap_or(u64::MAX))
    }
}

pub(crate) mod serde_units {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::amount::{parse_base_units, BaseUnits};

    pub fn serialize<S>(value: &BaseUnits, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BaseUnits, D::Error>
    where
        D: Deserializer<'de>,
    {
        let digits = String::deserialize(deserializer)?;
        parse_base_units(&digits)
            .ok_or_else(|| D::Error::custom(format!("invalid base units {digits:?}")))
    }
}
