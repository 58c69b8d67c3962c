use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::{AbiValue, Method, CREATE_CAMPAIGN, DONATE_TO_CAMPAIGN};
use crate::amount::{AmountCodec, BaseUnits};
use crate::error::{LedgerError, LedgerResult};

/// Campaign creation form as entered by a user.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignForm {
    pub title: String,
    pub description: String,
    /// Decimal target, e.g. `"1.5"`.
    pub target: String,
    /// Calendar date (`2030-01-01`), local-style date time
    /// (`2030-01-01T12:00`) read as UTC, or RFC 3339.
    pub deadline: String,
    pub image: String,
}

/// A write that has been built but not yet submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRequest {
    pub method: Method,
    pub params: Vec<AbiValue>,
    /// Base units attached to a payable call; zero otherwise.
    pub value: BaseUnits,
}

impl MutationRequest {
    pub fn signature(&self) -> &'static str {
        self.method.signature
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TransactionBuilder {
    codec: AmountCodec,
}

impl TransactionBuilder {
    pub fn new(codec: AmountCodec) -> Self {
        Self { codec }
    }

    pub fn build_create_campaign(
        &self,
        owner: &str,
        form: &CampaignForm,
    ) -> LedgerResult<MutationRequest> {
        self.build_create_campaign_at(owner, form, Utc::now())
    }

    /// Same as [`Self::build_create_campaign`] with an explicit call time.
    /// The deadline must fall strictly after `now` at whole-second granularity.
    pub fn build_create_campaign_at(
        &self,
        owner: &str,
        form: &CampaignForm,
        now: DateTime<Utc>,
    ) -> LedgerResult<MutationRequest> {
        if owner.is_empty() {
            return Err(LedgerError::Unauthenticated);
        }
        let target = self.codec.encode(&form.target)?;
        let deadline = parse_deadline(&form.deadline)?.timestamp();
        if deadline <= now.timestamp() {
            return Err(LedgerError::InvalidDeadline {
                input: form.deadline.clone(),
                reason: format!("{deadline} is not after {}", now.timestamp()),
            });
        }

        let params = vec![
            AbiValue::Address(owner.to_string()),
            AbiValue::String(form.title.clone()),
            AbiValue::String(form.description.clone()),
            AbiValue::uint(target),
            AbiValue::Uint(deadline.to_string()),
            AbiValue::String(form.image.clone()),
        ];
        CREATE_CAMPAIGN.check_params(&params)?;
        debug!(method = CREATE_CAMPAIGN.signature, deadline, "built mutation");
        Ok(MutationRequest {
            method: CREATE_CAMPAIGN,
            params,
            value: 0,
        })
    }

    pub fn build_donate(&self, p_id: u64, amount: &str) -> LedgerResult<MutationRequest> {
        let invalid = || LedgerError::InvalidDonationAmount {
            input: amount.to_string(),
        };
        if amount.starts_with('-') {
            return Err(invalid());
        }
        let value = self.codec.encode(amount)?;
        if value == 0 {
            return Err(invalid());
        }
        debug!(method = DONATE_TO_CAMPAIGN.signature, p_id, "built mutation");
        Ok(MutationRequest {
            method: DONATE_TO_CAMPAIGN,
            params: vec![AbiValue::uint(p_id)],
            value,
        })
    }
}

/// Parses a deadline into a UTC instant, flooring to whole seconds.
pub fn parse_deadline(input: &str) -> LedgerResult<DateTime<Utc>> {
    let trimmed = input.trim();
    let parsed = DateTime::parse_from_rfc3339(trimmed)
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        });
    parsed.ok_or_else(|| LedgerError::InvalidDeadline {
        input: input.to_string(),
        reason: "not a calendar date or date time".to_string(),
    })
}
