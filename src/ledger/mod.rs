//! In-memory campaign ledger.
//!
//! Emulates the deployed crowdfunding contract closely enough to drive the
//! gateway end to end: same method signatures, same view shapes, same
//! revert on past deadlines. State snapshots carry a Merkle root so a
//! persisted snapshot can be checked on reload.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::abi::{
    AbiValue, Address, ReadCall, CREATE_CAMPAIGN, DONATE_TO_CAMPAIGN, GET_CAMPAIGNS, GET_DONATORS,
};
use crate::amount::{parse_base_units, BaseUnits};
use crate::error::BackendError;
use crate::gateway::{LedgerBackend, TransactionId};
use crate::transaction::MutationRequest;

pub const PAST_DEADLINE: &str = "The deadline should be a date in the future.";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("state root mismatch: snapshot says {expected}, campaigns hash to {actual}")]
    RootMismatch { expected: String, actual: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignState {
    pub owner: Address,
    pub title: String,
    pub description: String,
    pub target: BaseUnits,
    pub deadline: u64,
    pub amount_collected: BaseUnits,
    pub image: String,
    pub donators: Vec<Address>,
    pub donations: Vec<BaseUnits>,
}

impl CampaignState {
    fn to_abi(&self) -> AbiValue {
        AbiValue::Tuple(vec![
            AbiValue::Address(self.owner.clone()),
            AbiValue::String(self.title.clone()),
            AbiValue::String(self.description.clone()),
            AbiValue::uint(self.target),
            AbiValue::uint(self.deadline),
            AbiValue::uint(self.amount_collected),
            AbiValue::String(self.image.clone()),
            AbiValue::Array(self.donators.iter().cloned().map(AbiValue::Address).collect()),
            AbiValue::Array(self.donations.iter().map(|d| AbiValue::uint(*d)).collect()),
        ])
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    CampaignCreated {
        p_id: u64,
        owner: Address,
        #[serde(with = "crate::campaign::serde_units")]
        target: BaseUnits,
        deadline: u64,
        tx: TransactionId,
    },
    DonationReceived {
        p_id: u64,
        donator: Address,
        #[serde(with = "crate::campaign::serde_units")]
        amount: BaseUnits,
        tx: TransactionId,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    pub height: u64,
    pub timestamp: u64,
    pub previous_tx: Option<TransactionId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub campaigns: Vec<CampaignState>,
    pub events: Vec<LedgerEvent>,
    pub state_root: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    meta: SnapshotMetadata,
    campaigns: Vec<CampaignState>,
    events: Vec<LedgerEvent>,
    /// Fixed clock in Unix seconds; wall clock when unset.
    clock: Option<u64>,
}

impl LedgerState {
    fn now(&self) -> u64 {
        self.clock
            .unwrap_or_else(|| u64::try_from(Utc::now().timestamp()).unwrap_or(0))
    }

    fn transaction_id(&self, sender: &str, request: &MutationRequest) -> TransactionId {
        let mut hasher = Sha256::new();
        hasher.update(b"tx");
        hasher.update(self.meta.height.to_le_bytes());
        hasher.update(sender.as_bytes());
        hasher.update(request.signature().as_bytes());
        for param in &request.params {
            hasher.update(serde_json::to_vec(param).unwrap_or_default());
        }
        hasher.update(request.value.to_le_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    fn apply(
        &mut self,
        sender: &str,
        request: &MutationRequest,
    ) -> Result<TransactionId, BackendError> {
        request
            .method
            .check_params(&request.params)
            .map_err(|err| BackendError::Reverted(err.to_string()))?;
        let now = self.now();
        let tx = self.transaction_id(sender, request);

        let event = match request.signature() {
            sig if sig == CREATE_CAMPAIGN.signature => {
                if request.value != 0 {
                    return Err(revert("createCampaign is not payable"));
                }
                let campaign = decode_create(&request.params)?;
                if campaign.deadline <= now {
                    return Err(revert(PAST_DEADLINE));
                }
                let p_id = self.campaigns.len() as u64;
                let event = LedgerEvent::CampaignCreated {
                    p_id,
                    owner: campaign.owner.clone(),
                    target: campaign.target,
                    deadline: campaign.deadline,
                    tx: tx.clone(),
                };
                self.campaigns.push(campaign);
                debug!(p_id, %tx, "campaign created");
                event
            }
            sig if sig == DONATE_TO_CAMPAIGN.signature => {
                let p_id = u64::try_from(uint_param(&request.params, 0)?)
                    .map_err(|_| revert("campaign does not exist"))?;
                if request.value == 0 {
                    return Err(revert("donation must carry value"));
                }
                let campaign = usize::try_from(p_id)
                    .ok()
                    .and_then(|idx| self.campaigns.get_mut(idx))
                    .ok_or_else(|| revert("campaign does not exist"))?;
                campaign.amount_collected = campaign
                    .amount_collected
                    .checked_add(request.value)
                    .ok_or_else(|| revert("amount collected overflow"))?;
                campaign.donators.push(sender.to_string());
                campaign.donations.push(request.value);
                debug!(p_id, %tx, "donation received");
                LedgerEvent::DonationReceived {
                    p_id,
                    donator: sender.to_string(),
                    amount: request.value,
                    tx: tx.clone(),
                }
            }
            other => return Err(revert(&format!("unknown method {other}"))),
        };

        self.events.push(event);
        self.meta.height += 1;
        self.meta.timestamp = now;
        self.meta.previous_tx = Some(tx.clone());
        Ok(tx)
    }

    fn view(&self, call: &ReadCall) -> Result<Vec<AbiValue>, BackendError> {
        call.method
            .check_params(&call.params)
            .map_err(|err| BackendError::Reverted(err.to_string()))?;
        match call.method.signature {
            sig if sig == GET_CAMPAIGNS.signature => Ok(vec![AbiValue::Array(
                self.campaigns.iter().map(CampaignState::to_abi).collect(),
            )]),
            sig if sig == GET_DONATORS.signature => {
                let p_id = uint_param(&call.params, 0)?;
                // Unknown ids read as an empty campaign, like an unset mapping slot.
                let (donators, donations) = usize::try_from(p_id)
                    .ok()
                    .and_then(|idx| self.campaigns.get(idx))
                    .map(|c| (c.donators.clone(), c.donations.clone()))
                    .unwrap_or_default();
                Ok(vec![
                    AbiValue::Array(donators.into_iter().map(AbiValue::Address).collect()),
                    AbiValue::Array(donations.into_iter().map(AbiValue::uint).collect()),
                ])
            }
            other => Err(revert(&format!("unknown view {other}"))),
        }
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            campaigns: self.campaigns.clone(),
            events: self.events.clone(),
            state_root: hex::encode(compute_state_root(&self.campaigns)),
        }
    }
}

/// Shared in-memory ledger. Submissions are serialized by a write lock,
/// which stands in for block ordering.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    fail_mode: AtomicBool,
    cancel_mode: AtomicBool,
    submit_delay_ms: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger whose clock is pinned to `now` (Unix seconds).
    pub fn with_clock(now: u64) -> Self {
        Self {
            state: RwLock::new(LedgerState {
                clock: Some(now),
                ..LedgerState::default()
            }),
            ..Self::default()
        }
    }

    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self, SnapshotError> {
        let actual = hex::encode(compute_state_root(&snapshot.campaigns));
        if !actual.eq_ignore_ascii_case(&snapshot.state_root) {
            return Err(SnapshotError::RootMismatch {
                expected: snapshot.state_root,
                actual,
            });
        }
        let state = LedgerState {
            meta: snapshot.meta,
            campaigns: snapshot.campaigns,
            events: snapshot.events,
            clock: None,
        };
        Ok(Self {
            state: RwLock::new(state),
            ..Self::default()
        })
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn set_clock(&self, now: u64) {
        self.state.write().await.clock = Some(now);
    }

    /// Simulate an unreachable backend.
    pub fn set_fail_mode(&self, fail: bool) {
        self.fail_mode.store(fail, Ordering::SeqCst);
    }

    /// Simulate the account holder declining every signature request.
    pub fn set_cancel_mode(&self, cancel: bool) {
        self.cancel_mode.store(cancel, Ordering::SeqCst);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.submit_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<LedgerEvent> {
        self.state.read().await.events.clone()
    }
}

#[async_trait]
impl LedgerBackend for MemoryLedger {
    async fn submit(
        &self,
        sender: &str,
        request: &MutationRequest,
    ) -> Result<TransactionId, BackendError> {
        if self.fail_mode.load(Ordering::SeqCst) {
            return Err(BackendError::Network("memory ledger in failure mode".to_string()));
        }
        if self.cancel_mode.load(Ordering::SeqCst) {
            return Err(BackendError::Cancelled);
        }
        let delay = self.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.state.write().await.apply(sender, request)
    }

    async fn read(&self, call: &ReadCall) -> Result<Vec<AbiValue>, BackendError> {
        if self.fail_mode.load(Ordering::SeqCst) {
            return Err(BackendError::Network("memory ledger in failure mode".to_string()));
        }
        self.state.read().await.view(call)
    }
}

fn revert(reason: &str) -> BackendError {
    BackendError::Reverted(reason.to_string())
}

fn uint_param(params: &[AbiValue], position: usize) -> Result<BaseUnits, BackendError> {
    match params.get(position) {
        Some(AbiValue::Uint(digits)) => {
            parse_base_units(digits).ok_or_else(|| revert("uint256 parameter out of range"))
        }
        _ => Err(revert("missing uint256 parameter")),
    }
}

fn decode_create(params: &[AbiValue]) -> Result<CampaignState, BackendError> {
    let text = |position: usize| match params.get(position) {
        Some(AbiValue::String(value)) | Some(AbiValue::Address(value)) => Ok(value.clone()),
        _ => Err(revert("malformed createCampaign parameters")),
    };
    let deadline = u64::try_from(uint_param(params, 4)?)
        .map_err(|_| revert("deadline out of range"))?;
    Ok(CampaignState {
        owner: text(0)?,
        title: text(1)?,
        description: text(2)?,
        target: uint_param(params, 3)?,
        deadline,
        amount_collected: 0,
        image: text(5)?,
        donators: Vec::new(),
        donations: Vec::new(),
    })
}

fn compute_state_root(campaigns: &[CampaignState]) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = campaigns
        .iter()
        .enumerate()
        .map(|(p_id, campaign)| {
            let mut hasher = Sha256::new();
            hasher.update(b"campaign");
            hasher.update((p_id as u64).to_le_bytes());
            hasher.update(campaign.owner.as_bytes());
            hasher.update(campaign.title.as_bytes());
            hasher.update(campaign.description.as_bytes());
            hasher.update(campaign.target.to_le_bytes());
            hasher.update(campaign.deadline.to_le_bytes());
            hasher.update(campaign.amount_collected.to_le_bytes());
            hasher.update(campaign.image.as_bytes());
            for (donator, amount) in campaign.donators.iter().zip(&campaign.donations) {
                hasher.update(donator.as_bytes());
                hasher.update(amount.to_le_bytes());
            }
            hasher.finalize().into()
        })
        .collect();
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"campaign-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{CampaignForm, TransactionBuilder};

    const NOW: u64 = 1_700_000_000;

    fn create_request(owner: &str, deadline: &str) -> MutationRequest {
        let form = CampaignForm {
            title: "Library".into(),
            description: "Books for the school".into(),
            target: "2".into(),
            deadline: deadline.into(),
            image: "ipfs://books".into(),
        };
        let now = chrono::DateTime::<Utc>::from_timestamp(NOW as i64, 0).unwrap();
        TransactionBuilder::default()
            .build_create_campaign_at(owner, &form, now)
            .unwrap()
    }

    #[tokio::test]
    async fn applying_writes_updates_campaigns_and_events() {
        let ledger = MemoryLedger::with_clock(NOW);
        let tx = ledger
            .submit("0xowner", &create_request("0xowner", "2030-01-01"))
            .await
            .unwrap();
        assert!(tx.starts_with("0x") && tx.len() == 66);

        let donate = TransactionBuilder::default().build_donate(0, "0.5").unwrap();
        ledger.submit("0xdonor", &donate).await.unwrap();
        ledger.submit("0xdonor", &donate).await.unwrap();

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.meta.height, 3);
        assert_eq!(snapshot.campaigns[0].amount_collected, 1_000_000_000_000_000_000);
        assert_eq!(snapshot.campaigns[0].donators, vec!["0xdonor", "0xdonor"]);
        assert_eq!(snapshot.events.len(), 3);
    }

    #[tokio::test]
    async fn contract_rules_revert() {
        let ledger = MemoryLedger::with_clock(NOW);
        let request = create_request("0xowner", "2030-01-01");
        ledger.set_clock(1_893_456_000).await;
        assert_eq!(
            ledger.submit("0xowner", &request).await.unwrap_err(),
            BackendError::Reverted(PAST_DEADLINE.to_string())
        );

        let donate = TransactionBuilder::default().build_donate(9, "1").unwrap();
        assert!(matches!(
            ledger.submit("0xdonor", &donate).await,
            Err(BackendError::Reverted(_))
        ));

        let mut zero_value = donate.clone();
        zero_value.value = 0;
        assert!(ledger.submit("0xdonor", &zero_value).await.is_err());
        assert_eq!(ledger.snapshot().await.meta.height, 0);
    }

    #[tokio::test]
    async fn views_match_wire_shapes() {
        let ledger = MemoryLedger::with_clock(NOW);
        ledger
            .submit("0xowner", &create_request("0xowner", "2030-01-01"))
            .await
            .unwrap();
        let campaigns = ledger
            .read(&ReadCall::new(GET_CAMPAIGNS, vec![]))
            .await
            .unwrap();
        match campaigns.as_slice() {
            [AbiValue::Array(items)] => match &items[0] {
                AbiValue::Tuple(fields) => assert_eq!(fields.len(), 9),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }

        let unknown = ledger
            .read(&ReadCall::new(GET_DONATORS, vec![AbiValue::uint(42u64)]))
            .await
            .unwrap();
        assert_eq!(unknown, vec![AbiValue::Array(vec![]), AbiValue::Array(vec![])]);
    }

    #[tokio::test]
    async fn snapshot_root_is_checked_on_restore() {
        let ledger = MemoryLedger::with_clock(NOW);
        ledger
            .submit("0xowner", &create_request("0xowner", "2030-01-01"))
            .await
            .unwrap();
        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.state_root, ledger.snapshot().await.state_root);

        let restored = MemoryLedger::restore(snapshot.clone()).unwrap();
        assert_eq!(restored.snapshot().await.campaigns, snapshot.campaigns);

        let mut tampered = snapshot;
        tampered.campaigns[0].amount_collected = 99;
        assert!(matches!(
            MemoryLedger::restore(tampered),
            Err(SnapshotError::RootMismatch { .. })
        ));
    }

    #[test]
    fn oversized_submit_delay_saturates() {
        let ledger = MemoryLedger::with_clock(NOW);
        ledger.set_submit_delay(Duration::MAX);
        assert_eq!(ledger.submit_delay_ms.load(Ordering::SeqCst), u64::MAX);
        ledger.set_submit_delay(Duration::from_millis(1_500));
        assert_eq!(ledger.submit_delay_ms.load(Ordering::SeqCst), 1_500);
    }

    #[tokio::test]
    async fn failure_and_cancel_modes() {
        let ledger = MemoryLedger::with_clock(NOW);
        let request = create_request("0xowner", "2030-01-01");
        ledger.set_fail_mode(true);
        assert!(matches!(
            ledger.submit("0xowner", &request).await,
            Err(BackendError::Network(_))
        ));
        ledger.set_fail_mode(false);
        ledger.set_cancel_mode(true);
        assert_eq!(
            ledger.submit("0xowner", &request).await.unwrap_err(),
            BackendError::Cancelled
        );
    }
}
