use std::sync::Arc;
use std::time::Duration;

use campaign_ledger::{
    config::GatewayConfig,
    gateway::{LedgerGateway, SessionIdentity, StaticIdentity, TransactionOutcome},
    ledger::MemoryLedger,
    transaction::CampaignForm,
    BackendError, LedgerError,
};

const LEDGER_NOW: u64 = 1_700_000_000;

fn form(title: &str, target: &str) -> CampaignForm {
    CampaignForm {
        title: title.into(),
        description: format!("{title} description"),
        target: target.into(),
        deadline: "2099-01-01".into(),
        image: format!("https://img.example/{title}.png"),
    }
}

fn setup() -> (
    Arc<MemoryLedger>,
    Arc<SessionIdentity>,
    LedgerGateway<Arc<MemoryLedger>, Arc<SessionIdentity>>,
) {
    let ledger = Arc::new(MemoryLedger::with_clock(LEDGER_NOW));
    let session = Arc::new(SessionIdentity::new());
    let gateway = LedgerGateway::new(ledger.clone(), session.clone());
    (ledger, session, gateway)
}

#[tokio::test]
async fn create_donate_and_read_back() {
    let (_ledger, session, gateway) = setup();
    session.sign_in("0xalice");
    let created = gateway.create_campaign(&form("wells", "1")).await;
    assert!(created.is_confirmed(), "{created:?}");

    session.sign_in("0xbob");
    assert!(gateway.donate(0, "0.75").await.is_confirmed());
    session.sign_in("0xcarol");
    assert!(gateway.donate(0, "0.5").await.is_confirmed());

    let campaigns = gateway.list_campaigns().await.unwrap();
    assert_eq!(campaigns.len(), 1);
    let wells = &campaigns[0];
    assert_eq!(wells.p_id, 0);
    assert_eq!(wells.owner, "0xalice");
    assert_eq!(wells.target, "1");
    // overcollection is reported as-is
    assert_eq!(wells.amount_collected, "1.25");
    assert_eq!(wells.funded_percent(), 100);
    assert_eq!(wells.display_deadline(), "2099-01-01 00:00:00 UTC");

    let donations = gateway.list_donations(0).await.unwrap();
    let pairs: Vec<(&str, &str)> = donations
        .iter()
        .map(|d| (d.donator.as_str(), d.donation.as_str()))
        .collect();
    assert_eq!(pairs, vec![("0xbob", "0.75"), ("0xcarol", "0.5")]);
}

#[tokio::test]
async fn owned_campaigns_follow_current_account() {
    let (_ledger, session, gateway) = setup();
    session.sign_in("0xalice");
    gateway.create_campaign(&form("a0", "1")).await;
    session.sign_in("0xbob");
    gateway.create_campaign(&form("b1", "2")).await;
    session.sign_in("0xalice");
    gateway.create_campaign(&form("a2", "3")).await;

    let owned = gateway.list_owned_campaigns().await.unwrap();
    let ids: Vec<u64> = owned.iter().map(|c| c.p_id).collect();
    assert_eq!(ids, vec![0, 2]);

    session.sign_out();
    assert!(gateway.list_owned_campaigns().await.unwrap().is_empty());
    assert_eq!(gateway.list_campaigns().await.unwrap().len(), 3);
}

#[tokio::test]
async fn validation_failures_have_no_side_effects() {
    let (ledger, session, gateway) = setup();

    let outcome = gateway.create_campaign(&form("anon", "1")).await;
    assert_eq!(outcome.cause(), Some(&LedgerError::Unauthenticated));

    session.sign_in("0xalice");
    let mut expired = form("late", "1");
    expired.deadline = "2001-01-01".into();
    assert!(matches!(
        gateway.create_campaign(&expired).await.cause(),
        Some(LedgerError::InvalidDeadline { .. })
    ));
    assert!(matches!(
        gateway.create_campaign(&form("typo", "1,5")).await.cause(),
        Some(LedgerError::InvalidAmountFormat { .. })
    ));
    assert!(matches!(
        gateway.donate(0, "0").await.cause(),
        Some(LedgerError::InvalidDonationAmount { .. })
    ));

    let snapshot = ledger.snapshot().await;
    assert_eq!(snapshot.meta.height, 0);
    assert!(snapshot.events.is_empty());
}

#[tokio::test]
async fn backend_failures_come_back_as_values() {
    let (ledger, session, gateway) = setup();
    session.sign_in("0xalice");

    let outcome = gateway.donate(7, "1").await;
    assert!(matches!(
        outcome,
        TransactionOutcome::Rejected {
            cause: LedgerError::SubmissionFailure(BackendError::Reverted(_))
        }
    ));

    ledger.set_cancel_mode(true);
    assert_eq!(
        gateway.create_campaign(&form("x", "1")).await.cause(),
        Some(&LedgerError::SubmissionFailure(BackendError::Cancelled))
    );
    ledger.set_cancel_mode(false);

    ledger.set_fail_mode(true);
    assert!(matches!(
        gateway.create_campaign(&form("x", "1")).await.cause(),
        Some(LedgerError::SubmissionFailure(BackendError::Network(_)))
    ));
    assert!(matches!(
        gateway.list_campaigns().await,
        Err(LedgerError::ReadFailure(BackendError::Network(_)))
    ));
}

#[tokio::test]
async fn ledger_side_deadline_check_surfaces() {
    let (ledger, session, gateway) = setup();
    session.sign_in("0xalice");
    // ledger clock ahead of the caller's
    ledger.set_clock(4_070_908_800 + 1).await;
    let outcome = gateway.create_campaign(&form("future", "1")).await;
    assert!(matches!(
        outcome.cause(),
        Some(LedgerError::SubmissionFailure(BackendError::Reverted(reason)))
            if reason.contains("future")
    ));
}

#[tokio::test(start_paused = true)]
async fn slow_submission_reports_unknown_outcome() {
    let ledger = Arc::new(MemoryLedger::with_clock(LEDGER_NOW));
    ledger.set_submit_delay(Duration::from_secs(60));
    let gateway = LedgerGateway::new(ledger.clone(), StaticIdentity(Some("0xalice".into())))
        .with_submit_timeout(Duration::from_secs(5));

    let outcome = gateway.create_campaign(&form("slow", "1")).await;
    assert_eq!(
        outcome,
        TransactionOutcome::Unknown {
            waited: Duration::from_secs(5)
        }
    );
}

#[tokio::test]
async fn configured_exponent_drives_codec() {
    let ledger = Arc::new(MemoryLedger::with_clock(LEDGER_NOW));
    let config = GatewayConfig::from_toml_str("decimals = 6").unwrap();
    let gateway =
        LedgerGateway::from_config(ledger.clone(), StaticIdentity(Some("0xalice".into())), &config)
            .unwrap();

    assert!(gateway.create_campaign(&form("usdc", "2.5")).await.is_confirmed());
    let snapshot = ledger.snapshot().await;
    assert_eq!(snapshot.campaigns[0].target, 2_500_000);
    assert_eq!(gateway.list_campaigns().await.unwrap()[0].target, "2.5");

    assert!(matches!(
        gateway.donate(0, "0.0000001").await.cause(),
        Some(LedgerError::PrecisionLoss { decimals: 6, .. })
    ));
}

#[tokio::test]
async fn ids_are_positions_in_each_fresh_read() {
    let (_ledger, session, gateway) = setup();
    session.sign_in("0xalice");
    for title in ["first", "second", "third"] {
        gateway.create_campaign(&form(title, "1")).await;
    }
    let campaigns = gateway.list_campaigns().await.unwrap();
    for (position, campaign) in campaigns.iter().enumerate() {
        assert_eq!(campaign.p_id, position as u64);
    }
    assert_eq!(campaigns[2].title, "third");
}
