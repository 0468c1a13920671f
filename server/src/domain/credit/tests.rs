//! Tests for the credit ledger

use super::*;
use chrono::TimeZone;

use crate::core::config::CacheConfig;
use crate::data::types::NewCredential;
use crate::domain::error::ErrorKind;
use crate::utils::time::ManualClock;

struct Fixture {
    db: Arc<TransactionalService>,
    clock: Arc<ManualClock>,
    ledger: CreditLedger,
}

async fn fixture_with(config: CreditConfig) -> Fixture {
    let db = TransactionalService::in_memory().await;
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
    let cache = Arc::new(CacheService::new(&CacheConfig::default()));
    let ledger = CreditLedger::new(db.clone(), cache, config, clock.clone());
    ledger
        .ensure_workspace_member("org1", "ws1", "u1", Some("u1@example.com"), Some("User One"))
        .await
        .unwrap();
    Fixture { db, clock, ledger }
}

async fn fixture() -> Fixture {
    fixture_with(CreditConfig::default()).await
}

async fn priced_credential(db: &TransactionalService, by_model: &str, multiplier: f64) -> String {
    db.repository()
        .create_credential(&NewCredential {
            workspace_id: "ws1".into(),
            name: "OpenAI".into(),
            credential_name: "openAIApi".into(),
            credit_consumption_multiplier: multiplier,
            credit_consumption_multiplier_by_model: Some(by_model.to_string()),
            created_at: 0,
        })
        .await
        .unwrap()
        .id
}

// === Membership and Summary ===

#[tokio::test]
async fn test_new_member_has_zero_balance() {
    let f = fixture().await;
    let summary = f.ledger.get_summary("ws1", "u1").await.unwrap();
    assert_eq!(summary.credit, 0);
}

#[tokio::test]
async fn test_missing_member_is_not_found() {
    let f = fixture().await;
    let err = f.ledger.get_summary("ws1", "nobody").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "Workspace User Not Found");

    let err = f.ledger.topup("ws1", "nobody", 5, None).await.unwrap_err();
    assert_eq!(err.code(), codes::WORKSPACE_USER_NOT_FOUND);
}

#[tokio::test]
async fn test_workspace_under_other_org_is_rejected() {
    let f = fixture().await;
    let err = f
        .ledger
        .ensure_workspace_member("org2", "ws1", "u2", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::WORKSPACE_CONFLICT);
}

// === Top-up and Adjust ===

#[tokio::test]
async fn test_topup_appends_snapshot() {
    let f = fixture().await;
    f.ledger.topup("ws1", "u1", 50, None).await.unwrap();
    let result = f.ledger.topup("ws1", "u1", 100, Some("invoice 7")).await.unwrap();

    assert_eq!(result.credit, 150);
    assert_eq!(result.transaction.tx_type, CreditTransactionType::Topup);
    assert_eq!(result.transaction.amount, 100);
    assert_eq!(result.transaction.balance, 150);
    assert_eq!(result.transaction.description.as_deref(), Some("invoice 7"));
}

#[tokio::test]
async fn test_topup_default_description_and_invalid_amounts() {
    let f = fixture().await;
    let result = f.ledger.topup("ws1", "u1", 1, Some("  ")).await.unwrap();
    assert_eq!(result.transaction.description.as_deref(), Some(DEFAULT_TOPUP_DESCRIPTION));

    for amount in [0, -10] {
        let err = f.ledger.topup("ws1", "u1", amount, None).await.unwrap_err();
        assert_eq!(err.code(), codes::INVALID_AMOUNT);
    }
    assert_eq!(f.ledger.get_summary("ws1", "u1").await.unwrap().credit, 1);
}

#[tokio::test]
async fn test_adjust_signed() {
    let f = fixture().await;
    f.ledger.topup("ws1", "u1", 10, None).await.unwrap();
    let result = f.ledger.adjust("ws1", "u1", -25, None).await.unwrap();
    assert_eq!(result.credit, -15);
    assert_eq!(result.transaction.tx_type, CreditTransactionType::Adjust);
    assert_eq!(result.transaction.description.as_deref(), Some(DEFAULT_ADJUST_DESCRIPTION));

    let err = f.ledger.adjust("ws1", "u1", 0, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

// === Check-in ===

#[tokio::test]
async fn test_check_in_cooldown() {
    let f = fixture_with(CreditConfig {
        checkin_reward_min: 7,
        checkin_reward_max: 7,
        ..CreditConfig::default()
    })
    .await;
    f.ledger.topup("ws1", "u1", 1, None).await.unwrap();

    let first = f.ledger.daily_check_in("ws1", "u1").await.unwrap();
    assert_eq!(first.reward, 7);
    assert_eq!(first.credit, 8);
    assert_eq!(first.transaction.tx_type, CreditTransactionType::Checkin);
    assert_eq!(first.next_available_at, f.clock.now() + Duration::hours(24));

    f.clock.advance(Duration::hours(23));
    let err = f.ledger.daily_check_in("ws1", "u1").await.unwrap_err();
    assert_eq!(err.code(), codes::CHECKIN_ALREADY_CLAIMED);
    match err {
        ServiceError::CheckInCooldown { next_available_at } => {
            assert_eq!(next_available_at, first.next_available_at);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    f.clock.advance(Duration::hours(1));
    let second = f.ledger.daily_check_in("ws1", "u1").await.unwrap();
    assert_eq!(second.credit, 15);
}

#[tokio::test]
async fn test_check_in_requires_min_credit() {
    let f = fixture().await;
    let err = f.ledger.daily_check_in("ws1", "u1").await.unwrap_err();
    assert_eq!(err.code(), codes::CHECKIN_MIN_CREDIT);
    assert!(err.to_string().contains("at least 1"));
}

#[tokio::test]
async fn test_check_in_reward_in_range() {
    let f = fixture().await;
    f.ledger.topup("ws1", "u1", 1, None).await.unwrap();
    let result = f.ledger.daily_check_in("ws1", "u1").await.unwrap();
    assert!((1..=100).contains(&result.reward));
    assert_eq!(result.credit, 1 + result.reward);
}

// === Consumption ===

#[tokio::test]
async fn test_consume_by_usages() {
    let f = fixture().await;
    f.ledger.topup("ws1", "u1", 10, None).await.unwrap();
    let cred = priced_credential(&f.db, r#"{"gpt-4o": {"multiplier": 2, "rmbPerMTok": 10}}"#, 1.5).await;

    let result = f
        .ledger
        .consume_by_usages(
            "ws1",
            "u1",
            &[
                CreditUsage {
                    credential_id: Some(cred.clone()),
                    credential_name: Some("OpenAI".into()),
                    model: Some("gpt-4o".into()),
                    total_tokens: 1500,
                },
                // Unpriced model: no row
                CreditUsage {
                    credential_id: Some(cred.clone()),
                    credential_name: Some("OpenAI".into()),
                    model: Some("gpt-3.5".into()),
                    total_tokens: 1_000_000,
                },
                CreditUsage {
                    credential_id: Some(cred),
                    credential_name: None,
                    model: Some("gpt-4o".into()),
                    total_tokens: 0,
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(result.credit_consumed, 6);
    assert_eq!(result.credit_balance, 4);
    assert_eq!(result.transactions.len(), 1);
    let row = &result.transactions[0];
    assert_eq!(row.tx_type, CreditTransactionType::Consume);
    assert_eq!(row.amount, -6);
    assert_eq!(row.balance, 4);
    let description = row.description.as_deref().unwrap();
    assert!(description.contains("model=gpt-4o totalTokens=1500 rmbPerMTok=10 (model_config)"));
    assert!(description.contains("consumed=6"));
}

#[tokio::test]
async fn test_consume_may_go_negative() {
    let f = fixture().await;
    let cred = priced_credential(&f.db, r#"{"m": {"rmbPerMTok": 100}}"#, 1.0).await;

    let result = f
        .ledger
        .consume_by_usages(
            "ws1",
            "u1",
            &[CreditUsage {
                credential_id: Some(cred),
                credential_name: Some("OpenAI".into()),
                model: Some("m".into()),
                total_tokens: 10_000,
            }],
        )
        .await
        .unwrap();
    assert_eq!(result.credit_consumed, 100);
    assert_eq!(result.credit_balance, -100);
}

#[tokio::test]
async fn test_consume_unknown_credential_uses_default() {
    let f = fixture().await;
    f.ledger.topup("ws1", "u1", 5, None).await.unwrap();

    let result = f
        .ledger
        .consume_by_usages(
            "ws1",
            "u1",
            &[CreditUsage {
                credential_id: Some("gone".into()),
                credential_name: None,
                model: Some("gpt-x".into()),
                total_tokens: 1_000_000,
            }],
        )
        .await
        .unwrap();
    assert_eq!(result.credit_consumed, 0);
    assert_eq!(result.credit_balance, 5);
    assert!(result.transactions.is_empty());
}

#[tokio::test]
async fn test_consume_stamped_after_waiting_for_member_lock() {
    let dir = tempfile::tempdir().unwrap();
    let db = TransactionalService::sqlite_file(&dir.path().join("ledger.db"), 4).await;
    let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    let cache = Arc::new(CacheService::new(&CacheConfig::default()));
    let ledger = Arc::new(CreditLedger::new(
        db.clone(),
        cache,
        CreditConfig::default(),
        clock.clone(),
    ));
    ledger
        .ensure_workspace_member("org1", "ws1", "u1", None, None)
        .await
        .unwrap();
    let cred = priced_credential(&db, r#"{"m": {"rmbPerMTok": 100}}"#, 1.0).await;
    ledger.topup("ws1", "u1", 1000, None).await.unwrap();

    // Another writer holds the member row while the debit starts
    let mut held = db
        .repository()
        .begin_credit("ws1", "u1")
        .await
        .unwrap()
        .unwrap();
    clock.set(start + Duration::seconds(1));

    let consumer = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            ledger
                .consume_by_usages(
                    "ws1",
                    "u1",
                    &[CreditUsage {
                        credential_id: Some(cred),
                        credential_name: Some("OpenAI".into()),
                        model: Some("m".into()),
                        total_tokens: 10_000,
                    }],
                )
                .await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    held.append(NewCreditEntry {
        tx_type: CreditTransactionType::Topup,
        amount: 500,
        credential_id: None,
        credential_name: None,
        description: None,
        created_at: (start + Duration::seconds(2)).timestamp_millis(),
    })
    .await
    .unwrap();
    clock.set(start + Duration::seconds(3));
    held.commit().await.unwrap();

    let consumed = consumer.await.unwrap().unwrap();
    assert_eq!(consumed.credit_consumed, 100);
    assert_eq!(consumed.credit_balance, 1400);
    assert_eq!(
        consumed.transactions[0].created_at,
        (start + Duration::seconds(3)).timestamp_millis()
    );

    let page = ledger
        .get_transactions("ws1", "u1", &TransactionQuery::default())
        .await
        .unwrap();
    let amounts: Vec<i64> = page.transactions.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![-100, 500, 1000]);

    let mut running = 0;
    for row in page.transactions.iter().rev() {
        running += row.amount;
        assert_eq!(row.balance, running);
    }
}

// === Listing ===

#[tokio::test]
async fn test_transactions_newest_first_and_balance_chain() {
    let f = fixture().await;
    for amount in [10, 20, 30] {
        f.ledger.topup("ws1", "u1", amount, None).await.unwrap();
        f.clock.advance(Duration::minutes(1));
    }
    f.ledger.adjust("ws1", "u1", -5, None).await.unwrap();

    let page = f
        .ledger
        .get_transactions("ws1", "u1", &TransactionQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.credit, 55);

    let amounts: Vec<i64> = page.transactions.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![-5, 30, 20, 10]);

    // Replaying amounts oldest-first reproduces every snapshot
    let mut running = 0;
    for row in page.transactions.iter().rev() {
        running += row.amount;
        assert_eq!(row.balance, running);
    }
}

#[tokio::test]
async fn test_transactions_paging_and_range() {
    let f = fixture().await;
    for _ in 0..3 {
        f.ledger.topup("ws1", "u1", 1, None).await.unwrap();
        f.clock.advance(Duration::days(1));
    }

    let page = f
        .ledger
        .get_transactions(
            "ws1",
            "u1",
            &TransactionQuery {
                page: Some(2),
                page_size: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.transactions.len(), 1);
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);

    let page = f
        .ledger
        .get_transactions(
            "ws1",
            "u1",
            &TransactionQuery {
                start: Some("2025-06-02".into()),
                end: Some("2025-06-02".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_transactions_reject_bad_queries() {
    let f = fixture().await;
    let cases = [
        (TransactionQuery { page: Some(0), ..Default::default() }, codes::INVALID_PAGINATION),
        (TransactionQuery { page_size: Some(501), ..Default::default() }, codes::INVALID_PAGINATION),
        (TransactionQuery { start: Some("soon".into()), ..Default::default() }, codes::INVALID_DATE_RANGE),
        (
            TransactionQuery {
                start: Some("2025-06-03".into()),
                end: Some("2025-06-01".into()),
                ..Default::default()
            },
            codes::INVALID_DATE_RANGE,
        ),
    ];
    for (query, code) in cases {
        let err = f.ledger.get_transactions("ws1", "u1", &query).await.unwrap_err();
        assert_eq!(err.code(), code);
    }
}

// === Gate ===

#[tokio::test]
async fn test_assert_sufficient_credit() {
    let f = fixture().await;
    let err = f.ledger.assert_sufficient_credit("ws1", "u1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PaymentRequired);
    assert_eq!(err.code(), codes::INSUFFICIENT_CREDIT);

    f.ledger.topup("ws1", "u1", 1, None).await.unwrap();
    f.ledger.assert_sufficient_credit("ws1", "u1").await.unwrap();
}

#[tokio::test]
async fn test_gate_disabled_at_zero() {
    let f = fixture_with(CreditConfig {
        min_credit_to_interact: 0,
        ..CreditConfig::default()
    })
    .await;
    f.ledger.assert_sufficient_credit("ws1", "u1").await.unwrap();
    f.ledger.assert_sufficient_credit("ws1", "ghost").await.unwrap();
}
