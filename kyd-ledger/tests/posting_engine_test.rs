use kyd_common::Currency;
use kyd_ledger::{EntryType, EventLog, EventType, LedgerStore, Posting, PostingEngine, Wallet, WalletStatus, WalletStore};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

fn wallet(owner: Uuid, currency: &str, available: &str) -> Wallet {
    let now = kyd_common::time::now_utc_truncated_to_us();
    let amount = Decimal::from_str(available).unwrap();
    Wallet {
        id: Uuid::new_v4(),
        owner_id: owner,
        address: None,
        currency: Currency::new(currency).unwrap(),
        available_balance: amount,
        ledger_balance: amount,
        reserved_balance: Decimal::ZERO,
        status: WalletStatus::Active,
        created_at: now,
        updated_at: now,
        last_transaction_at: None,
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn happy_path_same_currency(pool: PgPool) {
    let mut tx = pool.begin().await.unwrap();
    let sender = wallet(Uuid::new_v4(), "USD", "100");
    let receiver = wallet(Uuid::new_v4(), "USD", "0");
    WalletStore::create(&mut tx, &sender).await.unwrap();
    WalletStore::create(&mut tx, &receiver).await.unwrap();
    tx.commit().await.unwrap();

    let posting = Posting {
        transaction_id: Uuid::new_v4(),
        debit_wallet_id: sender.id,
        credit_wallet_id: receiver.id,
        debit_amount: Decimal::from_str("10.15").unwrap(),
        credit_amount: Decimal::from_str("10").unwrap(),
        currency: Currency::new("USD").unwrap(),
        converted_currency: Currency::new("USD").unwrap(),
        exchange_rate: Decimal::ONE,
        fee_amount: Decimal::from_str("0.15").unwrap(),
        event_type: EventType::Payment,
        description: "payment".to_string(),
    };

    let mut tx = pool.begin().await.unwrap();
    let result = PostingEngine::post(&mut tx, &posting).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(result.debit_balance_after, Decimal::from_str("88.5").unwrap());
    assert_eq!(result.credit_balance_after, Decimal::from_str("10").unwrap());
    assert_eq!(result.event.event_type, EventType::Payment);
    assert_eq!(result.event.status, "completed");

    let mut tx = pool.begin().await.unwrap();
    let sender_after = WalletStore::find_by_id(&mut tx, sender.id).await.unwrap();
    let receiver_after = WalletStore::find_by_id(&mut tx, receiver.id).await.unwrap();
    assert_eq!(sender_after.available_balance, Decimal::from_str("88.5").unwrap());
    assert_eq!(sender_after.ledger_balance, Decimal::from_str("88.5").unwrap());
    assert_eq!(receiver_after.available_balance, Decimal::from_str("10").unwrap());

    let chain = LedgerStore::verify_wallet_chain(&pool, sender.id).await.unwrap();
    assert_eq!(chain, kyd_ledger::ChainVerification::Valid);
}

#[sqlx::test(migrations = "../migrations")]
async fn insufficient_balance_leaves_wallets_unchanged(pool: PgPool) {
    let mut tx = pool.begin().await.unwrap();
    let sender = wallet(Uuid::new_v4(), "USD", "5");
    let receiver = wallet(Uuid::new_v4(), "USD", "0");
    WalletStore::create(&mut tx, &sender).await.unwrap();
    WalletStore::create(&mut tx, &receiver).await.unwrap();
    tx.commit().await.unwrap();

    let posting = Posting {
        transaction_id: Uuid::new_v4(),
        debit_wallet_id: sender.id,
        credit_wallet_id: receiver.id,
        debit_amount: Decimal::from_str("10.15").unwrap(),
        credit_amount: Decimal::from_str("10").unwrap(),
        currency: Currency::new("USD").unwrap(),
        converted_currency: Currency::new("USD").unwrap(),
        exchange_rate: Decimal::ONE,
        fee_amount: Decimal::from_str("0.15").unwrap(),
        event_type: EventType::Payment,
        description: "payment".to_string(),
    };

    let mut tx = pool.begin().await.unwrap();
    let err = PostingEngine::post(&mut tx, &posting).await.unwrap_err();
    tx.rollback().await.unwrap();

    assert!(matches!(err, kyd_common::KydError::InsufficientBalance { .. }));

    let mut tx = pool.begin().await.unwrap();
    let sender_after = WalletStore::find_by_id(&mut tx, sender.id).await.unwrap();
    let receiver_after = WalletStore::find_by_id(&mut tx, receiver.id).await.unwrap();
    assert_eq!(sender_after.available_balance, Decimal::from_str("5").unwrap());
    assert_eq!(receiver_after.available_balance, Decimal::ZERO);
}

#[sqlx::test(migrations = "../migrations")]
async fn cross_currency_posting(pool: PgPool) {
    let mut tx = pool.begin().await.unwrap();
    let sender = wallet(Uuid::new_v4(), "USD", "100");
    let receiver = wallet(Uuid::new_v4(), "EUR", "0");
    WalletStore::create(&mut tx, &sender).await.unwrap();
    WalletStore::create(&mut tx, &receiver).await.unwrap();
    tx.commit().await.unwrap();

    let posting = Posting {
        transaction_id: Uuid::new_v4(),
        debit_wallet_id: sender.id,
        credit_wallet_id: receiver.id,
        debit_amount: Decimal::from_str("10.15").unwrap(),
        credit_amount: Decimal::from_str("9").unwrap(),
        currency: Currency::new("USD").unwrap(),
        converted_currency: Currency::new("EUR").unwrap(),
        exchange_rate: Decimal::from_str("0.9").unwrap(),
        fee_amount: Decimal::from_str("0.15").unwrap(),
        event_type: EventType::Payment,
        description: "cross currency payment".to_string(),
    };

    let mut tx = pool.begin().await.unwrap();
    let result = PostingEngine::post(&mut tx, &posting).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(result.debit_balance_after, Decimal::from_str("89.85").unwrap());
    assert_eq!(result.credit_balance_after, Decimal::from_str("9").unwrap());
}

#[sqlx::test(migrations = "../migrations")]
async fn tamper_detection_flags_hash_mismatch(pool: PgPool) {
    let mut tx = pool.begin().await.unwrap();
    let sender = wallet(Uuid::new_v4(), "USD", "100");
    let receiver = wallet(Uuid::new_v4(), "USD", "0");
    WalletStore::create(&mut tx, &sender).await.unwrap();
    WalletStore::create(&mut tx, &receiver).await.unwrap();
    tx.commit().await.unwrap();

    let posting = Posting {
        transaction_id: Uuid::new_v4(),
        debit_wallet_id: sender.id,
        credit_wallet_id: receiver.id,
        debit_amount: Decimal::from_str("10.15").unwrap(),
        credit_amount: Decimal::from_str("10").unwrap(),
        currency: Currency::new("USD").unwrap(),
        converted_currency: Currency::new("USD").unwrap(),
        exchange_rate: Decimal::ONE,
        fee_amount: Decimal::from_str("0.15").unwrap(),
        event_type: EventType::Payment,
        description: "payment".to_string(),
    };

    let mut tx = pool.begin().await.unwrap();
    PostingEngine::post(&mut tx, &posting).await.unwrap();
    tx.commit().await.unwrap();

    sqlx::query("UPDATE ledger_entries SET amount = $1 WHERE wallet_id = $2 AND entry_type = 'debit'")
        .bind(Decimal::from_str("1000000.15").unwrap())
        .bind(sender.id)
        .execute(&pool)
        .await
        .unwrap();

    let result = LedgerStore::verify_wallet_chain(&pool, sender.id).await.unwrap();
    match result {
        kyd_ledger::ChainVerification::Broken { broken_at, reason } => {
            assert_eq!(broken_at, 0);
            assert_eq!(reason, "hash mismatch");
        }
        kyd_ledger::ChainVerification::Valid => panic!("expected a broken chain"),
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn injection_detection_flags_forked_previous_hash(pool: PgPool) {
    let mut tx = pool.begin().await.unwrap();
    let sender = wallet(Uuid::new_v4(), "USD", "100");
    let receiver = wallet(Uuid::new_v4(), "USD", "0");
    WalletStore::create(&mut tx, &sender).await.unwrap();
    WalletStore::create(&mut tx, &receiver).await.unwrap();
    tx.commit().await.unwrap();

    let posting = Posting {
        transaction_id: Uuid::new_v4(),
        debit_wallet_id: sender.id,
        credit_wallet_id: receiver.id,
        debit_amount: Decimal::from_str("10.15").unwrap(),
        credit_amount: Decimal::from_str("10").unwrap(),
        currency: Currency::new("USD").unwrap(),
        converted_currency: Currency::new("USD").unwrap(),
        exchange_rate: Decimal::ONE,
        fee_amount: Decimal::from_str("0.15").unwrap(),
        event_type: EventType::Payment,
        description: "payment".to_string(),
    };

    let mut tx = pool.begin().await.unwrap();
    PostingEngine::post(&mut tx, &posting).await.unwrap();
    tx.commit().await.unwrap();

    let existing_prev: String = sqlx::query_scalar("SELECT previous_hash FROM transaction_events LIMIT 1")
        .fetch_one(&pool)
        .await
        .unwrap();

    sqlx::query(
        r#"
        INSERT INTO transaction_events
            (id, transaction_id, event_type, amount, currency, status, previous_hash, hash, created_at)
        VALUES ($1, $2, 'payment', 1, 'USD', 'completed', $3, 'forkedforkedforkedforkedforkedforkedforkedforkedforkedforkedfork', now())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(Uuid::new_v4())
    .bind(&existing_prev)
    .execute(&pool)
    .await
    .unwrap();

    let result = EventLog::verify_chain(&pool).await.unwrap();
    match result {
        kyd_ledger::ChainVerification::Broken { reason, .. } => {
            assert_eq!(reason, "previous_hash mismatch");
        }
        kyd_ledger::ChainVerification::Valid => panic!("expected a broken chain"),
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn same_wallet_posting_is_net_zero_but_appends_two_entries(pool: PgPool) {
    let mut tx = pool.begin().await.unwrap();
    let wallet = wallet(Uuid::new_v4(), "USD", "100");
    WalletStore::create(&mut tx, &wallet).await.unwrap();
    tx.commit().await.unwrap();

    let posting = Posting {
        transaction_id: Uuid::new_v4(),
        debit_wallet_id: wallet.id,
        credit_wallet_id: wallet.id,
        debit_amount: Decimal::from_str("10").unwrap(),
        credit_amount: Decimal::from_str("10").unwrap(),
        currency: Currency::new("USD").unwrap(),
        converted_currency: Currency::new("USD").unwrap(),
        exchange_rate: Decimal::ONE,
        fee_amount: Decimal::ZERO,
        event_type: EventType::Payment,
        description: "self transfer".to_string(),
    };

    let mut tx = pool.begin().await.unwrap();
    PostingEngine::post(&mut tx, &posting).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    let after = WalletStore::find_by_id(&mut tx, wallet.id).await.unwrap();
    assert_eq!(after.available_balance, Decimal::from_str("100").unwrap());

    let entries: i64 = sqlx::query_scalar("SELECT count(*) FROM ledger_entries WHERE wallet_id = $1")
        .bind(wallet.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(entries, 2);

    let entry_types: Vec<String> =
        sqlx::query_scalar("SELECT entry_type FROM ledger_entries WHERE wallet_id = $1 ORDER BY seq")
            .bind(wallet.id)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(entry_types, vec![EntryType::Debit.as_str(), EntryType::Credit.as_str()]);
}
