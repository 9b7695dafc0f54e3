use chrono::{DateTime, Utc};
use kyd_common::error::{KydError, Result};
use kyd_common::Currency;
use kyd_ledger::TxHandle;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Transaction, TransactionStatus, TransactionType};

/// Persists `Transaction` rows (§4.7). `create` enforces idempotency via the
/// unique constraint on `reference`; duplicate inserts are mapped to
/// `TransactionAlreadyExists` rather than surfaced as a raw database error.
pub struct TransactionStore;

impl TransactionStore {
    pub async fn create(tx: &mut TxHandle<'_>, txn: &Transaction) -> Result<()> {
        let metadata = Value::Object(txn.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

        let result = sqlx::query(
            r#"
            INSERT INTO transactions
                (id, reference, sender_id, receiver_id, sender_wallet_id, receiver_wallet_id,
                 amount, currency, converted_amount, converted_currency, exchange_rate, fee_amount,
                 transaction_type, status, failure_reason, escrow_expiry, dispute_reason, description,
                 metadata, created_at, updated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(txn.id)
        .bind(&txn.reference)
        .bind(txn.sender_id)
        .bind(txn.receiver_id)
        .bind(txn.sender_wallet_id)
        .bind(txn.receiver_wallet_id)
        .bind(txn.amount)
        .bind(txn.currency.as_str())
        .bind(txn.converted_amount)
        .bind(txn.converted_currency.as_str())
        .bind(txn.exchange_rate)
        .bind(txn.fee_amount)
        .bind(txn.transaction_type.as_str())
        .bind(txn.status.as_str())
        .bind(&txn.failure_reason)
        .bind(txn.escrow_expiry)
        .bind(&txn.dispute_reason)
        .bind(&txn.description)
        .bind(metadata)
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .bind(txn.completed_at)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(KydError::from_create_transaction_db_error(e, &txn.reference)),
        }
    }

    pub async fn update(tx: &mut TxHandle<'_>, txn: &Transaction) -> Result<()> {
        let metadata = Value::Object(txn.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

        sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, failure_reason = $3, escrow_expiry = $4, dispute_reason = $5,
                description = $6, metadata = $7, updated_at = $8, completed_at = $9
            WHERE id = $1
            "#,
        )
        .bind(txn.id)
        .bind(txn.status.as_str())
        .bind(&txn.failure_reason)
        .bind(txn.escrow_expiry)
        .bind(&txn.dispute_reason)
        .bind(&txn.description)
        .bind(metadata)
        .bind(txn.updated_at)
        .bind(txn.completed_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(tx: &mut TxHandle<'_>, id: Uuid) -> Result<Transaction> {
        let row = sqlx::query(SELECT_COLUMNS_WHERE_ID)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| KydError::NotFound(format!("transaction {id}")))?;

        row_to_transaction(&row)
    }

    pub async fn find_by_reference(tx: &mut TxHandle<'_>, reference: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE reference = $1"))
            .bind(reference)
            .fetch_optional(&mut **tx)
            .await?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    pub async fn find_by_user(tx: &mut TxHandle<'_>, user_id: Uuid) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE sender_id = $1 OR receiver_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    pub async fn find_by_wallet(tx: &mut TxHandle<'_>, wallet_id: Uuid) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE sender_wallet_id = $1 OR receiver_wallet_id = $1 ORDER BY created_at DESC"
        ))
        .bind(wallet_id)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    pub async fn find_by_status(tx: &mut TxHandle<'_>, status: TransactionStatus) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE status = $1 ORDER BY created_at ASC"))
            .bind(status.as_str())
            .fetch_all(&mut **tx)
            .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// Transactions stuck in `pending`/`processing` older than `older_than`;
    /// reclaimed by the periodic sweep (§7 recovery policy).
    pub async fn find_stuck_pending(
        tx: &mut TxHandle<'_>,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status IN ('pending', 'processing') AND created_at < $1 ORDER BY created_at ASC"
        ))
        .bind(older_than)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    pub async fn find_pending_settlement(tx: &mut TxHandle<'_>, limit: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status = 'pending_settlement' ORDER BY created_at ASC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// Sum of same-currency, non-failed, non-cancelled sender transactions
    /// over the trailing 24h — feeds RiskGate's daily-limit check (§4.8).
    pub async fn sum_sender_24h(
        tx: &mut TxHandle<'_>,
        sender_id: Uuid,
        currency: Currency,
        since: DateTime<Utc>,
    ) -> Result<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total FROM transactions
            WHERE sender_id = $1 AND currency = $2 AND created_at >= $3
              AND status NOT IN ('failed', 'cancelled')
            "#,
        )
        .bind(sender_id)
        .bind(currency.as_str())
        .bind(since)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.try_get("total")?)
    }

    /// Count of sender transactions over the trailing 1h — feeds RiskGate's
    /// velocity check (§4.8).
    pub async fn count_sender_1h(tx: &mut TxHandle<'_>, sender_id: Uuid, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM transactions WHERE sender_id = $1 AND created_at >= $2",
        )
        .bind(sender_id)
        .bind(since)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.try_get("n")?)
    }

    /// Count of sender transactions over the trailing 1h exceeding
    /// `threshold` — feeds RiskGate's high-value velocity check (§4.8).
    pub async fn count_sender_high_value_1h(
        tx: &mut TxHandle<'_>,
        sender_id: Uuid,
        threshold: Decimal,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM transactions WHERE sender_id = $1 AND created_at >= $2 AND amount > $3",
        )
        .bind(sender_id)
        .bind(since)
        .bind(threshold)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.try_get("n")?)
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, reference, sender_id, receiver_id, sender_wallet_id, receiver_wallet_id,
           amount, currency, converted_amount, converted_currency, exchange_rate, fee_amount,
           transaction_type, status, failure_reason, escrow_expiry, dispute_reason, description,
           metadata, created_at, updated_at, completed_at
    FROM transactions
"#;

const SELECT_COLUMNS_WHERE_ID: &str = r#"
    SELECT id, reference, sender_id, receiver_id, sender_wallet_id, receiver_wallet_id,
           amount, currency, converted_amount, converted_currency, exchange_rate, fee_amount,
           transaction_type, status, failure_reason, escrow_expiry, dispute_reason, description,
           metadata, created_at, updated_at, completed_at
    FROM transactions
    WHERE id = $1
"#;

fn row_to_transaction(row: &sqlx::postgres::PgRow) -> Result<Transaction> {
    let currency: String = row.try_get("currency")?;
    let converted_currency: String = row.try_get("converted_currency")?;
    let transaction_type_str: String = row.try_get("transaction_type")?;
    let status_str: String = row.try_get("status")?;
    let metadata_value: Value = row.try_get("metadata")?;
    let metadata = match metadata_value {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };

    Ok(Transaction {
        id: row.try_get("id")?,
        reference: row.try_get("reference")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        sender_wallet_id: row.try_get("sender_wallet_id")?,
        receiver_wallet_id: row.try_get("receiver_wallet_id")?,
        amount: row.try_get("amount")?,
        currency: Currency::new(&currency)?,
        converted_amount: row.try_get("converted_amount")?,
        converted_currency: Currency::new(&converted_currency)?,
        exchange_rate: row.try_get("exchange_rate")?,
        fee_amount: row.try_get("fee_amount")?,
        transaction_type: TransactionType::parse(&transaction_type_str)
            .ok_or_else(|| KydError::Internal(format!("unknown transaction_type: {transaction_type_str}")))?,
        status: TransactionStatus::parse(&status_str)
            .ok_or_else(|| KydError::Internal(format!("unknown transaction status: {status_str}")))?,
        failure_reason: row.try_get("failure_reason")?,
        escrow_expiry: row.try_get("escrow_expiry")?,
        dispute_reason: row.try_get("dispute_reason")?,
        description: row.try_get("description")?,
        metadata,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}
