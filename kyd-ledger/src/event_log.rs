// event_log.rs
use kyd_common::error::{KydError, Result};
use kyd_common::{time, Currency};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::hasher::EventHasher;
use crate::models::{ChainVerification, EventType, TransactionEvent, GENESIS};
use crate::txhandle::TxHandle;

/// Appends to the single global transaction event chain and verifies it
/// end to end (§4.5). Unlike per-wallet ledger chains, there is exactly one
/// of these for the whole system, so every append serialises behind the
/// same tail lock.
pub struct EventLog;

impl EventLog {
    /// Appends one event within the caller's transaction, locking the
    /// global tail row first.
    pub async fn append_event(
        tx: &mut TxHandle<'_>,
        transaction_id: Uuid,
        event_type: EventType,
        amount: Decimal,
        currency: Currency,
        status: &str,
    ) -> Result<TransactionEvent> {
        let tail_row = sqlx::query(
            r#"
            SELECT hash FROM transaction_events
            ORDER BY seq DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .fetch_optional(&mut **tx)
        .await?;

        let previous_hash = match tail_row {
            Some(row) => row.try_get::<String, _>("hash")?,
            None => GENESIS.to_string(),
        };

        let id = Uuid::new_v4();
        let created_at = time::now_utc_truncated_to_us();
        let hash = EventHasher::hash_event(
            &previous_hash,
            transaction_id,
            event_type,
            amount,
            currency,
            status,
            created_at,
        );

        sqlx::query(
            r#"
            INSERT INTO transaction_events
                (id, transaction_id, event_type, amount, currency, status,
                 previous_hash, hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(transaction_id)
        .bind(event_type.as_str())
        .bind(amount)
        .bind(currency.as_str())
        .bind(status)
        .bind(&previous_hash)
        .bind(&hash)
        .bind(created_at)
        .execute(&mut **tx)
        .await?;

        Ok(TransactionEvent {
            id,
            transaction_id,
            event_type,
            amount,
            currency,
            status: status.to_string(),
            previous_hash,
            hash,
            created_at,
        })
    }

    /// Non-transactional helper mirroring `LedgerStore::append_entry_retrying`
    /// for callers outside C6's posting transaction (administrative events,
    /// dispute resolution outcomes recorded after the fact).
    pub async fn append_event_retrying(
        pool: &PgPool,
        transaction_id: Uuid,
        event_type: EventType,
        amount: Decimal,
        currency: Currency,
        status: &str,
    ) -> Result<TransactionEvent> {
        const MAX_ATTEMPTS: u32 = 5;
        const BACKOFF: std::time::Duration = std::time::Duration::from_millis(10);

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            let mut tx = pool.begin().await?;
            match Self::append_event(&mut tx, transaction_id, event_type, amount, currency, status).await {
                Ok(event) => {
                    tx.commit().await?;
                    return Ok(event);
                }
                Err(e) => {
                    let _ = tx.rollback().await;
                    tracing::warn!(attempt, transaction_id = %transaction_id, error = %e, "event append retrying");
                    last_err = Some(e);
                    tokio::time::sleep(BACKOFF).await;
                }
            }
        }

        Err(last_err.expect("loop always sets last_err before exhausting attempts"))
    }

    /// Walks the entire global chain in append order (`seq`) and re-derives
    /// each hash (§4.5, §8 invariant 2).
    pub async fn verify_chain(pool: &PgPool) -> Result<ChainVerification> {
        let rows = sqlx::query(
            r#"
            SELECT id, transaction_id, event_type, amount, currency, status,
                   previous_hash, hash, created_at
            FROM transaction_events
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut expected_prev = GENESIS.to_string();
        for (i, row) in rows.iter().enumerate() {
            let stored_prev: String = row.try_get("previous_hash")?;
            if stored_prev != expected_prev {
                return Ok(ChainVerification::Broken {
                    broken_at: i,
                    reason: "previous_hash mismatch".to_string(),
                });
            }

            let transaction_id: Uuid = row.try_get("transaction_id")?;
            let event_type_str: String = row.try_get("event_type")?;
            let event_type = EventType::parse(&event_type_str)
                .ok_or_else(|| KydError::Internal(format!("unknown event_type: {event_type_str}")))?;
            let amount: Decimal = row.try_get("amount")?;
            let currency_str: String = row.try_get("currency")?;
            let currency = Currency::new(&currency_str)?;
            let status: String = row.try_get("status")?;
            let created_at = row.try_get("created_at")?;
            let stored_hash: String = row.try_get("hash")?;

            let recomputed = EventHasher::hash_event(
                &stored_prev,
                transaction_id,
                event_type,
                amount,
                currency,
                &status,
                created_at,
            );

            if recomputed != stored_hash {
                return Ok(ChainVerification::Broken {
                    broken_at: i,
                    reason: "hash mismatch".to_string(),
                });
            }

            expected_prev = stored_hash;
        }

        Ok(ChainVerification::Valid)
    }
}
