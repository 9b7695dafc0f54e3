// ledger_store.rs
use kyd_common::error::Result;
use kyd_common::{time, Currency};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::hasher::EventHasher;
use crate::models::{ChainVerification, EntryType, LedgerEntry, GENESIS};
use crate::txhandle::TxHandle;

/// Appends per-wallet ledger entries with previous-hash linkage and
/// verifies a wallet's chain (§4.4).
pub struct LedgerStore;

impl LedgerStore {
    /// Appends one ledger row for `wallet_id` within the caller's
    /// transaction. The tail-hash `SELECT ... FOR UPDATE` is what serialises
    /// concurrent appends to the same wallet's chain — combined with the
    /// wallet lock PostingEngine already holds, no two writers can append
    /// to the same chain at once.
    pub async fn append_entry(
        tx: &mut TxHandle<'_>,
        transaction_id: Uuid,
        wallet_id: Uuid,
        entry_type: EntryType,
        amount: Decimal,
        currency: Currency,
        balance_after: Decimal,
    ) -> Result<LedgerEntry> {
        let tail_row = sqlx::query(
            r#"
            SELECT hash FROM ledger_entries
            WHERE wallet_id = $1
            ORDER BY seq DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut **tx)
        .await?;

        let previous_hash = match tail_row {
            Some(row) => row.try_get::<String, _>("hash")?,
            None => GENESIS.to_string(),
        };

        let id = Uuid::new_v4();
        let created_at = time::now_utc_truncated_to_us();
        let hash = EventHasher::hash_ledger_entry(
            &previous_hash,
            id,
            transaction_id,
            wallet_id,
            entry_type,
            amount,
            currency,
            balance_after,
            created_at,
        );

        sqlx::query(
            r#"
            INSERT INTO ledger_entries
                (id, transaction_id, wallet_id, entry_type, amount, currency,
                 balance_after, created_at, previous_hash, hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(transaction_id)
        .bind(wallet_id)
        .bind(entry_type.as_str())
        .bind(amount)
        .bind(currency.as_str())
        .bind(balance_after)
        .bind(created_at)
        .bind(&previous_hash)
        .bind(&hash)
        .execute(&mut **tx)
        .await?;

        Ok(LedgerEntry {
            id,
            transaction_id,
            wallet_id,
            entry_type,
            amount,
            currency,
            balance_after,
            created_at,
            previous_hash,
            hash,
        })
    }

    /// Non-transactional helper for out-of-band writes (genesis seeding,
    /// administrative backfills). Retries up to 5 times with 10ms backoff
    /// on unique-constraint collisions from concurrent tail reads taken
    /// outside a serializable transaction (§4.4, §5) — C6's serializable
    /// transaction never needs this, since its own tail lock prevents the
    /// race this retry loop is there to paper over.
    pub async fn append_entry_retrying(
        pool: &PgPool,
        transaction_id: Uuid,
        wallet_id: Uuid,
        entry_type: EntryType,
        amount: Decimal,
        currency: Currency,
        balance_after: Decimal,
    ) -> Result<LedgerEntry> {
        const MAX_ATTEMPTS: u32 = 5;
        const BACKOFF: std::time::Duration = std::time::Duration::from_millis(10);

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            let mut tx = pool.begin().await?;
            match Self::append_entry(
                &mut tx,
                transaction_id,
                wallet_id,
                entry_type,
                amount,
                currency,
                balance_after,
            )
            .await
            {
                Ok(entry) => {
                    tx.commit().await?;
                    return Ok(entry);
                }
                Err(e) => {
                    let _ = tx.rollback().await;
                    tracing::warn!(attempt, wallet_id = %wallet_id, error = %e, "ledger append retrying");
                    last_err = Some(e);
                    tokio::time::sleep(BACKOFF).await;
                }
            }
        }

        Err(last_err.expect("loop always sets last_err before exhausting attempts"))
    }

    /// Walks all entries for `wallet_id` in append order (`seq`, which
    /// always agrees with the order `append_entry` built the chain in,
    /// unlike `created_at`/`id`) and re-derives each hash; returns the
    /// first violation or `Valid` (§4.4, §8 invariants 1-2).
    pub async fn verify_wallet_chain(pool: &PgPool, wallet_id: Uuid) -> Result<ChainVerification> {
        let rows = sqlx::query(
            r#"
            SELECT id, transaction_id, wallet_id, entry_type, amount, currency,
                   balance_after, created_at, previous_hash, hash
            FROM ledger_entries
            WHERE wallet_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(wallet_id)
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

            let id: Uuid = row.try_get("id")?;
            let transaction_id: Uuid = row.try_get("transaction_id")?;
            let entry_type_str: String = row.try_get("entry_type")?;
            let entry_type = EntryType::parse(&entry_type_str)
                .ok_or_else(|| kyd_common::KydError::Internal(format!("unknown entry_type: {entry_type_str}")))?;
            let amount: Decimal = row.try_get("amount")?;
            let currency_str: String = row.try_get("currency")?;
            let currency = Currency::new(&currency_str)?;
            let balance_after: Decimal = row.try_get("balance_after")?;
            let created_at = row.try_get("created_at")?;
            let stored_hash: String = row.try_get("hash")?;

            let recomputed = EventHasher::hash_ledger_entry(
                &stored_prev,
                id,
                transaction_id,
                wallet_id,
                entry_type,
                amount,
                currency,
                balance_after,
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
