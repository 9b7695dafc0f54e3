// wallet_store.rs
use kyd_common::error::{KydError, Result};
use rust_decimal::Decimal;
use sqlx::Row;
use uuid::Uuid;

use crate::models::{Wallet, WalletStatus};
use crate::txhandle::TxHandle;
use kyd_common::Currency;

/// Persists wallets; every operation here must run inside a transaction
/// that has already acquired the wallet's row lock in the deterministic
/// order of §4.6 step 1 — `WalletStore` itself does not order locks across
/// wallets, it only locks the one row it's given (§4.3).
pub struct WalletStore;

impl WalletStore {
    /// Acquires a row-level write lock and returns the wallet as it stands
    /// at lock time.
    pub async fn lock_for_update(tx: &mut TxHandle<'_>, wallet_id: Uuid) -> Result<Wallet> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, address, currency, available_balance, ledger_balance,
                   reserved_balance, status, created_at, updated_at, last_transaction_at
            FROM wallets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| KydError::NotFound(format!("wallet {wallet_id}")))?;

        row_to_wallet(&row)
    }

    /// Atomically decrements `available_balance` and `ledger_balance` if
    /// `available_balance >= amount`; the guarded `UPDATE` affecting zero
    /// rows is how `InsufficientBalance` is detected (§4.3, §4.6 step 2) —
    /// no separate read-then-check race window.
    pub async fn try_debit(
        tx: &mut TxHandle<'_>,
        wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<Decimal> {
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET available_balance = available_balance - $2,
                ledger_balance = ledger_balance - $2,
                updated_at = now()
            WHERE id = $1 AND available_balance >= $2
            RETURNING available_balance
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some(row) => Ok(row.try_get::<Decimal, _>("available_balance")?),
            None => {
                let current = Self::lock_for_update(tx, wallet_id).await?;
                Err(KydError::InsufficientBalance {
                    wallet_id: wallet_id.to_string(),
                    needed: amount.to_string(),
                    available: current.available_balance.to_string(),
                })
            }
        }
    }

    /// Increments `available_balance` and `ledger_balance`, and bumps
    /// `last_transaction_at` in addition to `updated_at` (§4.3).
    pub async fn credit(
        tx: &mut TxHandle<'_>,
        wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<Decimal> {
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET available_balance = available_balance + $2,
                ledger_balance = ledger_balance + $2,
                updated_at = now(),
                last_transaction_at = now()
            WHERE id = $1
            RETURNING available_balance
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| KydError::NotFound(format!("wallet {wallet_id}")))?;

        Ok(row.try_get::<Decimal, _>("available_balance")?)
    }

    /// Moves `amount` from `available_balance` to `reserved_balance`;
    /// `ledger_balance` is unchanged (escrow doesn't move funds out of the
    /// wallet, only out of the spendable portion).
    pub async fn reserve(tx: &mut TxHandle<'_>, wallet_id: Uuid, amount: Decimal) -> Result<()> {
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET available_balance = available_balance - $2,
                reserved_balance = reserved_balance + $2,
                updated_at = now()
            WHERE id = $1 AND available_balance >= $2
            RETURNING id
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await?;

        if row.is_some() {
            return Ok(());
        }

        let current = Self::lock_for_update(tx, wallet_id).await?;
        Err(KydError::InsufficientBalance {
            wallet_id: wallet_id.to_string(),
            needed: amount.to_string(),
            available: current.available_balance.to_string(),
        })
    }

    /// Moves `amount` back from `reserved_balance` to `available_balance`.
    pub async fn release_reserved(
        tx: &mut TxHandle<'_>,
        wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<Decimal> {
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET available_balance = available_balance + $2,
                reserved_balance = reserved_balance - $2,
                updated_at = now()
            WHERE id = $1
            RETURNING available_balance
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| KydError::NotFound(format!("wallet {wallet_id}")))?;

        Ok(row.try_get::<Decimal, _>("available_balance")?)
    }

    pub async fn find_by_id(tx: &mut TxHandle<'_>, wallet_id: Uuid) -> Result<Wallet> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, address, currency, available_balance, ledger_balance,
                   reserved_balance, status, created_at, updated_at, last_transaction_at
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| KydError::NotFound(format!("wallet {wallet_id}")))?;

        row_to_wallet(&row)
    }

    pub async fn find_by_address(tx: &mut TxHandle<'_>, address: &str) -> Result<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, address, currency, available_balance, ledger_balance,
                   reserved_balance, status, created_at, updated_at, last_transaction_at
            FROM wallets
            WHERE address = $1
            "#,
        )
        .bind(address)
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(row_to_wallet).transpose()
    }

    pub async fn find_default_for_user_currency(
        tx: &mut TxHandle<'_>,
        owner_id: Uuid,
        currency: Currency,
    ) -> Result<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, address, currency, available_balance, ledger_balance,
                   reserved_balance, status, created_at, updated_at, last_transaction_at
            FROM wallets
            WHERE owner_id = $1 AND currency = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .bind(currency.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(row_to_wallet).transpose()
    }

    pub async fn create(tx: &mut TxHandle<'_>, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, owner_id, address, currency, available_balance,
                                  ledger_balance, reserved_balance, status, created_at,
                                  updated_at, last_transaction_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.owner_id)
        .bind(&wallet.address)
        .bind(wallet.currency.as_str())
        .bind(wallet.available_balance)
        .bind(wallet.ledger_balance)
        .bind(wallet.reserved_balance)
        .bind(wallet.status.as_str())
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .bind(wallet.last_transaction_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn set_status(
        tx: &mut TxHandle<'_>,
        wallet_id: Uuid,
        status: WalletStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE wallets SET status = $2, updated_at = now() WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .bind(status.as_str())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

fn row_to_wallet(row: &sqlx::postgres::PgRow) -> Result<Wallet> {
    let currency_code: String = row.try_get("currency")?;
    let status_str: String = row.try_get("status")?;

    Ok(Wallet {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        address: row.try_get("address")?,
        currency: Currency::new(&currency_code)?,
        available_balance: row.try_get("available_balance")?,
        ledger_balance: row.try_get("ledger_balance")?,
        reserved_balance: row.try_get("reserved_balance")?,
        status: WalletStatus::parse(&status_str)
            .ok_or_else(|| KydError::Internal(format!("unknown wallet status: {status_str}")))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_transaction_at: row.try_get("last_transaction_at")?,
    })
}
