// posting_engine.rs
use kyd_common::error::Result;
use kyd_common::Currency;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::event_log::EventLog;
use crate::ledger_store::LedgerStore;
use crate::models::{EntryType, EventType, TransactionEvent};
use crate::txhandle::TxHandle;
use crate::wallet_store::WalletStore;

/// Input to a single posting; the sole writer of wallet balances and their
/// ledger/event rows (§4.6). Amounts are already rounded — the engine never
/// rounds.
#[derive(Debug, Clone)]
pub struct Posting {
    pub transaction_id: Uuid,
    pub debit_wallet_id: Uuid,
    pub credit_wallet_id: Uuid,
    pub debit_amount: Decimal,
    pub credit_amount: Decimal,
    pub currency: Currency,
    pub converted_currency: Currency,
    pub exchange_rate: Decimal,
    pub fee_amount: Decimal,
    pub event_type: EventType,
    pub description: String,
}

/// Result of a completed posting: both balances after, plus the event row
/// appended to the global chain.
#[derive(Debug, Clone)]
pub struct PostingResult {
    pub debit_balance_after: Decimal,
    pub credit_balance_after: Decimal,
    pub event: TransactionEvent,
}

pub struct PostingEngine;

impl PostingEngine {
    /// Runs the full six-write algorithm of §4.6 within `tx`, which the
    /// caller must have opened at serializable isolation. Every step runs
    /// against the same `tx`; a failure anywhere propagates up for the
    /// caller to roll back, so all writes vanish atomically together.
    pub async fn post(tx: &mut TxHandle<'_>, posting: &Posting) -> Result<PostingResult> {
        let (first, second) = if posting.debit_wallet_id.to_string() <= posting.credit_wallet_id.to_string() {
            (posting.debit_wallet_id, posting.credit_wallet_id)
        } else {
            (posting.credit_wallet_id, posting.debit_wallet_id)
        };

        WalletStore::lock_for_update(tx, first).await?;
        if second != first {
            WalletStore::lock_for_update(tx, second).await?;
        }

        let debit_balance_after =
            WalletStore::try_debit(tx, posting.debit_wallet_id, posting.debit_amount).await?;
        let credit_balance_after =
            WalletStore::credit(tx, posting.credit_wallet_id, posting.credit_amount).await?;

        LedgerStore::append_entry(
            tx,
            posting.transaction_id,
            posting.debit_wallet_id,
            EntryType::Debit,
            posting.debit_amount,
            posting.currency,
            debit_balance_after,
        )
        .await?;

        LedgerStore::append_entry(
            tx,
            posting.transaction_id,
            posting.credit_wallet_id,
            EntryType::Credit,
            posting.credit_amount,
            posting.converted_currency,
            credit_balance_after,
        )
        .await?;

        let event = EventLog::append_event(
            tx,
            posting.transaction_id,
            posting.event_type,
            posting.debit_amount,
            posting.currency,
            "completed",
        )
        .await?;

        Ok(PostingResult {
            debit_balance_after,
            credit_balance_after,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_order_is_lexicographic_by_string_id() {
        let a = Uuid::nil();
        let b = Uuid::from_u128(1);
        assert!(a.to_string() <= b.to_string());
    }
}
