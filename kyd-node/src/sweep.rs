//! Reclaims transactions stuck in `pending`/`processing` (§7 recovery
//! policy: "the orchestrator's only durable state mutation outside C6 is
//! the initial `pending` row, which is either updated to a terminal state
//! or reclaimed by a periodic `find_stuck_pending` sweep").

use std::time::Duration;

use chrono::Utc;
use kyd_payments::{Transaction, TransactionStatus, TransactionStore};
use sqlx::PgPool;

pub async fn run(pool: PgPool, interval: Duration, older_than_secs: i64) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = sweep_once(&pool, older_than_secs).await {
            tracing::error!(error = %e, "stuck-pending sweep failed");
        }
    }
}

async fn sweep_once(pool: &PgPool, older_than_secs: i64) -> kyd_common::error::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::seconds(older_than_secs);

    let mut tx = pool.begin().await?;
    let stuck = TransactionStore::find_stuck_pending(&mut tx, cutoff).await?;
    for mut txn in stuck {
        reclaim(&mut txn);
        TransactionStore::update(&mut tx, &txn).await?;
        tracing::warn!(transaction_id = %txn.id, reference = %txn.reference, "reclaimed stuck transaction");
    }
    tx.commit().await?;
    Ok(())
}

fn reclaim(txn: &mut Transaction) {
    txn.status = TransactionStatus::Failed;
    txn.failure_reason = Some("stuck".to_string());
    txn.updated_at = kyd_common::time::now_utc_truncated_to_us();
}
