use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use kyd_common::error::{KydError, Result};
use kyd_common::{time, Currency};
use kyd_ledger::{EntryType, EventLog, EventType, LedgerStore, Posting, PostingEngine};
use kyd_risk::{RiskContext, RiskDecision, RiskGate};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::collaborators::{ForexProvider, NotificationSink, SecurityEvent, SecuritySink, UserLookup};
use crate::models::{Transaction, TransactionStatus, TransactionType};
use crate::requests::{
    ApprovalDecision, CreateEscrowRequest, DisputeResolution, InitiatePaymentRequest, ReceiverRef,
};
use crate::transaction_store::TransactionStore;
use kyd_ledger::{WalletStatus, WalletStore};

/// Default fee rate applied in the source currency when a request doesn't
/// override it (§4.9 step 5).
pub const DEFAULT_FEE_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 3);

/// The transaction status machine of §4.9, backed by TransactionStore,
/// PostingEngine, RiskGate, and the external collaborator traits.
pub struct PaymentOrchestrator {
    pool: PgPool,
    risk_gate: RiskGate,
    forex: Arc<dyn ForexProvider>,
    notifications: Arc<dyn NotificationSink>,
    security: Arc<dyn SecuritySink>,
    users: Arc<dyn UserLookup>,
    fee_rate: Decimal,
}

impl PaymentOrchestrator {
    pub fn new(
        pool: PgPool,
        risk_gate: RiskGate,
        forex: Arc<dyn ForexProvider>,
        notifications: Arc<dyn NotificationSink>,
        security: Arc<dyn SecuritySink>,
        users: Arc<dyn UserLookup>,
    ) -> Self {
        PaymentOrchestrator {
            pool,
            risk_gate,
            forex,
            notifications,
            security,
            users,
            fee_rate: DEFAULT_FEE_RATE,
        }
    }

    pub async fn initiate_payment(&self, req: InitiatePaymentRequest) -> Result<Transaction> {
        // Step 1-2: idempotency short-circuit, then risk evaluation.
        if let Some(reference) = &req.reference {
            let mut tx = self.pool.begin().await?;
            if let Some(existing) = TransactionStore::find_by_reference(&mut tx, reference).await? {
                return Ok(existing);
            }
        }

        let risk_ctx = self
            .build_risk_context(req.sender_id, receiver_user_id(&req.receiver), req.amount, req.currency)
            .await?;
        match self.risk_gate.evaluate(&risk_ctx) {
            RiskDecision::Fail(reason) => {
                self.security
                    .log_event(SecurityEvent {
                        subject_id: req.sender_id,
                        kind: "risk_fail".to_string(),
                        detail: reason.clone(),
                    })
                    .await
                    .ok();
                return Err(KydError::RiskBlocked(reason));
            }
            RiskDecision::RequiresApproval => {
                return self.persist_pending_approval(&req).await;
            }
            RiskDecision::Pass => {}
        }

        self.run_payment(req).await
    }

    /// Builds the core transaction and posting, used by `initiate_payment`
    /// after a risk `Pass` (§4.9 step 3 onward).
    async fn run_payment(&self, req: InitiatePaymentRequest) -> Result<Transaction> {
        if req.amount <= Decimal::ZERO {
            return Err(KydError::Validation("amount must be greater than zero".to_string()));
        }

        let sender_wallet_currency = {
            let mut tx = self.pool.begin().await?;
            let wallet = WalletStore::find_by_id(&mut tx, req.sender_wallet_id).await?;
            if wallet.status != WalletStatus::Active {
                return Err(KydError::Validation(format!("sender wallet {} is not active", wallet.id)));
            }
            wallet.currency
        };

        if sender_wallet_currency != req.currency {
            return Err(KydError::CurrencyMismatch {
                left: sender_wallet_currency.to_string(),
                right: req.currency.to_string(),
            });
        }

        let receiver_wallet_id = self.resolve_receiver_wallet(&req.receiver, req.currency).await?;

        let receiver_wallet_currency = {
            let mut tx = self.pool.begin().await?;
            WalletStore::find_by_id(&mut tx, receiver_wallet_id).await?.currency
        };

        let (exchange_rate, converted_amount_gross) = if receiver_wallet_currency == req.currency {
            (Decimal::ONE, req.amount)
        } else {
            let quote = self.forex.get_rate(req.currency, receiver_wallet_currency).await?;
            (quote.sell_rate, req.amount * quote.sell_rate)
        };

        let fee = req.amount * self.fee_rate;
        let total_debit = req.amount + fee;

        {
            let mut tx = self.pool.begin().await?;
            let sender = WalletStore::find_by_id(&mut tx, req.sender_wallet_id).await?;
            if sender.available_balance < total_debit {
                return Err(KydError::InsufficientBalance {
                    wallet_id: sender.id.to_string(),
                    needed: total_debit.to_string(),
                    available: sender.available_balance.to_string(),
                });
            }
        }

        let reference = req.reference.clone().unwrap_or_else(generate_reference);
        let now = time::now_utc_truncated_to_us();
        let transaction_id = Uuid::new_v4();

        let mut txn = Transaction {
            id: transaction_id,
            reference: reference.clone(),
            sender_id: req.sender_id,
            receiver_id: receiver_user_id(&req.receiver),
            sender_wallet_id: req.sender_wallet_id,
            receiver_wallet_id,
            amount: req.amount,
            currency: req.currency,
            converted_amount: converted_amount_gross,
            converted_currency: receiver_wallet_currency,
            exchange_rate,
            fee_amount: fee,
            transaction_type: TransactionType::Payment,
            status: TransactionStatus::Pending,
            failure_reason: None,
            escrow_expiry: None,
            dispute_reason: None,
            description: req.description.clone(),
            metadata: req.metadata.clone(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let posting = Posting {
            transaction_id,
            debit_wallet_id: req.sender_wallet_id,
            credit_wallet_id: receiver_wallet_id,
            debit_amount: total_debit,
            credit_amount: converted_amount_gross,
            currency: req.currency,
            converted_currency: receiver_wallet_currency,
            exchange_rate,
            fee_amount: fee,
            event_type: EventType::Payment,
            description: req.description.clone().unwrap_or_default(),
        };

        {
            let mut tx = self.pool.begin().await?;
            match TransactionStore::create(&mut tx, &txn).await {
                Ok(()) => tx.commit().await?,
                Err(KydError::TransactionAlreadyExists { reference }) => {
                    let mut tx = self.pool.begin().await?;
                    return TransactionStore::find_by_reference(&mut tx, &reference)
                        .await?
                        .ok_or_else(|| KydError::Internal("idempotency race lost the winning row".to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        self.finalize_posting(txn, posting).await
    }

    /// Runs `PostingEngine::post` for an already-persisted transaction and
    /// transitions it to `pending_settlement` or `failed` accordingly (§4.9
    /// step 4 onward). Shared by `run_payment` (a fresh `pending` row) and
    /// the approve arm of `review_pending_approval` (an existing
    /// `pending_approval` row moved to `processing`) — both already hold
    /// their transaction row, so this never touches `TransactionStore::create`.
    async fn finalize_posting(&self, mut txn: Transaction, posting: Posting) -> Result<Transaction> {
        let mut db_tx = self.pool.begin().await?;
        let posting_result = PostingEngine::post(&mut db_tx, &posting).await;

        match posting_result {
            Ok(_) => {
                db_tx.commit().await?;
                self.risk_gate.record_posting_outcome(true);

                txn.status = TransactionStatus::PendingSettlement;
                txn.completed_at = Some(time::now_utc_truncated_to_us());
                txn.updated_at = txn.completed_at.unwrap();

                let mut tx = self.pool.begin().await?;
                TransactionStore::update(&mut tx, &txn).await?;
                tx.commit().await?;

                self.notifications
                    .notify(txn.sender_id, "payment_completed", serde_json::json!({ "transaction_id": txn.id }))
                    .await
                    .ok();

                Ok(txn)
            }
            Err(e) => {
                let _ = db_tx.rollback().await;
                self.risk_gate.record_posting_outcome(false);

                txn.status = TransactionStatus::Failed;
                txn.failure_reason = Some(e.to_string());
                txn.updated_at = time::now_utc_truncated_to_us();

                let mut tx = self.pool.begin().await?;
                TransactionStore::update(&mut tx, &txn).await?;
                if let Err(event_err) =
                    EventLog::append_event_retrying(&self.pool, txn.id, EventType::Failed, txn.amount, txn.currency, "failed").await
                {
                    tracing::warn!(transaction_id = %txn.id, error = %event_err, "failed to record failed event");
                }
                tx.commit().await?;

                Err(e)
            }
        }
    }

    async fn persist_pending_approval(&self, req: &InitiatePaymentRequest) -> Result<Transaction> {
        if req.amount <= Decimal::ZERO {
            return Err(KydError::Validation("amount must be greater than zero".to_string()));
        }

        let receiver_wallet_id = self.resolve_receiver_wallet(&req.receiver, req.currency).await?;
        let now = time::now_utc_truncated_to_us();

        let txn = Transaction {
            id: Uuid::new_v4(),
            reference: req.reference.clone().unwrap_or_else(generate_reference),
            sender_id: req.sender_id,
            receiver_id: receiver_user_id(&req.receiver),
            sender_wallet_id: req.sender_wallet_id,
            receiver_wallet_id,
            amount: req.amount,
            currency: req.currency,
            converted_amount: req.amount,
            converted_currency: req.currency,
            exchange_rate: Decimal::ONE,
            fee_amount: req.amount * self.fee_rate,
            transaction_type: TransactionType::Payment,
            status: TransactionStatus::PendingApproval,
            failure_reason: None,
            escrow_expiry: None,
            dispute_reason: None,
            description: req.description.clone(),
            metadata: req.metadata.clone(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut tx = self.pool.begin().await?;
        TransactionStore::create(&mut tx, &txn).await?;
        tx.commit().await?;

        Ok(txn)
    }

    pub async fn create_escrow(&self, req: CreateEscrowRequest) -> Result<Transaction> {
        if req.amount <= Decimal::ZERO {
            return Err(KydError::Validation("amount must be greater than zero".to_string()));
        }

        let risk_ctx = self
            .build_risk_context(req.sender_id, receiver_user_id(&req.receiver), req.amount, req.currency)
            .await?;
        match self.risk_gate.evaluate(&risk_ctx) {
            RiskDecision::Fail(reason) => return Err(KydError::RiskBlocked(reason)),
            RiskDecision::RequiresApproval | RiskDecision::Pass => {}
        }

        let receiver_wallet_id = self.resolve_receiver_wallet(&req.receiver, req.currency).await?;
        let now = time::now_utc_truncated_to_us();
        let transaction_id = Uuid::new_v4();

        let txn = Transaction {
            id: transaction_id,
            reference: req.reference.clone().unwrap_or_else(generate_reference),
            sender_id: req.sender_id,
            receiver_id: receiver_user_id(&req.receiver),
            sender_wallet_id: req.sender_wallet_id,
            receiver_wallet_id,
            amount: req.amount,
            currency: req.currency,
            converted_amount: req.amount,
            converted_currency: req.currency,
            exchange_rate: Decimal::ONE,
            fee_amount: Decimal::ZERO,
            transaction_type: TransactionType::Payment,
            status: TransactionStatus::Reserved,
            failure_reason: None,
            escrow_expiry: Some(req.expiry),
            dispute_reason: None,
            description: req.description.clone(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut tx = self.pool.begin().await?;
        TransactionStore::create(&mut tx, &txn).await?;
        WalletStore::reserve(&mut tx, req.sender_wallet_id, req.amount).await?;
        EventLog::append_event(&mut tx, transaction_id, EventType::EscrowReserved, req.amount, req.currency, "reserved").await?;
        tx.commit().await?;

        Ok(txn)
    }

    pub async fn release_escrow(&self, tx_id: Uuid, by_user: Uuid) -> Result<Transaction> {
        let mut tx = self.pool.begin().await?;
        let mut txn = TransactionStore::find_by_id(&mut tx, tx_id).await?;
        tx.commit().await?;

        if txn.status != TransactionStatus::Reserved {
            return Err(KydError::InvalidStateTransition {
                from: txn.status.as_str().to_string(),
                to: "completed".to_string(),
            });
        }
        if by_user != txn.sender_id && by_user != txn.receiver_id {
            return Err(KydError::Validation("caller is not party to this escrow".to_string()));
        }

        // The escrowed amount already left `available_balance` at reserve
        // time, so this isn't a plain PostingEngine posting: releasing
        // moves it from `reserved_balance` straight to the receiver rather
        // than debiting `available_balance` a second time.
        let mut db_tx = self.pool.begin().await?;
        let sender_balance_after = WalletStore::release_reserved(&mut db_tx, txn.sender_wallet_id, txn.amount).await?;
        WalletStore::try_debit(&mut db_tx, txn.sender_wallet_id, txn.amount).await?;
        let credit_balance_after = WalletStore::credit(&mut db_tx, txn.receiver_wallet_id, txn.amount).await?;

        LedgerStore::append_entry(
            &mut db_tx,
            tx_id,
            txn.sender_wallet_id,
            EntryType::Debit,
            txn.amount,
            txn.currency,
            sender_balance_after - txn.amount,
        )
        .await?;
        LedgerStore::append_entry(
            &mut db_tx,
            tx_id,
            txn.receiver_wallet_id,
            EntryType::Credit,
            txn.amount,
            txn.currency,
            credit_balance_after,
        )
        .await?;
        EventLog::append_event(&mut db_tx, tx_id, EventType::EscrowReleased, txn.amount, txn.currency, "completed").await?;
        db_tx.commit().await?;

        txn.status = TransactionStatus::Completed;
        txn.completed_at = Some(time::now_utc_truncated_to_us());
        txn.updated_at = txn.completed_at.unwrap();

        let mut tx = self.pool.begin().await?;
        TransactionStore::update(&mut tx, &txn).await?;
        tx.commit().await?;

        Ok(txn)
    }

    pub async fn refund_escrow(&self, tx_id: Uuid, by_user: Uuid) -> Result<Transaction> {
        let mut tx = self.pool.begin().await?;
        let mut txn = TransactionStore::find_by_id(&mut tx, tx_id).await?;
        tx.commit().await?;

        if txn.status != TransactionStatus::Reserved {
            return Err(KydError::InvalidStateTransition {
                from: txn.status.as_str().to_string(),
                to: "cancelled".to_string(),
            });
        }

        let expiry = txn.escrow_expiry.ok_or_else(|| KydError::Internal("reserved transaction missing escrow_expiry".to_string()))?;
        if Utc::now() < expiry && by_user != txn.sender_id {
            return Err(KydError::Validation("only the sender may refund an escrow before expiry".to_string()));
        }

        let mut db_tx = self.pool.begin().await?;
        WalletStore::release_reserved(&mut db_tx, txn.sender_wallet_id, txn.amount).await?;
        EventLog::append_event(&mut db_tx, tx_id, EventType::EscrowRefunded, txn.amount, txn.currency, "cancelled").await?;
        db_tx.commit().await?;

        txn.status = TransactionStatus::Cancelled;
        txn.updated_at = time::now_utc_truncated_to_us();

        let mut tx = self.pool.begin().await?;
        TransactionStore::update(&mut tx, &txn).await?;
        tx.commit().await?;

        Ok(txn)
    }

    pub async fn initiate_dispute(&self, tx_id: Uuid, reason: String, _desc: Option<String>) -> Result<Transaction> {
        let mut tx = self.pool.begin().await?;
        let mut txn = TransactionStore::find_by_id(&mut tx, tx_id).await?;

        if txn.status == TransactionStatus::Disputed {
            tx.commit().await?;
            return Ok(txn);
        }
        if !matches!(txn.status, TransactionStatus::Completed | TransactionStatus::PendingSettlement) {
            return Err(KydError::InvalidStateTransition {
                from: txn.status.as_str().to_string(),
                to: "disputed".to_string(),
            });
        }

        txn.status = TransactionStatus::Disputed;
        txn.dispute_reason = Some(reason.clone());
        txn.updated_at = time::now_utc_truncated_to_us();
        TransactionStore::update(&mut tx, &txn).await?;
        EventLog::append_event(&mut tx, tx_id, EventType::DisputeOpened, txn.amount, txn.currency, "disputed").await?;
        tx.commit().await?;

        Ok(txn)
    }

    pub async fn resolve_dispute(
        &self,
        tx_id: Uuid,
        resolution: DisputeResolution,
        _admin_id: Uuid,
        _notes: Option<String>,
    ) -> Result<Transaction> {
        let mut tx = self.pool.begin().await?;
        let mut txn = TransactionStore::find_by_id(&mut tx, tx_id).await?;
        tx.commit().await?;

        if txn.status != TransactionStatus::Disputed {
            return Err(KydError::InvalidStateTransition {
                from: txn.status.as_str().to_string(),
                to: "resolved".to_string(),
            });
        }

        match resolution {
            DisputeResolution::Dismiss => {
                txn.status = TransactionStatus::Completed;
                txn.updated_at = time::now_utc_truncated_to_us();
                let mut tx = self.pool.begin().await?;
                TransactionStore::update(&mut tx, &txn).await?;
                tx.commit().await?;
                Ok(txn)
            }
            DisputeResolution::Reverse => {
                let net_amount = txn.net_amount();
                let posting = Posting {
                    transaction_id: tx_id,
                    debit_wallet_id: txn.receiver_wallet_id,
                    credit_wallet_id: txn.sender_wallet_id,
                    debit_amount: net_amount,
                    credit_amount: net_amount,
                    currency: txn.converted_currency,
                    converted_currency: txn.currency,
                    exchange_rate: Decimal::ONE,
                    fee_amount: Decimal::ZERO,
                    event_type: EventType::DisputeReversed,
                    description: "dispute reversal".to_string(),
                };

                let mut db_tx = self.pool.begin().await?;
                PostingEngine::post(&mut db_tx, &posting).await?;
                db_tx.commit().await?;

                txn.status = TransactionStatus::Reversed;
                txn.updated_at = time::now_utc_truncated_to_us();
                let mut tx = self.pool.begin().await?;
                TransactionStore::update(&mut tx, &txn).await?;
                tx.commit().await?;
                Ok(txn)
            }
        }
    }

    pub async fn review_pending_approval(
        &self,
        tx_id: Uuid,
        _admin: Uuid,
        decision: ApprovalDecision,
        reason: Option<String>,
    ) -> Result<Transaction> {
        let mut tx = self.pool.begin().await?;
        let mut txn = TransactionStore::find_by_id(&mut tx, tx_id).await?;
        tx.commit().await?;

        if txn.status != TransactionStatus::PendingApproval {
            return Err(KydError::InvalidStateTransition {
                from: txn.status.as_str().to_string(),
                to: "processing".to_string(),
            });
        }

        match decision {
            ApprovalDecision::Reject => {
                txn.status = TransactionStatus::Failed;
                txn.failure_reason = reason.or_else(|| Some("rejected by admin".to_string()));
                txn.updated_at = time::now_utc_truncated_to_us();
                let mut tx = self.pool.begin().await?;
                TransactionStore::update(&mut tx, &txn).await?;
                EventLog::append_event_retrying(&self.pool, tx_id, EventType::AdminRejected, txn.amount, txn.currency, "failed").await?;
                tx.commit().await?;
                Ok(txn)
            }
            ApprovalDecision::Approve => {
                txn.status = TransactionStatus::Processing;
                txn.updated_at = time::now_utc_truncated_to_us();
                let mut tx = self.pool.begin().await?;
                TransactionStore::update(&mut tx, &txn).await?;
                tx.commit().await?;

                let posting = Posting {
                    transaction_id: txn.id,
                    debit_wallet_id: txn.sender_wallet_id,
                    credit_wallet_id: txn.receiver_wallet_id,
                    debit_amount: txn.amount + txn.fee_amount,
                    credit_amount: txn.converted_amount,
                    currency: txn.currency,
                    converted_currency: txn.converted_currency,
                    exchange_rate: txn.exchange_rate,
                    fee_amount: txn.fee_amount,
                    event_type: EventType::Payment,
                    description: txn.description.clone().unwrap_or_default(),
                };

                self.finalize_posting(txn, posting).await
            }
        }
    }

    async fn build_risk_context(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        amount: Decimal,
        currency: Currency,
    ) -> Result<RiskContext> {
        let profile = self.users.find_user(sender_id).await?;
        let sender_blacklisted = self.security.is_blacklisted(&sender_id.to_string()).await.unwrap_or(true);
        let receiver_blacklisted = if receiver_id.is_nil() {
            false
        } else {
            self.security.is_blacklisted(&receiver_id.to_string()).await.unwrap_or(true)
        };

        let since_24h = Utc::now() - ChronoDuration::hours(24);
        let since_1h = Utc::now() - ChronoDuration::hours(1);

        let mut tx = self.pool.begin().await?;
        let sum_24h = TransactionStore::sum_sender_24h(&mut tx, sender_id, currency, since_24h).await?;
        let count_1h = TransactionStore::count_sender_1h(&mut tx, sender_id, since_1h).await?;
        let high_value_count_1h =
            TransactionStore::count_sender_high_value_1h(&mut tx, sender_id, Decimal::new(1_000_000, 0), since_1h).await?;
        tx.commit().await?;

        Ok(RiskContext {
            sender_id,
            receiver_id,
            sender_blacklisted,
            receiver_blacklisted,
            receiver_address_blacklisted: false,
            sender_country_code: profile.country_code,
            sender_kyc_status: profile.kyc_status,
            sender_kyc_level: profile.kyc_level,
            amount,
            sender_same_currency_24h_sum: sum_24h,
            sender_tx_count_1h: count_1h as u32,
            sender_high_value_tx_count_1h: high_value_count_1h as u32,
        })
    }

    async fn resolve_receiver_wallet(&self, receiver: &ReceiverRef, currency: Currency) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        let wallet = match receiver {
            ReceiverRef::WalletAddress(address) => {
                if self.security.is_blacklisted(address).await.unwrap_or(true) {
                    return Err(KydError::SecurityRestricted(format!("wallet address {address} is blocked")));
                }
                WalletStore::find_by_address(&mut tx, address)
                    .await?
                    .ok_or_else(|| KydError::NotFound(format!("wallet address {address}")))?
            }
            ReceiverRef::UserAndCurrency(user_id, dest_currency) => {
                WalletStore::find_default_for_user_currency(&mut tx, *user_id, *dest_currency)
                    .await?
                    .ok_or_else(|| KydError::NotFound(format!("wallet for user {user_id} in {dest_currency}")))?
            }
            ReceiverRef::UserDefault(user_id) => WalletStore::find_default_for_user_currency(&mut tx, *user_id, currency)
                .await?
                .ok_or_else(|| KydError::NotFound(format!("default wallet for user {user_id}")))?,
        };

        Ok(wallet.id)
    }
}

fn receiver_user_id(receiver: &ReceiverRef) -> Uuid {
    match receiver {
        ReceiverRef::UserAndCurrency(user_id, _) | ReceiverRef::UserDefault(user_id) => *user_id,
        // An explicit wallet address has no user id available before
        // resolution; the caller is expected to use the other variants
        // when attribution to a receiving user matters.
        ReceiverRef::WalletAddress(_) => Uuid::nil(),
    }
}

fn generate_reference() -> String {
    let unix = Utc::now().timestamp();
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    format!("KYD-{unix}-{suffix}")
}
