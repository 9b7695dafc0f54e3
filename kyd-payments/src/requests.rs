use chrono::{DateTime, Utc};
use kyd_common::Currency;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Receiver resolution order (§4.9 step 3): an explicit wallet address
/// beats a (user, currency) pair, which beats falling back to the
/// sender-specified receiver's default wallet in the source currency.
#[derive(Debug, Clone)]
pub enum ReceiverRef {
    WalletAddress(String),
    UserAndCurrency(Uuid, Currency),
    UserDefault(Uuid),
}

#[derive(Debug, Clone)]
pub struct InitiatePaymentRequest {
    pub sender_id: Uuid,
    pub sender_wallet_id: Uuid,
    pub receiver: ReceiverRef,
    pub amount: Decimal,
    pub currency: Currency,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct CreateEscrowRequest {
    pub sender_id: Uuid,
    pub sender_wallet_id: Uuid,
    pub receiver: ReceiverRef,
    pub amount: Decimal,
    pub currency: Currency,
    pub reference: Option<String>,
    pub expiry: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeResolution {
    Reverse,
    Dismiss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject,
}
