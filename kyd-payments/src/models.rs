use chrono::{DateTime, Utc};
use kyd_common::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Payment,
    Transfer,
    Withdrawal,
    Deposit,
    Refund,
    Reversal,
    Settlement,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Payment => "payment",
            TransactionType::Transfer => "transfer",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Deposit => "deposit",
            TransactionType::Refund => "refund",
            TransactionType::Reversal => "reversal",
            TransactionType::Settlement => "settlement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "payment" => TransactionType::Payment,
            "transfer" => TransactionType::Transfer,
            "withdrawal" => TransactionType::Withdrawal,
            "deposit" => TransactionType::Deposit,
            "refund" => TransactionType::Refund,
            "reversal" => TransactionType::Reversal,
            "settlement" => TransactionType::Settlement,
            _ => return None,
        })
    }
}

/// Status machine of §4.9. Transitions outside the diagram are rejected
/// with `InvalidStateTransition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    PendingApproval,
    Processing,
    PendingSettlement,
    Settling,
    Completed,
    Failed,
    Reserved,
    Disputed,
    Reversed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::PendingApproval => "pending_approval",
            TransactionStatus::Processing => "processing",
            TransactionStatus::PendingSettlement => "pending_settlement",
            TransactionStatus::Settling => "settling",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Reserved => "reserved",
            TransactionStatus::Disputed => "disputed",
            TransactionStatus::Reversed => "reversed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => TransactionStatus::Pending,
            "pending_approval" => TransactionStatus::PendingApproval,
            "processing" => TransactionStatus::Processing,
            "pending_settlement" => TransactionStatus::PendingSettlement,
            "settling" => TransactionStatus::Settling,
            "completed" => TransactionStatus::Completed,
            "failed" => TransactionStatus::Failed,
            "reserved" => TransactionStatus::Reserved,
            "disputed" => TransactionStatus::Disputed,
            "reversed" => TransactionStatus::Reversed,
            "cancelled" => TransactionStatus::Cancelled,
            _ => return None,
        })
    }

    /// Terminal states: only `metadata` may change once reached (§3).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Failed
                | TransactionStatus::Cancelled
                | TransactionStatus::Reversed
        )
    }
}

/// A logical money-movement request (§3). `net_amount = converted_amount -
/// fee_amount` expressed in the converted currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub sender_wallet_id: Uuid,
    pub receiver_wallet_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub converted_amount: Decimal,
    pub converted_currency: Currency,
    pub exchange_rate: Decimal,
    pub fee_amount: Decimal,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub escrow_expiry: Option<DateTime<Utc>>,
    pub dispute_reason: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// `net = converted − fee`, per §3's invariant. Fee is debited in the
    /// source currency, so this only holds exactly when `currency ==
    /// converted_currency`; cross-currency callers compare against the
    /// amount actually credited, not a re-derived conversion of the fee.
    pub fn net_amount(&self) -> Decimal {
        self.converted_amount - self.fee_amount
    }
}
