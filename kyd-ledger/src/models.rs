// models.rs
use chrono::{DateTime, Utc};
use kyd_common::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 64 hex zeros — the seed `previous_hash` for the first row of every chain.
pub const GENESIS: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    Suspended,
    Closed,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Active => "active",
            WalletStatus::Suspended => "suspended",
            WalletStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(WalletStatus::Active),
            "suspended" => Some(WalletStatus::Suspended),
            "closed" => Some(WalletStatus::Closed),
            _ => None,
        }
    }
}

/// Owned by one user, tagged with a currency immutable after creation.
/// Invariant (§3): `available_balance + reserved_balance == ledger_balance`,
/// both `available_balance` and `ledger_balance` non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub address: Option<String>,
    pub currency: Currency,
    pub available_balance: Decimal,
    pub ledger_balance: Decimal,
    pub reserved_balance: Decimal,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl Wallet {
    /// Checks the balance invariant; used by tests and by verification
    /// tooling, never by the hot path (PostingEngine enforces it by
    /// construction).
    pub fn balances_consistent(&self) -> bool {
        self.available_balance + self.reserved_balance == self.ledger_balance
            && self.available_balance >= Decimal::ZERO
            && self.ledger_balance >= Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "debit",
            EntryType::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(EntryType::Debit),
            "credit" => Some(EntryType::Credit),
            _ => None,
        }
    }
}

/// One row per side of a posting, chained within its wallet (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub currency: Currency,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
    pub previous_hash: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Genesis,
    Payment,
    EscrowReserved,
    EscrowReleased,
    EscrowRefunded,
    DisputeOpened,
    DisputeReversed,
    AdminApproved,
    AdminRejected,
    SettlementRecorded,
    Failed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Genesis => "genesis",
            EventType::Payment => "payment",
            EventType::EscrowReserved => "escrow_reserved",
            EventType::EscrowReleased => "escrow_released",
            EventType::EscrowRefunded => "escrow_refunded",
            EventType::DisputeOpened => "dispute_opened",
            EventType::DisputeReversed => "dispute_reversed",
            EventType::AdminApproved => "admin_approved",
            EventType::AdminRejected => "admin_rejected",
            EventType::SettlementRecorded => "settlement_recorded",
            EventType::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "genesis" => EventType::Genesis,
            "payment" => EventType::Payment,
            "escrow_reserved" => EventType::EscrowReserved,
            "escrow_released" => EventType::EscrowReleased,
            "escrow_refunded" => EventType::EscrowRefunded,
            "dispute_opened" => EventType::DisputeOpened,
            "dispute_reversed" => EventType::DisputeReversed,
            "admin_approved" => EventType::AdminApproved,
            "admin_rejected" => EventType::AdminRejected,
            "settlement_recorded" => EventType::SettlementRecorded,
            "failed" => EventType::Failed,
            _ => return None,
        })
    }
}

/// Append-only global lifecycle record, participating in the single global
/// hash chain (§3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub event_type: EventType,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: String,
    pub previous_hash: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// Result of walking a chain end to end (§4.4, §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
    Valid,
    Broken { broken_at: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_64_zero_chars() {
        assert_eq!(GENESIS.len(), 64);
        assert!(GENESIS.chars().all(|c| c == '0'));
    }

    #[test]
    fn wallet_balance_invariant() {
        let mut w = sample_wallet();
        assert!(w.balances_consistent());
        w.ledger_balance = Decimal::from(999);
        assert!(!w.balances_consistent());
    }

    fn sample_wallet() -> Wallet {
        Wallet {
            id: Uuid::nil(),
            owner_id: Uuid::nil(),
            address: None,
            currency: Currency::new("USD").unwrap(),
            available_balance: Decimal::from(10),
            ledger_balance: Decimal::from(10),
            reserved_balance: Decimal::ZERO,
            status: WalletStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_transaction_at: None,
        }
    }
}
