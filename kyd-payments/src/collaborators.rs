use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kyd_common::error::Result;
use kyd_common::Currency;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

/// §6 — narrow trait boundary for the external FX subsystem. Must be pure
/// beyond its own cache: no side effects the orchestrator depends on.
#[async_trait]
pub trait ForexProvider: Send + Sync {
    async fn get_rate(&self, from: Currency, to: Currency) -> Result<ExchangeRate>;
}

#[derive(Debug, Clone, Copy)]
pub struct ExchangeRate {
    pub rate: Decimal,
    pub buy_rate: Decimal,
    pub sell_rate: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

/// §6 — fire-and-forget notification dispatch. A failure here must never
/// affect ledger state; callers log and swallow errors from this trait.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: Uuid, event_type: &str, payload: Value) -> Result<()>;
}

/// §6 — blocklist and security-event sink. Blocklist checks fail closed:
/// an error from `is_blacklisted` must be treated as a hit, not a pass.
#[async_trait]
pub trait SecuritySink: Send + Sync {
    async fn is_blacklisted(&self, value: &str) -> Result<bool>;
    async fn log_event(&self, event: SecurityEvent) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SecurityEvent {
    pub subject_id: Uuid,
    pub kind: String,
    pub detail: String,
}

/// §6 — user profile lookup backing KYC gating and country restriction.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<UserProfile>;
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub kyc_level: u8,
    pub kyc_status: kyd_risk::KycStatus,
    pub country_code: String,
    pub device_trusted: Option<bool>,
}
