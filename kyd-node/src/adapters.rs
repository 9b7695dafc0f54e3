//! Minimal default implementations of the external collaborator traits
//! (`kyd_payments::{ForexProvider, NotificationSink, SecuritySink, UserLookup}`).
//! These traits are the process's integration boundary to systems explicitly
//! out of scope (§1: FX sourcing, notification transport, KYC capture) —
//! the adapters here exist so `kyd-node` starts up and runs end to end
//! without a real integration plugged in; swap them for real clients at the
//! call sites in `main.rs`.

use async_trait::async_trait;
use chrono::Utc;
use kyd_common::error::{KydError, Result};
use kyd_common::Currency;
use kyd_payments::{ExchangeRate, ForexProvider, NotificationSink, SecurityEvent, SecuritySink, UserLookup, UserProfile};
use kyd_risk::KycStatus;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

/// Quotes 1:1 for matching currencies, `ExternalUnavailable` otherwise —
/// stands in until a real FX feed is wired in.
pub struct IdentityForexProvider;

#[async_trait]
impl ForexProvider for IdentityForexProvider {
    async fn get_rate(&self, from: Currency, to: Currency) -> Result<ExchangeRate> {
        if from != to {
            return Err(KydError::ExternalUnavailable(format!(
                "no FX rate source configured for {from}->{to}"
            )));
        }
        let now = Utc::now();
        Ok(ExchangeRate {
            rate: Decimal::ONE,
            buy_rate: Decimal::ONE,
            sell_rate: Decimal::ONE,
            valid_from: now,
            valid_to: now + chrono::Duration::hours(1),
        })
    }
}

/// Forwards notifications onto a bounded channel drained by a background
/// task (§9 design note); a full channel drops the notification rather than
/// blocking the caller — notifications are advisory, ledger work never is.
pub struct ChannelNotificationSink {
    sender: Sender<Notification>,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub user_id: Uuid,
    pub event_type: String,
    pub payload: Value,
}

impl ChannelNotificationSink {
    pub fn new(sender: Sender<Notification>) -> Self {
        ChannelNotificationSink { sender }
    }
}

#[async_trait]
impl NotificationSink for ChannelNotificationSink {
    async fn notify(&self, user_id: Uuid, event_type: &str, payload: Value) -> Result<()> {
        let notification = Notification {
            user_id,
            event_type: event_type.to_string(),
            payload,
        };
        if self.sender.try_send(notification).is_err() {
            tracing::warn!(user_id = %user_id, event_type, "notification channel full, dropping");
        }
        Ok(())
    }
}

/// Never blacklists anything; logs every check through `tracing` at the
/// target the reference workspace reserves for security events. Stands in
/// until a real blocklist/fraud service is wired in.
pub struct NoopSecuritySink;

#[async_trait]
impl SecuritySink for NoopSecuritySink {
    async fn is_blacklisted(&self, _value: &str) -> Result<bool> {
        Ok(false)
    }

    async fn log_event(&self, event: SecurityEvent) -> Result<()> {
        tracing::warn!(subject_id = %event.subject_id, kind = %event.kind, detail = %event.detail, "security event");
        Ok(())
    }
}

/// Treats every user as KYC-verified at the top tier — stands in until a
/// real user/KYC service is wired in; a deployment would replace this with
/// a client against the actual user-profile store (explicitly out of scope
/// per §1: "User profile encryption, KYC document capture").
pub struct AllVerifiedUserLookup;

#[async_trait]
impl UserLookup for AllVerifiedUserLookup {
    async fn find_user(&self, _id: Uuid) -> Result<UserProfile> {
        Ok(UserProfile {
            kyc_level: 3,
            kyc_status: KycStatus::Verified,
            country_code: "US".to_string(),
            device_trusted: None,
        })
    }
}
