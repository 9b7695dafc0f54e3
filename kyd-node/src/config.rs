use std::collections::HashSet;
use std::time::Duration;

use kyd_common::error::{KydError, Result};
use kyd_risk::{KycTierLimits, RiskPolicy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Loaded once at startup (reference pattern: `atlas_node::config::Config::
/// load_from_file`) and shared read-only for the life of the process.
/// `database_url` is deliberately absent: it's read from the `DATABASE_URL`
/// environment variable, not the config file, so secrets never land on disk
/// alongside policy thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub risk_policy: RiskPolicyConfig,
    #[serde(default = "default_notification_capacity")]
    pub notification_channel_capacity: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_stuck_pending_after_secs")]
    pub stuck_pending_after_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_connections: default_max_connections(),
            risk_policy: RiskPolicyConfig::default(),
            notification_channel_capacity: default_notification_capacity(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stuck_pending_after_secs: default_stuck_pending_after_secs(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| KydError::Internal(format!("reading config {path}: {e}")))?;
        serde_json::from_str(&data).map_err(KydError::Serialization)
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_notification_capacity() -> usize {
    100
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_stuck_pending_after_secs() -> i64 {
    300
}

/// Serializable mirror of `kyd_risk::RiskPolicy` (§4.8) — `RiskPolicy` holds
/// `Duration`s and isn't itself `Deserialize`, so the config file's JSON
/// shape is translated via `into_policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicyConfig {
    #[serde(default)]
    pub restricted_countries: HashSet<String>,
    #[serde(default = "default_kyc_single_tx_limits")]
    pub kyc_single_transaction_limits: [Decimal; 4],
    #[serde(default = "default_kyc_daily_limits")]
    pub kyc_daily_limits: [Decimal; 4],
    #[serde(default = "default_velocity_cap_1h")]
    pub velocity_cap_1h: u32,
    #[serde(default = "default_high_value_threshold")]
    pub high_value_threshold: Decimal,
    #[serde(default = "default_high_value_cap_1h")]
    pub high_value_cap_1h: u32,
    #[serde(default = "default_cool_off_flagged_threshold")]
    pub cool_off_flagged_threshold: u32,
    #[serde(default = "default_cool_off_window_secs")]
    pub cool_off_window_secs: u64,
    #[serde(default = "default_admin_approval_threshold")]
    pub admin_approval_threshold: Decimal,
    #[serde(default = "default_circuit_breaker_failure_rate_threshold")]
    pub circuit_breaker_failure_rate_threshold: f64,
    #[serde(default = "default_circuit_breaker_min_samples")]
    pub circuit_breaker_min_samples: u32,
    #[serde(default = "default_circuit_breaker_cooldown_secs")]
    pub circuit_breaker_cooldown_secs: u64,
    #[serde(default = "default_fee_rate")]
    pub default_fee_rate: Decimal,
}

impl Default for RiskPolicyConfig {
    fn default() -> Self {
        let defaults = RiskPolicy::default();
        RiskPolicyConfig {
            restricted_countries: defaults.restricted_countries,
            kyc_single_transaction_limits: defaults.kyc_tier_limits.single_transaction,
            kyc_daily_limits: defaults.kyc_tier_limits.daily,
            velocity_cap_1h: defaults.velocity_cap_1h,
            high_value_threshold: defaults.high_value_threshold,
            high_value_cap_1h: defaults.high_value_cap_1h,
            cool_off_flagged_threshold: defaults.cool_off_flagged_threshold,
            cool_off_window_secs: defaults.cool_off_window.as_secs(),
            admin_approval_threshold: defaults.admin_approval_threshold,
            circuit_breaker_failure_rate_threshold: defaults.circuit_breaker_failure_rate_threshold,
            circuit_breaker_min_samples: defaults.circuit_breaker_min_samples,
            circuit_breaker_cooldown_secs: defaults.circuit_breaker_cooldown.as_secs(),
            default_fee_rate: default_fee_rate(),
        }
    }
}

impl RiskPolicyConfig {
    pub fn into_policy(self) -> RiskPolicy {
        RiskPolicy {
            restricted_countries: self.restricted_countries,
            kyc_tier_limits: KycTierLimits {
                single_transaction: self.kyc_single_transaction_limits,
                daily: self.kyc_daily_limits,
            },
            velocity_cap_1h: self.velocity_cap_1h,
            high_value_threshold: self.high_value_threshold,
            high_value_cap_1h: self.high_value_cap_1h,
            cool_off_flagged_threshold: self.cool_off_flagged_threshold,
            cool_off_window: Duration::from_secs(self.cool_off_window_secs),
            admin_approval_threshold: self.admin_approval_threshold,
            circuit_breaker_failure_rate_threshold: self.circuit_breaker_failure_rate_threshold,
            circuit_breaker_min_samples: self.circuit_breaker_min_samples,
            circuit_breaker_cooldown: Duration::from_secs(self.circuit_breaker_cooldown_secs),
        }
    }
}

fn default_kyc_single_tx_limits() -> [Decimal; 4] {
    RiskPolicy::default().kyc_tier_limits.single_transaction
}

fn default_kyc_daily_limits() -> [Decimal; 4] {
    RiskPolicy::default().kyc_tier_limits.daily
}

fn default_velocity_cap_1h() -> u32 {
    RiskPolicy::default().velocity_cap_1h
}

fn default_high_value_threshold() -> Decimal {
    RiskPolicy::default().high_value_threshold
}

fn default_high_value_cap_1h() -> u32 {
    RiskPolicy::default().high_value_cap_1h
}

fn default_cool_off_flagged_threshold() -> u32 {
    RiskPolicy::default().cool_off_flagged_threshold
}

fn default_cool_off_window_secs() -> u64 {
    RiskPolicy::default().cool_off_window.as_secs()
}

fn default_admin_approval_threshold() -> Decimal {
    RiskPolicy::default().admin_approval_threshold
}

fn default_circuit_breaker_failure_rate_threshold() -> f64 {
    RiskPolicy::default().circuit_breaker_failure_rate_threshold
}

fn default_circuit_breaker_min_samples() -> u32 {
    RiskPolicy::default().circuit_breaker_min_samples
}

fn default_circuit_breaker_cooldown_secs() -> u64 {
    RiskPolicy::default().circuit_breaker_cooldown.as_secs()
}

fn default_fee_rate() -> Decimal {
    kyd_payments::DEFAULT_FEE_RATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_connections, config.max_connections);
        assert_eq!(parsed.notification_channel_capacity, config.notification_channel_capacity);
    }

    #[test]
    fn empty_json_object_fills_in_all_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_connections, default_max_connections());
        assert_eq!(config.risk_policy.velocity_cap_1h, RiskPolicy::default().velocity_cap_1h);
    }
}
