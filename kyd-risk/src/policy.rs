use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;

/// Per-tier single-transaction and daily limits, indexed by KYC level
/// (0-3). Level 0 may never transact (§4.8 point 4).
#[derive(Debug, Clone)]
pub struct KycTierLimits {
    pub single_transaction: [Decimal; 4],
    pub daily: [Decimal; 4],
}

impl Default for KycTierLimits {
    fn default() -> Self {
        KycTierLimits {
            single_transaction: [
                Decimal::ZERO,
                Decimal::new(5_000_000, 0),
                Decimal::new(10_000_000, 0),
                Decimal::new(100_000_000, 0),
            ],
            daily: [
                Decimal::ZERO,
                Decimal::new(10_000_000, 0),
                Decimal::new(50_000_000, 0),
                Decimal::new(500_000_000, 0),
            ],
        }
    }
}

/// Static policy configuration RiskGate evaluates requests against (§4.8).
/// Loaded once at startup from `kyd-node`'s config and shared read-only
/// across requests.
#[derive(Debug, Clone)]
pub struct RiskPolicy {
    pub restricted_countries: HashSet<String>,
    pub kyc_tier_limits: KycTierLimits,
    pub velocity_cap_1h: u32,
    pub high_value_threshold: Decimal,
    pub high_value_cap_1h: u32,
    pub cool_off_flagged_threshold: u32,
    pub cool_off_window: Duration,
    pub admin_approval_threshold: Decimal,
    pub circuit_breaker_failure_rate_threshold: f64,
    pub circuit_breaker_min_samples: u32,
    pub circuit_breaker_cooldown: Duration,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        RiskPolicy {
            restricted_countries: HashSet::new(),
            kyc_tier_limits: KycTierLimits::default(),
            velocity_cap_1h: 20,
            high_value_threshold: Decimal::new(1_000_000, 0),
            high_value_cap_1h: 3,
            cool_off_flagged_threshold: 3,
            cool_off_window: Duration::from_secs(3600),
            admin_approval_threshold: Decimal::new(50_000_000, 0),
            circuit_breaker_failure_rate_threshold: 0.5,
            circuit_breaker_min_samples: 20,
            circuit_breaker_cooldown: Duration::from_secs(60),
        }
    }
}
