use crate::context::{KycStatus, RiskContext};
use crate::decision::RiskDecision;
use crate::policy::RiskPolicy;
use crate::rolling_state::RollingState;

/// Stateless evaluator over `RiskPolicy`, backed by process-local rolling
/// counters for the circuit breaker and cool-off (§4.8). Construct once and
/// share across requests.
pub struct RiskGate {
    policy: RiskPolicy,
    state: RollingState,
}

impl RiskGate {
    pub fn new(policy: RiskPolicy) -> Self {
        RiskGate {
            policy,
            state: RollingState::new(),
        }
    }

    /// Runs the eight checks of §4.8 in order, short-circuiting on the
    /// first failure.
    pub fn evaluate(&self, ctx: &RiskContext) -> RiskDecision {
        if self.state.circuit_open(
            self.policy.circuit_breaker_failure_rate_threshold,
            self.policy.circuit_breaker_min_samples,
            self.policy.circuit_breaker_cooldown,
        ) {
            return self.fail(ctx, "circuit breaker open");
        }

        if ctx.sender_blacklisted || ctx.receiver_blacklisted || ctx.receiver_address_blacklisted {
            return self.fail(ctx, "blocklist hit");
        }

        if self.policy.restricted_countries.contains(&ctx.sender_country_code) {
            return self.fail(ctx, "restricted country");
        }

        if ctx.sender_kyc_status != KycStatus::Verified {
            return self.fail(ctx, "sender not KYC verified");
        }

        let tier = ctx.sender_kyc_level.min(3) as usize;
        let single_tx_limit = self.policy.kyc_tier_limits.single_transaction[tier];
        if ctx.amount > single_tx_limit {
            return self.fail(ctx, "exceeds per-tier single transaction limit");
        }

        let daily_limit = self.policy.kyc_tier_limits.daily[tier];
        if ctx.sender_same_currency_24h_sum + ctx.amount > daily_limit {
            return self.fail(ctx, "exceeds per-tier daily limit");
        }

        if ctx.sender_tx_count_1h >= self.policy.velocity_cap_1h {
            return self.fail(ctx, "exceeds hourly transaction velocity cap");
        }
        let prospective_high_value_count = ctx.sender_high_value_tx_count_1h
            + if ctx.amount > self.policy.high_value_threshold { 1 } else { 0 };
        if prospective_high_value_count > self.policy.high_value_cap_1h {
            return self.fail(ctx, "exceeds hourly high-value transaction cap");
        }

        if self.state.in_cool_off(
            ctx.sender_id,
            self.policy.cool_off_flagged_threshold,
            self.policy.cool_off_window,
        ) {
            return self.fail(ctx, "sender in cool-off window");
        }

        if ctx.amount > self.policy.admin_approval_threshold {
            self.state.record_outcome(true);
            return RiskDecision::RequiresApproval;
        }

        self.state.record_outcome(true);
        RiskDecision::Pass
    }

    /// Records the outcome of a posting attempt so the circuit breaker's
    /// rolling failure rate stays current. Call after `PostingEngine::post`
    /// resolves, not after `evaluate`.
    pub fn record_posting_outcome(&self, succeeded: bool) {
        self.state.record_outcome(succeeded);
    }

    fn fail(&self, ctx: &RiskContext, reason: &str) -> RiskDecision {
        self.state.record_flag(ctx.sender_id, self.policy.cool_off_window);
        self.state.record_outcome(false);
        tracing::warn!(sender_id = %ctx.sender_id, reason, "risk gate rejected transaction");
        RiskDecision::Fail(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn base_ctx() -> RiskContext {
        RiskContext {
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            sender_blacklisted: false,
            receiver_blacklisted: false,
            receiver_address_blacklisted: false,
            sender_country_code: "US".to_string(),
            sender_kyc_status: KycStatus::Verified,
            sender_kyc_level: 2,
            amount: Decimal::new(1000, 0),
            sender_same_currency_24h_sum: Decimal::ZERO,
            sender_tx_count_1h: 0,
            sender_high_value_tx_count_1h: 0,
        }
    }

    #[test]
    fn passes_a_well_formed_low_value_request() {
        let gate = RiskGate::new(RiskPolicy::default());
        assert_eq!(gate.evaluate(&base_ctx()), RiskDecision::Pass);
    }

    #[test]
    fn blocklist_hit_fails_before_other_checks() {
        let gate = RiskGate::new(RiskPolicy::default());
        let mut ctx = base_ctx();
        ctx.sender_blacklisted = true;
        ctx.sender_kyc_status = KycStatus::Unverified;
        assert!(matches!(gate.evaluate(&ctx), RiskDecision::Fail(reason) if reason == "blocklist hit"));
    }

    #[test]
    fn unverified_sender_fails_kyc_gating() {
        let gate = RiskGate::new(RiskPolicy::default());
        let mut ctx = base_ctx();
        ctx.sender_kyc_status = KycStatus::Pending;
        assert!(matches!(gate.evaluate(&ctx), RiskDecision::Fail(_)));
    }

    #[test]
    fn amount_over_single_tx_limit_fails() {
        let gate = RiskGate::new(RiskPolicy::default());
        let mut ctx = base_ctx();
        ctx.sender_kyc_level = 1;
        ctx.amount = Decimal::new(6_000_000, 0);
        assert!(matches!(gate.evaluate(&ctx), RiskDecision::Fail(_)));
    }

    #[test]
    fn amount_over_approval_threshold_requires_approval() {
        let gate = RiskGate::new(RiskPolicy::default());
        let mut ctx = base_ctx();
        ctx.sender_kyc_level = 3;
        ctx.amount = Decimal::new(60_000_000, 0);
        assert_eq!(gate.evaluate(&ctx), RiskDecision::RequiresApproval);
    }

    #[test]
    fn repeated_failures_trigger_cool_off() {
        let policy = RiskPolicy {
            cool_off_flagged_threshold: 2,
            ..RiskPolicy::default()
        };
        let gate = RiskGate::new(policy);
        let mut ctx = base_ctx();
        ctx.sender_blacklisted = true;

        gate.evaluate(&ctx);
        gate.evaluate(&ctx);

        ctx.sender_blacklisted = false;
        assert!(matches!(gate.evaluate(&ctx), RiskDecision::Fail(reason) if reason == "sender in cool-off window"));
    }
}
