use rust_decimal::Decimal;
use uuid::Uuid;

/// Sender KYC state as resolved by the orchestrator's `UserLookup` call
/// (§6). RiskGate never performs the lookup itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KycStatus {
    Verified,
    Unverified,
    Pending,
}

/// Everything RiskGate needs to evaluate one payment request, gathered by
/// the orchestrator from `UserLookup`, `SecuritySink`/`Blocklist`, and
/// `TransactionStore` aggregate queries before the call (§4.8). RiskGate
/// itself does no I/O beyond its own rolling counters.
#[derive(Debug, Clone)]
pub struct RiskContext {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub sender_blacklisted: bool,
    pub receiver_blacklisted: bool,
    pub receiver_address_blacklisted: bool,
    pub sender_country_code: String,
    pub sender_kyc_status: KycStatus,
    pub sender_kyc_level: u8,
    pub amount: Decimal,
    /// Sum of same-currency, non-failed, non-cancelled sender transactions
    /// over the trailing 24h, excluding this request.
    pub sender_same_currency_24h_sum: Decimal,
    /// Count of sender transactions over the trailing 1h.
    pub sender_tx_count_1h: u32,
    /// Count of sender transactions over the trailing 1h whose amount
    /// exceeded `RiskPolicy::high_value_threshold`.
    pub sender_high_value_tx_count_1h: u32,
}
