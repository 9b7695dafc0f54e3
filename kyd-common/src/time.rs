// time.rs
use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC instant truncated to microsecond precision — the storage
/// precision for `LedgerEntry.created_at` (§3, §6).
pub fn now_utc_truncated_to_us() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// RFC3339 with nanoseconds, UTC — the hash-input serialization of ledger
/// entry timestamps (§4.2). `chrono`'s `to_rfc3339_opts` with
/// `SecondsFormat::Nanos` always emits 9 fractional digits, which is what
/// "RFC3339Nano" (the source's term, preserved for wire compatibility)
/// means here.
pub fn rfc3339_nanos(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

/// Unix-nanosecond integer — the hash-input serialization of global event
/// timestamps (§4.2).
pub fn unix_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt()
        .expect("timestamp out of range for i64 nanoseconds")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn truncates_to_microseconds() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let truncated = ts.trunc_subsecs(6);
        assert_eq!(truncated.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn rfc3339_nanos_has_nine_fractional_digits() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let s = rfc3339_nanos(ts);
        assert!(s.ends_with("Z"));
        let frac = s.split('.').nth(1).unwrap().trim_end_matches('Z');
        assert_eq!(frac.len(), 9);
    }

    #[test]
    fn unix_nanos_roundtrips_through_chrono() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap();
        assert_eq!(unix_nanos(ts), ts.timestamp_nanos_opt().unwrap());
    }
}
