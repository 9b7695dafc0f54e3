// hasher.rs
use chrono::{DateTime, Utc};
use kyd_common::{time, Currency};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{EntryType, EventType};

/// Canonical serialization plus SHA-256 chaining for both chains (§4.2).
/// Both canonical forms are frozen — changing either requires a chain
/// migration that re-derives every historical hash.
pub struct EventHasher;

impl EventHasher {
    /// Ledger entries concatenate their fields with no separator, in the
    /// order listed in §4.2, with the timestamp serialized as RFC3339Nano.
    #[allow(clippy::too_many_arguments)]
    pub fn hash_ledger_entry(
        previous_hash: &str,
        id: Uuid,
        transaction_id: Uuid,
        wallet_id: Uuid,
        entry_type: EntryType,
        amount: Decimal,
        currency: Currency,
        balance_after: Decimal,
        created_at: DateTime<Utc>,
    ) -> String {
        let mut input = String::new();
        input.push_str(previous_hash);
        input.push_str(&id.to_string());
        input.push_str(&transaction_id.to_string());
        input.push_str(&wallet_id.to_string());
        input.push_str(entry_type.as_str());
        input.push_str(&amount.to_string());
        input.push_str(currency.as_str());
        input.push_str(&balance_after.to_string());
        input.push_str(&time::rfc3339_nanos(created_at));

        digest_hex(input.as_bytes())
    }

    /// Events join their fields with `:`, with the timestamp serialized as
    /// a decimal UNIX-nanosecond integer.
    pub fn hash_event(
        previous_hash: &str,
        transaction_id: Uuid,
        event_type: EventType,
        amount: Decimal,
        currency: Currency,
        status: &str,
        created_at: DateTime<Utc>,
    ) -> String {
        let input = [
            previous_hash.to_string(),
            transaction_id.to_string(),
            event_type.as_str().to_string(),
            amount.to_string(),
            currency.as_str().to_string(),
            status.to_string(),
            time::unix_nanos(created_at).to_string(),
        ]
        .join(":");

        digest_hex(input.as_bytes())
    }
}

fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GENESIS;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn ledger_entry_hash_is_deterministic_and_64_hex() {
        let id = Uuid::nil();
        let tx = Uuid::nil();
        let wallet = Uuid::nil();
        let usd = Currency::new("USD").unwrap();
        let amount = Decimal::from_str("10.15").unwrap();
        let balance = Decimal::from_str("88.50").unwrap();

        let h1 = EventHasher::hash_ledger_entry(
            GENESIS, id, tx, wallet, EntryType::Debit, amount, usd, balance, ts(),
        );
        let h2 = EventHasher::hash_ledger_entry(
            GENESIS, id, tx, wallet, EntryType::Debit, amount, usd, balance, ts(),
        );
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn changing_any_field_changes_the_hash() {
        let id = Uuid::nil();
        let tx = Uuid::nil();
        let wallet = Uuid::nil();
        let usd = Currency::new("USD").unwrap();
        let amount = Decimal::from_str("10.15").unwrap();
        let balance = Decimal::from_str("88.50").unwrap();

        let base = EventHasher::hash_ledger_entry(
            GENESIS, id, tx, wallet, EntryType::Debit, amount, usd, balance, ts(),
        );

        let changed_amount = EventHasher::hash_ledger_entry(
            GENESIS,
            id,
            tx,
            wallet,
            EntryType::Debit,
            Decimal::from_str("1000000.15").unwrap(),
            usd,
            balance,
            ts(),
        );
        assert_ne!(base, changed_amount);

        let changed_balance = EventHasher::hash_ledger_entry(
            GENESIS, id, tx, wallet, EntryType::Debit, amount, usd, Decimal::from(1), ts(),
        );
        assert_ne!(base, changed_balance);

        let changed_prev = EventHasher::hash_ledger_entry(
            "1111111111111111111111111111111111111111111111111111111111111111",
            id,
            tx,
            wallet,
            EntryType::Debit,
            amount,
            usd,
            balance,
            ts(),
        );
        assert_ne!(base, changed_prev);
    }

    #[test]
    fn event_hash_is_deterministic_and_64_hex() {
        let tx = Uuid::nil();
        let usd = Currency::new("USD").unwrap();
        let amount = Decimal::from_str("10.15").unwrap();

        let h1 = EventHasher::hash_event(GENESIS, tx, EventType::Payment, amount, usd, "completed", ts());
        let h2 = EventHasher::hash_event(GENESIS, tx, EventType::Payment, amount, usd, "completed", ts());
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn event_hash_changes_with_status() {
        let tx = Uuid::nil();
        let usd = Currency::new("USD").unwrap();
        let amount = Decimal::from_str("10.15").unwrap();

        let completed = EventHasher::hash_event(GENESIS, tx, EventType::Payment, amount, usd, "completed", ts());
        let failed = EventHasher::hash_event(GENESIS, tx, EventType::Payment, amount, usd, "failed", ts());
        assert_ne!(completed, failed);
    }
}
