// money.rs
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{KydError, Result};

/// A 3-letter ISO-like currency code. Treated as an opaque tag: the Money
/// type never interprets it beyond equality comparison for arithmetic
/// guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency([u8; 3]);

impl Currency {
    pub fn new(code: &str) -> Result<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(KydError::Validation(format!(
                "currency code must be 3 uppercase ASCII letters: {code}"
            )));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).expect("currency code is always valid ASCII")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed-precision decimal money, tagged with a currency. Arithmetic across
/// differing currencies is a programming error (`CurrencyMismatch`), never a
/// silent conversion — conversion is the orchestrator's job, driven by an
/// explicit exchange rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    fn check_currency(&self, other: &Money) -> Result<()> {
        if self.currency != other.currency {
            return Err(KydError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money> {
        self.check_currency(other)?;
        Ok(Money::new(self.amount + other.amount, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money> {
        self.check_currency(other)?;
        Ok(Money::new(self.amount - other.amount, self.currency))
    }

    /// Multiplies by a dimensionless rate (fee rates, FX rates). The result
    /// keeps `self`'s currency; the caller is responsible for re-tagging to
    /// the destination currency when the rate is an FX rate.
    pub fn checked_mul_rate(&self, rate: Decimal) -> Money {
        Money::new(self.amount * rate, self.currency)
    }

    pub fn with_currency(&self, currency: Currency) -> Money {
        Money::new(self.amount, currency)
    }

    pub fn partial_cmp_amount(&self, other: &Money) -> Result<Ordering> {
        self.check_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// Canonical decimal string used as hash input: the amount's native
    /// scale, unmodified — no trailing-zero stripping, no forced padding.
    /// `Decimal`'s `Display` already preserves the scale it was constructed
    /// with (`100.00`, `0`, `1.5`), which is exactly this contract.
    pub fn canonical_amount_string(&self) -> String {
        self.amount.to_string()
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        self.checked_add(&rhs)
            .expect("Money::add used across currencies — use checked_add")
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        self.checked_sub(&rhs)
            .expect("Money::sub used across currencies — use checked_sub")
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.currency == other.currency && self.amount == other.amount
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.canonical_amount_string(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn usd() -> Currency {
        Currency::new("USD").unwrap()
    }

    fn eur() -> Currency {
        Currency::new("EUR").unwrap()
    }

    #[test]
    fn rejects_malformed_currency_codes() {
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("usd").is_err());
        assert!(Currency::new("US1").is_err());
    }

    #[test]
    fn add_and_sub_preserve_currency() {
        let a = Money::new(Decimal::from_str("10.15").unwrap(), usd());
        let b = Money::new(Decimal::from_str("0.15").unwrap(), usd());
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.amount(), Decimal::from_str("10.30").unwrap());
        let diff = a.checked_sub(&b).unwrap();
        assert_eq!(diff.amount(), Decimal::from_str("10.00").unwrap());
    }

    #[test]
    fn cross_currency_arithmetic_fails_fast() {
        let a = Money::new(Decimal::from(10), usd());
        let b = Money::new(Decimal::from(10), eur());
        assert!(a.checked_add(&b).is_err());
        assert!(a.checked_sub(&b).is_err());
        assert!(a.partial_cmp_amount(&b).is_err());
    }

    #[test]
    fn canonical_string_preserves_scale() {
        let hundred = Money::new(Decimal::from_str("100.00").unwrap(), usd());
        assert_eq!(hundred.canonical_amount_string(), "100.00");

        let zero = Money::zero(usd());
        assert_eq!(zero.canonical_amount_string(), "0");

        let one_half = Money::new(Decimal::from_str("1.5").unwrap(), usd());
        assert_eq!(one_half.canonical_amount_string(), "1.5");
    }

    #[test]
    fn mul_rate_computes_fee_and_conversion() {
        let amount = Money::new(Decimal::from_str("10.00").unwrap(), usd());
        let fee = amount.checked_mul_rate(Decimal::from_str("0.015").unwrap());
        assert_eq!(fee.amount(), Decimal::from_str("0.150").unwrap());

        let converted = amount
            .checked_mul_rate(Decimal::from_str("0.9").unwrap())
            .with_currency(eur());
        assert_eq!(converted.amount(), Decimal::from_str("9.000").unwrap());
        assert_eq!(converted.currency(), eur());
    }
}
