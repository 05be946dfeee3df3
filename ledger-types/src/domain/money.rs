//! Type-safe monetary value with embedded currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Currencies accepted at the request boundary.
pub const SUPPORTED_CURRENCIES: [&str; 3] = ["BRL", "USD", "EUR"];

/// Three-letter ISO-4217 style currency code, always uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const BRL: Currency = Currency(*b"BRL");
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");

    /// Parses a currency code, normalizing it to uppercase.
    pub fn new(code: &str) -> Result<Self, DomainError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DomainError::InvalidCurrency("currency cannot be empty".into()));
        }

        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(DomainError::InvalidCurrency(format!(
                "'{}' is not a three-letter code",
                code
            )));
        }

        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        // Only ASCII letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Returns the number of decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        2
    }

    /// Whether the code is in [`SUPPORTED_CURRENCIES`].
    pub fn is_supported(&self) -> bool {
        SUPPORTED_CURRENCIES.contains(&self.as_str())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.as_str().to_string()
    }
}

/// Type-safe money representation with embedded currency.
///
/// Amounts are decimal major units (e.g. `10.50`). Conversion from and to
/// integer minor units happens only at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value.
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, DomainError> {
        if amount < Decimal::ZERO {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Parses the currency code and builds the value in one step.
    pub fn parse(amount: Decimal, currency: &str) -> Result<Self, DomainError> {
        Self::new(amount, Currency::new(currency)?)
    }

    /// Creates a zero-value Money for the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Builds a value from integer minor units (cents).
    pub fn from_minor(minor: i64, currency: Currency) -> Result<Self, DomainError> {
        Self::new(Decimal::new(minor, currency.decimal_places()), currency)
    }

    /// Returns the amount in major units.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Checked addition - returns error if currencies don't match.
    pub fn checked_add(&self, other: Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(&other)?;
        Money::new(self.amount + other.amount, self.currency)
    }

    /// Checked subtraction - returns error if currencies don't match or result would be negative.
    pub fn checked_sub(&self, other: Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(&other)?;
        Money::new(self.amount - other.amount, self.currency)
    }

    /// True iff same currency and this amount covers `other`.
    pub fn can_subtract(&self, other: &Money) -> bool {
        self.currency == other.currency && self.amount >= other.amount
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_creation() {
        let money = Money::new(dec!(10.00), Currency::USD).unwrap();
        assert_eq!(money.amount(), dec!(10.00));
        assert_eq!(money.currency(), Currency::USD);
    }

    #[test]
    fn test_negative_money_fails() {
        let result = Money::new(dec!(-1), Currency::USD);
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_currency_is_normalized() {
        let money = Money::parse(dec!(5), "brl").unwrap();
        assert_eq!(money.currency(), Currency::BRL);
        assert_eq!(money.currency().as_str(), "BRL");
    }

    #[test]
    fn test_empty_currency_fails() {
        assert!(matches!(
            Money::parse(dec!(5), "  "),
            Err(DomainError::InvalidCurrency(_))
        ));
        assert!(matches!(
            Currency::new("EURO"),
            Err(DomainError::InvalidCurrency(_))
        ));
    }

    #[test]
    fn test_money_addition() {
        let a = Money::new(dec!(1.00), Currency::USD).unwrap();
        let b = Money::new(dec!(0.50), Currency::USD).unwrap();
        assert_eq!(a.checked_add(b).unwrap().amount(), dec!(1.50));
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::new(dec!(1), Currency::USD).unwrap();
        let eur = Money::new(dec!(1), Currency::EUR).unwrap();
        assert!(matches!(
            usd.checked_add(eur),
            Err(DomainError::CurrencyMismatch { .. })
        ));
        assert!(matches!(
            usd.checked_sub(eur),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_subtraction_below_zero_fails() {
        let a = Money::new(dec!(1), Currency::BRL).unwrap();
        let b = Money::new(dec!(2), Currency::BRL).unwrap();
        assert!(matches!(a.checked_sub(b), Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_can_subtract() {
        let ten = Money::new(dec!(10), Currency::BRL).unwrap();
        let five = Money::new(dec!(5), Currency::BRL).unwrap();
        let five_usd = Money::new(dec!(5), Currency::USD).unwrap();
        assert!(ten.can_subtract(&five));
        assert!(ten.can_subtract(&ten));
        assert!(!five.can_subtract(&ten));
        assert!(!ten.can_subtract(&five_usd));
    }

    #[test]
    fn test_from_minor_units() {
        let money = Money::from_minor(1050, Currency::USD).unwrap();
        assert_eq!(money.amount(), dec!(10.50));
        assert_eq!(format!("{}", money), "USD 10.50");
    }

    #[test]
    fn test_currency_serde_roundtrip_uses_code() {
        let json = serde_json::to_string(&Currency::EUR).unwrap();
        assert_eq!(json, "\"EUR\"");
        let parsed: Currency = serde_json::from_str("\"usd\"").unwrap();
        assert_eq!(parsed, Currency::USD);
    }
}
