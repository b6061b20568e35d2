//! Value Objects for storefront access and pricing

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Minor-unit precision used whenever an amount leaves the pricing core.
pub const MINOR_UNIT_DP: u32 = 2;

/// Money value object
///
/// Arithmetic keeps full precision; call [`Money::rounded`] at the display or
/// transmission boundary only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn usd(amount: Decimal) -> Self { Self::new(amount, "USD") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        let amount = self.amount.checked_add(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, &self.currency))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        let amount = self.amount.checked_sub(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, &self.currency))
    }

    /// Scales the amount by `factor` without rounding.
    pub fn scale(&self, factor: Decimal) -> Result<Money, MoneyError> {
        let amount = self.amount.checked_mul(factor).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, &self.currency))
    }

    /// Rounds half away from zero to the currency's minor unit.
    pub fn rounded(&self) -> Money {
        Money::new(round_minor(self.amount), &self.currency)
    }
}

impl Default for Money { fn default() -> Self { Self::zero("USD") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", round_minor(self.amount), self.currency)
    }
}

pub fn round_minor(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch, Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrencyMismatch => write!(f, "Currency mismatch"),
            Self::Overflow => write!(f, "amount out of range"),
        }
    }
}

/// Discount percentage in `[0, 100]`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value < Decimal::ZERO { return Err(PercentageError::Negative); }
        if value > Decimal::ONE_HUNDRED { return Err(PercentageError::AboveHundred); }
        Ok(Self(value))
    }
    pub fn value(&self) -> Decimal { self.0 }

    /// Multiplier applied to a base price, `1 - pct / 100`.
    pub fn remaining_fraction(&self) -> Decimal { Decimal::ONE - self.0 / Decimal::ONE_HUNDRED }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}%", self.0.normalize()) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PercentageError { Negative, AboveHundred }
impl std::error::Error for PercentageError {}
impl fmt::Display for PercentageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative => write!(f, "discount percentage cannot be negative"),
            Self::AboveHundred => write!(f, "discount percentage cannot exceed 100"),
        }
    }
}

/// Boolean flag as stored by the backend.
///
/// The store hands back `true`, `1`, `"1"` or `"true"` interchangeably, so every
/// permission and activity flag is read through [`coerce_flag`]. A missing
/// field deserializes as `false` when paired with `#[serde(default)]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flag(bool);

impl Flag {
    pub const fn new(value: bool) -> Self { Self(value) }
    pub const fn get(self) -> bool { self.0 }
}

impl From<bool> for Flag { fn from(value: bool) -> Self { Self(value) } }

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.0)
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self(coerce_flag(&raw)))
    }
}

/// Normalizes a heterogeneous truthy encoding. Anything unrecognized is false.
pub fn coerce_flag(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_u64() == Some(1) || n.as_f64() == Some(1.0),
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Backend identifiers arrive as strings or integers; both are kept opaque.
pub fn deserialize_opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or integer id, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_money_add() {
        let a = Money::usd(dec!(100));
        let b = Money::usd(dec!(50));
        assert_eq!(a.add(&b).unwrap().amount(), dec!(150));
        assert_eq!(a.add(&Money::new(dec!(1), "EUR")), Err(MoneyError::CurrencyMismatch));
    }

    #[test]
    fn test_money_rounds_once_half_away_from_zero() {
        let m = Money::usd(dec!(10.005));
        assert_eq!(m.rounded().amount(), dec!(10.01));
        assert_eq!(m.to_string(), "10.01 USD");
    }

    #[test]
    fn test_money_overflow_is_an_error() {
        let huge = Money::usd(Decimal::MAX);
        assert_eq!(huge.scale(dec!(2)), Err(MoneyError::Overflow));
        assert_eq!(huge.add(&Money::usd(dec!(1))), Err(MoneyError::Overflow));
        assert_eq!(huge.scale(dec!(0.5)).unwrap().currency(), "USD");
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(Percentage::new(dec!(0)).is_ok());
        assert!(Percentage::new(dec!(100)).is_ok());
        assert_eq!(Percentage::new(dec!(-0.5)), Err(PercentageError::Negative));
        assert_eq!(Percentage::new(dec!(100.01)), Err(PercentageError::AboveHundred));
        assert_eq!(Percentage::new(dec!(15)).unwrap().remaining_fraction(), dec!(0.85));
    }

    #[test]
    fn test_truthy_encodings() {
        for raw in [json!(true), json!(1), json!("1"), json!("true"), json!("TRUE"), json!(1.0)] {
            assert!(coerce_flag(&raw), "{raw} should be granted");
        }
        for raw in [json!(false), json!(0), json!("0"), json!(null), json!(""), json!("yes"), json!(2)] {
            assert!(!coerce_flag(&raw), "{raw} should be denied");
        }
    }

    #[test]
    fn test_flag_missing_field_is_false() {
        #[derive(Deserialize)]
        struct Row { #[serde(default)] can_view: Flag }
        let row: Row = serde_json::from_value(json!({})).unwrap();
        assert!(!row.can_view.get());
        let row: Row = serde_json::from_value(json!({ "can_view": "True" })).unwrap();
        assert!(row.can_view.get());
    }
}
