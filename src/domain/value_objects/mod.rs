//! Value Objects for checkout

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Non-negative monetary amount in the store currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest amount a `NUMERIC(14,4)` column holds.
    pub fn max() -> Self { Self(Decimal::new(99_999_999_999_999, 4)) }

    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount < Decimal::ZERO { return Err(MoneyError::Negative(amount)); }
        if amount > Self::max().0 { return Err(MoneyError::TooLarge(amount)); }
        Ok(Self(amount))
    }
    pub fn amount(&self) -> Decimal { self.0 }

    pub fn times(&self, qty: Quantity) -> Result<Money, MoneyError> {
        let product = self.0.checked_mul(Decimal::from(qty.value())).ok_or(MoneyError::Overflow)?;
        Self::new(product)
    }

    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        let sum = self.0.checked_add(other.0).ok_or(MoneyError::Overflow)?;
        Self::new(sum)
    }

    /// Sums `amounts`, failing instead of leaving the storable range.
    pub fn total(amounts: impl IntoIterator<Item = Money>) -> Result<Money, MoneyError> {
        amounts.into_iter().try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }

    /// Amount in the currency's minor unit (paise, cents), rounded half-even.
    pub fn to_minor_units(&self) -> Option<i64> { self.0.checked_mul(Decimal::ONE_HUNDRED)?.round().to_i64() }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self { money.0 }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount must not be negative, got {0}")]
    Negative(Decimal),
    #[error("amount {0} exceeds the largest storable amount")]
    TooLarge(Decimal),
    #[error("amount arithmetic overflowed")]
    Overflow,
}

/// Strictly positive item count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn checked_add(&self, other: Quantity) -> Result<Self, QuantityError> {
        self.0.checked_add(other.0).map(Self).ok_or(QuantityError::Overflow)
    }
    /// Signed stock delta for committing (negative) or restoring (positive) this quantity.
    pub fn as_delta(&self) -> i64 { i64::from(self.0) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(qty: Quantity) -> Self { qty.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity must be positive")]
    Zero,
    #[error("quantity overflow")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_rejects_negative() {
        assert!(Money::new(dec!(0)).is_ok());
        assert!(Money::new(dec!(19.99)).is_ok());
        assert_eq!(Money::new(dec!(-0.01)), Err(MoneyError::Negative(dec!(-0.01))));
    }

    #[test]
    fn test_money_times_and_total() {
        let price = Money::new(dec!(10.0)).unwrap();
        let total = Money::total([price.times(Quantity::new(3).unwrap()).unwrap(), price]).unwrap();
        assert_eq!(total.amount(), dec!(40.0));
        assert_eq!(Money::total([]), Ok(Money::ZERO));
    }

    #[test]
    fn test_money_stays_within_column_range() {
        assert_eq!(Money::max().amount(), dec!(9999999999.9999));
        assert!(Money::new(dec!(9999999999.9999)).is_ok());
        assert_eq!(Money::new(dec!(10000000000)), Err(MoneyError::TooLarge(dec!(10000000000))));
        assert!(matches!(Money::new(dec!(70000000000000000000000000000)), Err(MoneyError::TooLarge(_))));

        let big = Money::new(dec!(9999999999)).unwrap();
        assert!(matches!(big.times(Quantity::new(2).unwrap()), Err(MoneyError::TooLarge(_))));
        assert!(matches!(big.checked_add(big), Err(MoneyError::TooLarge(_))));
        assert_eq!(Money::total([big, Money::new(dec!(0.9999)).unwrap()]), Ok(Money::max()));
        assert!(Money::max().times(Quantity::new(u32::MAX).unwrap()).is_err());
        assert!(Money::max().to_minor_units().is_some());
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(Money::new(dec!(30.0)).unwrap().to_minor_units(), Some(3000));
        assert_eq!(Money::new(dec!(19.995)).unwrap().to_minor_units(), Some(2000));
    }

    #[test]
    fn test_quantity() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        let q = Quantity::new(2).unwrap();
        assert_eq!(q.checked_add(Quantity::new(3).unwrap()).unwrap().value(), 5);
        assert_eq!(Quantity::new(u32::MAX).unwrap().checked_add(q), Err(QuantityError::Overflow));
    }

    #[test]
    fn test_quantity_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("4").unwrap().value(), 4);
    }
}
