use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// An amount of money in integer minor units (pennies).
///
/// Unsigned on purpose: a negative amount cannot be constructed, so every
/// balance and every transfer amount is non-negative by type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub u64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub fn new(minor_units: u64) -> Self {
        Self(minor_units)
    }

    pub fn minor_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Applies a decimal factor (a rate or a ratio) and rounds half-up to the
    /// nearest minor unit.
    pub fn scale(self, factor: Decimal) -> Self {
        let scaled = (Decimal::from(self.0) * factor)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        Self(scaled.to_u64().unwrap_or(0))
    }

    /// Like [`Money::scale`] but rounds up, used where a requirement must not
    /// be understated.
    pub fn scale_ceil(self, factor: Decimal) -> Self {
        let scaled = (Decimal::from(self.0) * factor).ceil();
        Self(scaled.to_u64().unwrap_or(0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Money {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Jpy,
    Krw,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Krw => "KRW",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_arithmetic() {
        let a = Money(1_000);
        let b = Money(250);
        assert_eq!(a + b, Money(1_250));
        assert_eq!(a - b, Money(750));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(b.saturating_sub(a), Money::ZERO);
    }

    #[test]
    fn test_money_scale_rounds_half_up() {
        assert_eq!(Money(100_000).scale(dec!(0.07)), Money(7_000));
        assert_eq!(Money(15).scale(dec!(0.1)), Money(2));
        assert_eq!(Money(11).scale_ceil(dec!(0.1)), Money(2));
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [Money(1), Money(2), Money(3)].iter().sum();
        assert_eq!(total, Money(6));
    }

    #[test]
    fn test_currency_serialization() {
        let json = serde_json::to_string(&Currency::Eur).unwrap();
        assert_eq!(json, "\"EUR\"");
        assert_eq!(Currency::default(), Currency::Usd);
    }
}
