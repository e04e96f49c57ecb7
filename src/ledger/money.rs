use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Number of fractional digits every amount is held at
pub const MONEY_SCALE: u32 = 2;

/// Cents-accurate amount of account currency.
///
/// Always normalized to two fractional digits so that values read back from
/// the store compare equal to the values that were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money::from_cents(0);

    /// Round half away from zero to whole cents
    pub fn new(amount: Decimal) -> Self {
        let mut rounded = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(MONEY_SCALE);
        Money(rounded)
    }

    /// Build from an integer number of cents
    pub const fn from_cents(cents: i64) -> Self {
        let magnitude = cents.unsigned_abs();
        Money(Decimal::from_parts(
            magnitude as u32,
            (magnitude >> 32) as u32,
            0,
            cents < 0,
            MONEY_SCALE,
        ))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money::new)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money::new)
    }

    /// Adds a signed delta, failing on overflow
    pub fn apply(self, delta: Money) -> AppResult<Money> {
        self.checked_add(delta)
            .ok_or_else(|| AppError::Internal(format!("Balance overflow applying {} to {}", delta, self)))
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money::new(-self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim())?;
        Ok(Money::new(amount))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money::new(amount)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Ok(Money::new(amount))
    }
}

/// Decimal odds multiplier quoted on a market (always > 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Odds(Decimal);

impl Odds {
    pub fn new(value: Decimal) -> AppResult<Self> {
        if value <= Decimal::ONE {
            return Err(AppError::InvalidInput(format!("Odds must be greater than 1, got {}", value)));
        }
        Ok(Odds(value.normalize()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// stake × odds, rounded to cents
    pub fn potential_win(&self, stake: Money) -> AppResult<Money> {
        stake
            .amount()
            .checked_mul(self.0)
            .map(Money::new)
            .ok_or_else(|| AppError::InvalidInput("Stake too large for quoted odds".to_string()))
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Odds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Odds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Odds::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_rounds_to_cents() {
        assert_eq!(Money::new(dec!(10.005)).to_string(), "10.01");
        assert_eq!(Money::new(dec!(10.004)).to_string(), "10.00");
        assert_eq!(Money::new(dec!(7)).to_string(), "7.00");
        assert_eq!(Money::new(dec!(-2.345)).to_string(), "-2.35");
    }

    #[test]
    fn test_repeated_parse_format_is_stable() {
        let mut value = Money::new(dec!(0.10));
        for _ in 0..1000 {
            value = value.to_string().parse::<Money>().unwrap();
            value = value.checked_add(Money::new(dec!(0.10))).unwrap();
        }
        assert_eq!(value, Money::from_cents(10_010));
    }

    #[test]
    fn test_potential_win_is_stake_times_odds() {
        let odds = Odds::new(dec!(1.85)).unwrap();
        let win = odds.potential_win(Money::new(dec!(33.33))).unwrap();
        // 33.33 * 1.85 = 61.6605
        assert_eq!(win, Money::new(dec!(61.66)));
    }

    #[test]
    fn test_odds_must_exceed_one() {
        assert!(Odds::new(dec!(1)).is_err());
        assert!(Odds::new(dec!(0.5)).is_err());
        assert!(Odds::new(dec!(1.01)).is_ok());
    }

    #[test]
    fn test_sign_helpers() {
        assert!(Money::new(dec!(-0.01)).is_negative());
        assert!(!Money::ZERO.is_negative());
        assert!(!Money::ZERO.is_positive());
        assert_eq!(Money::ZERO.to_string(), "0.00");
        assert_eq!(-Money::from_cents(250), Money::new(dec!(-2.50)));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Money::from_cents(1234)).unwrap();
        assert_eq!(json, "\"12.34\"");
        let parsed: Money = serde_json::from_str("\"5.5\"").unwrap();
        assert_eq!(parsed, Money::from_cents(550));
        let from_number: Money = serde_json::from_str("100").unwrap();
        assert_eq!(from_number, Money::from_cents(10_000));
    }
}
