//! Exact decimal reward amounts.
//!
//! Campaign specs and every persisted record carry amounts in human units
//! (`"100.50"` USDC). Only the chain adapters convert to the integer
//! smallest unit of their token, through [`TokenAmount::to_base_units`].

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Most fractional digits accepted when parsing.
pub const MAX_SCALE: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TokenAmount {
    mantissa: u128,
    scale: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount {0:?}")]
    Invalid(String),
    #[error("amount {0:?} has more than {MAX_SCALE} fractional digits")]
    TooPrecise(String),
    #[error("amount {0:?} is out of range")]
    Overflow(String),
    #[error("scale {0} exceeds {MAX_SCALE} fractional digits")]
    Scale(u32),
}

fn pow10(n: u32) -> Option<u128> {
    10u128.checked_pow(n)
}

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount { mantissa: 0, scale: 0 };

    /// `mantissa * 10^-scale`, normalized so equal values compare equal.
    /// Fails if more than [`MAX_SCALE`] fractional digits remain after
    /// dropping trailing zeros.
    pub fn new(mantissa: u128, scale: u32) -> Result<Self, AmountError> {
        let amount = Self::normalized(mantissa, scale);
        if amount.scale > MAX_SCALE {
            return Err(AmountError::Scale(amount.scale));
        }
        Ok(amount)
    }

    fn normalized(mantissa: u128, scale: u32) -> Self {
        let (mut mantissa, mut scale) = (mantissa, scale);
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        if mantissa == 0 {
            scale = 0;
        }
        Self { mantissa, scale }
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Integer amount in the token's smallest unit. Digits below the
    /// token's minimum increment are truncated; `None` on overflow.
    pub fn to_base_units(&self, decimals: u32) -> Option<u128> {
        if self.scale <= decimals {
            self.mantissa.checked_mul(pow10(decimals - self.scale)?)
        } else {
            Some(self.mantissa / pow10(self.scale - decimals)?)
        }
    }

    pub fn from_base_units(raw: u128, decimals: u32) -> Result<Self, AmountError> {
        Self::new(raw, decimals)
    }
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(AmountError::Invalid(s.to_string()));
        }
        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(AmountError::Invalid(s.to_string()));
        }
        let scale = frac_part.len() as u32;
        if scale > MAX_SCALE {
            return Err(AmountError::TooPrecise(s.to_string()));
        }
        let mut mantissa: u128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            let d = c as u128 - '0' as u128;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(d))
                .ok_or_else(|| AmountError::Overflow(s.to_string()))?;
        }
        Ok(Self::normalized(mantissa, scale))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        // scale is at most MAX_SCALE
        let unit = pow10(self.scale).unwrap_or(u128::MAX);
        write!(
            f,
            "{}.{:0>width$}",
            self.mantissa / unit,
            self.mantissa % unit,
            width = self.scale as usize
        )
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> de::Visitor<'de> for AmountVisitor {
            type Value = TokenAmount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative decimal amount")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TokenAmount, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TokenAmount, E> {
                Ok(TokenAmount::normalized(v as u128, 0))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<TokenAmount, E> {
                v.to_string().parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes() {
        let a: TokenAmount = "100.00".parse().unwrap();
        let b: TokenAmount = "100".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "100");
        assert_eq!("0.050".parse::<TokenAmount>().unwrap().to_string(), "0.05");
        assert_eq!(".5".parse::<TokenAmount>().unwrap().to_string(), "0.5");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<TokenAmount>(), Err(AmountError::Empty));
        assert!("-1".parse::<TokenAmount>().is_err());
        assert!("1.2.3".parse::<TokenAmount>().is_err());
        assert!("1e6".parse::<TokenAmount>().is_err());
        assert!(".".parse::<TokenAmount>().is_err());
        assert!(matches!(
            "0.0000000000000000001".parse::<TokenAmount>(),
            Err(AmountError::TooPrecise(_))
        ));
    }

    #[test]
    fn usdc_six_decimals() {
        let a: TokenAmount = "100.00".parse().unwrap();
        assert_eq!(a.to_base_units(6), Some(100_000_000));
        let back = TokenAmount::from_base_units(100_000_000, 6).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn truncates_below_minimum_increment() {
        let a: TokenAmount = "1.1234567".parse().unwrap();
        let raw = a.to_base_units(6).unwrap();
        assert_eq!(raw, 1_123_456);
        let back = TokenAmount::from_base_units(raw, 6).unwrap();
        let diff = a.to_base_units(9).unwrap() - back.to_base_units(9).unwrap();
        assert!(diff < 1_000, "lost more than one 6-decimal increment");
    }

    #[test]
    fn lamport_scaling() {
        let a: TokenAmount = "2.5".parse().unwrap();
        assert_eq!(a.to_base_units(9), Some(2_500_000_000));
        assert_eq!(TokenAmount::from_base_units(2_500_000_000, 9).unwrap(), a);
    }

    #[test]
    fn scale_is_bounded() {
        assert_eq!(TokenAmount::new(1, 39), Err(AmountError::Scale(39)));
        assert_eq!(TokenAmount::new(5, 19), Err(AmountError::Scale(19)));
        // trailing zeros are dropped before the bound applies
        let one = TokenAmount::new(10u128.pow(20), 20).unwrap();
        assert_eq!(one.to_string(), "1");
        let finest = TokenAmount::new(1, MAX_SCALE).unwrap();
        assert_eq!(finest.to_string(), "0.000000000000000001");
    }

    #[test]
    fn serde_accepts_string_and_number() {
        let a: TokenAmount = serde_json::from_str("\"12.5\"").unwrap();
        let b: TokenAmount = serde_json::from_str("12.5").unwrap();
        let c: TokenAmount = serde_json::from_str("12").unwrap();
        assert_eq!(a, b);
        assert_eq!(c.to_string(), "12");
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"12.5\"");
    }
}
