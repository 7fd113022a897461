use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use crate::error::Error;

/// Exact decimal amount. Backed by an arbitrary-precision decimal so that
/// 18-fractional-digit token amounts at on-chain scale survive arithmetic
/// without rounding. Serialized as a decimal string, never as a float.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(BigDecimal);

impl Amount {
    pub fn zero() -> Self {
        Amount(BigDecimal::zero())
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        BigDecimal::from_str(s.trim())
            .map(Amount)
            .map_err(|_| Error::InvalidAmount(s.to_string()))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < BigDecimal::zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > BigDecimal::zero()
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Amount::parse(s)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount(BigDecimal::from(value))
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
    }
}

impl Add<&Amount> for &Amount {
    type Output = Amount;
    fn add(self, other: &Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, other: Amount) -> Amount {
        Amount(self.0 - other.0)
    }
}

impl Sub<&Amount> for &Amount {
    type Output = Amount;
    fn sub(self, other: &Amount) -> Amount {
        Amount(&self.0 - &other.0)
    }
}

impl Neg for Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Neg for &Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount(-&self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::parse(&s).map_err(serde::de::Error::custom)
    }
}
