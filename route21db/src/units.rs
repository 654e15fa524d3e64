//!
//! # Database Units
//!
//! All lengths in the database are expressed in [DbUnits], a signed
//! fixed-point integer scalar. Conversions to and from physical lengths and
//! symbolic (lambda) lengths go through a [UnitScale], generally owned by
//! the technology.
//!

// Std-lib imports
use std::convert::TryFrom;
use std::fmt::Debug;

// Crates.io
use derive_more::{Add, AddAssign, DivAssign, From, MulAssign, Sub, SubAssign, Sum};
use serde::{Deserialize, Serialize};

/// # Location Integer Type-Alias
///
/// Many internal fields are conceptually unsigned integers, but also undergo
/// lots of math. Rather than converting at each call-site, most are converted
/// to [Int] and value-checked at creation time.
pub type Int = i64;

/// A Scalar Value in Database Units
#[derive(
    From,
    Add,
    AddAssign,
    Sub,
    SubAssign,
    MulAssign,
    DivAssign,
    Sum,
    Debug,
    Default,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub struct DbUnits(pub Int);
impl DbUnits {
    /// Every so often we need the raw number, fine. Use sparingly.
    #[inline(always)]
    pub fn raw(&self) -> Int {
        self.0
    }
    /// The largest representable length. Serves as the "+infinity" bound of
    /// otherwise-unbounded intervals.
    pub const MAX: DbUnits = DbUnits(Int::MAX);
    /// The smallest representable length, the "-infinity" bound.
    pub const MIN: DbUnits = DbUnits(Int::MIN);
    /// Absolute value
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }
}
impl std::ops::Neg for DbUnits {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}
impl std::ops::Div<DbUnits> for DbUnits {
    type Output = Int;
    fn div(self, rhs: DbUnits) -> Self::Output {
        self.raw() / rhs.raw()
    }
}
impl std::ops::Div<Int> for DbUnits {
    type Output = Self;
    fn div(self, rhs: Int) -> Self::Output {
        Self(self.raw() / rhs)
    }
}
impl std::ops::Rem<DbUnits> for DbUnits {
    type Output = Int;
    fn rem(self, rhs: DbUnits) -> Self::Output {
        self.raw() % rhs.raw()
    }
}
impl std::ops::Mul<Int> for DbUnits {
    type Output = Self;
    fn mul(self, rhs: Int) -> Self::Output {
        Self(self.0 * rhs)
    }
}
impl std::ops::Mul<usize> for DbUnits {
    type Output = Self;
    fn mul(self, rhs: usize) -> Self::Output {
        Self(Int::try_from(rhs).unwrap() * self.0)
    }
}

/// Physical Distance Units Enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Units {
    /// Micrometers, or microns for we olde folke
    Micro,
    /// Nanometers
    Nano,
    /// Picometers
    Pico,
}
impl Default for Units {
    /// Default units are nanometers
    fn default() -> Units {
        Units::Nano
    }
}

/// # Unit Scale
///
/// Fixes the meaning of one [DbUnits] step: how many database units make a
/// nanometer, and how many make one symbolic "lambda". Both conversions are
/// monotone by construction (integer multiplication by a positive factor).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitScale {
    /// Database units per nanometer
    pub per_nano: Int,
    /// Database units per symbolic lambda
    pub per_lambda: Int,
}
impl Default for UnitScale {
    fn default() -> Self {
        Self {
            per_nano: 1,
            per_lambda: 10,
        }
    }
}
impl UnitScale {
    /// Convert a physical length in `units` to [DbUnits]
    pub fn from_physical(&self, value: Int, units: Units) -> DbUnits {
        let nano = match units {
            Units::Micro => value * 1000,
            Units::Nano => value,
            Units::Pico => value / 1000,
        };
        DbUnits(nano * self.per_nano)
    }
    /// Convert a symbolic lambda count to [DbUnits]
    pub fn from_lambda(&self, value: Int) -> DbUnits {
        DbUnits(value * self.per_lambda)
    }
    /// Convert [DbUnits] back to nanometers, rounding toward zero
    pub fn to_nano(&self, value: DbUnits) -> Int {
        value.raw() / self.per_nano
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversions() {
        let scale = UnitScale {
            per_nano: 2,
            per_lambda: 24,
        };
        assert_eq!(scale.from_physical(10, Units::Nano), DbUnits(20));
        assert_eq!(scale.from_physical(1, Units::Micro), DbUnits(2000));
        assert_eq!(scale.from_lambda(3), DbUnits(72));
        assert_eq!(scale.to_nano(DbUnits(20)), 10);
    }
    #[test]
    fn unit_math() {
        let a = DbUnits(100);
        let b = DbUnits(30);
        assert_eq!(a + b, DbUnits(130));
        assert_eq!(a - b, DbUnits(70));
        assert_eq!(a / b, 3);
        assert_eq!(a % b, 10);
        assert_eq!(-a, DbUnits(-100));
    }
}
