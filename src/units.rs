//! Physical quantities, scalar prefixes and fixed-point sweep values

use std::{
    fmt::{ self, Write },
    ops::{ Add, Sub, Mul },
};
use serde::{ Deserialize, Serialize };

/// Defines a scalar prefix type for converting between base units and a prefixed magnitude e.g.
/// "giga-" or "mega-"
pub trait Scalar
{
    /// Return the power of 10 of this scalar
    ///
    /// For example, a prefix of "mega-" should return 6.
    fn magnitude() -> i32;

    /// Multiplier which converts a prefixed value into base units
    fn factor() -> f64
    {
        10f64.powi(Self::magnitude())
    }
}

macro_rules! impl_prefix
{
    { $name:ident, $magnitude:literal } => {
        pub struct $name {}

        impl Scalar for $name
        {
            fn magnitude() -> i32
            {
                $magnitude
            }
        }
    }
}

impl_prefix!{ Mega, 6 }
impl_prefix!{ Giga, 9 }

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, places: i32) -> f64
{
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// A frequency in hertz
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Hertz(pub f64);

impl Hertz
{
    /// Construct from a value expressed with the given prefix, e.g. `Hertz::from::<Giga>(0.05)`
    pub fn from<S: Scalar>(value: f64) -> Self
    {
        Self(value * S::factor())
    }

    pub fn as_f64<S: Scalar>(&self) -> f64
    {
        self.0 / S::factor()
    }
}

impl Add for Hertz
{
    type Output = Self;

    fn add(self, rhs: Self) -> Self
    {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Hertz
{
    type Output = Self;

    fn sub(self, rhs: Self) -> Self
    {
        Self(self.0 - rhs.0)
    }
}

impl Mul<f64> for Hertz
{
    type Output = Self;

    fn mul(self, rhs: f64) -> Self
    {
        Self(self.0 * rhs)
    }
}

impl From<SetPoint> for Hertz
{
    fn from(this: SetPoint) -> Self
    {
        Self(this.as_f64())
    }
}

/// Signed decimal value with fixed thousandths precision
///
/// Sweep set-points are rounded to three decimal places when they are generated. Holding them as an
/// integer count of thousandths makes them exact map keys: a calibration entry recorded at one
/// frequency is found again at the same frequency, and doubling a frequency for divide-by-2 mode
/// never introduces drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct SetPoint
{
    thousandths: i64,
}

impl SetPoint
{
    /// Rounds to the nearest thousandth
    pub fn from_f64(value: f64) -> Self
    {
        Self { thousandths: (value * 1000.0).round() as i64 }
    }

    pub fn as_f64(&self) -> f64
    {
        self.thousandths as f64 / 1000.0
    }
}

impl From<f64> for SetPoint
{
    fn from(this: f64) -> Self
    {
        Self::from_f64(this)
    }
}

impl From<SetPoint> for f64
{
    fn from(this: SetPoint) -> Self
    {
        this.as_f64()
    }
}

impl Mul<i64> for SetPoint
{
    type Output = Self;

    fn mul(self, rhs: i64) -> Self
    {
        Self { thousandths: self.thousandths * rhs }
    }
}

impl fmt::Display for SetPoint
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let magnitude = self.thousandths.unsigned_abs();
        let whole = magnitude / 1000;
        let mut fraction = magnitude % 1000;
        let mut divisor = 1000u64;

        if self.thousandths < 0 {
            f.write_char('-')?;
        }
        write!(f, "{}", whole)?;

        if let Some(precision) = f.precision() {
            if precision != 0 {
                f.write_char('.')?;
            }

            // truncates past the third place
            for _index in 0..precision {
                if divisor == 1 {
                    f.write_char('0')?;
                }
                else {
                    divisor /= 10;
                    let digit = fraction / divisor;
                    fraction %= divisor;
                    f.write_char(char::from(b'0' + digit as u8))?;
                }
            }
        }
        else if fraction != 0 {
            f.write_char('.')?;
            while fraction != 0 {
                divisor /= 10;
                let digit = fraction / divisor;
                fraction %= divisor;
                f.write_char(char::from(b'0' + digit as u8))?;
            }
        }

        Ok(())
    }
}

macro_rules! hz
{
    ( $num:expr ) => {
        $crate::units::Hertz($num)
    };
    ( $num:expr, $prefix:ident ) => {
        $crate::units::Hertz::from::<$crate::units::$prefix>($num)
    };
}
