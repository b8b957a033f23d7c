use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use crate::error::QuotaError;

/// Unit family used when a quantity is rendered back to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantityFormat {
    /// Powers of 1000 (`k`, `M`, `G`, ...) plus the milli suffix.
    #[default]
    DecimalSI,
    /// Powers of 1024 (`Ki`, `Mi`, `Gi`, ...).
    BinarySI,
}

const DECIMAL_SUFFIXES: [&str; 6] = ["k", "M", "G", "T", "P", "E"];
const BINARY_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

/// A resource amount stored exactly as an integer count of milli-units.
///
/// Equality and ordering compare the numeric value only; the format is kept
/// so sums and scaled values print in the unit family they were written in.
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    milli: i128,
    format: QuantityFormat,
}

/// Milli-units per one unit of `suffix`, with the format the suffix implies.
fn suffix_scale(suffix: &str) -> Option<(i128, QuantityFormat)> {
    let decimal = |exp: u32| Some((1000i128.pow(exp + 1), QuantityFormat::DecimalSI));
    let binary = |exp: u32| Some((1024i128.pow(exp) * 1000, QuantityFormat::BinarySI));
    match suffix {
        "" => decimal(0),
        "m" => Some((1, QuantityFormat::DecimalSI)),
        "k" | "K" => decimal(1),
        "M" => decimal(2),
        "G" => decimal(3),
        "T" => decimal(4),
        "P" => decimal(5),
        "E" => decimal(6),
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        _ => None,
    }
}

impl Quantity {
    pub fn zero() -> Self {
        Self {
            milli: 0,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Parse `"500m"`, `"2"`, `"1.5Gi"`, `"10k"` and friends.
    /// Fractions that do not land on a whole milli-unit are rounded up.
    pub fn parse(input: &str) -> Result<Self, QuotaError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(QuotaError::format(input, "empty quantity"));
        }

        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };

        let split = body
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(body.len());
        let (number, suffix) = body.split_at(split);

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(QuotaError::format(input, "missing numeric value"));
        }
        if fraction.contains('.') {
            return Err(QuotaError::format(input, "more than one decimal point"));
        }

        let (per_unit, format) = suffix_scale(suffix)
            .ok_or_else(|| QuotaError::format(input, format!("unrecognized suffix '{}'", suffix)))?;

        let mantissa: i128 = format!("{}{}", whole, fraction)
            .parse()
            .map_err(|_| QuotaError::format(input, "numeric value out of range"))?;
        let denominator = u32::try_from(fraction.len())
            .ok()
            .and_then(|digits| 10i128.checked_pow(digits))
            .ok_or_else(|| QuotaError::format(input, "too many fractional digits"))?;
        let numerator = mantissa
            .checked_mul(per_unit)
            .ok_or_else(|| QuotaError::format(input, "numeric value out of range"))?;

        let mut milli = numerator / denominator;
        if numerator % denominator != 0 {
            milli += 1;
        }
        if negative {
            milli = -milli;
        }
        Ok(Self { milli, format })
    }

    pub fn milli_value(&self) -> i128 {
        self.milli
    }

    /// Whole units, rounded up.
    pub fn value(&self) -> i128 {
        let whole = self.milli / 1000;
        if self.milli % 1000 > 0 { whole + 1 } else { whole }
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.milli == 0
    }

    /// Exact sum. The result keeps the left operand's format unless the left
    /// operand is zero (the identity used when accumulating).
    pub fn plus(&self, other: &Quantity) -> Quantity {
        let format = if self.milli == 0 {
            other.format
        } else {
            self.format
        };
        Quantity {
            milli: self.milli.saturating_add(other.milli),
            format,
        }
    }

    /// Multiply by `factor`. Non-positive and non-finite factors mean
    /// "no scaling" and return the quantity unchanged.
    pub fn scale(&self, factor: f64) -> Quantity {
        if !factor.is_finite() || factor <= 0.0 {
            return *self;
        }
        let milli = if factor.fract() == 0.0 && factor < 9_007_199_254_740_992.0 {
            self.milli.saturating_mul(factor as i128)
        } else {
            (self.milli as f64 * factor).ceil() as i128
        };
        Quantity {
            milli,
            format: self.format,
        }
    }

    /// Numeric `self <= limit` after unit normalization.
    pub fn fits_within(&self, limit: &Quantity) -> bool {
        self.milli <= limit.milli
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli == other.milli
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.milli.cmp(&other.milli)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        self.plus(&rhs)
    }
}

impl FromStr for Quantity {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli % 1000 != 0 {
            return write!(f, "{}m", self.milli);
        }
        let value = self.milli / 1000;
        if value == 0 {
            return write!(f, "0");
        }

        let (base, suffixes) = match self.format {
            QuantityFormat::DecimalSI => (1000, &DECIMAL_SUFFIXES),
            QuantityFormat::BinarySI => (1024, &BINARY_SUFFIXES),
        };
        let mut scaled = value;
        let mut exponent = 0;
        while exponent < suffixes.len() && scaled % base == 0 {
            scaled /= base;
            exponent += 1;
        }
        if exponent == 0 {
            write!(f, "{}", value)
        } else {
            write!(f, "{}{}", scaled, suffixes[exponent - 1])
        }
    }
}
