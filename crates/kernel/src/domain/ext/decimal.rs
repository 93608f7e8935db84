use super::ExtensionParseError;
use std::fmt;

const CONSTRUCTOR: &str = "decimal";

/// Fixed-point decimal with four fractional digits, stored as the value
/// multiplied by 10^4 in an `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(i64);

impl Decimal {
    pub const SCALE: i64 = 10_000;

    /// Parses the `decimal("N.F")` literal body: an optional sign, integer
    /// digits, a dot, and one to four fractional digits.
    pub fn parse(literal: &str) -> Result<Self, ExtensionParseError> {
        let err = |reason: &str| ExtensionParseError::new(CONSTRUCTOR, literal, reason);

        let (negative, body) = match literal.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, literal),
        };
        let (int_part, frac_part) = body
            .split_once('.')
            .ok_or_else(|| err("missing decimal point"))?;

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err("integer part must be one or more digits"));
        }
        if frac_part.is_empty() || frac_part.len() > 4 {
            return Err(err("fractional part must be one to four digits"));
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err("fractional part must be digits"));
        }

        let int: i128 = int_part.parse().map_err(|_| err("integer part out of range"))?;
        let frac: i128 = frac_part.parse().expect("digits only");
        let frac = frac * 10i128.pow(4 - frac_part.len() as u32);

        let mut raw = int * Self::SCALE as i128 + frac;
        if negative {
            raw = -raw;
        }
        i64::try_from(raw)
            .map(Decimal)
            .map_err(|_| err("value out of range"))
    }

    /// The underlying value scaled by 10^4.
    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn less_than(self, other: Self) -> bool {
        self.0 < other.0
    }

    pub fn less_than_or_equal(self, other: Self) -> bool {
        self.0 <= other.0
    }

    pub fn greater_than(self, other: Self) -> bool {
        self.0 > other.0
    }

    pub fn greater_than_or_equal(self, other: Self) -> bool {
        self.0 >= other.0
    }
}

impl fmt::Display for Decimal {
    /// Canonical form: trailing fractional zeros trimmed, at least one
    /// fractional digit kept, so `Display` then `parse` is the identity.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.0 as i128;
        let sign = if raw < 0 { "-" } else { "" };
        let abs = raw.unsigned_abs();
        let int = abs / Decimal::SCALE as u128;
        let frac = (abs % Decimal::SCALE as u128) as u64;

        let mut frac_str = format!("{:04}", frac);
        while frac_str.len() > 1 && frac_str.ends_with('0') {
            frac_str.pop();
        }
        write!(f, "{}{}.{}", sign, int, frac_str)
    }
}
