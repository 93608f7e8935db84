use super::ExtensionParseError;
use std::fmt;

const CONSTRUCTOR: &str = "duration";

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// A span of time, stored as signed milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

impl Duration {
    /// Parses the `duration("...")` literal body: an optional leading `-`,
    /// then at least one of `<n>d`, `<n>h`, `<n>m`, `<n>s`, `<n>ms`, in
    /// strictly descending unit order.
    pub fn parse(literal: &str) -> Result<Self, ExtensionParseError> {
        let err = |reason: &str| ExtensionParseError::new(CONSTRUCTOR, literal, reason);

        let (negative, body) = match literal.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, literal),
        };
        if body.is_empty() {
            return Err(err("expected at least one unit"));
        }

        // Units with their rank; ranks must strictly descend across the literal.
        const UNITS: [(&str, i64); 5] = [
            ("d", MS_PER_DAY),
            ("h", MS_PER_HOUR),
            ("m", MS_PER_MINUTE),
            ("s", MS_PER_SECOND),
            ("ms", 1),
        ];

        let mut total: i128 = 0;
        let mut next_unit = 0;
        let mut rest = body;
        while !rest.is_empty() {
            let digits_end = rest.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(rest.len());
            if digits_end == 0 {
                return Err(err("expected digits before a unit"));
            }
            let amount: i128 = rest[..digits_end]
                .parse()
                .map_err(|_| err("amount out of range"))?;
            rest = &rest[digits_end..];

            // `m` must not consume the `m` of a trailing `ms`.
            let unit_end = rest.bytes().position(|b| b.is_ascii_digit()).unwrap_or(rest.len());
            let unit = &rest[..unit_end];
            rest = &rest[unit_end..];

            let rank = UNITS[next_unit..]
                .iter()
                .position(|(name, _)| *name == unit)
                .map(|offset| next_unit + offset)
                .ok_or_else(|| err("units must be d, h, m, s, ms in descending order"))?;
            next_unit = rank + 1;
            total += amount * UNITS[rank].1 as i128;
        }

        if negative {
            total = -total;
        }
        i64::try_from(total)
            .map(Duration)
            .map_err(|_| err("value out of range"))
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Whole days, truncated toward zero.
    pub fn to_days(self) -> i64 {
        self.0 / MS_PER_DAY
    }

    pub fn to_hours(self) -> i64 {
        self.0 / MS_PER_HOUR
    }

    pub fn to_minutes(self) -> i64 {
        self.0 / MS_PER_MINUTE
    }

    pub fn to_seconds(self) -> i64 {
        self.0 / MS_PER_SECOND
    }

    pub fn to_milliseconds(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Duration {
    /// Canonical form: descending non-zero components, `0ms` for zero.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0ms");
        }
        if self.0 < 0 {
            write!(f, "-")?;
        }
        let mut rest = (self.0 as i128).unsigned_abs();
        for (name, ms) in [
            ("d", MS_PER_DAY),
            ("h", MS_PER_HOUR),
            ("m", MS_PER_MINUTE),
            ("s", MS_PER_SECOND),
            ("ms", 1),
        ] {
            let amount = rest / ms as u128;
            if amount != 0 {
                write!(f, "{}{}", amount, name)?;
                rest %= ms as u128;
            }
        }
        Ok(())
    }
}
