use super::{Duration, ExtensionParseError};
use std::fmt;

const CONSTRUCTOR: &str = "datetime";

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// A point in time, stored as signed milliseconds since the Unix epoch.
///
/// Calendar conversion is done with in-module civil-calendar arithmetic
/// rather than a date-time library: the representable range at millisecond
/// scale (roughly ±292 million years) exceeds what the ecosystem calendar
/// types can hold. Tests cross-check the arithmetic against `chrono` for
/// dates both can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Datetime(i64);

impl Datetime {
    /// Parses the `datetime("...")` literal body. Accepted shapes:
    /// `YYYY-MM-DD`, `YYYY-MM-DDThh:mm:ssZ`, `YYYY-MM-DDThh:mm:ss.SSSZ`,
    /// and the same with a `(+|-)hhmm` offset instead of `Z`. The year may
    /// also be written as a sign followed by nine digits.
    pub fn parse(literal: &str) -> Result<Self, ExtensionParseError> {
        let err = |reason: &str| ExtensionParseError::new(CONSTRUCTOR, literal, reason);
        let s = literal.as_bytes();

        let (year, rest) = parse_year(s).ok_or_else(|| err("malformed year"))?;
        let (month, day, rest) = parse_month_day(rest).ok_or_else(|| err("malformed date"))?;
        if !(1..=12).contains(&month) {
            return Err(err("month out of range"));
        }
        if day < 1 || day > days_in_month(year, month) {
            return Err(err("day does not exist in that month"));
        }

        let (ms_of_day, offset_ms) = if rest.is_empty() {
            (0, 0)
        } else {
            parse_time(rest).ok_or_else(|| err("malformed time of day"))?
        };

        let days = days_from_civil(year, month, day);
        days.checked_mul(MS_PER_DAY)
            .and_then(|ms| ms.checked_add(ms_of_day))
            .and_then(|ms| ms.checked_sub(offset_ms))
            .map(Datetime)
            .ok_or_else(|| err("timestamp out of range"))
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp_millis(self) -> i64 {
        self.0
    }

    pub fn from_timestamp_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// This instant shifted by `d`, or `None` on overflow.
    pub fn offset(self, d: Duration) -> Option<Self> {
        self.0.checked_add(d.as_millis()).map(Datetime)
    }

    /// Elapsed duration from `other` to `self`, or `None` on overflow.
    pub fn duration_since(self, other: Self) -> Option<Duration> {
        self.0.checked_sub(other.0).map(Duration::from_millis)
    }

    /// Midnight UTC of this instant's calendar day.
    pub fn to_date(self) -> Self {
        Self(self.0.div_euclid(MS_PER_DAY) * MS_PER_DAY)
    }

    /// Milliseconds elapsed since midnight UTC of this instant's day.
    pub fn to_time(self) -> Duration {
        Duration::from_millis(self.0.rem_euclid(MS_PER_DAY))
    }
}

fn parse_year(s: &[u8]) -> Option<(i64, &[u8])> {
    let (sign, digits, rest_at) = match s.first()? {
        b'+' | b'-' => (if s[0] == b'-' { -1 } else { 1 }, s.get(1..10)?, 10),
        _ => (1, s.get(..4)?, 4),
    };
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let year: i64 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some((sign * year, &s[rest_at..]))
}

fn parse_month_day(s: &[u8]) -> Option<(i64, i64, &[u8])> {
    if s.len() < 6 || s[0] != b'-' || s[3] != b'-' {
        return None;
    }
    let month = two_digits(&s[1..3])?;
    let day = two_digits(&s[4..6])?;
    Some((month, day, &s[6..]))
}

/// Parses `Thh:mm:ss[.SSS](Z|(+|-)hhmm)` into (ms of day, offset ms).
fn parse_time(s: &[u8]) -> Option<(i64, i64)> {
    if s.len() < 9 || s[0] != b'T' || s[3] != b':' || s[6] != b':' {
        return None;
    }
    let hour = two_digits(&s[1..3])?;
    let minute = two_digits(&s[4..6])?;
    let second = two_digits(&s[7..9])?;
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    let mut rest = &s[9..];
    let mut millis = 0;
    if rest.first() == Some(&b'.') {
        let digits = rest.get(1..4)?;
        if !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        millis = std::str::from_utf8(digits).ok()?.parse().ok()?;
        rest = &rest[4..];
    }

    let offset_ms = match rest {
        [b'Z'] => 0,
        [sign @ (b'+' | b'-'), rest @ ..] if rest.len() == 4 => {
            let oh = two_digits(&rest[..2])?;
            let om = two_digits(&rest[2..])?;
            if oh > 23 || om > 59 {
                return None;
            }
            let ms = oh * MS_PER_HOUR + om * MS_PER_MINUTE;
            if *sign == b'-' { -ms } else { ms }
        }
        _ => return None,
    };

    Some((
        hour * MS_PER_HOUR + minute * MS_PER_MINUTE + second * MS_PER_SECOND + millis,
        offset_ms,
    ))
}

fn two_digits(s: &[u8]) -> Option<i64> {
    match s {
        [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => {
            Some(((a - b'0') * 10 + (b - b'0')) as i64)
        }
        _ => None,
    }
}

fn is_leap_year(year: i64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: i64, month: i64) -> i64 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days between 1970-01-01 and the given proleptic-Gregorian civil date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of `days_from_civil`.
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    (if month <= 2 { y + 1 } else { y }, month, day)
}

impl fmt::Display for Datetime {
    /// Canonical UTC form: date-only at midnight, otherwise
    /// `...Thh:mm:ssZ`, with `.SSS` when the millisecond part is nonzero.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.0.div_euclid(MS_PER_DAY);
        let ms_of_day = self.0.rem_euclid(MS_PER_DAY);
        let (year, month, day) = civil_from_days(days);

        if (0..=9999).contains(&year) {
            write!(f, "{:04}-{:02}-{:02}", year, month, day)?;
        } else {
            let sign = if year < 0 { '-' } else { '+' };
            write!(f, "{}{:09}-{:02}-{:02}", sign, year.unsigned_abs(), month, day)?;
        }

        if ms_of_day != 0 {
            let hour = ms_of_day / MS_PER_HOUR;
            let minute = ms_of_day % MS_PER_HOUR / MS_PER_MINUTE;
            let second = ms_of_day % MS_PER_MINUTE / MS_PER_SECOND;
            let millis = ms_of_day % MS_PER_SECOND;
            write!(f, "T{:02}:{:02}:{:02}", hour, minute, second)?;
            if millis != 0 {
                write!(f, ".{:03}", millis)?;
            }
            write!(f, "Z")?;
        }
        Ok(())
    }
}
