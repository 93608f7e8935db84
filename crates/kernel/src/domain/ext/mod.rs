//! Extension values: decimal, ipaddr, datetime, duration.
//!
//! Each family has an exact textual literal form accepted by its
//! constructor and produced by its `Display` impl, and a small method
//! surface dispatched by the evaluator. Values of different families are
//! never equal to each other.

mod datetime;
mod decimal;
mod duration;
mod ipaddr;

pub use datetime::Datetime;
pub use decimal::Decimal;
pub use duration::Duration;
pub use ipaddr::IpAddr;

use std::fmt;
use thiserror::Error;

/// Error for an ill-formed extension literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {constructor} literal `{literal}`: {reason}")]
pub struct ExtensionParseError {
    pub constructor: &'static str,
    pub literal: String,
    pub reason: String,
}

impl ExtensionParseError {
    pub(crate) fn new(constructor: &'static str, literal: &str, reason: impl Into<String>) -> Self {
        Self {
            constructor,
            literal: literal.to_string(),
            reason: reason.into(),
        }
    }
}

/// Second-level tagged sum nested under `Value::Ext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    Decimal(Decimal),
    Ip(IpAddr),
    Datetime(Datetime),
    Duration(Duration),
}

impl Extension {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Decimal(_) => "decimal",
            Self::Ip(_) => "ipaddr",
            Self::Datetime(_) => "datetime",
            Self::Duration(_) => "duration",
        }
    }

    /// The constructor call that re-parses to this value.
    pub fn constructor_name(&self) -> &'static str {
        match self {
            Self::Decimal(_) => "decimal",
            Self::Ip(_) => "ip",
            Self::Datetime(_) => "datetime",
            Self::Duration(_) => "duration",
        }
    }

    /// The literal argument of the constructor call, i.e. the value's
    /// canonical textual form.
    pub fn literal(&self) -> String {
        match self {
            Self::Decimal(d) => d.to_string(),
            Self::Ip(ip) => ip.to_string(),
            Self::Datetime(dt) => dt.to_string(),
            Self::Duration(d) => d.to_string(),
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(\"{}\")", self.constructor_name(), self.literal())
    }
}

impl From<Decimal> for Extension {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<IpAddr> for Extension {
    fn from(ip: IpAddr) -> Self {
        Self::Ip(ip)
    }
}

impl From<Datetime> for Extension {
    fn from(dt: Datetime) -> Self {
        Self::Datetime(dt)
    }
}

impl From<Duration> for Extension {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}
