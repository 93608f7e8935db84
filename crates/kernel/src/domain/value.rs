//! Dynamic values flowing through policy evaluation.
//!
//! `Value` is a tagged sum: all runtime type checks are discriminant
//! dispatch. Sets are unordered with duplicates collapsed by value
//! equality; records are key-sorted maps. Extension values nest a second
//! discriminant (`Extension`).

use crate::domain::error::EvaluationError;
use crate::domain::ext::{Datetime, Decimal, Duration, Extension, IpAddr};
use crate::domain::uid::EntityUid;
use std::collections::BTreeMap;
use std::fmt;

/// Represents a runtime value: a primitive, an entity reference, a
/// collection, or an extension value.
///
/// # Examples
///
/// ```
/// use kernel::{EntityUid, Value};
///
/// let email = Value::string("user@example.com");
/// let age = Value::long(30);
/// let owner = Value::from(EntityUid::new("User", "alice"));
/// let tags = Value::set(vec![Value::string("admin"), Value::string("admin")]);
/// assert_eq!(tags.as_set().unwrap().len(), 1); // duplicates collapse
/// let _ = (email, age, owner);
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// Boolean value
    Bool(bool),

    /// 64-bit signed integer
    Long(i64),

    /// UTF-8 string
    String(String),

    /// Reference to an entity by UID
    EntityRef(EntityUid),

    /// Unordered collection with duplicates collapsed by value equality
    Set(Vec<Value>),

    /// Record with unique string keys; insertion order is irrelevant
    Record(BTreeMap<String, Value>),

    /// Extension value (decimal, ipaddr, datetime, duration)
    Ext(Extension),
}

impl Value {
    pub fn bool(value: bool) -> Self {
        Self::Bool(value)
    }

    pub fn long(value: i64) -> Self {
        Self::Long(value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn entity(uid: EntityUid) -> Self {
        Self::EntityRef(uid)
    }

    /// Creates a set, collapsing duplicates by value equality.
    pub fn set(values: Vec<Value>) -> Self {
        let mut out: Vec<Value> = Vec::with_capacity(values.len());
        for v in values {
            if !out.contains(&v) {
                out.push(v);
            }
        }
        Self::Set(out)
    }

    pub fn empty_set() -> Self {
        Self::Set(Vec::new())
    }

    pub fn record(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::Record(entries.into_iter().collect())
    }

    pub fn empty_record() -> Self {
        Self::Record(BTreeMap::new())
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Self::Long(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Self::EntityRef(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    pub fn is_ext(&self) -> bool {
        matches!(self, Self::Ext(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(v) = self { Some(*v) } else { None }
    }

    pub fn as_long(&self) -> Option<i64> {
        if let Self::Long(v) = self { Some(*v) } else { None }
    }

    pub fn as_string(&self) -> Option<&str> {
        if let Self::String(v) = self { Some(v) } else { None }
    }

    pub fn as_entity(&self) -> Option<&EntityUid> {
        if let Self::EntityRef(v) = self { Some(v) } else { None }
    }

    pub fn as_set(&self) -> Option<&[Value]> {
        if let Self::Set(v) = self { Some(v) } else { None }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        if let Self::Record(v) = self { Some(v) } else { None }
    }

    pub fn as_ext(&self) -> Option<&Extension> {
        if let Self::Ext(v) = self { Some(v) } else { None }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Ext(Extension::Decimal(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn as_ipaddr(&self) -> Option<&IpAddr> {
        match self {
            Self::Ext(Extension::Ip(ip)) => Some(ip),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<Datetime> {
        match self {
            Self::Ext(Extension::Datetime(dt)) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Ext(Extension::Duration(d)) => Some(*d),
            _ => None,
        }
    }

    /// Returns the name of the value's runtime type, as used in error
    /// messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Long(_) => "long",
            Self::String(_) => "string",
            Self::EntityRef(_) => "entity",
            Self::Set(_) => "set",
            Self::Record(_) => "record",
            Self::Ext(e) => e.type_name(),
        }
    }

    /// Equality across all value kinds. Never errors; values of distinct
    /// runtime types are unequal.
    pub fn equal(&self, other: &Value) -> bool {
        self == other
    }

    /// `<` over the comparable families: two longs, two datetimes, or two
    /// durations.
    pub fn less_than(&self, other: &Value) -> Result<bool, EvaluationError> {
        match (self, other) {
            (Self::Long(a), Self::Long(b)) => Ok(a < b),
            (Self::Ext(Extension::Datetime(a)), Self::Ext(Extension::Datetime(b))) => Ok(a < b),
            (Self::Ext(Extension::Duration(a)), Self::Ext(Extension::Duration(b))) => Ok(a < b),
            _ => Err(EvaluationError::NotComparable {
                lhs: self.type_name(),
                rhs: other.type_name(),
            }),
        }
    }

    /// `<=` over the comparable families.
    pub fn less_than_or_equal(&self, other: &Value) -> Result<bool, EvaluationError> {
        match (self, other) {
            (Self::Long(a), Self::Long(b)) => Ok(a <= b),
            (Self::Ext(Extension::Datetime(a)), Self::Ext(Extension::Datetime(b))) => Ok(a <= b),
            (Self::Ext(Extension::Duration(a)), Self::Ext(Extension::Duration(b))) => Ok(a <= b),
            _ => Err(EvaluationError::NotComparable {
                lhs: self.type_name(),
                rhs: other.type_name(),
            }),
        }
    }

    pub fn checked_add(&self, other: &Value) -> Result<Value, EvaluationError> {
        let (a, b) = self.arithmetic_operands(other)?;
        a.checked_add(b)
            .map(Value::Long)
            .ok_or(EvaluationError::overflow("+"))
    }

    pub fn checked_sub(&self, other: &Value) -> Result<Value, EvaluationError> {
        let (a, b) = self.arithmetic_operands(other)?;
        a.checked_sub(b)
            .map(Value::Long)
            .ok_or(EvaluationError::overflow("-"))
    }

    pub fn checked_mul(&self, other: &Value) -> Result<Value, EvaluationError> {
        let (a, b) = self.arithmetic_operands(other)?;
        a.checked_mul(b)
            .map(Value::Long)
            .ok_or(EvaluationError::overflow("*"))
    }

    pub fn checked_neg(&self) -> Result<Value, EvaluationError> {
        let a = self
            .as_long()
            .ok_or_else(|| EvaluationError::type_error("long", self.type_name()))?;
        a.checked_neg()
            .map(Value::Long)
            .ok_or(EvaluationError::overflow("-"))
    }

    fn arithmetic_operands(&self, other: &Value) -> Result<(i64, i64), EvaluationError> {
        let a = self
            .as_long()
            .ok_or_else(|| EvaluationError::type_error("long", self.type_name()))?;
        let b = other
            .as_long()
            .ok_or_else(|| EvaluationError::type_error("long", other.type_name()))?;
        Ok((a, b))
    }

    pub fn not(&self) -> Result<Value, EvaluationError> {
        self.as_bool()
            .map(|b| Value::Bool(!b))
            .ok_or_else(|| EvaluationError::type_error("bool", self.type_name()))
    }

    fn set_operand(&self) -> Result<&[Value], EvaluationError> {
        self.as_set()
            .ok_or_else(|| EvaluationError::type_error("set", self.type_name()))
    }

    /// Set membership by value equality. The receiver must be a set.
    pub fn contains(&self, needle: &Value) -> Result<bool, EvaluationError> {
        Ok(self.set_operand()?.iter().any(|v| v == needle))
    }

    /// True when every element of `other` (a set) is in the receiver.
    pub fn contains_all(&self, other: &Value) -> Result<bool, EvaluationError> {
        let haystack = self.set_operand()?;
        let needles = other.set_operand()?;
        Ok(needles.iter().all(|n| haystack.contains(n)))
    }

    /// True when some element of `other` (a set) is in the receiver.
    pub fn contains_any(&self, other: &Value) -> Result<bool, EvaluationError> {
        let haystack = self.set_operand()?;
        let needles = other.set_operand()?;
        Ok(needles.iter().any(|n| haystack.contains(n)))
    }

    /// True when the receiver is the empty set.
    pub fn is_empty_set(&self) -> Result<bool, EvaluationError> {
        Ok(self.set_operand()?.is_empty())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::EntityRef(a), Self::EntityRef(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::Ext(a), Self::Ext(b)) => a == b,
            // Sets compare as multisets after duplicate collapse, so the
            // element order never matters.
            (Self::Set(a), Self::Set(b)) => {
                a.iter().all(|x| b.contains(x)) && b.iter().all(|x| a.contains(x))
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::String(v) => {
                write!(f, "\"")?;
                for c in v.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            Self::EntityRef(uid) => write!(f, "{}", uid),
            Self::Set(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Self::Record(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", k, v)?;
                }
                write!(f, "}}")
            }
            Self::Ext(e) => write!(f, "{}", e),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Long(value as i64)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<EntityUid> for Value {
    fn from(uid: EntityUid) -> Self {
        Self::EntityRef(uid)
    }
}

impl From<Extension> for Value {
    fn from(ext: Extension) -> Self {
        Self::Ext(ext)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Self::Ext(Extension::Decimal(d))
    }
}

impl From<IpAddr> for Value {
    fn from(ip: IpAddr) -> Self {
        Self::Ext(Extension::Ip(ip))
    }
}

impl From<Datetime> for Value {
    fn from(dt: Datetime) -> Self {
        Self::Ext(Extension::Datetime(dt))
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Self::Ext(Extension::Duration(d))
    }
}
