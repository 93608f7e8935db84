//! The condition expression tree.
//!
//! Policies are consumed as already-built ASTs; the constructors here are
//! the builder surface a parser (or a test) uses. `&&`, `||` and
//! `if-then-else` are dedicated nodes because their unevaluated operands
//! must stay unevaluated.

use super::pattern::Pattern;
use kernel::Value;
use std::fmt;

/// A request variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    Principal,
    Action,
    Resource,
    Context,
}

impl Var {
    pub fn name(self) -> &'static str {
        match self {
            Self::Principal => "principal",
            Self::Action => "action",
            Self::Resource => "resource",
            Self::Context => "context",
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A strict binary operator (both operands always evaluated).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Add,
    Sub,
    Mul,
    In,
    Contains,
    ContainsAll,
    ContainsAny,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::In => "in",
            Self::Contains => "contains",
            Self::ContainsAll => "containsAll",
            Self::ContainsAny => "containsAny",
        }
    }

    /// Method-call syntax (`a.contains(b)`) rather than infix.
    pub fn is_method_call(self) -> bool {
        matches!(self, Self::Contains | Self::ContainsAll | Self::ContainsAny)
    }
}

/// An extension constructor or method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtFn {
    // Constructors
    Decimal,
    Ip,
    Datetime,
    Duration,
    // Decimal comparisons
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Ip classification and containment
    IsIpv4,
    IsIpv6,
    IsLoopback,
    IsMulticast,
    IsInRange,
    // Datetime arithmetic
    Offset,
    DurationSince,
    ToDate,
    ToTime,
    // Duration conversions
    ToDays,
    ToHours,
    ToMinutes,
    ToSeconds,
    ToMilliseconds,
}

impl ExtFn {
    pub fn name(self) -> &'static str {
        match self {
            Self::Decimal => "decimal",
            Self::Ip => "ip",
            Self::Datetime => "datetime",
            Self::Duration => "duration",
            Self::LessThan => "lessThan",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::GreaterThan => "greaterThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::IsIpv4 => "isIpv4",
            Self::IsIpv6 => "isIpv6",
            Self::IsLoopback => "isLoopback",
            Self::IsMulticast => "isMulticast",
            Self::IsInRange => "isInRange",
            Self::Offset => "offset",
            Self::DurationSince => "durationSince",
            Self::ToDate => "toDate",
            Self::ToTime => "toTime",
            Self::ToDays => "toDays",
            Self::ToHours => "toHours",
            Self::ToMinutes => "toMinutes",
            Self::ToSeconds => "toSeconds",
            Self::ToMilliseconds => "toMilliseconds",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "decimal" => Self::Decimal,
            "ip" => Self::Ip,
            "datetime" => Self::Datetime,
            "duration" => Self::Duration,
            "lessThan" => Self::LessThan,
            "lessThanOrEqual" => Self::LessThanOrEqual,
            "greaterThan" => Self::GreaterThan,
            "greaterThanOrEqual" => Self::GreaterThanOrEqual,
            "isIpv4" => Self::IsIpv4,
            "isIpv6" => Self::IsIpv6,
            "isLoopback" => Self::IsLoopback,
            "isMulticast" => Self::IsMulticast,
            "isInRange" => Self::IsInRange,
            "offset" => Self::Offset,
            "durationSince" => Self::DurationSince,
            "toDate" => Self::ToDate,
            "toTime" => Self::ToTime,
            "toDays" => Self::ToDays,
            "toHours" => Self::ToHours,
            "toMinutes" => Self::ToMinutes,
            "toSeconds" => Self::ToSeconds,
            "toMilliseconds" => Self::ToMilliseconds,
            _ => return None,
        })
    }

    /// Total argument count, receiver included for methods.
    pub fn arity(self) -> usize {
        match self {
            Self::Decimal | Self::Ip | Self::Datetime | Self::Duration => 1,
            Self::IsIpv4
            | Self::IsIpv6
            | Self::IsLoopback
            | Self::IsMulticast
            | Self::ToDate
            | Self::ToTime
            | Self::ToDays
            | Self::ToHours
            | Self::ToMinutes
            | Self::ToSeconds
            | Self::ToMilliseconds => 1,
            Self::LessThan
            | Self::LessThanOrEqual
            | Self::GreaterThan
            | Self::GreaterThanOrEqual
            | Self::IsInRange
            | Self::Offset
            | Self::DurationSince => 2,
        }
    }

    /// Constructors render as `fn(arg)`, methods as `recv.fn(args…)`.
    pub fn is_constructor(self) -> bool {
        matches!(self, Self::Decimal | Self::Ip | Self::Datetime | Self::Duration)
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A literal value.
    Value(Value),
    /// A request variable.
    Var(Var),
    /// An unreduced input, only present in partial-evaluation residuals.
    Unknown(String),
    /// A captured evaluation error, only present in residuals.
    Error(String),
    /// Short-circuiting conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuiting disjunction.
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Arithmetic negation.
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Lazy conditional: only the chosen branch is evaluated.
    If {
        guard: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `e.attr`
    GetAttr { expr: Box<Expr>, attr: String },
    /// `e has attr`
    HasAttr { expr: Box<Expr>, attr: String },
    /// `e.getTag(k)`
    GetTag { expr: Box<Expr>, tag: Box<Expr> },
    /// `e.hasTag(k)`
    HasTag { expr: Box<Expr>, tag: Box<Expr> },
    /// `e like "pattern"`
    Like { expr: Box<Expr>, pattern: Pattern },
    /// `e is Type`
    Is { expr: Box<Expr>, entity_type: String },
    /// Set literal; duplicates collapse at evaluation.
    Set(Vec<Expr>),
    /// Record literal; the AST contract guarantees unique keys.
    Record(Vec<(String, Expr)>),
    /// Extension constructor or method call.
    ExtCall { function: ExtFn, args: Vec<Expr> },
    /// `e.isEmpty()`
    IsEmpty(Box<Expr>),
}

impl Expr {
    pub fn val(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn var(var: Var) -> Self {
        Self::Var(var)
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Self::Unknown(name.into())
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    pub fn not(expr: Expr) -> Self {
        Self::Not(Box::new(expr))
    }

    pub fn neg(expr: Expr) -> Self {
        Self::Neg(Box::new(expr))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn not_eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::NotEq, left, right)
    }

    pub fn less(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Less, left, right)
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Add, left, right)
    }

    pub fn in_(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::In, left, right)
    }

    pub fn contains(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Contains, left, right)
    }

    pub fn ite(guard: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        Self::If {
            guard: Box::new(guard),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub fn get_attr(expr: Expr, attr: impl Into<String>) -> Self {
        Self::GetAttr {
            expr: Box::new(expr),
            attr: attr.into(),
        }
    }

    pub fn has_attr(expr: Expr, attr: impl Into<String>) -> Self {
        Self::HasAttr {
            expr: Box::new(expr),
            attr: attr.into(),
        }
    }

    pub fn get_tag(expr: Expr, tag: Expr) -> Self {
        Self::GetTag {
            expr: Box::new(expr),
            tag: Box::new(tag),
        }
    }

    pub fn has_tag(expr: Expr, tag: Expr) -> Self {
        Self::HasTag {
            expr: Box::new(expr),
            tag: Box::new(tag),
        }
    }

    pub fn like(expr: Expr, pattern: Pattern) -> Self {
        Self::Like {
            expr: Box::new(expr),
            pattern,
        }
    }

    pub fn is_type(expr: Expr, entity_type: impl Into<String>) -> Self {
        Self::Is {
            expr: Box::new(expr),
            entity_type: entity_type.into(),
        }
    }

    /// `e is T in target`, which evaluates as
    /// `(e is T) && (e in target)` with the type test first.
    pub fn is_type_in(expr: Expr, entity_type: impl Into<String>, target: Expr) -> Self {
        Self::and(
            Self::is_type(expr.clone(), entity_type),
            Self::in_(expr, target),
        )
    }

    pub fn set(elems: Vec<Expr>) -> Self {
        Self::Set(elems)
    }

    pub fn record(entries: Vec<(String, Expr)>) -> Self {
        Self::Record(entries)
    }

    pub fn ext_call(function: ExtFn, args: Vec<Expr>) -> Self {
        Self::ExtCall { function, args }
    }

    pub fn is_empty(expr: Expr) -> Self {
        Self::IsEmpty(Box::new(expr))
    }

    /// True when the node is a literal value.
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        if let Self::Value(v) = self { Some(v) } else { None }
    }

    /// Collects the names of `Unknown` nodes in this subtree into `out`.
    pub fn collect_unknowns(&self, out: &mut std::collections::BTreeSet<String>) {
        match self {
            Self::Unknown(name) => {
                out.insert(name.clone());
            }
            Self::Value(_) | Self::Var(_) | Self::Error(_) => {}
            Self::And(a, b) | Self::Or(a, b) | Self::Binary { left: a, right: b, .. } => {
                a.collect_unknowns(out);
                b.collect_unknowns(out);
            }
            Self::Not(e) | Self::Neg(e) | Self::IsEmpty(e) => e.collect_unknowns(out),
            Self::If {
                guard,
                then_branch,
                else_branch,
            } => {
                guard.collect_unknowns(out);
                then_branch.collect_unknowns(out);
                else_branch.collect_unknowns(out);
            }
            Self::GetAttr { expr, .. }
            | Self::HasAttr { expr, .. }
            | Self::Like { expr, .. }
            | Self::Is { expr, .. } => expr.collect_unknowns(out),
            Self::GetTag { expr, tag } | Self::HasTag { expr, tag } => {
                expr.collect_unknowns(out);
                tag.collect_unknowns(out);
            }
            Self::Set(elems) => {
                for e in elems {
                    e.collect_unknowns(out);
                }
            }
            Self::Record(entries) => {
                for (_, e) in entries {
                    e.collect_unknowns(out);
                }
            }
            Self::ExtCall { args, .. } => {
                for e in args {
                    e.collect_unknowns(out);
                }
            }
        }
    }

    /// True when the subtree contains a captured `Error` node.
    pub fn contains_error(&self) -> bool {
        match self {
            Self::Error(_) => true,
            Self::Value(_) | Self::Var(_) | Self::Unknown(_) => false,
            Self::And(a, b) | Self::Or(a, b) | Self::Binary { left: a, right: b, .. } => {
                a.contains_error() || b.contains_error()
            }
            Self::Not(e) | Self::Neg(e) | Self::IsEmpty(e) => e.contains_error(),
            Self::If {
                guard,
                then_branch,
                else_branch,
            } => {
                guard.contains_error() || then_branch.contains_error() || else_branch.contains_error()
            }
            Self::GetAttr { expr, .. }
            | Self::HasAttr { expr, .. }
            | Self::Like { expr, .. }
            | Self::Is { expr, .. } => expr.contains_error(),
            Self::GetTag { expr, tag } | Self::HasTag { expr, tag } => {
                expr.contains_error() || tag.contains_error()
            }
            Self::Set(elems) => elems.iter().any(Expr::contains_error),
            Self::Record(entries) => entries.iter().any(|(_, e)| e.contains_error()),
            Self::ExtCall { args, .. } => args.iter().any(Expr::contains_error),
        }
    }
}
