//! Expression rewriting under unknown inputs.
//!
//! Reduction folds every subtree whose operands are concrete, preserves
//! subtrees that depend on a variable marker, and captures evaluation
//! errors as `Error` nodes instead of propagating them.

use crate::eval::Core;
use crate::partial::PartialRequest;
use baimen_policies::ast::expr::{Expr, Var};
use kernel::{AncestryCache, EntityStore, EvaluationError, Value};

pub(crate) struct PartialEvaluator<'a> {
    request: &'a PartialRequest,
    core: Core<'a>,
}

/// True when the value is, or contains, a variable marker, in which case
/// no operation over it may be folded.
pub(crate) fn contains_variable(value: &Value) -> bool {
    match value {
        Value::EntityRef(uid) => uid.is_variable(),
        Value::Set(items) => items.iter().any(contains_variable),
        Value::Record(map) => map.values().any(contains_variable),
        _ => false,
    }
}

impl<'a> PartialEvaluator<'a> {
    pub(crate) fn new(
        request: &'a PartialRequest,
        entities: &'a EntityStore,
        ancestry: &'a AncestryCache,
    ) -> Self {
        Self {
            request,
            core: Core { entities, ancestry },
        }
    }

    /// The value of a reduced node, when folding over it is sound.
    pub(crate) fn concrete(expr: &Expr) -> Option<&Value> {
        match expr {
            Expr::Value(v) if !contains_variable(v) => Some(v),
            _ => None,
        }
    }

    /// Wraps a computed value, surfacing a direct variable marker as an
    /// `Unknown` node.
    fn value_expr(value: Value) -> Expr {
        if let Some(name) = value.as_entity().and_then(|uid| uid.variable_name()) {
            Expr::Unknown(name.to_string())
        } else {
            Expr::Value(value)
        }
    }

    fn lift(result: Result<Value, EvaluationError>) -> Expr {
        match result {
            Ok(v) => Self::value_expr(v),
            Err(e) => Expr::Error(e.to_string()),
        }
    }

    fn type_error(expected: &'static str, got: &Value) -> Expr {
        Expr::Error(EvaluationError::type_error(expected, got.type_name()).to_string())
    }

    pub(crate) fn reduce(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::Value(v) => Self::value_expr(v.clone()),
            Expr::Var(Var::Principal) => {
                Self::value_expr(Value::entity(self.request.principal().clone()))
            }
            Expr::Var(Var::Action) => {
                Self::value_expr(Value::entity(self.request.action().clone()))
            }
            Expr::Var(Var::Resource) => {
                Self::value_expr(Value::entity(self.request.resource().clone()))
            }
            Expr::Var(Var::Context) => Self::value_expr(self.request.context().clone()),
            Expr::Unknown(name) => Expr::Unknown(name.clone()),
            Expr::Error(msg) => Expr::Error(msg.clone()),

            Expr::And(a, b) => {
                let left = self.reduce(a);
                match Self::concrete(&left) {
                    Some(Value::Bool(false)) => Expr::Value(Value::Bool(false)),
                    Some(Value::Bool(true)) => {
                        let right = self.reduce(b);
                        match Self::concrete(&right) {
                            Some(Value::Bool(x)) => Expr::Value(Value::Bool(*x)),
                            Some(other) => Self::type_error("bool", other),
                            None => right,
                        }
                    }
                    Some(other) => Self::type_error("bool", other),
                    None => Expr::and(left, self.reduce(b)),
                }
            }
            Expr::Or(a, b) => {
                let left = self.reduce(a);
                match Self::concrete(&left) {
                    Some(Value::Bool(true)) => Expr::Value(Value::Bool(true)),
                    Some(Value::Bool(false)) => {
                        let right = self.reduce(b);
                        match Self::concrete(&right) {
                            Some(Value::Bool(x)) => Expr::Value(Value::Bool(*x)),
                            Some(other) => Self::type_error("bool", other),
                            None => right,
                        }
                    }
                    Some(other) => Self::type_error("bool", other),
                    None => Expr::or(left, self.reduce(b)),
                }
            }
            Expr::Not(e) => {
                let inner = self.reduce(e);
                match Self::concrete(&inner) {
                    Some(v) => Self::lift(v.not()),
                    None => Expr::not(inner),
                }
            }
            Expr::Neg(e) => {
                let inner = self.reduce(e);
                match Self::concrete(&inner) {
                    Some(v) => Self::lift(v.checked_neg()),
                    None => Expr::neg(inner),
                }
            }
            Expr::Binary { op, left, right } => {
                let l = self.reduce(left);
                let r = self.reduce(right);
                match (Self::concrete(&l), Self::concrete(&r)) {
                    (Some(lv), Some(rv)) => Self::lift(self.core.apply_binary(*op, lv, rv)),
                    _ => Expr::binary(*op, l, r),
                }
            }
            Expr::If {
                guard,
                then_branch,
                else_branch,
            } => {
                let g = self.reduce(guard);
                match Self::concrete(&g) {
                    Some(Value::Bool(true)) => self.reduce(then_branch),
                    Some(Value::Bool(false)) => self.reduce(else_branch),
                    Some(other) => Self::type_error("bool", other),
                    None => Expr::ite(g, self.reduce(then_branch), self.reduce(else_branch)),
                }
            }
            // Attribute access into a record is sound even when sibling
            // fields hold markers, so it folds on any literal receiver.
            Expr::GetAttr { expr, attr } => {
                let inner = self.reduce(expr);
                match &inner {
                    Expr::Value(v) => Self::lift(self.core.access(v, attr)),
                    _ => Expr::get_attr(inner, attr.clone()),
                }
            }
            Expr::HasAttr { expr, attr } => {
                let inner = self.reduce(expr);
                match &inner {
                    Expr::Value(v) => Self::lift(self.core.has_attr(v, attr)),
                    _ => Expr::has_attr(inner, attr.clone()),
                }
            }
            Expr::GetTag { expr, tag } => {
                let inner = self.reduce(expr);
                let key = self.reduce(tag);
                match (Self::concrete(&inner), Self::concrete(&key)) {
                    (Some(v), Some(k)) => Self::lift(self.core.get_tag(v, k)),
                    _ => Expr::get_tag(inner, key),
                }
            }
            Expr::HasTag { expr, tag } => {
                let inner = self.reduce(expr);
                let key = self.reduce(tag);
                match (Self::concrete(&inner), Self::concrete(&key)) {
                    (Some(v), Some(k)) => Self::lift(self.core.has_tag(v, k)),
                    _ => Expr::has_tag(inner, key),
                }
            }
            Expr::Like { expr, pattern } => {
                let inner = self.reduce(expr);
                match Self::concrete(&inner) {
                    Some(v) => match v.as_string() {
                        Some(s) => Expr::Value(Value::Bool(pattern.matches(s))),
                        None => Self::type_error("string", v),
                    },
                    None => Expr::like(inner, pattern.clone()),
                }
            }
            Expr::Is { expr, entity_type } => {
                let inner = self.reduce(expr);
                match Self::concrete(&inner) {
                    Some(v) => match v.as_entity() {
                        Some(uid) => Expr::Value(Value::Bool(uid.entity_type() == entity_type)),
                        None => Self::type_error("entity", v),
                    },
                    None => Expr::is_type(inner, entity_type.clone()),
                }
            }
            Expr::Set(elems) => {
                let reduced: Vec<Expr> = elems.iter().map(|e| self.reduce(e)).collect();
                if reduced.iter().all(|e| Self::concrete(e).is_some()) {
                    Expr::Value(Value::set(
                        reduced
                            .into_iter()
                            .map(|e| match e {
                                Expr::Value(v) => v,
                                _ => unreachable!("checked concrete"),
                            })
                            .collect(),
                    ))
                } else {
                    Expr::Set(reduced)
                }
            }
            Expr::Record(entries) => {
                let reduced: Vec<(String, Expr)> = entries
                    .iter()
                    .map(|(k, e)| (k.clone(), self.reduce(e)))
                    .collect();
                if reduced.iter().all(|(_, e)| Self::concrete(e).is_some()) {
                    Expr::Value(Value::record(reduced.into_iter().map(|(k, e)| match e {
                        Expr::Value(v) => (k, v),
                        _ => unreachable!("checked concrete"),
                    })))
                } else {
                    Expr::Record(reduced)
                }
            }
            Expr::ExtCall { function, args } => {
                if let Err(e) = Core::check_arity(*function, args.len()) {
                    return Expr::Error(e.to_string());
                }
                let reduced: Vec<Expr> = args.iter().map(|e| self.reduce(e)).collect();
                if reduced.iter().all(|e| Self::concrete(e).is_some()) {
                    let values: Vec<Value> = reduced
                        .into_iter()
                        .map(|e| match e {
                            Expr::Value(v) => v,
                            _ => unreachable!("checked concrete"),
                        })
                        .collect();
                    Self::lift(self.core.eval_ext(*function, &values))
                } else {
                    Expr::ExtCall {
                        function: *function,
                        args: reduced,
                    }
                }
            }
            Expr::IsEmpty(e) => {
                let inner = self.reduce(e);
                match Self::concrete(&inner) {
                    Some(v) => Self::lift(v.is_empty_set().map(Value::Bool)),
                    None => Expr::is_empty(inner),
                }
            }
        }
    }
}
