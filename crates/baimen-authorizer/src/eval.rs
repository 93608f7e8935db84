//! The expression evaluator: a tree walk over `Value`s.
//!
//! `&&`, `||` and `if-then-else` never touch their unevaluated operands,
//! so a branch that would have errored causes no error when skipped.
//! Entities absent from the store behave as if they existed with empty
//! attributes, empty tags and no ancestors.

use crate::request::Request;
use baimen_policies::ast::expr::{BinaryOp, Expr, ExtFn, Var};
use baimen_policies::ast::policy::{ConditionKind, Policy};
use baimen_policies::ast::scope::{ActionScope, PrincipalScope, ResourceScope};
use kernel::{
    AncestryCache, Datetime, Decimal, Duration, EntityStore, EntityUid, EvaluationError, Value,
};

/// The environment-independent half of evaluation: value operations that
/// only need the entity store and the ancestry cache. Shared between
/// strict and partial evaluation.
pub(crate) struct Core<'a> {
    pub entities: &'a EntityStore,
    pub ancestry: &'a AncestryCache,
}

impl Core<'_> {
    pub(crate) fn apply_binary(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
    ) -> Result<Value, EvaluationError> {
        match op {
            BinaryOp::Eq => Ok(Value::Bool(left == right)),
            BinaryOp::NotEq => Ok(Value::Bool(left != right)),
            BinaryOp::Less => left.less_than(right).map(Value::Bool),
            BinaryOp::LessEq => left.less_than_or_equal(right).map(Value::Bool),
            BinaryOp::Greater => right.less_than(left).map(Value::Bool),
            BinaryOp::GreaterEq => right.less_than_or_equal(left).map(Value::Bool),
            BinaryOp::Add => left.checked_add(right),
            BinaryOp::Sub => left.checked_sub(right),
            BinaryOp::Mul => left.checked_mul(right),
            BinaryOp::In => self.eval_in(left, right),
            BinaryOp::Contains => left.contains(right).map(Value::Bool),
            BinaryOp::ContainsAll => left.contains_all(right).map(Value::Bool),
            BinaryOp::ContainsAny => left.contains_any(right).map(Value::Bool),
        }
    }

    fn eval_in(&self, left: &Value, right: &Value) -> Result<Value, EvaluationError> {
        let entity = left
            .as_entity()
            .ok_or_else(|| EvaluationError::type_error("entity", left.type_name()))?;
        match right {
            Value::EntityRef(ancestor) => {
                Ok(Value::Bool(self.ancestry.is_ancestor(entity, ancestor)))
            }
            Value::Set(items) => {
                let candidates: Vec<&EntityUid> = items
                    .iter()
                    .map(|v| {
                        v.as_entity()
                            .ok_or_else(|| EvaluationError::type_error("entity", v.type_name()))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(Value::Bool(self.ancestry.is_ancestor_of_any(entity, candidates)))
            }
            other => Err(EvaluationError::type_error(
                "entity or set of entities",
                other.type_name(),
            )),
        }
    }

    /// Attribute access on a record or entity. A UID the store has never
    /// seen reads as an entity with no attributes.
    pub(crate) fn access(&self, value: &Value, attr: &str) -> Result<Value, EvaluationError> {
        match value {
            Value::Record(map) => map.get(attr).cloned().ok_or_else(|| {
                EvaluationError::AttributeDoesNotExist {
                    attribute: attr.to_string(),
                }
            }),
            Value::EntityRef(uid) => self
                .entities
                .get(uid)
                .and_then(|e| e.attribute(attr).cloned())
                .ok_or_else(|| EvaluationError::AttributeDoesNotExist {
                    attribute: attr.to_string(),
                }),
            other => Err(EvaluationError::type_error(
                "record or entity",
                other.type_name(),
            )),
        }
    }

    pub(crate) fn has_attr(&self, value: &Value, attr: &str) -> Result<Value, EvaluationError> {
        match value {
            Value::Record(map) => Ok(Value::Bool(map.contains_key(attr))),
            Value::EntityRef(uid) => Ok(Value::Bool(
                self.entities
                    .get(uid)
                    .is_some_and(|e| e.attribute(attr).is_some()),
            )),
            other => Err(EvaluationError::type_error(
                "record or entity",
                other.type_name(),
            )),
        }
    }

    pub(crate) fn get_tag(&self, value: &Value, tag: &Value) -> Result<Value, EvaluationError> {
        let (uid, key) = self.tag_operands(value, tag)?;
        self.entities
            .get(uid)
            .and_then(|e| e.tag(key).cloned())
            .ok_or_else(|| EvaluationError::TagDoesNotExist {
                tag: key.to_string(),
            })
    }

    pub(crate) fn has_tag(&self, value: &Value, tag: &Value) -> Result<Value, EvaluationError> {
        let (uid, key) = self.tag_operands(value, tag)?;
        Ok(Value::Bool(
            self.entities.get(uid).is_some_and(|e| e.tag(key).is_some()),
        ))
    }

    fn tag_operands<'v>(
        &self,
        value: &'v Value,
        tag: &'v Value,
    ) -> Result<(&'v EntityUid, &'v str), EvaluationError> {
        let uid = value
            .as_entity()
            .ok_or_else(|| EvaluationError::type_error("entity", value.type_name()))?;
        let key = tag
            .as_string()
            .ok_or_else(|| EvaluationError::type_error("string", tag.type_name()))?;
        Ok((uid, key))
    }

    pub(crate) fn check_arity(function: ExtFn, got: usize) -> Result<(), EvaluationError> {
        let expected = function.arity();
        if got == expected {
            Ok(())
        } else {
            Err(EvaluationError::Arity {
                function: function.name(),
                expected,
                got,
            })
        }
    }

    /// Dispatches an extension constructor or method over already
    /// evaluated arguments (arity already checked).
    pub(crate) fn eval_ext(
        &self,
        function: ExtFn,
        args: &[Value],
    ) -> Result<Value, EvaluationError> {
        let string_arg = |v: &Value| {
            v.as_string()
                .map(str::to_string)
                .ok_or_else(|| EvaluationError::type_error("string", v.type_name()))
        };
        let decimal_arg = |v: &Value| {
            v.as_decimal()
                .ok_or_else(|| EvaluationError::type_error("decimal", v.type_name()))
        };
        let ip_arg = |v: &Value| {
            v.as_ipaddr()
                .cloned()
                .ok_or_else(|| EvaluationError::type_error("ipaddr", v.type_name()))
        };
        let datetime_arg = |v: &Value| {
            v.as_datetime()
                .ok_or_else(|| EvaluationError::type_error("datetime", v.type_name()))
        };
        let duration_arg = |v: &Value| {
            v.as_duration()
                .ok_or_else(|| EvaluationError::type_error("duration", v.type_name()))
        };

        Ok(match function {
            ExtFn::Decimal => Decimal::parse(&string_arg(&args[0])?)?.into(),
            ExtFn::Ip => kernel::IpAddr::parse(&string_arg(&args[0])?)?.into(),
            ExtFn::Datetime => Datetime::parse(&string_arg(&args[0])?)?.into(),
            ExtFn::Duration => Duration::parse(&string_arg(&args[0])?)?.into(),

            ExtFn::LessThan => {
                Value::Bool(decimal_arg(&args[0])?.less_than(decimal_arg(&args[1])?))
            }
            ExtFn::LessThanOrEqual => {
                Value::Bool(decimal_arg(&args[0])?.less_than_or_equal(decimal_arg(&args[1])?))
            }
            ExtFn::GreaterThan => {
                Value::Bool(decimal_arg(&args[0])?.greater_than(decimal_arg(&args[1])?))
            }
            ExtFn::GreaterThanOrEqual => {
                Value::Bool(decimal_arg(&args[0])?.greater_than_or_equal(decimal_arg(&args[1])?))
            }

            ExtFn::IsIpv4 => Value::Bool(ip_arg(&args[0])?.is_ipv4()),
            ExtFn::IsIpv6 => Value::Bool(ip_arg(&args[0])?.is_ipv6()),
            ExtFn::IsLoopback => Value::Bool(ip_arg(&args[0])?.is_loopback()),
            ExtFn::IsMulticast => Value::Bool(ip_arg(&args[0])?.is_multicast()),
            ExtFn::IsInRange => {
                Value::Bool(ip_arg(&args[0])?.is_in_range(&ip_arg(&args[1])?))
            }

            ExtFn::Offset => datetime_arg(&args[0])?
                .offset(duration_arg(&args[1])?)
                .map(Value::from)
                .ok_or(EvaluationError::overflow("offset"))?,
            ExtFn::DurationSince => datetime_arg(&args[0])?
                .duration_since(datetime_arg(&args[1])?)
                .map(Value::from)
                .ok_or(EvaluationError::overflow("durationSince"))?,
            ExtFn::ToDate => datetime_arg(&args[0])?.to_date().into(),
            ExtFn::ToTime => datetime_arg(&args[0])?.to_time().into(),

            ExtFn::ToDays => Value::Long(duration_arg(&args[0])?.to_days()),
            ExtFn::ToHours => Value::Long(duration_arg(&args[0])?.to_hours()),
            ExtFn::ToMinutes => Value::Long(duration_arg(&args[0])?.to_minutes()),
            ExtFn::ToSeconds => Value::Long(duration_arg(&args[0])?.to_seconds()),
            ExtFn::ToMilliseconds => Value::Long(duration_arg(&args[0])?.to_milliseconds()),
        })
    }
}

/// Evaluates expressions and policies against one concrete request.
pub struct Evaluator<'a> {
    request: &'a Request,
    core: Core<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(request: &'a Request, entities: &'a EntityStore, ancestry: &'a AncestryCache) -> Self {
        Self {
            request,
            core: Core { entities, ancestry },
        }
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Value(v) => Ok(v.clone()),
            Expr::Var(Var::Principal) => Ok(Value::entity(self.request.principal().clone())),
            Expr::Var(Var::Action) => Ok(Value::entity(self.request.action().clone())),
            Expr::Var(Var::Resource) => Ok(Value::entity(self.request.resource().clone())),
            Expr::Var(Var::Context) => Ok(self.request.context().clone()),

            // Residual-only nodes have no strict value.
            Expr::Unknown(_) => Err(EvaluationError::type_error("a concrete value", "unknown")),
            Expr::Error(_) => Err(EvaluationError::type_error("a concrete value", "error")),

            Expr::And(a, b) => {
                let left = self.boolean(a)?;
                if !left {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.boolean(b)?))
            }
            Expr::Or(a, b) => {
                let left = self.boolean(a)?;
                if left {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.boolean(b)?))
            }
            Expr::Not(e) => self.evaluate(e)?.not(),
            Expr::Neg(e) => self.evaluate(e)?.checked_neg(),
            Expr::Binary { op, left, right } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                self.core.apply_binary(*op, &l, &r)
            }
            Expr::If {
                guard,
                then_branch,
                else_branch,
            } => {
                if self.boolean(guard)? {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
            Expr::GetAttr { expr, attr } => {
                let v = self.evaluate(expr)?;
                self.core.access(&v, attr)
            }
            Expr::HasAttr { expr, attr } => {
                let v = self.evaluate(expr)?;
                self.core.has_attr(&v, attr)
            }
            Expr::GetTag { expr, tag } => {
                let v = self.evaluate(expr)?;
                let k = self.evaluate(tag)?;
                self.core.get_tag(&v, &k)
            }
            Expr::HasTag { expr, tag } => {
                let v = self.evaluate(expr)?;
                let k = self.evaluate(tag)?;
                self.core.has_tag(&v, &k)
            }
            Expr::Like { expr, pattern } => {
                let v = self.evaluate(expr)?;
                let s = v
                    .as_string()
                    .ok_or_else(|| EvaluationError::type_error("string", v.type_name()))?;
                Ok(Value::Bool(pattern.matches(s)))
            }
            Expr::Is { expr, entity_type } => {
                let v = self.evaluate(expr)?;
                let uid = v
                    .as_entity()
                    .ok_or_else(|| EvaluationError::type_error("entity", v.type_name()))?;
                Ok(Value::Bool(uid.entity_type() == entity_type))
            }
            Expr::Set(elems) => {
                let values = elems
                    .iter()
                    .map(|e| self.evaluate(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::set(values))
            }
            Expr::Record(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, e) in entries {
                    out.push((k.clone(), self.evaluate(e)?));
                }
                Ok(Value::record(out))
            }
            Expr::ExtCall { function, args } => {
                Core::check_arity(*function, args.len())?;
                let values = args
                    .iter()
                    .map(|e| self.evaluate(e))
                    .collect::<Result<Vec<_>, _>>()?;
                self.core.eval_ext(*function, &values)
            }
            Expr::IsEmpty(e) => self.evaluate(e)?.is_empty_set().map(Value::Bool),
        }
    }

    fn boolean(&self, expr: &Expr) -> Result<bool, EvaluationError> {
        let v = self.evaluate(expr)?;
        v.as_bool()
            .ok_or_else(|| EvaluationError::type_error("bool", v.type_name()))
    }

    /// Evaluates scopes then conditions, in order. A failing scope or
    /// condition short-circuits to false; an error aborts the policy.
    pub fn evaluate_policy(&self, policy: &Policy) -> Result<bool, EvaluationError> {
        if !self.principal_matches(policy.principal())? {
            return Ok(false);
        }
        if !self.action_matches(policy.action())? {
            return Ok(false);
        }
        if !self.resource_matches(policy.resource())? {
            return Ok(false);
        }
        for condition in policy.conditions() {
            let passed = match condition.kind {
                ConditionKind::When => self.boolean(&condition.body)?,
                ConditionKind::Unless => !self.boolean(&condition.body)?,
            };
            if !passed {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn principal_matches(&self, scope: &PrincipalScope) -> Result<bool, EvaluationError> {
        principal_scope_matches(self.request.principal(), scope, self.core.ancestry)
    }

    pub fn action_matches(&self, scope: &ActionScope) -> Result<bool, EvaluationError> {
        action_scope_matches(self.request.action(), scope, self.core.ancestry)
    }

    pub fn resource_matches(&self, scope: &ResourceScope) -> Result<bool, EvaluationError> {
        resource_scope_matches(self.request.resource(), scope, self.core.ancestry)
    }
}

/// Whether `principal` satisfies the scope, given the hierarchy.
pub fn principal_scope_matches(
    principal: &EntityUid,
    scope: &PrincipalScope,
    ancestry: &AncestryCache,
) -> Result<bool, EvaluationError> {
    Ok(match scope {
        PrincipalScope::All => true,
        PrincipalScope::Eq(uid) => principal == uid,
        PrincipalScope::In(uid) => ancestry.is_ancestor(principal, uid),
        PrincipalScope::Is(ty) => principal.entity_type() == ty,
        PrincipalScope::IsIn(ty, uid) => {
            principal.entity_type() == ty && ancestry.is_ancestor(principal, uid)
        }
        PrincipalScope::Slot(_) | PrincipalScope::IsSlot(_, _) => {
            return Err(EvaluationError::type_error(
                "a linked scope",
                "template slot",
            ));
        }
    })
}

pub fn action_scope_matches(
    action: &EntityUid,
    scope: &ActionScope,
    ancestry: &AncestryCache,
) -> Result<bool, EvaluationError> {
    Ok(match scope {
        ActionScope::All => true,
        ActionScope::Eq(uid) => action == uid,
        ActionScope::In(uid) => ancestry.is_ancestor(action, uid),
        ActionScope::InSet(uids) => ancestry.is_ancestor_of_any(action, uids),
    })
}

pub fn resource_scope_matches(
    resource: &EntityUid,
    scope: &ResourceScope,
    ancestry: &AncestryCache,
) -> Result<bool, EvaluationError> {
    Ok(match scope {
        ResourceScope::All => true,
        ResourceScope::Eq(uid) => resource == uid,
        ResourceScope::In(uid) => ancestry.is_ancestor(resource, uid),
        ResourceScope::Is(ty) => resource.entity_type() == ty,
        ResourceScope::IsIn(ty, uid) => {
            resource.entity_type() == ty && ancestry.is_ancestor(resource, uid)
        }
        ResourceScope::Slot(_) | ResourceScope::IsSlot(_, _) => {
            return Err(EvaluationError::type_error(
                "a linked scope",
                "template slot",
            ));
        }
    })
}
