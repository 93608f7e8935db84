//! Partial evaluation: deciding what can be decided while some request
//! inputs are still unknown.
//!
//! Unknown inputs are variable markers (UIDs of a reserved type) placed
//! where the principal, action, resource, or any context value would go.
//! Each policy reduces to a residual and a classification: `True` (fires
//! for every concretization), `False` (eliminated), `Variable` (depends
//! on a marker), or `Error` (evaluation errored).

mod query;
mod reduce;

pub use query::{QueryResult, ScopeConstraint, query_actions, query_principals, query_resources};

use crate::authorizer::Decision;
use crate::eval::{action_scope_matches, principal_scope_matches, resource_scope_matches};
use baimen_policies::ast::expr::Expr;
use baimen_policies::ast::policy::{Condition, Effect, Policy};
use baimen_policies::ast::scope::{ActionScope, PrincipalScope, ResourceScope};
use baimen_policies::set::PolicySet;
use kernel::{AncestryCache, EntityStore, EntityUid, PolicyId, Value};
use reduce::PartialEvaluator;
use std::collections::BTreeSet;
use tracing::debug;

/// A request whose axes may be unknown. `None` axes become variable
/// markers named after the axis; the context may carry markers anywhere
/// inside its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRequest {
    principal: EntityUid,
    action: EntityUid,
    resource: EntityUid,
    context: Value,
}

impl PartialRequest {
    pub fn new(
        principal: Option<EntityUid>,
        action: Option<EntityUid>,
        resource: Option<EntityUid>,
        context: Value,
    ) -> Self {
        Self {
            principal: principal.unwrap_or_else(|| EntityUid::variable("principal")),
            action: action.unwrap_or_else(|| EntityUid::variable("action")),
            resource: resource.unwrap_or_else(|| EntityUid::variable("resource")),
            context,
        }
    }

    pub fn principal(&self) -> &EntityUid {
        &self.principal
    }

    pub fn action(&self) -> &EntityUid {
        &self.action
    }

    pub fn resource(&self) -> &EntityUid {
        &self.resource
    }

    pub fn context(&self) -> &Value {
        &self.context
    }
}

/// Classification of a policy after partial evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualKind {
    /// Scopes and conditions all reduced to true: fires regardless of the
    /// unknowns.
    True,
    /// Some scope or condition reduced to false: eliminated.
    False,
    /// Depends on at least one unknown.
    Variable,
    /// Evaluation errored somewhere in the policy.
    Error,
}

/// One policy's partial-evaluation outcome.
#[derive(Debug, Clone)]
pub struct ResidualPolicy {
    pub id: PolicyId,
    pub effect: Effect,
    pub kind: ResidualKind,
    residual: Option<Policy>,
    variables: BTreeSet<String>,
}

impl ResidualPolicy {
    /// The reduced policy, absent when the policy was eliminated or its
    /// scope evaluation errored.
    pub fn residual(&self) -> Option<&Policy> {
        self.residual.as_ref()
    }

    /// Names of the unknowns this policy still depends on.
    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }
}

/// The partial-evaluation outcome for a whole policy set.
#[derive(Debug, Clone, Default)]
pub struct ResidualSet {
    residuals: Vec<ResidualPolicy>,
}

impl ResidualSet {
    pub fn residuals(&self) -> &[ResidualPolicy] {
        &self.residuals
    }

    pub fn get(&self, id: &PolicyId) -> Option<&ResidualPolicy> {
        self.residuals.iter().find(|r| &r.id == id)
    }

    fn has(&self, effect: Effect, kind: ResidualKind) -> bool {
        self.residuals
            .iter()
            .any(|r| r.effect == effect && r.kind == kind)
    }

    fn has_undecided_forbid(&self) -> bool {
        self.has(Effect::Forbid, ResidualKind::Variable) || self.has(Effect::Forbid, ResidualKind::Error)
    }

    /// Whether the decision is already settled for every concretization
    /// of the unknowns: either a forbid is definitely firing, or a permit
    /// definitely fires and no forbid could still intervene. An erroring
    /// forbid blocks deciding but never denies by itself.
    pub fn must_decide(&self) -> bool {
        if self.has(Effect::Forbid, ResidualKind::True) {
            return true;
        }
        self.has(Effect::Permit, ResidualKind::True) && !self.has_undecided_forbid()
    }

    /// The settled decision; meaningful only when [`Self::must_decide`].
    pub fn decision(&self) -> Decision {
        if self.has(Effect::Forbid, ResidualKind::True) {
            return Decision::Deny;
        }
        if self.has(Effect::Permit, ResidualKind::True) && !self.has_undecided_forbid() {
            return Decision::Allow;
        }
        Decision::Deny
    }

    /// The policies that could still determine the decision under some
    /// concretization of the unknowns: everything classified `True` or
    /// `Variable`.
    pub fn may_be_determining(&self) -> impl Iterator<Item = &ResidualPolicy> {
        self.residuals
            .iter()
            .filter(|r| matches!(r.kind, ResidualKind::True | ResidualKind::Variable))
    }

    /// The policies that errored regardless of the unknowns.
    pub fn definitely_errored(&self) -> impl Iterator<Item = &ResidualPolicy> {
        self.residuals
            .iter()
            .filter(|r| r.kind == ResidualKind::Error)
    }
}

/// Reduces one policy under the partial request. Returns the residual (if
/// any) and whether the policy is kept (everything but `False`).
pub fn partial_policy(
    entities: &EntityStore,
    request: &PartialRequest,
    policy: &Policy,
) -> (Option<Policy>, bool) {
    let ancestry = AncestryCache::build(entities);
    let (kind, residual, _) = classify_policy(request, entities, &ancestry, policy);
    (residual, kind != ResidualKind::False)
}

/// Partially evaluates every policy in the set.
pub fn partial_policy_set(
    policies: &PolicySet,
    entities: &EntityStore,
    request: &PartialRequest,
) -> ResidualSet {
    let ancestry = AncestryCache::build(entities);
    let mut residuals = Vec::new();
    for (id, policy) in policies.all() {
        let (kind, residual, variables) = classify_policy(request, entities, &ancestry, &policy);
        residuals.push(ResidualPolicy {
            id,
            effect: policy.effect(),
            kind,
            residual,
            variables,
        });
    }
    debug!(policies = residuals.len(), "partially evaluated policy set");
    ResidualSet { residuals }
}

fn classify_policy(
    request: &PartialRequest,
    entities: &EntityStore,
    ancestry: &AncestryCache,
    policy: &Policy,
) -> (ResidualKind, Option<Policy>, BTreeSet<String>) {
    let mut variables = BTreeSet::new();
    let mut errored = false;

    // Scopes: a variable axis preserves its scope verbatim; a concrete
    // axis either reduces the scope to All or eliminates the policy.
    let principal = if let Some(name) = request.principal().variable_name() {
        match policy.principal() {
            PrincipalScope::All => PrincipalScope::All,
            scope => {
                variables.insert(name.to_string());
                scope.clone()
            }
        }
    } else {
        match principal_scope_matches(request.principal(), policy.principal(), ancestry) {
            Ok(true) => PrincipalScope::All,
            Ok(false) => return (ResidualKind::False, None, variables),
            Err(_) => return (ResidualKind::Error, None, variables),
        }
    };

    let action = if let Some(name) = request.action().variable_name() {
        match policy.action() {
            ActionScope::All => ActionScope::All,
            scope => {
                variables.insert(name.to_string());
                scope.clone()
            }
        }
    } else {
        match action_scope_matches(request.action(), policy.action(), ancestry) {
            Ok(true) => ActionScope::All,
            Ok(false) => return (ResidualKind::False, None, variables),
            Err(_) => return (ResidualKind::Error, None, variables),
        }
    };

    let resource = if let Some(name) = request.resource().variable_name() {
        match policy.resource() {
            ResourceScope::All => ResourceScope::All,
            scope => {
                variables.insert(name.to_string());
                scope.clone()
            }
        }
    } else {
        match resource_scope_matches(request.resource(), policy.resource(), ancestry) {
            Ok(true) => ResourceScope::All,
            Ok(false) => return (ResidualKind::False, None, variables),
            Err(_) => return (ResidualKind::Error, None, variables),
        }
    };

    // Conditions: concrete ones pass (and are dropped) or eliminate the
    // policy; the rest survive, reduced.
    let evaluator = PartialEvaluator::new(request, entities, ancestry);
    let mut conditions: Vec<Condition> = Vec::new();
    for condition in policy.conditions() {
        let body = evaluator.reduce(&condition.body);
        match PartialEvaluator::concrete(&body).and_then(Value::as_bool) {
            Some(value) => {
                let passed = match condition.kind {
                    baimen_policies::ast::policy::ConditionKind::When => value,
                    baimen_policies::ast::policy::ConditionKind::Unless => !value,
                };
                if !passed {
                    // Strict evaluation runs conditions in order, so a
                    // false condition after a captured error is never
                    // reached; only the error-free prefix can eliminate.
                    if !errored {
                        return (ResidualKind::False, None, variables);
                    }
                    conditions.push(Condition {
                        kind: condition.kind,
                        body: Expr::Value(Value::Bool(value)),
                    });
                }
            }
            None => {
                if let Some(other) = PartialEvaluator::concrete(&body) {
                    // A concrete non-bool condition is a type error.
                    errored = true;
                    conditions.push(Condition {
                        kind: condition.kind,
                        body: Expr::Error(
                            kernel::EvaluationError::type_error("bool", other.type_name())
                                .to_string(),
                        ),
                    });
                } else {
                    if body.contains_error() {
                        errored = true;
                    }
                    body.collect_unknowns(&mut variables);
                    conditions.push(Condition {
                        kind: condition.kind,
                        body,
                    });
                }
            }
        }
    }

    let scope_constrained = !matches!(principal, PrincipalScope::All)
        || !matches!(action, ActionScope::All)
        || !matches!(resource, ResourceScope::All);

    let residual = Policy::new(policy.effect(), principal, action, resource, conditions)
        .with_annotations(policy.annotations().clone())
        .with_position(policy.position());

    let kind = if errored {
        ResidualKind::Error
    } else if scope_constrained || !residual.conditions().is_empty() || !variables.is_empty() {
        ResidualKind::Variable
    } else {
        ResidualKind::True
    };
    (kind, Some(residual), variables)
}
