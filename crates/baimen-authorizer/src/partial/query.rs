//! Query analyses built on the partial evaluator: which principals,
//! resources, or actions could a policy set allow?

use crate::authorizer::Decision;
use crate::partial::{PartialRequest, ResidualKind, partial_policy_set};
use baimen_policies::ast::policy::{Effect, Policy};
use baimen_policies::ast::scope::{ActionScope, PrincipalScope, ResourceScope};
use baimen_policies::set::PolicySet;
use kernel::{EntityStore, EntityUid, Value};
use std::collections::BTreeSet;

/// A residual scope constraint on the queried axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeConstraint {
    Eq(EntityUid),
    In(EntityUid),
    Is(String),
    IsIn(String, EntityUid),
    InSet(Vec<EntityUid>),
}

/// The outcome of a query analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// Allow when some value of the queried axis is definitely permitted.
    pub decision: Decision,
    /// True when no residual still depends on the queried variable (or a
    /// co-variable) in a way the analysis could not resolve.
    pub definite: bool,
    /// Concrete values of the queried axis extracted from `==` and set
    /// scope forms of variable permits.
    pub satisfying_values: BTreeSet<EntityUid>,
    /// True when a permit fires for every value of the queried axis.
    pub all: bool,
    /// Residual scope constraints that could not be turned into values.
    pub constraints: Vec<ScopeConstraint>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum QueryAxis {
    Principal,
    Action,
    Resource,
}

/// Which principals could be allowed to do `action` on `resource`?
pub fn query_principals(
    policies: &PolicySet,
    entities: &EntityStore,
    action: &EntityUid,
    resource: &EntityUid,
    context: &Value,
) -> QueryResult {
    let request = PartialRequest::new(
        None,
        Some(action.clone()),
        Some(resource.clone()),
        context.clone(),
    );
    run_query(policies, entities, &request, QueryAxis::Principal)
}

/// Which resources could `principal` act on with `action`?
pub fn query_resources(
    policies: &PolicySet,
    entities: &EntityStore,
    principal: &EntityUid,
    action: &EntityUid,
    context: &Value,
) -> QueryResult {
    let request = PartialRequest::new(
        Some(principal.clone()),
        Some(action.clone()),
        None,
        context.clone(),
    );
    run_query(policies, entities, &request, QueryAxis::Resource)
}

/// Which actions could `principal` perform on `resource`?
pub fn query_actions(
    policies: &PolicySet,
    entities: &EntityStore,
    principal: &EntityUid,
    resource: &EntityUid,
    context: &Value,
) -> QueryResult {
    let request = PartialRequest::new(
        Some(principal.clone()),
        None,
        Some(resource.clone()),
        context.clone(),
    );
    run_query(policies, entities, &request, QueryAxis::Action)
}

fn run_query(
    policies: &PolicySet,
    entities: &EntityStore,
    request: &PartialRequest,
    axis: QueryAxis,
) -> QueryResult {
    let residuals = partial_policy_set(policies, entities, request);

    let undecided_forbid = residuals.residuals().iter().any(|r| {
        r.effect == Effect::Forbid
            && matches!(r.kind, ResidualKind::Variable | ResidualKind::Error)
    });

    // A forbid that fires regardless of the unknown denies every value.
    if residuals
        .residuals()
        .iter()
        .any(|r| r.effect == Effect::Forbid && r.kind == ResidualKind::True)
    {
        return QueryResult {
            decision: Decision::Deny,
            definite: !undecided_forbid,
            satisfying_values: BTreeSet::new(),
            all: false,
            constraints: Vec::new(),
        };
    }

    let mut definite = !undecided_forbid;
    let mut all = false;
    let mut satisfying_values = BTreeSet::new();
    let mut constraints = Vec::new();

    for r in residuals.residuals() {
        if r.effect != Effect::Permit {
            continue;
        }
        match r.kind {
            ResidualKind::True => all = true,
            ResidualKind::Variable => {
                let Some(policy) = r.residual() else { continue };
                let resolved = extract_axis(policy, axis, &mut satisfying_values, &mut constraints);
                // Residual conditions, or a scope form without concrete
                // values, leave the permit unresolved.
                if !resolved || !policy.conditions().is_empty() {
                    definite = false;
                }
            }
            ResidualKind::False | ResidualKind::Error => {}
        }
    }

    let decision = if all || !satisfying_values.is_empty() {
        Decision::Allow
    } else {
        Decision::Deny
    };
    QueryResult {
        decision,
        definite,
        satisfying_values,
        all,
        constraints,
    }
}

/// Pulls values and constraints off the queried axis of one residual
/// permit. Returns whether the scope fully resolved into values.
fn extract_axis(
    policy: &Policy,
    axis: QueryAxis,
    values: &mut BTreeSet<EntityUid>,
    constraints: &mut Vec<ScopeConstraint>,
) -> bool {
    match axis {
        QueryAxis::Principal => match policy.principal() {
            PrincipalScope::All => true,
            PrincipalScope::Eq(uid) => {
                values.insert(uid.clone());
                constraints.push(ScopeConstraint::Eq(uid.clone()));
                true
            }
            PrincipalScope::In(uid) => {
                constraints.push(ScopeConstraint::In(uid.clone()));
                false
            }
            PrincipalScope::Is(ty) => {
                constraints.push(ScopeConstraint::Is(ty.clone()));
                false
            }
            PrincipalScope::IsIn(ty, uid) => {
                constraints.push(ScopeConstraint::IsIn(ty.clone(), uid.clone()));
                false
            }
            PrincipalScope::Slot(_) | PrincipalScope::IsSlot(_, _) => false,
        },
        QueryAxis::Resource => match policy.resource() {
            ResourceScope::All => true,
            ResourceScope::Eq(uid) => {
                values.insert(uid.clone());
                constraints.push(ScopeConstraint::Eq(uid.clone()));
                true
            }
            ResourceScope::In(uid) => {
                constraints.push(ScopeConstraint::In(uid.clone()));
                false
            }
            ResourceScope::Is(ty) => {
                constraints.push(ScopeConstraint::Is(ty.clone()));
                false
            }
            ResourceScope::IsIn(ty, uid) => {
                constraints.push(ScopeConstraint::IsIn(ty.clone(), uid.clone()));
                false
            }
            ResourceScope::Slot(_) | ResourceScope::IsSlot(_, _) => false,
        },
        QueryAxis::Action => match policy.action() {
            ActionScope::All => true,
            ActionScope::Eq(uid) => {
                values.insert(uid.clone());
                constraints.push(ScopeConstraint::Eq(uid.clone()));
                true
            }
            ActionScope::InSet(uids) => {
                values.extend(uids.iter().cloned());
                constraints.push(ScopeConstraint::InSet(uids.clone()));
                true
            }
            ActionScope::In(uid) => {
                constraints.push(ScopeConstraint::In(uid.clone()));
                false
            }
        },
    }
}
