//! The decision combiner: forbid overrides permit, absence denies.

use crate::eval::Evaluator;
use crate::request::Request;
use baimen_policies::ast::policy::{Effect, Policy};
use baimen_policies::set::PolicySet;
use kernel::{AncestryCache, EntityStore, PolicyError, PolicyId};
use std::sync::Arc;
use tracing::{debug, info};

/// The outcome of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// Why the decision came out the way it did.
///
/// `reasons` holds the ids of the policies that determined the decision,
/// sorted by id for deterministic output (a convenience, not a contract).
/// `errors` holds one entry per policy whose evaluation errored; those
/// policies never fire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    reasons: Vec<PolicyId>,
    errors: Vec<PolicyError>,
}

impl Diagnostics {
    pub fn reasons(&self) -> &[PolicyId] {
        &self.reasons
    }

    pub fn errors(&self) -> &[PolicyError] {
        &self.errors
    }
}

/// A decision plus its diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub decision: Decision,
    pub diagnostics: Diagnostics,
}

impl Response {
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Evaluates requests against a policy set and an entity store.
///
/// The authorizer is stateless; share one freely across threads.
#[derive(Debug, Default)]
pub struct Authorizer {}

impl Authorizer {
    pub fn new() -> Self {
        Self {}
    }

    /// Decides `request`, building the ancestry cache for `entities` on
    /// the fly. Use [`Authorizer::is_authorized_with_cache`] to reuse a
    /// prebuilt cache across requests against the same store.
    #[tracing::instrument(skip_all, fields(
        principal = %request.principal(),
        action = %request.action(),
        resource = %request.resource(),
    ))]
    pub fn is_authorized(
        &self,
        policies: &PolicySet,
        entities: &EntityStore,
        request: &Request,
    ) -> Response {
        let ancestry = AncestryCache::build(entities);
        self.is_authorized_with_cache(policies, entities, &ancestry, request)
    }

    /// Evaluates under a request with unknown inputs, returning the
    /// residual classification of every policy instead of a decision.
    pub fn is_authorized_partial(
        &self,
        policies: &PolicySet,
        entities: &EntityStore,
        request: &crate::partial::PartialRequest,
    ) -> crate::partial::ResidualSet {
        crate::partial::partial_policy_set(policies, entities, request)
    }

    pub fn is_authorized_with_cache(
        &self,
        policies: &PolicySet,
        entities: &EntityStore,
        ancestry: &AncestryCache,
        request: &Request,
    ) -> Response {
        let evaluator = Evaluator::new(request, entities, ancestry);

        let mut forbids: Vec<(PolicyId, Arc<Policy>)> = Vec::new();
        let mut permits: Vec<(PolicyId, Arc<Policy>)> = Vec::new();
        for (id, policy) in
            policies.for_request(request.principal(), request.action(), request.resource())
        {
            match policy.effect() {
                Effect::Forbid => forbids.push((id, policy)),
                Effect::Permit => permits.push((id, policy)),
            }
        }
        debug!(
            forbids = forbids.len(),
            permits = permits.len(),
            "selected candidate policies"
        );

        let mut diagnostics = Diagnostics::default();

        // A forbid that holds denies outright; a forbid that errors is
        // surfaced but treated as not firing.
        for (id, policy) in &forbids {
            match evaluator.evaluate_policy(policy) {
                Ok(true) => diagnostics.reasons.push(id.clone()),
                Ok(false) => {}
                Err(error) => diagnostics
                    .errors
                    .push(PolicyError::new(id.clone(), policy.position(), error)),
            }
        }
        if !diagnostics.reasons.is_empty() {
            diagnostics.reasons.sort();
            info!(decision = %Decision::Deny, forbids = diagnostics.reasons.len(), "request denied");
            return Response {
                decision: Decision::Deny,
                diagnostics,
            };
        }

        for (id, policy) in &permits {
            match evaluator.evaluate_policy(policy) {
                Ok(true) => diagnostics.reasons.push(id.clone()),
                Ok(false) => {}
                Err(error) => diagnostics
                    .errors
                    .push(PolicyError::new(id.clone(), policy.position(), error)),
            }
        }
        diagnostics.reasons.sort();

        let decision = if diagnostics.reasons.is_empty() {
            // No permit held: implicit deny, with no determining policies.
            Decision::Deny
        } else {
            Decision::Allow
        };
        info!(decision = %decision, reasons = diagnostics.reasons.len(), "request decided");
        Response {
            decision,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baimen_policies::ast::expr::Expr;
    use baimen_policies::ast::policy::Condition;
    use baimen_policies::ast::scope::{ActionScope, PrincipalScope, ResourceScope};
    use kernel::{Entity, EntityUid};

    fn uid(ty: &str, id: &str) -> EntityUid {
        EntityUid::new(ty, id)
    }

    fn read_request() -> Request {
        Request::new(uid("User", "alice"), uid("Action", "read"), uid("Doc", "d1"))
    }

    fn reasons(response: &Response) -> Vec<&str> {
        response
            .diagnostics
            .reasons()
            .iter()
            .map(PolicyId::as_str)
            .collect()
    }

    #[test]
    fn simple_allow() {
        let policies = PolicySet::new();
        policies.add(
            PolicyId::new("p"),
            Policy::new(
                Effect::Permit,
                PrincipalScope::Eq(uid("User", "alice")),
                ActionScope::Eq(uid("Action", "read")),
                ResourceScope::Eq(uid("Doc", "d1")),
                Vec::new(),
            ),
        );
        let response =
            Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_request());
        assert_eq!(response.decision, Decision::Allow);
        assert_eq!(reasons(&response), vec!["p"]);
        assert!(response.diagnostics.errors().is_empty());
    }

    #[test]
    fn forbid_overrides_permit() {
        let policies = PolicySet::new();
        policies.add(PolicyId::new("p"), Policy::permit_all());
        policies.add(
            PolicyId::new("f"),
            Policy::new(
                Effect::Forbid,
                PrincipalScope::Eq(uid("User", "alice")),
                ActionScope::All,
                ResourceScope::All,
                Vec::new(),
            ),
        );
        let response =
            Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_request());
        assert_eq!(response.decision, Decision::Deny);
        assert_eq!(reasons(&response), vec!["f"]);
    }

    #[test]
    fn hierarchy_scope_allows_through_the_parent() {
        let policies = PolicySet::new();
        policies.add(
            PolicyId::new("p"),
            Policy::new(
                Effect::Permit,
                PrincipalScope::In(uid("Group", "admins")),
                ActionScope::Eq(uid("Action", "read")),
                ResourceScope::All,
                Vec::new(),
            ),
        );
        let entities = EntityStore::from_entities([
            Entity::new(uid("User", "alice")).with_parent(uid("Group", "admins")),
        ]);
        let response = Authorizer::new().is_authorized(&policies, &entities, &read_request());
        assert_eq!(response.decision, Decision::Allow);
        assert_eq!(reasons(&response), vec!["p"]);
    }

    #[test]
    fn erroring_permit_means_implicit_deny() {
        let policies = PolicySet::new();
        policies.add(
            PolicyId::new("p"),
            Policy::new(
                Effect::Permit,
                PrincipalScope::All,
                ActionScope::All,
                ResourceScope::All,
                vec![Condition::when(Expr::eq(
                    Expr::add(Expr::val(1i64), Expr::val("two")),
                    Expr::val(3i64),
                ))],
            ),
        );
        let response =
            Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_request());
        assert_eq!(response.decision, Decision::Deny);
        assert!(reasons(&response).is_empty());
        let errors = response.diagnostics.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].policy_id, PolicyId::new("p"));
        assert!(errors[0].to_string().contains("type"));
    }

    #[test]
    fn erroring_forbid_does_not_deny_by_itself() {
        let policies = PolicySet::new();
        policies.add(PolicyId::new("p"), Policy::permit_all());
        policies.add(
            PolicyId::new("f"),
            Policy::new(
                Effect::Forbid,
                PrincipalScope::All,
                ActionScope::All,
                ResourceScope::All,
                vec![Condition::when(Expr::add(Expr::val(1i64), Expr::val("x")))],
            ),
        );
        let response =
            Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_request());
        assert_eq!(response.decision, Decision::Allow);
        assert_eq!(reasons(&response), vec!["p"]);
        assert_eq!(response.diagnostics.errors().len(), 1);
        assert_eq!(response.diagnostics.errors()[0].policy_id, PolicyId::new("f"));
    }

    #[test]
    fn empty_set_denies_implicitly() {
        let response = Authorizer::new().is_authorized(
            &PolicySet::new(),
            &EntityStore::new(),
            &read_request(),
        );
        assert_eq!(response.decision, Decision::Deny);
        assert!(reasons(&response).is_empty());
        assert!(response.diagnostics.errors().is_empty());
    }

    #[test]
    fn multiple_true_permits_all_appear_in_reasons() {
        let policies = PolicySet::new();
        policies.add(PolicyId::new("b"), Policy::permit_all());
        policies.add(PolicyId::new("a"), Policy::permit_all());
        let response =
            Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_request());
        assert_eq!(response.decision, Decision::Allow);
        assert_eq!(reasons(&response), vec!["a", "b"]);
    }
}
