//! The Baimen authorizer: evaluates Cedar-style policies against requests.
//!
//! Given a [`baimen_policies::PolicySet`], a [`kernel::EntityStore`] and a
//! [`Request`], the [`Authorizer`] returns Allow or Deny with a diagnostic
//! naming the determining policies and any that errored. The [`partial`]
//! module evaluates under unknown inputs and powers the query API.
//!
//! ```
//! use baimen_authorizer::{Authorizer, Decision, Request};
//! use baimen_policies::{Policy, PolicySet};
//! use kernel::{EntityStore, EntityUid, PolicyId};
//!
//! let policies = PolicySet::new();
//! policies.add(PolicyId::new("open-door"), Policy::permit_all());
//!
//! let request = Request::new(
//!     EntityUid::new("User", "alice"),
//!     EntityUid::new("Action", "read"),
//!     EntityUid::new("Doc", "d1"),
//! );
//! let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &request);
//! assert_eq!(response.decision, Decision::Allow);
//! ```

pub mod authorizer;
pub mod eval;
pub mod partial;
pub mod request;

pub use authorizer::{Authorizer, Decision, Diagnostics, Response};
pub use eval::Evaluator;
pub use partial::{
    PartialRequest, QueryResult, ResidualKind, ResidualPolicy, ResidualSet, ScopeConstraint,
    partial_policy, partial_policy_set, query_actions, query_principals, query_resources,
};
pub use request::Request;
