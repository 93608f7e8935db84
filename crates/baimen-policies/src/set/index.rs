//! The three-way scope index of a snapshot.
//!
//! Policies are bucketed by what their scopes can be decided on without
//! evaluating anything: the exact action UID, the principal type and the
//! resource type. `in` scopes are hierarchy-dependent, so they index as
//! wildcards; the over-approximation only ever adds candidates, never
//! loses one.

use crate::ast::policy::Policy;
use crate::ast::scope::{ActionScope, PrincipalScope, ResourceScope};
use kernel::{EntityUid, PolicyId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub(crate) struct ScopeIndex {
    action_exact: HashMap<EntityUid, HashSet<PolicyId>>,
    action_wildcard: HashSet<PolicyId>,
    principal_type: HashMap<String, HashSet<PolicyId>>,
    principal_wildcard: HashSet<PolicyId>,
    resource_type: HashMap<String, HashSet<PolicyId>>,
    resource_wildcard: HashSet<PolicyId>,
}

impl ScopeIndex {
    pub(crate) fn build(policies: &HashMap<PolicyId, Arc<Policy>>) -> Self {
        let mut index = Self::default();
        for (id, policy) in policies {
            match policy.action() {
                ActionScope::Eq(uid) => {
                    index
                        .action_exact
                        .entry(uid.clone())
                        .or_default()
                        .insert(id.clone());
                }
                ActionScope::InSet(uids) => {
                    for uid in uids {
                        index
                            .action_exact
                            .entry(uid.clone())
                            .or_default()
                            .insert(id.clone());
                    }
                }
                ActionScope::All | ActionScope::In(_) => {
                    index.action_wildcard.insert(id.clone());
                }
            }

            match policy.principal() {
                PrincipalScope::Eq(uid) => {
                    index
                        .principal_type
                        .entry(uid.entity_type().to_string())
                        .or_default()
                        .insert(id.clone());
                }
                PrincipalScope::Is(ty) | PrincipalScope::IsIn(ty, _) => {
                    index
                        .principal_type
                        .entry(ty.clone())
                        .or_default()
                        .insert(id.clone());
                }
                // Slot forms only occur in unlinked templates; classify
                // them as wildcards rather than dropping them.
                PrincipalScope::All
                | PrincipalScope::In(_)
                | PrincipalScope::Slot(_)
                | PrincipalScope::IsSlot(_, _) => {
                    index.principal_wildcard.insert(id.clone());
                }
            }

            match policy.resource() {
                ResourceScope::Eq(uid) => {
                    index
                        .resource_type
                        .entry(uid.entity_type().to_string())
                        .or_default()
                        .insert(id.clone());
                }
                ResourceScope::Is(ty) | ResourceScope::IsIn(ty, _) => {
                    index
                        .resource_type
                        .entry(ty.clone())
                        .or_default()
                        .insert(id.clone());
                }
                ResourceScope::All
                | ResourceScope::In(_)
                | ResourceScope::Slot(_)
                | ResourceScope::IsSlot(_, _) => {
                    index.resource_wildcard.insert(id.clone());
                }
            }
        }
        debug!(
            policies = policies.len(),
            action_buckets = index.action_exact.len(),
            principal_buckets = index.principal_type.len(),
            resource_buckets = index.resource_type.len(),
            "built scope index"
        );
        index
    }

    /// The ids whose scopes index-match the request, i.e. the intersection
    /// of the three per-axis candidate sources. Iterates the smallest
    /// source and membership-tests the other two.
    pub(crate) fn candidates(
        &self,
        principal: &EntityUid,
        action: &EntityUid,
        resource: &EntityUid,
    ) -> Vec<PolicyId> {
        let sources = [
            Source {
                exact: self.action_exact.get(action),
                wildcard: &self.action_wildcard,
            },
            Source {
                exact: self.principal_type.get(principal.entity_type()),
                wildcard: &self.principal_wildcard,
            },
            Source {
                exact: self.resource_type.get(resource.entity_type()),
                wildcard: &self.resource_wildcard,
            },
        ];

        let driver = sources
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.len())
            .map(|(i, _)| i)
            .expect("three sources");

        sources[driver]
            .iter()
            .filter(|id| {
                sources
                    .iter()
                    .enumerate()
                    .all(|(i, s)| i == driver || s.contains(id))
            })
            .cloned()
            .collect()
    }
}

/// One axis' candidate source: its exact bucket plus its wildcard set.
struct Source<'a> {
    exact: Option<&'a HashSet<PolicyId>>,
    wildcard: &'a HashSet<PolicyId>,
}

impl Source<'_> {
    fn len(&self) -> usize {
        self.exact.map_or(0, HashSet::len) + self.wildcard.len()
    }

    fn contains(&self, id: &PolicyId) -> bool {
        self.wildcard.contains(id) || self.exact.is_some_and(|s| s.contains(id))
    }

    fn iter(&self) -> impl Iterator<Item = &PolicyId> {
        self.exact.into_iter().flatten().chain(self.wildcard.iter())
    }
}
