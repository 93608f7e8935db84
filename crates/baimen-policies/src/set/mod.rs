//! The policy set: an immutable snapshot behind an atomically swapped
//! pointer.
//!
//! Reads load the published snapshot once and then work on an immutable
//! structure; a write publishing a new snapshot mid-read has no effect on
//! the read. Writes are serialised by a writer lock, copy the policy map,
//! and publish a fresh snapshot. The scope index is built lazily, at most
//! once per snapshot.

mod index;

use crate::ast::policy::Policy;
use crate::json::{PolicyJsonError, policy_from_json, policy_to_json};
use index::ScopeIndex;
use kernel::{EntityUid, PolicyId};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use tracing::{debug, info};

struct Snapshot {
    policies: HashMap<PolicyId, Arc<Policy>>,
    index: OnceLock<ScopeIndex>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            policies: HashMap::new(),
            index: OnceLock::new(),
        }
    }

    fn with_policies(policies: HashMap<PolicyId, Arc<Policy>>) -> Self {
        Self {
            policies,
            index: OnceLock::new(),
        }
    }

    fn index(&self) -> &ScopeIndex {
        self.index.get_or_init(|| ScopeIndex::build(&self.policies))
    }
}

/// A set of policies keyed by id, safe for concurrent use.
pub struct PolicySet {
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty())),
            writer: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn publish(&self, snapshot: Snapshot) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(snapshot);
    }

    /// Inserts `policy` under `id`. Returns false, leaving the existing
    /// policy in place, when the id is already taken.
    pub fn add(&self, id: PolicyId, policy: Policy) -> bool {
        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let current = self.snapshot();
        if current.policies.contains_key(&id) {
            return false;
        }
        let mut policies = current.policies.clone();
        policies.insert(id.clone(), Arc::new(policy));
        self.publish(Snapshot::with_policies(policies));
        debug!(policy_id = %id, "added policy");
        true
    }

    /// Removes the policy at `id`, returning whether it existed.
    pub fn remove(&self, id: &PolicyId) -> bool {
        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let current = self.snapshot();
        if !current.policies.contains_key(id) {
            return false;
        }
        let mut policies = current.policies.clone();
        policies.remove(id);
        self.publish(Snapshot::with_policies(policies));
        debug!(policy_id = %id, "removed policy");
        true
    }

    pub fn get(&self, id: &PolicyId) -> Option<Arc<Policy>> {
        self.snapshot().policies.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().policies.is_empty()
    }

    /// Copies the current snapshot's map.
    #[deprecated(note = "iterate with `all()` instead of copying the map")]
    pub fn map(&self) -> HashMap<PolicyId, Arc<Policy>> {
        self.snapshot().policies.clone()
    }

    /// Iterates every policy of the snapshot current at call time.
    /// Writes performed after this call are invisible to the iterator.
    pub fn all(&self) -> PolicyIter {
        let snapshot = self.snapshot();
        let ids: Vec<PolicyId> = snapshot.policies.keys().cloned().collect();
        PolicyIter {
            snapshot,
            ids: ids.into_iter(),
        }
    }

    /// Iterates the policies whose scopes index-match the request triple,
    /// using the snapshot's scope index (built on first use).
    pub fn for_request(
        &self,
        principal: &EntityUid,
        action: &EntityUid,
        resource: &EntityUid,
    ) -> PolicyIter {
        let snapshot = self.snapshot();
        let ids = snapshot.index().candidates(principal, action, resource);
        PolicyIter {
            snapshot,
            ids: ids.into_iter(),
        }
    }

    /// Forces the current snapshot's index to be built now instead of on
    /// the first `for_request`. Safe to call from any number of threads.
    pub fn build_index(&self) {
        self.snapshot().index();
    }

    /// Marshals the snapshot as `{"policies": {id: policy}}`.
    pub fn to_json(&self) -> Json {
        let snapshot = self.snapshot();
        let mut policies = Map::new();
        let mut ids: Vec<&PolicyId> = snapshot.policies.keys().collect();
        ids.sort();
        for id in ids {
            policies.insert(
                id.as_str().to_string(),
                policy_to_json(&snapshot.policies[id]),
            );
        }
        let mut obj = Map::new();
        obj.insert("policies".into(), Json::Object(policies));
        Json::Object(obj)
    }

    /// Builds a set from the `to_json` form.
    pub fn from_json(json: &Json) -> Result<Self, PolicyJsonError> {
        let set = Self::new();
        set.load_json(json)?;
        Ok(set)
    }

    /// Replaces the whole content with the policies of the `to_json`
    /// form; one write, one new snapshot. Returns how many were loaded.
    pub fn load_json(&self, json: &Json) -> Result<usize, PolicyJsonError> {
        let policies_json = json
            .get("policies")
            .and_then(Json::as_object)
            .ok_or_else(|| PolicyJsonError::Invalid {
                reason: "policy set JSON needs a `policies` object".into(),
            })?;

        let mut policies = HashMap::with_capacity(policies_json.len());
        for (id, policy) in policies_json {
            policies.insert(PolicyId::new(id.clone()), Arc::new(policy_from_json(policy)?));
        }

        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let count = policies.len();
        self.publish(Snapshot::with_policies(policies));
        info!(count, "loaded policy set from JSON");
        Ok(count)
    }
}

impl Default for PolicySet {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over `(id, policy)` pairs of one snapshot.
pub struct PolicyIter {
    snapshot: Arc<Snapshot>,
    ids: std::vec::IntoIter<PolicyId>,
}

impl Iterator for PolicyIter {
    type Item = (PolicyId, Arc<Policy>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        let policy = self.snapshot.policies[&id].clone();
        Some((id, policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::policy::Effect;
    use crate::ast::scope::{ActionScope, PrincipalScope, ResourceScope};

    fn scoped(principal: &str, action: &str) -> Policy {
        Policy::new(
            Effect::Permit,
            PrincipalScope::Eq(EntityUid::new("User", principal)),
            ActionScope::Eq(EntityUid::new("Action", action)),
            ResourceScope::All,
            Vec::new(),
        )
    }

    #[test]
    fn add_is_insert_if_absent() {
        let set = PolicySet::new();
        assert!(set.add(PolicyId::new("p"), Policy::permit_all()));
        assert!(!set.add(PolicyId::new("p"), Policy::forbid_all()));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&PolicyId::new("p")).unwrap().effect(), Effect::Permit);
    }

    #[test]
    fn remove_reports_existence() {
        let set = PolicySet::new();
        set.add(PolicyId::new("p"), Policy::permit_all());
        assert!(set.remove(&PolicyId::new("p")));
        assert!(!set.remove(&PolicyId::new("p")));
        assert!(set.is_empty());
    }

    #[test]
    fn iterators_capture_the_snapshot_at_call_time() {
        let set = PolicySet::new();
        for id in ["a", "b", "c"] {
            set.add(PolicyId::new(id), Policy::permit_all());
        }

        let iter = set.all();
        set.add(PolicyId::new("d"), Policy::permit_all());
        set.remove(&PolicyId::new("a"));

        let mut seen: Vec<String> = iter.map(|(id, _)| id.into_inner()).collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(set.len(), 3); // b, c, d
    }

    #[test]
    fn for_request_uses_the_index() {
        let set = PolicySet::new();
        set.add(PolicyId::new("read"), scoped("alice", "read"));
        set.add(PolicyId::new("write"), scoped("alice", "write"));
        set.add(PolicyId::new("any"), Policy::permit_all());

        let hits: Vec<String> = set
            .for_request(
                &EntityUid::new("User", "alice"),
                &EntityUid::new("Action", "read"),
                &EntityUid::new("Doc", "d"),
            )
            .map(|(id, _)| id.into_inner())
            .collect();
        let mut hits = hits;
        hits.sort();
        assert_eq!(hits, vec!["any", "read"]);
    }

    #[test]
    fn index_survives_only_within_its_snapshot() {
        let set = PolicySet::new();
        set.add(PolicyId::new("p"), scoped("alice", "read"));
        set.build_index();

        // A write invalidates nothing for readers of the old snapshot but
        // the new snapshot gets its own, freshly built index.
        set.add(PolicyId::new("q"), scoped("alice", "read"));
        let hits = set
            .for_request(
                &EntityUid::new("User", "alice"),
                &EntityUid::new("Action", "read"),
                &EntityUid::new("Doc", "d"),
            )
            .count();
        assert_eq!(hits, 2);
    }

    #[test]
    fn json_roundtrip_preserves_behaviour() {
        let set = PolicySet::new();
        set.add(PolicyId::new("read"), scoped("alice", "read"));
        set.add(PolicyId::new("any"), Policy::permit_all());

        let copy = PolicySet::from_json(&set.to_json()).unwrap();
        assert_eq!(copy.len(), 2);
        let hits = copy
            .for_request(
                &EntityUid::new("User", "alice"),
                &EntityUid::new("Action", "read"),
                &EntityUid::new("Doc", "d"),
            )
            .count();
        assert_eq!(hits, 2);
    }

    #[test]
    #[tracing_test::traced_test]
    fn load_json_logs_the_policy_count() {
        let set = PolicySet::new();
        set.add(PolicyId::new("p"), Policy::permit_all());
        PolicySet::from_json(&set.to_json()).unwrap();
        assert!(logs_contain("loaded policy set from JSON"));
    }

    #[test]
    fn load_json_replaces_everything() {
        let set = PolicySet::new();
        set.add(PolicyId::new("stale"), Policy::permit_all());

        let other = PolicySet::new();
        other.add(PolicyId::new("fresh"), Policy::forbid_all());
        let loaded = set.load_json(&other.to_json()).unwrap();
        assert_eq!(loaded, 1);
        assert!(set.get(&PolicyId::new("stale")).is_none());
        assert!(set.get(&PolicyId::new("fresh")).is_some());
    }
}
