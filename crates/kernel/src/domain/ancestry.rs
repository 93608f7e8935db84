//! Transitive closure of the entity parent hierarchy.
//!
//! Built once per entity store and read-only afterwards, which makes `in`
//! checks O(1) set membership at request time. The build tolerates cycles
//! in the parent graph: a depth-first pass memoises what it can (back
//! edges contribute nothing), then a fixpoint pass widens every node until
//! the sets stop growing. Sets are finite and only grow, so the fixpoint
//! terminates.

use crate::domain::store::EntityStore;
use crate::domain::uid::EntityUid;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Precomputed ancestor sets for every entity in a store.
#[derive(Debug, Clone, Default)]
pub struct AncestryCache {
    ancestors: HashMap<EntityUid, HashSet<EntityUid>>,
}

impl AncestryCache {
    /// Builds the closure for `store`.
    pub fn build(store: &EntityStore) -> Self {
        let mut cache = Self {
            ancestors: HashMap::with_capacity(store.len()),
        };

        let mut visiting = HashSet::new();
        for uid in store.uids() {
            cache.collect(uid, store, &mut visiting);
        }

        // Nodes on a cycle saw truncated results during the DFS; widen
        // until stable. Each pass propagates ancestry one step further
        // around any cycle.
        let mut passes = 0usize;
        loop {
            passes += 1;
            let mut changed = false;
            for entity in store.all() {
                let mut widened = cache.ancestors[entity.uid()].clone();
                for parent in entity.parents() {
                    widened.insert(parent.clone());
                    if let Some(grand) = cache.ancestors.get(parent) {
                        widened.extend(grand.iter().cloned());
                    }
                }
                if widened.len() != cache.ancestors[entity.uid()].len() {
                    cache.ancestors.insert(entity.uid().clone(), widened);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        debug!(entities = store.len(), passes, "built ancestry closure");
        cache
    }

    /// Memoising post-order DFS. A node already on the recursion stack is
    /// a back edge and contributes an empty set to this call.
    fn collect(
        &mut self,
        uid: &EntityUid,
        store: &EntityStore,
        visiting: &mut HashSet<EntityUid>,
    ) -> HashSet<EntityUid> {
        if let Some(done) = self.ancestors.get(uid) {
            return done.clone();
        }
        if visiting.contains(uid) {
            return HashSet::new();
        }

        let Some(entity) = store.get(uid) else {
            return HashSet::new();
        };

        visiting.insert(uid.clone());
        let mut out = HashSet::new();
        for parent in entity.parents() {
            out.insert(parent.clone());
            out.extend(self.collect(parent, store, visiting));
        }
        visiting.remove(uid);

        self.ancestors.insert(uid.clone(), out.clone());
        out
    }

    /// All transitive ancestors of `uid`. Unknown entities have no
    /// ancestors; that is not an error.
    pub fn ancestors(&self, uid: &EntityUid) -> impl Iterator<Item = &EntityUid> {
        self.ancestors.get(uid).into_iter().flatten()
    }

    /// True when `ancestor` is `entity` itself or a transitive ancestor of
    /// it. Reflexivity matches the semantics of the `in` operator.
    pub fn is_ancestor(&self, entity: &EntityUid, ancestor: &EntityUid) -> bool {
        entity == ancestor
            || self
                .ancestors
                .get(entity)
                .is_some_and(|set| set.contains(ancestor))
    }

    /// True when any of `candidates` is `entity` or one of its ancestors.
    pub fn is_ancestor_of_any<'a>(
        &self,
        entity: &EntityUid,
        candidates: impl IntoIterator<Item = &'a EntityUid>,
    ) -> bool {
        let set = self.ancestors.get(entity);
        candidates
            .into_iter()
            .any(|c| c == entity || set.is_some_and(|s| s.contains(c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::Entity;

    fn uid(id: &str) -> EntityUid {
        EntityUid::new("E", id)
    }

    fn store(edges: &[(&str, &[&str])]) -> EntityStore {
        EntityStore::from_entities(edges.iter().map(|(id, parents)| {
            Entity::new(uid(id)).with_parents(parents.iter().map(|p| uid(p)))
        }))
    }

    #[test]
    #[tracing_test::traced_test]
    fn build_logs_the_closure_size() {
        AncestryCache::build(&store(&[("a", &["b"]), ("b", &[])]));
        assert!(logs_contain("built ancestry closure"));
    }

    #[test]
    fn direct_parents_are_ancestors() {
        let cache = AncestryCache::build(&store(&[("a", &["b"]), ("b", &[])]));
        assert!(cache.is_ancestor(&uid("a"), &uid("b")));
        assert!(!cache.is_ancestor(&uid("b"), &uid("a")));
    }

    #[test]
    fn membership_is_reflexive() {
        let cache = AncestryCache::build(&store(&[("a", &[])]));
        assert!(cache.is_ancestor(&uid("a"), &uid("a")));
        // Even for entities the store has never seen.
        assert!(cache.is_ancestor(&uid("ghost"), &uid("ghost")));
    }

    #[test]
    fn closure_is_transitive() {
        let cache = AncestryCache::build(&store(&[
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["d"]),
            ("d", &[]),
        ]));
        assert!(cache.is_ancestor(&uid("a"), &uid("d")));
        assert!(cache.is_ancestor(&uid("b"), &uid("d")));
        assert!(!cache.is_ancestor(&uid("d"), &uid("a")));
        assert_eq!(cache.ancestors(&uid("a")).count(), 3);
    }

    #[test]
    fn unknown_parent_is_still_an_ancestor() {
        // "b" is referenced but not in the store.
        let cache = AncestryCache::build(&store(&[("a", &["b"])]));
        assert!(cache.is_ancestor(&uid("a"), &uid("b")));
        assert_eq!(cache.ancestors(&uid("b")).count(), 0);
    }

    #[test]
    fn two_node_cycle_terminates_and_closes() {
        let cache = AncestryCache::build(&store(&[("a", &["b"]), ("b", &["a"])]));
        assert!(cache.is_ancestor(&uid("a"), &uid("b")));
        assert!(cache.is_ancestor(&uid("b"), &uid("a")));
        // On a cycle every node reaches itself through the loop too.
        assert!(cache.is_ancestor(&uid("a"), &uid("a")));
    }

    #[test]
    fn long_cycle_with_tail_reaches_everything() {
        let cache = AncestryCache::build(&store(&[
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["d"]),
            ("d", &["b"]), // cycle b -> c -> d -> b
            ("e", &["a"]),
        ]));
        for target in ["a", "b", "c", "d"] {
            assert!(
                cache.is_ancestor(&uid("e"), &uid(target)),
                "e should reach {target}"
            );
        }
        assert!(!cache.is_ancestor(&uid("b"), &uid("a")));
    }

    #[test]
    fn self_loop_is_tolerated() {
        let cache = AncestryCache::build(&store(&[("a", &["a", "b"]), ("b", &[])]));
        assert!(cache.is_ancestor(&uid("a"), &uid("a")));
        assert!(cache.is_ancestor(&uid("a"), &uid("b")));
    }

    #[test]
    fn ancestor_of_any_uses_the_whole_candidate_set() {
        let cache = AncestryCache::build(&store(&[("a", &["b"]), ("b", &[]), ("x", &[])]));
        let b = uid("b");
        let x = uid("x");
        assert!(cache.is_ancestor_of_any(&uid("a"), [&x, &b]));
        assert!(!cache.is_ancestor_of_any(&uid("a"), [&x]));
        let a = uid("a");
        assert!(cache.is_ancestor_of_any(&uid("a"), [&a]));
        assert!(!cache.is_ancestor_of_any(&uid("a"), std::iter::empty::<&EntityUid>()));
    }
}
