use crate::domain::uid::EntityUid;
use crate::domain::value::Value;
use std::collections::{BTreeMap, HashSet};

/// An entity: a UID plus attributes, a parent set, and tags.
///
/// Entities are structurally immutable; the entity store replaces whole
/// entities on upsert. Attributes and tags are separate namespaces: `has`
/// and attribute access never see tags, and tag access never sees
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    uid: EntityUid,
    attributes: BTreeMap<String, Value>,
    parents: HashSet<EntityUid>,
    tags: BTreeMap<String, Value>,
}

impl Entity {
    /// Creates an entity with no attributes, parents, or tags.
    pub fn new(uid: EntityUid) -> Self {
        Self {
            uid,
            attributes: BTreeMap::new(),
            parents: HashSet::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_attributes(
        mut self,
        entries: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        self.attributes.extend(entries);
        self
    }

    pub fn with_parent(mut self, parent: EntityUid) -> Self {
        self.parents.insert(parent);
        self
    }

    pub fn with_parents(mut self, parents: impl IntoIterator<Item = EntityUid>) -> Self {
        self.parents.extend(parents);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    pub fn uid(&self) -> &EntityUid {
        &self.uid
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn parents(&self) -> &HashSet<EntityUid> {
        &self.parents
    }

    pub fn tags(&self) -> &BTreeMap<String, Value> {
        &self.tags
    }

    pub fn tag(&self, name: &str) -> Option<&Value> {
        self.tags.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_style_construction() {
        let group = EntityUid::new("Group", "admins");
        let alice = Entity::new(EntityUid::new("User", "alice"))
            .with_attribute("age", 30i64)
            .with_attribute("name", "Alice")
            .with_parent(group.clone())
            .with_tag("clearance", "secret");

        assert_eq!(alice.uid(), &EntityUid::new("User", "alice"));
        assert_eq!(alice.attribute("age"), Some(&Value::long(30)));
        assert!(alice.parents().contains(&group));
        assert_eq!(alice.tag("clearance"), Some(&Value::string("secret")));
    }

    #[test]
    fn attributes_and_tags_are_separate_namespaces() {
        let e = Entity::new(EntityUid::new("User", "a"))
            .with_attribute("k", 1i64)
            .with_tag("k", 2i64);
        assert_eq!(e.attribute("k"), Some(&Value::long(1)));
        assert_eq!(e.tag("k"), Some(&Value::long(2)));
    }
}
