use super::expr::Expr;
use super::scope::{ActionScope, PrincipalScope, ResourceScope};
use kernel::{PolicyId, Position};
use std::fmt;

/// The effect of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Permit,
    Forbid,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permit => write!(f, "permit"),
            Self::Forbid => write!(f, "forbid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    When,
    Unless,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::When => write!(f, "when"),
            Self::Unless => write!(f, "unless"),
        }
    }
}

/// A `when { … }` or `unless { … }` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub body: Expr,
}

impl Condition {
    pub fn when(body: Expr) -> Self {
        Self {
            kind: ConditionKind::When,
            body,
        }
    }

    pub fn unless(body: Expr) -> Self {
        Self {
            kind: ConditionKind::Unless,
            body,
        }
    }
}

/// Policy annotations: an ordered name → value mapping.
///
/// Insertion order is preserved for rendering, but equality is by the
/// mapping, not the order.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    entries: Vec<(String, String)>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing an earlier value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Annotations {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(n, v)| other.get(n) == Some(v.as_str()))
    }
}

impl Eq for Annotations {}

impl FromIterator<(String, String)> for Annotations {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut out = Self::new();
        for (n, v) in iter {
            out.insert(n, v);
        }
        out
    }
}

/// The template a linked policy was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedFrom {
    pub template_id: PolicyId,
}

/// A permit or forbid rule: scope constraints on the three request axes
/// plus an ordered list of conditions.
///
/// Policies are conceptually pure: everything is fixed at construction,
/// nothing is mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    effect: Effect,
    principal: PrincipalScope,
    action: ActionScope,
    resource: ResourceScope,
    conditions: Vec<Condition>,
    annotations: Annotations,
    position: Position,
    linked_from: Option<LinkedFrom>,
}

impl Policy {
    pub fn new(
        effect: Effect,
        principal: PrincipalScope,
        action: ActionScope,
        resource: ResourceScope,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            effect,
            principal,
            action,
            resource,
            conditions,
            annotations: Annotations::new(),
            position: Position::default(),
            linked_from: None,
        }
    }

    /// `permit(principal, action, resource);` — the everything-matches
    /// permit, a convenient starting point for builders and tests.
    pub fn permit_all() -> Self {
        Self::new(
            Effect::Permit,
            PrincipalScope::All,
            ActionScope::All,
            ResourceScope::All,
            Vec::new(),
        )
    }

    pub fn forbid_all() -> Self {
        Self::new(
            Effect::Forbid,
            PrincipalScope::All,
            ActionScope::All,
            ResourceScope::All,
            Vec::new(),
        )
    }

    #[must_use]
    pub fn with_annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub fn with_linked_from(mut self, template_id: PolicyId) -> Self {
        self.linked_from = Some(LinkedFrom { template_id });
        self
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn principal(&self) -> &PrincipalScope {
        &self.principal
    }

    pub fn action(&self) -> &ActionScope {
        &self.action
    }

    pub fn resource(&self) -> &ResourceScope {
        &self.resource
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// The template this policy was linked from, if any.
    pub fn linked_from(&self) -> Option<&LinkedFrom> {
        self.linked_from.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::Var;
    use kernel::EntityUid;

    #[test]
    fn annotations_preserve_order_but_compare_as_a_map() {
        let mut a = Annotations::new();
        a.insert("id", "p1");
        a.insert("note", "x");

        let mut b = Annotations::new();
        b.insert("note", "x");
        b.insert("id", "p1");

        assert_eq!(a, b);
        assert_eq!(
            a.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            vec!["id", "note"]
        );

        b.insert("note", "y");
        assert_ne!(a, b);
    }

    #[test]
    fn annotation_insert_replaces_in_place() {
        let mut a = Annotations::new();
        a.insert("id", "p1");
        a.insert("note", "x");
        a.insert("id", "p2");
        assert_eq!(a.len(), 2);
        assert_eq!(a.get("id"), Some("p2"));
        assert_eq!(a.iter().next().map(|(n, _)| n), Some("id"));
    }

    #[test]
    fn policies_expose_their_construction_state() {
        let p = Policy::new(
            Effect::Forbid,
            PrincipalScope::Eq(EntityUid::new("User", "alice")),
            ActionScope::All,
            ResourceScope::Is("Doc".into()),
            vec![Condition::when(Expr::var(Var::Principal).into())],
        )
        .with_position(Position::new(2, 1));

        assert_eq!(p.effect(), Effect::Forbid);
        assert_eq!(
            p.principal(),
            &PrincipalScope::Eq(EntityUid::new("User", "alice"))
        );
        assert_eq!(p.conditions().len(), 1);
        assert_eq!(p.position(), Position::new(2, 1));
        assert!(p.linked_from().is_none());
    }
}
