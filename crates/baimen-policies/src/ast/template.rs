use super::policy::{Annotations, Condition, Effect, Policy};
use super::scope::{ActionScope, PrincipalScope, ResourceScope, SlotId};
use kernel::{EntityUid, PolicyId, Position};
use std::collections::HashMap;
use thiserror::Error;

/// Errors of the template lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template `{template_id}` uses slot `{slot}` but the binding does not supply it")]
    MissingSlot { template_id: PolicyId, slot: SlotId },

    #[error("link `{link_id}` already exists")]
    DuplicateLink { link_id: PolicyId },

    #[error("template `{template_id}` does not exist")]
    UnknownTemplate { template_id: PolicyId },
}

/// A policy with slots: its principal and/or resource scope may be a
/// `?principal` / `?resource` placeholder filled in at link time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    id: PolicyId,
    effect: Effect,
    principal: PrincipalScope,
    action: ActionScope,
    resource: ResourceScope,
    conditions: Vec<Condition>,
    annotations: Annotations,
    position: Position,
}

impl Template {
    pub fn new(
        id: PolicyId,
        effect: Effect,
        principal: PrincipalScope,
        action: ActionScope,
        resource: ResourceScope,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            id,
            effect,
            principal,
            action,
            resource,
            conditions,
            annotations: Annotations::new(),
            position: Position::default(),
        }
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

    pub fn id(&self) -> &PolicyId {
        &self.id
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

    /// The slots this template actually uses in its scopes.
    pub fn slots(&self) -> Vec<SlotId> {
        let mut out = Vec::new();
        if let Some(slot) = self.principal.slot() {
            out.push(slot);
        }
        if let Some(slot) = self.resource.slot() {
            out.push(slot);
        }
        out
    }

    /// Substitutes `bindings` into the slots, producing a concrete policy
    /// that remembers this template's id. Bindings for slots the template
    /// does not use are ignored.
    pub fn link(&self, bindings: &HashMap<SlotId, EntityUid>) -> Result<Policy, TemplateError> {
        let bound = |slot: SlotId| {
            bindings.get(&slot).cloned().ok_or(TemplateError::MissingSlot {
                template_id: self.id.clone(),
                slot,
            })
        };

        let principal = match &self.principal {
            PrincipalScope::Slot(slot) => PrincipalScope::Eq(bound(*slot)?),
            PrincipalScope::IsSlot(ty, slot) => PrincipalScope::IsIn(ty.clone(), bound(*slot)?),
            other => other.clone(),
        };
        let resource = match &self.resource {
            ResourceScope::Slot(slot) => ResourceScope::Eq(bound(*slot)?),
            ResourceScope::IsSlot(ty, slot) => ResourceScope::IsIn(ty.clone(), bound(*slot)?),
            other => other.clone(),
        };

        Ok(Policy::new(
            self.effect,
            principal,
            self.action.clone(),
            resource,
            self.conditions.clone(),
        )
        .with_annotations(self.annotations.clone())
        .with_position(self.position)
        .with_linked_from(self.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(principal: PrincipalScope, resource: ResourceScope) -> Template {
        Template::new(
            PolicyId::new("t0"),
            Effect::Permit,
            principal,
            ActionScope::All,
            resource,
            Vec::new(),
        )
    }

    #[test]
    fn slots_reports_only_used_slots() {
        let t = template(PrincipalScope::Slot(SlotId::Principal), ResourceScope::All);
        assert_eq!(t.slots(), vec![SlotId::Principal]);

        let t = template(
            PrincipalScope::Slot(SlotId::Principal),
            ResourceScope::IsSlot("Doc".into(), SlotId::Resource),
        );
        assert_eq!(t.slots(), vec![SlotId::Principal, SlotId::Resource]);
    }

    #[test]
    fn link_substitutes_eq_and_is_in() {
        let t = template(
            PrincipalScope::Slot(SlotId::Principal),
            ResourceScope::IsSlot("Doc".into(), SlotId::Resource),
        );
        let bindings = HashMap::from([
            (SlotId::Principal, EntityUid::new("User", "alice")),
            (SlotId::Resource, EntityUid::new("Folder", "f1")),
        ]);
        let p = t.link(&bindings).unwrap();
        assert_eq!(
            p.principal(),
            &PrincipalScope::Eq(EntityUid::new("User", "alice"))
        );
        assert_eq!(
            p.resource(),
            &ResourceScope::IsIn("Doc".into(), EntityUid::new("Folder", "f1"))
        );
        assert_eq!(
            p.linked_from().map(|l| l.template_id.clone()),
            Some(PolicyId::new("t0"))
        );
    }

    #[test]
    fn link_fails_on_any_missing_slot() {
        let t = template(
            PrincipalScope::Slot(SlotId::Principal),
            ResourceScope::Slot(SlotId::Resource),
        );
        let partial = HashMap::from([(SlotId::Principal, EntityUid::new("User", "alice"))]);
        assert_eq!(
            t.link(&partial),
            Err(TemplateError::MissingSlot {
                template_id: PolicyId::new("t0"),
                slot: SlotId::Resource
            })
        );
        assert!(t.link(&HashMap::new()).is_err());
    }

    #[test]
    fn link_ignores_bindings_for_unused_slots() {
        let t = template(PrincipalScope::Slot(SlotId::Principal), ResourceScope::All);
        let bindings = HashMap::from([
            (SlotId::Principal, EntityUid::new("User", "alice")),
            (SlotId::Resource, EntityUid::new("Doc", "ignored")),
        ]);
        let p = t.link(&bindings).unwrap();
        assert_eq!(p.resource(), &ResourceScope::All);
    }
}
