//! The template registry: templates, their links, and the concrete
//! policies derived from those links.

use crate::ast::scope::SlotId;
use crate::ast::template::{Template, TemplateError};
use crate::ast::policy::Policy;
use kernel::{EntityUid, PolicyId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registered link: which template it came from, the bindings used, and
/// the policy the substitution produced.
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub template_id: PolicyId,
    pub bindings: HashMap<SlotId, EntityUid>,
    policy: Arc<Policy>,
}

impl LinkRecord {
    pub fn policy(&self) -> &Arc<Policy> {
        &self.policy
    }
}

/// Holds templates and the links derived from them. Removing a template
/// removes its links in the same call, so callers never observe a link
/// whose template is gone.
#[derive(Debug, Default)]
pub struct TemplateSet {
    templates: HashMap<PolicyId, Arc<Template>>,
    links: HashMap<PolicyId, LinkRecord>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template under its own id. Returns false, leaving the
    /// existing template untouched, when the id is already taken.
    pub fn add_template(&mut self, template: Template) -> bool {
        let id = template.id().clone();
        if self.templates.contains_key(&id) {
            return false;
        }
        self.templates.insert(id, Arc::new(template));
        true
    }

    /// Removes a template and every link derived from it, returning the
    /// ids of the removed links, or `None` when the template is unknown.
    pub fn remove_template(&mut self, template_id: &PolicyId) -> Option<Vec<PolicyId>> {
        self.templates.remove(template_id)?;
        let dropped: Vec<PolicyId> = self
            .links
            .iter()
            .filter(|(_, record)| &record.template_id == template_id)
            .map(|(link_id, _)| link_id.clone())
            .collect();
        for link_id in &dropped {
            self.links.remove(link_id);
        }
        debug!(template_id = %template_id, links = dropped.len(), "removed template");
        Some(dropped)
    }

    /// Links `template_id` under the new id `link_id` with `bindings`,
    /// returning the produced policy.
    pub fn link(
        &mut self,
        template_id: &PolicyId,
        link_id: PolicyId,
        bindings: HashMap<SlotId, EntityUid>,
    ) -> Result<Arc<Policy>, TemplateError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| TemplateError::UnknownTemplate {
                template_id: template_id.clone(),
            })?;
        if self.links.contains_key(&link_id) {
            return Err(TemplateError::DuplicateLink { link_id });
        }

        let policy = Arc::new(template.link(&bindings)?);
        self.links.insert(
            link_id.clone(),
            LinkRecord {
                template_id: template_id.clone(),
                bindings,
                policy: policy.clone(),
            },
        );
        debug!(template_id = %template_id, link_id = %link_id, "linked template");
        Ok(policy)
    }

    /// Removes a single link, returning whether it existed.
    pub fn remove_link(&mut self, link_id: &PolicyId) -> bool {
        self.links.remove(link_id).is_some()
    }

    pub fn get_template(&self, template_id: &PolicyId) -> Option<&Arc<Template>> {
        self.templates.get(template_id)
    }

    pub fn get_link(&self, link_id: &PolicyId) -> Option<&LinkRecord> {
        self.links.get(link_id)
    }

    /// The concrete policy a link produced.
    pub fn get_linked(&self, link_id: &PolicyId) -> Option<&Arc<Policy>> {
        self.links.get(link_id).map(|record| &record.policy)
    }

    pub fn templates(&self) -> impl Iterator<Item = (&PolicyId, &Arc<Template>)> {
        self.templates.iter()
    }

    pub fn links(&self) -> impl Iterator<Item = (&PolicyId, &LinkRecord)> {
        self.links.iter()
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::policy::Effect;
    use crate::ast::scope::{ActionScope, PrincipalScope, ResourceScope};

    fn slotted_template(id: &str) -> Template {
        Template::new(
            PolicyId::new(id),
            Effect::Permit,
            PrincipalScope::Slot(SlotId::Principal),
            ActionScope::All,
            ResourceScope::All,
            Vec::new(),
        )
    }

    fn bind(principal: &str) -> HashMap<SlotId, EntityUid> {
        HashMap::from([(SlotId::Principal, EntityUid::new("User", principal))])
    }

    #[test]
    fn add_template_is_insert_if_absent() {
        let mut set = TemplateSet::new();
        assert!(set.add_template(slotted_template("t")));
        assert!(!set.add_template(slotted_template("t")));
        assert_eq!(set.template_count(), 1);
    }

    #[test]
    fn link_produces_a_policy_that_remembers_its_template() {
        let mut set = TemplateSet::new();
        set.add_template(slotted_template("t"));
        let policy = set
            .link(&PolicyId::new("t"), PolicyId::new("l1"), bind("alice"))
            .unwrap();
        assert_eq!(
            policy.principal(),
            &PrincipalScope::Eq(EntityUid::new("User", "alice"))
        );
        assert_eq!(
            policy.linked_from().map(|l| l.template_id.clone()),
            Some(PolicyId::new("t"))
        );
        assert_eq!(set.get_linked(&PolicyId::new("l1")), Some(&policy));
    }

    #[test]
    fn duplicate_link_ids_are_rejected() {
        let mut set = TemplateSet::new();
        set.add_template(slotted_template("t"));
        set.link(&PolicyId::new("t"), PolicyId::new("l"), bind("alice"))
            .unwrap();
        let err = set
            .link(&PolicyId::new("t"), PolicyId::new("l"), bind("bob"))
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::DuplicateLink {
                link_id: PolicyId::new("l")
            }
        );
        // The first link is untouched.
        assert_eq!(
            set.get_link(&PolicyId::new("l")).unwrap().bindings[&SlotId::Principal],
            EntityUid::new("User", "alice")
        );
    }

    #[test]
    fn linking_an_unknown_template_fails() {
        let mut set = TemplateSet::new();
        let err = set
            .link(&PolicyId::new("ghost"), PolicyId::new("l"), bind("alice"))
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownTemplate {
                template_id: PolicyId::new("ghost")
            }
        );
    }

    #[test]
    fn missing_bindings_surface_the_slot() {
        let mut set = TemplateSet::new();
        set.add_template(slotted_template("t"));
        let err = set
            .link(&PolicyId::new("t"), PolicyId::new("l"), HashMap::new())
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingSlot {
                template_id: PolicyId::new("t"),
                slot: SlotId::Principal
            }
        );
        assert_eq!(set.link_count(), 0);
    }

    #[test]
    fn removing_a_template_cascades_to_its_links() {
        let mut set = TemplateSet::new();
        set.add_template(slotted_template("t"));
        set.add_template(slotted_template("other"));
        set.link(&PolicyId::new("t"), PolicyId::new("l1"), bind("alice"))
            .unwrap();
        set.link(&PolicyId::new("t"), PolicyId::new("l2"), bind("bob"))
            .unwrap();
        set.link(&PolicyId::new("other"), PolicyId::new("l3"), bind("carol"))
            .unwrap();

        let mut dropped = set.remove_template(&PolicyId::new("t")).unwrap();
        dropped.sort();
        assert_eq!(dropped, vec![PolicyId::new("l1"), PolicyId::new("l2")]);
        assert_eq!(set.link_count(), 1);
        assert!(set.get_linked(&PolicyId::new("l3")).is_some());
        assert!(set.remove_template(&PolicyId::new("t")).is_none());
    }

    #[test]
    fn remove_link_reports_existence() {
        let mut set = TemplateSet::new();
        set.add_template(slotted_template("t"));
        set.link(&PolicyId::new("t"), PolicyId::new("l"), bind("alice"))
            .unwrap();
        assert!(set.remove_link(&PolicyId::new("l")));
        assert!(!set.remove_link(&PolicyId::new("l")));
        // The template itself stays.
        assert_eq!(set.template_count(), 1);
    }
}
