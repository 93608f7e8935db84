//! End-to-end authorization scenarios: policies plus entities plus a
//! request, checked against the decision and diagnostics they must yield.

use baimen_authorizer::{Authorizer, Decision, Request, Response};
use baimen_policies::ast::expr::{Expr, Var};
use baimen_policies::ast::policy::{Condition, Effect, Policy};
use baimen_policies::ast::scope::{ActionScope, PrincipalScope, ResourceScope, SlotId};
use baimen_policies::set::PolicySet;
use baimen_policies::template_set::TemplateSet;
use baimen_policies::ast::template::Template;
use kernel::json::entities_from_json;
use kernel::{Entity, EntityStore, EntityUid, PolicyId, Value};
use std::collections::HashMap;

fn uid(ty: &str, id: &str) -> EntityUid {
    EntityUid::new(ty, id)
}

fn read_d1(principal: &str) -> Request {
    Request::new(uid("User", principal), uid("Action", "read"), uid("Doc", "d1"))
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

    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_d1("alice"));
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

    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_d1("alice"));
    assert_eq!(response.decision, Decision::Deny);
    assert_eq!(reasons(&response), vec!["f"]);

    // A principal the forbid does not name sails through.
    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_d1("bob"));
    assert_eq!(response.decision, Decision::Allow);
    assert_eq!(reasons(&response), vec!["p"]);
}

#[test]
fn hierarchy_membership_allows() {
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

    let response = Authorizer::new().is_authorized(&policies, &entities, &read_d1("alice"));
    assert_eq!(response.decision, Decision::Allow);
    assert_eq!(reasons(&response), vec!["p"]);

    let response = Authorizer::new().is_authorized(&policies, &entities, &read_d1("bob"));
    assert_eq!(response.decision, Decision::Deny);
}

#[test]
fn type_error_in_permit_is_an_implicit_deny_with_diagnostics() {
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

    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_d1("alice"));
    assert_eq!(response.decision, Decision::Deny);
    assert!(reasons(&response).is_empty());
    let errors = response.diagnostics.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].policy_id.as_str(), "p");
    assert!(errors[0].to_string().contains("type"));
}

#[test]
fn context_conditions_flow_through() {
    let policies = PolicySet::new();
    policies.add(
        PolicyId::new("mfa-required"),
        Policy::new(
            Effect::Permit,
            PrincipalScope::All,
            ActionScope::All,
            ResourceScope::All,
            vec![Condition::when(Expr::get_attr(Expr::var(Var::Context), "mfa"))],
        ),
    );

    let with_mfa = read_d1("alice")
        .with_context(Value::record([("mfa".to_string(), Value::bool(true))]));
    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &with_mfa);
    assert_eq!(response.decision, Decision::Allow);

    let without_mfa = read_d1("alice")
        .with_context(Value::record([("mfa".to_string(), Value::bool(false))]));
    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &without_mfa);
    assert_eq!(response.decision, Decision::Deny);

    // Missing context attribute is an evaluation error, not a panic.
    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_d1("alice"));
    assert_eq!(response.decision, Decision::Deny);
    assert_eq!(response.diagnostics.errors().len(), 1);
}

#[test]
fn unknown_entities_read_as_empty() {
    let policies = PolicySet::new();
    // `has` on an unknown entity is false, so the unless-guard passes.
    policies.add(
        PolicyId::new("p"),
        Policy::new(
            Effect::Permit,
            PrincipalScope::All,
            ActionScope::All,
            ResourceScope::All,
            vec![Condition::unless(Expr::has_attr(
                Expr::var(Var::Principal),
                "banned",
            ))],
        ),
    );

    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_d1("ghost"));
    assert_eq!(response.decision, Decision::Allow);
    assert!(response.diagnostics.errors().is_empty());
}

#[test]
fn linked_template_policies_participate() {
    let mut templates = TemplateSet::new();
    templates.add_template(Template::new(
        PolicyId::new("grant-read"),
        Effect::Permit,
        PrincipalScope::Slot(SlotId::Principal),
        ActionScope::Eq(uid("Action", "read")),
        ResourceScope::Slot(SlotId::Resource),
        Vec::new(),
    ));
    let linked = templates
        .link(
            &PolicyId::new("grant-read"),
            PolicyId::new("grant-read-alice-d1"),
            HashMap::from([
                (SlotId::Principal, uid("User", "alice")),
                (SlotId::Resource, uid("Doc", "d1")),
            ]),
        )
        .unwrap();

    let policies = PolicySet::new();
    policies.add(PolicyId::new("grant-read-alice-d1"), (*linked).clone());

    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_d1("alice"));
    assert_eq!(response.decision, Decision::Allow);
    assert_eq!(reasons(&response), vec!["grant-read-alice-d1"]);

    let response = Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_d1("bob"));
    assert_eq!(response.decision, Decision::Deny);
}

#[test]
fn entities_loaded_from_json_drive_the_hierarchy() {
    let entities = entities_from_json(&serde_json::json!([
        {
            "uid": { "type": "Server", "id": "0" },
            "attrs": {},
            "parents": []
        },
        {
            "uid": { "type": "Project", "id": "0" },
            "attrs": { "owner": { "__entity": { "type": "User", "id": "alice" } } },
            "parents": [ { "type": "Server", "id": "0" } ]
        }
    ]))
    .unwrap();

    let policies = PolicySet::new();
    policies.add(
        PolicyId::new("p"),
        Policy::new(
            Effect::Permit,
            PrincipalScope::All,
            ActionScope::All,
            ResourceScope::In(uid("Server", "0")),
            Vec::new(),
        ),
    );

    let request = Request::new(uid("User", "alice"), uid("Action", "read"), uid("Project", "0"));
    let response = Authorizer::new().is_authorized(&policies, &entities, &request);
    assert_eq!(response.decision, Decision::Allow);
}

#[test]
fn json_roundtrip_preserves_authorize_behaviour() {
    let policies = PolicySet::new();
    policies.add(
        PolicyId::new("read-alice"),
        Policy::new(
            Effect::Permit,
            PrincipalScope::Eq(uid("User", "alice")),
            ActionScope::Eq(uid("Action", "read")),
            ResourceScope::Eq(uid("Doc", "d1")),
            Vec::new(),
        ),
    );
    policies.add(
        PolicyId::new("no-interns"),
        Policy::new(
            Effect::Forbid,
            PrincipalScope::In(uid("Group", "interns")),
            ActionScope::All,
            ResourceScope::All,
            Vec::new(),
        ),
    );
    policies.add(
        PolicyId::new("mfa"),
        Policy::new(
            Effect::Permit,
            PrincipalScope::All,
            ActionScope::All,
            ResourceScope::All,
            vec![Condition::when(Expr::get_attr(Expr::var(Var::Context), "mfa"))],
        ),
    );

    let reparsed = PolicySet::from_json(&policies.to_json()).unwrap();

    let entities = EntityStore::from_entities([
        Entity::new(uid("User", "eve")).with_parent(uid("Group", "interns")),
    ]);
    let requests = [
        read_d1("alice"),
        read_d1("eve"),
        read_d1("bob").with_context(Value::record([("mfa".to_string(), Value::bool(true))])),
        Request::new(uid("User", "alice"), uid("Action", "write"), uid("Doc", "d2")),
    ];

    let authorizer = Authorizer::new();
    for request in &requests {
        let before = authorizer.is_authorized(&policies, &entities, request);
        let after = authorizer.is_authorized(&reparsed, &entities, request);
        assert_eq!(before, after, "divergence on {request}");
    }
}

#[test]
#[tracing_test::traced_test]
fn authorize_emits_decision_events() {
    let policies = PolicySet::new();
    policies.add(PolicyId::new("p"), Policy::permit_all());
    Authorizer::new().is_authorized(&policies, &EntityStore::new(), &read_d1("alice"));
    assert!(logs_contain("request decided"));
}
