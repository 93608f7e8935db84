use kernel::{EntityUid, Value};
use std::fmt;

/// An authorization question: may `principal` perform `action` on
/// `resource`, given `context`?
///
/// The context is a record value; it defaults to the empty record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    principal: EntityUid,
    action: EntityUid,
    resource: EntityUid,
    context: Value,
}

impl Request {
    pub fn new(principal: EntityUid, action: EntityUid, resource: EntityUid) -> Self {
        Self {
            principal,
            action,
            resource,
            context: Value::empty_record(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn principal(&self) -> &EntityUid {
        &self.principal
    }

    pub fn action(&self) -> &EntityUid {
        &self.action
    }

    pub fn resource(&self) -> &EntityUid {
        &self.resource
    }

    pub fn context(&self) -> &Value {
        &self.context
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.principal, self.action, self.resource
        )
    }
}
