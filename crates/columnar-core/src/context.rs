//! Per-request context.

use std::fmt;

use uuid::Uuid;

/// The context a storage operation runs under.
///
/// Tables are namespaced per tenant; the request id ties log lines of one
/// operation together.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The tenant owning the tables this request touches.
    pub tenant: String,
    /// Unique id of this request.
    pub request_id: Uuid,
}

impl RequestContext {
    /// Creates a context for the given tenant with a fresh request id.
    #[must_use]
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            request_id: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.request_id)
    }
}
