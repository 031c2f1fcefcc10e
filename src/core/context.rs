//! Per-request context
//!
//! Carries the request id that tags every log line of one caller request.
//! It is passed explicitly to each service call rather than kept in ambient
//! state.

use std::fmt;
use uuid::Uuid;

/// Identity of one caller request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestContext {
    request_id: Uuid,
}

impl RequestContext {
    /// A context with a freshly generated request id
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
        }
    }

    /// A context for a request id assigned upstream
    pub fn with_request_id(request_id: Uuid) -> Self {
        Self { request_id }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_contexts_are_distinct() {
        assert_ne!(RequestContext::new(), RequestContext::new());
    }

    #[test]
    fn test_upstream_request_id_is_kept() {
        let id = Uuid::new_v4();
        let ctx = RequestContext::with_request_id(id);
        assert_eq!(ctx.request_id(), id);
        assert_eq!(ctx.to_string(), id.to_string());
    }
}
