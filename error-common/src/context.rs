use serde::{Deserialize, Serialize};

/// Context that must survive a retry-with-backoff wait unchanged.
///
/// The store's retry loop (see `token-store::retry`) reattaches this after
/// every scheduled wait so that security-origin tagging and distributed
/// tracing correlate correctly with the request that triggered the retry,
/// not with whatever task happened to run the timer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    /// Correlates log lines for one logical operation across retries.
    pub trace_id: Option<String>,
    /// Marks a request as internal/security-origin so store-side auditing
    /// does not attribute it to an end user.
    pub origin: Option<&'static str>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_origin(mut self, origin: &'static str) -> Self {
        self.origin = Some(origin);
        self
    }

    /// The origin marker token-repository writes use to tag themselves as
    /// internal to the security subsystem.
    pub const SECURITY_ORIGIN: &'static str = "security_token_service";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_fields_across_clone() {
        let ctx = RequestContext::new()
            .with_trace_id("abc")
            .with_origin(RequestContext::SECURITY_ORIGIN);
        let cloned = ctx.clone();
        assert_eq!(cloned.trace_id.as_deref(), Some("abc"));
        assert_eq!(cloned.origin, Some(RequestContext::SECURITY_ORIGIN));
    }
}
