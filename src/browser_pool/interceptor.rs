//! Request blocking by destination host and resource type

use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use super::errors::{AbsorbedError, AbsorbedErrorHook, ResourceScope};
use crate::driver::{
    DriverError, InterceptedRequest, RequestInterceptor, ResourceType, RouteDecision,
};
use crate::utils::{FAST_MODE_BLOCKED_RESOURCE_TYPES, host_matches};

#[derive(Debug, Clone, Default)]
pub struct ResourceBlocker {
    blocked_domains: Vec<String>,
    blocked_types: HashSet<ResourceType>,
}

impl ResourceBlocker {
    pub fn new(
        blocked_domains: impl IntoIterator<Item = String>,
        blocked_types: impl IntoIterator<Item = ResourceType>,
    ) -> Self {
        Self {
            blocked_domains: blocked_domains.into_iter().collect(),
            blocked_types: blocked_types.into_iter().collect(),
        }
    }

    /// Blocker installed on pages fetched in fast mode
    #[must_use]
    pub fn fast_mode() -> Self {
        Self::new(
            Vec::new(),
            FAST_MODE_BLOCKED_RESOURCE_TYPES
                .iter()
                .filter_map(|name| ResourceType::parse(name)),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocked_domains.is_empty() && self.blocked_types.is_empty()
    }
}

impl RequestInterceptor for ResourceBlocker {
    fn intercept(&self, request: &InterceptedRequest) -> Result<RouteDecision, DriverError> {
        if self.blocked_types.contains(&request.resource_type) {
            return Ok(RouteDecision::Abort);
        }
        if self.blocked_domains.is_empty() {
            return Ok(RouteDecision::Continue);
        }

        let parsed = Url::parse(&request.url)
            .map_err(|e| DriverError::Interceptor(format!("{}: {e}", request.url)))?;
        let Some(host) = parsed.host_str() else {
            return Ok(RouteDecision::Continue);
        };

        if self
            .blocked_domains
            .iter()
            .any(|pattern| host_matches(host, pattern))
        {
            Ok(RouteDecision::Abort)
        } else {
            Ok(RouteDecision::Continue)
        }
    }
}

/// Forwards interceptor errors to an [`AbsorbedErrorHook`]
///
/// The error is still returned, so the routing chain lets the request
/// through as usual.
pub struct ReportingInterceptor {
    inner: Arc<dyn RequestInterceptor>,
    instance_id: u64,
    hook: AbsorbedErrorHook,
}

impl ReportingInterceptor {
    pub fn new(inner: Arc<dyn RequestInterceptor>, instance_id: u64, hook: AbsorbedErrorHook) -> Self {
        Self {
            inner,
            instance_id,
            hook,
        }
    }
}

impl RequestInterceptor for ReportingInterceptor {
    fn intercept(&self, request: &InterceptedRequest) -> Result<RouteDecision, DriverError> {
        self.inner.intercept(request).inspect_err(|e| {
            (self.hook)(AbsorbedError {
                instance_id: self.instance_id,
                scope: ResourceScope::Interceptor,
                error: e.to_string(),
            });
        })
    }
}
