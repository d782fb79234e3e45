use std::sync::Arc;

use crate::driver::DriverError;

/// Errors from the instance pool and its admission queue
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(
        "Browser pool capacity exhausted ({max_browsers} browsers x {max_pages_per_context} pages)"
    )]
    CapacityExhausted {
        max_browsers: usize,
        max_pages_per_context: usize,
    },

    #[error("Browser pool is shutting down")]
    ShuttingDown,

    #[error("Browser pool initialization failed: {0}")]
    InitFailed(String),

    #[error("Browser instance {0} is unhealthy")]
    InstanceUnhealthy(u64),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Where a swallowed cleanup or interception error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceScope {
    Page,
    Context,
    Browser,
    Interceptor,
}

/// An error the pool logged and carried on from instead of returning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsorbedError {
    pub instance_id: u64,
    pub scope: ResourceScope,
    pub error: String,
}

/// Receives every [`AbsorbedError`]; called inline, so it must not block
pub type AbsorbedErrorHook = Arc<dyn Fn(AbsorbedError) + Send + Sync>;
