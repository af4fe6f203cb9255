//! Utility modules for fault tolerance and resilience

pub mod env;
pub mod logging;
pub mod retry;
pub mod timeout;

// Re-export commonly used items
pub use env::{env_bool, env_int, env_opt, env_or_default};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use logging::{init_logging, init_logging_from_config};
pub use retry::{retry_async_fixed, RetryConfig, RetryExhausted};
pub use timeout::{with_deadline, AttemptContext, DEFAULT_LOAD_TIMEOUT};
