pub mod breaker;
pub mod fallback;
pub mod retry;

pub use breaker::{BreakerError, CircuitBreaker, CircuitState};
pub use fallback::FallbackStore;
pub use retry::retry_with_backoff;
