pub mod cache;
pub mod config;
pub mod core;
pub mod logging;
pub mod monitoring;
pub mod resilience;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheStats, QueryCache};
pub use config::{
    BreakerConfig, CacheConfig, FallbackConfig, LoggingConfig, ServerConfig, TtlConfig,
};
pub use crate::core::{
    NewNotification, Notification, NotificationKind, PlingError, Priority, Result, UserIdentity,
};
pub use monitoring::HealthSnapshot;
pub use resilience::{BreakerError, CircuitBreaker, CircuitState, FallbackStore, retry_with_backoff};
pub use service::NotificationService;
pub use store::{MemoryGateway, SortOrder, StoreError, StoreGateway};
