use serde::Serialize;

use crate::cache::CacheStats;
use crate::resilience::CircuitState;

/// Read-only health snapshot for an external health/metrics endpoint.
/// Assembling it never mutates cache, breaker or fallback state.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub cache: CacheStats,
    pub hit_ratio: f64,
    pub breaker_state: CircuitState,
    pub breaker_failures: u32,
    pub store_ready: bool,
    pub fallback_owners: usize,
}
