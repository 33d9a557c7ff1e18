use hrpc_core::{Endpoint, RpcError};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Client configuration. Serde field names follow the recognized camelCase
/// option names (`basePackages`, `timeoutMillis`, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Registration packages included by the bootstrap scan. Empty selects
    /// every registered service.
    pub base_packages: Vec<String>,
    /// Default endpoint for services without an explicit override.
    pub endpoint: Option<Endpoint>,
    /// Per-service endpoint overrides, keyed by service id.
    pub service_endpoints: HashMap<String, Endpoint>,
    /// Default per-call deadline.
    pub timeout_millis: u64,
    pub max_connections_per_endpoint: usize,
    /// Retry budget for `ConnectionLost` and `Timeout` failures.
    pub max_retries: u32,
    pub idle_connection_timeout_millis: u64,
    /// Bounded wait for a pool slot before `PoolExhausted`.
    pub pool_wait_millis: u64,
    /// Cadence of the per-connection timeout sweep.
    pub sweep_interval_millis: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_packages: Vec::new(),
            endpoint: None,
            service_endpoints: HashMap::new(),
            timeout_millis: 30_000,
            max_connections_per_endpoint: 4,
            max_retries: 0,
            idle_connection_timeout_millis: 60_000,
            pool_wait_millis: 1_000,
            sweep_interval_millis: 25,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    pub fn idle_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_connection_timeout_millis)
    }

    pub fn pool_wait(&self) -> Duration {
        Duration::from_millis(self.pool_wait_millis)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_millis)
    }

    pub fn validate(&self) -> Result<(), RpcError> {
        if self.timeout_millis == 0 {
            return Err(RpcError::Configuration(
                "timeoutMillis must be positive".to_string(),
            ));
        }
        if self.max_connections_per_endpoint == 0 {
            return Err(RpcError::Configuration(
                "maxConnectionsPerEndpoint must be positive".to_string(),
            ));
        }
        if self.pool_wait_millis == 0 {
            return Err(RpcError::Configuration(
                "poolWaitMillis must be positive".to_string(),
            ));
        }
        if self.sweep_interval_millis == 0 {
            return Err(RpcError::Configuration(
                "sweepIntervalMillis must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
