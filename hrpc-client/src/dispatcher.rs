use crate::config::ClientConfig;
use async_trait::async_trait;
use hrpc_core::{Endpoint, Message, RpcError};
use hrpc_transport::{ConnectionPool, PoolConfig};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Seam between the proxy layer and the invocation pipeline.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError>;
}

/// Picks the endpoint for a service: per-service override first, then the
/// global default.
#[derive(Debug, Clone, Default)]
pub struct EndpointResolver {
    default: Option<Endpoint>,
    per_service: HashMap<String, Endpoint>,
}

impl EndpointResolver {
    pub fn new(default: Option<Endpoint>, per_service: HashMap<String, Endpoint>) -> Self {
        EndpointResolver {
            default,
            per_service,
        }
    }

    pub fn resolve(&self, service: &str) -> Result<&Endpoint, RpcError> {
        self.per_service
            .get(service)
            .or(self.default.as_ref())
            .ok_or_else(|| {
                RpcError::Configuration(format!("no endpoint configured for service {}", service))
            })
    }
}

/// Turns one logical invocation into a wire request and suspends the
/// caller until its pending call resolves.
pub struct Dispatcher {
    pool: Arc<ConnectionPool>,
    endpoints: EndpointResolver,
    default_timeout: Duration,
    max_retries: u32,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<ConnectionPool>,
        endpoints: EndpointResolver,
        default_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Dispatcher {
            pool,
            endpoints,
            default_timeout,
            max_retries,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let pool = ConnectionPool::new(PoolConfig {
            max_connections_per_endpoint: config.max_connections_per_endpoint,
            acquire_timeout: config.pool_wait(),
            idle_timeout: config.idle_connection_timeout(),
            sweep_interval: config.sweep_interval(),
        });
        Dispatcher::new(
            pool,
            EndpointResolver::new(config.endpoint.clone(), config.service_endpoints.clone()),
            config.timeout(),
            config.max_retries,
        )
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// One attempt: acquire, register, write, wait, release. The pending
    /// call is registered before the write so a response can never beat
    /// its own registration.
    async fn attempt(
        &self,
        endpoint: &Endpoint,
        service: &str,
        method: &str,
        args: &[Value],
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        let pooled = self.pool.acquire(endpoint).await?;

        let deadline = Instant::now() + timeout;
        let (id, handle) = pooled.calls().register(deadline, timeout);
        trace!(%id, service, method, conn = %pooled.id(), "sending request");

        let request = Message::request(id, service, method, args.to_vec());
        if let Err(e) = pooled.send(request).await {
            // The failed write already closed the connection and failed
            // our pending entry; release just discards.
            self.pool.release(pooled).await;
            return Err(e);
        }

        let result = handle.wait().await;
        self.pool.release(pooled).await;
        result
    }
}

#[async_trait]
impl Invoker for Dispatcher {
    async fn invoke(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let endpoint = self.endpoints.resolve(service)?.clone();

        let mut attempt = 0u32;
        loop {
            match self.attempt(&endpoint, service, method, &args, timeout).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(service, method, attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                // Only failures that cannot have delivered a result feed
                // the retry budget; each retry re-acquires a connection
                // and resends under a fresh correlation id.
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(service, method, attempt, error = %e, "retrying after transport failure");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("default_timeout", &self.default_timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
