use crate::connection::Connection;
use dashmap::DashMap;
use hrpc_core::{ConnectionId, Endpoint, RpcError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on live connections per endpoint, idle or on loan.
    pub max_connections_per_endpoint: usize,
    /// Bounded wait for a slot before `PoolExhausted`.
    pub acquire_timeout: Duration,
    /// Idle connections older than this are closed proactively.
    pub idle_timeout: Duration,
    /// Cadence of each connection's timeout sweep.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_endpoint: 4,
            acquire_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_millis(25),
        }
    }
}

struct IdleEntry {
    conn: Arc<Connection>,
    idle_since: Instant,
}

struct EndpointPool {
    limiter: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleEntry>>,
}

/// A connection on loan from the pool. The write path belongs to the
/// holder until release; the background reader keeps draining responses
/// regardless. Dropping the guard without releasing discards the
/// connection, so an abandoned checkout can never put a suspect stream
/// back into the idle set.
pub struct PooledConnection {
    conn: Arc<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.conn.fmt(f)
    }
}

/// Bounded set of connections to configured endpoints. Lends them out one
/// checkout at a time and reclaims or discards them on release.
pub struct ConnectionPool {
    config: PoolConfig,
    endpoints: DashMap<Endpoint, Arc<EndpointPool>>,
    next_connection_id: AtomicU64,
}

impl ConnectionPool {
    /// Must be created inside a Tokio runtime: the idle reaper task is
    /// spawned immediately and lives until the pool is dropped.
    pub fn new(config: PoolConfig) -> Arc<Self> {
        let pool = Arc::new(ConnectionPool {
            config,
            endpoints: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        });

        let weak = Arc::downgrade(&pool);
        let reap_interval = (pool.config.idle_timeout / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(reap_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                match weak.upgrade() {
                    Some(pool) => pool.reap_idle().await,
                    None => break,
                }
            }
        });

        pool
    }

    /// Returns a usable connection to `endpoint`, reusing an idle one or
    /// dialing a new one within the per-endpoint bound. Blocks up to the
    /// configured wait when the bound is reached, then fails with
    /// `PoolExhausted`.
    pub async fn acquire(&self, endpoint: &Endpoint) -> Result<PooledConnection, RpcError> {
        let ep = self
            .endpoints
            .entry(endpoint.clone())
            .or_insert_with(|| {
                Arc::new(EndpointPool {
                    limiter: Arc::new(Semaphore::new(self.config.max_connections_per_endpoint)),
                    idle: Mutex::new(VecDeque::new()),
                })
            })
            .clone();

        let permit = match timeout(self.config.acquire_timeout, ep.limiter.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            _ => {
                return Err(RpcError::PoolExhausted {
                    endpoint: endpoint.clone(),
                    waited: self.config.acquire_timeout,
                })
            }
        };

        // Idle connections are validated lazily: anything that failed
        // while parked is discarded here.
        loop {
            let entry = ep.idle.lock().await.pop_front();
            match entry {
                Some(entry) if entry.conn.is_open() => {
                    trace!(%endpoint, id = %entry.conn.id(), "reusing idle connection");
                    return Ok(PooledConnection {
                        conn: entry.conn,
                        _permit: permit,
                    });
                }
                Some(entry) => {
                    debug!(%endpoint, id = %entry.conn.id(), "discarding closed idle connection");
                }
                None => break,
            }
        }

        let id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let conn = Connection::connect(id, endpoint.clone(), self.config.sweep_interval).await?;
        Ok(PooledConnection {
            conn: Arc::new(conn),
            _permit: permit,
        })
    }

    /// Returns an open connection to the idle set; a failed one is
    /// discarded. Either way the capacity slot frees up.
    pub async fn release(&self, pooled: PooledConnection) {
        let PooledConnection { conn, _permit } = pooled;
        if conn.is_open() {
            let ep = self
                .endpoints
                .get(conn.endpoint())
                .map(|entry| entry.value().clone());
            if let Some(ep) = ep {
                ep.idle.lock().await.push_back(IdleEntry {
                    conn,
                    idle_since: Instant::now(),
                });
                return;
            }
        }
        debug!(id = %conn.id(), endpoint = %conn.endpoint(), "discarding connection on release");
    }

    async fn reap_idle(&self) {
        let pools: Vec<(Endpoint, Arc<EndpointPool>)> = self
            .endpoints
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let now = Instant::now();
        for (endpoint, ep) in pools {
            let mut idle = ep.idle.lock().await;
            let before = idle.len();
            idle.retain(|entry| {
                let keep = entry.conn.is_open()
                    && now.duration_since(entry.idle_since) < self.config.idle_timeout;
                if !keep {
                    entry.conn.close("idle connection reaped");
                }
                keep
            });
            let reaped = before - idle.len();
            if reaped > 0 {
                debug!(%endpoint, reaped, "closed idle connections");
            }
        }
    }

    /// Idle connections currently parked for `endpoint`.
    pub async fn idle_count(&self, endpoint: &Endpoint) -> usize {
        match self.endpoints.get(endpoint).map(|e| e.value().clone()) {
            Some(ep) => ep.idle.lock().await.len(),
            None => 0,
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accepts connections and holds them open without speaking.
    async fn spawn_idle_server() -> Endpoint {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let _stream = stream;
                    std::future::pending::<()>().await;
                });
            }
        });
        Endpoint::new("127.0.0.1", port)
    }

    fn test_config() -> PoolConfig {
        PoolConfig {
            max_connections_per_endpoint: 1,
            acquire_timeout: Duration::from_millis(50),
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_release_reuses_connection() {
        let endpoint = spawn_idle_server().await;
        let pool = ConnectionPool::new(test_config());

        let first = pool.acquire(&endpoint).await.unwrap();
        let first_id = first.id();
        pool.release(first).await;
        assert_eq!(pool.idle_count(&endpoint).await, 1);

        let second = pool.acquire(&endpoint).await.unwrap();
        assert_eq!(second.id(), first_id);
    }

    #[tokio::test]
    async fn test_exhaustion_after_bounded_wait() {
        let endpoint = spawn_idle_server().await;
        let pool = ConnectionPool::new(test_config());

        let held = pool.acquire(&endpoint).await.unwrap();

        let started = Instant::now();
        match pool.acquire(&endpoint).await {
            Err(RpcError::PoolExhausted { waited, .. }) => {
                assert_eq!(waited, Duration::from_millis(50));
            }
            other => panic!("expected PoolExhausted, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(50));

        pool.release(held).await;
        assert!(pool.acquire(&endpoint).await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_proceeds_once_slot_frees() {
        let endpoint = spawn_idle_server().await;
        let pool = ConnectionPool::new(PoolConfig {
            acquire_timeout: Duration::from_secs(2),
            ..test_config()
        });

        let held = pool.acquire(&endpoint).await.unwrap();

        let pool2 = pool.clone();
        let endpoint2 = endpoint.clone();
        let waiter = tokio::spawn(async move { pool2.acquire(&endpoint2).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.release(held).await;

        let acquired = waiter.await.unwrap();
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_closed_connection_discarded_on_release() {
        let endpoint = spawn_idle_server().await;
        let pool = ConnectionPool::new(test_config());

        let first = pool.acquire(&endpoint).await.unwrap();
        let first_id = first.id();
        first.close("simulated failure");
        pool.release(first).await;
        assert_eq!(pool.idle_count(&endpoint).await, 0);

        let second = pool.acquire(&endpoint).await.unwrap();
        assert_ne!(second.id(), first_id);
    }

    #[tokio::test]
    async fn test_reaper_closes_stale_idle_connections() {
        let endpoint = spawn_idle_server().await;
        let pool = ConnectionPool::new(PoolConfig {
            idle_timeout: Duration::from_millis(40),
            ..test_config()
        });

        let conn = pool.acquire(&endpoint).await.unwrap();
        let first_id = conn.id();
        pool.release(conn).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(pool.idle_count(&endpoint).await, 0);

        let fresh = pool.acquire(&endpoint).await.unwrap();
        assert_ne!(fresh.id(), first_id);
    }
}
