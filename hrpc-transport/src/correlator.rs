use dashmap::DashMap;
use hrpc_core::{CorrelationId, CorrelationIdAllocator, RpcError};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

/// What a pending call ultimately resolves to: the decoded result value or
/// the failure that ended the wait.
pub type CallResult = Result<Value, RpcError>;

/// One outstanding request: its single-assignment result slot and the
/// deadline after which the timeout sweep declares it dead.
struct PendingCall {
    tx: oneshot::Sender<CallResult>,
    deadline: Instant,
    timeout: Duration,
}

/// Caller side of a pending call.
pub struct CallHandle {
    rx: oneshot::Receiver<CallResult>,
}

impl CallHandle {
    /// Suspends until the call table resolves this call. Every pending
    /// call is resolved exactly once, by one of: a matching response, the
    /// timeout sweep, or the connection-failure sweep.
    pub async fn wait(self) -> CallResult {
        match self.rx.await {
            Ok(result) => result,
            // The table only drops a sender by resolving it first, so a
            // closed channel means the connection was torn down outright.
            Err(_) => Err(RpcError::ConnectionLost(
                "pending call dropped without resolution".to_string(),
            )),
        }
    }
}

/// Maps in-flight correlation ids to the callers awaiting their results on
/// one connection. Map mutation is the only critical section; encoding and
/// network I/O never happen under it.
pub struct CallTable {
    allocator: CorrelationIdAllocator,
    pending: DashMap<CorrelationId, PendingCall>,
}

impl CallTable {
    pub fn new() -> Self {
        CallTable {
            allocator: CorrelationIdAllocator::new(),
            pending: DashMap::new(),
        }
    }

    /// Registers a pending call under a fresh correlation id. Ids are
    /// allocated monotonically, so an id cannot be reused while the call
    /// it names is unresolved.
    pub fn register(&self, deadline: Instant, timeout: Duration) -> (CorrelationId, CallHandle) {
        let id = self.allocator.allocate();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCall {
                tx,
                deadline,
                timeout,
            },
        );
        (id, CallHandle { rx })
    }

    /// Delivers `result` to the caller registered under `id`. Returns
    /// false when the id is unknown or already resolved; late and
    /// duplicate responses are dropped, never delivered twice.
    pub fn resolve(&self, id: CorrelationId, result: CallResult) -> bool {
        match self.pending.remove(&id) {
            Some((_, call)) => {
                // A send error means the caller stopped waiting; the call
                // still counts as resolved.
                let _ = call.tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Fails every still-registered call with `ConnectionLost`. Runs when
    /// the owning connection closes.
    pub fn fail_all(&self, reason: &str) -> usize {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if self.resolve(id, Err(RpcError::ConnectionLost(reason.to_string()))) {
                failed += 1;
            }
        }
        if failed > 0 {
            debug!(failed, reason, "failed pending calls on connection loss");
        }
        failed
    }

    /// Resolves every call whose deadline has passed with `Timeout`. A
    /// call that races with a concurrent response keeps whichever
    /// resolution removed it first.
    pub fn expire(&self, now: Instant) -> usize {
        let overdue: Vec<(CorrelationId, Duration)> = self
            .pending
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| (*entry.key(), entry.value().timeout))
            .collect();
        let mut expired = 0;
        for (id, timeout) in overdue {
            if self.resolve(id, Err(RpcError::Timeout(timeout))) {
                expired += 1;
            }
        }
        expired
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for CallTable {
    fn default() -> Self {
        Self::new()
    }
}
