use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl CorrelationId {
    pub fn new(value: u64) -> Self {
        CorrelationId(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl ConnectionId {
    pub fn new(value: u64) -> Self {
        ConnectionId(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        CorrelationId::new(value)
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        ConnectionId::new(value)
    }
}

/// Allocates correlation ids for one connection. Ids are monotonic and are
/// never handed out twice for the lifetime of the allocator, so an id can
/// never be reused while the call it identifies is still unresolved.
pub struct CorrelationIdAllocator {
    next: AtomicU64,
}

impl CorrelationIdAllocator {
    pub fn new() -> Self {
        CorrelationIdAllocator {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> CorrelationId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationId::new(id)
    }

    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for CorrelationIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
