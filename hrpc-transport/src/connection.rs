use crate::correlator::{CallResult, CallTable};
use futures::{SinkExt, StreamExt};
use hrpc_core::{ConnectionId, Endpoint, FrameCodec, Message, Outcome, RpcError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace, warn};

/// State shared with the background tasks, which outlive any one checkout
/// of the connection.
struct Shared {
    id: ConnectionId,
    endpoint: Endpoint,
    calls: CallTable,
    closed: AtomicBool,
}

impl Shared {
    /// Idempotent: the first reason wins, later closes are no-ops. Closing
    /// fails every call still registered on this connection exactly once.
    fn close(&self, reason: &str) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(id = %self.id, endpoint = %self.endpoint, reason, "connection closed");
            self.calls.fail_all(reason);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// One live TCP stream bound to exactly one endpoint.
///
/// The write half sits behind a mutex and belongs to whoever holds the
/// pool checkout; the read half is drained by a background reader task
/// that resolves the call table for as long as the stream lives,
/// regardless of loan state. A second task sweeps pending calls past
/// their deadline.
pub struct Connection {
    shared: Arc<Shared>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, FrameCodec>>,
    reader: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Connection {
    pub async fn connect(
        id: ConnectionId,
        endpoint: Endpoint,
        sweep_interval: Duration,
    ) -> Result<Connection, RpcError> {
        let stream = TcpStream::connect(endpoint.addr()).await.map_err(|e| {
            RpcError::ConnectionLost(format!("failed to connect to {}: {}", endpoint, e))
        })?;
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(Shared {
            id,
            endpoint,
            calls: CallTable::new(),
            closed: AtomicBool::new(false),
        });
        debug!(%id, endpoint = %shared.endpoint, "connection established");

        let reader = tokio::spawn(read_loop(shared.clone(), read_half));
        let sweeper = tokio::spawn(sweep_loop(shared.clone(), sweep_interval));

        Ok(Connection {
            shared,
            writer: Mutex::new(FramedWrite::new(write_half, FrameCodec::new())),
            reader,
            sweeper,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub fn calls(&self) -> &CallTable {
        &self.shared.calls
    }

    pub fn is_open(&self) -> bool {
        !self.shared.is_closed()
    }

    /// Writes one frame. A failed write closes the connection, which fails
    /// every pending call registered on it.
    pub async fn send(&self, message: Message) -> Result<(), RpcError> {
        if !self.is_open() {
            return Err(RpcError::ConnectionLost(format!(
                "connection to {} is closed",
                self.endpoint()
            )));
        }
        let mut writer = self.writer.lock().await;
        writer.send(message).await.map_err(|e| {
            let reason = format!("write failed: {}", e);
            self.shared.close(&reason);
            RpcError::ConnectionLost(reason)
        })
    }

    pub fn close(&self, reason: &str) {
        self.shared.close(reason);
        self.reader.abort();
        self.sweeper.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close("connection dropped");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("endpoint", &self.shared.endpoint)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Drains inbound frames and resolves pending calls by correlation id.
/// This is the only resolution path besides the timeout sweep and the
/// failure sweep.
async fn read_loop(shared: Arc<Shared>, read_half: OwnedReadHalf) {
    let mut frames = FramedRead::new(read_half, FrameCodec::new());
    loop {
        match frames.next().await {
            Some(Ok(Message::Response { id, outcome })) => {
                trace!(conn = %shared.id, %id, "response frame");
                let result: CallResult = match outcome {
                    Outcome::Success { value } => Ok(value),
                    Outcome::Error { error } => Err(RpcError::Remote(error)),
                };
                if !shared.calls.resolve(id, result) {
                    warn!(
                        conn = %shared.id,
                        %id,
                        "dropping response for unknown or already-resolved call"
                    );
                }
            }
            Some(Ok(Message::Request { id, .. })) => {
                warn!(conn = %shared.id, %id, "dropping unexpected REQUEST frame from server");
            }
            Some(Err(e)) => {
                shared.close(&format!("protocol error: {}", e));
                break;
            }
            None => {
                shared.close("stream closed by peer");
                break;
            }
        }
        if shared.is_closed() {
            break;
        }
    }
}

/// Resolves overdue pending calls with `Timeout`, bounding every wait even
/// under total server silence. Expiry never closes the connection and
/// never touches other in-flight calls.
async fn sweep_loop(shared: Arc<Shared>, interval: Duration) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        if shared.is_closed() {
            break;
        }
        let expired = shared.calls.expire(Instant::now());
        if expired > 0 {
            debug!(conn = %shared.id, expired, "expired pending calls past deadline");
        }
    }
}
