pub mod connection;
pub mod correlator;
pub mod pool;

pub use connection::Connection;
pub use correlator::{CallHandle, CallResult, CallTable};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
