pub mod config;
pub mod context;
pub mod dispatcher;
pub mod macros;
pub mod proxy;
pub mod registry;

pub use config::ClientConfig;
pub use context::ClientContext;
pub use dispatcher::{Dispatcher, EndpointResolver, Invoker};
pub use proxy::{encode_arg, RemoteProxy, ServiceProxy};
pub use registry::{Registration, ServiceRegistry};

// Re-export the core types a client application touches directly.
pub use hrpc_core::{Endpoint, ErrorCode, ErrorDetail, RpcError, ServiceDescriptor};
