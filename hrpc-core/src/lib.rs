pub mod codec;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod ids;
pub mod msg;

pub use codec::{CodecError, FrameCodec, FRAME_REQUEST, FRAME_RESPONSE, STATUS_ERROR, STATUS_OK};
pub use descriptor::{MethodDescriptor, ServiceDescriptor};
pub use endpoint::{Endpoint, EndpointParseError};
pub use error::{ErrorCode, ErrorDetail, RpcError};
pub use ids::{ConnectionId, CorrelationId, CorrelationIdAllocator};
pub use msg::{Message, Outcome};
