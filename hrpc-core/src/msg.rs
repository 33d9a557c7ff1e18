use crate::error::ErrorDetail;
use crate::ids::CorrelationId;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { value: Value },
    Error { error: ErrorDetail },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: CorrelationId,
        service: String,
        method: String,
        args: Vec<Value>,
    },
    Response {
        id: CorrelationId,
        outcome: Outcome,
    },
}

impl Message {
    pub fn request(
        id: CorrelationId,
        service: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Message::Request {
            id,
            service: service.into(),
            method: method.into(),
            args,
        }
    }

    pub fn success(id: CorrelationId, value: Value) -> Self {
        Message::Response {
            id,
            outcome: Outcome::Success { value },
        }
    }

    pub fn error(id: CorrelationId, error: ErrorDetail) -> Self {
        Message::Response {
            id,
            outcome: Outcome::Error { error },
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            Message::Request { id, .. } => *id,
            Message::Response { id, .. } => *id,
        }
    }
}
