use crate::endpoint::Endpoint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error codes carried in the ERROR response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Application,
    ServiceNotFound,
    MethodNotFound,
    BadRequest,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Application => "application",
            ErrorCode::ServiceNotFound => "service_not_found",
            ErrorCode::MethodNotFound => "method_not_found",
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Error payload of an ERROR response: the server executed (or refused) the
/// call and reported why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorDetail {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ErrorDetail {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: Value) -> Self {
        ErrorDetail {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Application, message)
    }

    pub fn service_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceNotFound, message)
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MethodNotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Everything an invocation can fail with, surfaced to the caller at the
/// proxy method boundary.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Bad descriptor, scan collision or invalid configuration. Fatal at
    /// bootstrap, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Arguments or result cannot be encoded/decoded. Surfaced before any
    /// network round trip, never retried.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No connection became available within the bounded wait.
    #[error("no connection to {endpoint} available within {waited:?}")]
    PoolExhausted { endpoint: Endpoint, waited: Duration },

    /// Transport failure while the call was in flight.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Deadline elapsed with no resolution.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The server executed the method and it raised.
    #[error("remote error: {0}")]
    Remote(ErrorDetail),
}

impl RpcError {
    /// Failures the dispatcher may transparently retry. Everything else is
    /// surfaced as-is: the result may already have been delivered, or a
    /// retry could not possibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::ConnectionLost(_) | RpcError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_creation() {
        let err = ErrorDetail::new(ErrorCode::BadRequest, "Invalid input");
        assert_eq!(err.code, ErrorCode::BadRequest);
        assert_eq!(err.message, "Invalid input");
        assert_eq!(err.data, None);
    }

    #[test]
    fn test_error_detail_with_data() {
        let data = serde_json::json!({"field": "value"});
        let err = ErrorDetail::with_data(ErrorCode::Internal, "Server error", data.clone());
        assert_eq!(err.data, Some(data));
    }

    #[test]
    fn test_convenience_constructors() {
        assert_eq!(
            ErrorDetail::application("boom").code,
            ErrorCode::Application
        );
        assert_eq!(
            ErrorDetail::service_not_found("no such service").code,
            ErrorCode::ServiceNotFound
        );
        assert_eq!(
            ErrorDetail::method_not_found("no such method").code,
            ErrorCode::MethodNotFound
        );
        assert_eq!(ErrorDetail::bad_request("bad").code, ErrorCode::BadRequest);
        assert_eq!(ErrorDetail::internal("oops").code, ErrorCode::Internal);
    }

    #[test]
    fn test_error_detail_serialization() {
        let err = ErrorDetail::application("division by zero");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("\"data\""));
        let deserialized: ErrorDetail = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RpcError::ConnectionLost("reset".into()).is_retryable());
        assert!(RpcError::Timeout(Duration::from_millis(100)).is_retryable());

        assert!(!RpcError::Configuration("bad".into()).is_retryable());
        assert!(!RpcError::Serialization("bad".into()).is_retryable());
        assert!(!RpcError::Remote(ErrorDetail::application("boom")).is_retryable());
        assert!(!RpcError::PoolExhausted {
            endpoint: Endpoint::new("localhost", 1),
            waited: Duration::from_millis(50),
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = RpcError::Remote(ErrorDetail::application("division by zero"));
        let display = format!("{}", err);
        assert!(display.contains("remote error"));
        assert!(display.contains("division by zero"));
    }
}
