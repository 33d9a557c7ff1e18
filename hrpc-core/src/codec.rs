use crate::error::ErrorDetail;
use crate::ids::CorrelationId;
use crate::msg::{Message, Outcome};
use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Frame type discriminants on the wire.
pub const FRAME_REQUEST: u8 = 0x00;
pub const FRAME_RESPONSE: u8 = 0x01;

/// Response status discriminants.
pub const STATUS_OK: u8 = 0x00;
pub const STATUS_ERROR: u8 = 0x01;

/// Frame bytes counted by the length prefix besides the payload:
/// 1-byte type + 8-byte correlation id. The length prefix itself is
/// excluded from the length.
const FRAME_HEADER_LEN: usize = 9;

/// Codec for hrpc frames:
/// `[4-byte length][1-byte type][8-byte correlation id][payload]`.
///
/// REQUEST payload is `[u16 service-id length][service id][u16 method-id
/// length][method id][JSON argument array]`; RESPONSE payload is
/// `[1-byte status][JSON result or error detail]`. All integers big-endian.
pub struct FrameCodec {
    /// Maximum frame size to prevent unbounded buffering
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: 10 * 1024 * 1024, // 10MB default
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn put_string(dst: &mut BytesMut, s: &str) -> Result<(), CodecError> {
    let len = u16::try_from(s.len())
        .map_err(|_| CodecError::MalformedFrame(format!("identifier too long: {} bytes", s.len())))?;
    dst.put_u16(len);
    dst.put_slice(s.as_bytes());
    Ok(())
}

fn take_string(buf: &[u8]) -> Result<(String, &[u8]), CodecError> {
    if buf.len() < 2 {
        return Err(CodecError::MalformedFrame(
            "truncated identifier length".to_string(),
        ));
    }
    let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    let rest = &buf[2..];
    if rest.len() < len {
        return Err(CodecError::MalformedFrame(
            "truncated identifier".to_string(),
        ));
    }
    let s = std::str::from_utf8(&rest[..len])
        .map_err(|_| CodecError::MalformedFrame("identifier is not valid UTF-8".to_string()))?
        .to_string();
    Ok((s, &rest[len..]))
}

fn decode_request(id: CorrelationId, payload: &[u8]) -> Result<Message, CodecError> {
    let (service, rest) = take_string(payload)?;
    let (method, rest) = take_string(rest)?;
    let args: Vec<Value> =
        serde_json::from_slice(rest).map_err(|e| CodecError::Json(e.to_string()))?;
    Ok(Message::Request {
        id,
        service,
        method,
        args,
    })
}

fn decode_response(id: CorrelationId, payload: &[u8]) -> Result<Message, CodecError> {
    let status = *payload
        .first()
        .ok_or_else(|| CodecError::MalformedFrame("missing response status".to_string()))?;
    let body = &payload[1..];
    let outcome = match status {
        STATUS_OK => {
            let value: Value =
                serde_json::from_slice(body).map_err(|e| CodecError::Json(e.to_string()))?;
            Outcome::Success { value }
        }
        STATUS_ERROR => {
            let error: ErrorDetail =
                serde_json::from_slice(body).map_err(|e| CodecError::Json(e.to_string()))?;
            Outcome::Error { error }
        }
        other => return Err(CodecError::UnknownStatus(other)),
    };
    Ok(Message::Response { id, outcome })
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least the length prefix
        if src.len() < 4 {
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[..4]);
        let frame_len = u32::from_be_bytes(length_bytes) as usize;

        if frame_len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge(frame_len));
        }
        if frame_len < FRAME_HEADER_LEN {
            return Err(CodecError::MalformedFrame(format!(
                "frame length {} shorter than header",
                frame_len
            )));
        }

        if src.len() < 4 + frame_len {
            // Need more data
            src.reserve(4 + frame_len - src.len());
            return Ok(None);
        }

        src.advance(4); // Skip length prefix
        let frame = src.split_to(frame_len);

        let frame_type = frame[0];
        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&frame[1..9]);
        let id = CorrelationId::new(u64::from_be_bytes(id_bytes));
        let payload = &frame[FRAME_HEADER_LEN..];

        match frame_type {
            FRAME_REQUEST => decode_request(id, payload).map(Some),
            FRAME_RESPONSE => decode_response(id, payload).map(Some),
            other => Err(CodecError::UnknownFrameType(other)),
        }
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut payload = BytesMut::new();
        let frame_type = match &item {
            Message::Request {
                service,
                method,
                args,
                ..
            } => {
                put_string(&mut payload, service)?;
                put_string(&mut payload, method)?;
                let args_json =
                    serde_json::to_vec(args).map_err(|e| CodecError::Json(e.to_string()))?;
                payload.put_slice(&args_json);
                FRAME_REQUEST
            }
            Message::Response { outcome, .. } => {
                match outcome {
                    Outcome::Success { value } => {
                        payload.put_u8(STATUS_OK);
                        let body = serde_json::to_vec(value)
                            .map_err(|e| CodecError::Json(e.to_string()))?;
                        payload.put_slice(&body);
                    }
                    Outcome::Error { error } => {
                        payload.put_u8(STATUS_ERROR);
                        let body = serde_json::to_vec(error)
                            .map_err(|e| CodecError::Json(e.to_string()))?;
                        payload.put_slice(&body);
                    }
                }
                FRAME_RESPONSE
            }
        };

        let frame_len = FRAME_HEADER_LEN + payload.len();
        if frame_len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge(frame_len));
        }

        dst.reserve(4 + frame_len);
        dst.put_u32(frame_len as u32);
        dst.put_u8(frame_type);
        dst.put_u64(item.correlation_id().as_u64());
        dst.put_slice(&payload);

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unknown frame type: {0:#04x}")]
    UnknownFrameType(u8),

    #[error("unknown response status: {0:#04x}")]
    UnknownStatus(u8),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
