//! Call/Response envelope — the protobuf messages exchanged over dRPC.
//!
//! Field tags and enum values match the engine's `drpc.proto`. Encoding is
//! protobuf via prost: deterministic, and unknown fields from a newer peer
//! are skipped on decode.

use prost::Message;

pub use prost::{DecodeError, EncodeError};

/// Outcome of a call as seen by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    /// Handler ran and produced a body.
    Success = 0,
    /// Accepted for asynchronous processing.
    Submitted = 1,
    /// Handler failed for an application reason.
    Failure = 2,
    UnknownModule = 3,
    UnknownMethod = 4,
    FailedUnmarshalCall = 5,
    FailedUnmarshalPayload = 6,
    FailedMarshal = 7,
}

impl Status {
    /// Protocol name of the status, as the engine spells it.
    pub fn name(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Submitted => "SUBMITTED",
            Status::Failure => "FAILURE",
            Status::UnknownModule => "UNKNOWN_MODULE",
            Status::UnknownMethod => "UNKNOWN_METHOD",
            Status::FailedUnmarshalCall => "FAILED_UNMARSHAL_CALL",
            Status::FailedUnmarshalPayload => "FAILED_UNMARSHAL_PAYLOAD",
            Status::FailedMarshal => "FAILED_MARSHAL",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A request routed to `module`/`method` on the remote side.
#[derive(Clone, PartialEq, Message)]
pub struct Call {
    #[prost(int32, tag = "1")]
    pub module: i32,
    #[prost(int32, tag = "2")]
    pub method: i32,
    /// Assigned by the client connection; never zero once sent.
    #[prost(int64, tag = "3")]
    pub sequence: i64,
    /// Module-specific payload, itself usually a protobuf message.
    #[prost(bytes = "vec", tag = "4")]
    pub body: Vec<u8>,
}

impl Call {
    pub fn new(module: i32, method: i32, body: impl Into<Vec<u8>>) -> Self {
        Self {
            module,
            method,
            sequence: 0,
            body: body.into(),
        }
    }
}

/// Reply to a [`Call`]. `body` is only meaningful on [`Status::Success`].
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(int64, tag = "1")]
    pub sequence: i64,
    #[prost(enumeration = "Status", tag = "2")]
    pub status: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub body: Vec<u8>,
}

impl Response {
    /// A bodyless response carrying only a status.
    pub fn with_status(sequence: i64, status: Status) -> Self {
        Self {
            sequence,
            status: status as i32,
            body: Vec::new(),
        }
    }

    pub fn success(sequence: i64, body: Vec<u8>) -> Self {
        Self {
            sequence,
            status: Status::Success as i32,
            body,
        }
    }
}

/// Serialize any envelope message.
pub fn marshal<M: Message>(msg: &M) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(msg.encoded_len());
    msg.encode(&mut buf)?;
    Ok(buf)
}

/// Parse a [`Call`] from received bytes.
pub fn unmarshal_call(bytes: &[u8]) -> Result<Call, DecodeError> {
    Call::decode(bytes)
}

/// Parse a [`Response`] from received bytes.
pub fn unmarshal_response(bytes: &[u8]) -> Result<Response, DecodeError> {
    Response::decode(bytes)
}
