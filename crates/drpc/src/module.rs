//! Module trait, the contract between the dispatcher and the services
//! an application exposes over dRPC.

use std::borrow::Cow;
use std::fmt;

use drpc_core::envelope::{DecodeError, Status};

use crate::conn::PeerCredentials;

/// Server-side view of one accepted connection, handed to every call.
#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    peer: Option<PeerCredentials>,
}

impl Session {
    pub fn new(id: u64, peer: Option<PeerCredentials>) -> Self {
        Self { id, peer }
    }

    /// Unique for the server's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The caller's pid/uid/gid, when the kernel reported them.
    pub fn peer(&self) -> Option<PeerCredentials> {
        self.peer
    }
}

/// A resolved method of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    module: i32,
    id: i32,
    name: Cow<'static, str>,
}

impl Method {
    pub fn new(module: i32, id: i32, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            module,
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn module(&self) -> i32 {
        self.module
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Failure reported by a module.
///
/// Each variant maps onto the [`Status`] the dispatcher puts in the
/// response; anything without a status of its own becomes `FAILURE`.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("module {module} has no method {method}")]
    UnknownMethod { module: i32, method: i32 },

    #[error("failed to unmarshal call payload: {0}")]
    UnmarshalPayload(#[from] DecodeError),

    #[error("{message}")]
    Status { status: Status, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ModuleError {
    /// A failure that should be reported with a specific status.
    pub fn with_status(status: Status, message: impl Into<String>) -> Self {
        ModuleError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            ModuleError::UnknownMethod { .. } => Status::UnknownMethod,
            ModuleError::UnmarshalPayload(_) => Status::FailedUnmarshalPayload,
            ModuleError::Status { status, .. } => *status,
            ModuleError::Other(_) => Status::Failure,
        }
    }
}

/// A namespace of dRPC methods, registered with the dispatcher under
/// [`Module::id`].
///
/// Handlers are synchronous and run on tokio's blocking pool, one call at a
/// time per session, so they may block without stalling other sessions.
/// Reply with `SUBMITTED` for work that completes later.
pub trait Module: Send + Sync + fmt::Display {
    /// Wire id of this module. Unique within a registry.
    fn id(&self) -> i32;

    /// Resolve a method id.
    fn method(&self, id: i32) -> Result<Method, ModuleError>;

    /// Handle one call. The returned bytes become the response body.
    fn handle_call(
        &self,
        session: &Session,
        method: &Method,
        body: &[u8],
    ) -> Result<Vec<u8>, ModuleError>;
}
