//! Diagnostic module hosted by `drpc-ctl serve`.

use std::fmt;

use serde::Serialize;

use drpc::{Method, Module, ModuleError, Session};

pub const METHOD_ECHO: i32 = 1;
pub const METHOD_WHOAMI: i32 = 2;

/// Method 1 returns the body unchanged; method 2 returns the caller's
/// credentials as JSON.
pub struct EchoModule {
    id: i32,
}

impl EchoModule {
    pub fn new(id: i32) -> Self {
        Self { id }
    }
}

#[derive(Serialize)]
struct Whoami {
    session: u64,
    pid: Option<i32>,
    uid: Option<u32>,
    gid: Option<u32>,
}

impl fmt::Display for EchoModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "echo({})", self.id)
    }
}

impl Module for EchoModule {
    fn id(&self) -> i32 {
        self.id
    }

    fn method(&self, id: i32) -> Result<Method, ModuleError> {
        match id {
            METHOD_ECHO => Ok(Method::new(self.id, id, "echo")),
            METHOD_WHOAMI => Ok(Method::new(self.id, id, "whoami")),
            _ => Err(ModuleError::UnknownMethod {
                module: self.id,
                method: id,
            }),
        }
    }

    fn handle_call(
        &self,
        session: &Session,
        method: &Method,
        body: &[u8],
    ) -> Result<Vec<u8>, ModuleError> {
        match method.id() {
            METHOD_ECHO => Ok(body.to_vec()),
            METHOD_WHOAMI => {
                let peer = session.peer();
                let who = Whoami {
                    session: session.id(),
                    pid: peer.map(|p| p.pid),
                    uid: peer.map(|p| p.uid),
                    gid: peer.map(|p| p.gid),
                };
                Ok(serde_json::to_vec(&who).map_err(anyhow::Error::from)?)
            }
            other => Err(ModuleError::UnknownMethod {
                module: self.id,
                method: other,
            }),
        }
    }
}
