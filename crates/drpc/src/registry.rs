//! Routes incoming calls to the module registered for their module id.

use std::collections::HashMap;
use std::fmt;

use drpc_core::envelope::{self, Call, Response, Status};

use crate::error::{DrpcError, Result};
use crate::module::{Module, Session};

/// Maps module ids to modules and turns raw calls into raw responses.
///
/// Built during startup, then shared read-only with every session.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<i32, Box<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. A second module with the same id is a wiring bug
    /// and is rejected.
    pub fn register_module(&mut self, module: impl Module + 'static) -> Result<()> {
        let id = module.id();
        if self.modules.contains_key(&id) {
            return Err(DrpcError::DuplicateModule(id));
        }
        tracing::debug!(module = id, name = %module, "module registered");
        self.modules.insert(id, Box::new(module));
        Ok(())
    }

    pub fn get_module(&self, id: i32) -> Option<&dyn Module> {
        self.modules.get(&id).map(|m| m.as_ref())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Registered module ids, ascending.
    pub fn module_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.modules.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Decode a call, dispatch it, and encode the response.
    ///
    /// Every dispatch outcome becomes a response envelope; only encoding
    /// that envelope can fail.
    pub fn process_message(&self, session: &Session, raw_call: &[u8]) -> Result<Vec<u8>> {
        let response = self.dispatch(session, raw_call);
        Ok(envelope::marshal(&response)?)
    }

    fn dispatch(&self, session: &Session, raw_call: &[u8]) -> Response {
        let call: Call = match envelope::unmarshal_call(raw_call) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(session = session.id(), error = %e, "failed to unmarshal call");
                // The real sequence is unknowable from bytes we could not parse.
                return Response::with_status(-1, Status::FailedUnmarshalCall);
            }
        };

        let Some(module) = self.get_module(call.module) else {
            tracing::warn!(
                session = session.id(),
                module = call.module,
                sequence = call.sequence,
                "call for unknown module"
            );
            return Response::with_status(call.sequence, Status::UnknownModule);
        };

        let method = match module.method(call.method) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    session = session.id(),
                    module = %module,
                    method = call.method,
                    error = %e,
                    "call for unknown method"
                );
                return Response::with_status(call.sequence, Status::UnknownMethod);
            }
        };

        tracing::debug!(
            session = session.id(),
            module = %module,
            method = %method,
            sequence = call.sequence,
            body_len = call.body.len(),
            "dispatching call"
        );

        match module.handle_call(session, &method, &call.body) {
            Ok(body) => Response::success(call.sequence, body),
            Err(e) => {
                let status = e.status();
                tracing::warn!(
                    session = session.id(),
                    module = %module,
                    method = %method,
                    sequence = call.sequence,
                    %status,
                    error = %e,
                    "call failed"
                );
                Response::with_status(call.sequence, status)
            }
        }
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.module_ids())
            .finish()
    }
}
