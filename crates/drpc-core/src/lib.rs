//! drpc-core — wire format, chunk codec, envelope, and configuration.
//! No I/O lives here; the `drpc` crate drives these over sockets.

pub mod chunk;
pub mod config;
pub mod envelope;
pub mod wire;

pub use envelope::{Call, Response, Status};
