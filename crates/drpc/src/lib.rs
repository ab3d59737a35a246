//! drpc — chunked protobuf RPC over Unix seqpacket sockets.
//!
//! The server side is a [`ModuleRegistry`] of [`Module`]s hosted by a
//! [`DomainSocketServer`]; the client side is a [`ClientConnection`].

pub mod client;
pub mod conn;
pub mod error;
pub mod module;
pub mod registry;
pub mod server;
pub mod transport;

pub use client::ClientConnection;
pub use conn::{PacketConn, PeerCredentials, SeqPacketConn};
pub use error::{DrpcError, Result};
pub use module::{Method, Module, ModuleError, Session};
pub use registry::ModuleRegistry;
pub use server::{DomainSocketServer, RunningServer};
pub use transport::{recv_message, send_message};

pub use drpc_core::{Call, Response, Status};
