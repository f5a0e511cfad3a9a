//! MCP server over a line transport
//!
//! - [`protocol`] -- JSON-RPC and MCP wire types
//! - [`transport`] -- stdio and in-memory transports
//! - [`dispatcher`] -- per-message routing and the tool-call pipeline
//! - [`runtime`] -- the concurrent read/dispatch/respond loop

pub mod dispatcher;
pub mod protocol;
pub mod runtime;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use runtime::DispatchRuntime;
pub use transport::{ChannelTransport, StdioTransport, Transport};
