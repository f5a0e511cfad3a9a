//! google-mcp - Google Workspace tools for AI agents
//!
//! This library implements an MCP server that exposes Gmail, Drive,
//! Calendar, Sheets, and Docs operations as tools, together with the OAuth2
//! credential lifecycle those tools depend on.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Credential storage, refresh, and interactive authorization
//! - `tools`: Tool registry, argument validation, and the Google handlers
//! - `server`: JSON-RPC transport, dispatcher, and runtime loop
//! - `config`: Configuration management and validation
//! - `error`: Error types, the failure taxonomy, and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Subcommand handlers
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use google_mcp::commands::Services;
//! use google_mcp::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let services = Services::build(config)?;
//!     google_mcp::commands::serve::run_server(services).await
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod tools;

// Re-export commonly used types
pub use auth::{Credential, CredentialManager, CredentialStore};
pub use config::Config;
pub use error::{ErrorKind, GoogleMcpError, Result};
pub use server::{DispatchRuntime, Dispatcher};
pub use tools::{ToolDescriptor, ToolRegistry};
