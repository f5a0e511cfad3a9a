//! OAuth2 credential lifecycle
//!
//! - [`credential`] -- the persisted credential record
//! - [`store`] -- ordered credential sources and atomic persistence
//! - [`token_client`] -- authorization-code and refresh-token grants
//! - [`authorizer`] -- the interactive flow and its session
//! - [`portal`] -- the loopback HTTP pages used by the interactive flow
//! - [`manager`] -- the facade handing valid credentials to tool calls

pub mod authorizer;
pub mod credential;
pub mod manager;
pub mod portal;
pub mod store;
pub mod token_client;

pub use authorizer::{AuthorizationSession, Authorizer, OAuthAuthorizer, SessionStatus};
pub use credential::Credential;
pub use manager::CredentialManager;
pub use store::{CredentialSource, CredentialStore};
pub use token_client::TokenClient;
