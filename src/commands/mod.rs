/*!
Command handlers for the CLI

This module wires the library components together and exposes one handler
per subcommand:

- `serve`  -- run the MCP server on stdio (default)
- `auth`   -- interactive authorization and sign-out
- `status` -- summary of the stored credential
- `tools`  -- listing of registered tools
*/

use std::sync::Arc;

use crate::auth::{CredentialManager, CredentialStore, OAuthAuthorizer, TokenClient};
use crate::config::Config;
use crate::error::Result;
use crate::tools::google::default_registry;
use crate::tools::ToolRegistry;

pub mod status;
pub mod tools;

/// The long-lived components shared by every command.
#[derive(Debug)]
pub struct Services {
    /// Effective configuration
    pub config: Config,
    /// Frozen tool table
    pub registry: Arc<ToolRegistry>,
    /// Credential persistence
    pub store: Arc<CredentialStore>,
    /// Interactive authorization
    pub authorizer: Arc<OAuthAuthorizer>,
    /// Credential lifecycle
    pub manager: Arc<CredentialManager>,
}

impl Services {
    /// Builds the tool registry and the credential stack from configuration.
    ///
    /// The authorizer requests the union of every tool's scopes so that one
    /// consent covers the whole registry.
    ///
    /// # Errors
    ///
    /// Returns an error if no OAuth client is configured or if tool
    /// registration fails.
    pub fn build(config: Config) -> Result<Self> {
        let registry = Arc::new(default_registry(&config.google)?);
        let store = Arc::new(CredentialStore::from_config(&config.auth));
        let token_client = TokenClient::new(
            config.auth.token_endpoint.clone(),
            config.auth.client_credentials()?,
        );
        let authorizer = Arc::new(OAuthAuthorizer::new(
            &config.auth,
            token_client.clone(),
            Arc::clone(&store),
            registry.required_scopes(),
        ));
        let manager = Arc::new(CredentialManager::new(
            &config.auth,
            Arc::clone(&store),
            token_client,
            authorizer.clone(),
        ));

        tracing::debug!(
            tools = registry.len(),
            ephemeral_store = store.is_ephemeral(),
            "Services built"
        );

        Ok(Self {
            config,
            registry,
            store,
            authorizer,
            manager,
        })
    }
}

// Serve command handler
pub mod serve {
    //! Runs the MCP server on stdin/stdout until input ends or Ctrl-C.

    use super::*;
    use crate::server::{DispatchRuntime, Dispatcher, StdioTransport, Transport};
    use tokio_util::sync::CancellationToken;

    /// Serve MCP requests over stdio
    ///
    /// # Arguments
    ///
    /// * `services` - Components built by [`Services::build`]
    pub async fn run_server(services: Services) -> Result<()> {
        let dispatcher = Arc::new(
            Dispatcher::new(
                Arc::clone(&services.registry),
                Arc::clone(&services.manager),
                services.config.server.call_timeout(),
            )
            .with_max_concurrent_calls(services.config.server.max_concurrent_requests),
        );
        let runtime = DispatchRuntime::new(dispatcher);
        let transport: Arc<dyn Transport> = Arc::new(StdioTransport::stdio());

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl-C");
                signal.cancel();
            }
        });

        runtime.run(transport, shutdown).await
    }
}

// Auth command handlers
pub mod auth {
    //! Interactive authorization and sign-out.

    use super::*;
    use crate::auth::Authorizer;
    use colored::Colorize;

    /// Run the interactive authorization flow and persist the result
    ///
    /// Always starts a new session, even when a valid credential exists.
    pub async fn authenticate(services: Services) -> Result<()> {
        tracing::info!("Starting interactive authorization");

        match services.authorizer.authorize().await {
            Ok(credential) => {
                println!(
                    "{} ({} scopes, expires {})",
                    "Authorization successful".green(),
                    credential.scopes.len(),
                    credential.expiry.format("%Y-%m-%d %H:%M UTC")
                );
                if services.store.is_ephemeral() {
                    println!(
                        "{}",
                        "Inline credential configured: the new credential was not written to disk."
                            .yellow()
                    );
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("{} {:#}", "Authorization failed:".red(), e);
                Err(e)
            }
        }
    }

    /// Delete the stored credential
    pub async fn logout(services: Services) -> Result<()> {
        services.manager.sign_out().await?;
        println!("{}", "Signed out; stored credential removed.".green());
        Ok(())
    }
}
