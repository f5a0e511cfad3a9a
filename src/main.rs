//! google-mcp - Google Workspace tools over MCP
//!
#![doc = "google-mcp - Google Workspace tools over MCP"]
#![doc = "Main entry point for the google-mcp server and its maintenance commands."]

use anyhow::Result;

use google_mcp::cli::{Cli, Commands};
use google_mcp::commands::{self, Services};
use google_mcp::config::Config;
use google_mcp::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_logging(cli.verbose, cli.json_logs)?;

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    let command = cli.command();

    // Listing tools needs neither an OAuth client nor a credential.
    if command == Commands::Tools {
        let registry = google_mcp::tools::google::default_registry(&config.google)?;
        return commands::tools::list_tools(&registry);
    }

    let services = Services::build(config)?;

    match command {
        Commands::Serve { .. } => {
            tracing::info!("Starting MCP server on stdio");
            commands::serve::run_server(services).await
        }
        Commands::Auth { .. } => {
            tracing::info!("Starting authorization");
            commands::auth::authenticate(services).await
        }
        Commands::Logout => commands::auth::logout(services).await,
        Commands::Status => commands::status::show_status(services).await,
        Commands::Tools => commands::tools::list_tools(&services.registry),
    }
}
