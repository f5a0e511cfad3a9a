//! Command-line interface definition for google-mcp
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for serving tools and managing the stored credential.

use clap::{Parser, Subcommand};

/// google-mcp - Google Workspace tools for AI agents
///
/// Serves Gmail, Drive, Calendar, Sheets, and Docs tools over stdio and
/// authorizes them with a locally stored OAuth2 credential.
#[derive(Parser, Debug, Clone)]
#[command(name = "google-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for google-mcp
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve tools over stdio
    Serve {
        /// Override the authorization portal port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the interactive authorization flow and store the credential
    Auth {
        /// Override the authorization portal port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Delete the stored credential
    Logout,

    /// Show the stored credential's expiry and scopes
    Status,

    /// List registered tools and the scopes they require
    Tools,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The command to run, with `serve` as the default.
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Serve { port: None })
    }

    /// Listener port given on the command line, if any.
    pub fn port_override(&self) -> Option<u16> {
        match self.command {
            Some(Commands::Serve { port }) | Some(Commands::Auth { port }) => port,
            _ => None,
        }
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            command: None,
        }
    }
}
