//! vndb - command-line client for the VNDB TCP API
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vndb_client::{Client, ConnectionConfig};
use vndb_protocol::LoginRequest;

/// Client name sent on login unless `--client` is given.
const CLIENT_NAME: &str = "vndb-cli";

#[derive(Parser)]
#[command(name = "vndb")]
#[command(about = "Command-line client for the VNDB TCP API")]
#[command(version)]
struct Cli {
    /// Server host (defaults to api.vndb.org)
    #[arg(long)]
    host: Option<String>,

    /// Server port (defaults to 19535)
    #[arg(short, long)]
    port: Option<u16>,

    // ===== TLS Options =====
    /// Connect without TLS (local test servers only)
    #[arg(long)]
    no_tls: bool,

    /// Path to CA certificate for server verification
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    // ===== Login Options =====
    /// Account name
    #[arg(short, long, env = "VNDB_USERNAME")]
    username: Option<String>,

    /// Account password
    #[arg(long, env = "VNDB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Client name sent on login
    #[arg(long)]
    client: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive REPL
    Repl,

    /// Show database statistics
    Dbstats,

    /// Fetch items of a database type
    Get {
        /// Database type (vn, release, producer, character, votelist, ...)
        #[arg(value_name = "TYPE")]
        kind: String,

        /// Comma-separated flags, e.g. basic,details
        flags: String,

        /// Filter expression, e.g. "id = 17"
        filters: String,

        /// Options JSON (or @file.json to read from file)
        #[arg(short, long)]
        options: Option<String>,
    },

    /// Add, change or remove a list entry
    Set {
        /// List type (votelist, vnlist, wishlist, ...)
        #[arg(value_name = "TYPE")]
        kind: String,

        /// Item ID
        id: u64,

        /// Fields JSON (omit to remove the entry)
        fields: Option<String>,
    },

    /// Send a raw message and print the raw reply
    Raw {
        /// Message, e.g. 'get vn basic (id = 17)'
        message: String,
    },
}

impl Cli {
    /// Layers command-line options over the file/env configuration.
    fn config(&self) -> Result<ConnectionConfig, vndb_client::ConfigError> {
        let mut config = ConnectionConfig::load()?;

        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.no_tls {
            config = config.with_plaintext();
        }
        if let Some(ref path) = self.ca_cert {
            config.tls.ca_cert_path = Some(path.clone());
        }
        config.tls.insecure |= self.insecure;

        let mut login = config
            .login
            .take()
            .unwrap_or_else(|| LoginRequest::new(CLIENT_NAME, env!("CARGO_PKG_VERSION")));
        if let Some(ref client) = self.client {
            login.client = client.clone();
        }
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            login = login.with_credentials(username, password);
        }
        Ok(config.with_login(login))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = cli.config().map_err(|e| {
        eprintln!("{}: {}", "Config error".red(), e);
        e
    })?;

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(&config).await?;
        }
        Some(cmd) => {
            let client = Client::connect(&config).await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            match commands::execute(&client, cmd).await {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            client.close().await?;
        }
    }

    Ok(())
}
