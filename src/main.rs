//! Warden CLI
//!
//! Runs the MCP server on stdio and inspects its configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_config::{paths, ConfigLoader, WardenConfig};
use warden_mcp::McpServer;

/// Warden - guarded container and VM administration over MCP
#[derive(Parser, Debug)]
#[command(name = "warden", version, author, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve MCP requests on stdin/stdout
    Serve,
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the configuration and report the file in use
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let loader = loader(cli.config);

    match cli.command {
        Commands::Serve => {
            let config = load(&loader)?;
            let server = McpServer::from_config(&config).context("Failed to start server")?;
            server.serve_stdio().await.context("MCP server failed")?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = load(&loader)?;
                print!("{}", config.to_toml()?);
            }
            ConfigCommands::Check => {
                let config = load(&loader)?;
                println!("{}: ok", loader.path().display());
                println!(
                    "  access: {} allow, {} deny pattern(s)",
                    config.access.allow.len(),
                    config.access.deny.len()
                );
                match &config.audit.path {
                    Some(path) => println!("  audit: {}", path.display()),
                    None => println!("  audit: disabled"),
                }
            }
        },
    }

    Ok(())
}

/// Explicit path, then the user file if present, then the system file
fn loader(explicit: Option<PathBuf>) -> ConfigLoader {
    if let Some(path) = explicit {
        return ConfigLoader::new(path).use_defaults(false);
    }
    match paths::user_config() {
        Some(path) if path.exists() => ConfigLoader::new(path),
        _ => ConfigLoader::system(),
    }
}

fn load(loader: &ConfigLoader) -> Result<WardenConfig> {
    let config = loader
        .load()
        .with_context(|| format!("Failed to load config from {}", loader.path().display()))?;
    info!(path = %loader.path().display(), "Configuration loaded");
    Ok(config)
}
