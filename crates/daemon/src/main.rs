//! dirshare Daemon
//!
//! Shares a directory over HTTP.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use tracing_subscriber::EnvFilter;

/// dirshare - share a directory over HTTP.
#[derive(Parser, Debug)]
#[command(name = "dirshare")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the shared directory
    Serve {
        /// Directory to share (overrides config)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Address to listen on, e.g. 0.0.0.0:22010 (overrides config)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Serve HTTPS with a self-signed certificate
        #[arg(long)]
        tls: bool,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;

    // Apply environment variable overrides
    let overrides = config.apply_env_overrides();

    // Initialize tracing
    init_tracing(if cli.verbose {
        "debug"
    } else {
        config.daemon.log_level.as_str()
    });
    for (key, value) in overrides {
        tracing::info!("Overriding {} from environment: {}", key, value);
    }

    match cli.command {
        Commands::Serve { root, bind, tls } => {
            apply_serve_overrides(&mut config, root, bind, tls);
            config.validate()?;

            tracing::info!("Using config file: {:?}", config_path);
            daemon::serve(config).await?;
        }

        Commands::Config(ConfigCommands::Show) => {
            config.validate()?;
            print!("{}", redacted(&config).to_toml()?);
        }

        Commands::Config(ConfigCommands::Init { force }) => {
            init_config(&config_path, force)?;
            println!("Wrote default configuration to {}", config_path.display());
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Command-line flags win over the file and the environment.
fn apply_serve_overrides(
    config: &mut Config,
    root: Option<PathBuf>,
    bind: Option<String>,
    tls: bool,
) {
    if let Some(root) = root {
        config.file.root = root;
    }
    if let Some(bind) = bind {
        config.http.bind = bind;
    }
    if tls {
        config.http.tls = true;
    }
}

fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if !shown.security.password.is_empty() {
        shown.security.password = "***".to_string();
    }
    shown
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite",
            path.display()
        );
    }
    Config::default().save(path)
}
