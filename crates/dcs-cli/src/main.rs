//! dcs - Operator tool for device communication servers
//!
//! Lists configured servers, looks devices up by unique ID, and sends
//! commands to devices through a server's command port or SMS gateway.

mod commands;
mod config;
mod output;
mod setup;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::SendArgs;
use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};
use crate::setup::LoadArgs;

/// Exit status when a command could not be delivered
const EXIT_SEND_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "dcs")]
#[command(author, version, about = "Device Communication Server tool")]
#[command(propagate_version = true)]
struct Cli {
    /// DCS configuration file
    #[arg(short, long, env = "DCS_CONFIG")]
    config: Option<PathBuf>,

    /// Device store file
    #[arg(short, long, env = "DCS_DEVICES")]
    devices: Option<PathBuf>,

    /// Settings file (default: <config dir>/dcs/config.toml)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Load only this server ("*" loads all)
    #[arg(long)]
    only_server: Option<String>,

    /// Offset added to every configured port
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    port_offset: i32,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured servers
    List {
        /// Include servers whose artifact is not deployed
        #[arg(long)]
        all: bool,
    },

    /// Find devices by unique ID (IMEI, modem ID, ...)
    Lookup {
        /// Unique ID without server prefix
        unique_id: String,
    },

    /// Send a command to a device through a server
    Send {
        /// Server name
        #[arg(long)]
        server: String,

        /// Account ID
        #[arg(long)]
        account: String,

        /// Device ID
        #[arg(long)]
        device: String,

        /// Command type
        #[arg(long)]
        cmd_type: String,

        /// Command name
        #[arg(long, default_value = "")]
        cmd_name: String,

        /// Command argument (repeatable)
        #[arg(long = "arg")]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load settings file
    let settings = if let Some(path) = &cli.settings {
        Config::load_from(path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with settings
    let merged = settings.merge_with_args(cli.config.as_deref(), cli.devices.as_deref(), cli.no_color);

    // Create output context
    let ctx = OutputContext::new(cli.output, merged.no_color, cli.quiet);

    let load_args = LoadArgs {
        only_server: cli.only_server.clone(),
        port_offset: cli.port_offset,
    };

    // Execute command
    match &cli.command {
        Commands::List { all } => {
            let registry = setup::load_registry(&merged, &load_args, &ctx)?;
            commands::list(&registry, *all, &ctx).await?;
        }

        Commands::Lookup { unique_id } => {
            let registry = setup::load_registry(&merged, &load_args, &ctx)?;
            let store = setup::load_store(&merged)?;
            commands::lookup(&registry, store.as_ref(), unique_id, &ctx).await?;
        }

        Commands::Send {
            server,
            account,
            device,
            cmd_type,
            cmd_name,
            args,
        } => {
            let registry = setup::load_registry(&merged, &load_args, &ctx)?;
            let store = setup::load_store(&merged)?;
            let dispatcher = setup::build_dispatcher(&merged, registry, store)?;
            let send_args = SendArgs {
                server: server.clone(),
                account: account.clone(),
                device: device.clone(),
                cmd_type: cmd_type.clone(),
                cmd_name: cmd_name.clone(),
                args: args.clone(),
            };
            let result = commands::send(&dispatcher, &send_args, &ctx).await?;
            if !result.is_success() {
                return Ok(ExitCode::from(EXIT_SEND_FAILED));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
