//! weston-displayconfig - query and switch HDMI display modes
//!
//! Entry point for the CLI binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use weston_displayconfig::config::{Config, CONFIG_ENV, TIMEOUT_ENV};
use weston_displayconfig::logging::{init_logging, verbosity_level};
use weston_displayconfig::{DisplayConfigClient, ModeRequest};

/// Command-line arguments for weston-displayconfig
#[derive(Parser, Debug)]
#[command(name = "weston-displayconfig")]
#[command(version, about = "Query and switch HDMI display modes", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Wayland socket name or absolute path
    #[arg(short, long)]
    pub display: Option<String>,

    /// Request timeout in milliseconds (0 waits indefinitely)
    #[arg(long, env = TIMEOUT_ENV)]
    pub timeout_ms: Option<u64>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List tracked outputs
    Outputs {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Query and print the HDMI mode list
    Modes {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Switch every output to a mode, e.g. 1920x1080@60000 or 1920x1080@50000i
    Set {
        /// Mode as WIDTHxHEIGHT@MILLIHERTZ, trailing `i` for interlaced
        mode: ModeRequest,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let mut config = config.with_overrides(args.display.clone(), args.timeout_ms);
    if let Some(format) = &args.log_format {
        config.logging.format = format.clone();
    }
    config.logging.level = verbosity_level(args.verbose, &config.logging.level).to_string();
    config.validate()?;

    init_logging(&config.logging.level, &config.logging.format)?;
    debug!("Config: {:?}", config);

    let mut client =
        DisplayConfigClient::connect(&config).context("Failed to initialize display configuration")?;

    match args.command {
        Command::Outputs { json } => {
            let outputs = client.outputs();
            if json {
                println!("{}", serde_json::to_string_pretty(&outputs)?);
            } else {
                for output in &outputs {
                    let g = &output.geometry;
                    println!(
                        "{}  {}x{}@{}mHz at {},{}  scale {}  {}",
                        output.id,
                        g.width,
                        g.height,
                        g.refresh,
                        g.offset_x,
                        g.offset_y,
                        g.scale,
                        g.description()
                    );
                }
            }
        }
        Command::Modes { json } => {
            let modes = client.query_modes()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&client.mode_list())?);
            } else {
                for (index, mode) in modes.modes().iter().enumerate() {
                    println!("{:3}  {}", index, mode);
                }
            }
        }
        Command::Set { mode } => {
            client.query_modes()?;
            let applied = client
                .set_mode(&mode)
                .with_context(|| format!("Failed to set {}", mode))?;
            info!("Switched to {}", applied);
            println!("{}", applied);
        }
    }

    client.close();
    Ok(())
}
