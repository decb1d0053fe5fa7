//! livemix CLI: drive the compositor and replay buffer from a terminal.
//!
//! Usage:
//!   livemix demo [OPTIONS]      Compose synthetic sources and save a clip
//!   livemix layout <FILE>       Resolve a layout file against a canvas
//!   livemix config [--save]     Show the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use livemix_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "livemix",
    about = "Live multi-source compositor with an instant-replay buffer",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose synthetic sources for a while, then save the last few seconds
    Demo {
        /// How long to render (seconds)
        #[arg(long, default_value = "5.0")]
        secs: f64,

        /// Length of the saved clip (seconds)
        #[arg(long, default_value = "3.0")]
        clip_secs: f64,

        /// Output directory (defaults to a timestamped folder in the clips dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Canvas width
        #[arg(long, default_value = "320")]
        width: u32,

        /// Canvas height
        #[arg(long, default_value = "180")]
        height: u32,

        /// Target FPS (defaults to the configured canvas rate)
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Resolve a JSON layout and print the resulting rectangles
    Layout {
        /// Path to the layout JSON file
        file: PathBuf,

        /// Canvas width (defaults to the configured canvas)
        #[arg(long)]
        width: Option<u32>,

        /// Canvas height (defaults to the configured canvas)
        #[arg(long)]
        height: Option<u32>,
    },

    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    // Dropping the guard flushes the log file, so keep it until exit.
    let _log_guard = livemix_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Demo {
            secs,
            clip_secs,
            output,
            width,
            height,
            fps,
        } => {
            let options = commands::demo::DemoOptions {
                secs,
                clip_secs,
                output,
                width,
                height,
                fps: fps.unwrap_or(config.canvas.fps),
            };
            commands::demo::run(&config, options).await
        }
        Commands::Layout {
            file,
            width,
            height,
        } => commands::layout::run(
            file,
            width.unwrap_or(config.canvas.width),
            height.unwrap_or(config.canvas.height),
        ),
        Commands::Config { save } => commands::config::run(&config, save),
    }
}
