pub mod commands;
mod reply;

pub use reply::ConsoleNotifier;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "adcrawl")]
#[command(about = "Search the ad library for domains, one browser at a time", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/adcrawl/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory reports are written to
    #[arg(short, long, default_value = ".", global = true)]
    pub output: PathBuf,

    /// Override how long a registry entry may live (e.g., "1h", "30m")
    #[arg(long, global = true)]
    pub stale_after: Option<String>,

    /// Show the browser window
    #[arg(long, global = true)]
    pub headed: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search one or more domains and wait for every report
    Crawl {
        /// Domains, URLs or markdown links to search
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Read chat-style commands from stdin
    Shell {
        /// Conversation key the commands are issued under
        #[arg(short, long, default_value = "console")]
        key: String,
    },
}
