use clap::{Parser, Subcommand};

/// Seichi - anime pilgrimage location database updater
#[derive(Parser)]
#[command(name = "seichi")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fold recently updated anime from the scrape feed into the store
    #[command(alias = "d")]
    Daily {
        /// Maximum number of feed entries to check
        #[arg(long)]
        max_anime: Option<usize>,

        /// Path to the scrape feed file
        #[arg(long)]
        feed: Option<String>,
    },

    /// Scan the upstream API id range and import everything new
    #[command(alias = "m")]
    Monthly {
        /// First external id to probe (inclusive)
        #[arg(long)]
        start_id: Option<i64>,

        /// Last external id to probe (inclusive)
        #[arg(long)]
        end_id: Option<i64>,

        /// Number of concurrent probe requests
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Rebuild both index.json copies from the entity folders
    Reindex,

    /// Create a default config file in the current directory
    Init,
}
