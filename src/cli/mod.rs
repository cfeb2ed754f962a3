//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragline",
    version,
    author = "neur0map",
    about = "Retrieve grounded context for questions over a private document collection",
    long_about = "Ragline rewrites a question into several search queries, searches a vector store \
                  with each, removes duplicate passages, rejoins split headings and, when too many \
                  passages remain, asks a language model to pick the best ones."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragline/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve context passages and sources for a question
    Retrieve {
        /// Question to answer
        question: String,

        /// Maximum passages in the final context
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Passages fetched per rewritten query (defaults to --top-k, then config)
        #[arg(long)]
        search_top_k: Option<usize>,

        /// Profile to use (e.g., "local")
        #[arg(short, long)]
        profile: Option<String>,

        /// Single-query search without rewriting or reranking
        #[arg(long)]
        basic: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
