//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use rahyab_core::protocol::{SearchLevel, SourceFeedback};

/// Strategic intelligence analyst in the terminal
///
/// Streams a multi-phase analysis from a hosted model, shows progress as it
/// arrives and prints the final strategic briefing.
#[derive(Parser, Debug)]
#[command(name = "rahyab")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Direct query (alternative to 'analyze' subcommand)
    #[arg(num_args = 1..)]
    pub query: Vec<String>,

    /// Print version information
    #[arg(long)]
    pub version: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a strategic analysis
    Analyze {
        /// The question to analyze
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        #[command(flatten)]
        options: AnalyzeOptions,
    },

    /// Manage saved briefings
    History {
        #[command(subcommand)]
        cmd: HistoryCommand,
    },

    /// Mark a source as useful or not useful (repeat to clear)
    Feedback {
        /// Source URL
        url: String,

        /// useful | not-useful
        #[arg(value_parser = parse_feedback)]
        verdict: SourceFeedback,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        cmd: Option<ConfigCommand>,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Analysis depth: 1, 2 or 3
    #[arg(short, long, value_parser = parse_level)]
    pub level: Option<SearchLevel>,

    /// Treat the query as a JSON configuration to analyze
    #[arg(long = "json-input")]
    pub json_input: bool,

    /// Print the briefing as JSON
    #[arg(long)]
    pub json: bool,

    /// Save the briefing to history
    #[arg(short, long)]
    pub save: bool,

    /// Ask follow-up questions after the briefing
    #[arg(short, long)]
    pub chat: bool,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// List saved briefings
    List,
    /// Show a saved briefing
    Show {
        /// Briefing ID
        id: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved briefing
    Delete {
        /// Briefing ID
        id: String,
    },
    /// Delete all saved briefings
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn parse_level(value: &str) -> Result<SearchLevel, String> {
    value.parse()
}

fn parse_feedback(value: &str) -> Result<SourceFeedback, String> {
    value.parse()
}
