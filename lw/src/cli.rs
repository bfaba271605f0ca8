//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Loadwatch - loading-state coordination for the sentiment dashboard
#[derive(Parser)]
#[command(
    name = "lw",
    about = "Run sentiment dashboard requests under tracked loading operations",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Use the in-process simulated backend instead of HTTP
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a comment for sentiment analysis
    Submit {
        /// Stakeholder type (citizen, business, ngo, academic)
        #[arg(short, long, default_value = "citizen")]
        stakeholder: String,

        /// Comment text (1-300 characters)
        text: String,
    },

    /// List analyzed comments, newest first
    Comments {
        /// Number of comments to fetch
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,

        /// Number of comments to skip
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },

    /// Show the sentiment distribution and recent comments
    Dashboard,

    /// Generate a word cloud
    Wordcloud {
        /// Restrict to one sentiment (positive, neutral, negative)
        #[arg(short, long)]
        sentiment: Option<String>,

        /// Write the rendered word cloud to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check backend health
    Health,

    /// Drive a scripted session against the simulated backend
    Demo {
        /// Simulated latency per call
        #[arg(long)]
        latency_ms: Option<u64>,

        /// Probability in [0, 1] that a simulated call fails
        #[arg(long)]
        failure_rate: Option<f64>,

        /// Number of sample comments to submit
        #[arg(short = 'n', long, default_value = "6")]
        comments: usize,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for command results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Valid: text, json", s))
            }
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loadwatch")
        .join("logs")
        .join("loadwatch.log");
    debug!(?path, "get_log_path: returning path");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::parse_from(["lw", "--simulate", "submit", "-s", "ngo", "Clean rivers please"]);
        assert!(cli.simulate);
        match cli.command {
            Command::Submit { stakeholder, text } => {
                assert_eq!(stakeholder, "ngo");
                assert_eq!(text, "Clean rivers please");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_format_after_subcommand() {
        let cli = Cli::parse_from(["lw", "dashboard", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Dashboard));
    }

    #[test]
    fn test_log_path_location() {
        let path = get_log_path();
        assert!(path.ends_with("loadwatch/logs/loadwatch.log"));
    }
}
