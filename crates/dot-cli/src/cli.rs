//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// dotsync - Keep a home directory in line with a source directory
#[derive(Parser, Debug)]
#[command(name = "dotsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (.toml, .json, .yaml)
    #[arg(short, long, global = true, env = "DOTSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Source directory
    #[arg(short = 'S', long, global = true)]
    pub source: Option<PathBuf>,

    /// Destination directory
    #[arg(short = 'D', long, global = true)]
    pub destination: Option<PathBuf>,

    /// Umask applied to default permissions, in octal
    #[arg(long, global = true, value_parser = parse_octal)]
    pub umask: Option<u32>,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Update the destination directory to match the source
    Apply {
        /// Report whether anything would change without changing it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Continue with other entries after a failure
        #[arg(short, long)]
        keep_going: bool,
    },

    /// Print the changes apply would make as a git-style diff
    Diff,

    /// Inspect or edit the persistent state
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

/// State subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum StateAction {
    /// Print every bucket, key and value as JSON
    Dump,

    /// Remove one key from a bucket
    Delete {
        /// Bucket name
        bucket: String,

        /// Key within the bucket
        key: String,
    },
}

/// Parse an octal permission mask such as `022` or `0o077`.
pub fn parse_octal(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    match u32::from_str_radix(digits, 8) {
        Ok(value) if value <= 0o777 => Ok(value),
        Ok(_) => Err(format!("{s} is larger than 0777")),
        Err(e) => Err(format!("{s} is not an octal number: {e}")),
    }
}
