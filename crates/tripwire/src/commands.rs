use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tripwire", version)]
#[command(about = "Trap documents for assignment integrity checks", long_about = None)]
pub struct Cli {
    /// Configuration file (JSON). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute the trap set between an original and a suggested text
    Diff {
        original: PathBuf,
        suggested: PathBuf,
    },
    /// Ask the configured suggestion service for a rewrite and diff it
    Suggest { original: PathBuf },
    /// Encode a trap document from an original text and a trap set
    Encode {
        original: PathBuf,
        /// Trap set as produced by `diff` or `suggest`
        modifications: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the extractable text of a document
    Extract {
        file: PathBuf,
        /// Print the visible layer instead (trap documents only)
        #[arg(long)]
        visible: bool,
    },
    /// Score a submission against a trap set
    Score {
        submission: PathBuf,
        modifications: PathBuf,
    },
    /// Check a document against its recorded SHA-256
    Verify { file: PathBuf, hash: String },
    /// Print the instructions to configure the interview agent with
    InterviewPrompt,
}
