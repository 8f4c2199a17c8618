#![forbid(unsafe_code)]

//! Operator tooling: provider secret vault management and offline ticket
//! analysis.
//!
//! ```text
//! ticketdefense vault <set|has|del|ls> [key_id]
//! ticketdefense analyze <FILE> [--image] [--no-ai] [--web-sources] [--pdf FILE] [--ics FILE]
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub mod analyze_cli;
pub mod vault_cli;

#[derive(Debug, Parser)]
#[command(name = "ticketdefense", version, about = "Traffic ticket defense tools")]
pub struct Cli {
    /// Log to stderr (filter with RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage provider secrets in the encrypted device vault
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
    /// Parse a ticket and print the defense analysis as JSON
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum VaultAction {
    /// Store a secret read from the terminal (hidden) or stdin
    Set { key_id: String },
    /// Print YES when the secret is stored
    Has { key_id: String },
    /// Remove a stored secret
    Del { key_id: String },
    /// List stored secret ids
    Ls,
}

#[derive(Debug, Clone, Args)]
pub struct AnalyzeArgs {
    /// Ticket text file, or a photo/scan of the ticket
    pub input: PathBuf,

    /// Treat the input as an image and run OCR (implied by image extensions)
    #[arg(long)]
    pub image: bool,

    /// Skip the Gemini call and use only the local strategy
    #[arg(long)]
    pub no_ai: bool,

    /// Let Gemini ground its answer with web search
    #[arg(long)]
    pub web_sources: bool,

    /// Write a printable case summary PDF
    #[arg(long, value_name = "FILE")]
    pub pdf: Option<PathBuf>,

    /// Write the court date as an .ics calendar event
    #[arg(long, value_name = "FILE")]
    pub ics: Option<PathBuf>,

    /// Tracking code to print on the PDF
    #[arg(long)]
    pub tracking_code: Option<String>,
}
