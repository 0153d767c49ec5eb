//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Download recordings from a WiFi dashcam.
///
/// Lists the device's collections, then pulls recordings into
/// `<output-dir>/<YYYY-MM-DD>/<filename>`, skipping files already on disk.
#[derive(Parser, Debug)]
#[command(name = "dashcam-downloader")]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Flags shared by every subcommand. Unset values fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Device base URL [default: http://192.168.0.1]
    #[arg(long, global = true)]
    pub device_url: Option<String>,

    /// Download root; recordings land in per-day directories beneath it
    #[arg(short = 'o', long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent transfers (1-16) [default: 3, or 2 with --mobile]
    #[arg(short = 'c', long, global = true, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Attempts per recording, including the first (1-10) [default: 3]
    #[arg(short = 'r', long, global = true, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: Option<u32>,

    /// Pause between attempts in milliseconds (max 60000) [default: 2000]
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub retry_delay_ms: Option<u64>,

    /// Use the constrained-host profile (lower default concurrency)
    #[arg(long, global = true)]
    pub mobile: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the collections the device exposes
    Collections,

    /// Print recording locators in a collection
    List(ListArgs),

    /// Download every recording in one or more collections
    Fetch(FetchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Collection name, e.g. `norm` or `emr`
    pub collection: String,

    /// First index (inclusive)
    #[arg(long, requires = "end")]
    pub start: Option<usize>,

    /// Last index (inclusive)
    #[arg(long, requires = "start")]
    pub end: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Collection names, e.g. `norm emr`
    #[arg(required = true)]
    pub collections: Vec<String>,

    /// Only the first N recordings of each collection
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,
}
