//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use harvester_core::{FilterKind, Granularity, KeyField};

/// Harvest bibliographic metadata and merge dumps with updates.
///
/// Harvests paginated API resources in resumable date chunks, flattens them
/// into deduplicated record streams, and merges a baseline dump with an
/// incremental update so every identifier appears once, in its freshest version.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/harvester/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest a date range in calendar-aligned chunks
    Harvest(HarvestArgs),
    /// Harvest an unfiltered resource (e.g. members, funders) into one file
    HarvestGeneric(HarvestGenericArgs),
    /// Flatten chunk artifacts into one deduplicated record stream
    Normalize(NormalizeArgs),
    /// Merge a dump and an update, keeping the freshest record per identifier
    Merge(MergeArgs),
    /// Write the indicator rows (sequence, provenance, key) of two populations
    Indicators(IndicatorsArgs),
}

/// API connection flags shared by harvest commands.
#[derive(Args, Debug, Clone, Default)]
pub struct ApiArgs {
    /// API base URL, e.g. https://api.crossref.org
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Items per page (1-1000)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub rows: Option<u32>,

    /// Response cache directory (default: <tmp>/.urlcache)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// First day of the range (inclusive), YYYY-MM-DD
    #[arg(long)]
    pub begin: NaiveDate,

    /// End of the range (exclusive), YYYY-MM-DD
    #[arg(long)]
    pub end: NaiveDate,

    /// Chunk size: day, week or month
    #[arg(long)]
    pub granularity: Option<Granularity>,

    /// Date field to filter on: deposit, update, index, ...
    #[arg(long)]
    pub filter: Option<FilterKind>,

    /// Chunks harvested concurrently (1-32)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Directory for chunk artifacts
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub api: ApiArgs,
}

#[derive(Args, Debug)]
pub struct HarvestGenericArgs {
    /// Resource path below the endpoint, e.g. members
    #[arg(long)]
    pub kind: String,

    /// Output file (.ldj, or .ldj.gz for gzip)
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub api: ApiArgs,
}

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Chunk artifacts, oldest first
    #[arg(required_unless_present = "chunk_dir", conflicts_with = "chunk_dir")]
    pub chunks: Vec<PathBuf>,

    /// Read every .ldj artifact in this directory, in name (date) order
    #[arg(long, value_name = "DIR")]
    pub chunk_dir: Option<PathBuf>,

    /// Output file (.ldj, or .ldj.gz for gzip)
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Identifier field (top-level name, or JSON pointer starting with /)
    #[arg(long)]
    pub key_field: Option<KeyField>,
}

/// Dump and update populations shared by merge commands.
#[derive(Args, Debug)]
pub struct PopulationArgs {
    /// Baseline population (.ldj or .ldj.gz)
    #[arg(long)]
    pub dump: PathBuf,

    /// Incremental population (.ldj or .ldj.gz)
    #[arg(long)]
    pub update: PathBuf,

    /// Identifier field (top-level name, or JSON pointer starting with /)
    #[arg(long)]
    pub key_field: Option<KeyField>,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    #[command(flatten)]
    pub populations: PopulationArgs,

    /// Merged output (.ldj, or .ldj.gz for gzip)
    #[arg(short = 'o', long)]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct IndicatorsArgs {
    #[command(flatten)]
    pub populations: PopulationArgs,

    /// TSV output file
    #[arg(short = 'o', long)]
    pub output: PathBuf,
}
