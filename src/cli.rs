//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Archive community-group posts and their media.
///
/// Archiver reads extracted posts, fetches every attached file it can, keeps
/// the rest as links, and records progress so interrupted runs resume.
#[derive(Parser, Debug)]
#[command(name = "archiver")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process extracted units into the archive
    Run(RunArgs),
    /// Print the manifest summary for a collection
    Status(StatusArgs),
}

#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    /// Collection identifier (names the manifest file)
    #[arg(long)]
    pub collection: String,

    /// JSON file holding an array of extracted units
    #[arg(long)]
    pub units: PathBuf,

    /// JSON file holding an array of {"name", "url"} avatars to fetch
    #[arg(long)]
    pub avatars: Option<PathBuf>,

    /// Archive root (overrides the config file)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Optional JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum concurrent direct fetches per unit (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum attempts per direct fetch, including the first (1-20)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,
}

#[derive(ClapArgs, Debug)]
pub struct StatusArgs {
    /// Collection identifier
    #[arg(long)]
    pub collection: String,

    /// Archive root (overrides the config file)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Optional JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}
