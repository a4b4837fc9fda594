//! CLI / configuration (§4.7).
//!
//! Grounded on the teacher's `main.rs` (top-level `Cli`/`Commands` derive, one
//! `run(&args) -> Result<()>` per subcommand) and `commands/depth.rs::DepthArgs` (shared
//! flag naming, verbose/thread-count conventions).

pub mod annotate_query;
pub mod build_index;
pub mod count;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cellmtx",
    version,
    about = concat!("cellmtx: single-cell count-matrix builder\nVersion: ", env!("CARGO_PKG_VERSION")),
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a feature x cell count matrix from aligned, annotated reads
    Count(count::CountArgs),

    /// Parse a gene-structure file and report contig/gene/transcript counts
    BuildIndex(build_index::BuildIndexArgs),

    /// Build the annotation index and answer overlap queries
    AnnotateQuery(annotate_query::AnnotateQueryArgs),
}

/// Dispatch a parsed [`Cli`] to its subcommand, mirroring the teacher's
/// `main.rs` match-on-`Commands` pattern.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Count(args) => count::run(args),
        Commands::BuildIndex(args) => build_index::run(args),
        Commands::AnnotateQuery(args) => annotate_query::run(args),
    }
}

/// Parse a two-character aux tag flag value (e.g. `CB`, `UB`).
pub(crate) fn parse_tag(s: &str) -> Result<[u8; 2], String> {
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return Err(format!("tag must be exactly 2 characters, got {:?}", s));
    }
    Ok([bytes[0], bytes[1]])
}
