use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::gtf::GtfModel;

/// Arguments for `cellmtx build-index`.
#[derive(Parser, Debug)]
#[command(about = "Parse a gene-structure file and report contig/gene/transcript counts")]
pub struct BuildIndexArgs {
    /// Gene-structure (GTF) file, optionally gzip-compressed
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Restrict to {gene, transcript, exon, CDS, 5UTR, 3UTR} and skip attribute capture
    #[arg(long = "lite", default_value_t = false)]
    pub lite: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

pub fn run(args: &BuildIndexArgs) -> Result<()> {
    let model = GtfModel::read(&args.input, args.lite)?;
    let Some(model) = model else {
        bail!(
            "no contigs loaded from {}; treat as a fatal annotation error",
            args.input.display()
        );
    };

    println!("contigs\t{}", model.contig_count());
    println!("genes\t{}", model.gene_count());
    println!("transcripts\t{}", model.transcript_count());

    if args.verbose {
        log::info!(
            "built annotation index from {}: {} contig(s), {} gene(s), {} transcript(s)",
            args.input.display(),
            model.contig_count(),
            model.gene_count(),
            model.transcript_count()
        );
    }

    Ok(())
}
