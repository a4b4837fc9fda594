use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::gtf::GtfModel;

/// Arguments for `cellmtx annotate-query`.
#[derive(Parser, Debug)]
#[command(about = "Build the annotation index and answer overlap queries")]
pub struct AnnotateQueryArgs {
    /// Gene-structure (GTF) file, optionally gzip-compressed
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// One `seqname:start-end` region to query; if omitted, regions are read one per
    /// line from stdin
    #[arg(long = "region")]
    pub region: Option<String>,

    /// Restrict to {gene, transcript, exon, CDS, 5UTR, 3UTR}
    #[arg(long = "lite", default_value_t = false)]
    pub lite: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

pub fn run(args: &AnnotateQueryArgs) -> Result<()> {
    let model = GtfModel::read(&args.input, args.lite)?;
    let Some(model) = model else {
        bail!(
            "no contigs loaded from {}; treat as a fatal annotation error",
            args.input.display()
        );
    };
    if args.verbose {
        log::info!(
            "loaded {} contig(s), {} gene(s) from {}",
            model.contig_count(),
            model.gene_count(),
            args.input.display()
        );
    }

    match &args.region {
        Some(region) => answer_one(&model, region)?,
        None => {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = line.context("reading region from stdin")?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                answer_one(&model, line)?;
            }
        }
    }

    Ok(())
}

fn answer_one(model: &GtfModel, region: &str) -> Result<()> {
    let (seqname, start, end) = parse_region(region)?;
    match model.query(seqname, start, end) {
        Some(hits) if !hits.is_empty() => {
            for hit in hits {
                let gene_id = hit.gene_id.map(|id| model.gene_ids.name(id)).unwrap_or("");
                let gene_name = hit.gene_name.map(|id| model.gene_names.name(id)).unwrap_or("");
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    region, hit.start, hit.end, gene_id, gene_name
                );
            }
        }
        _ => println!("{}\t.\t.\t.\t.", region),
    }
    Ok(())
}

fn parse_region(region: &str) -> Result<(&str, u32, u32)> {
    let (seqname, range) = region
        .split_once(':')
        .with_context(|| format!("region {:?} is not seqname:start-end", region))?;
    let (start, end) = range
        .split_once('-')
        .with_context(|| format!("region {:?} is not seqname:start-end", region))?;
    let start: u32 = start
        .parse()
        .with_context(|| format!("bad start coordinate in region {:?}", region))?;
    let end: u32 = end
        .parse()
        .with_context(|| format!("bad end coordinate in region {:?}", region))?;
    Ok((seqname, start, end))
}
