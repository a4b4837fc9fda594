use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::count::record::RegionClass;
use crate::count::{CountConfig, CountingEngine, RecordStream};
use crate::interner::Interner;
use crate::mex;

use super::parse_tag;

/// Arguments for `cellmtx count`.
#[derive(Parser, Debug)]
#[command(about = "Build a feature x cell count matrix from aligned, annotated reads")]
pub struct CountArgs {
    /// Input BAM/SAM/CRAM file
    #[arg(short = 'i', long = "input", conflicts_with = "sample_list")]
    pub input: Option<PathBuf>,

    /// Sample list file, two tab-separated columns: path, alias
    #[arg(long = "sample-list")]
    pub sample_list: Option<PathBuf>,

    /// Output directory for MEX files
    #[arg(long = "outdir")]
    pub outdir: Option<PathBuf>,

    /// Filename prefix within --outdir
    #[arg(long = "prefix")]
    pub prefix: Option<String>,

    /// Legacy dense TSV output path (alternative to MEX)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Cell barcode whitelist (one per line); unknown barcodes are dropped
    #[arg(long = "whitelist")]
    pub whitelist: Option<PathBuf>,

    /// Aux tag carrying the cell barcode
    #[arg(long = "cell-tag", value_parser = parse_tag)]
    pub cell_tag: Option<[u8; 2]>,

    /// Use the input file's alias (from --sample-list) as the cell barcode
    #[arg(long = "file-barcode", default_value_t = false)]
    pub file_barcode: bool,

    /// Aux tag carrying the feature/gene id(s), required
    #[arg(long = "feature-tag", value_parser = parse_tag)]
    pub feature_tag: [u8; 2],

    /// Aux tag carrying the UMI; enables UMI dedup mode
    #[arg(long = "umi-tag", value_parser = parse_tag)]
    pub umi_tag: Option<[u8; 2]>,

    /// Aux tag carrying a single-character region-type classification
    #[arg(long = "region-type-tag", value_parser = parse_tag, default_value = "RE")]
    pub region_type_tag: [u8; 2],

    /// Comma-separated whitelist of region classes to accept (e.g. "E,N"); empty = accept all
    #[arg(long = "region-types")]
    pub region_types: Option<String>,

    /// Minimum mapping quality
    #[arg(long = "mapq", default_value_t = 20)]
    pub mapq_threshold: u8,

    /// Count reads flagged as PCR/optical duplicates
    #[arg(long = "use-dup", default_value_t = false)]
    pub use_dup: bool,

    /// Drop records whose feature tag lists more than one feature
    #[arg(long = "one-hit", default_value_t = false)]
    pub one_hit: bool,

    /// Split counts into spliced/unspliced for RNA velocity
    #[arg(long = "velocity", default_value_t = false)]
    pub velocity: bool,

    /// Number of decompression threads
    #[arg(short = 't', long = "threads", default_value_t = 4)]
    pub threads: usize,

    /// Enable verbose logging
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

impl CountArgs {
    fn to_config(&self) -> Result<CountConfig> {
        let region_types = match &self.region_types {
            Some(s) => s
                .split(',')
                .filter(|t| !t.is_empty())
                .map(|t| {
                    let byte = t.as_bytes().first().copied().ok_or_else(|| {
                        anyhow::anyhow!("empty region type in --region-types: {}", s)
                    })?;
                    Ok(RegionClass::from_byte(byte))
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let region_type_tag = if self.velocity || self.region_types.is_some() {
            Some(self.region_type_tag)
        } else {
            None
        };

        let config = CountConfig {
            cell_tag: self.cell_tag,
            feature_tag: self.feature_tag,
            umi_tag: self.umi_tag,
            region_type_tag,
            region_types,
            mapq_threshold: self.mapq_threshold,
            use_dup: self.use_dup,
            one_hit: self.one_hit,
            velocity: self.velocity,
            file_barcode: self.file_barcode,
        };
        config.validate()?;
        Ok(config)
    }
}

pub fn run(args: &CountArgs) -> Result<()> {
    if args.input.is_none() && args.sample_list.is_none() {
        bail!("one of --input or --sample-list is required");
    }
    if args.outdir.is_none() && args.output.is_none() {
        bail!("one of --outdir (MEX) or --output (legacy TSV) is required");
    }

    let config = args.to_config()?;

    let whitelist = match &args.whitelist {
        Some(path) => Some(Interner::read(path)?),
        None => None,
    };

    let mut engine = CountingEngine::new(config, whitelist);

    let mut n_kept = 0u64;
    let mut n_dropped = 0u64;

    if let Some(input) = &args.input {
        let mut stream = crate::count::bam::BamRecordStream::open(input, None, args.threads)?;
        ingest(&mut engine, &mut stream, &mut n_kept, &mut n_dropped)?;
    } else if let Some(list) = &args.sample_list {
        let mut stream = crate::count::bam::SampleListStream::open(list, args.threads)?;
        ingest(&mut engine, &mut stream, &mut n_kept, &mut n_dropped)?;
    }

    if args.verbose {
        log::info!("kept {} records, dropped {}", n_kept, n_dropped);
    }

    let stats = engine.finalize();
    log::info!(
        "n_total={} n_spliced={} n_unspliced={}",
        stats.n_total,
        stats.n_spliced,
        stats.n_unspliced
    );

    if stats.n_total == 0 {
        log::warn!("no annotated record found");
    }

    if let Some(outdir) = &args.outdir {
        mex::write_mex(&engine, &stats, outdir, args.prefix.as_deref(), args.velocity)?;
    } else if let Some(output) = &args.output {
        mex::write_legacy_tsv(&engine, output)?;
    }

    Ok(())
}

fn ingest<S: RecordStream>(
    engine: &mut CountingEngine,
    stream: &mut S,
    n_kept: &mut u64,
    n_dropped: &mut u64,
) -> Result<()> {
    loop {
        let alias = stream.current_file_alias().map(str::to_string);
        let Some(record) = stream.next_record()? else {
            break;
        };
        match engine.process_record(&record, alias.as_deref()) {
            crate::count::RecordOutcome::Kept => *n_kept += 1,
            crate::count::RecordOutcome::Dropped => *n_dropped += 1,
        }
    }
    Ok(())
}
