//! Gene-structure model (§3 "Gene-structure record `G`", §4.4).
//!
//! Grounded on PISA's `gtf.c`: `parse_str` (line + attribute parsing), `gtf_push`
//! (contig → gene → transcript → sub-feature normalization, synthetic parent creation),
//! `gtf_sort` (children sort + start/end propagation) and `gtf_build_index`. The
//! original's heap of `struct gtf*` linked by raw pointers is replaced with an owned
//! tree (`Vec<GtfRecord>` nesting) addressed by plain indices — lookups that the
//! original resolves via pointer-valued dicts (`dict_query_value(G->gene_id, ...)`) are
//! resolved here via `gene_lookup`/`transcript_lookup` maps from interned id to
//! `(contig, gene[, transcript])` index paths.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use rustc_hash::FxHashMap;

use crate::error::CellmtxError;
use crate::interner::Interner;
use crate::interval::{Interval, IntervalTree};

use super::attr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Gene,
    Transcript,
    Exon,
    Cds,
    Utr5,
    Utr3,
    Other,
}

impl FeatureKind {
    fn parse(s: &str) -> Self {
        match s {
            "gene" => FeatureKind::Gene,
            "transcript" | "mRNA" => FeatureKind::Transcript,
            "exon" => FeatureKind::Exon,
            "CDS" => FeatureKind::Cds,
            "5UTR" | "five_prime_utr" | "five_prime_UTR" => FeatureKind::Utr5,
            "3UTR" | "three_prime_utr" | "three_prime_UTR" => FeatureKind::Utr3,
            _ => FeatureKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Plus,
    Minus,
}

#[derive(Debug, Clone)]
pub struct GtfRecord {
    pub seqname: u32,
    pub source: u32,
    pub kind: FeatureKind,
    pub start: u32,
    pub end: u32,
    pub strand: Strand,
    pub gene_id: Option<u32>,
    pub gene_name: Option<u32>,
    pub transcript_id: Option<u32>,
    pub attributes: Vec<(u32, String)>,
    pub children: Vec<GtfRecord>,
}

impl GtfRecord {
    fn placeholder(seqname: u32, source: u32) -> Self {
        GtfRecord {
            seqname,
            source,
            kind: FeatureKind::Other,
            start: u32::MAX,
            end: 0,
            strand: Strand::Plus,
            gene_id: None,
            gene_name: None,
            transcript_id: None,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct RawRecord {
    seqname: u32,
    source: u32,
    kind: FeatureKind,
    start: u32,
    end: u32,
    strand: Strand,
    gene_id: Option<u32>,
    gene_name: Option<u32>,
    transcript_id: Option<u32>,
    attributes: Vec<(u32, String)>,
}

impl RawRecord {
    fn into_record(self) -> GtfRecord {
        GtfRecord {
            seqname: self.seqname,
            source: self.source,
            kind: self.kind,
            start: self.start,
            end: self.end,
            strand: self.strand,
            gene_id: self.gene_id,
            gene_name: self.gene_name,
            transcript_id: self.transcript_id,
            attributes: self.attributes,
            children: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Contig {
    #[allow(dead_code)]
    name_id: u32,
    genes: Vec<GtfRecord>,
    index: Option<IntervalTree>,
}

/// The full gene-structure annotation loaded from one file.
#[derive(Debug)]
pub struct GtfModel {
    pub names: Interner<()>,
    pub sources: Interner<()>,
    pub gene_ids: Interner<()>,
    pub gene_names: Interner<()>,
    pub transcript_ids: Interner<()>,
    pub attr_keys: Interner<()>,
    contigs: Vec<Contig>,
    contig_index: FxHashMap<u32, usize>,
    gene_lookup: FxHashMap<u32, (usize, usize)>,
    transcript_lookup: FxHashMap<u32, (usize, usize, usize)>,
}

impl GtfModel {
    fn new() -> Self {
        GtfModel {
            names: Interner::new(),
            sources: Interner::new(),
            gene_ids: Interner::new(),
            gene_names: Interner::new(),
            transcript_ids: Interner::new(),
            attr_keys: Interner::new(),
            contigs: Vec::new(),
            contig_index: FxHashMap::default(),
            gene_lookup: FxHashMap::default(),
            transcript_lookup: FxHashMap::default(),
        }
    }

    /// Load and normalize a gene-structure file. `lite` restricts accepted feature
    /// types to `{gene, transcript, exon, CDS, 5UTR, 3UTR}` and skips capturing
    /// unrecognized attribute keys. Returns `Ok(None)` when the file yields zero
    /// contigs (not a fatal error — the caller decides whether that's acceptable).
    pub fn read(path: &Path, lite: bool) -> Result<Option<Self>, CellmtxError> {
        let reader = open_reader(path)?;
        let mut model = GtfModel::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| CellmtxError::io(path, e))?;
            if line.is_empty() {
                log::warn!("line {} is empty, skip", lineno + 1);
                continue;
            }
            if line.starts_with('#') {
                continue;
            }
            model.parse_and_insert(&line, lite)?;
        }

        if model.contigs.is_empty() {
            return Ok(None);
        }

        model.build_index();
        Ok(Some(model))
    }

    fn parse_and_insert(&mut self, line: &str, lite: bool) -> Result<(), CellmtxError> {
        let fields: Vec<&str> = line.splitn(9, '\t').collect();
        if fields.len() != 9 {
            return Err(CellmtxError::Format(format!(
                "expected 9 tab-separated fields, got {}: {}",
                fields.len(),
                line
            )));
        }

        let kind = FeatureKind::parse(fields[2]);
        if lite && kind == FeatureKind::Other {
            return Ok(());
        }

        let seqname = self.names.push(fields[0]);
        let source = self.sources.push(fields[1]);
        let start: u32 = fields[3]
            .parse()
            .map_err(|_| CellmtxError::Format(format!("bad start coordinate: {}", fields[3])))?;
        let end: u32 = fields[4]
            .parse()
            .map_err(|_| CellmtxError::Format(format!("bad end coordinate: {}", fields[4])))?;
        let strand = if fields[6].starts_with('-') {
            Strand::Minus
        } else {
            Strand::Plus
        };

        let (pairs, n_empty) = attr::tokenize(fields[8]);
        if n_empty > 0 {
            log::warn!("{} empty attribute key(s) on {}:{}-{}", n_empty, fields[0], start, end);
        }

        let mut gene_id = None;
        let mut gene_name = None;
        let mut transcript_id = None;
        let mut attributes = Vec::new();
        for pair in pairs {
            match pair.key.as_str() {
                "gene_id" => gene_id = Some(self.gene_ids.push(&pair.value)),
                "gene_name" | "gene" => gene_name = Some(self.gene_names.push(&pair.value)),
                "transcript_id" => transcript_id = Some(self.transcript_ids.push(&pair.value)),
                _ if !lite => {
                    let key_id = self.attr_keys.push(&pair.key);
                    attributes.push((key_id, pair.value));
                }
                _ => {}
            }
        }

        if gene_id.is_none() && gene_name.is_none() {
            log::warn!(
                "record {}:{:?}:{}-{} has no gene_id and no gene_name, skip",
                fields[0], kind, start, end
            );
            return Ok(());
        }
        if gene_id.is_none() {
            let name = self.gene_names.name(gene_name.unwrap()).to_string();
            log::warn!(
                "record {}:{:?}:{}-{} has no gene_id, using gene_name instead",
                fields[0], kind, start, end
            );
            gene_id = Some(self.gene_ids.push(&name));
        }
        if gene_name.is_none() {
            let name = self.gene_ids.name(gene_id.unwrap()).to_string();
            log::warn!(
                "record {}:{:?}:{}-{} has no gene_name, using gene_id instead",
                fields[0], kind, start, end
            );
            gene_name = Some(self.gene_names.push(&name));
        }

        let contig_idx = match self.contig_index.get(&seqname) {
            Some(&idx) => idx,
            None => {
                let idx = self.contigs.len();
                self.contigs.push(Contig {
                    name_id: seqname,
                    genes: Vec::new(),
                    index: None,
                });
                self.contig_index.insert(seqname, idx);
                idx
            }
        };

        let raw = RawRecord {
            seqname,
            source,
            kind,
            start,
            end,
            strand,
            gene_id,
            gene_name,
            transcript_id,
            attributes,
        };
        self.insert(contig_idx, raw)
    }

    fn insert(&mut self, contig_idx: usize, rec: RawRecord) -> Result<(), CellmtxError> {
        let gene_id = rec.gene_id.expect("gene_id resolved before insert");

        let gene_idx = match self.gene_lookup.get(&gene_id).copied() {
            Some((_, g)) => {
                if rec.kind == FeatureKind::Gene {
                    log::warn!("duplicated gene record? {}", self.gene_ids.name(gene_id));
                    return Ok(());
                }
                g
            }
            None => {
                if rec.kind == FeatureKind::Gene {
                    let g = self.contigs[contig_idx].genes.len();
                    self.contigs[contig_idx].genes.push(rec.clone().into_record());
                    self.gene_lookup.insert(gene_id, (contig_idx, g));
                    return Ok(());
                }
                let mut gene_rec = GtfRecord::placeholder(rec.seqname, rec.source);
                gene_rec.kind = FeatureKind::Gene;
                let g = self.contigs[contig_idx].genes.len();
                self.contigs[contig_idx].genes.push(gene_rec);
                self.gene_lookup.insert(gene_id, (contig_idx, g));
                g
            }
        };

        {
            let gene = &mut self.contigs[contig_idx].genes[gene_idx];
            if gene.gene_id.is_none() {
                gene.gene_id = Some(gene_id);
            }
            if gene.gene_name.is_none() {
                gene.gene_name = rec.gene_name;
            }
        }

        let transcript_id = rec.transcript_id.ok_or_else(|| {
            CellmtxError::Format(format!(
                "no transcript_id found for {:?} record on {}:{}-{}",
                rec.kind,
                self.names.name(rec.seqname),
                rec.start,
                rec.end
            ))
        })?;

        let tx_idx = match self.transcript_lookup.get(&transcript_id).copied() {
            Some((_, _, t)) => {
                if rec.kind == FeatureKind::Transcript {
                    log::warn!(
                        "duplicated transcript record? {}",
                        self.transcript_ids.name(transcript_id)
                    );
                    return Ok(());
                }
                t
            }
            None => {
                if rec.kind == FeatureKind::Transcript {
                    let t = self.contigs[contig_idx].genes[gene_idx].children.len();
                    self.contigs[contig_idx].genes[gene_idx]
                        .children
                        .push(rec.clone().into_record());
                    self.transcript_lookup.insert(transcript_id, (contig_idx, gene_idx, t));
                    return Ok(());
                }
                let mut tx_rec = GtfRecord::placeholder(rec.seqname, rec.source);
                tx_rec.kind = FeatureKind::Transcript;
                let t = self.contigs[contig_idx].genes[gene_idx].children.len();
                self.contigs[contig_idx].genes[gene_idx].children.push(tx_rec);
                self.transcript_lookup.insert(transcript_id, (contig_idx, gene_idx, t));
                t
            }
        };

        {
            let tx = &mut self.contigs[contig_idx].genes[gene_idx].children[tx_idx];
            if tx.gene_id.is_none() {
                tx.gene_id = Some(gene_id);
            }
            if tx.gene_name.is_none() {
                tx.gene_name = rec.gene_name;
            }
            if tx.transcript_id.is_none() {
                tx.transcript_id = Some(transcript_id);
            }
        }

        let sub = rec.into_record();
        self.contigs[contig_idx].genes[gene_idx].children[tx_idx]
            .children
            .push(sub);
        Ok(())
    }

    fn build_index(&mut self) {
        for contig in &mut self.contigs {
            for gene in &mut contig.genes {
                sort_and_propagate(gene);
            }
            let intervals = contig
                .genes
                .iter()
                .enumerate()
                .map(|(i, g)| Interval {
                    start: g.start,
                    end: g.end,
                    gene_idx: i as u32,
                })
                .collect();
            contig.index = Some(IntervalTree::new(intervals));
        }
    }

    pub fn contig_count(&self) -> usize {
        self.contigs.len()
    }

    pub fn gene_count(&self) -> usize {
        self.contigs.iter().map(|c| c.genes.len()).sum()
    }

    pub fn transcript_count(&self) -> usize {
        self.contigs
            .iter()
            .flat_map(|c| c.genes.iter())
            .map(|g| g.children.len())
            .sum()
    }

    /// Gene records whose interval intersects `[start, end]` on `seqname`, sorted by
    /// `(start, end)`. `None` if the contig is unknown.
    pub fn query(&self, seqname: &str, start: u32, end: u32) -> Option<Vec<&GtfRecord>> {
        let seq_id = self.names.query(seqname)?;
        let &contig_idx = self.contig_index.get(&seq_id)?;
        let contig = &self.contigs[contig_idx];
        let tree = contig.index.as_ref()?;
        Some(
            tree.query(start, end)
                .into_iter()
                .map(|iv| &contig.genes[iv.gene_idx as usize])
                .collect(),
        )
    }
}

fn sort_and_propagate(rec: &mut GtfRecord) {
    for child in rec.children.iter_mut() {
        sort_and_propagate(child);
    }
    if rec.children.is_empty() {
        return;
    }
    rec.children.sort_by_key(|c| (c.seqname, c.start, c.end));
    let mut start = u32::MAX;
    let mut end = 0u32;
    for c in &rec.children {
        start = start.min(c.start);
        end = end.max(c.end);
    }
    rec.start = start;
    rec.end = end;
    debug_assert!(rec.start < rec.end);
}

fn open_reader(path: &Path) -> Result<Box<dyn BufRead>, CellmtxError> {
    let file = File::open(path).map_err(|e| CellmtxError::io(path, e))?;
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_gtf(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const SAMPLE: &str = concat!(
        "chr1\thavana\tgene\t100\t900\t.\t+\t.\tgene_id \"G1\"; gene_name \"Gene1\";\n",
        "chr1\thavana\ttranscript\t100\t900\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n",
        "chr1\thavana\texon\t100\t200\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n",
        "chr1\thavana\texon\t800\t900\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n",
    );

    #[test]
    fn parses_full_hierarchy_and_builds_index() {
        let f = write_gtf(SAMPLE);
        let model = GtfModel::read(f.path(), false).unwrap().unwrap();
        assert_eq!(model.contig_count(), 1);
        assert_eq!(model.gene_count(), 1);
        assert_eq!(model.transcript_count(), 1);

        let hits = model.query("chr1", 150, 150).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(model.gene_ids.name(hits[0].gene_id.unwrap()), "G1");
    }

    #[test]
    fn synthetic_gene_and_transcript_created_from_bare_exon() {
        let contents = "chr1\thavana\texon\t10\t20\t.\t+\t.\tgene_id \"G9\"; transcript_id \"T9\";\n";
        let f = write_gtf(contents);
        let model = GtfModel::read(f.path(), false).unwrap().unwrap();
        assert_eq!(model.gene_count(), 1);
        assert_eq!(model.transcript_count(), 1);
        let hits = model.query("chr1", 15, 15).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start, 10);
        assert_eq!(hits[0].end, 20);
    }

    #[test]
    fn missing_gene_id_falls_back_to_gene_name() {
        let contents = "chr1\thavana\tgene\t1\t10\t.\t+\t.\tgene_name \"OnlyName\";\n";
        let f = write_gtf(contents);
        let model = GtfModel::read(f.path(), false).unwrap().unwrap();
        assert_eq!(model.gene_count(), 1);
        assert_eq!(model.gene_ids.name(0), "OnlyName");
    }

    #[test]
    fn lite_mode_drops_unrecognized_types_and_attrs() {
        let contents = concat!(
            "chr1\thavana\tgene\t1\t100\t.\t+\t.\tgene_id \"G1\"; gene_name \"G1\"; note \"x\";\n",
            "chr1\thavana\tstart_codon\t1\t3\t.\t+\t.\tgene_id \"G1\";\n",
        );
        let f = write_gtf(contents);
        let model = GtfModel::read(f.path(), true).unwrap().unwrap();
        assert_eq!(model.gene_count(), 1);
        assert!(model.attr_keys.is_empty());
    }

    #[test]
    fn duplicate_gene_record_is_warned_and_dropped() {
        let contents = concat!(
            "chr1\thavana\tgene\t1\t100\t.\t+\t.\tgene_id \"G1\";\n",
            "chr1\thavana\tgene\t1\t200\t.\t+\t.\tgene_id \"G1\";\n",
        );
        let f = write_gtf(contents);
        let model = GtfModel::read(f.path(), false).unwrap().unwrap();
        assert_eq!(model.gene_count(), 1);
        let hits = model.query("chr1", 50, 50).unwrap();
        assert_eq!(hits[0].end, 100);
    }

    #[test]
    fn empty_file_returns_none() {
        let f = write_gtf("");
        assert!(GtfModel::read(f.path(), false).unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_fatal() {
        let f = write_gtf("chr1\tonly\tthree\n");
        assert!(GtfModel::read(f.path(), false).is_err());
    }
}
