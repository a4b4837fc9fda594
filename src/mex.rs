//! Matrix serializer (§4.5).
//!
//! Grounded on PISA's `bam_count.c::write_outs` for the MEX triplet/header format and
//! chunked-write-then-flush discipline, and on the teacher's
//! `utils/common.rs::write_gff_output` for the buffered-writer-to-a-path idiom. Gzip
//! framing is `flate2` rather than upstream's threaded BGZF writer — the ambient
//! equivalent this crate's dependency stack reaches for (§1 Non-goals).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::count::{CountingEngine, FinalizeStats};
use crate::error::CellmtxError;

/// Flush the line buffer once it grows past this size (§4.5: "~100 MB").
const FLUSH_THRESHOLD: usize = 100 * 1024 * 1024;

struct GzLineWriter {
    encoder: GzEncoder<File>,
    buf: String,
}

impl GzLineWriter {
    fn create(path: &Path) -> Result<Self, CellmtxError> {
        let file = File::create(path).map_err(|e| CellmtxError::io(path, e))?;
        Ok(GzLineWriter {
            encoder: GzEncoder::new(file, Compression::default()),
            buf: String::new(),
        })
    }

    fn push(&mut self, line: &str) -> Result<(), CellmtxError> {
        self.buf.push_str(line);
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.flush_buf()?;
        }
        Ok(())
    }

    fn flush_buf(&mut self) -> Result<(), CellmtxError> {
        if !self.buf.is_empty() {
            self.encoder
                .write_all(self.buf.as_bytes())
                .map_err(|e| CellmtxError::Format(format!("writing gzip output: {}", e)))?;
            self.buf.clear();
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), CellmtxError> {
        self.flush_buf()?;
        self.encoder
            .finish()
            .map_err(|e| CellmtxError::Format(format!("closing gzip output: {}", e)))?;
        Ok(())
    }
}

fn output_path(outdir: &Path, prefix: Option<&str>, name: &str) -> PathBuf {
    match prefix {
        Some(p) => outdir.join(format!("{p}{name}")),
        None => outdir.join(name),
    }
}

fn write_labels_gz(path: &Path, labels: impl Iterator<Item = String>) -> Result<(), CellmtxError> {
    let mut writer = GzLineWriter::create(path)?;
    for label in labels {
        writer.push(&label)?;
        writer.push("\n")?;
    }
    writer.finish()
}

fn mtx_header(n_features: usize, n_barcodes: usize, nnz: u64) -> String {
    format!(
        "%%MatrixMarket matrix coordinate integer general\n% Generated by {} {}\n{}\t{}\t{}\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        n_features,
        n_barcodes,
        nnz
    )
}

/// Write `barcodes.tsv.gz`, `features.tsv.gz`, and either `matrix.mtx.gz` or the
/// `spliced.mtx.gz`/`unspliced.mtx.gz` pair (when `velocity` is set) under `outdir`.
///
/// `stats` is `CountingEngine::finalize`'s return value. Per SPEC_FULL.md's "Open
/// questions, decided" (following `bam_count.c`'s `n_record`/`n_record2`/`n_record1`
/// exactly), the header `nnz` field is the *sum of emitted values*
/// (`stats.n_total`/`stats.n_spliced`/`stats.n_unspliced`), not the number of
/// (feature, cell) entries written to the body.
pub fn write_mex(
    engine: &CountingEngine,
    stats: &FinalizeStats,
    outdir: &Path,
    prefix: Option<&str>,
    velocity: bool,
) -> Result<(), CellmtxError> {
    std::fs::create_dir_all(outdir).map_err(|e| CellmtxError::io(outdir, e))?;

    write_labels_gz(
        &output_path(outdir, prefix, "barcodes.tsv.gz"),
        engine.barcodes.iter_ids().map(|id| engine.barcodes.name(id).to_string()),
    )?;
    write_labels_gz(
        &output_path(outdir, prefix, "features.tsv.gz"),
        engine.features.iter_ids().map(|id| engine.features.name(id).to_string()),
    )?;

    let n_features = engine.features.size();
    let n_barcodes = engine.barcodes.size();

    if velocity {
        write_velocity_matrix(
            engine,
            &output_path(outdir, prefix, "spliced.mtx.gz"),
            &output_path(outdir, prefix, "unspliced.mtx.gz"),
            n_features,
            n_barcodes,
            stats.n_spliced,
            stats.n_unspliced,
        )
    } else {
        write_matrix(
            engine,
            &output_path(outdir, prefix, "matrix.mtx.gz"),
            n_features,
            n_barcodes,
            stats.n_total,
        )
    }
}

fn write_matrix(
    engine: &CountingEngine,
    path: &Path,
    n_features: usize,
    n_barcodes: usize,
    nnz: u64,
) -> Result<(), CellmtxError> {
    let mut writer = GzLineWriter::create(path)?;
    writer.push(&mtx_header(n_features, n_barcodes, nnz))?;
    for (row, feature_id) in engine.features.iter_ids().enumerate() {
        let Some(pool) = engine.features.query_value(feature_id) else {
            continue;
        };
        for (cell_id, cell) in pool.iter() {
            if cell.count > 0 {
                writer.push(&format!("{}\t{}\t{}\n", row + 1, cell_id + 1, cell.count))?;
            }
        }
    }
    writer.finish()
}

fn write_velocity_matrix(
    engine: &CountingEngine,
    spliced_path: &Path,
    unspliced_path: &Path,
    n_features: usize,
    n_barcodes: usize,
    spliced_nnz: u64,
    unspliced_nnz: u64,
) -> Result<(), CellmtxError> {
    let mut spliced_writer = GzLineWriter::create(spliced_path)?;
    let mut unspliced_writer = GzLineWriter::create(unspliced_path)?;
    spliced_writer.push(&mtx_header(n_features, n_barcodes, spliced_nnz))?;
    unspliced_writer.push(&mtx_header(n_features, n_barcodes, unspliced_nnz))?;

    for (row, feature_id) in engine.features.iter_ids().enumerate() {
        let Some(pool) = engine.features.query_value(feature_id) else {
            continue;
        };
        for (cell_id, cell) in pool.iter() {
            let spliced = cell.count.saturating_sub(cell.unspliced);
            if spliced > 0 {
                spliced_writer.push(&format!("{}\t{}\t{}\n", row + 1, cell_id + 1, spliced))?;
            }
            if cell.unspliced > 0 {
                unspliced_writer.push(&format!("{}\t{}\t{}\n", row + 1, cell_id + 1, cell.unspliced))?;
            }
        }
    }

    spliced_writer.finish()?;
    unspliced_writer.finish()
}

/// Legacy dense TSV path (§4.5): `ID\t<barcode1>\t…` header, one row per feature,
/// zero-filled counts in barcode order.
pub fn write_legacy_tsv(engine: &CountingEngine, path: &Path) -> Result<(), CellmtxError> {
    let file = File::create(path).map_err(|e| CellmtxError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    write!(writer, "ID").map_err(|e| CellmtxError::io(path, e))?;
    for bc_id in engine.barcodes.iter_ids() {
        write!(writer, "\t{}", engine.barcodes.name(bc_id)).map_err(|e| CellmtxError::io(path, e))?;
    }
    writeln!(writer).map_err(|e| CellmtxError::io(path, e))?;

    let n_barcodes = engine.barcodes.size();
    for feature_id in engine.features.iter_ids() {
        write!(writer, "{}", engine.features.name(feature_id)).map_err(|e| CellmtxError::io(path, e))?;
        let mut row = vec![0u32; n_barcodes];
        if let Some(pool) = engine.features.query_value(feature_id) {
            for (cell_id, cell) in pool.iter() {
                row[cell_id as usize] = cell.count;
            }
        }
        for v in row {
            write!(writer, "\t{}", v).map_err(|e| CellmtxError::io(path, e))?;
        }
        writeln!(writer).map_err(|e| CellmtxError::io(path, e))?;
    }

    writer.flush().map_err(|e| CellmtxError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::count::record::AlignmentRecord;
    use crate::count::CountConfig;
    use flate2::read::GzDecoder;
    use std::collections::HashMap;
    use std::io::Read;

    struct FakeRecord {
        aux: HashMap<[u8; 2], String>,
    }

    impl FakeRecord {
        fn new(cell: &str, feature: &str) -> Self {
            let mut aux = HashMap::new();
            aux.insert(*b"CB", cell.to_string());
            aux.insert(*b"GX", feature.to_string());
            FakeRecord { aux }
        }
    }

    impl AlignmentRecord for FakeRecord {
        fn tid(&self) -> i32 {
            0
        }
        fn qual(&self) -> u8 {
            60
        }
        fn flag(&self) -> u16 {
            0
        }
        fn aux_str(&self, tag: &[u8; 2]) -> Option<String> {
            self.aux.get(tag).cloned()
        }
        fn aux_char(&self, _tag: &[u8; 2]) -> Option<u8> {
            None
        }
    }

    struct VelocityFakeRecord {
        aux: HashMap<[u8; 2], String>,
        region: u8,
    }

    impl VelocityFakeRecord {
        fn new(cell: &str, feature: &str, region: u8) -> Self {
            let mut aux = HashMap::new();
            aux.insert(*b"CB", cell.to_string());
            aux.insert(*b"GX", feature.to_string());
            VelocityFakeRecord { aux, region }
        }
    }

    impl AlignmentRecord for VelocityFakeRecord {
        fn tid(&self) -> i32 {
            0
        }
        fn qual(&self) -> u8 {
            60
        }
        fn flag(&self) -> u16 {
            0
        }
        fn aux_str(&self, tag: &[u8; 2]) -> Option<String> {
            self.aux.get(tag).cloned()
        }
        fn aux_char(&self, tag: &[u8; 2]) -> Option<u8> {
            if tag == b"RE" {
                Some(self.region)
            } else {
                None
            }
        }
    }

    fn read_gz(path: &Path) -> String {
        let file = File::open(path).unwrap();
        let mut decoder = GzDecoder::new(file);
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        out
    }

    /// S1 — basic count, serialized end to end.
    #[test]
    fn s1_matrix_body_matches_expected_triplets() {
        let config = CountConfig {
            cell_tag: Some(*b"CB"),
            feature_tag: *b"GX",
            umi_tag: None,
            region_type_tag: None,
            region_types: Vec::new(),
            mapq_threshold: 0,
            use_dup: true,
            one_hit: false,
            velocity: false,
            file_barcode: false,
        };
        let mut engine = CountingEngine::new(config, None);
        for _ in 0..3 {
            engine.process_record(&FakeRecord::new("A", "G1"), None);
        }
        engine.process_record(&FakeRecord::new("B", "G1"), None);
        let stats = engine.finalize();

        let dir = tempfile::tempdir().unwrap();
        write_mex(&engine, &stats, dir.path(), None, false).unwrap();

        let body = read_gz(&dir.path().join("matrix.mtx.gz"));
        let mut lines = body.lines();
        assert_eq!(lines.next().unwrap(), "%%MatrixMarket matrix coordinate integer general");
        assert!(lines.next().unwrap().starts_with("% Generated by"));
        // Header nnz is n_record (= n_total = 4), not the 2 (feature, cell) body rows —
        // see CountingEngine::finalize and bam_count.c's n_record/n_record1/n_record2.
        assert_eq!(lines.next().unwrap(), "1\t2\t4");
        assert_eq!(lines.next().unwrap(), "1\t1\t3");
        assert_eq!(lines.next().unwrap(), "1\t2\t1");
        assert!(lines.next().is_none());
    }

    /// Velocity, non-UMI: one (G1, A) entry accumulating 3 spliced-classified and 2
    /// unspliced-classified records. Header nnz must be the record-count sum
    /// (`n_spliced=3`, `n_unspliced=2`), not the number of qualifying body rows (1 each).
    #[test]
    fn velocity_header_nnz_is_record_count_sum_not_row_count() {
        let config = CountConfig {
            cell_tag: Some(*b"CB"),
            feature_tag: *b"GX",
            umi_tag: None,
            region_type_tag: Some(*b"RE"),
            region_types: Vec::new(),
            mapq_threshold: 0,
            use_dup: true,
            one_hit: false,
            velocity: true,
            file_barcode: false,
        };
        let mut engine = CountingEngine::new(config, None);
        for _ in 0..3 {
            engine.process_record(&VelocityFakeRecord::new("A", "G1", b'E'), None);
        }
        for _ in 0..2 {
            engine.process_record(&VelocityFakeRecord::new("A", "G1", b'N'), None);
        }
        let stats = engine.finalize();
        assert_eq!(stats.n_total, 5);
        assert_eq!(stats.n_unspliced, 2);
        assert_eq!(stats.n_spliced, 3);

        let dir = tempfile::tempdir().unwrap();
        write_mex(&engine, &stats, dir.path(), None, true).unwrap();

        let spliced = read_gz(&dir.path().join("spliced.mtx.gz"));
        let mut lines = spliced.lines();
        lines.next(); // %%MatrixMarket...
        lines.next(); // % Generated by...
        assert_eq!(lines.next().unwrap(), "1\t1\t3");
        assert_eq!(lines.next().unwrap(), "1\t1\t3");
        assert!(lines.next().is_none());

        let unspliced = read_gz(&dir.path().join("unspliced.mtx.gz"));
        let mut lines = unspliced.lines();
        lines.next();
        lines.next();
        assert_eq!(lines.next().unwrap(), "1\t1\t2");
        assert_eq!(lines.next().unwrap(), "1\t1\t2");
        assert!(lines.next().is_none());
    }

    #[test]
    fn legacy_tsv_is_dense_and_zero_filled() {
        let config = CountConfig {
            cell_tag: Some(*b"CB"),
            feature_tag: *b"GX",
            umi_tag: None,
            region_type_tag: None,
            region_types: Vec::new(),
            mapq_threshold: 0,
            use_dup: true,
            one_hit: false,
            velocity: false,
            file_barcode: false,
        };
        let mut engine = CountingEngine::new(config, None);
        engine.process_record(&FakeRecord::new("A", "G1"), None);
        engine.process_record(&FakeRecord::new("B", "G2"), None);
        engine.finalize();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.tsv");
        write_legacy_tsv(&engine, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "ID\tA\tB");
        assert_eq!(lines.next().unwrap(), "G1\t1\t0");
        assert_eq!(lines.next().unwrap(), "G2\t0\t1");
    }
}
