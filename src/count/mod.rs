//! Counting engine (§4.3).
//!
//! Grounded on PISA's `bam_count.c`: `count_matrix_core` (per-record filter +
//! accumulate) and `update_counts` (UMI-pool collapse at finalize). The original's
//! `struct counts` union of `{p, up}` (UMI mode) vs `{count, unspliced}` (tallied mode)
//! is kept as two `Option` fields on [`CountCell`] rather than a real union — nothing
//! here needs the memory layout, only the behavior.

pub mod bam;
pub mod record;

use crate::dna_pool::{DedupSet, IndexMap};
use crate::error::CellmtxError;
use crate::interner::Interner;

pub use record::{AlignmentRecord, RecordStream, RegionClass};

/// Immutable, constructed once by the CLI layer and threaded through the engine (§4.3,
/// §9 design note: replaces the original's global mutable `struct args`).
#[derive(Debug, Clone)]
pub struct CountConfig {
    pub cell_tag: Option<[u8; 2]>,
    pub feature_tag: [u8; 2],
    pub umi_tag: Option<[u8; 2]>,
    pub region_type_tag: Option<[u8; 2]>,
    pub region_types: Vec<RegionClass>,
    pub mapq_threshold: u8,
    pub use_dup: bool,
    pub one_hit: bool,
    pub velocity: bool,
    pub file_barcode: bool,
}

impl CountConfig {
    /// Pre-flight checks raised before any I/O begins (§4.7, §7).
    pub fn validate(&self) -> Result<(), CellmtxError> {
        if self.velocity && self.region_type_tag.is_none() {
            return Err(CellmtxError::Config(
                "velocity mode requires a region_type_tag".into(),
            ));
        }
        if self.cell_tag.is_none() && !self.file_barcode {
            return Err(CellmtxError::Config(
                "cell_tag must be set unless file_barcode aliasing is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Per (feature, cell) accumulator. `umis`/`umis_unspliced` are live only while the
/// stream is open and only in UMI mode; `finalize` collapses them into `count`/
/// `unspliced` and drops the pools.
#[derive(Debug, Default)]
pub struct CountCell {
    pub count: u32,
    pub unspliced: u32,
    umis: Option<DedupSet>,
    umis_unspliced: Option<DedupSet>,
}

impl CountCell {
    fn new(umi_mode: bool, velocity: bool) -> Self {
        CountCell {
            count: 0,
            unspliced: 0,
            umis: umi_mode.then(DedupSet::new),
            umis_unspliced: (umi_mode && velocity).then(DedupSet::new),
        }
    }

    fn finalize(&mut self) {
        if let Some(umis) = self.umis.take() {
            self.count = umis.size() as u32;
        }
        if let Some(umis_unspliced) = self.umis_unspliced.take() {
            self.unspliced = umis_unspliced.size() as u32;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Kept,
    Dropped,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FinalizeStats {
    pub n_total: u64,
    pub n_unspliced: u64,
    pub n_spliced: u64,
}

pub struct CountingEngine {
    config: CountConfig,
    pub features: Interner<IndexMap<u32, CountCell>>,
    pub barcodes: Interner<()>,
    whitelist: bool,
    umi_mode: bool,
}

impl CountingEngine {
    pub fn new(config: CountConfig, whitelist: Option<Interner<()>>) -> Self {
        let umi_mode = config.umi_tag.is_some();
        let mut features = Interner::new();
        features.set_value_slot();
        let whitelist_set = whitelist.is_some();
        CountingEngine {
            config,
            features,
            barcodes: whitelist.unwrap_or_else(Interner::new),
            whitelist: whitelist_set,
            umi_mode,
        }
    }

    fn feature_pool(&mut self, feature: &str) -> u32 {
        let id = self.features.push(feature);
        if self.features.query_value(id).is_none() {
            self.features.assign_value(id, IndexMap::new());
        }
        id
    }

    /// Filter, classify and accumulate one record (§4.3 filter pipeline).
    pub fn process_record<R: AlignmentRecord>(
        &mut self,
        record: &R,
        file_alias: Option<&str>,
    ) -> RecordOutcome {
        if record.tid() < 0 || record.is_unmapped() {
            return RecordOutcome::Dropped;
        }
        if record.qual() < self.config.mapq_threshold {
            return RecordOutcome::Dropped;
        }
        if !self.config.use_dup && record.is_duplicate() {
            return RecordOutcome::Dropped;
        }

        let mut region_class = None;
        if let Some(tag) = self.config.region_type_tag {
            if !self.config.region_types.is_empty() || self.config.velocity {
                let Some(byte) = record.aux_char(&tag) else {
                    return RecordOutcome::Dropped;
                };
                let class = RegionClass::from_byte(byte);
                if !self.config.region_types.is_empty() && !self.config.region_types.contains(&class) {
                    return RecordOutcome::Dropped;
                }
                region_class = Some(class);
            }
        }

        let barcode = match self.config.cell_tag {
            Some(tag) => record.aux_str(&tag),
            None if self.config.file_barcode => file_alias.map(str::to_string),
            None => None,
        };
        let Some(barcode) = barcode else {
            return RecordOutcome::Dropped;
        };

        let Some(feature_raw) = record.aux_str(&self.config.feature_tag) else {
            return RecordOutcome::Dropped;
        };

        let umi = match self.config.umi_tag {
            Some(tag) => match record.aux_str(&tag) {
                Some(u) => Some(u),
                None => return RecordOutcome::Dropped,
            },
            None => None,
        };

        let mut unspliced = false;
        if self.config.velocity {
            let class = region_class.expect("velocity mode validated to require region_type_tag");
            if class.is_unspliced() {
                unspliced = true;
            } else if !class.is_spliced() {
                return RecordOutcome::Dropped;
            }
        }

        let cell_id = if self.whitelist {
            match self.barcodes.query(&barcode) {
                Some(id) => id,
                None => return RecordOutcome::Dropped,
            }
        } else {
            self.barcodes.push(&barcode)
        };

        let tokens: Vec<&str> = feature_raw
            .split(|c| c == ';' || c == ',')
            .filter(|s| !s.is_empty())
            .collect();
        if tokens.is_empty() {
            return RecordOutcome::Dropped;
        }
        if self.config.one_hit && tokens.len() > 1 {
            return RecordOutcome::Dropped;
        }

        let umi_mode = self.umi_mode;
        let velocity = self.config.velocity;
        for token in &tokens {
            let feature_id = self.feature_pool(token);
            let pool = self
                .features
                .query_value_mut(feature_id)
                .expect("feature pool initialized by feature_pool");
            let (cell, _fresh) = pool.push_or_get(cell_id, || CountCell::new(umi_mode, velocity));
            if let Some(u) = &umi {
                cell.umis.as_mut().expect("umi pool present in umi mode").push(u);
                if velocity && unspliced {
                    cell.umis_unspliced
                        .as_mut()
                        .expect("unspliced umi pool present in velocity+umi mode")
                        .push(u);
                }
            } else {
                cell.count += 1;
                if velocity && unspliced {
                    cell.unspliced += 1;
                }
            }
        }

        RecordOutcome::Kept
    }

    /// Collapse UMI pools into counts and compute global totals.
    pub fn finalize(&mut self) -> FinalizeStats {
        let mut n_total = 0u64;
        let mut n_unspliced = 0u64;
        for feature_id in self.features.iter_ids() {
            if let Some(pool) = self.features.query_value_mut(feature_id) {
                for (_, cell) in pool.iter_mut() {
                    cell.finalize();
                    n_total += cell.count as u64;
                    n_unspliced += cell.unspliced as u64;
                }
            }
        }
        FinalizeStats {
            n_total,
            n_unspliced,
            n_spliced: n_total - n_unspliced,
        }
    }
}
