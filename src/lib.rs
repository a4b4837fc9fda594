//! `cellmtx`: a single-cell sequencing count-matrix builder.
//!
//! Two subsystems form the core: [`count`], the counting engine that streams annotated
//! alignment records and accumulates a sparse feature x cell matrix; and [`gtf`], the
//! annotation index that normalizes a gene-structure file into a contig/gene/transcript
//! hierarchy queryable by interval overlap. [`interner`], [`dna_pool`] and [`interval`]
//! are the shared building blocks both subsystems are built from. [`mex`] serializes
//! the counting engine's output. [`cli`] wires the library to a `clap`-derived binary.

pub mod cli;
pub mod count;
pub mod dna_pool;
pub mod error;
pub mod gtf;
pub mod interner;
pub mod interval;
pub mod mex;

pub use error::CellmtxError;
