use std::path::PathBuf;
use thiserror::Error;

/// Fatal error taxonomy (§7). Per-record anomalies are never represented here — the
/// counting engine and GTF loader report those as warnings on the `log` channel and
/// keep going.
#[derive(Debug, Error)]
pub enum CellmtxError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("format error: {0}")]
    Format(String),

    #[error("no data: {0}")]
    NoData(String),
}

impl CellmtxError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CellmtxError::Io {
            path: path.into(),
            source,
        }
    }
}
