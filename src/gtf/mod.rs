//! Gene-structure parser and model (§4.4).

pub mod attr;
pub mod model;

pub use model::{FeatureKind, GtfModel, GtfRecord, Strand};
