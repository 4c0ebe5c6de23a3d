use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("Column '{column}' not found in value table {path:?}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Invalid value at row {row} of {path:?}: '{value}'")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("Row {row} of {path:?} has {got} fields, expected at least {expected}")]
    ShortRow {
        path: PathBuf,
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("Unsupported geometry format '{extension}' for {path:?}")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("GeoJSON in {0:?} must be a FeatureCollection")]
    NotFeatureCollection(PathBuf),

    #[error("Failed to convert geometry of feature '{id}': {message}")]
    Geometry { id: String, message: String },
}
