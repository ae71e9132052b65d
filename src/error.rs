use thiserror::Error;

/// Every way a blinding pass over one sample can fail.
///
/// All variants are fatal to the sample being processed; the batch driver
/// logs them and continues with the next sample.
#[derive(Debug, Error)]
pub enum BlindError {
    #[error("invalid location format (expected '<files>:<table>'): {location}")]
    LocationFormat { location: String },

    #[error("no table data found for {location}")]
    SourceNotFound { location: String },

    #[error("column '{column}' not found in {source_name}")]
    ColumnNotFound { column: String, source_name: String },

    #[error("detector {detector} flagged low-threshold but {column} = {value} at row {row}")]
    ModeSignature {
        detector: String,
        column: String,
        row: usize,
        value: f64,
    },

    #[error("mismatching number of entries in {source_name}: expected {expected}, found {found}")]
    RowCountMismatch {
        source_name: String,
        expected: usize,
        found: usize,
    },

    #[error("not able to read row {row} from {source_name}")]
    RowRead { source_name: String, row: usize },

    #[error("parameter '{parameter}' not found for series {series}, detector {detector}")]
    ParameterNotFound {
        series: String,
        detector: String,
        parameter: String,
    },

    #[error("decision length mismatch for detector {detector}: expected {expected}, found {found}")]
    DecisionLengthMismatch {
        detector: String,
        expected: usize,
        found: usize,
    },

    #[error("reading {path}")]
    Storage {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BlindResult<T> = Result<T, BlindError>;
