//! Accumulated blinding decisions and the sinks that persist them.
//!
//! Output layout, per sample:
//! ```text
//!   <cut>_<sample>.parquet | .csv   zip<name> ... event   (one row per processed row)
//!   <cut>_<sample>.summary.json     per-series counts
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};

use crate::data::model::Detector;
use crate::error::{BlindError, BlindResult};

/// Name of the combined any-detector column.
pub const EVENT_COLUMN: &str = "event";
/// Parquet key-value metadata entry holding the cut name.
pub const CUT_METADATA_KEY: &str = "cut";

// ---------------------------------------------------------------------------
// DecisionTable
// ---------------------------------------------------------------------------

/// One boolean sequence per detector, index-aligned with processed rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionTable {
    detectors: Vec<String>,
    columns: Vec<Vec<bool>>,
}

impl DecisionTable {
    pub fn new(detectors: &[Detector]) -> Self {
        Self {
            detectors: detectors.iter().map(|d| d.name.clone()).collect(),
            columns: vec![Vec::new(); detectors.len()],
        }
    }

    /// Append one row.  A short slice leaves the trailing detectors behind,
    /// which [`DecisionTable::rows`] reports.
    pub fn push(&mut self, blinded: &[bool]) {
        for (column, &value) in self.columns.iter_mut().zip(blinded) {
            column.push(value);
        }
    }

    /// Common length of every detector's sequence.
    pub fn rows(&self) -> BlindResult<usize> {
        let Some(first) = self.columns.first() else {
            return Ok(0);
        };
        let expected = first.len();
        for (name, column) in self.detectors.iter().zip(&self.columns) {
            if column.len() != expected {
                return Err(BlindError::DecisionLengthMismatch {
                    detector: name.clone(),
                    expected,
                    found: column.len(),
                });
            }
        }
        Ok(expected)
    }

    pub fn detector_names(&self) -> &[String] {
        &self.detectors
    }

    pub fn column(&self, detector: usize) -> Option<&[bool]> {
        self.columns.get(detector).map(Vec::as_slice)
    }

    /// Per row, whether any detector is blinded.
    pub fn any_detector(&self) -> BlindResult<Vec<bool>> {
        let rows = self.rows()?;
        Ok((0..rows)
            .map(|row| self.columns.iter().any(|column| column[row]))
            .collect())
    }

    pub fn blinded_events(&self) -> BlindResult<usize> {
        Ok(self.any_detector()?.into_iter().filter(|&b| b).count())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.detectors
            .iter()
            .map(|name| format!("zip{name}"))
            .chain(std::iter::once(EVENT_COLUMN.to_string()))
            .collect()
    }

    pub fn to_record_batch(&self) -> BlindResult<RecordBatch> {
        let event = self.any_detector()?;

        let fields: Vec<Field> = self
            .column_names()
            .into_iter()
            .map(|name| Field::new(name, DataType::Boolean, false))
            .collect();
        let arrays: Vec<ArrayRef> = self
            .columns
            .iter()
            .map(|column| Arc::new(BooleanArray::from(column.clone())) as ArrayRef)
            .chain(std::iter::once(Arc::new(BooleanArray::from(event)) as ArrayRef))
            .collect();

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv => "csv",
        }
    }

    pub fn sink(self, dir: impl Into<PathBuf>) -> Box<dyn DecisionSink> {
        match self {
            OutputFormat::Parquet => Box::new(ParquetSink::new(dir)),
            OutputFormat::Csv => Box::new(CsvSink::new(dir)),
        }
    }
}

/// `<cut>_<sample>.<extension>` inside `dir`.
pub fn output_path(dir: &Path, cut_name: &str, sample: &str, extension: &str) -> PathBuf {
    dir.join(format!("{cut_name}_{sample}.{extension}"))
}

/// Persists one sample's decisions.  Returns the written path.
pub trait DecisionSink {
    fn write(&mut self, cut_name: &str, sample: &str, table: &DecisionTable) -> BlindResult<PathBuf>;
}

pub struct ParquetSink {
    dir: PathBuf,
}

impl ParquetSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DecisionSink for ParquetSink {
    fn write(&mut self, cut_name: &str, sample: &str, table: &DecisionTable) -> BlindResult<PathBuf> {
        let batch = table.to_record_batch()?;
        std::fs::create_dir_all(&self.dir)?;
        let path = output_path(&self.dir, cut_name, sample, OutputFormat::Parquet.extension());

        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(vec![KeyValue::new(
                CUT_METADATA_KEY.to_string(),
                cut_name.to_string(),
            )]))
            .build();
        let file = File::create(&path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        info!("wrote {} decision rows to {}", batch.num_rows(), path.display());
        Ok(path)
    }
}

/// Writes `1`/`0` cells under the same column names as the Parquet sink.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DecisionSink for CsvSink {
    fn write(&mut self, cut_name: &str, sample: &str, table: &DecisionTable) -> BlindResult<PathBuf> {
        let event = table.any_detector()?;
        std::fs::create_dir_all(&self.dir)?;
        let path = output_path(&self.dir, cut_name, sample, OutputFormat::Csv.extension());

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(table.column_names())?;
        for (row, &any) in event.iter().enumerate() {
            let cells = table
                .columns
                .iter()
                .map(|column| column[row])
                .chain(std::iter::once(any))
                .map(|b| if b { "1" } else { "0" });
            writer.write_record(cells)?;
        }
        writer.flush()?;

        info!("wrote {} decision rows to {}", event.len(), path.display());
        Ok(path)
    }
}
