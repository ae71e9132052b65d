use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Detector – one channel of the tower, with its operating mode
// ---------------------------------------------------------------------------

/// Operating mode of a detector, discovered while attaching its columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorMode {
    #[default]
    Normal,
    /// High-voltage low-threshold operation: no charge channels, no
    /// calibrated quantities.
    LowThreshold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detector {
    pub index: usize,
    pub name: String,
    pub mode: DetectorMode,
}

impl Detector {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            mode: DetectorMode::Normal,
        }
    }

    pub fn is_low_threshold(&self) -> bool {
        self.mode == DetectorMode::LowThreshold
    }
}

/// Build the detector list for a run from its names, in index order.
pub fn detectors_from_names<S: AsRef<str>>(names: &[S]) -> Vec<Detector> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| Detector::new(index, name.as_ref()))
        .collect()
}

// ---------------------------------------------------------------------------
// SeriesId – integral data-taking series number
// ---------------------------------------------------------------------------

/// Series numbers encode the start of a data-taking series
/// (`1YYMMDDhhmm`), stored in the event tables as a double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(pub i64);

impl SeriesId {
    /// Truncate the stored double to its integral series number.
    pub fn from_value(value: f64) -> Self {
        SeriesId(value as i64)
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RowView – the materialized values of the current row of one source
// ---------------------------------------------------------------------------

/// Decoded scalar values of the active columns at the cursor row.
///
/// Column order follows activation order; values are replaced in place on
/// every row read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowView {
    columns: Vec<String>,
    values: Vec<f64>,
    row: Option<usize>,
}

impl RowView {
    pub fn new(columns: Vec<String>) -> Self {
        let values = vec![f64::NAN; columns.len()];
        Self {
            columns,
            values,
            row: None,
        }
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row index currently materialized, `None` before the first read.
    pub fn row(&self) -> Option<usize> {
        self.row
    }

    pub(crate) fn fill(&mut self, row: usize, values: impl Iterator<Item = f64>) {
        for (slot, value) in self.values.iter_mut().zip(values) {
            *slot = value;
        }
        self.row = Some(row);
    }
}
