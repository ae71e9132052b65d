//! Threshold and calibration parameters, bound per data-taking series.
//!
//! ```text
//!   ParameterStore (memory / CSV / SQLite)
//!        │  lookup(series, detector, configuration, parameter)
//!        ▼
//!   ParameterSnapshot   name → one value per detector, for one series
//! ```

pub mod blocks;
pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::model::{Detector, SeriesId};
use crate::error::{BlindError, BlindResult};

pub use memory::MemoryParameterStore;
pub use sqlite::SqliteParameterStore;

/// Series name under which series-independent parameters are stored.
pub const ANY_SERIES: &str = "";

/// Keyed lookup of scalar parameters.
///
/// A row stored for the exact series wins over one stored under
/// [`ANY_SERIES`].
pub trait ParameterStore {
    fn lookup(
        &self,
        series: &str,
        detector: &str,
        configuration: &str,
        parameter: &str,
    ) -> BlindResult<Option<f64>>;
}

/// One row of a parameter table, as stored in CSV and SQLite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    #[serde(default)]
    pub series_name: String,
    pub detector_name: String,
    pub configuration_name: String,
    pub parameter_name: String,
    pub value: f64,
}

/// Every parameter a cut chain needs, fetched for one series.
///
/// Snapshots are replaced wholesale on a series change, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    series: SeriesId,
    detectors: Vec<String>,
    tables: BTreeMap<String, Vec<f64>>,
}

impl ParameterSnapshot {
    pub fn bind(
        store: &dyn ParameterStore,
        series: SeriesId,
        detectors: &[Detector],
        configuration: &str,
        parameters: &[&str],
    ) -> BlindResult<Self> {
        let series_name = series.to_string();
        let mut tables = BTreeMap::new();

        for &parameter in parameters {
            let mut values = Vec::with_capacity(detectors.len());
            for detector in detectors {
                let value = store
                    .lookup(&series_name, &detector.name, configuration, parameter)?
                    .ok_or_else(|| BlindError::ParameterNotFound {
                        series: series_name.clone(),
                        detector: detector.name.clone(),
                        parameter: parameter.to_string(),
                    })?;
                values.push(value);
            }
            tables.insert(parameter.to_string(), values);
        }

        Ok(Self {
            series,
            detectors: detectors.iter().map(|d| d.name.clone()).collect(),
            tables,
        })
    }

    pub fn series(&self) -> SeriesId {
        self.series
    }

    pub fn get(&self, parameter: &str, detector: usize) -> BlindResult<f64> {
        self.tables
            .get(parameter)
            .and_then(|values| values.get(detector))
            .copied()
            .ok_or_else(|| BlindError::ParameterNotFound {
                series: self.series.to_string(),
                detector: self
                    .detectors
                    .get(detector)
                    .cloned()
                    .unwrap_or_else(|| detector.to_string()),
                parameter: parameter.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::detectors_from_names;

    #[test]
    fn bind_fetches_every_parameter_for_every_detector() {
        let mut store = MemoryParameterStore::new();
        store.insert("11204111500", "1", "Prodv5-3", "min_psumOF", 2.5);
        store.insert("11204111500", "2", "Prodv5-3", "min_psumOF", 3.5);
        store.insert(ANY_SERIES, "1", "Prodv5-3", "cGlitch1_v53", 40.0);
        store.insert(ANY_SERIES, "2", "Prodv5-3", "cGlitch1_v53", 50.0);

        let detectors = detectors_from_names(&["1", "2"]);
        let snapshot = ParameterSnapshot::bind(
            &store,
            SeriesId(11204111500),
            &detectors,
            "Prodv5-3",
            &["min_psumOF", "cGlitch1_v53"],
        )
        .unwrap();

        assert_eq!(snapshot.series(), SeriesId(11204111500));
        assert_eq!(snapshot.get("min_psumOF", 1).unwrap(), 3.5);
        assert_eq!(snapshot.get("cGlitch1_v53", 0).unwrap(), 40.0);
        assert!(matches!(
            snapshot.get("max_psumOF", 0),
            Err(BlindError::ParameterNotFound { .. })
        ));
    }

    #[test]
    fn bind_fails_on_first_missing_entry() {
        let mut store = MemoryParameterStore::new();
        store.insert("11204111500", "1", "Prodv5-3", "min_psumOF", 2.5);

        let detectors = detectors_from_names(&["1", "2"]);
        match ParameterSnapshot::bind(
            &store,
            SeriesId(11204111500),
            &detectors,
            "Prodv5-3",
            &["min_psumOF"],
        ) {
            Err(BlindError::ParameterNotFound {
                series,
                detector,
                parameter,
            }) => {
                assert_eq!(series, "11204111500");
                assert_eq!(detector, "2");
                assert_eq!(parameter, "min_psumOF");
            }
            other => panic!("expected ParameterNotFound, got {other:?}"),
        }
    }
}
