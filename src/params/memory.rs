use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use super::{ANY_SERIES, ParameterRecord, ParameterStore};
use crate::error::{BlindError, BlindResult};

type Key = (String, String, String, String);

/// Parameter table held in memory, optionally loaded from CSV with header
/// `series_name,detector_name,configuration_name,parameter_name,value`.
#[derive(Debug, Clone, Default)]
pub struct MemoryParameterStore {
    entries: BTreeMap<Key, f64>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        series: &str,
        detector: &str,
        configuration: &str,
        parameter: &str,
        value: f64,
    ) {
        self.entries.insert(
            (
                series.to_string(),
                detector.to_string(),
                configuration.to_string(),
                parameter.to_string(),
            ),
            value,
        );
    }

    pub fn insert_record(&mut self, record: &ParameterRecord) {
        self.insert(
            &record.series_name,
            &record.detector_name,
            &record.configuration_name,
            &record.parameter_name,
            record.value,
        );
    }

    pub fn from_csv(path: &Path) -> BlindResult<Self> {
        let mut store = Self::new();
        for record in read_csv_records(path)? {
            store.insert_record(&record);
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = ParameterRecord> + '_ {
        self.entries
            .iter()
            .map(|((series, detector, configuration, parameter), value)| ParameterRecord {
                series_name: series.clone(),
                detector_name: detector.clone(),
                configuration_name: configuration.clone(),
                parameter_name: parameter.clone(),
                value: *value,
            })
    }

    fn get(&self, series: &str, detector: &str, configuration: &str, parameter: &str) -> Option<f64> {
        let key = (
            series.to_string(),
            detector.to_string(),
            configuration.to_string(),
            parameter.to_string(),
        );
        self.entries.get(&key).copied()
    }
}

impl ParameterStore for MemoryParameterStore {
    fn lookup(
        &self,
        series: &str,
        detector: &str,
        configuration: &str,
        parameter: &str,
    ) -> BlindResult<Option<f64>> {
        Ok(self
            .get(series, detector, configuration, parameter)
            .or_else(|| self.get(ANY_SERIES, detector, configuration, parameter)))
    }
}

/// Parse a parameter CSV into records.
pub fn read_csv_records(path: &Path) -> BlindResult<Vec<ParameterRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    reader
        .deserialize::<ParameterRecord>()
        .enumerate()
        .map(|(row, result)| {
            result
                .with_context(|| format!("parameter CSV row {row}"))
                .map_err(|source| BlindError::Storage {
                    path: path.display().to_string(),
                    source,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_specific_value_wins_over_any_series() {
        let mut store = MemoryParameterStore::new();
        store.insert(ANY_SERIES, "3", "Prodv5-3", "max_psumOF", 5.0);
        store.insert("11208221500", "3", "Prodv5-3", "max_psumOF", 7.0);

        let lookup = |series| store.lookup(series, "3", "Prodv5-3", "max_psumOF").unwrap();
        assert_eq!(lookup("11208221500"), Some(7.0));
        assert_eq!(lookup("11208231500"), Some(5.0));
        assert_eq!(store.lookup("11208221500", "4", "Prodv5-3", "max_psumOF").unwrap(), None);
        assert_eq!(store.lookup("11208221500", "3", "Prodv5-4", "max_psumOF").unwrap(), None);
    }

    #[test]
    fn loads_csv_with_blank_series_as_any_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parameters.csv");
        std::fs::write(
            &path,
            "series_name,detector_name,configuration_name,parameter_name,value\n\
             11204111500, 1, Prodv5-3, min_psumOF, 2.5\n\
             ,1,Prodv5-3,A_mu.0,0.16\n",
        )
        .unwrap();

        let store = MemoryParameterStore::from_csv(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.lookup("11204111500", "1", "Prodv5-3", "min_psumOF").unwrap(),
            Some(2.5)
        );
        assert_eq!(
            store.lookup("11301151700", "1", "Prodv5-3", "A_mu.0").unwrap(),
            Some(0.16)
        );
    }

    #[test]
    fn malformed_csv_row_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parameters.csv");
        std::fs::write(
            &path,
            "series_name,detector_name,configuration_name,parameter_name,value\n1,1,c,p,abc\n",
        )
        .unwrap();

        assert!(matches!(
            MemoryParameterStore::from_csv(&path),
            Err(BlindError::Storage { .. })
        ));
    }
}
