//! Shared fixtures for unit tests: a hand-filled event row and a parameter
//! snapshot under which a nominal hit is blinded.

use std::collections::BTreeMap;

use crate::cuts::{role, CutEvaluator, EventRecord, SERIES_COLUMN};
use crate::data::location::LocationTemplate;
use crate::data::model::{detectors_from_names, DetectorMode, SeriesId};
use crate::data::source::{ColumnarTable, MemoryResolver};
use crate::error::{BlindError, BlindResult};
use crate::params::{MemoryParameterStore, ParameterSnapshot, ANY_SERIES};
use crate::profile::{standard_sources, PROBE_COLUMNS};

/// A series outside every exclusion window.
pub const NOMINAL_SERIES: i64 = 11207010000;
pub const CONFIGURATION: &str = "Prodv5-3";

pub const RAW_COLUMNS: &[(&str, f64)] = &[
    ("DetType", 11.0),
    ("PAOFamps", 0.0),
    ("PBOFamps", 0.0),
    ("PCOFamps", 0.0),
    ("PDOFamps", 0.0),
    ("PTglitch1OFchisq", 95.0),
    ("PTlfnoise1OFchisq", 95.0),
    ("PTOFchisq", 100.0),
    ("QIS1bias", 2.0),
    ("QIS2bias", -2.0),
    ("QIS1status", 0.0),
    ("QIS2status", 0.0),
    ("QOS1status", 0.0),
    ("QOS2status", 0.0),
];

/// Calibrated values of a detector with no energy deposit.
pub const QUIET_CALIBRATED: &[(&str, f64)] = &[
    ("pa2OF", 0.0),
    ("pc1OF", 0.0),
    ("precoilsumOF", 1.0),
    ("psumOF", 1.0),
    ("ptNF", 1.0),
    ("qi1OF", 0.3),
    ("qi2OF", 0.3),
    ("qo1OF", 0.0),
    ("qo2OF", 0.0),
    ("qsum1OF", 0.3),
    ("qsum2OF", 0.3),
    ("ysumOF", 0.3),
];

/// Calibrated values of a single-scatter nuclear recoil at 20 keV.
pub const HIT_CALIBRATED: &[(&str, f64)] = &[
    ("pa2OF", 0.0),
    ("pc1OF", 0.0),
    ("precoilsumOF", 20.0),
    ("psumOF", 20.0),
    ("ptNF", 20.0),
    ("qi1OF", 5.0),
    ("qi2OF", 5.0),
    ("qo1OF", 0.0),
    ("qo2OF", 0.0),
    ("qsum1OF", 5.0),
    ("qsum2OF", 5.0),
    ("ysumOF", 0.3),
];

pub const EVENT_COLUMNS: &[(&str, f64)] = &[
    ("EventCategory", 0.0),
    (SERIES_COLUMN, NOMINAL_SERIES as f64),
    ("VTTime20", -100.0),
];

pub const CALIBRATED_EVENT_COLUMNS: &[(&str, f64)] = &[("ntrigp", 1.0), ("ntrigq", 1.0)];

/// Value every detector gets for `parameter` in the nominal snapshot.
pub fn nominal_parameter(parameter: &str) -> f64 {
    let base = parameter.split('.').next().unwrap_or(parameter);
    match base {
        "min_psumOF" => 2.0,
        "max_psumOF" => 5.0,
        "max_qsum1OF" | "max_qsum2OF" => 10.0,
        "cLFnoise1_v53" | "cGlitch1_v53" => 10.0,
        "A_mu" => 0.3,
        "A_sigma" => 0.05,
        "x0_sigma" => 100.0,
        "b_mu" | "b_sigma" => 0.0,
        _ => 1.0,
    }
}

pub fn detector_names(count: usize) -> Vec<String> {
    (1..=count).map(|n| n.to_string()).collect()
}

pub fn nominal_store(count: usize) -> MemoryParameterStore {
    let mut store = MemoryParameterStore::new();
    for name in detector_names(count) {
        for parameter in CutEvaluator::standard().required_parameters() {
            store.insert(ANY_SERIES, &name, CONFIGURATION, parameter, nominal_parameter(parameter));
        }
    }
    store
}

pub fn nominal_snapshot(count: usize) -> ParameterSnapshot {
    let detectors = detectors_from_names(&detector_names(count));
    ParameterSnapshot::bind(
        &nominal_store(count),
        SeriesId(NOMINAL_SERIES),
        &detectors,
        CONFIGURATION,
        &CutEvaluator::standard().required_parameters(),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// FakeEvent
// ---------------------------------------------------------------------------

/// One event row held in maps, every detector quiet by default.
#[derive(Debug, Clone)]
pub struct FakeEvent {
    modes: Vec<DetectorMode>,
    detector: BTreeMap<(String, usize, String), f64>,
    global: BTreeMap<(String, String), f64>,
}

impl FakeEvent {
    pub fn nominal(count: usize) -> Self {
        let mut event = Self {
            modes: vec![DetectorMode::Normal; count],
            detector: BTreeMap::new(),
            global: BTreeMap::new(),
        };
        for detector in 0..count {
            event.fill(role::RAW, detector, RAW_COLUMNS);
            event.fill(role::CALIBRATED, detector, QUIET_CALIBRATED);
        }
        for (column, value) in EVENT_COLUMNS {
            event.set_global(role::EVENT, column, *value);
        }
        for (column, value) in CALIBRATED_EVENT_COLUMNS {
            event.set_global(role::CALIBRATED_EVENT, column, *value);
        }
        event
    }

    fn fill(&mut self, role: &str, detector: usize, columns: &[(&str, f64)]) {
        for (column, value) in columns {
            self.set(role, detector, column, *value);
        }
    }

    pub fn hit(&mut self, detector: usize) -> &mut Self {
        self.fill(role::CALIBRATED, detector, HIT_CALIBRATED);
        self
    }

    pub fn set(&mut self, role: &str, detector: usize, column: &str, value: f64) -> &mut Self {
        self.detector
            .insert((role.to_string(), detector, column.to_string()), value);
        self
    }

    pub fn set_global(&mut self, role: &str, column: &str, value: f64) -> &mut Self {
        self.global.insert((role.to_string(), column.to_string()), value);
        self
    }

    pub fn set_series(&mut self, series: i64) -> &mut Self {
        self.set_global(role::EVENT, SERIES_COLUMN, series as f64)
    }

    /// Switch a detector to low-threshold operation: DetType 21 and no
    /// calibrated values.
    pub fn low_threshold(&mut self, detector: usize) -> &mut Self {
        self.modes[detector] = DetectorMode::LowThreshold;
        self.detector
            .retain(|(r, d, _), _| !(r == role::CALIBRATED && *d == detector));
        self.set(role::RAW, detector, "DetType", 21.0)
    }
}

impl EventRecord for FakeEvent {
    fn detector_count(&self) -> usize {
        self.modes.len()
    }

    fn detector_mode(&self, detector: usize) -> DetectorMode {
        self.modes[detector]
    }

    fn detector_value(&self, role: &str, detector: usize, column: &str) -> BlindResult<f64> {
        self.detector
            .get(&(role.to_string(), detector, column.to_string()))
            .copied()
            .ok_or_else(|| BlindError::ColumnNotFound {
                column: column.to_string(),
                source_name: format!("{role}/{detector}"),
            })
    }

    fn global_value(&self, role: &str, column: &str) -> BlindResult<f64> {
        self.global
            .get(&(role.to_string(), column.to_string()))
            .copied()
            .ok_or_else(|| BlindError::ColumnNotFound {
                column: column.to_string(),
                source_name: role.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// SampleTables
// ---------------------------------------------------------------------------

/// In-memory tables of one sample under the standard locations.
#[derive(Debug, Clone)]
pub struct SampleTables {
    pub sample: String,
    pub detectors: usize,
    series: Vec<f64>,
    hits: Vec<(usize, usize)>,
    random_rows: Vec<usize>,
    low_threshold: Vec<usize>,
    event_rows: Option<usize>,
}

impl SampleTables {
    pub fn new(sample: &str, detectors: usize, series: Vec<f64>) -> Self {
        Self {
            sample: sample.to_string(),
            detectors,
            series,
            hits: Vec::new(),
            random_rows: Vec::new(),
            low_threshold: Vec::new(),
            event_rows: None,
        }
    }

    pub fn hit(mut self, row: usize, detector: usize) -> Self {
        self.hits.push((row, detector));
        self
    }

    pub fn random_trigger(mut self, row: usize) -> Self {
        self.random_rows.push(row);
        self
    }

    /// Drop the charge columns and the calibrated table of `detector`.
    pub fn low_threshold(mut self, detector: usize) -> Self {
        self.low_threshold.push(detector);
        self
    }

    /// Keep only the first `rows` rows of the raw event table.
    pub fn truncate_event_table(mut self, rows: usize) -> Self {
        self.event_rows = Some(rows);
        self
    }

    fn rows(&self) -> usize {
        self.series.len()
    }

    fn constant_table(&self, name: &str, columns: &[(&str, f64)], skip: &[&str]) -> ColumnarTable {
        let rows = self.rows();
        let columns = columns
            .iter()
            .filter(|(column, _)| !skip.contains(column))
            .map(|(column, value)| (*column, vec![*value; rows]))
            .collect();
        ColumnarTable::new(name, columns).unwrap()
    }

    fn raw_table(&self, detector: usize) -> ColumnarTable {
        if !self.low_threshold.contains(&detector) {
            return self.constant_table("raw", RAW_COLUMNS, &[]);
        }
        let rows = self.rows();
        let columns = RAW_COLUMNS
            .iter()
            .filter(|(column, _)| !PROBE_COLUMNS.contains(column))
            .map(|(column, _)| {
                let value = if *column == "DetType" { 21.0 } else { 0.0 };
                (*column, vec![value; rows])
            })
            .collect();
        ColumnarTable::new("raw", columns).unwrap()
    }

    fn calibrated_table(&self, detector: usize) -> ColumnarTable {
        let columns = QUIET_CALIBRATED
            .iter()
            .zip(HIT_CALIBRATED)
            .map(|((column, quiet), (_, hit))| {
                let values: Vec<f64> = (0..self.rows())
                    .map(|row| {
                        if self.hits.contains(&(row, detector)) {
                            *hit
                        } else {
                            *quiet
                        }
                    })
                    .collect();
                (*column, values)
            })
            .collect();
        ColumnarTable::new("calibrated", columns).unwrap()
    }

    fn event_table(&self) -> ColumnarTable {
        let rows = self.event_rows.unwrap_or(self.rows());
        let category: Vec<f64> = (0..rows)
            .map(|row| if self.random_rows.contains(&row) { 1.0 } else { 0.0 })
            .collect();
        let columns = vec![
            ("EventCategory", category),
            (SERIES_COLUMN, self.series[..rows].to_vec()),
            ("VTTime20", vec![-100.0; rows]),
        ];
        ColumnarTable::new("event", columns).unwrap()
    }

    pub fn resolver(&self) -> MemoryResolver {
        let mut resolver = MemoryResolver::new();
        let names = detector_names(self.detectors);

        for spec in standard_sources() {
            let template = LocationTemplate::parse(&spec.location).unwrap();
            let key = |detector: Option<&str>| {
                format!("{}:{}", template.files_for(&self.sample), template.table_for(detector))
            };

            match spec.role.as_str() {
                role::RAW => {
                    for (index, name) in names.iter().enumerate() {
                        resolver.insert(key(Some(name)), self.raw_table(index));
                    }
                }
                role::CALIBRATED => {
                    for (index, name) in names.iter().enumerate() {
                        if !self.low_threshold.contains(&index) {
                            resolver.insert(key(Some(name)), self.calibrated_table(index));
                        }
                    }
                }
                role::EVENT => resolver.insert(key(None), self.event_table()),
                _ => resolver.insert(
                    key(None),
                    self.constant_table("calibrated_event", CALIBRATED_EVENT_COLUMNS, &[]),
                ),
            }
        }
        resolver
    }
}
