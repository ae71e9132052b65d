use std::collections::{BTreeMap, BTreeSet};

use log::info;

use super::location::LocationTemplate;
use super::model::{Detector, DetectorMode, RowView};
use super::source::{SourceResolver, TabularSource};
use crate::error::{BlindError, BlindResult};

// ---------------------------------------------------------------------------
// ModePolicy – which missing data is explained by low-threshold operation
// ---------------------------------------------------------------------------

/// Column values that every row of a low-threshold detector must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeSignature {
    pub role: String,
    pub column: String,
    pub allowed: Vec<f64>,
}

/// Rules for discovering detector modes from the shape of the data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModePolicy {
    /// Absence of any of these marks the detector low-threshold.
    pub probe_columns: BTreeSet<String>,
    /// May be absent for normal detectors; required for low-threshold ones.
    pub normal_optional_columns: BTreeSet<String>,
    /// Roles never read for low-threshold detectors.  A missing source for
    /// one of these roles marks the detector low-threshold.
    pub exempt_roles: BTreeSet<String>,
    pub signature: Option<ModeSignature>,
}

impl ModePolicy {
    fn is_exempt(&self, role: &str, mode: DetectorMode) -> bool {
        mode == DetectorMode::LowThreshold && self.exempt_roles.contains(role)
    }
}

// ---------------------------------------------------------------------------
// EventDataset – role-keyed sources read in lockstep
// ---------------------------------------------------------------------------

struct DetectorRole {
    requested: Vec<String>,
    sources: Vec<Option<Box<dyn TabularSource>>>,
}

/// All tables of one sample, aligned by row index.
pub struct EventDataset {
    samples: Vec<String>,
    detectors: Vec<Detector>,
    policy: ModePolicy,
    resolver: Box<dyn SourceResolver>,
    detector_roles: BTreeMap<String, DetectorRole>,
    global_roles: BTreeMap<String, Box<dyn TabularSource>>,
    event_count: usize,
}

impl EventDataset {
    pub fn new(
        samples: Vec<String>,
        detectors: Vec<Detector>,
        policy: ModePolicy,
        resolver: Box<dyn SourceResolver>,
    ) -> Self {
        Self {
            samples,
            detectors,
            policy,
            resolver,
            detector_roles: BTreeMap::new(),
            global_roles: BTreeMap::new(),
            event_count: 0,
        }
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Authoritative number of rows, set by [`EventDataset::validate`].
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// Attach one table per detector under `role`.
    ///
    /// Modes are decided first from what exists (missing exempt sources,
    /// missing probe columns), then columns are activated according to the
    /// decided mode.
    pub fn attach_detector_columns(
        &mut self,
        role: &str,
        location: &str,
        columns: &[&str],
    ) -> BlindResult<()> {
        let template = LocationTemplate::parse(location)?;
        self.attach_detector_template(role, &template, columns)
    }

    pub fn attach_detector_template(
        &mut self,
        role: &str,
        template: &LocationTemplate,
        columns: &[&str],
    ) -> BlindResult<()> {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();

        // Phase 1: resolve every detector's source and probe its schema.
        let mut sources = Vec::with_capacity(self.detectors.len());
        for detector in &mut self.detectors {
            let source = self
                .resolver
                .resolve(template, &self.samples, Some(&detector.name))?;

            match &source {
                None if self.policy.exempt_roles.contains(role) => {
                    mark_low_threshold(detector, role);
                }
                None => {
                    return Err(BlindError::SourceNotFound {
                        location: template.describe(&self.samples, Some(&detector.name)),
                    });
                }
                Some(source) => {
                    let probe_missing = columns.iter().any(|c| {
                        self.policy.probe_columns.contains(c) && !source.has_column(c)
                    });
                    if probe_missing {
                        mark_low_threshold(detector, role);
                    }
                }
            }
            sources.push(source);
        }

        // Phase 2: activate what the decided mode requires.
        for (detector, slot) in self.detectors.iter().zip(sources.iter_mut()) {
            if self.policy.is_exempt(role, detector.mode) {
                *slot = None;
                continue;
            }
            let Some(source) = slot.as_mut() else {
                continue;
            };

            let mut active = Vec::with_capacity(columns.len());
            for column in &columns {
                if source.has_column(column) {
                    active.push(column.clone());
                    continue;
                }
                let tolerated = match detector.mode {
                    DetectorMode::LowThreshold => self.policy.probe_columns.contains(column),
                    DetectorMode::Normal => self.policy.normal_optional_columns.contains(column),
                };
                if !tolerated {
                    return Err(BlindError::ColumnNotFound {
                        column: column.clone(),
                        source_name: source.name().to_string(),
                    });
                }
            }
            source.activate(&active)?;
        }

        self.detector_roles.insert(
            role.to_string(),
            DetectorRole {
                requested: columns,
                sources,
            },
        );
        Ok(())
    }

    /// Attach one table shared by all detectors under `role`.
    pub fn attach_global_columns(
        &mut self,
        role: &str,
        location: &str,
        columns: &[&str],
    ) -> BlindResult<()> {
        let template = LocationTemplate::parse(location)?;
        self.attach_global_template(role, &template, columns)
    }

    pub fn attach_global_template(
        &mut self,
        role: &str,
        template: &LocationTemplate,
        columns: &[&str],
    ) -> BlindResult<()> {
        let mut source = self
            .resolver
            .resolve(template, &self.samples, None)?
            .ok_or_else(|| BlindError::SourceNotFound {
                location: template.describe(&self.samples, None),
            })?;

        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        if let Some(missing) = columns.iter().find(|c| !source.has_column(c)) {
            return Err(BlindError::ColumnNotFound {
                column: missing.clone(),
                source_name: source.name().to_string(),
            });
        }
        source.activate(&columns)?;

        self.global_roles.insert(role.to_string(), source);
        Ok(())
    }

    /// Settle structural exemptions and check that every source agrees on the
    /// number of rows.
    pub fn validate(&mut self) -> BlindResult<usize> {
        self.event_count = 0;

        // A detector may have turned low-threshold after an exempt role was
        // already attached for it.
        for (role, entry) in &mut self.detector_roles {
            for (detector, slot) in self.detectors.iter().zip(entry.sources.iter_mut()) {
                if self.policy.is_exempt(role, detector.mode) {
                    *slot = None;
                }
            }
        }

        self.check_low_threshold_columns()?;
        self.check_low_threshold_signature()?;

        let mut expected: Option<usize> = None;
        let counts = self
            .detector_roles
            .values()
            .flat_map(|entry| entry.sources.iter().flatten())
            .chain(self.global_roles.values())
            .map(|source| (source.name().to_string(), source.num_rows()));

        for (source_name, rows) in counts {
            match expected {
                None => expected = Some(rows),
                Some(n) if n != rows => {
                    return Err(BlindError::RowCountMismatch {
                        source_name,
                        expected: n,
                        found: rows,
                    });
                }
                Some(_) => {}
            }
        }

        self.event_count = expected.unwrap_or(0);
        Ok(self.event_count)
    }

    fn check_low_threshold_columns(&self) -> BlindResult<()> {
        for entry in self.detector_roles.values() {
            for (detector, slot) in self.detectors.iter().zip(&entry.sources) {
                let (true, Some(source)) = (detector.is_low_threshold(), slot) else {
                    continue;
                };
                let missing = entry.requested.iter().find(|c| {
                    self.policy.normal_optional_columns.contains(*c) && !source.has_column(c)
                });
                if let Some(column) = missing {
                    return Err(BlindError::ColumnNotFound {
                        column: column.clone(),
                        source_name: source.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_low_threshold_signature(&mut self) -> BlindResult<()> {
        let Some(signature) = self.policy.signature.clone() else {
            return Ok(());
        };
        let Some(entry) = self.detector_roles.get_mut(&signature.role) else {
            return Ok(());
        };

        for (detector, slot) in self.detectors.iter().zip(entry.sources.iter_mut()) {
            let (true, Some(source)) = (detector.is_low_threshold(), slot.as_mut()) else {
                continue;
            };
            for row in 0..source.num_rows() {
                source.read_row(row)?;
                let value = source.row().get(&signature.column).ok_or_else(|| {
                    BlindError::ColumnNotFound {
                        column: signature.column.clone(),
                        source_name: source.name().to_string(),
                    }
                })?;
                if !signature.allowed.contains(&value) {
                    return Err(BlindError::ModeSignature {
                        detector: detector.name.clone(),
                        column: signature.column.clone(),
                        row,
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    /// Move every non-exempt source to `row`.
    pub fn read_row(&mut self, row: usize) -> BlindResult<()> {
        for entry in self.detector_roles.values_mut() {
            for source in entry.sources.iter_mut().flatten() {
                source.read_row(row)?;
            }
        }
        for source in self.global_roles.values_mut() {
            source.read_row(row)?;
        }
        Ok(())
    }

    pub fn detector_row(&self, role: &str, detector: usize) -> Option<&RowView> {
        self.detector_roles
            .get(role)?
            .sources
            .get(detector)?
            .as_ref()
            .map(|source| source.row())
    }

    pub fn global_row(&self, role: &str) -> Option<&RowView> {
        self.global_roles.get(role).map(|source| source.row())
    }

    pub fn detector_value(&self, role: &str, detector: usize, column: &str) -> BlindResult<f64> {
        self.detector_row(role, detector)
            .and_then(|row| row.get(column))
            .ok_or_else(|| {
                let name = self
                    .detectors
                    .get(detector)
                    .map(|d| d.name.as_str())
                    .unwrap_or("?");
                BlindError::ColumnNotFound {
                    column: column.to_string(),
                    source_name: format!("{role}/zip{name}"),
                }
            })
    }

    pub fn global_value(&self, role: &str, column: &str) -> BlindResult<f64> {
        self.global_row(role)
            .and_then(|row| row.get(column))
            .ok_or_else(|| BlindError::ColumnNotFound {
                column: column.to_string(),
                source_name: role.to_string(),
            })
    }
}

fn mark_low_threshold(detector: &mut Detector, role: &str) {
    if !detector.is_low_threshold() {
        info!(
            "found detector operating in low-threshold mode >> {} (from {role})",
            detector.name
        );
        detector.mode = DetectorMode::LowThreshold;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::detectors_from_names;
    use crate::data::source::{ColumnarTable, MemoryResolver};

    const RAW: &str = "data/merge_{sample}:rqDir/zip{detector}";
    const CAL: &str = "data/calib_{sample}:rrqDir/calibzip{detector}";
    const EVT: &str = "data/merge_{sample}:rqDir/eventTree";

    fn policy() -> ModePolicy {
        ModePolicy {
            probe_columns: ["QIS1bias".to_string()].into(),
            normal_optional_columns: ["PAOFamps".to_string()].into(),
            exempt_roles: ["calibrated".to_string()].into(),
            signature: Some(ModeSignature {
                role: "raw".into(),
                column: "DetType".into(),
                allowed: vec![21.0, -999999.0],
            }),
        }
    }

    fn table(columns: &[(&str, f64)], rows: usize) -> ColumnarTable {
        ColumnarTable::new(
            "t",
            columns.iter().map(|(c, v)| (*c, vec![*v; rows])).collect(),
        )
        .unwrap()
    }

    fn dataset(resolver: MemoryResolver, detectors: &[&str]) -> EventDataset {
        EventDataset::new(
            vec!["s".into()],
            detectors_from_names(detectors),
            policy(),
            Box::new(resolver),
        )
    }

    #[test]
    fn missing_probe_column_marks_low_threshold_and_skips_calibrated() {
        let resolver = MemoryResolver::new()
            .with("data/merge_s:rqDir/zip1", table(&[("DetType", 11.0), ("QIS1bias", 2.0)], 4))
            .with("data/merge_s:rqDir/zip2", table(&[("DetType", 21.0), ("PAOFamps", 1.0)], 4))
            .with("data/calib_s:rrqDir/calibzip1", table(&[("psumOF", 5.0)], 4))
            .with("data/calib_s:rrqDir/calibzip2", table(&[("psumOF", 5.0)], 9))
            .with("data/merge_s:rqDir/eventTree", table(&[("SeriesNumber", 1.0)], 4));
        let mut ds = dataset(resolver, &["1", "2"]);

        ds.attach_detector_columns("raw", RAW, &["DetType", "QIS1bias", "PAOFamps"])
            .unwrap();
        ds.attach_detector_columns("calibrated", CAL, &["psumOF"]).unwrap();
        ds.attach_global_columns("event", EVT, &["SeriesNumber"]).unwrap();

        assert_eq!(ds.detectors()[0].mode, DetectorMode::Normal);
        assert_eq!(ds.detectors()[1].mode, DetectorMode::LowThreshold);
        // the 9-row calibrated table of detector 2 is exempt and never counted
        assert_eq!(ds.validate().unwrap(), 4);

        ds.read_row(3).unwrap();
        assert_eq!(ds.detector_value("raw", 1, "PAOFamps").unwrap(), 1.0);
        assert!(ds.detector_row("calibrated", 1).is_none());
        assert!(matches!(
            ds.detector_value("calibrated", 1, "psumOF"),
            Err(BlindError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn missing_exempt_source_marks_low_threshold() {
        let resolver = MemoryResolver::new()
            .with("data/merge_s:rqDir/zip1", table(&[("DetType", 21.0), ("PAOFamps", 1.0)], 2))
            .with("data/merge_s:rqDir/eventTree", table(&[("SeriesNumber", 1.0)], 2));
        let mut ds = dataset(resolver, &["1"]);

        ds.attach_detector_columns("calibrated", CAL, &["psumOF"]).unwrap();
        assert!(ds.detectors()[0].is_low_threshold());
        ds.attach_detector_columns("raw", RAW, &["DetType", "QIS1bias", "PAOFamps"])
            .unwrap();
        ds.attach_global_columns("event", EVT, &["SeriesNumber"]).unwrap();
        assert_eq!(ds.validate().unwrap(), 2);
    }

    #[test]
    fn missing_required_source_is_not_found() {
        let mut ds = dataset(MemoryResolver::new(), &["1"]);
        assert!(matches!(
            ds.attach_detector_columns("raw", RAW, &["DetType"]),
            Err(BlindError::SourceNotFound { .. })
        ));
        assert!(matches!(
            ds.attach_global_columns("event", EVT, &["SeriesNumber"]),
            Err(BlindError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn missing_plain_column_is_fatal() {
        let resolver = MemoryResolver::new()
            .with("data/merge_s:rqDir/zip1", table(&[("DetType", 11.0), ("QIS1bias", 2.0)], 2));
        let mut ds = dataset(resolver, &["1"]);

        match ds.attach_detector_columns("raw", RAW, &["DetType", "PTOFchisq"]) {
            Err(BlindError::ColumnNotFound { column, .. }) => assert_eq!(column, "PTOFchisq"),
            other => panic!("expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn normal_optional_column_is_tolerated_for_normal_detectors_only() {
        let resolver = MemoryResolver::new()
            .with("data/merge_s:rqDir/zip1", table(&[("DetType", 11.0), ("QIS1bias", 2.0)], 2))
            .with("data/merge_s:rqDir/zip2", table(&[("DetType", 21.0)], 2));
        let mut ds = dataset(resolver, &["1", "2"]);

        match ds.attach_detector_columns("raw", RAW, &["DetType", "QIS1bias", "PAOFamps"]) {
            Err(BlindError::ColumnNotFound { column, .. }) => assert_eq!(column, "PAOFamps"),
            other => panic!("expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn late_low_threshold_detector_still_needs_its_optional_columns() {
        let resolver = MemoryResolver::new()
            .with("data/merge_s:rqDir/zip1", table(&[("DetType", 21.0), ("QIS1bias", 0.0)], 2));
        let mut ds = dataset(resolver, &["1"]);

        ds.attach_detector_columns("raw", RAW, &["DetType", "QIS1bias", "PAOFamps"])
            .unwrap();
        ds.attach_detector_columns("calibrated", CAL, &["psumOF"]).unwrap();
        assert!(ds.detectors()[0].is_low_threshold());
        assert!(matches!(
            ds.validate(),
            Err(BlindError::ColumnNotFound { ref column, .. }) if column == "PAOFamps"
        ));
    }

    #[test]
    fn low_threshold_signature_is_checked_on_every_row() {
        let raw = ColumnarTable::new(
            "zip1",
            vec![("DetType", vec![21.0, -999999.0, 11.0]), ("PAOFamps", vec![0.0; 3])],
        )
        .unwrap();
        let resolver = MemoryResolver::new().with("data/merge_s:rqDir/zip1", raw);
        let mut ds = dataset(resolver, &["1"]);

        ds.attach_detector_columns("raw", RAW, &["DetType", "QIS1bias", "PAOFamps"])
            .unwrap();
        match ds.validate() {
            Err(BlindError::ModeSignature { row, value, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(value, 11.0);
            }
            other => panic!("expected ModeSignature, got {other:?}"),
        }
    }

    #[test]
    fn row_count_mismatch_is_reported_before_any_read() {
        let resolver = MemoryResolver::new()
            .with("data/merge_s:rqDir/zip1", table(&[("DetType", 11.0), ("QIS1bias", 1.0)], 100))
            .with("data/merge_s:rqDir/eventTree", table(&[("SeriesNumber", 1.0)], 101));
        let mut ds = dataset(resolver, &["1"]);

        ds.attach_detector_columns("raw", RAW, &["DetType", "QIS1bias"]).unwrap();
        ds.attach_global_columns("event", EVT, &["SeriesNumber"]).unwrap();

        match ds.validate() {
            Err(BlindError::RowCountMismatch { expected, found, .. }) => {
                assert_eq!((expected, found), (100, 101));
            }
            other => panic!("expected RowCountMismatch, got {other:?}"),
        }
        assert_eq!(ds.event_count(), 0);
        assert_eq!(ds.detector_row("raw", 0).unwrap().row(), None);
    }

    #[test]
    fn reading_past_the_end_fails() {
        let resolver = MemoryResolver::new()
            .with("data/merge_s:rqDir/eventTree", table(&[("SeriesNumber", 1.0)], 2));
        let mut ds = dataset(resolver, &["1"]);
        ds.attach_global_columns("event", EVT, &["SeriesNumber"]).unwrap();
        assert_eq!(ds.validate().unwrap(), 2);

        ds.read_row(1).unwrap();
        assert!(matches!(ds.read_row(2), Err(BlindError::RowRead { row: 2, .. })));
    }

    #[test]
    fn bad_location_is_a_format_error() {
        let mut ds = dataset(MemoryResolver::new(), &["1"]);
        assert!(matches!(
            ds.attach_detector_columns("raw", "no-table-part", &["DetType"]),
            Err(BlindError::LocationFormat { .. })
        ));
    }
}
