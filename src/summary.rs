//! Per-series bookkeeping of one blinding pass, written next to the
//! decisions as JSON.

use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cuts::CutDecision;
use crate::data::model::{Detector, DetectorMode, SeriesId};
use crate::decisions::output_path;
use crate::error::BlindResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub series: SeriesId,
    pub events: usize,
    pub blinded_events: usize,
    /// Blinded rows per detector, in detector order.
    pub blinded_per_detector: Vec<usize>,
}

impl SeriesSummary {
    fn new(series: SeriesId, detectors: usize) -> Self {
        Self {
            series,
            events: 0,
            blinded_events: 0,
            blinded_per_detector: vec![0; detectors],
        }
    }

    pub fn blinded_fraction(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.blinded_events as f64 / self.events as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindingSummary {
    pub cut_name: String,
    pub samples: Vec<String>,
    pub detectors: Vec<String>,
    pub modes: Vec<DetectorMode>,
    pub events: usize,
    pub blinded_events: usize,
    /// Series in the order they were first seen.
    pub series: Vec<SeriesSummary>,
    /// Detector rows whose first failing cut was the key.
    pub rejections: BTreeMap<String, usize>,
    /// Rows cleared by each event veto.
    pub vetoes: BTreeMap<String, usize>,
}

impl BlindingSummary {
    pub fn new(cut_name: &str, samples: &[String], detectors: &[Detector]) -> Self {
        Self {
            cut_name: cut_name.to_string(),
            samples: samples.to_vec(),
            detectors: detectors.iter().map(|d| d.name.clone()).collect(),
            modes: detectors.iter().map(|d| d.mode).collect(),
            events: 0,
            blinded_events: 0,
            series: Vec::new(),
            rejections: BTreeMap::new(),
            vetoes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, series: SeriesId, decision: &CutDecision) {
        let index = match self.series.iter().rposition(|s| s.series == series) {
            Some(index) => index,
            None => {
                self.series
                    .push(SeriesSummary::new(series, self.detectors.len()));
                self.series.len() - 1
            }
        };
        let entry = &mut self.series[index];

        let blinded = decision.any_blinded();
        self.events += 1;
        entry.events += 1;
        if blinded {
            self.blinded_events += 1;
            entry.blinded_events += 1;
        }
        for (count, &b) in entry.blinded_per_detector.iter_mut().zip(&decision.blinded) {
            if b {
                *count += 1;
            }
        }

        for cut in decision.rejected_by.iter().flatten() {
            *self.rejections.entry(cut.to_string()).or_insert(0) += 1;
        }
        if let Some(veto) = decision.veto {
            *self.vetoes.entry(veto.to_string()).or_insert(0) += 1;
        }
    }

    pub fn series_summary(&self, series: SeriesId) -> Option<&SeriesSummary> {
        self.series.iter().find(|s| s.series == series)
    }

    /// Write `<cut>_<sample>.summary.json` into `dir`.
    pub fn write(&self, dir: &Path, sample: &str) -> BlindResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = output_path(dir, &self.cut_name, sample, "summary.json");
        let file = std::fs::File::create(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(path)
    }

    pub fn read(path: &Path) -> BlindResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::detectors_from_names;

    fn decision(blinded: &[bool], rejected_by: &[Option<&'static str>], veto: Option<&'static str>) -> CutDecision {
        CutDecision {
            blinded: blinded.to_vec(),
            rejected_by: rejected_by.to_vec(),
            veto,
        }
    }

    #[test]
    fn counts_per_series_and_per_reason() {
        let mut summary =
            BlindingSummary::new("cBlind_133", &["s".to_string()], &detectors_from_names(&["1", "2"]));
        let a = SeriesId(11207010000);
        let b = SeriesId(11207011200);

        summary.record(a, &decision(&[true, false], &[None, Some("glitch")], None));
        summary.record(a, &decision(&[false, false], &[None, Some("glitch")], Some("random_trigger")));
        summary.record(b, &decision(&[false, true], &[Some("nr_band"), None], None));

        assert_eq!(summary.events, 3);
        assert_eq!(summary.blinded_events, 2);
        assert_eq!(summary.series.len(), 2);

        let first = summary.series_summary(a).unwrap();
        assert_eq!((first.events, first.blinded_events), (2, 1));
        assert_eq!(first.blinded_per_detector, vec![1, 0]);
        assert_eq!(first.blinded_fraction(), 0.5);

        assert_eq!(summary.rejections["glitch"], 2);
        assert_eq!(summary.rejections["nr_band"], 1);
        assert_eq!(summary.vetoes["random_trigger"], 1);
        assert!(summary.series_summary(SeriesId(1)).is_none());
    }

    #[test]
    fn writes_json_next_to_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary =
            BlindingSummary::new("cBlind_133", &["s1".to_string()], &detectors_from_names(&["1"]));
        summary.record(SeriesId(11207010000), &decision(&[true], &[None], None));

        let path = summary.write(dir.path(), "s1").unwrap();
        assert_eq!(path, dir.path().join("cBlind_133_s1.summary.json"));
        assert_eq!(BlindingSummary::read(&path).unwrap(), summary);
    }
}
