//! One blinding pass over one sample.
//!
//! ```text
//!   load ─► validate ─► for each row (with stride):
//!                          read ─► series changed? ─► rebind ─► evaluate ─► record
//! ```
//!
//! Decisions and the summary belong to the runner and survive only a
//! successful pass.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::cuts::{current_series, CutEvaluator};
use crate::data::dataset::EventDataset;
use crate::data::model::SeriesId;
use crate::decisions::{DecisionSink, DecisionTable};
use crate::error::BlindError;
use crate::params::{ParameterSnapshot, ParameterStore};
use crate::profile::SourceSpec;
use crate::summary::BlindingSummary;

pub const DEFAULT_CUT_NAME: &str = "cBlind_133";
pub const DEFAULT_CONFIGURATION: &str = "Prodv5-3";
/// Rows between two progress messages.
pub const PROGRESS_INTERVAL: usize = 10_000;

// ---------------------------------------------------------------------------
// Stages and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Load,
    Validate,
    Read,
    Rebind,
    Evaluate,
    Save,
}

impl RunStage {
    /// Status code reported for a pass aborted in this stage.
    pub fn code(self) -> i32 {
        match self {
            RunStage::Load => 1,
            RunStage::Validate => 2,
            RunStage::Read => 3,
            RunStage::Rebind => 4,
            RunStage::Evaluate => 5,
            RunStage::Save => 6,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Load => "load",
            RunStage::Validate => "validate",
            RunStage::Read => "read",
            RunStage::Rebind => "rebind",
            RunStage::Evaluate => "evaluate",
            RunStage::Save => "save",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed (status {}): {source}", .stage.code())]
pub struct RunError {
    pub stage: RunStage,
    #[source]
    pub source: BlindError,
}

impl RunError {
    fn at(stage: RunStage) -> impl FnOnce(BlindError) -> RunError {
        move |source| RunError { stage, source }
    }

    pub fn code(&self) -> i32 {
        self.stage.code()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub cut_name: String,
    pub configuration: String,
    /// Row stride; values below one are treated as one.
    pub step: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cut_name: DEFAULT_CUT_NAME.to_string(),
            configuration: DEFAULT_CONFIGURATION.to_string(),
            step: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Validated row count of the dataset.
    pub events: usize,
    pub rows_processed: usize,
    pub rebinds: usize,
    pub blinded_events: usize,
}

pub struct BlindingRunner {
    evaluator: CutEvaluator,
    options: RunOptions,
    decisions: Option<DecisionTable>,
    summary: Option<BlindingSummary>,
}

impl BlindingRunner {
    pub fn new(evaluator: CutEvaluator, options: RunOptions) -> Self {
        Self {
            evaluator,
            options,
            decisions: None,
            summary: None,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Decisions of the last successful pass.
    pub fn decisions(&self) -> Option<&DecisionTable> {
        self.decisions.as_ref()
    }

    pub fn summary(&self) -> Option<&BlindingSummary> {
        self.summary.as_ref()
    }

    pub fn reset(&mut self) {
        self.decisions = None;
        self.summary = None;
    }

    pub fn run(
        &mut self,
        dataset: &mut EventDataset,
        sources: &[SourceSpec],
        data_dir: &Path,
        store: &dyn ParameterStore,
    ) -> Result<RunReport, RunError> {
        self.reset();

        for source in sources {
            source.attach(dataset, data_dir).map_err(RunError::at(RunStage::Load))?;
        }
        let events = dataset.validate().map_err(RunError::at(RunStage::Validate))?;

        let low_threshold = dataset.detectors().iter().filter(|d| d.is_low_threshold()).count();
        info!(
            "processing {events} rows of {} ({} detectors, {low_threshold} low-threshold)",
            dataset.samples().join(","),
            dataset.detectors().len()
        );

        let parameters = self.evaluator.required_parameters();
        let mut decisions = DecisionTable::new(dataset.detectors());
        let mut summary =
            BlindingSummary::new(&self.options.cut_name, dataset.samples(), dataset.detectors());
        let mut bound: Option<(SeriesId, ParameterSnapshot)> = None;
        let mut rows_processed = 0;
        let mut rebinds = 0;

        for row in (0..events).step_by(self.options.step.max(1)) {
            dataset.read_row(row).map_err(RunError::at(RunStage::Read))?;
            let series = current_series(&*dataset).map_err(RunError::at(RunStage::Read))?;

            let snapshot = match bound.take() {
                Some((previous, snapshot)) if previous == series => snapshot,
                finished => {
                    let done = finished.and_then(|(previous, _)| summary.series_summary(previous));
                    if let Some(done) = done {
                        debug!(
                            "series {}: {:.1}% of {} rows blinded",
                            done.series,
                            100.0 * done.blinded_fraction(),
                            done.events
                        );
                    }
                    debug!("binding parameters for series {series}");
                    rebinds += 1;
                    ParameterSnapshot::bind(
                        store,
                        series,
                        dataset.detectors(),
                        &self.options.configuration,
                        &parameters,
                    )
                    .map_err(RunError::at(RunStage::Rebind))?
                }
            };

            let decision = self
                .evaluator
                .evaluate(&*dataset, &snapshot)
                .map_err(RunError::at(RunStage::Evaluate))?;
            decisions.push(&decision.blinded);
            summary.record(series, &decision);
            bound = Some((series, snapshot));

            rows_processed += 1;
            if rows_processed % PROGRESS_INTERVAL == 0 {
                info!("processing data >> {} / {events}", row + 1);
            }
        }

        decisions.rows().map_err(RunError::at(RunStage::Evaluate))?;
        let blinded_events = summary.blinded_events;
        self.decisions = Some(decisions);
        self.summary = Some(summary);

        Ok(RunReport {
            events,
            rows_processed,
            rebinds,
            blinded_events,
        })
    }

    /// Persist decisions and summary of the last successful pass.  Writes
    /// nothing after an aborted one.
    pub fn write_outputs(
        &self,
        sink: &mut dyn DecisionSink,
        dir: &Path,
        sample: &str,
    ) -> Result<Vec<PathBuf>, RunError> {
        let (Some(decisions), Some(summary)) = (&self.decisions, &self.summary) else {
            return Ok(Vec::new());
        };
        let table = sink
            .write(&self.options.cut_name, sample, decisions)
            .map_err(RunError::at(RunStage::Save))?;
        let json = summary
            .write(dir, sample)
            .map_err(RunError::at(RunStage::Save))?;
        Ok(vec![table, json])
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::data::model::detectors_from_names;
    use crate::decisions::OutputFormat;
    use crate::error::BlindResult;
    use crate::params::MemoryParameterStore;
    use crate::profile::{standard_policy, standard_sources, SourceScope};
    use crate::testing::{detector_names, nominal_store, SampleTables};

    /// Counts snapshot binds through one probe key.
    struct CountingStore {
        inner: MemoryParameterStore,
        binds: Cell<usize>,
    }

    impl ParameterStore for CountingStore {
        fn lookup(
            &self,
            series: &str,
            detector: &str,
            configuration: &str,
            parameter: &str,
        ) -> BlindResult<Option<f64>> {
            if detector == "1" && parameter == "min_psumOF" {
                self.binds.set(self.binds.get() + 1);
            }
            self.inner.lookup(series, detector, configuration, parameter)
        }
    }

    fn dataset(tables: &SampleTables) -> EventDataset {
        EventDataset::new(
            vec![tables.sample.clone()],
            detectors_from_names(&detector_names(tables.detectors)),
            standard_policy(),
            Box::new(tables.resolver()),
        )
    }

    fn runner(step: usize) -> BlindingRunner {
        BlindingRunner::new(
            CutEvaluator::standard(),
            RunOptions {
                step,
                ..RunOptions::default()
            },
        )
    }

    #[test]
    fn parameters_are_bound_once_per_series() {
        let series = vec![
            11207010000.0,
            11207010000.0,
            11207010000.0,
            11207011100.0,
            11207011100.0,
            11207011100.0,
            11207011100.0,
            11207012200.0,
            11207012200.0,
            11207012200.0,
        ];
        let tables = SampleTables::new("s", 2, series).hit(4, 0);
        let store = CountingStore {
            inner: nominal_store(2),
            binds: Cell::new(0),
        };

        let mut runner = runner(1);
        let report = runner
            .run(&mut dataset(&tables), &standard_sources(), Path::new(""), &store)
            .unwrap();

        assert_eq!(store.binds.get(), 3);
        assert_eq!(report.rebinds, 3);
        assert_eq!(report.events, 10);
        assert_eq!(report.rows_processed, 10);
        assert_eq!(report.blinded_events, 1);
        assert_eq!(runner.decisions().unwrap().rows().unwrap(), 10);
        assert_eq!(runner.summary().unwrap().series.len(), 3);
    }

    #[test]
    fn random_trigger_clears_its_row_only() {
        let tables = SampleTables::new("s", 2, vec![11207010000.0; 5])
            .hit(0, 0)
            .hit(1, 1)
            .hit(2, 0)
            .hit(3, 1)
            .random_trigger(2);
        let mut runner = runner(1);
        runner
            .run(&mut dataset(&tables), &standard_sources(), Path::new(""), &nominal_store(2))
            .unwrap();

        let decisions = runner.decisions().unwrap();
        assert_eq!(decisions.column(0).unwrap(), [true, false, false, false, false]);
        assert_eq!(decisions.column(1).unwrap(), [false, true, false, true, false]);
        assert_eq!(decisions.any_detector().unwrap(), vec![true, true, false, true, false]);
        assert_eq!(runner.summary().unwrap().vetoes["random_trigger"], 1);
    }

    #[test]
    fn stride_skips_rows() {
        let tables = SampleTables::new("s", 1, vec![11207010000.0; 7]).hit(2, 0).hit(3, 0);
        let mut runner = runner(2);
        let report = runner
            .run(&mut dataset(&tables), &standard_sources(), Path::new(""), &nominal_store(1))
            .unwrap();

        assert_eq!(report.rows_processed, 4);
        assert_eq!(runner.decisions().unwrap().column(0).unwrap(), [false, true, false, false]);
    }

    #[test]
    fn low_threshold_detector_is_never_blinded() {
        let tables = SampleTables::new("s", 2, vec![11207010000.0; 3])
            .hit(0, 0)
            .low_threshold(1);
        let mut runner = runner(1);
        let mut dataset = dataset(&tables);
        runner
            .run(&mut dataset, &standard_sources(), Path::new(""), &nominal_store(2))
            .unwrap();

        assert!(dataset.detectors()[1].is_low_threshold());
        assert_eq!(runner.decisions().unwrap().column(0).unwrap(), [true, false, false]);
        assert_eq!(runner.decisions().unwrap().column(1).unwrap(), [false, false, false]);
        assert_eq!(runner.summary().unwrap().rejections["valid_channel"], 3);
    }

    #[test]
    fn aborted_stages_carry_their_status_code() {
        let tables = SampleTables::new("s", 1, vec![11207010000.0; 2]);

        let bad_location = vec![SourceSpec::new(
            "raw",
            SourceScope::Detector,
            "no-table-part",
            &["DetType"],
        )];
        let err = runner(1)
            .run(&mut dataset(&tables), &bad_location, Path::new(""), &nominal_store(1))
            .unwrap_err();
        assert_eq!((err.stage, err.code()), (RunStage::Load, 1));

        let short = tables.clone().truncate_event_table(1);
        let err = runner(1)
            .run(&mut dataset(&short), &standard_sources(), Path::new(""), &nominal_store(1))
            .unwrap_err();
        assert_eq!((err.stage, err.code()), (RunStage::Validate, 2));
        assert!(matches!(err.source, BlindError::RowCountMismatch { .. }));

        let mut runner = runner(1);
        let err = runner
            .run(&mut dataset(&tables), &standard_sources(), Path::new(""), &MemoryParameterStore::new())
            .unwrap_err();
        assert_eq!((err.stage, err.code()), (RunStage::Rebind, 4));
        assert!(matches!(err.source, BlindError::ParameterNotFound { .. }));
        assert!(runner.decisions().is_none());

        let dir = tempfile::tempdir().unwrap();
        let mut sink = OutputFormat::Parquet.sink(dir.path());
        assert!(runner.write_outputs(sink.as_mut(), dir.path(), "s").unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn successful_pass_writes_decisions_and_summary() {
        let tables = SampleTables::new("s", 2, vec![11207010000.0; 3]).hit(1, 1);
        let mut runner = runner(1);
        runner
            .run(&mut dataset(&tables), &standard_sources(), Path::new(""), &nominal_store(2))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut sink = OutputFormat::Csv.sink(dir.path());
        let written = runner.write_outputs(sink.as_mut(), dir.path(), "s").unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("cBlind_133_s.csv"), dir.path().join("cBlind_133_s.summary.json")]
        );
        let text = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(text, "zip1,zip2,event\n0,0,0\n0,1,1\n0,0,0\n");

        runner.reset();
        assert!(runner.decisions().is_none());
    }
}
