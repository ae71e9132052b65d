//! The blinding decision engine.
//!
//! ```text
//!   row values + ParameterSnapshot
//!        │
//!        ▼
//!   DetectorCut chain   per detector, first failure wins
//!        │
//!        ▼
//!   EventVeto list      first true veto clears every detector
//!        │
//!        ▼
//!   CutDecision
//! ```
//!
//! Evaluation is a pure function of the current row and the snapshot bound
//! for its series; nothing is cached between rows.

pub mod detector;
pub mod event;
pub mod lite3;
pub mod windows;

use std::collections::BTreeSet;

use crate::data::dataset::EventDataset;
use crate::data::model::{DetectorMode, SeriesId};
use crate::error::BlindResult;
use crate::params::ParameterSnapshot;

/// Roles under which the standard profile attaches its tables.
pub mod role {
    /// Per-detector raw reduced quantities.
    pub const RAW: &str = "raw";
    /// Per-detector calibrated quantities; never read for low-threshold
    /// detectors.
    pub const CALIBRATED: &str = "calibrated";
    /// Per-event raw quantities.
    pub const EVENT: &str = "event";
    /// Per-event calibrated quantities.
    pub const CALIBRATED_EVENT: &str = "calibrated_event";
}

/// Column of the event role carrying the series number.
pub const SERIES_COLUMN: &str = "SeriesNumber";

// ---------------------------------------------------------------------------
// EventRecord – read-only view of the current row
// ---------------------------------------------------------------------------

/// Current-row values of every attached table.
pub trait EventRecord {
    fn detector_count(&self) -> usize;
    fn detector_mode(&self, detector: usize) -> DetectorMode;
    fn detector_value(&self, role: &str, detector: usize, column: &str) -> BlindResult<f64>;
    fn global_value(&self, role: &str, column: &str) -> BlindResult<f64>;
}

impl EventRecord for EventDataset {
    fn detector_count(&self) -> usize {
        self.detectors().len()
    }

    fn detector_mode(&self, detector: usize) -> DetectorMode {
        self.detectors()
            .get(detector)
            .map(|d| d.mode)
            .unwrap_or_default()
    }

    fn detector_value(&self, role: &str, detector: usize, column: &str) -> BlindResult<f64> {
        EventDataset::detector_value(self, role, detector, column)
    }

    fn global_value(&self, role: &str, column: &str) -> BlindResult<f64> {
        EventDataset::global_value(self, role, column)
    }
}

/// Series number of the row currently held by `event`.
pub fn current_series(event: &dyn EventRecord) -> BlindResult<SeriesId> {
    event
        .global_value(role::EVENT, SERIES_COLUMN)
        .map(SeriesId::from_value)
}

// ---------------------------------------------------------------------------
// CutContext – what a predicate may look at
// ---------------------------------------------------------------------------

pub struct CutContext<'a> {
    event: &'a dyn EventRecord,
    params: &'a ParameterSnapshot,
}

impl<'a> CutContext<'a> {
    pub fn new(event: &'a dyn EventRecord, params: &'a ParameterSnapshot) -> Self {
        Self { event, params }
    }

    pub fn detector_count(&self) -> usize {
        self.event.detector_count()
    }

    pub fn detector_mode(&self, detector: usize) -> DetectorMode {
        self.event.detector_mode(detector)
    }

    pub fn raw(&self, detector: usize, column: &str) -> BlindResult<f64> {
        self.event.detector_value(role::RAW, detector, column)
    }

    pub fn calibrated(&self, detector: usize, column: &str) -> BlindResult<f64> {
        self.event.detector_value(role::CALIBRATED, detector, column)
    }

    pub fn event(&self, column: &str) -> BlindResult<f64> {
        self.event.global_value(role::EVENT, column)
    }

    pub fn calibrated_event(&self, column: &str) -> BlindResult<f64> {
        self.event.global_value(role::CALIBRATED_EVENT, column)
    }

    pub fn param(&self, name: &str, detector: usize) -> BlindResult<f64> {
        self.params.get(name, detector)
    }

    pub fn series(&self) -> BlindResult<SeriesId> {
        current_series(self.event)
    }
}

// ---------------------------------------------------------------------------
// Cut traits
// ---------------------------------------------------------------------------

/// One per-detector predicate.  `keeps` returning `false` disqualifies the
/// detector from blinding for this row.
pub trait DetectorCut {
    fn name(&self) -> &'static str;

    /// Snapshot parameters this cut reads.
    fn parameters(&self) -> &'static [&'static str] {
        &[]
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool>;
}

/// One per-event predicate.  A true veto disqualifies every detector.
pub trait EventVeto {
    fn name(&self) -> &'static str;

    fn parameters(&self) -> &'static [&'static str] {
        &[]
    }

    fn vetoes(&self, ctx: &CutContext<'_>) -> BlindResult<bool>;
}

// ---------------------------------------------------------------------------
// CutDecision
// ---------------------------------------------------------------------------

/// Outcome of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutDecision {
    pub blinded: Vec<bool>,
    /// First cut that rejected each detector, if any.
    pub rejected_by: Vec<Option<&'static str>>,
    /// Event veto that cleared the row, if any.
    pub veto: Option<&'static str>,
}

impl CutDecision {
    fn new(detectors: usize) -> Self {
        Self {
            blinded: vec![true; detectors],
            rejected_by: vec![None; detectors],
            veto: None,
        }
    }

    pub fn any_blinded(&self) -> bool {
        self.blinded.iter().any(|&b| b)
    }
}

// ---------------------------------------------------------------------------
// CutEvaluator
// ---------------------------------------------------------------------------

pub struct CutEvaluator {
    detector_cuts: Vec<Box<dyn DetectorCut>>,
    event_vetoes: Vec<Box<dyn EventVeto>>,
}

impl CutEvaluator {
    pub fn new(detector_cuts: Vec<Box<dyn DetectorCut>>, event_vetoes: Vec<Box<dyn EventVeto>>) -> Self {
        Self {
            detector_cuts,
            event_vetoes,
        }
    }

    /// The full blinding chain.
    pub fn standard() -> Self {
        Self::new(detector::standard_chain(), event::standard_vetoes())
    }

    /// The CDMSlite chain: energy ceiling and random-trigger veto.
    pub fn lite3() -> Self {
        Self::new(lite3::lite3_chain(), lite3::lite3_vetoes())
    }

    pub fn detector_cut_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.detector_cuts.iter().map(|c| c.name())
    }

    pub fn event_veto_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.event_vetoes.iter().map(|v| v.name())
    }

    /// Union of every parameter the chain reads, in a stable order.
    pub fn required_parameters(&self) -> Vec<&'static str> {
        let mut seen = BTreeSet::new();
        self.detector_cuts
            .iter()
            .flat_map(|c| c.parameters().iter())
            .chain(self.event_vetoes.iter().flat_map(|v| v.parameters().iter()))
            .copied()
            .filter(|name| seen.insert(*name))
            .collect()
    }

    pub fn evaluate(
        &self,
        event: &dyn EventRecord,
        params: &ParameterSnapshot,
    ) -> BlindResult<CutDecision> {
        let ctx = CutContext::new(event, params);
        let mut decision = CutDecision::new(event.detector_count());

        for detector in 0..decision.blinded.len() {
            for cut in &self.detector_cuts {
                if !cut.keeps(&ctx, detector)? {
                    decision.blinded[detector] = false;
                    decision.rejected_by[detector] = Some(cut.name());
                    break;
                }
            }
        }

        for veto in &self.event_vetoes {
            if veto.vetoes(&ctx)? {
                decision.blinded.iter_mut().for_each(|b| *b = false);
                decision.veto = Some(veto.name());
                break;
            }
        }

        Ok(decision)
    }
}
