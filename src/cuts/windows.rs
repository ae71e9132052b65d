//! Historical series windows excluded from blinding.
//!
//! These are run-book facts, not logic: calibration blackouts, the
//! low-threshold search detectors, a contaminating source and a grounding
//! fault.  Every bound is exclusive.

use crate::data::model::SeriesId;

/// Ionization energy cap (keVee) applied to low-threshold search detectors
/// after the final window opens.
pub const LOW_THRESHOLD_ENERGY_CAP: f64 = 10.0;
/// Cap growth per volt of bias difference between the two sides.
pub const LOW_THRESHOLD_BIAS_SLOPE: f64 = 0.0781633;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    CalibrationBlackout,
    LowThresholdSearch,
    SourceContamination,
    GroundingFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Event,
    Detectors(&'static [usize]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Never blind inside the window.
    Exclude,
    /// Do not blind events below the bias-dependent energy cap.
    EnergyCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExclusionWindow {
    pub reason: Reason,
    pub scope: Scope,
    pub after: i64,
    pub before: i64,
    pub effect: Effect,
}

impl ExclusionWindow {
    pub fn contains(&self, series: SeriesId) -> bool {
        self.after < series.0 && series.0 < self.before
    }

    pub fn applies_to(&self, detector: Option<usize>) -> bool {
        match (self.scope, detector) {
            (Scope::Event, None) => true,
            (Scope::Detectors(list), Some(index)) => list.contains(&index),
            _ => false,
        }
    }
}

const LOW_THRESHOLD_DETECTORS: &[usize] = &[0, 2, 3, 4, 10, 11, 13, 14];

const fn window(reason: Reason, scope: Scope, after: i64, before: i64) -> ExclusionWindow {
    ExclusionWindow {
        reason,
        scope,
        after,
        before,
        effect: Effect::Exclude,
    }
}

pub static EXCLUSION_WINDOWS: &[ExclusionWindow] = &[
    // two days following each Cf calibration
    window(Reason::CalibrationBlackout, Scope::Event, 11204111436, 11204131603),
    window(Reason::CalibrationBlackout, Scope::Event, 11208221428, 11208241656),
    window(Reason::CalibrationBlackout, Scope::Event, 11208301401, 11209021718),
    window(Reason::CalibrationBlackout, Scope::Event, 11301151609, 11301171645),
    window(
        Reason::LowThresholdSearch,
        Scope::Detectors(LOW_THRESHOLD_DETECTORS),
        11204111436,
        11204211657,
    ),
    window(
        Reason::LowThresholdSearch,
        Scope::Detectors(LOW_THRESHOLD_DETECTORS),
        11208221428,
        11209091651,
    ),
    ExclusionWindow {
        reason: Reason::LowThresholdSearch,
        scope: Scope::Detectors(LOW_THRESHOLD_DETECTORS),
        after: 11210010000,
        before: i64::MAX,
        effect: Effect::EnergyCap,
    },
    // T3Z1 and T3Z3 before June 1st 2012
    window(
        Reason::SourceContamination,
        Scope::Detectors(&[6, 8]),
        i64::MIN,
        11206010911,
    ),
    // T3Z1 with S1 grounded, August 2012
    window(Reason::GroundingFault, Scope::Detectors(&[6]), 11208170659, 11208211716),
    window(Reason::GroundingFault, Scope::Detectors(&[6]), 11208300605, 11208311600),
];

/// First window for `reason` covering `series` for the detector (or the
/// whole event when `detector` is `None`).
pub fn matching(
    reason: Reason,
    detector: Option<usize>,
    series: SeriesId,
) -> Option<&'static ExclusionWindow> {
    EXCLUSION_WINDOWS
        .iter()
        .filter(|w| w.reason == reason && w.applies_to(detector))
        .find(|w| w.contains(series))
}

/// Energy below which a low-threshold search detector is not blinded.
pub fn low_threshold_energy_cap(bias_side1: f64, bias_side2: f64) -> f64 {
    LOW_THRESHOLD_ENERGY_CAP * (1.0 + LOW_THRESHOLD_BIAS_SLOPE * (bias_side1 - bias_side2).abs())
}
