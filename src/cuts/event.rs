//! Event-wide vetoes, checked after every detector has been evaluated.

use super::windows::{self, Reason};
use super::{CutContext, EventVeto};
use crate::error::BlindResult;

/// Veto-shield hits this many microseconds before the trigger clear the event.
pub const VETO_WINDOW_US: f64 = -25.0;
pub const RANDOM_TRIGGER_CATEGORY: f64 = 1.0;
pub const MAX_PHONON_TRIGGER_EXCESS: f64 = 6.0;
pub const MAX_CHARGE_TRIGGER_EXCESS: f64 = 1.0;

pub fn standard_vetoes() -> Vec<Box<dyn EventVeto>> {
    vec![
        Box::new(VetoTiming),
        Box::new(RandomTrigger),
        Box::new(TriggerAsymmetry),
        Box::new(CalibrationBlackout),
    ]
}

pub struct VetoTiming;

impl EventVeto for VetoTiming {
    fn name(&self) -> &'static str {
        "veto_timing"
    }

    fn vetoes(&self, ctx: &CutContext<'_>) -> BlindResult<bool> {
        let time = ctx.event("VTTime20")?;
        Ok(VETO_WINDOW_US < time && time < 0.0)
    }
}

pub struct RandomTrigger;

impl EventVeto for RandomTrigger {
    fn name(&self) -> &'static str {
        "random_trigger"
    }

    fn vetoes(&self, ctx: &CutContext<'_>) -> BlindResult<bool> {
        Ok(ctx.event("EventCategory")? == RANDOM_TRIGGER_CATEGORY)
    }
}

/// Trigger-count definition of a glitch: far more phonon than charge
/// triggers, or the reverse.
pub struct TriggerAsymmetry;

impl EventVeto for TriggerAsymmetry {
    fn name(&self) -> &'static str {
        "trigger_asymmetry"
    }

    fn vetoes(&self, ctx: &CutContext<'_>) -> BlindResult<bool> {
        let phonon = ctx.calibrated_event("ntrigp")?;
        let charge = ctx.calibrated_event("ntrigq")?;
        Ok(MAX_PHONON_TRIGGER_EXCESS < phonon - charge || MAX_CHARGE_TRIGGER_EXCESS < charge - phonon)
    }
}

pub struct CalibrationBlackout;

impl EventVeto for CalibrationBlackout {
    fn name(&self) -> &'static str {
        "calibration_blackout"
    }

    fn vetoes(&self, ctx: &CutContext<'_>) -> BlindResult<bool> {
        let series = ctx.series()?;
        Ok(windows::matching(Reason::CalibrationBlackout, None, series).is_some())
    }
}
