//! The CDMSlite blinding chain: one energy ceiling per detector and the
//! random-trigger veto.  Reads calibrated `ptNF` and `EventCategory` only.

use super::event::RandomTrigger;
use super::{CutContext, DetectorCut, EventVeto};
use crate::error::BlindResult;

/// Total phonon energy (keV) from which nothing is blinded.
pub const MAX_PHONON_ENERGY: f64 = 85.0;

pub fn lite3_chain() -> Vec<Box<dyn DetectorCut>> {
    vec![Box::new(PhononMax)]
}

pub fn lite3_vetoes() -> Vec<Box<dyn EventVeto>> {
    vec![Box::new(RandomTrigger)]
}

pub struct PhononMax;

impl DetectorCut for PhononMax {
    fn name(&self) -> &'static str {
        "phonon_max"
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        Ok(ctx.calibrated(detector, "ptNF")? < MAX_PHONON_ENERGY)
    }
}

#[cfg(test)]
mod tests {
    use crate::cuts::role::{CALIBRATED, EVENT};
    use crate::cuts::CutEvaluator;
    use crate::cuts::{CutDecision, EventRecord};
    use crate::data::model::{detectors_from_names, SeriesId};
    use crate::params::{MemoryParameterStore, ParameterSnapshot};
    use crate::testing::{detector_names, FakeEvent, CONFIGURATION, NOMINAL_SERIES};

    fn decide(event: &FakeEvent) -> CutDecision {
        let lite3 = CutEvaluator::lite3();
        assert!(lite3.required_parameters().is_empty());
        let snapshot = ParameterSnapshot::bind(
            &MemoryParameterStore::new(),
            SeriesId(NOMINAL_SERIES),
            &detectors_from_names(&detector_names(event.detector_count())),
            CONFIGURATION,
            &[],
        )
        .unwrap();
        lite3.evaluate(event, &snapshot).unwrap()
    }

    #[test]
    fn blinds_below_the_energy_ceiling_only() {
        let mut event = FakeEvent::nominal(3);
        event.set(CALIBRATED, 0, "ptNF", 84.9);
        event.set(CALIBRATED, 1, "ptNF", 85.0);
        event.set(CALIBRATED, 2, "ptNF", 300.0);

        let decision = decide(&event);
        assert_eq!(decision.blinded, vec![true, false, false]);
        assert_eq!(decision.rejected_by, vec![None, Some("phonon_max"), Some("phonon_max")]);
    }

    #[test]
    fn random_trigger_clears_every_detector() {
        let mut event = FakeEvent::nominal(2);
        event.set_global(EVENT, "EventCategory", 1.0);

        let decision = decide(&event);
        assert_eq!(decision.blinded, vec![false, false]);
        assert_eq!(decision.veto, Some("random_trigger"));
    }

    #[test]
    fn ignores_the_standard_quality_columns() {
        // A glitchy, out-of-band event is still blinded by the lite chain.
        let mut event = FakeEvent::nominal(1);
        event
            .set(CALIBRATED, 0, "ptNF", 20.0)
            .set(CALIBRATED, 0, "ysumOF", 5.0)
            .set_global(EVENT, "VTTime20", -10.0);
        assert_eq!(decide(&event).blinded, vec![true]);
    }
}
