//! Per-detector predicates of the blinding chain, in evaluation order.

use super::windows::{self, Effect, Reason};
use super::{CutContext, DetectorCut};
use crate::data::model::DetectorMode;
use crate::error::BlindResult;

/// `DetType` of a detector running in low-threshold mode.
pub const LOW_THRESHOLD_DET_TYPE: f64 = 21.0;
/// `DetType` of a detector with no data in the row.
pub const NO_DATA_DET_TYPE: f64 = -999999.0;
/// Recoil energy (keV) above which nothing is blinded.
pub const MAX_RECOIL_ENERGY: f64 = 150.0;
/// Band half-width in sigmas.
pub const BAND_WIDTH_SIGMAS: f64 = 3.0;

/// Phonon channels subtracted from the total phonon energy of specific
/// detectors.
pub const CHANNEL_CORRECTIONS: &[(usize, &str)] = &[(0, "pa2OF"), (8, "pc1OF")];

const RAW_AMPLITUDES: [&str; 4] = ["PAOFamps", "PBOFamps", "PCOFamps", "PDOFamps"];
const AMPLITUDE_SCALES: [&str; 4] = ["PA1OFamps", "PB1OFamps", "PC1OFamps", "PD1OFamps"];

const A_MU: [&str; 3] = ["A_mu.0", "A_mu.1", "A_mu.2"];
const B_MU: [&str; 3] = ["b_mu.0", "b_mu.1", "b_mu.2"];
const A_SIGMA: [&str; 3] = ["A_sigma.0", "A_sigma.1", "A_sigma.2"];
const B_SIGMA: [&str; 3] = ["b_sigma.0", "b_sigma.1", "b_sigma.2"];
const X0_SIGMA: [&str; 3] = ["x0_sigma.0", "x0_sigma.1", "x0_sigma.2"];

static BAND_PARAMETERS: [&str; 15] = [
    "A_mu.0", "b_mu.0", "A_sigma.0", "b_sigma.0", "x0_sigma.0",
    "A_mu.1", "b_mu.1", "A_sigma.1", "b_sigma.1", "x0_sigma.1",
    "A_mu.2", "b_mu.2", "A_sigma.2", "b_sigma.2", "x0_sigma.2",
];

pub fn standard_chain() -> Vec<Box<dyn DetectorCut>> {
    vec![
        Box::new(ValidChannel),
        Box::new(PhononThreshold),
        Box::new(LfNoise),
        Box::new(Glitch),
        Box::new(InnerCharge::SIDE_1),
        Box::new(InnerCharge::SIDE_2),
        Box::new(ChargeSymmetry),
        Box::new(NrBand),
        Box::new(MultipleScatter),
        Box::new(RecoilMax),
        Box::new(LowThresholdSearch),
        Box::new(SourceContamination),
        Box::new(BiasPolarity),
        Box::new(GroundingFault),
    ]
}

// ---------------------------------------------------------------------------
// Shared quantities
// ---------------------------------------------------------------------------

/// Total phonon energy with the detector's channel correction applied.
pub fn corrected_phonon_energy(ctx: &CutContext<'_>, detector: usize) -> BlindResult<f64> {
    let mut energy = ctx.calibrated(detector, "psumOF")?;
    if let Some((_, channel)) = CHANNEL_CORRECTIONS.iter().find(|(i, _)| *i == detector) {
        energy -= ctx.calibrated(detector, channel)?;
    }
    Ok(energy)
}

/// Phonon energy of a low-threshold detector from its raw amplitudes.
fn scaled_amplitude_energy(ctx: &CutContext<'_>, detector: usize) -> BlindResult<f64> {
    let mut energy = 0.0;
    for (amplitude, scale) in RAW_AMPLITUDES.iter().zip(AMPLITUDE_SCALES) {
        energy += ctx.param(scale, detector)? * ctx.raw(detector, amplitude)?;
    }
    Ok(energy)
}

fn is_lf_noise(ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
    let chisq = ctx.raw(detector, "PTOFchisq")? - ctx.raw(detector, "PTlfnoise1OFchisq")?;
    Ok(ctx.param("cLFnoise1_v53", detector)? < chisq)
}

fn is_glitch(ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
    let chisq = ctx.raw(detector, "PTOFchisq")? - ctx.raw(detector, "PTglitch1OFchisq")?;
    Ok(ctx.param("cGlitch1_v53", detector)? < chisq)
}

// ---------------------------------------------------------------------------
// Cuts
// ---------------------------------------------------------------------------

pub struct ValidChannel;

impl DetectorCut for ValidChannel {
    fn name(&self) -> &'static str {
        "valid_channel"
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        let det_type = ctx.raw(detector, "DetType")?;
        Ok(det_type != LOW_THRESHOLD_DET_TYPE && det_type != NO_DATA_DET_TYPE)
    }
}

pub struct PhononThreshold;

impl DetectorCut for PhononThreshold {
    fn name(&self) -> &'static str {
        "phonon_threshold"
    }

    fn parameters(&self) -> &'static [&'static str] {
        &["min_psumOF"]
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        Ok(ctx.param("min_psumOF", detector)? < corrected_phonon_energy(ctx, detector)?)
    }
}

pub struct LfNoise;

impl DetectorCut for LfNoise {
    fn name(&self) -> &'static str {
        "lf_noise"
    }

    fn parameters(&self) -> &'static [&'static str] {
        &["cLFnoise1_v53"]
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        Ok(!is_lf_noise(ctx, detector)?)
    }
}

pub struct Glitch;

impl DetectorCut for Glitch {
    fn name(&self) -> &'static str {
        "glitch"
    }

    fn parameters(&self) -> &'static [&'static str] {
        &["cGlitch1_v53"]
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        Ok(!is_glitch(ctx, detector)?)
    }
}

/// Rejects outer-guard-ring events on one charge side: low inner charge
/// together with outer charge above noise.
pub struct InnerCharge {
    name: &'static str,
    status: &'static str,
    inner: &'static str,
    outer: &'static str,
    parameters: &'static [&'static str; 2],
}

impl InnerCharge {
    pub const SIDE_1: InnerCharge = InnerCharge {
        name: "inner_charge_1",
        status: "QIS1status",
        inner: "qi1OF",
        outer: "qo1OF",
        parameters: &["min_qi1OF", "max_qo1OF"],
    };

    pub const SIDE_2: InnerCharge = InnerCharge {
        name: "inner_charge_2",
        status: "QIS2status",
        inner: "qi2OF",
        outer: "qo2OF",
        parameters: &["min_qi2OF", "max_qo2OF"],
    };
}

impl DetectorCut for InnerCharge {
    fn name(&self) -> &'static str {
        self.name
    }

    fn parameters(&self) -> &'static [&'static str] {
        self.parameters
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        if 0.0 < ctx.raw(detector, self.status)? {
            return Ok(true);
        }
        let [min_inner, max_outer] = *self.parameters;
        let low_inner = ctx.calibrated(detector, self.inner)? < ctx.param(min_inner, detector)?;
        if low_inner && ctx.param(max_outer, detector)? < ctx.calibrated(detector, self.outer)? {
            return Ok(false);
        }
        Ok(true)
    }
}

/// Rejects events near one face: charge collected on one side only.
pub struct ChargeSymmetry;

const CHARGE_STATUSES: [&str; 4] = ["QIS1status", "QOS1status", "QIS2status", "QOS2status"];

impl DetectorCut for ChargeSymmetry {
    fn name(&self) -> &'static str {
        "charge_symmetry"
    }

    fn parameters(&self) -> &'static [&'static str] {
        &["min_qsum1OF", "max_qsum1OF", "min_qsum2OF", "max_qsum2OF"]
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        for status in CHARGE_STATUSES {
            if 0.0 < ctx.raw(detector, status)? {
                return Ok(true);
            }
        }

        let qsum1 = ctx.calibrated(detector, "qsum1OF")?;
        let qsum2 = ctx.calibrated(detector, "qsum2OF")?;
        if qsum1 < ctx.param("min_qsum1OF", detector)? && ctx.param("max_qsum2OF", detector)? < qsum2 {
            return Ok(false);
        }
        if qsum2 < ctx.param("min_qsum2OF", detector)? && ctx.param("max_qsum1OF", detector)? < qsum1 {
            return Ok(false);
        }
        Ok(true)
    }
}

/// Keeps events inside the nuclear-recoil band of any calibration period.
pub struct NrBand;

impl NrBand {
    /// Whether `yield_` lies strictly within the band half-width of period
    /// `k` at recoil energy `energy`.
    fn within(ctx: &CutContext<'_>, detector: usize, k: usize, energy: f64, yield_: f64) -> BlindResult<bool> {
        let mean = ctx.param(A_MU[k], detector)? * energy.powf(ctx.param(B_MU[k], detector)?);

        let x0 = ctx.param(X0_SIGMA[k], detector)?;
        let clamped = if x0 < energy { x0 } else { energy };
        let sigma = ctx.param(A_SIGMA[k], detector)? * clamped.powf(ctx.param(B_SIGMA[k], detector)?);

        Ok((yield_ - mean).abs() < BAND_WIDTH_SIGMAS * sigma)
    }
}

impl DetectorCut for NrBand {
    fn name(&self) -> &'static str {
        "nr_band"
    }

    fn parameters(&self) -> &'static [&'static str] {
        &BAND_PARAMETERS
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        let energy = ctx.calibrated(detector, "precoilsumOF")?;
        if !(0.0 < energy) {
            return Ok(false);
        }
        let yield_ = ctx.calibrated(detector, "ysumOF")?;
        for k in 0..A_MU.len() {
            if Self::within(ctx, detector, k, energy, yield_)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Rejects the detector when any other detector is above its multiple
/// scatter threshold.
pub struct MultipleScatter;

impl DetectorCut for MultipleScatter {
    fn name(&self) -> &'static str {
        "multiple_scatter"
    }

    fn parameters(&self) -> &'static [&'static str] {
        &[
            "max_psumOF",
            "PA1OFamps",
            "PB1OFamps",
            "PC1OFamps",
            "PD1OFamps",
            "cLFnoise1_v53",
            "cGlitch1_v53",
        ]
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        for other in (0..ctx.detector_count()).filter(|&j| j != detector) {
            if ctx.raw(other, "DetType")? == NO_DATA_DET_TYPE {
                continue;
            }
            let energy = match ctx.detector_mode(other) {
                DetectorMode::LowThreshold => scaled_amplitude_energy(ctx, other)?,
                DetectorMode::Normal => corrected_phonon_energy(ctx, other)?,
            };
            if ctx.param("max_psumOF", other)? < energy {
                // a noisy trigger on this detector does not count the neighbour
                if is_lf_noise(ctx, detector)? || is_glitch(ctx, detector)? {
                    continue;
                }
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub struct RecoilMax;

impl DetectorCut for RecoilMax {
    fn name(&self) -> &'static str {
        "recoil_max"
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        Ok(ctx.calibrated(detector, "precoilsumOF")? < MAX_RECOIL_ENERGY)
    }
}

/// Leaves low-threshold search detectors unblinded inside their windows and,
/// later, below the bias-dependent energy cap.
pub struct LowThresholdSearch;

impl DetectorCut for LowThresholdSearch {
    fn name(&self) -> &'static str {
        "low_threshold_search"
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        let series = ctx.series()?;
        let Some(window) = windows::matching(Reason::LowThresholdSearch, Some(detector), series) else {
            return Ok(true);
        };
        match window.effect {
            Effect::Exclude => Ok(false),
            Effect::EnergyCap => {
                let cap = windows::low_threshold_energy_cap(
                    ctx.raw(detector, "QIS1bias")?,
                    ctx.raw(detector, "QIS2bias")?,
                );
                Ok(!(ctx.calibrated(detector, "ptNF")? < cap))
            }
        }
    }
}

pub struct SourceContamination;

impl DetectorCut for SourceContamination {
    fn name(&self) -> &'static str {
        "source_contamination"
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        let series = ctx.series()?;
        Ok(windows::matching(Reason::SourceContamination, Some(detector), series).is_none())
    }
}

/// Rejects reverse-biased detectors.
pub struct BiasPolarity;

impl DetectorCut for BiasPolarity {
    fn name(&self) -> &'static str {
        "bias_polarity"
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        let side1 = ctx.raw(detector, "QIS1bias")?;
        let side2 = ctx.raw(detector, "QIS2bias")?;
        Ok(!(side1 < 0.0 && 0.0 < side2))
    }
}

pub struct GroundingFault;

impl DetectorCut for GroundingFault {
    fn name(&self) -> &'static str {
        "grounding_fault"
    }

    fn keeps(&self, ctx: &CutContext<'_>, detector: usize) -> BlindResult<bool> {
        let series = ctx.series()?;
        Ok(windows::matching(Reason::GroundingFault, Some(detector), series).is_none())
    }
}
