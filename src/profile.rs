//! The standard data profile: which tables are attached under which role,
//! which columns they must carry, and how detector modes are recognised.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cuts::detector::{LOW_THRESHOLD_DET_TYPE, NO_DATA_DET_TYPE};
use crate::cuts::{role, CutEvaluator};
use crate::data::dataset::{EventDataset, ModePolicy, ModeSignature};
use crate::data::location::LocationTemplate;
use crate::error::BlindResult;

pub const RAW_COLUMNS: &[&str] = &[
    "DetType",
    "PAOFamps",
    "PBOFamps",
    "PCOFamps",
    "PDOFamps",
    "PTglitch1OFchisq",
    "PTlfnoise1OFchisq",
    "PTOFchisq",
    "QIS1bias",
    "QIS2bias",
    "QIS1status",
    "QIS2status",
    "QOS1status",
    "QOS2status",
];

pub const CALIBRATED_COLUMNS: &[&str] = &[
    "pa2OF",
    "pc1OF",
    "precoilsumOF",
    "psumOF",
    "ptNF",
    "qi1OF",
    "qi2OF",
    "qo1OF",
    "qo2OF",
    "qsum1OF",
    "qsum2OF",
    "ysumOF",
];

pub const EVENT_COLUMNS: &[&str] = &["EventCategory", "SeriesNumber", "VTTime20"];
pub const CALIBRATED_EVENT_COLUMNS: &[&str] = &["ntrigp", "ntrigq"];

pub const LITE3_CALIBRATED_COLUMNS: &[&str] = &["ptNF"];
pub const LITE3_EVENT_COLUMNS: &[&str] = &["EventCategory", "SeriesNumber"];

/// Charge bias and status columns; low-threshold detectors have none.
pub const PROBE_COLUMNS: &[&str] = &[
    "QIS1bias",
    "QIS2bias",
    "QIS1status",
    "QOS1status",
    "QIS2status",
    "QOS2status",
];

/// Raw phonon amplitudes, only written for low-threshold detectors.
pub const NORMAL_OPTIONAL_COLUMNS: &[&str] = &["PAOFamps", "PBOFamps", "PCOFamps", "PDOFamps"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceScope {
    /// One table per detector; the location names `{detector}`.
    Detector,
    /// One table shared by every detector.
    Global,
}

/// One table to attach to a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub role: String,
    pub scope: SourceScope,
    pub location: String,
    pub columns: Vec<String>,
}

impl SourceSpec {
    pub fn new(role: &str, scope: SourceScope, location: &str, columns: &[&str]) -> Self {
        Self {
            role: role.to_string(),
            scope,
            location: location.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Parsed location with relative file patterns placed under `data_dir`.
    pub fn template_in(&self, data_dir: &Path) -> BlindResult<LocationTemplate> {
        Ok(LocationTemplate::parse(&self.location)?.with_root(data_dir))
    }

    pub fn attach(&self, dataset: &mut EventDataset, data_dir: &Path) -> BlindResult<()> {
        let template = self.template_in(data_dir)?;
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        match self.scope {
            SourceScope::Detector => dataset.attach_detector_template(&self.role, &template, &columns),
            SourceScope::Global => dataset.attach_global_template(&self.role, &template, &columns),
        }
    }
}

pub fn standard_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::new(
            role::RAW,
            SourceScope::Detector,
            "merge_{sample}:rqDir/zip{detector}",
            RAW_COLUMNS,
        ),
        SourceSpec::new(
            role::CALIBRATED,
            SourceScope::Detector,
            "calib_{sample}:rrqDir/calibzip{detector}",
            CALIBRATED_COLUMNS,
        ),
        SourceSpec::new(
            role::EVENT,
            SourceScope::Global,
            "merge_{sample}:rqDir/eventTree",
            EVENT_COLUMNS,
        ),
        SourceSpec::new(
            role::CALIBRATED_EVENT,
            SourceScope::Global,
            "calib_{sample}:rrqDir/calibevent",
            CALIBRATED_EVENT_COLUMNS,
        ),
    ]
}

/// The CDMSlite profile: calibrated total phonon energy per detector, and
/// the event category and series of every row.
pub fn lite3_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::new(
            role::CALIBRATED,
            SourceScope::Detector,
            "calib_{sample}:rrqDir/calibzip{detector}",
            LITE3_CALIBRATED_COLUMNS,
        ),
        SourceSpec::new(
            role::EVENT,
            SourceScope::Global,
            "merge_{sample}:rqDir/eventTree",
            LITE3_EVENT_COLUMNS,
        ),
    ]
}

pub fn standard_policy() -> ModePolicy {
    ModePolicy {
        probe_columns: PROBE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        normal_optional_columns: NORMAL_OPTIONAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
        exempt_roles: [role::CALIBRATED.to_string()].into(),
        signature: Some(ModeSignature {
            role: role::RAW.to_string(),
            column: "DetType".to_string(),
            allowed: vec![LOW_THRESHOLD_DET_TYPE, NO_DATA_DET_TYPE],
        }),
    }
}

/// Which cut chain a run applies.  The chain fixes the evaluator, the
/// tables it reads, the mode policy and the default cut name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutChain {
    #[default]
    Standard,
    Lite3,
}

impl CutChain {
    pub const ALL: [CutChain; 2] = [CutChain::Standard, CutChain::Lite3];

    pub fn cut_name(self) -> &'static str {
        match self {
            CutChain::Standard => "cBlind_133",
            CutChain::Lite3 => "cBlind_lite3",
        }
    }

    /// The chain whose default cut name is `name`, if any.
    pub fn for_cut_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|chain| chain.cut_name() == name)
    }

    pub fn evaluator(self) -> CutEvaluator {
        match self {
            CutChain::Standard => CutEvaluator::standard(),
            CutChain::Lite3 => CutEvaluator::lite3(),
        }
    }

    pub fn sources(self) -> Vec<SourceSpec> {
        match self {
            CutChain::Standard => standard_sources(),
            CutChain::Lite3 => lite3_sources(),
        }
    }

    /// Lite runs read no raw tables, so no detector mode is recognised.
    pub fn policy(self) -> ModePolicy {
        match self {
            CutChain::Standard => standard_policy(),
            CutChain::Lite3 => ModePolicy::default(),
        }
    }
}
