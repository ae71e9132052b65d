use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::model::{detectors_from_names, Detector};
use crate::decisions::OutputFormat;
use crate::error::BlindResult;
use crate::params::{MemoryParameterStore, ParameterStore, SqliteParameterStore};
use crate::profile::{CutChain, SourceSpec};
use crate::runner::{RunOptions, DEFAULT_CONFIGURATION};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "CXBLIND_CONFIG";

/// Where threshold and calibration parameters are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterSource {
    Csv { path: PathBuf },
    Sqlite { path: PathBuf },
}

impl Default for ParameterSource {
    fn default() -> Self {
        ParameterSource::Sqlite {
            path: PathBuf::from("parameters.db"),
        }
    }
}

impl ParameterSource {
    pub fn open(&self) -> BlindResult<Box<dyn ParameterStore>> {
        Ok(match self {
            ParameterSource::Csv { path } => Box::new(MemoryParameterStore::from_csv(path)?),
            ParameterSource::Sqlite { path } => Box::new(SqliteParameterStore::open(path)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Cut chain; when absent, the chain whose name `cut_name` carries.
    pub chain: Option<CutChain>,
    /// Name stamped on outputs; defaults to the chain's own.
    pub cut_name: Option<String>,
    pub configuration: String,
    /// Detector names in index order.
    pub detectors: Vec<String>,
    /// Detectors left out of specific samples.
    pub excluded_detectors: BTreeMap<String, Vec<String>>,
    pub step: usize,
    /// Root for relative source locations.
    pub data_dir: PathBuf,
    /// Tables to attach; empty means the chain's profile.
    pub sources: Vec<SourceSpec>,
    pub parameters: ParameterSource,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            chain: None,
            cut_name: None,
            configuration: DEFAULT_CONFIGURATION.to_string(),
            detectors: (1..=15).map(|n| n.to_string()).collect(),
            excluded_detectors: [("011203b_bg".to_string(), vec!["9".to_string()])].into(),
            step: 1,
            data_dir: PathBuf::from("."),
            sources: Vec::new(),
            parameters: ParameterSource::default(),
            output_dir: PathBuf::from("decisions"),
            output_format: OutputFormat::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let mut config: RunConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        if config.step == 0 {
            config.step = 1;
        }
        if let (Some(chain), Some(name)) = (config.chain, &config.cut_name) {
            if let Some(other) = CutChain::for_cut_name(name).filter(|other| *other != chain) {
                bail!(
                    "Config at {} names cut {name} of the {other:?} chain but selects {chain:?}",
                    path.display()
                );
            }
        }
        Ok(config)
    }

    pub fn chain(&self) -> CutChain {
        self.chain
            .or_else(|| self.cut_name.as_deref().and_then(CutChain::for_cut_name))
            .unwrap_or_default()
    }

    pub fn cut_name(&self) -> &str {
        self.cut_name.as_deref().unwrap_or_else(|| self.chain().cut_name())
    }

    pub fn source_specs(&self) -> Vec<SourceSpec> {
        if self.sources.is_empty() {
            self.chain().sources()
        } else {
            self.sources.clone()
        }
    }

    /// `path` if given, else the file named by [`CONFIG_ENV`], else the
    /// defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Detectors of `sample`, after its exclusions.
    pub fn detectors_for(&self, sample: &str) -> Vec<Detector> {
        let excluded = self.excluded_detectors.get(sample);
        let names: Vec<&String> = self
            .detectors
            .iter()
            .filter(|name| excluded.map_or(true, |list| !list.contains(*name)))
            .collect();
        detectors_from_names(&names)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            cut_name: self.cut_name().to_string(),
            configuration: self.configuration.clone(),
            step: self.step,
        }
    }
}
