use std::path::Path;

use crate::error::{BlindError, BlindResult};

pub const SAMPLE_PLACEHOLDER: &str = "{sample}";
pub const DETECTOR_PLACEHOLDER: &str = "{detector}";

/// A `<files>:<table>` location split into its two halves.
///
/// The files half is a glob over sample containers with a `{sample}`
/// placeholder; the table half names a table inside each container and may
/// carry a `{detector}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationTemplate {
    raw: String,
    files: String,
    table: String,
}

impl LocationTemplate {
    pub fn parse(location: &str) -> BlindResult<Self> {
        let slices: Vec<&str> = location.split(':').collect();
        match slices.as_slice() {
            [files, table] if !files.is_empty() && !table.is_empty() => Ok(Self {
                raw: location.to_string(),
                files: files.to_string(),
                table: table.to_string(),
            }),
            _ => Err(BlindError::LocationFormat {
                location: location.to_string(),
            }),
        }
    }

    /// The same location with a relative files half placed under `root`.
    /// `root` is joined after parsing, so it may itself contain `:`.
    pub fn with_root(&self, root: &Path) -> Self {
        if root.as_os_str().is_empty() || Path::new(&self.files).is_absolute() {
            return self.clone();
        }
        let files = root.join(&self.files).to_string_lossy().into_owned();
        Self {
            raw: format!("{files}:{}", self.table),
            files,
            table: self.table.clone(),
        }
    }

    pub fn files_for(&self, sample: &str) -> String {
        self.files.replace(SAMPLE_PLACEHOLDER, sample)
    }

    pub fn table_for(&self, detector: Option<&str>) -> String {
        match detector {
            Some(name) => self.table.replace(DETECTOR_PLACEHOLDER, name),
            None => self.table.clone(),
        }
    }

    /// Fully substituted location, used to name a source in messages.
    pub fn describe(&self, samples: &[String], detector: Option<&str>) -> String {
        let files = samples
            .iter()
            .map(|s| self.files_for(s))
            .collect::<Vec<_>>()
            .join(",");
        format!("{files}:{}", self.table_for(detector))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}
