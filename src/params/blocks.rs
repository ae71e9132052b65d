//! Threshold block files: noise thresholds measured over consecutive blocks of
//! series, each line giving the last series of a block and its threshold.

use std::path::Path;

use anyhow::{Context, anyhow};

use super::ParameterRecord;
use crate::error::{BlindError, BlindResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdBlock {
    pub last_series: i64,
    pub value: f64,
}

/// Read `<last series> <value>` lines.
pub fn read_blocks(path: &Path) -> BlindResult<Vec<ThresholdBlock>> {
    let text = std::fs::read_to_string(path)?;
    parse_blocks(&text).map_err(|source| BlindError::Storage {
        path: path.display().to_string(),
        source,
    })
}

fn parse_blocks(text: &str) -> anyhow::Result<Vec<ThresholdBlock>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(no, line)| {
            let mut fields = line.split_whitespace();
            let (Some(last), Some(value)) = (fields.next(), fields.next()) else {
                return Err(anyhow!("line {}: expected '<series> <value>'", no + 1));
            };
            Ok(ThresholdBlock {
                last_series: last
                    .parse()
                    .with_context(|| format!("line {}: bad series '{last}'", no + 1))?,
                value: value
                    .parse()
                    .with_context(|| format!("line {}: bad value '{value}'", no + 1))?,
            })
        })
        .collect()
}

/// Read a list of series names, one per line.
pub fn read_series_list(path: &Path) -> BlindResult<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Assign each series, in ascending order, the threshold of its block.
///
/// The block index advances by one whenever a series lies past the current
/// block's last series; series beyond the final block get no value.
pub fn assign_blocks(
    series_names: &[String],
    blocks: &[ThresholdBlock],
) -> BlindResult<Vec<(String, f64)>> {
    let mut series = Vec::with_capacity(series_names.len());
    for name in series_names {
        let id: i64 = name.parse().map_err(|_| BlindError::Storage {
            path: "series list".to_string(),
            source: anyhow!("series name '{name}' is not numeric"),
        })?;
        series.push((id, name));
    }
    series.sort();

    let mut assigned = Vec::with_capacity(series.len());
    let mut block = 0;
    if blocks.is_empty() {
        return Ok(assigned);
    }

    for (id, name) in series {
        if blocks[block].last_series < id {
            block += 1;
        }
        if block == blocks.len() {
            break;
        }
        assigned.push((name.clone(), blocks[block].value));
    }
    Ok(assigned)
}

/// Parameter rows for one detector and parameter from a block file.
pub fn block_records(
    series_names: &[String],
    blocks: &[ThresholdBlock],
    detector: &str,
    configuration: &str,
    parameter: &str,
) -> BlindResult<Vec<ParameterRecord>> {
    Ok(assign_blocks(series_names, blocks)?
        .into_iter()
        .map(|(series_name, value)| ParameterRecord {
            series_name,
            detector_name: detector.to_string(),
            configuration_name: configuration.to_string(),
            parameter_name: parameter.to_string(),
            value,
        })
        .collect())
}
