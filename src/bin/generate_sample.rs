//! Write a small synthetic data tree that `cxblind run` can blind:
//! parquet tables for a few samples, a parameter CSV and a config file.
//!
//! Usage: `generate_sample [OUTPUT_DIR]` (default `sample_data`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use cxblind::config::{ParameterSource, RunConfig};
use cxblind::cuts::CutEvaluator;
use cxblind::decisions::OutputFormat;
use cxblind::params::ParameterRecord;
use cxblind::profile::CutChain;
use cxblind::runner::DEFAULT_CONFIGURATION;

const DETECTORS: usize = 4;
const ROWS_PER_SERIES: usize = 400;
const SAMPLES: &[(&str, &[i64])] = &[
    ("01120701_0000", &[11207010000, 11207011100]),
    ("01120702_0000", &[11207020000, 11207021100, 11207022200]),
];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    fn exponential(&mut self, mean: f64) -> f64 {
        -mean * self.next_f64().max(1e-15).ln()
    }
}

/// Parameter values the synthetic detectors are tuned to: a 0.3 ± 0.15
/// yield band and a 2-5 keV noise window.
fn parameter_value(parameter: &str) -> f64 {
    match parameter.split('.').next().unwrap_or(parameter) {
        "min_psumOF" => 2.0,
        "max_psumOF" => 5.0,
        "max_qsum1OF" | "max_qsum2OF" => 10.0,
        "cLFnoise1_v53" | "cGlitch1_v53" => 10.0,
        "A_mu" => 0.3,
        "A_sigma" => 0.05,
        "x0_sigma" => 100.0,
        "b_mu" | "b_sigma" => 0.0,
        _ => 1.0,
    }
}

type Columns = BTreeMap<&'static str, Vec<f64>>;

fn push(columns: &mut Columns, column: &'static str, value: f64) {
    columns.entry(column).or_default().push(value);
}

fn write_table(path: &Path, columns: &Columns) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let fields: Vec<Field> = columns
        .keys()
        .map(|name| Field::new(*name, DataType::Float64, false))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .values()
        .map(|values| Arc::new(Float64Array::from(values.clone())) as ArrayRef)
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn write_sample(out: &Path, sample: &str, series: &[i64], rng: &mut SimpleRng) -> Result<usize> {
    let mut raw: Vec<Columns> = vec![Columns::new(); DETECTORS];
    let mut calibrated: Vec<Columns> = vec![Columns::new(); DETECTORS];
    let mut event = Columns::new();
    let mut calib_event = Columns::new();
    let mut candidates = 0;

    for &number in series {
        for _ in 0..ROWS_PER_SERIES {
            // One detector at most carries a recoil; nuclear recoils are rare.
            let hit = (rng.next_f64() < 0.3).then(|| (rng.next_u64() as usize) % DETECTORS);
            let nuclear = rng.next_f64() < 0.1;

            for det in 0..DETECTORS {
                let r = &mut raw[det];
                push(r, "DetType", 11.0);
                for amp in ["PAOFamps", "PBOFamps", "PCOFamps", "PDOFamps"] {
                    push(r, amp, 0.0);
                }
                push(r, "PTglitch1OFchisq", rng.gauss(95.0, 2.0));
                push(r, "PTlfnoise1OFchisq", rng.gauss(95.0, 2.0));
                push(r, "PTOFchisq", 100.0);
                push(r, "QIS1bias", 2.0);
                push(r, "QIS2bias", -2.0);
                for status in ["QIS1status", "QIS2status", "QOS1status", "QOS2status"] {
                    push(r, status, 0.0);
                }

                let (energy, yield_) = if hit == Some(det) {
                    let energy = 2.5 + rng.exponential(20.0);
                    let yield_ = if nuclear { rng.gauss(0.3, 0.03) } else { rng.gauss(1.0, 0.05) };
                    if nuclear {
                        candidates += 1;
                    }
                    (energy, yield_)
                } else {
                    (rng.gauss(0.5, 0.2).abs(), rng.gauss(0.3, 0.2))
                };
                let charge = energy * yield_;

                let c = &mut calibrated[det];
                push(c, "pa2OF", 0.0);
                push(c, "pc1OF", 0.0);
                push(c, "precoilsumOF", energy);
                push(c, "psumOF", energy);
                push(c, "ptNF", energy);
                push(c, "qi1OF", charge);
                push(c, "qi2OF", charge);
                push(c, "qo1OF", 0.0);
                push(c, "qo2OF", 0.0);
                push(c, "qsum1OF", charge);
                push(c, "qsum2OF", charge);
                push(c, "ysumOF", yield_);
            }

            let random = if rng.next_f64() < 0.02 { 1.0 } else { 0.0 };
            push(&mut event, "EventCategory", random);
            push(&mut event, "SeriesNumber", number as f64);
            push(&mut event, "VTTime20", -100.0);
            push(&mut calib_event, "ntrigp", 1.0);
            push(&mut calib_event, "ntrigq", 1.0);
        }
    }

    let merge = out.join(format!("merge_{sample}")).join("rqDir");
    let calib = out.join(format!("calib_{sample}")).join("rrqDir");
    for det in 0..DETECTORS {
        write_table(&merge.join(format!("zip{}.parquet", det + 1)), &raw[det])?;
        write_table(&calib.join(format!("calibzip{}.parquet", det + 1)), &calibrated[det])?;
    }
    write_table(&merge.join("eventTree.parquet"), &event)?;
    write_table(&calib.join("calibevent.parquet"), &calib_event)?;
    Ok(candidates)
}

fn write_parameters(path: &Path, detectors: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for detector in detectors {
        for parameter in CutEvaluator::standard().required_parameters() {
            writer.serialize(ParameterRecord {
                series_name: String::new(),
                detector_name: detector.clone(),
                configuration_name: DEFAULT_CONFIGURATION.to_string(),
                parameter_name: parameter.to_string(),
                value: parameter_value(parameter),
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let out = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "sample_data".to_string()));
    std::fs::create_dir_all(&out)?;
    let mut rng = SimpleRng::new(42);

    for (sample, series) in SAMPLES {
        let candidates = write_sample(&out, sample, series, &mut rng)?;
        println!(
            "Wrote {sample}: {} events, {candidates} nuclear-recoil candidates",
            series.len() * ROWS_PER_SERIES
        );
    }

    let detectors: Vec<String> = (1..=DETECTORS).map(|n| n.to_string()).collect();
    let params = out.join("params.csv");
    write_parameters(&params, &detectors)?;

    let config = RunConfig {
        detectors,
        excluded_detectors: BTreeMap::new(),
        data_dir: out.clone(),
        chain: Some(CutChain::Standard),
        parameters: ParameterSource::Csv { path: params },
        output_dir: out.join("decisions"),
        output_format: OutputFormat::Parquet,
        ..RunConfig::default()
    };
    let config_path = out.join("cxblind.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    let names: Vec<&str> = SAMPLES.iter().map(|(name, _)| *name).collect();
    println!(
        "Run with: cxblind --config {} run {}",
        config_path.display(),
        names.join(" ")
    );
    Ok(())
}
