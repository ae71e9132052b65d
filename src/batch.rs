//! Blinding every sample of a list, one independent pass each.

use std::collections::BTreeSet;
use std::path::PathBuf;

use log::{error, info, warn};

use crate::config::RunConfig;
use crate::data::dataset::EventDataset;
use crate::data::source::{FsResolver, SourceResolver};
use crate::params::ParameterStore;
use crate::runner::{BlindingRunner, RunError, RunReport};

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<(String, RunReport)>,
    pub failed: Vec<(String, RunError)>,
    /// Repeated names, run only once.
    pub skipped: Vec<String>,
    /// Files written by the successful passes.
    pub written: Vec<PathBuf>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Blind `samples` reading tables from the file system.
pub fn run_batch(config: &RunConfig, samples: &[String], store: &dyn ParameterStore) -> BatchReport {
    run_batch_with(config, samples, store, &|| -> Box<dyn SourceResolver> {
        Box::new(FsResolver)
    })
}

/// As [`run_batch`], with the table resolver supplied per sample.  A sample
/// that fails is logged and skipped; the rest still run.
pub fn run_batch_with(
    config: &RunConfig,
    samples: &[String],
    store: &dyn ParameterStore,
    make_resolver: &dyn Fn() -> Box<dyn SourceResolver>,
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut sink = config.output_format.sink(&config.output_dir);
    let mut seen = BTreeSet::new();
    let chain = config.chain();
    let sources = config.source_specs();
    info!("applying the {chain:?} chain as {}", config.cut_name());

    for sample in samples {
        if !seen.insert(sample.as_str()) {
            warn!("sample {sample} listed twice, skipping");
            report.skipped.push(sample.clone());
            continue;
        }
        info!("blinding sample {sample}");
        let mut dataset = EventDataset::new(
            vec![sample.clone()],
            config.detectors_for(sample),
            chain.policy(),
            make_resolver(),
        );
        let mut runner = BlindingRunner::new(chain.evaluator(), config.run_options());

        let outcome = runner
            .run(&mut dataset, &sources, &config.data_dir, store)
            .and_then(|run| {
                let written = runner.write_outputs(sink.as_mut(), &config.output_dir, sample)?;
                Ok((run, written))
            });

        match outcome {
            Ok((run, written)) => {
                info!(
                    "sample {sample}: {} of {} rows blinded",
                    run.blinded_events, run.rows_processed
                );
                report.written.extend(written);
                report.succeeded.push((sample.clone(), run));
            }
            Err(err) => {
                error!("sample {sample} aborted: {err}");
                report.failed.push((sample.clone(), err));
            }
        }
    }
    report
}
