//! Blinding cuts for detector event data.
//!
//! A [`runner::BlindingRunner`] walks the rows of an [`data::dataset::EventDataset`],
//! binds per-series parameters from a [`params::ParameterStore`], and asks the
//! [`cuts::CutEvaluator`] which detectors of each event must be hidden.

pub mod batch;
pub mod config;
pub mod cuts;
pub mod data;
pub mod decisions;
pub mod error;
pub mod params;
pub mod profile;
pub mod runner;
pub mod summary;

#[cfg(test)]
mod testing;
