//! Domain logic and workflows for the Supramolecular Explorer.
//!
//! Assembly masses and m/z predictions, matching observed spectra against
//! them, MS confidence scoring, raw data file naming and ingestion, JSON
//! experiment import, and the example database.

pub mod example;
pub mod import;
pub mod ingest;
pub mod mass;
pub mod matching;
pub mod naming;
pub mod pipeline;
pub mod scoring;
