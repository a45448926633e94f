//! Shared types, error model, and settings for the Supramolecular Explorer.
//!
//! This crate is the foundation depended on by all other crates.
//! It provides:
//! - [`SupramolError`], the unified error type
//! - Domain enums ([`ReagentRole`], [`Confidence`], [`DataKind`])
//! - Database records ([`Reagent`], [`Experiment`], [`MzPredicted`], ...)
//! - Settings ([`Settings`], settings lookup and loading)

pub mod config;
pub mod error;
pub mod model;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    LoggerSettings, MsSettings, PathSettings, SETTINGS_CANDIDATES, Settings, init_settings,
    load_settings, load_settings_from, locate_settings, settings_dir,
};
pub use error::{Result, SupramolError};
pub use model::{
    AssemblyTopology, Descriptor, Experiment, Ion, MsDecisionParams, MsInterpretation,
    MsProcessedData, MsProcessingParams, MzMatch, MzObserved, MzPredicted, MzTolerance,
    NmrDecisionParams, NmrInterpretation, NmrPeak, NmrProcessedData, NmrProcessingParams,
    RawDataFile, Reagent, ReagentDescriptor, ReagentKind, Stored, SupramolecularAssembly,
};
pub use types::{Confidence, DataKind, Id, ReagentRole};
