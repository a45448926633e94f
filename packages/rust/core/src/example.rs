//! Example database with rows in every table.
//!
//! Two imine cage experiments from one zinc triflate + ethylenediamine
//! system: one with 4-pyridinecarboxaldehyde that failed, one with
//! 2-pyridinecarboxaldehyde that passed. Rows are written in batches; a
//! batch that violates a constraint is rolled back and skipped, and batches
//! that depend on it are skipped too.

use std::future::Future;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{info, instrument, warn};

use supramol_shared::{
    AssemblyTopology, Confidence, Experiment, Id, Ion, MsDecisionParams, MsInterpretation,
    MsProcessedData, MsProcessingParams, MzMatch, MzObserved, MzPredicted, MzTolerance,
    NmrDecisionParams, NmrInterpretation, NmrPeak, NmrProcessedData, NmrProcessingParams, Reagent,
    ReagentDescriptor, ReagentKind, Result, SupramolecularAssembly,
};
use supramol_storage::Storage;

/// Which batches were written.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExampleReport {
    pub committed: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

struct Reagents {
    metal: Id,
    amine: Id,
    carbonyl_para: Id,
    carbonyl_ortho: Id,
}

struct CageExperiment {
    experiment: Id,
    assembly: Id,
    /// Predictions at charge 8, 6 and 4.
    predictions: [Id; 3],
}

struct ParameterSets {
    nmr_high: Id,
    nmr_low: Id,
    nmr_sm: Id,
    nmr_nosm: Id,
    ms_processing: Id,
    ms_decision: Id,
}

/// Populate `storage` with the example rows.
#[instrument(skip_all)]
pub async fn populate_example(storage: &Storage) -> Result<ExampleReport> {
    let mut report = ExampleReport::default();

    let reagents = run_batch(storage, &mut report, "example_reagents", || {
        insert_reagents(storage)
    })
    .await?;

    let topology_and_failed = match &reagents {
        Some(r) => {
            run_batch(storage, &mut report, "example_failed_experiment", || {
                insert_failed_experiment(storage, r)
            })
            .await?
        }
        None => report.skip("example_failed_experiment"),
    };

    let passed = match (&reagents, &topology_and_failed) {
        (Some(r), Some((topology, _))) => {
            run_batch(storage, &mut report, "example_passed_experiment", || {
                insert_passed_experiment(storage, r, *topology)
            })
            .await?
        }
        _ => report.skip("example_passed_experiment"),
    };

    let params = match &topology_and_failed {
        Some((_, failed)) => {
            run_batch(storage, &mut report, "example_data_failed", || {
                insert_failed_data(storage, failed)
            })
            .await?
        }
        None => report.skip("example_data_failed"),
    };

    match (&passed, &params) {
        (Some(passed), Some(params)) => {
            run_batch(storage, &mut report, "example_data_passed", || {
                insert_passed_data(storage, passed, params)
            })
            .await?;
        }
        _ => {
            report.skip::<()>("example_data_passed");
        }
    }

    info!(
        committed = report.committed.len(),
        skipped = report.skipped.len(),
        "example database populated"
    );
    Ok(report)
}

impl ExampleReport {
    fn skip<T>(&mut self, batch: &'static str) -> Option<T> {
        warn!(batch, "skipping example batch: prerequisite missing");
        self.skipped.push(batch);
        None
    }
}

/// Write one batch in its own savepoint. Integrity errors roll the batch back
/// and yield `None`; other errors abort.
async fn run_batch<T, F, Fut>(
    storage: &Storage,
    report: &mut ExampleReport,
    batch: &'static str,
    f: F,
) -> Result<Option<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match storage.in_savepoint(batch, f).await {
        Ok(value) => {
            info!(batch, "committed example batch");
            report.committed.push(batch);
            Ok(Some(value))
        }
        Err(e) if e.is_integrity() => {
            warn!(batch, error = %e, "rolled back example batch");
            report.skipped.push(batch);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

async fn insert_reagents(storage: &Storage) -> Result<Reagents> {
    let zinc = storage
        .insert_ion(&Ion {
            name: "Zn(II)".into(),
            charge: 2,
            formula: "[Zn+2]".into(),
            exact_mass: 63.9,
        })
        .await?;
    let triflate = storage
        .insert_ion(&Ion {
            name: "OTf".into(),
            charge: -1,
            formula: "SO3CF3-".into(),
            exact_mass: 149.0,
        })
        .await?;

    let metal = storage
        .insert_reagent(&Reagent {
            cas_number: None,
            name: "Zinc triflate".into(),
            exact_mass: 1000.0,
            kind: ReagentKind::Metal {
                cation_id: zinc,
                num_cations: 1,
                anion_id: triflate,
                num_anions: 2,
            },
        })
        .await?;
    for (name, value) in [("radius", "0.88"), ("charge", "2")] {
        describe(storage, metal, name, value).await?;
    }

    let amine = storage
        .insert_reagent(&Reagent {
            cas_number: Some("108-72-5".into()),
            name: "ethylenediamine".into(),
            exact_mass: 123.2,
            kind: ReagentKind::Amine {
                nmr_data: Some("tests/data/nmr/amine".into()),
            },
        })
        .await?;

    let carbonyl_para =
        insert_carbonyl(storage, "872-85-5", "4-pyridinecarboxaldehyde", "p-aldehyde").await?;
    describe(storage, carbonyl_para, "distance", "3").await?;
    let carbonyl_ortho =
        insert_carbonyl(storage, "1121-60-4", "2-pyridinecarboxaldehyde", "o-aldehyde").await?;
    describe(storage, carbonyl_ortho, "distance", "1").await?;

    Ok(Reagents {
        metal,
        amine,
        carbonyl_para,
        carbonyl_ortho,
    })
}

async fn insert_carbonyl(storage: &Storage, cas: &str, name: &str, nmr: &str) -> Result<Id> {
    storage
        .insert_reagent(&Reagent {
            cas_number: Some(cas.into()),
            name: name.into(),
            exact_mass: 107.1,
            kind: ReagentKind::Carbonyl {
                nmr_data: Some(format!("tests/data/nmr/{nmr}")),
            },
        })
        .await
}

async fn describe(storage: &Storage, reagent_id: Id, name: &str, value: &str) -> Result<()> {
    let descriptor_id = storage.get_or_insert_descriptor(name).await?;
    storage
        .add_reagent_descriptor(&ReagentDescriptor {
            reagent_id,
            descriptor_id,
            value: value.into(),
        })
        .await
}

/// Experiment, cage assembly and its three predicted m/z values.
async fn insert_cage_experiment(
    storage: &Storage,
    reagents: &Reagents,
    carbonyl_id: Id,
    topology_id: Id,
    day: u32,
    reaction: &str,
) -> Result<CageExperiment> {
    let experiment = storage
        .insert_experiment(&Experiment {
            date: midnight(2024, 10, day),
            solvent: "acetonitrile".into(),
            temperature: 363.0,
            time: Duration::hours(18),
            nmr_data_path: format!("tests/data/nmr/{reaction}"),
            ms_data_path: format!("tests/data/ms/{reaction}"),
            amine_id: reagents.amine,
            carbonyl_id,
            metal_id: reagents.metal,
        })
        .await?;
    let assembly = storage
        .insert_assembly(&SupramolecularAssembly {
            experiment_id: experiment,
            topology_id,
            cation_exact_mass: 1817.6,
        })
        .await?;

    let mut predictions = [0; 3];
    let ladder = [(0, 1817.6, 8, 227.2), (2, 1945.4, 6, 324.2), (4, 2073.2, 4, 518.3)];
    for (slot, (n_anions, exact_mass, charge, mz_value)) in predictions.iter_mut().zip(ladder) {
        *slot = storage
            .insert_mz_predicted(&MzPredicted {
                assembly_id: assembly,
                n_anions,
                exact_mass,
                charge,
                mz_value,
            })
            .await?;
    }

    Ok(CageExperiment {
        experiment,
        assembly,
        predictions,
    })
}

async fn insert_failed_experiment(
    storage: &Storage,
    reagents: &Reagents,
) -> Result<(Id, CageExperiment)> {
    let topology = storage
        .insert_topology(&AssemblyTopology {
            n_metals: 4,
            n_amines: 4,
            n_carbonyls: 12,
            amine_topicity: 3,
            carbonyl_topicity: 1,
            coordination_number: 6,
        })
        .await?;
    let failed = insert_cage_experiment(
        storage,
        reagents,
        reagents.carbonyl_para,
        topology,
        29,
        "reaction1",
    )
    .await?;
    Ok((topology, failed))
}

async fn insert_passed_experiment(
    storage: &Storage,
    reagents: &Reagents,
    topology: Id,
) -> Result<CageExperiment> {
    insert_cage_experiment(
        storage,
        reagents,
        reagents.carbonyl_ortho,
        topology,
        30,
        "reaction2",
    )
    .await
}

/// Processed NMR data with its peaks.
async fn insert_spectrum(
    storage: &Storage,
    experiment_id: Id,
    nmr_proc_params_id: Id,
    peaks: &[(f64, bool)],
) -> Result<Id> {
    let data = storage
        .insert_nmr_data(&NmrProcessedData {
            nmr_proc_params_id,
            experiment_id,
        })
        .await?;
    for &(peak_ppm, is_sm) in peaks {
        storage
            .insert_nmr_peak(&NmrPeak {
                nmr_data_id: data,
                peak_ppm,
                is_sm,
            })
            .await?;
    }
    Ok(data)
}

async fn interpret_nmr(
    storage: &Storage,
    nmr_data_id: Id,
    nmr_decision_params_id: Id,
    symmetrical: bool,
    pure: bool,
    confidence: Confidence,
) -> Result<Id> {
    storage
        .insert_nmr_interpretation(&NmrInterpretation {
            nmr_decision_params_id,
            nmr_data_id,
            symmetrical,
            pure,
            confidence,
        })
        .await
}

fn nmr_processing(peak_picking_threshold: f64) -> NmrProcessingParams {
    NmrProcessingParams {
        relative_height: 150.0,
        peak_picking_range_left: 12.0,
        peak_picking_range_right: 5.0,
        peak_picking_threshold,
        spectrum_size: 16000,
        line_broadening: 1.2,
    }
}

fn nmr_decision(sm_peaks_allowed: bool) -> NmrDecisionParams {
    NmrDecisionParams {
        peak_number_tolerance: 2,
        peak_shift_proportion: 0.5,
        sm_peaks_allowed,
    }
}

/// Parameter sets plus the failed experiment's spectra and verdicts.
async fn insert_failed_data(storage: &Storage, failed: &CageExperiment) -> Result<ParameterSets> {
    let nmr_high = storage.insert_nmr_proc_params(&nmr_processing(25.0)).await?;
    let nmr_low = storage.insert_nmr_proc_params(&nmr_processing(1.0)).await?;
    let nmr_sm = storage.insert_nmr_decision_params(&nmr_decision(true)).await?;
    let nmr_nosm = storage.insert_nmr_decision_params(&nmr_decision(false)).await?;

    let high = insert_spectrum(
        storage,
        failed.experiment,
        nmr_high,
        &[(11.0, true), (8.0, true), (7.0, true)],
    )
    .await?;
    let low = insert_spectrum(
        storage,
        failed.experiment,
        nmr_low,
        &[(11.0, true), (8.0, true), (7.0, true), (6.0, false)],
    )
    .await?;

    interpret_nmr(storage, high, nmr_nosm, false, false, Confidence::None).await?;
    interpret_nmr(storage, high, nmr_sm, false, false, Confidence::None).await?;
    interpret_nmr(storage, low, nmr_nosm, false, false, Confidence::Low).await?;
    interpret_nmr(storage, low, nmr_sm, false, false, Confidence::None).await?;

    let ms_processing = storage
        .insert_ms_proc_params(&MsProcessingParams {
            tic_pp_height: 20.0,
            tic_pp_distance: 5.0,
            ms_pp_height: 20.0,
            ms_pp_distance: 10.0,
        })
        .await?;
    let ms_decision = storage
        .insert_ms_decision_params(&MsDecisionParams {
            multiple_mz_trigger_charge: Some(3),
            mz_matches_low: 1,
            mz_matches_medium: 2,
            mz_matches_high: 3,
            mz_matches_certain: 4,
        })
        .await?;

    let ms_data = storage
        .insert_ms_data(&MsProcessedData {
            experiment_id: failed.experiment,
            ms_proc_params_id: ms_processing,
        })
        .await?;
    storage
        .insert_ms_interpretation(&MsInterpretation {
            ms_decision_params_id: ms_decision,
            ms_data_id: ms_data,
            assembly_id: failed.assembly,
            confidence: Confidence::None,
        })
        .await?;

    Ok(ParameterSets {
        nmr_high,
        nmr_low,
        nmr_sm,
        nmr_nosm,
        ms_processing,
        ms_decision,
    })
}

/// The passed experiment's spectra, matched peaks and verdicts.
async fn insert_passed_data(
    storage: &Storage,
    passed: &CageExperiment,
    params: &ParameterSets,
) -> Result<()> {
    let high = insert_spectrum(
        storage,
        passed.experiment,
        params.nmr_high,
        &[(8.5, false), (6.0, false)],
    )
    .await?;
    let low = insert_spectrum(
        storage,
        passed.experiment,
        params.nmr_low,
        &[(11.0, true), (8.5, false), (8.0, true), (7.0, true), (6.0, false)],
    )
    .await?;

    interpret_nmr(storage, high, params.nmr_nosm, true, true, Confidence::Certain).await?;
    interpret_nmr(storage, high, params.nmr_sm, true, true, Confidence::Certain).await?;
    interpret_nmr(storage, low, params.nmr_nosm, true, false, Confidence::Medium).await?;
    interpret_nmr(storage, low, params.nmr_sm, true, false, Confidence::Certain).await?;

    let ms_decision_any = storage
        .insert_ms_decision_params(&MsDecisionParams {
            multiple_mz_trigger_charge: None,
            mz_matches_low: 1,
            mz_matches_medium: 1,
            mz_matches_high: 1,
            mz_matches_certain: 1,
        })
        .await?;

    let ms_data = storage
        .insert_ms_data(&MsProcessedData {
            experiment_id: passed.experiment,
            ms_proc_params_id: params.ms_processing,
        })
        .await?;

    let tolerance = storage
        .get_or_insert_tolerance(&MzTolerance { atol: 0.2 })
        .await?;
    for (mz_value, predicted) in [227.1, 324.3, 518.35].into_iter().zip(passed.predictions) {
        let observed = storage
            .insert_mz_observed(&MzObserved {
                ms_data_id: ms_data,
                mz_value,
            })
            .await?;
        storage
            .insert_mz_match(&MzMatch {
                mz_observed_id: observed,
                mz_predicted_id: predicted,
                mz_tolerance_id: tolerance,
            })
            .await?;
    }

    for (ms_decision_params_id, confidence) in [
        (params.ms_decision, Confidence::High),
        (ms_decision_any, Confidence::Certain),
    ] {
        storage
            .insert_ms_interpretation(&MsInterpretation {
                ms_decision_params_id,
                ms_data_id: ms_data,
                assembly_id: passed.assembly,
                confidence,
            })
            .await?;
    }
    Ok(())
}
