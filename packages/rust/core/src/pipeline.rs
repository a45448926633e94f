//! MS analysis workflow: predict m/z values for candidate assemblies, match
//! a processed spectrum against them, and record a confidence per assembly.

use std::time::Instant;

use tracing::{debug, info, instrument};

use supramol_shared::{
    Confidence, Id, MsInterpretation, MzPredicted, MzTolerance, ReagentKind, Result, Stored,
    SupramolError,
};
use supramol_storage::Storage;

use crate::{mass, matching, scoring};

/// Compute and store the m/z ladder of an assembly.
///
/// Existing predictions are returned unchanged. Charges come from the
/// topology and the metal salt's cation; counter-anions from the same salt.
#[instrument(skip(storage))]
pub async fn predict_for_assembly(
    storage: &Storage,
    assembly_id: Id,
    min_charge: i64,
) -> Result<Vec<Stored<MzPredicted>>> {
    let existing = storage.list_mz_predicted(assembly_id).await?;
    if !existing.is_empty() {
        info!(count = existing.len(), "predictions already stored");
        return Ok(existing);
    }

    let assembly = storage
        .get_assembly(assembly_id)
        .await?
        .ok_or_else(|| SupramolError::not_found("assembly", assembly_id))?;
    let topology = storage
        .get_topology(assembly.topology_id)
        .await?
        .ok_or_else(|| SupramolError::not_found("topology", assembly.topology_id))?;
    mass::validate_topology(&topology)?;

    let experiment = storage
        .get_experiment(assembly.experiment_id)
        .await?
        .ok_or_else(|| SupramolError::not_found("experiment", assembly.experiment_id))?;
    let metal = storage
        .get_reagent(experiment.metal_id)
        .await?
        .ok_or_else(|| SupramolError::not_found("reagent", experiment.metal_id))?;
    let ReagentKind::Metal {
        cation_id,
        anion_id,
        ..
    } = metal.kind.clone()
    else {
        return Err(SupramolError::validation(format!(
            "reagent {} is not a metal salt",
            metal.id
        )));
    };
    let cation = storage
        .get_ion(cation_id)
        .await?
        .ok_or_else(|| SupramolError::not_found("ion", cation_id))?;
    let anion = storage
        .get_ion(anion_id)
        .await?
        .ok_or_else(|| SupramolError::not_found("ion", anion_id))?;

    let charge = mass::assembly_charge(&topology, &cation);
    let ladder = mass::predict_mz(assembly.cation_exact_mass, charge, &anion, min_charge)?;

    storage
        .in_savepoint("predict_mz", || async move {
            for prediction in ladder {
                storage
                    .insert_mz_predicted(&prediction.into_record(assembly_id))
                    .await?;
            }
            Ok(())
        })
        .await?;

    let stored = storage.list_mz_predicted(assembly_id).await?;
    info!(count = stored.len(), charge, "stored m/z predictions");
    Ok(stored)
}

/// Which spectrum to analyse and how.
#[derive(Debug, Clone)]
pub struct AnalyseConfig {
    pub ms_data_id: Id,
    pub ms_decision_params_id: Id,
    /// Absolute m/z tolerance.
    pub atol: f64,
    /// Lowest charge state for assemblies predicted during the analysis.
    pub min_charge: i64,
}

/// Outcome for one candidate assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyVerdict {
    pub assembly_id: Id,
    /// Observed/predicted pairs within tolerance.
    pub matches: usize,
    /// Distinct predictions counted towards the confidence.
    pub supporting: usize,
    pub confidence: Confidence,
    pub interpretation_id: Id,
}

/// Match a processed spectrum against every assembly of its experiment and
/// store the matches and an interpretation per assembly.
///
/// Assemblies without stored predictions are predicted first. Re-running with
/// the same decision set replaces the previous interpretations.
#[instrument(skip_all, fields(ms_data_id = config.ms_data_id, atol = config.atol))]
pub async fn analyse_ms(
    storage: &Storage,
    config: &AnalyseConfig,
) -> Result<Vec<AssemblyVerdict>> {
    let start = Instant::now();
    matching::validate_atol(config.atol)?;

    let ms_data = storage
        .get_ms_data(config.ms_data_id)
        .await?
        .ok_or_else(|| SupramolError::not_found("MS data", config.ms_data_id))?;
    let decision = storage
        .get_ms_decision_params(config.ms_decision_params_id)
        .await?
        .ok_or_else(|| {
            SupramolError::not_found("MS decision parameter set", config.ms_decision_params_id)
        })?;
    decision.validate()?;

    let observed = storage.list_mz_observed(ms_data.id).await?;
    let assemblies = storage
        .list_assemblies_for_experiment(ms_data.experiment_id)
        .await?;
    debug!(
        observed = observed.len(),
        assemblies = assemblies.len(),
        "loaded spectrum"
    );

    let mut ladders = Vec::with_capacity(assemblies.len());
    for assembly in &assemblies {
        let predicted = predict_for_assembly(storage, assembly.id, config.min_charge).await?;
        ladders.push((assembly.id, predicted));
    }

    let verdicts = storage
        .in_savepoint("analyse_ms", || async {
            let tolerance_id = storage
                .get_or_insert_tolerance(&MzTolerance { atol: config.atol })
                .await?;

            let mut verdicts = Vec::with_capacity(ladders.len());
            for (assembly_id, predicted) in &ladders {
                let assembly_id = *assembly_id;
                let pairs = matching::match_mz(&observed, predicted, config.atol)?;

                let mut matches = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    let m = pair.with_tolerance(tolerance_id);
                    storage.insert_mz_match(&m).await?;
                    matches.push(m);
                }

                let supporting = scoring::count_supporting(&matches, predicted, &decision);
                let confidence = scoring::ms_confidence(supporting, &decision);
                let interpretation_id = storage
                    .insert_ms_interpretation(&MsInterpretation {
                        ms_decision_params_id: decision.id,
                        ms_data_id: ms_data.id,
                        assembly_id,
                        confidence,
                    })
                    .await?;

                debug!(
                    assembly_id,
                    matches = matches.len(),
                    supporting,
                    %confidence,
                    "scored assembly"
                );
                verdicts.push(AssemblyVerdict {
                    assembly_id,
                    matches: matches.len(),
                    supporting,
                    confidence,
                    interpretation_id,
                });
            }
            Ok(verdicts)
        })
        .await?;

    info!(
        assemblies = verdicts.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "MS analysis complete"
    );
    Ok(verdicts)
}
