//! JSON experiment import.
//!
//! One [`ExperimentRecord`] describes a reaction: the three reagents, the
//! conditions, and the candidate assemblies to check it against. The whole
//! record is written in one savepoint.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use supramol_shared::model::seconds;
use supramol_shared::{
    AssemblyTopology, Experiment, Id, Ion, Reagent, ReagentDescriptor, ReagentKind, ReagentRole,
    Result, Stored, SupramolError, SupramolecularAssembly,
};
use supramol_storage::Storage;

use crate::mass;

/// Read and deserialize a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| SupramolError::io(path, e))?;
    serde_json::from_str(&text)
        .map_err(|e| SupramolError::parse(format!("{}: {e}", path.display())))
}

/// A reaction as exchanged in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub metal: MetalInput,
    pub amine: OrganicInput,
    pub carbonyl: OrganicInput,
    pub conditions: Conditions,
    #[serde(default)]
    pub assemblies: Vec<AssemblyInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetalInput {
    #[serde(default)]
    pub cas_number: Option<String>,
    pub name: String,
    pub exact_mass: f64,
    pub cation: Ion,
    pub num_cations: i64,
    pub anion: Ion,
    pub num_anions: i64,
    /// Descriptor name to value; numbers are stored as their text.
    #[serde(default)]
    pub descriptors: BTreeMap<String, serde_json::Value>,
}

/// An amine or carbonyl reagent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganicInput {
    #[serde(default)]
    pub cas_number: Option<String>,
    pub name: String,
    pub exact_mass: f64,
    #[serde(default)]
    pub nmr_data: Option<String>,
    #[serde(default)]
    pub descriptors: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    pub date: NaiveDateTime,
    pub solvent: String,
    pub temperature: f64,
    #[serde(with = "seconds")]
    pub time: Duration,
    pub nmr_data_path: String,
    pub ms_data_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyInput {
    pub topology: AssemblyTopology,
    /// Computed from the reagents when absent.
    #[serde(default)]
    pub cation_exact_mass: Option<f64>,
}

/// Ids written by [`import_experiment`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub experiment_id: Id,
    pub metal_id: Id,
    pub amine_id: Id,
    pub carbonyl_id: Id,
    pub assembly_ids: Vec<Id>,
    /// Reagents found by CAS number instead of inserted.
    pub reused_reagents: usize,
}

/// Write a record atomically. Reagents already present with the same CAS
/// number are reused.
#[instrument(skip_all, fields(date = %record.conditions.date))]
pub async fn import_experiment(
    storage: &Storage,
    record: &ExperimentRecord,
) -> Result<ImportSummary> {
    let summary = storage
        .in_savepoint("import_experiment", || write_record(storage, record))
        .await?;
    info!(
        experiment_id = summary.experiment_id,
        assemblies = summary.assembly_ids.len(),
        reused = summary.reused_reagents,
        "imported experiment"
    );
    Ok(summary)
}

async fn write_record(storage: &Storage, record: &ExperimentRecord) -> Result<ImportSummary> {
    let mut reused = 0;

    let metal = &record.metal;
    let existing = find_by_cas(storage, &metal.cas_number, ReagentRole::Metal).await?;
    let (metal_id, found) = match existing {
        Some(id) => (id, true),
        None => {
            let cation_id = get_or_insert_ion(storage, &metal.cation).await?;
            let anion_id = get_or_insert_ion(storage, &metal.anion).await?;
            let reagent = Reagent {
                cas_number: metal.cas_number.clone(),
                name: metal.name.clone(),
                exact_mass: metal.exact_mass,
                kind: ReagentKind::Metal {
                    cation_id,
                    num_cations: metal.num_cations,
                    anion_id,
                    num_anions: metal.num_anions,
                },
            };
            (insert_with_descriptors(storage, &reagent, &metal.descriptors).await?, false)
        }
    };
    reused += usize::from(found);

    let (amine_id, found) = organic(storage, &record.amine, ReagentRole::Amine).await?;
    reused += usize::from(found);
    let (carbonyl_id, found) = organic(storage, &record.carbonyl, ReagentRole::Carbonyl).await?;
    reused += usize::from(found);

    let conditions = &record.conditions;
    let experiment_id = storage
        .insert_experiment(&Experiment {
            date: conditions.date,
            solvent: conditions.solvent.clone(),
            temperature: conditions.temperature,
            time: conditions.time,
            nmr_data_path: conditions.nmr_data_path.clone(),
            ms_data_path: conditions.ms_data_path.clone(),
            amine_id,
            carbonyl_id,
            metal_id,
        })
        .await?;

    let components = Components::load(storage, metal_id, amine_id, carbonyl_id).await?;
    let mut assembly_ids = Vec::with_capacity(record.assemblies.len());
    for assembly in &record.assemblies {
        mass::validate_topology(&assembly.topology)?;
        let cation_exact_mass = match assembly.cation_exact_mass {
            Some(m) => m,
            None => mass::assembly_cation_mass(
                &assembly.topology,
                &components.cation,
                &components.amine,
                &components.carbonyl,
            )?,
        };
        let topology_id = storage.insert_topology(&assembly.topology).await?;
        let id = storage
            .insert_assembly(&SupramolecularAssembly {
                experiment_id,
                topology_id,
                cation_exact_mass,
            })
            .await?;
        debug!(assembly_id = id, cation_exact_mass, "added assembly");
        assembly_ids.push(id);
    }

    Ok(ImportSummary {
        experiment_id,
        metal_id,
        amine_id,
        carbonyl_id,
        assembly_ids,
        reused_reagents: reused,
    })
}

/// Stored building blocks of the experiment. Reused reagents keep their
/// stored masses, which may differ from the document's.
struct Components {
    cation: Stored<Ion>,
    amine: Stored<Reagent>,
    carbonyl: Stored<Reagent>,
}

impl Components {
    async fn load(storage: &Storage, metal_id: Id, amine_id: Id, carbonyl_id: Id) -> Result<Self> {
        let reagent = |id: Id| async move {
            storage
                .get_reagent(id)
                .await?
                .ok_or_else(|| SupramolError::not_found("reagent", id))
        };
        let metal = reagent(metal_id).await?;
        let ReagentKind::Metal { cation_id, .. } = &metal.kind else {
            return Err(SupramolError::validation(format!(
                "reagent {metal_id} is not a metal salt"
            )));
        };
        let cation = storage
            .get_ion(*cation_id)
            .await?
            .ok_or_else(|| SupramolError::not_found("ion", *cation_id))?;

        Ok(Self {
            cation,
            amine: reagent(amine_id).await?,
            carbonyl: reagent(carbonyl_id).await?,
        })
    }
}

/// Id of the reagent with this CAS number, checking it plays `role`.
async fn find_by_cas(
    storage: &Storage,
    cas_number: &Option<String>,
    role: ReagentRole,
) -> Result<Option<Id>> {
    let Some(cas) = cas_number else {
        return Ok(None);
    };
    match storage.get_reagent_by_cas(cas).await? {
        Some(existing) if existing.role() == role => Ok(Some(existing.id)),
        Some(existing) => Err(SupramolError::validation(format!(
            "CAS {cas} is already registered as {} '{}', not {role}",
            existing.role(),
            existing.name
        ))),
        None => Ok(None),
    }
}

/// Id of an amine or carbonyl and whether it already existed.
async fn organic(
    storage: &Storage,
    input: &OrganicInput,
    role: ReagentRole,
) -> Result<(Id, bool)> {
    if let Some(id) = find_by_cas(storage, &input.cas_number, role).await? {
        return Ok((id, true));
    }
    let nmr_data = input.nmr_data.clone();
    let kind = match role {
        ReagentRole::Amine => ReagentKind::Amine { nmr_data },
        ReagentRole::Carbonyl => ReagentKind::Carbonyl { nmr_data },
        ReagentRole::Metal => {
            return Err(SupramolError::validation("metal reagents need ion data"));
        }
    };
    let reagent = Reagent {
        cas_number: input.cas_number.clone(),
        name: input.name.clone(),
        exact_mass: input.exact_mass,
        kind,
    };
    Ok((insert_with_descriptors(storage, &reagent, &input.descriptors).await?, false))
}

async fn insert_with_descriptors(
    storage: &Storage,
    reagent: &Reagent,
    descriptors: &BTreeMap<String, serde_json::Value>,
) -> Result<Id> {
    let reagent_id = storage.insert_reagent(reagent).await?;
    for (name, value) in descriptors {
        let descriptor_id = storage.get_or_insert_descriptor(name).await?;
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        storage
            .add_reagent_descriptor(&ReagentDescriptor {
                reagent_id,
                descriptor_id,
                value,
            })
            .await?;
    }
    Ok(reagent_id)
}

/// Ions are shared between salts; one with the same name, formula and
/// charge is reused.
async fn get_or_insert_ion(storage: &Storage, ion: &Ion) -> Result<Id> {
    let existing = storage.list_ions().await?.into_iter().find(|stored| {
        stored.name == ion.name && stored.formula == ion.formula && stored.charge == ion.charge
    });
    match existing {
        Some(stored) => Ok(stored.id),
        None => storage.insert_ion(ion).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;

    const FIXTURE: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../../fixtures/json/experiment.fixture.json"
    );

    fn fixture() -> ExperimentRecord {
        read_json(Path::new(FIXTURE)).expect("read fixture")
    }

    #[test]
    fn fixture_parses() {
        let record = fixture();
        assert_eq!(record.metal.cation.charge, 2);
        assert_eq!(record.conditions.time, Duration::hours(18));
        assert_eq!(record.assemblies.len(), 2);
        assert_eq!(record.metal.descriptors["radius"], serde_json::json!(0.88));
    }

    #[test]
    fn read_json_reports_path() {
        let missing = Path::new("/nonexistent/record.json");
        let err = read_json::<ExperimentRecord>(missing).unwrap_err();
        assert!(matches!(err, SupramolError::Io { .. }));
    }

    #[tokio::test]
    async fn import_writes_everything() {
        let storage = test_storage().await;
        let summary = import_experiment(&storage, &fixture()).await.unwrap();
        assert_eq!(summary.reused_reagents, 0);
        assert_eq!(summary.assembly_ids.len(), 2);

        let given = storage.get_assembly(summary.assembly_ids[0]).await.unwrap().unwrap();
        assert!((given.cation_exact_mass - 1817.6).abs() < 1e-9);

        let computed = storage.get_assembly(summary.assembly_ids[1]).await.unwrap().unwrap();
        let expected = 4.0 * 63.9 + 4.0 * 123.2 + 12.0 * 107.1 - 12.0 * mass::WATER_EXACT_MASS;
        assert!((computed.cation_exact_mass - expected).abs() < 1e-9);

        let descriptors = storage.list_reagent_descriptors(summary.metal_id).await.unwrap();
        let radius = descriptors
            .iter()
            .find(|d| d.descriptor.name == "radius")
            .expect("radius");
        assert_eq!(radius.value.value, "0.88");
    }

    #[tokio::test]
    async fn second_import_reuses_reagents_by_cas() {
        let storage = test_storage().await;
        let first = import_experiment(&storage, &fixture()).await.unwrap();
        let second = import_experiment(&storage, &fixture()).await.unwrap();

        assert_eq!(second.amine_id, first.amine_id);
        assert_eq!(second.carbonyl_id, first.carbonyl_id);
        assert_eq!(second.reused_reagents, 2);
        assert_ne!(second.experiment_id, first.experiment_id);
        assert_eq!(storage.list_ions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn computed_mass_uses_stored_reagents() {
        let storage = test_storage().await;
        let mut record = fixture();
        record.metal.cas_number = Some("54010-75-2".into());
        let first = import_experiment(&storage, &record).await.unwrap();

        record.metal.cation.exact_mass = 70.0;
        record.amine.exact_mass = 130.0;
        let second = import_experiment(&storage, &record).await.unwrap();
        assert_eq!(second.metal_id, first.metal_id);
        assert_eq!(second.reused_reagents, 3);

        let original = storage.get_assembly(first.assembly_ids[1]).await.unwrap().unwrap();
        let reused = storage.get_assembly(second.assembly_ids[1]).await.unwrap().unwrap();
        assert!((reused.cation_exact_mass - original.cation_exact_mass).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_import_leaves_nothing_behind() {
        let storage = test_storage().await;
        let mut record = fixture();
        record.assemblies[1].topology.n_carbonyls = 5;

        let err = import_experiment(&storage, &record).await.unwrap_err();
        assert!(matches!(err, SupramolError::Validation { .. }));
        assert!(storage.list_reagents(None).await.unwrap().is_empty());
        assert!(storage.list_experiments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cas_registered_under_other_role_rejected() {
        let storage = test_storage().await;
        let mut record = fixture();
        record.carbonyl.cas_number = record.amine.cas_number.clone();

        let err = import_experiment(&storage, &record).await.unwrap_err();
        assert!(err.to_string().contains("already registered as amine"));
    }
}
