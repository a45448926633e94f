//! Experiments, topologies and candidate assemblies.

use chrono::Duration;
use libsql::{Row, params};
use supramol_shared::{
    AssemblyTopology, Experiment, Id, ReagentRole, Result, Stored, SupramolError,
    SupramolecularAssembly,
};

use crate::{Storage, col_datetime, col_f64, col_i64, col_string, fmt_datetime, storage_err};

const EXPERIMENT_COLUMNS: &str = "id, date, solvent, temperature, time_seconds, nmr_data_path,
    ms_data_path, amine_id, carbonyl_id, metal_id";

/// One line of the experiment listing: the experiment and its reagent names.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSummary {
    pub experiment: Stored<Experiment>,
    pub amine: String,
    pub carbonyl: String,
    pub metal: String,
}

impl Storage {
    // -----------------------------------------------------------------------
    // Experiments
    // -----------------------------------------------------------------------

    /// Insert an experiment after checking each reagent sits in its own slot.
    pub async fn insert_experiment(&self, experiment: &Experiment) -> Result<Id> {
        self.check_writable()?;
        for (slot, id) in [
            (ReagentRole::Amine, experiment.amine_id),
            (ReagentRole::Carbonyl, experiment.carbonyl_id),
            (ReagentRole::Metal, experiment.metal_id),
        ] {
            let reagent = self
                .get_reagent(id)
                .await?
                .ok_or_else(|| SupramolError::not_found("reagent", id))?;
            if reagent.role() != slot {
                return Err(SupramolError::validation(format!(
                    "reagent {id} ({}) is a {}, not a {slot}",
                    reagent.name,
                    reagent.role()
                )));
            }
        }

        let id = self
            .insert(
                "INSERT INTO experiment (date, solvent, temperature, time_seconds, nmr_data_path,
                     ms_data_path, amine_id, carbonyl_id, metal_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    fmt_datetime(&experiment.date),
                    experiment.solvent.as_str(),
                    experiment.temperature,
                    experiment.time.num_seconds(),
                    experiment.nmr_data_path.as_str(),
                    experiment.ms_data_path.as_str(),
                    experiment.amine_id,
                    experiment.carbonyl_id,
                    experiment.metal_id,
                ],
            )
            .await?;
        tracing::debug!(id, date = %experiment.date, "inserted experiment");
        Ok(id)
    }

    /// Get an experiment by id.
    pub async fn get_experiment(&self, id: Id) -> Result<Option<Stored<Experiment>>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {EXPERIMENT_COLUMNS} FROM experiment WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_experiment(&row, 0)?)),
            None => Ok(None),
        }
    }

    /// List experiments by date with the names of their reagents.
    pub async fn list_experiments(&self) -> Result<Vec<ExperimentSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT e.id, e.date, e.solvent, e.temperature, e.time_seconds, e.nmr_data_path,
                        e.ms_data_path, e.amine_id, e.carbonyl_id, e.metal_id,
                        a.name, c.name, m.name
                 FROM experiment e
                 JOIN reagent a ON a.id = e.amine_id
                 JOIN reagent c ON c.id = e.carbonyl_id
                 JOIN reagent m ON m.id = e.metal_id
                 ORDER BY e.date, e.id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(ExperimentSummary {
                experiment: row_to_experiment(&row, 0)?,
                amine: col_string(&row, 10)?,
                carbonyl: col_string(&row, 11)?,
                metal: col_string(&row, 12)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Topologies and assemblies
    // -----------------------------------------------------------------------

    /// Insert an assembly topology.
    pub async fn insert_topology(&self, topology: &AssemblyTopology) -> Result<Id> {
        self.insert(
            "INSERT INTO topology (n_metals, n_amines, n_carbonyls, amine_topicity,
                 carbonyl_topicity, coordination_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                topology.n_metals,
                topology.n_amines,
                topology.n_carbonyls,
                topology.amine_topicity,
                topology.carbonyl_topicity,
                topology.coordination_number,
            ],
        )
        .await
    }

    /// Get a topology by id.
    pub async fn get_topology(&self, id: Id) -> Result<Option<Stored<AssemblyTopology>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, n_metals, n_amines, n_carbonyls, amine_topicity, carbonyl_topicity,
                        coordination_number
                 FROM topology WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(Stored::new(
                col_i64(&row, 0)?,
                AssemblyTopology {
                    n_metals: col_i64(&row, 1)?,
                    n_amines: col_i64(&row, 2)?,
                    n_carbonyls: col_i64(&row, 3)?,
                    amine_topicity: col_i64(&row, 4)?,
                    carbonyl_topicity: col_i64(&row, 5)?,
                    coordination_number: col_i64(&row, 6)?,
                },
            ))),
            None => Ok(None),
        }
    }

    /// Insert a candidate assembly for an experiment.
    pub async fn insert_assembly(&self, assembly: &SupramolecularAssembly) -> Result<Id> {
        self.insert(
            "INSERT INTO assembly (experiment_id, topology_id, cation_exact_mass)
             VALUES (?1, ?2, ?3)",
            params![
                assembly.experiment_id,
                assembly.topology_id,
                assembly.cation_exact_mass,
            ],
        )
        .await
    }

    /// Get an assembly by id.
    pub async fn get_assembly(&self, id: Id) -> Result<Option<Stored<SupramolecularAssembly>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, experiment_id, topology_id, cation_exact_mass
                 FROM assembly WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_assembly(&row)?)),
            None => Ok(None),
        }
    }

    /// All candidate assemblies of an experiment, by id.
    pub async fn list_assemblies_for_experiment(
        &self,
        experiment_id: Id,
    ) -> Result<Vec<Stored<SupramolecularAssembly>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, experiment_id, topology_id, cation_exact_mass
                 FROM assembly WHERE experiment_id = ?1 ORDER BY id",
                params![experiment_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_assembly(&row)?);
        }
        Ok(results)
    }
}

/// Convert [`EXPERIMENT_COLUMNS`] starting at `offset` to an experiment.
fn row_to_experiment(row: &Row, offset: i32) -> Result<Stored<Experiment>> {
    let secs = col_i64(row, offset + 4)?;
    let time = Duration::try_seconds(secs)
        .ok_or_else(|| SupramolError::Storage(format!("reaction time {secs}s out of range")))?;

    Ok(Stored::new(
        col_i64(row, offset)?,
        Experiment {
            date: col_datetime(row, offset + 1)?,
            solvent: col_string(row, offset + 2)?,
            temperature: col_f64(row, offset + 3)?,
            time,
            nmr_data_path: col_string(row, offset + 5)?,
            ms_data_path: col_string(row, offset + 6)?,
            amine_id: col_i64(row, offset + 7)?,
            carbonyl_id: col_i64(row, offset + 8)?,
            metal_id: col_i64(row, offset + 9)?,
        },
    ))
}

fn row_to_assembly(row: &Row) -> Result<Stored<SupramolecularAssembly>> {
    Ok(Stored::new(
        col_i64(row, 0)?,
        SupramolecularAssembly {
            experiment_id: col_i64(row, 1)?,
            topology_id: col_i64(row, 2)?,
            cation_exact_mass: col_f64(row, 3)?,
        },
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use chrono::NaiveDate;
    use supramol_shared::{Ion, Reagent, ReagentKind};

    /// Ids of a metal, an amine and a carbonyl.
    pub(crate) async fn insert_reagents(storage: &Storage) -> (Id, Id, Id) {
        let cation = storage
            .insert_ion(&Ion {
                name: "Zn(II)".into(),
                charge: 2,
                formula: "[Zn+2]".into(),
                exact_mass: 63.9,
            })
            .await
            .unwrap();
        let anion = storage
            .insert_ion(&Ion {
                name: "OTf".into(),
                charge: -1,
                formula: "SO3CF3-".into(),
                exact_mass: 149.0,
            })
            .await
            .unwrap();
        let metal = storage
            .insert_reagent(&Reagent {
                cas_number: None,
                name: "Zinc triflate".into(),
                exact_mass: 1000.0,
                kind: ReagentKind::Metal {
                    cation_id: cation,
                    num_cations: 1,
                    anion_id: anion,
                    num_anions: 2,
                },
            })
            .await
            .unwrap();
        let amine = storage
            .insert_reagent(&Reagent {
                cas_number: Some("108-72-5".into()),
                name: "ethylenediamine".into(),
                exact_mass: 123.2,
                kind: ReagentKind::Amine { nmr_data: None },
            })
            .await
            .unwrap();
        let carbonyl = storage
            .insert_reagent(&Reagent {
                cas_number: Some("872-85-5".into()),
                name: "4-pyridinecarboxaldehyde".into(),
                exact_mass: 107.1,
                kind: ReagentKind::Carbonyl { nmr_data: None },
            })
            .await
            .unwrap();
        (metal, amine, carbonyl)
    }

    pub(crate) fn experiment(metal_id: Id, amine_id: Id, carbonyl_id: Id, day: u32) -> Experiment {
        Experiment {
            date: NaiveDate::from_ymd_opt(2024, 10, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            solvent: "acetonitrile".into(),
            temperature: 363.0,
            time: Duration::hours(18),
            nmr_data_path: format!("tests/data/nmr/reaction{day}"),
            ms_data_path: format!("tests/data/ms/reaction{day}"),
            amine_id,
            carbonyl_id,
            metal_id,
        }
    }

    fn cage() -> AssemblyTopology {
        AssemblyTopology {
            n_metals: 4,
            n_amines: 4,
            n_carbonyls: 12,
            amine_topicity: 3,
            carbonyl_topicity: 1,
            coordination_number: 6,
        }
    }

    #[tokio::test]
    async fn experiment_roundtrip_and_listing_order() {
        let storage = test_storage().await;
        let (metal, amine, carbonyl) = insert_reagents(&storage).await;

        let later = storage
            .insert_experiment(&experiment(metal, amine, carbonyl, 30))
            .await
            .unwrap();
        let earlier = storage
            .insert_experiment(&experiment(metal, amine, carbonyl, 29))
            .await
            .unwrap();

        let found = storage.get_experiment(later).await.unwrap().expect("experiment");
        assert_eq!(found.record, experiment(metal, amine, carbonyl, 30));
        assert_eq!(found.time.num_hours(), 18);

        let listed = storage.list_experiments().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].experiment.id, earlier);
        assert_eq!(listed[0].metal, "Zinc triflate");
        assert_eq!(listed[0].carbonyl, "4-pyridinecarboxaldehyde");
    }

    #[tokio::test]
    async fn experiment_rejects_reagent_in_wrong_slot() {
        let storage = test_storage().await;
        let (metal, amine, carbonyl) = insert_reagents(&storage).await;

        // amine and carbonyl swapped
        let err = storage
            .insert_experiment(&experiment(metal, carbonyl, amine, 29))
            .await
            .unwrap_err();
        assert!(matches!(err, SupramolError::Validation { .. }), "{err}");

        let err = storage
            .insert_experiment(&experiment(metal, amine, 999, 29))
            .await
            .unwrap_err();
        assert!(matches!(err, SupramolError::NotFound { .. }), "{err}");
        assert!(storage.list_experiments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn assemblies_belong_to_experiments() {
        let storage = test_storage().await;
        let (metal, amine, carbonyl) = insert_reagents(&storage).await;
        let experiment_id = storage
            .insert_experiment(&experiment(metal, amine, carbonyl, 29))
            .await
            .unwrap();
        let topology_id = storage.insert_topology(&cage()).await.unwrap();
        assert_eq!(
            storage.get_topology(topology_id).await.unwrap().unwrap().record,
            cage()
        );

        let assembly = SupramolecularAssembly {
            experiment_id,
            topology_id,
            cation_exact_mass: 1817.6,
        };
        let assembly_id = storage.insert_assembly(&assembly).await.unwrap();
        assert_eq!(
            storage.get_assembly(assembly_id).await.unwrap().unwrap().record,
            assembly
        );

        let listed = storage
            .list_assemblies_for_experiment(experiment_id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let orphan = SupramolecularAssembly {
            experiment_id: 12345,
            ..assembly
        };
        assert!(storage.insert_assembly(&orphan).await.unwrap_err().is_integrity());
    }
}
