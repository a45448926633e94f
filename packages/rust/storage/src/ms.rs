//! Mass spectrometry: processed data, observed and predicted m/z values,
//! matches, decision parameter sets and interpretations.

use libsql::{Row, params};
use supramol_shared::{
    Confidence, Id, MsDecisionParams, MsInterpretation, MsProcessedData, MsProcessingParams,
    MzMatch, MzObserved, MzPredicted, MzTolerance, Result, Stored, SupramolError,
};

use crate::{Storage, col_f64, col_i64, col_opt_i64, storage_err};

impl Storage {
    // -----------------------------------------------------------------------
    // Predicted m/z
    // -----------------------------------------------------------------------

    pub async fn insert_mz_predicted(&self, predicted: &MzPredicted) -> Result<Id> {
        self.insert(
            "INSERT INTO mz_predicted (assembly_id, n_anions, exact_mass, charge, mz_value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                predicted.assembly_id,
                predicted.n_anions,
                predicted.exact_mass,
                predicted.charge,
                predicted.mz_value,
            ],
        )
        .await
    }

    /// Predicted m/z values of an assembly, highest charge first.
    pub async fn list_mz_predicted(&self, assembly_id: Id) -> Result<Vec<Stored<MzPredicted>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, assembly_id, n_anions, exact_mass, charge, mz_value
                 FROM mz_predicted WHERE assembly_id = ?1
                 ORDER BY charge DESC, id",
                params![assembly_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(Stored::new(
                col_i64(&row, 0)?,
                MzPredicted {
                    assembly_id: col_i64(&row, 1)?,
                    n_anions: col_i64(&row, 2)?,
                    exact_mass: col_f64(&row, 3)?,
                    charge: col_i64(&row, 4)?,
                    mz_value: col_f64(&row, 5)?,
                },
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Processed data and observed m/z
    // -----------------------------------------------------------------------

    pub async fn insert_ms_proc_params(&self, proc_params: &MsProcessingParams) -> Result<Id> {
        self.insert(
            "INSERT INTO ms_processing_params (tic_pp_height, tic_pp_distance, ms_pp_height,
                 ms_pp_distance)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                proc_params.tic_pp_height,
                proc_params.tic_pp_distance,
                proc_params.ms_pp_height,
                proc_params.ms_pp_distance,
            ],
        )
        .await
    }

    pub async fn insert_ms_data(&self, data: &MsProcessedData) -> Result<Id> {
        self.insert(
            "INSERT INTO ms_processed_data (experiment_id, ms_proc_params_id) VALUES (?1, ?2)",
            params![data.experiment_id, data.ms_proc_params_id],
        )
        .await
    }

    pub async fn get_ms_data(&self, id: Id) -> Result<Option<Stored<MsProcessedData>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, experiment_id, ms_proc_params_id FROM ms_processed_data WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_ms_data(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_ms_data_for_experiment(
        &self,
        experiment_id: Id,
    ) -> Result<Vec<Stored<MsProcessedData>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, experiment_id, ms_proc_params_id FROM ms_processed_data
                 WHERE experiment_id = ?1 ORDER BY id",
                params![experiment_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_ms_data(&row)?);
        }
        Ok(results)
    }

    pub async fn insert_mz_observed(&self, observed: &MzObserved) -> Result<Id> {
        self.insert(
            "INSERT INTO mz_observed (ms_data_id, mz_value) VALUES (?1, ?2)",
            params![observed.ms_data_id, observed.mz_value],
        )
        .await
    }

    /// Observed m/z values of a processed data set, ascending.
    pub async fn list_mz_observed(&self, ms_data_id: Id) -> Result<Vec<Stored<MzObserved>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, ms_data_id, mz_value FROM mz_observed
                 WHERE ms_data_id = ?1 ORDER BY mz_value, id",
                params![ms_data_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(Stored::new(
                col_i64(&row, 0)?,
                MzObserved {
                    ms_data_id: col_i64(&row, 1)?,
                    mz_value: col_f64(&row, 2)?,
                },
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Tolerances and matches
    // -----------------------------------------------------------------------

    /// Get the id of the tolerance with this `atol`, creating it if needed.
    pub async fn get_or_insert_tolerance(&self, tolerance: &MzTolerance) -> Result<Id> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM mz_tolerance WHERE atol = ?1",
                params![tolerance.atol],
            )
            .await
            .map_err(storage_err)?;
        let existing = match rows.next().await.map_err(storage_err)? {
            Some(row) => Some(col_i64(&row, 0)?),
            None => None,
        };
        drop(rows);

        match existing {
            Some(id) => Ok(id),
            None => {
                self.insert(
                    "INSERT INTO mz_tolerance (atol) VALUES (?1)",
                    params![tolerance.atol],
                )
                .await
            }
        }
    }

    /// Record a match. Recording the same match twice is a no-op.
    pub async fn insert_mz_match(&self, m: &MzMatch) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO mz_match (mz_observed_id, mz_predicted_id, mz_tolerance_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT DO NOTHING",
                params![m.mz_observed_id, m.mz_predicted_id, m.mz_tolerance_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Matches between the observed values of `ms_data_id` and the predictions
    /// of `assembly_id` at one tolerance.
    pub async fn list_mz_matches(
        &self,
        ms_data_id: Id,
        assembly_id: Id,
        mz_tolerance_id: Id,
    ) -> Result<Vec<MzMatch>> {
        let mut rows = self
            .conn
            .query(
                "SELECT mm.mz_observed_id, mm.mz_predicted_id, mm.mz_tolerance_id
                 FROM mz_match mm
                 JOIN mz_observed o ON o.id = mm.mz_observed_id
                 JOIN mz_predicted p ON p.id = mm.mz_predicted_id
                 WHERE o.ms_data_id = ?1 AND p.assembly_id = ?2 AND mm.mz_tolerance_id = ?3
                 ORDER BY mm.mz_observed_id, mm.mz_predicted_id",
                params![ms_data_id, assembly_id, mz_tolerance_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(MzMatch {
                mz_observed_id: col_i64(&row, 0)?,
                mz_predicted_id: col_i64(&row, 1)?,
                mz_tolerance_id: col_i64(&row, 2)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Decision parameters and interpretations
    // -----------------------------------------------------------------------

    pub async fn insert_ms_decision_params(&self, decision: &MsDecisionParams) -> Result<Id> {
        self.insert(
            "INSERT INTO ms_decision_params (multiple_mz_trigger_charge, mz_matches_low,
                 mz_matches_medium, mz_matches_high, mz_matches_certain)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                decision.multiple_mz_trigger_charge,
                decision.mz_matches_low,
                decision.mz_matches_medium,
                decision.mz_matches_high,
                decision.mz_matches_certain,
            ],
        )
        .await
    }

    pub async fn get_ms_decision_params(&self, id: Id) -> Result<Option<Stored<MsDecisionParams>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, multiple_mz_trigger_charge, mz_matches_low, mz_matches_medium,
                        mz_matches_high, mz_matches_certain
                 FROM ms_decision_params WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(Stored::new(
                col_i64(&row, 0)?,
                MsDecisionParams {
                    multiple_mz_trigger_charge: col_opt_i64(&row, 1),
                    mz_matches_low: col_i64(&row, 2)?,
                    mz_matches_medium: col_i64(&row, 3)?,
                    mz_matches_high: col_i64(&row, 4)?,
                    mz_matches_certain: col_i64(&row, 5)?,
                },
            ))),
            None => Ok(None),
        }
    }

    /// Record the confidence for an assembly under a decision set. A second
    /// verdict for the same key replaces the confidence and keeps the id.
    pub async fn insert_ms_interpretation(&self, interpretation: &MsInterpretation) -> Result<Id> {
        self.check_writable()?;
        let mut rows = self
            .conn
            .query(
                "INSERT INTO ms_interpretation (ms_decision_params_id, ms_data_id, assembly_id,
                     confidence)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (ms_decision_params_id, ms_data_id, assembly_id)
                 DO UPDATE SET confidence = excluded.confidence
                 RETURNING id",
                params![
                    interpretation.ms_decision_params_id,
                    interpretation.ms_data_id,
                    interpretation.assembly_id,
                    interpretation.confidence.score(),
                ],
            )
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => col_i64(&row, 0),
            None => Err(SupramolError::Storage(
                "ms_interpretation upsert returned no row".into(),
            )),
        }
    }

    /// Interpretations of a processed MS data set, by id.
    pub async fn list_ms_interpretations(
        &self,
        ms_data_id: Id,
    ) -> Result<Vec<Stored<MsInterpretation>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, ms_decision_params_id, ms_data_id, assembly_id, confidence
                 FROM ms_interpretation WHERE ms_data_id = ?1 ORDER BY id",
                params![ms_data_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(Stored::new(
                col_i64(&row, 0)?,
                MsInterpretation {
                    ms_decision_params_id: col_i64(&row, 1)?,
                    ms_data_id: col_i64(&row, 2)?,
                    assembly_id: col_i64(&row, 3)?,
                    confidence: Confidence::try_from(col_i64(&row, 4)?)?,
                },
            ));
        }
        Ok(results)
    }
}

fn row_to_ms_data(row: &Row) -> Result<Stored<MsProcessedData>> {
    Ok(Stored::new(
        col_i64(row, 0)?,
        MsProcessedData {
            experiment_id: col_i64(row, 1)?,
            ms_proc_params_id: col_i64(row, 2)?,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiments::tests::{experiment, insert_reagents};
    use crate::test_support::test_storage;
    use supramol_shared::{AssemblyTopology, SupramolecularAssembly};

    /// Experiment with one assembly and one processed MS data set.
    async fn fixture(storage: &Storage) -> (Id, Id) {
        let (metal, amine, carbonyl) = insert_reagents(storage).await;
        let experiment_id = storage
            .insert_experiment(&experiment(metal, amine, carbonyl, 30))
            .await
            .unwrap();
        let topology_id = storage
            .insert_topology(&AssemblyTopology {
                n_metals: 4,
                n_amines: 4,
                n_carbonyls: 12,
                amine_topicity: 3,
                carbonyl_topicity: 1,
                coordination_number: 6,
            })
            .await
            .unwrap();
        let assembly_id = storage
            .insert_assembly(&SupramolecularAssembly {
                experiment_id,
                topology_id,
                cation_exact_mass: 1817.6,
            })
            .await
            .unwrap();
        let params_id = storage
            .insert_ms_proc_params(&MsProcessingParams {
                tic_pp_height: 20.0,
                tic_pp_distance: 5.0,
                ms_pp_height: 20.0,
                ms_pp_distance: 10.0,
            })
            .await
            .unwrap();
        let ms_data_id = storage
            .insert_ms_data(&MsProcessedData {
                experiment_id,
                ms_proc_params_id: params_id,
            })
            .await
            .unwrap();
        (assembly_id, ms_data_id)
    }

    #[tokio::test]
    async fn predictions_sorted_by_charge() {
        let storage = test_storage().await;
        let (assembly_id, _) = fixture(&storage).await;
        for (n_anions, exact_mass, charge, mz_value) in
            [(4, 2073.2, 4, 518.3), (0, 1817.6, 8, 227.2), (2, 1945.4, 6, 324.2)]
        {
            storage
                .insert_mz_predicted(&MzPredicted {
                    assembly_id,
                    n_anions,
                    exact_mass,
                    charge,
                    mz_value,
                })
                .await
                .unwrap();
        }
        let charges: Vec<i64> = storage
            .list_mz_predicted(assembly_id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.charge)
            .collect();
        assert_eq!(charges, vec![8, 6, 4]);
    }

    #[tokio::test]
    async fn matches_are_scoped_and_deduplicated() {
        let storage = test_storage().await;
        let (assembly_id, ms_data_id) = fixture(&storage).await;

        let predicted = storage
            .insert_mz_predicted(&MzPredicted {
                assembly_id,
                n_anions: 0,
                exact_mass: 1817.6,
                charge: 8,
                mz_value: 227.2,
            })
            .await
            .unwrap();
        let observed = storage
            .insert_mz_observed(&MzObserved {
                ms_data_id,
                mz_value: 227.1,
            })
            .await
            .unwrap();

        let tol = storage
            .get_or_insert_tolerance(&MzTolerance { atol: 0.2 })
            .await
            .unwrap();
        assert_eq!(
            storage
                .get_or_insert_tolerance(&MzTolerance { atol: 0.2 })
                .await
                .unwrap(),
            tol
        );
        let other_tol = storage
            .get_or_insert_tolerance(&MzTolerance { atol: 0.5 })
            .await
            .unwrap();
        assert_ne!(tol, other_tol);

        let m = MzMatch {
            mz_observed_id: observed,
            mz_predicted_id: predicted,
            mz_tolerance_id: tol,
        };
        storage.insert_mz_match(&m).await.unwrap();
        storage.insert_mz_match(&m).await.unwrap();

        assert_eq!(
            storage
                .list_mz_matches(ms_data_id, assembly_id, tol)
                .await
                .unwrap(),
            vec![m]
        );
        assert!(storage
            .list_mz_matches(ms_data_id, assembly_id, other_tol)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn decision_params_and_interpretations() {
        let storage = test_storage().await;
        let (assembly_id, ms_data_id) = fixture(&storage).await;

        let any = MsDecisionParams {
            multiple_mz_trigger_charge: None,
            mz_matches_low: 1,
            mz_matches_medium: 1,
            mz_matches_high: 1,
            mz_matches_certain: 1,
        };
        let params_id = storage.insert_ms_decision_params(&any).await.unwrap();
        assert_eq!(
            storage
                .get_ms_decision_params(params_id)
                .await
                .unwrap()
                .unwrap()
                .record,
            any
        );

        storage
            .insert_ms_interpretation(&MsInterpretation {
                ms_decision_params_id: params_id,
                ms_data_id,
                assembly_id,
                confidence: Confidence::Certain,
            })
            .await
            .unwrap();
        let listed = storage.list_ms_interpretations(ms_data_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].confidence, Confidence::Certain);

        let data = storage.get_ms_data(ms_data_id).await.unwrap().unwrap();
        let for_experiment = storage
            .list_ms_data_for_experiment(data.experiment_id)
            .await
            .unwrap();
        assert_eq!(for_experiment, vec![data]);
    }

    #[tokio::test]
    async fn interpretation_is_replaced_not_duplicated() {
        let storage = test_storage().await;
        let (assembly_id, ms_data_id) = fixture(&storage).await;
        let params_id = storage
            .insert_ms_decision_params(&MsDecisionParams {
                multiple_mz_trigger_charge: None,
                mz_matches_low: 1,
                mz_matches_medium: 2,
                mz_matches_high: 3,
                mz_matches_certain: 4,
            })
            .await
            .unwrap();

        let mut verdict = MsInterpretation {
            ms_decision_params_id: params_id,
            ms_data_id,
            assembly_id,
            confidence: Confidence::Low,
        };
        let first = storage.insert_ms_interpretation(&verdict).await.unwrap();
        verdict.confidence = Confidence::High;
        let second = storage.insert_ms_interpretation(&verdict).await.unwrap();
        assert_eq!(first, second);

        let listed = storage.list_ms_interpretations(ms_data_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].confidence, Confidence::High);
    }
}
