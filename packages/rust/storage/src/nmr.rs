//! NMR: processing parameter sets, processed data, picked peaks, decision
//! parameter sets and interpretations.

use libsql::params;
use supramol_shared::{
    Confidence, Id, NmrDecisionParams, NmrInterpretation, NmrPeak, NmrProcessedData,
    NmrProcessingParams, Result, Stored,
};

use crate::{Storage, col_bool, col_f64, col_i64, storage_err};

impl Storage {
    pub async fn insert_nmr_proc_params(&self, proc_params: &NmrProcessingParams) -> Result<Id> {
        self.insert(
            "INSERT INTO nmr_processing_params (relative_height, peak_picking_range_left,
                 peak_picking_range_right, peak_picking_threshold, spectrum_size, line_broadening)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                proc_params.relative_height,
                proc_params.peak_picking_range_left,
                proc_params.peak_picking_range_right,
                proc_params.peak_picking_threshold,
                proc_params.spectrum_size,
                proc_params.line_broadening,
            ],
        )
        .await
    }

    pub async fn insert_nmr_data(&self, data: &NmrProcessedData) -> Result<Id> {
        self.insert(
            "INSERT INTO nmr_processed_data (nmr_proc_params_id, experiment_id) VALUES (?1, ?2)",
            params![data.nmr_proc_params_id, data.experiment_id],
        )
        .await
    }

    pub async fn list_nmr_data_for_experiment(
        &self,
        experiment_id: Id,
    ) -> Result<Vec<Stored<NmrProcessedData>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, nmr_proc_params_id, experiment_id FROM nmr_processed_data
                 WHERE experiment_id = ?1 ORDER BY id",
                params![experiment_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(Stored::new(
                col_i64(&row, 0)?,
                NmrProcessedData {
                    nmr_proc_params_id: col_i64(&row, 1)?,
                    experiment_id: col_i64(&row, 2)?,
                },
            ));
        }
        Ok(results)
    }

    pub async fn insert_nmr_peak(&self, peak: &NmrPeak) -> Result<Id> {
        self.insert(
            "INSERT INTO nmr_peaks_ppm (nmr_data_id, peak_ppm, is_sm) VALUES (?1, ?2, ?3)",
            params![peak.nmr_data_id, peak.peak_ppm, i64::from(peak.is_sm)],
        )
        .await
    }

    /// Peaks of a processed spectrum, downfield first.
    pub async fn list_nmr_peaks(&self, nmr_data_id: Id) -> Result<Vec<Stored<NmrPeak>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, nmr_data_id, peak_ppm, is_sm FROM nmr_peaks_ppm
                 WHERE nmr_data_id = ?1 ORDER BY peak_ppm DESC, id",
                params![nmr_data_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(Stored::new(
                col_i64(&row, 0)?,
                NmrPeak {
                    nmr_data_id: col_i64(&row, 1)?,
                    peak_ppm: col_f64(&row, 2)?,
                    is_sm: col_bool(&row, 3)?,
                },
            ));
        }
        Ok(results)
    }

    pub async fn insert_nmr_decision_params(&self, decision: &NmrDecisionParams) -> Result<Id> {
        self.insert(
            "INSERT INTO nmr_decision_params (peak_number_tolerance, peak_shift_proportion,
                 sm_peaks_allowed)
             VALUES (?1, ?2, ?3)",
            params![
                decision.peak_number_tolerance,
                decision.peak_shift_proportion,
                i64::from(decision.sm_peaks_allowed),
            ],
        )
        .await
    }

    pub async fn insert_nmr_interpretation(
        &self,
        interpretation: &NmrInterpretation,
    ) -> Result<Id> {
        self.insert(
            "INSERT INTO nmr_interpretation (nmr_decision_params_id, nmr_data_id, symmetrical,
                 pure, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                interpretation.nmr_decision_params_id,
                interpretation.nmr_data_id,
                i64::from(interpretation.symmetrical),
                i64::from(interpretation.pure),
                interpretation.confidence.score(),
            ],
        )
        .await
    }

    /// Interpretations of a processed spectrum, by id.
    pub async fn list_nmr_interpretations(
        &self,
        nmr_data_id: Id,
    ) -> Result<Vec<Stored<NmrInterpretation>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, nmr_decision_params_id, nmr_data_id, symmetrical, pure, confidence
                 FROM nmr_interpretation WHERE nmr_data_id = ?1 ORDER BY id",
                params![nmr_data_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(Stored::new(
                col_i64(&row, 0)?,
                NmrInterpretation {
                    nmr_decision_params_id: col_i64(&row, 1)?,
                    nmr_data_id: col_i64(&row, 2)?,
                    symmetrical: col_bool(&row, 3)?,
                    pure: col_bool(&row, 4)?,
                    confidence: Confidence::try_from(col_i64(&row, 5)?)?,
                },
            ));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiments::tests::{experiment, insert_reagents};
    use crate::test_support::test_storage;

    #[tokio::test]
    async fn peaks_and_interpretations() {
        let storage = test_storage().await;
        let (metal, amine, carbonyl) = insert_reagents(&storage).await;
        let experiment_id = storage
            .insert_experiment(&experiment(metal, amine, carbonyl, 29))
            .await
            .unwrap();

        let params_id = storage
            .insert_nmr_proc_params(&NmrProcessingParams {
                relative_height: 150.0,
                peak_picking_range_left: 12.0,
                peak_picking_range_right: 5.0,
                peak_picking_threshold: 25.0,
                spectrum_size: 16000,
                line_broadening: 1.2,
            })
            .await
            .unwrap();
        let data_id = storage
            .insert_nmr_data(&NmrProcessedData {
                nmr_proc_params_id: params_id,
                experiment_id,
            })
            .await
            .unwrap();

        for (ppm, is_sm) in [(7.0, true), (11.0, true), (6.0, false), (8.0, true)] {
            storage
                .insert_nmr_peak(&NmrPeak {
                    nmr_data_id: data_id,
                    peak_ppm: ppm,
                    is_sm,
                })
                .await
                .unwrap();
        }
        let peaks = storage.list_nmr_peaks(data_id).await.unwrap();
        let shifts: Vec<f64> = peaks.iter().map(|p| p.peak_ppm).collect();
        assert_eq!(shifts, vec![11.0, 8.0, 7.0, 6.0]);
        assert!(!peaks[3].is_sm);

        let decision_id = storage
            .insert_nmr_decision_params(&NmrDecisionParams {
                peak_number_tolerance: 2,
                peak_shift_proportion: 0.5,
                sm_peaks_allowed: false,
            })
            .await
            .unwrap();
        let interpretation = NmrInterpretation {
            nmr_decision_params_id: decision_id,
            nmr_data_id: data_id,
            symmetrical: false,
            pure: false,
            confidence: Confidence::Low,
        };
        storage
            .insert_nmr_interpretation(&interpretation)
            .await
            .unwrap();

        let listed = storage.list_nmr_interpretations(data_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record, interpretation);
        assert_eq!(
            storage
                .list_nmr_data_for_experiment(experiment_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
