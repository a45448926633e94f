//! Ledger of ingested raw data files.

use libsql::{Row, params};
use supramol_shared::{DataKind, Id, RawDataFile, Result, Stored, SupramolError};

use crate::{
    Storage, col_date, col_i64, col_opt_i64, col_string, col_timestamp, fmt_date, storage_err,
};

const RAW_DATA_COLUMNS: &str = "id, uuid, kind, original_name, experiment_number, batch,
    acquired_on, extension, sha256, size_bytes, stored_path, experiment_id, ingested_at";

impl Storage {
    /// Record an ingested file. UUIDs and checksums are unique.
    pub async fn insert_raw_data_file(&self, file: &RawDataFile) -> Result<Id> {
        self.insert(
            "INSERT INTO raw_data_file (uuid, kind, original_name, experiment_number, batch,
                 acquired_on, extension, sha256, size_bytes, stored_path, experiment_id,
                 ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                file.uuid.as_str(),
                file.kind.as_str(),
                file.original_name.as_str(),
                i64::from(file.experiment_number),
                i64::from(file.batch),
                fmt_date(&file.acquired_on),
                file.extension.as_str(),
                file.sha256.as_str(),
                file.size_bytes as i64,
                file.stored_path.as_str(),
                file.experiment_id,
                file.ingested_at.to_rfc3339(),
            ],
        )
        .await
    }

    pub async fn get_raw_data_file_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<Option<Stored<RawDataFile>>> {
        self.query_one_raw_data_file("uuid", uuid).await
    }

    /// Find an already ingested file with the same content.
    pub async fn find_raw_data_file_by_sha256(
        &self,
        sha256: &str,
    ) -> Result<Option<Stored<RawDataFile>>> {
        self.query_one_raw_data_file("sha256", sha256).await
    }

    async fn query_one_raw_data_file(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<Stored<RawDataFile>>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RAW_DATA_COLUMNS} FROM raw_data_file WHERE {column} = ?1"),
                params![value],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_raw_data_file(&row)?)),
            None => Ok(None),
        }
    }

    /// Attach an ingested file to an experiment.
    pub async fn link_raw_data_file(&self, id: Id, experiment_id: Id) -> Result<()> {
        self.check_writable()?;
        let updated = self
            .conn
            .execute(
                "UPDATE raw_data_file SET experiment_id = ?1 WHERE id = ?2",
                params![experiment_id, id],
            )
            .await
            .map_err(storage_err)?;
        if updated == 0 {
            return Err(SupramolError::not_found("raw data file", id));
        }
        Ok(())
    }

    /// All ingested files, optionally for one experiment number, in
    /// acquisition order.
    pub async fn list_raw_data_files(
        &self,
        experiment_number: Option<u32>,
    ) -> Result<Vec<Stored<RawDataFile>>> {
        let mut rows = match experiment_number {
            Some(n) => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {RAW_DATA_COLUMNS} FROM raw_data_file
                             WHERE experiment_number = ?1
                             ORDER BY acquired_on, experiment_number, batch, id"
                        ),
                        params![i64::from(n)],
                    )
                    .await
            }
            None => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {RAW_DATA_COLUMNS} FROM raw_data_file
                             ORDER BY acquired_on, experiment_number, batch, id"
                        ),
                        params![],
                    )
                    .await
            }
        }
        .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_raw_data_file(&row)?);
        }
        Ok(results)
    }
}

fn row_to_raw_data_file(row: &Row) -> Result<Stored<RawDataFile>> {
    let kind: DataKind = col_string(row, 2)?.parse()?;
    let number = |idx: i32| -> Result<u32> {
        let v = col_i64(row, idx)?;
        u32::try_from(v).map_err(|_| SupramolError::Storage(format!("invalid number {v}")))
    };

    Ok(Stored::new(
        col_i64(row, 0)?,
        RawDataFile {
            uuid: col_string(row, 1)?,
            kind,
            original_name: col_string(row, 3)?,
            experiment_number: number(4)?,
            batch: number(5)?,
            acquired_on: col_date(row, 6)?,
            extension: col_string(row, 7)?,
            sha256: col_string(row, 8)?,
            size_bytes: col_i64(row, 9)? as u64,
            stored_path: col_string(row, 10)?,
            experiment_id: col_opt_i64(row, 11),
            ingested_at: col_timestamp(row, 12)?,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use chrono::{NaiveDate, Utc};

    fn file(uuid: &str, sha256: &str, experiment_number: u32) -> RawDataFile {
        RawDataFile {
            uuid: uuid.into(),
            kind: DataKind::Lcms,
            original_name: format!("LCMS_SAMOSA_EXP{experiment_number}_B1_2024_10_30.raw"),
            experiment_number,
            batch: 1,
            acquired_on: NaiveDate::from_ymd_opt(2024, 10, 30).unwrap(),
            extension: "raw".into(),
            sha256: sha256.into(),
            size_bytes: 4,
            stored_path: format!("lcms/{uuid}.raw"),
            experiment_id: None,
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lookup_by_uuid_and_checksum() {
        let storage = test_storage().await;
        let record = file("1b4e28ba-2fa1-4d3b-a3f5-ef19b5a7633b", "aa", 1);
        let id = storage.insert_raw_data_file(&record).await.unwrap();

        let by_uuid = storage
            .get_raw_data_file_by_uuid(&record.uuid)
            .await
            .unwrap()
            .expect("by uuid");
        assert_eq!(by_uuid.id, id);
        assert_eq!(by_uuid.kind, DataKind::Lcms);
        assert_eq!(by_uuid.acquired_on, record.acquired_on);

        let by_hash = storage.find_raw_data_file_by_sha256("aa").await.unwrap();
        assert_eq!(by_hash.map(|f| f.id), Some(id));
        assert!(storage.find_raw_data_file_by_sha256("bb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_content_rejected() {
        let storage = test_storage().await;
        storage.insert_raw_data_file(&file("u1", "aa", 1)).await.unwrap();
        let err = storage
            .insert_raw_data_file(&file("u2", "aa", 1))
            .await
            .unwrap_err();
        assert!(err.is_integrity());
    }

    #[tokio::test]
    async fn list_filters_by_experiment_number() {
        let storage = test_storage().await;
        storage.insert_raw_data_file(&file("u1", "aa", 1)).await.unwrap();
        storage.insert_raw_data_file(&file("u2", "bb", 2)).await.unwrap();

        assert_eq!(storage.list_raw_data_files(None).await.unwrap().len(), 2);
        let exp2 = storage.list_raw_data_files(Some(2)).await.unwrap();
        assert_eq!(exp2.len(), 1);
        assert_eq!(exp2[0].uuid, "u2");
    }

    #[tokio::test]
    async fn link_requires_existing_rows() {
        let storage = test_storage().await;
        let err = storage.link_raw_data_file(7, 1).await.unwrap_err();
        assert!(matches!(err, SupramolError::NotFound { .. }));

        let id = storage.insert_raw_data_file(&file("u1", "aa", 1)).await.unwrap();
        let err = storage.link_raw_data_file(id, 999).await.unwrap_err();
        assert!(err.is_integrity());
    }
}
