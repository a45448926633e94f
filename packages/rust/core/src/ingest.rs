//! Raw data ingestion: checksum, copy into the data store under a UUIDv4
//! name, and record the file in the database.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use supramol_shared::{Id, RawDataFile, Result, Stored, SupramolError};
use supramol_storage::Storage;

use crate::naming::RawDataName;

/// Progress callback for batch ingestion.
pub trait ProgressReporter: Send + Sync {
    /// Called before each file, `current` counting from 1.
    fn file_started(&self, path: &Path, current: usize, total: usize);
    /// Called after a file was stored or recognised as a duplicate.
    fn file_ingested(&self, outcome: &IngestOutcome);
    /// Called when a file could not be ingested.
    fn file_failed(&self, path: &Path, error: &SupramolError);
    /// Called once every file was attempted.
    fn done(&self, report: &IngestReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn file_started(&self, _path: &Path, _current: usize, _total: usize) {}
    fn file_ingested(&self, _outcome: &IngestOutcome) {}
    fn file_failed(&self, _path: &Path, _error: &SupramolError) {}
    fn done(&self, _report: &IngestReport) {}
}

/// Result of ingesting one file.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub file: Stored<RawDataFile>,
    /// The same content had been ingested before; nothing was copied.
    pub duplicate: bool,
}

/// Result of ingesting many files.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: Vec<Stored<RawDataFile>>,
    pub duplicates: Vec<Stored<RawDataFile>>,
    pub failed: Vec<(PathBuf, SupramolError)>,
}

/// Ingest one raw data file.
///
/// Vendor NMR folders must be archived first: directories are rejected.
/// Content that was already ingested is not copied again; an unlinked
/// duplicate is attached to `experiment_id`.
#[instrument(skip_all, fields(path = %path.display(), ?experiment_id))]
pub async fn ingest_file(
    storage: &Storage,
    store_dir: &Path,
    path: &Path,
    experiment_id: Option<Id>,
) -> Result<IngestOutcome> {
    let metadata = std::fs::metadata(path).map_err(|e| SupramolError::io(path, e))?;
    if metadata.is_dir() {
        return Err(SupramolError::validation(format!(
            "{} is a directory; archive it into a single file first",
            path.display()
        )));
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SupramolError::parse(format!("no file name in {}", path.display())))?;
    let name = RawDataName::parse(file_name)?;

    if let Some(id) = experiment_id {
        if storage.get_experiment(id).await?.is_none() {
            return Err(SupramolError::not_found("experiment", id));
        }
    }

    let sha256 = compute_hash(path)?;
    if let Some(existing) = storage.find_raw_data_file_by_sha256(&sha256).await? {
        info!(uuid = %existing.uuid, "content already ingested");
        let file = link_duplicate(storage, existing, experiment_id).await?;
        return Ok(IngestOutcome {
            file,
            duplicate: true,
        });
    }

    let uuid = Uuid::new_v4().to_string();
    let kind_dir = name.kind.as_str().to_lowercase();
    let target_dir = store_dir.join(&kind_dir);
    std::fs::create_dir_all(&target_dir).map_err(|e| SupramolError::io(&target_dir, e))?;

    let stored_name = name.stored_file_name(&uuid);
    let target = target_dir.join(&stored_name);
    let temp = target_dir.join(format!(".{stored_name}.tmp"));
    let size_bytes = match std::fs::copy(path, &temp) {
        Ok(size) => size,
        Err(e) => {
            let _ = std::fs::remove_file(&temp);
            return Err(SupramolError::io(path, e));
        }
    };
    std::fs::rename(&temp, &target).map_err(|e| SupramolError::io(&target, e))?;

    let record = RawDataFile {
        uuid,
        kind: name.kind,
        original_name: file_name.to_string(),
        experiment_number: name.experiment_number,
        batch: name.batch,
        acquired_on: name.date,
        extension: name.extension.clone(),
        sha256,
        size_bytes,
        stored_path: format!("{kind_dir}/{stored_name}"),
        experiment_id,
        ingested_at: Utc::now(),
    };

    let id = match storage.insert_raw_data_file(&record).await {
        Ok(id) => id,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_file(&target) {
                warn!(path = %target.display(), error = %cleanup, "could not remove orphaned copy");
            }
            return Err(e);
        }
    };

    debug!(uuid = %record.uuid, size = record.size_bytes, "stored raw data file");
    Ok(IngestOutcome {
        file: Stored::new(id, record),
        duplicate: false,
    })
}

/// Ingest many files; a failing file is recorded in the report and the rest
/// continue.
#[instrument(skip_all, fields(count = paths.len()))]
pub async fn ingest_paths(
    storage: &Storage,
    store_dir: &Path,
    paths: &[PathBuf],
    experiment_id: Option<Id>,
    progress: &dyn ProgressReporter,
) -> IngestReport {
    let mut report = IngestReport::default();

    for (i, path) in paths.iter().enumerate() {
        progress.file_started(path, i + 1, paths.len());
        match ingest_file(storage, store_dir, path, experiment_id).await {
            Ok(outcome) => {
                progress.file_ingested(&outcome);
                if outcome.duplicate {
                    report.duplicates.push(outcome.file);
                } else {
                    report.ingested.push(outcome.file);
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ingestion failed");
                progress.file_failed(path, &e);
                report.failed.push((path.clone(), e));
            }
        }
    }

    info!(
        ingested = report.ingested.len(),
        duplicates = report.duplicates.len(),
        failed = report.failed.len(),
        "ingestion complete"
    );
    progress.done(&report);
    report
}

/// Attach a previously ingested file to `experiment_id` if it has no link yet.
async fn link_duplicate(
    storage: &Storage,
    mut existing: Stored<RawDataFile>,
    experiment_id: Option<Id>,
) -> Result<Stored<RawDataFile>> {
    match (existing.experiment_id, experiment_id) {
        (None, Some(id)) => {
            storage.link_raw_data_file(existing.id, id).await?;
            existing.record.experiment_id = Some(id);
            debug!(uuid = %existing.uuid, experiment_id = id, "linked duplicate");
            Ok(existing)
        }
        (Some(linked), Some(id)) if linked != id => Err(SupramolError::validation(format!(
            "{} is already linked to experiment {linked}, not {id}",
            existing.original_name
        ))),
        _ => Ok(existing),
    }
}

/// Compute the SHA-256 hash of a file, streaming its content.
fn compute_hash(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| SupramolError::io(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| SupramolError::io(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_dir, test_storage};
    use supramol_shared::DataKind;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn copies_under_uuid_name() {
        let storage = test_storage().await;
        let inbox = temp_dir("inbox");
        let store = temp_dir("store");
        let path = write(&inbox, "LCMS_SAMOSA_EXP2_B1_2024_10_30.raw", b"spectrum");

        let outcome = ingest_file(&storage, &store, &path, None).await.unwrap();
        assert!(!outcome.duplicate);

        let file = &outcome.file;
        assert_eq!(file.kind, DataKind::Lcms);
        assert_eq!(file.experiment_number, 2);
        assert_eq!(
            file.sha256,
            "1fd6202c9bb335c65040575f892b4b9269651729adf08036bf11bc4694d9421d"
        );
        assert_eq!(file.size_bytes, 8);
        assert_eq!(file.stored_path, format!("lcms/{}.raw", file.uuid));
        assert!(Uuid::parse_str(&file.uuid).is_ok());

        let copied = std::fs::read(store.join(&file.stored_path)).unwrap();
        assert_eq!(copied, b"spectrum");
        assert!(path.exists(), "original left in place");
    }

    #[tokio::test]
    async fn same_content_is_not_copied_twice() {
        let storage = test_storage().await;
        let inbox = temp_dir("inbox");
        let store = temp_dir("store");
        let first = write(&inbox, "NMR_SAMOSA_EXP1_B1_2024_10_29.zip", b"fid");
        let second = write(&inbox, "NMR_SAMOSA_EXP1_B2_2024_10_29.zip", b"fid");

        let a = ingest_file(&storage, &store, &first, None).await.unwrap();
        let b = ingest_file(&storage, &store, &second, None).await.unwrap();
        assert!(b.duplicate);
        assert_eq!(a.file.id, b.file.id);
        assert_eq!(std::fs::read_dir(store.join("nmr")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn directories_and_bad_names_rejected() {
        let storage = test_storage().await;
        let inbox = temp_dir("inbox");
        let store = temp_dir("store");

        let folder = inbox.join("NMR_SAMOSA_EXP1_B1_2024_10_29.d");
        std::fs::create_dir_all(&folder).unwrap();
        let err = ingest_file(&storage, &store, &folder, None).await.unwrap_err();
        assert!(matches!(err, SupramolError::Validation { .. }));

        let bad = write(&inbox, "spectrum.raw", b"x");
        let err = ingest_file(&storage, &store, &bad, None).await.unwrap_err();
        assert!(matches!(err, SupramolError::Parse { .. }));
    }

    #[tokio::test]
    async fn unknown_experiment_rejected_before_copy() {
        let storage = test_storage().await;
        let inbox = temp_dir("inbox");
        let store = temp_dir("store");
        let path = write(&inbox, "LCMS_SAMOSA_EXP2_B1_2024_10_30.raw", b"spectrum");

        let err = ingest_file(&storage, &store, &path, Some(42)).await.unwrap_err();
        assert!(matches!(err, SupramolError::NotFound { .. }));
        assert!(!store.join("lcms").exists());
    }

    async fn two_experiments(storage: &Storage) -> (Id, Id) {
        crate::example::populate_example(storage).await.unwrap();
        let experiments = storage.list_experiments().await.unwrap();
        (experiments[0].experiment.id, experiments[1].experiment.id)
    }

    #[tokio::test]
    async fn duplicate_gets_linked_to_experiment() {
        let storage = test_storage().await;
        let (experiment, _) = two_experiments(&storage).await;
        let inbox = temp_dir("inbox");
        let store = temp_dir("store");
        let path = write(&inbox, "LCMS_SAMOSA_EXP2_B1_2024_10_30.raw", b"spectrum");

        let first = ingest_file(&storage, &store, &path, None).await.unwrap();
        assert_eq!(first.file.experiment_id, None);

        let again = ingest_file(&storage, &store, &path, Some(experiment))
            .await
            .unwrap();
        assert!(again.duplicate);
        assert_eq!(again.file.experiment_id, Some(experiment));
        let stored = storage
            .get_raw_data_file_by_uuid(&first.file.uuid)
            .await
            .unwrap()
            .expect("stored file");
        assert_eq!(stored.experiment_id, Some(experiment));

        let same = ingest_file(&storage, &store, &path, Some(experiment))
            .await
            .unwrap();
        assert_eq!(same.file.experiment_id, Some(experiment));
    }

    #[tokio::test]
    async fn duplicate_link_conflicts_rejected() {
        let storage = test_storage().await;
        let (experiment, other) = two_experiments(&storage).await;
        let inbox = temp_dir("inbox");
        let store = temp_dir("store");
        let path = write(&inbox, "LCMS_SAMOSA_EXP2_B1_2024_10_30.raw", b"spectrum");
        let first = ingest_file(&storage, &store, &path, Some(experiment))
            .await
            .unwrap();

        let err = ingest_file(&storage, &store, &path, Some(999)).await.unwrap_err();
        assert!(matches!(err, SupramolError::NotFound { .. }));

        let err = ingest_file(&storage, &store, &path, Some(other)).await.unwrap_err();
        assert!(matches!(err, SupramolError::Validation { .. }));

        let stored = storage
            .get_raw_data_file_by_uuid(&first.file.uuid)
            .await
            .unwrap()
            .expect("stored file");
        assert_eq!(stored.experiment_id, Some(experiment));
    }

    #[tokio::test]
    async fn batch_collects_failures() {
        let storage = test_storage().await;
        let inbox = temp_dir("inbox");
        let store = temp_dir("store");
        let paths = vec![
            write(&inbox, "LCMS_SAMOSA_EXP2_B1_2024_10_30.raw", b"a"),
            write(&inbox, "notes.txt", b"b"),
            write(&inbox, "LCMS_SAMOSA_EXP2_B2_2024_10_30.raw", b"a"),
            inbox.join("LCMS_SAMOSA_EXP3_B1_2024_10_30.raw"),
        ];

        let report = ingest_paths(&storage, &store, &paths, None, &SilentProgress).await;
        assert_eq!(report.ingested.len(), 1);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].0, paths[1]);
        assert!(matches!(report.failed[1].1, SupramolError::Io { .. }));
    }
}
