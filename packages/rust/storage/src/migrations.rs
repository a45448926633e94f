//! SQL migration definitions for the experimental results database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: reagents, experiments, assemblies, NMR and MS results",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Ions of metal salts
CREATE TABLE IF NOT EXISTS ion (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    charge     INTEGER NOT NULL,
    formula    TEXT NOT NULL,
    exact_mass REAL NOT NULL
);

-- Reagents; `role` selects the role table holding the rest of the row
CREATE TABLE IF NOT EXISTS reagent (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    cas_number TEXT UNIQUE,
    name       TEXT NOT NULL,
    exact_mass REAL NOT NULL,
    role       TEXT NOT NULL CHECK (role IN ('amine', 'carbonyl', 'metal'))
);

CREATE TABLE IF NOT EXISTS metal (
    id          INTEGER PRIMARY KEY REFERENCES reagent(id) ON DELETE CASCADE,
    cation_id   INTEGER NOT NULL REFERENCES ion(id),
    num_cations INTEGER NOT NULL,
    anion_id    INTEGER NOT NULL REFERENCES ion(id),
    num_anions  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS amine (
    id       INTEGER PRIMARY KEY REFERENCES reagent(id) ON DELETE CASCADE,
    nmr_data TEXT
);

CREATE TABLE IF NOT EXISTS carbonyl (
    id       INTEGER PRIMARY KEY REFERENCES reagent(id) ON DELETE CASCADE,
    nmr_data TEXT
);

-- Cheminformatics descriptors
CREATE TABLE IF NOT EXISTS descriptor (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS reagent_descriptor (
    reagent_id    INTEGER NOT NULL REFERENCES reagent(id) ON DELETE CASCADE,
    descriptor_id INTEGER NOT NULL REFERENCES descriptor(id),
    value         TEXT NOT NULL,
    PRIMARY KEY (reagent_id, descriptor_id)
);

-- Experiments
CREATE TABLE IF NOT EXISTS experiment (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    date          TEXT NOT NULL,
    solvent       TEXT NOT NULL,
    temperature   REAL NOT NULL,
    time_seconds  INTEGER NOT NULL,
    nmr_data_path TEXT NOT NULL,
    ms_data_path  TEXT NOT NULL,
    amine_id      INTEGER NOT NULL REFERENCES reagent(id),
    carbonyl_id   INTEGER NOT NULL REFERENCES reagent(id),
    metal_id      INTEGER NOT NULL REFERENCES reagent(id)
);

CREATE INDEX IF NOT EXISTS idx_experiment_date ON experiment(date);

-- Candidate assemblies
CREATE TABLE IF NOT EXISTS topology (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    n_metals            INTEGER NOT NULL,
    n_amines            INTEGER NOT NULL,
    n_carbonyls         INTEGER NOT NULL,
    amine_topicity      INTEGER NOT NULL,
    carbonyl_topicity   INTEGER NOT NULL,
    coordination_number INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS assembly (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id     INTEGER NOT NULL REFERENCES experiment(id) ON DELETE CASCADE,
    topology_id       INTEGER NOT NULL REFERENCES topology(id),
    cation_exact_mass REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_assembly_experiment ON assembly(experiment_id);

-- NMR
CREATE TABLE IF NOT EXISTS nmr_processing_params (
    id                       INTEGER PRIMARY KEY AUTOINCREMENT,
    relative_height          REAL NOT NULL,
    peak_picking_range_left  REAL NOT NULL,
    peak_picking_range_right REAL NOT NULL,
    peak_picking_threshold   REAL NOT NULL,
    spectrum_size            INTEGER NOT NULL,
    line_broadening          REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS nmr_processed_data (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    nmr_proc_params_id INTEGER NOT NULL REFERENCES nmr_processing_params(id),
    experiment_id      INTEGER NOT NULL REFERENCES experiment(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS nmr_peaks_ppm (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    nmr_data_id INTEGER NOT NULL REFERENCES nmr_processed_data(id) ON DELETE CASCADE,
    peak_ppm    REAL NOT NULL,
    is_sm       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nmr_peaks_data ON nmr_peaks_ppm(nmr_data_id);

CREATE TABLE IF NOT EXISTS nmr_decision_params (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    peak_number_tolerance INTEGER NOT NULL,
    peak_shift_proportion REAL NOT NULL,
    sm_peaks_allowed      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS nmr_interpretation (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    nmr_decision_params_id INTEGER NOT NULL REFERENCES nmr_decision_params(id),
    nmr_data_id            INTEGER NOT NULL REFERENCES nmr_processed_data(id) ON DELETE CASCADE,
    symmetrical            INTEGER NOT NULL,
    pure                   INTEGER NOT NULL,
    confidence             INTEGER NOT NULL
);

-- MS
CREATE TABLE IF NOT EXISTS ms_processing_params (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    tic_pp_height   REAL NOT NULL,
    tic_pp_distance REAL NOT NULL,
    ms_pp_height    REAL NOT NULL,
    ms_pp_distance  REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS ms_processed_data (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id     INTEGER NOT NULL REFERENCES experiment(id) ON DELETE CASCADE,
    ms_proc_params_id INTEGER NOT NULL REFERENCES ms_processing_params(id)
);

CREATE TABLE IF NOT EXISTS mz_observed (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    ms_data_id INTEGER NOT NULL REFERENCES ms_processed_data(id) ON DELETE CASCADE,
    mz_value   REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mz_observed_data ON mz_observed(ms_data_id);

CREATE TABLE IF NOT EXISTS mz_predicted (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    assembly_id INTEGER NOT NULL REFERENCES assembly(id) ON DELETE CASCADE,
    n_anions    INTEGER NOT NULL,
    exact_mass  REAL NOT NULL,
    charge      INTEGER NOT NULL,
    mz_value    REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mz_predicted_assembly ON mz_predicted(assembly_id);

CREATE TABLE IF NOT EXISTS mz_tolerance (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    atol REAL NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS mz_match (
    mz_observed_id  INTEGER NOT NULL REFERENCES mz_observed(id) ON DELETE CASCADE,
    mz_predicted_id INTEGER NOT NULL REFERENCES mz_predicted(id) ON DELETE CASCADE,
    mz_tolerance_id INTEGER NOT NULL REFERENCES mz_tolerance(id),
    PRIMARY KEY (mz_observed_id, mz_predicted_id, mz_tolerance_id)
);

CREATE TABLE IF NOT EXISTS ms_decision_params (
    id                         INTEGER PRIMARY KEY AUTOINCREMENT,
    multiple_mz_trigger_charge INTEGER,
    mz_matches_low             INTEGER NOT NULL,
    mz_matches_medium          INTEGER NOT NULL,
    mz_matches_high            INTEGER NOT NULL,
    mz_matches_certain         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ms_interpretation (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    ms_decision_params_id INTEGER NOT NULL REFERENCES ms_decision_params(id),
    ms_data_id            INTEGER NOT NULL REFERENCES ms_processed_data(id) ON DELETE CASCADE,
    assembly_id           INTEGER NOT NULL REFERENCES assembly(id) ON DELETE CASCADE,
    confidence            INTEGER NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Raw data file ledger for UUID-renamed instrument files",
            sql: r#"
CREATE TABLE IF NOT EXISTS raw_data_file (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid              TEXT NOT NULL UNIQUE,
    kind              TEXT NOT NULL CHECK (kind IN ('NMR', 'LCMS')),
    original_name     TEXT NOT NULL,
    experiment_number INTEGER NOT NULL,
    batch             INTEGER NOT NULL,
    acquired_on       TEXT NOT NULL,
    extension         TEXT NOT NULL,
    sha256            TEXT NOT NULL UNIQUE,
    size_bytes        INTEGER NOT NULL,
    stored_path       TEXT NOT NULL,
    experiment_id     INTEGER REFERENCES experiment(id) ON DELETE SET NULL,
    ingested_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_data_experiment ON raw_data_file(experiment_number, batch);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
        Migration {
            version: 3,
            description: "One MS interpretation per decision set, spectrum and assembly",
            sql: r#"
DELETE FROM ms_interpretation
WHERE id NOT IN (
    SELECT MAX(id) FROM ms_interpretation
    GROUP BY ms_decision_params_id, ms_data_id, assembly_id
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_ms_interpretation_key
    ON ms_interpretation(ms_decision_params_id, ms_data_id, assembly_id);

INSERT INTO schema_migrations (version) VALUES (3);
"#,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_ascending_and_recorded() {
        let migrations = all_migrations();
        for pair in migrations.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
        for m in &migrations {
            let marker = format!("INSERT INTO schema_migrations (version) VALUES ({});", m.version);
            assert!(m.sql.contains(&marker), "migration v{} does not record itself", m.version);
        }
    }
}
