//! Records of the experimental results database.
//!
//! Each struct mirrors one table without its primary key; rows read back from
//! storage come wrapped in [`Stored`], which carries the database id.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SupramolError};
use crate::types::{Confidence, DataKind, Id, ReagentRole};

// ---------------------------------------------------------------------------
// Stored
// ---------------------------------------------------------------------------

/// A record together with the id the database assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: Id,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Stored<T> {
    pub fn new(id: Id, record: T) -> Self {
        Self { id, record }
    }
}

impl<T> std::ops::Deref for Stored<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

// ---------------------------------------------------------------------------
// Reagents
// ---------------------------------------------------------------------------

/// A cation or anion of a metal salt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ion {
    pub name: String,
    /// Signed charge, e.g. `2` for Zn(II), `-1` for triflate.
    pub charge: i64,
    pub formula: String,
    /// Monoisotopic mass used for m/z predictions.
    pub exact_mass: f64,
}

/// A reagent used in the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reagent {
    /// CAS registry number, unique when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cas_number: Option<String>,
    /// IUPAC name or nickname.
    pub name: String,
    /// Exact mass of the main component.
    pub exact_mass: f64,
    /// Role-specific data.
    pub kind: ReagentKind,
}

/// Role-specific part of a reagent, one variant per role table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ReagentKind {
    Metal {
        cation_id: Id,
        num_cations: i64,
        anion_id: Id,
        num_anions: i64,
    },
    Amine {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nmr_data: Option<String>,
    },
    Carbonyl {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nmr_data: Option<String>,
    },
}

impl ReagentKind {
    pub fn role(&self) -> ReagentRole {
        match self {
            Self::Metal { .. } => ReagentRole::Metal,
            Self::Amine { .. } => ReagentRole::Amine,
            Self::Carbonyl { .. } => ReagentRole::Carbonyl,
        }
    }
}

impl Reagent {
    pub fn role(&self) -> ReagentRole {
        self.kind.role()
    }
}

/// A cheminformatics descriptor name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
}

/// Value of a descriptor for one reagent, kept as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReagentDescriptor {
    pub reagent_id: Id,
    pub descriptor_id: Id,
    pub value: String,
}

impl ReagentDescriptor {
    /// Parse the stored text value into a concrete type.
    pub fn parse_value<T>(&self) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.value.trim().parse::<T>().map_err(|e| {
            SupramolError::parse(format!(
                "descriptor {} of reagent {}: '{}': {e}",
                self.descriptor_id, self.reagent_id, self.value
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Experiments and assemblies
// ---------------------------------------------------------------------------

/// Everything recorded about one reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub date: NaiveDateTime,
    pub solvent: String,
    /// Reaction temperature in K.
    pub temperature: f64,
    /// Reaction time.
    #[serde(with = "seconds")]
    pub time: Duration,
    pub nmr_data_path: String,
    pub ms_data_path: String,
    pub amine_id: Id,
    pub carbonyl_id: Id,
    pub metal_id: Id,
}

/// Stoichiometry and connectivity of a candidate assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyTopology {
    pub n_metals: i64,
    pub n_amines: i64,
    pub n_carbonyls: i64,
    pub amine_topicity: i64,
    pub carbonyl_topicity: i64,
    pub coordination_number: i64,
}

/// A supramolecular assembly that an experiment may have produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupramolecularAssembly {
    pub experiment_id: Id,
    pub topology_id: Id,
    /// Exact mass of the assembly cation without counter-anions.
    pub cation_exact_mass: f64,
}

// ---------------------------------------------------------------------------
// Mass spectrometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MzPredicted {
    pub assembly_id: Id,
    pub n_anions: i64,
    pub exact_mass: f64,
    pub charge: i64,
    pub mz_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MzObserved {
    pub ms_data_id: Id,
    pub mz_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MzTolerance {
    pub atol: f64,
}

/// Observed and predicted m/z values that agree within a tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MzMatch {
    pub mz_observed_id: Id,
    pub mz_predicted_id: Id,
    pub mz_tolerance_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsProcessingParams {
    pub tic_pp_height: f64,
    pub tic_pp_distance: f64,
    pub ms_pp_height: f64,
    pub ms_pp_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsProcessedData {
    pub experiment_id: Id,
    pub ms_proc_params_id: Id,
}

/// Number of matched m/z values required for each confidence level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsDecisionParams {
    /// Only predictions at or above this charge count as supporting evidence.
    #[serde(default)]
    pub multiple_mz_trigger_charge: Option<i64>,
    pub mz_matches_low: i64,
    pub mz_matches_medium: i64,
    pub mz_matches_high: i64,
    pub mz_matches_certain: i64,
}

impl MsDecisionParams {
    /// Thresholds must be at least one and non-decreasing from LOW to CERTAIN.
    pub fn validate(&self) -> Result<()> {
        let thresholds = self.thresholds();
        if thresholds.iter().any(|(_, n)| *n < 1) {
            return Err(SupramolError::validation(format!(
                "m/z match thresholds must be at least 1, got {thresholds:?}"
            )));
        }
        if thresholds.windows(2).any(|w| w[0].1 > w[1].1) {
            return Err(SupramolError::validation(format!(
                "m/z match thresholds must not decrease, got {thresholds:?}"
            )));
        }
        match self.multiple_mz_trigger_charge {
            Some(z) if z < 1 => Err(SupramolError::validation(format!(
                "trigger charge must be positive, got {z}"
            ))),
            _ => Ok(()),
        }
    }

    /// Match count required for each level, lowest first.
    pub fn thresholds(&self) -> [(Confidence, i64); 4] {
        [
            (Confidence::Low, self.mz_matches_low),
            (Confidence::Medium, self.mz_matches_medium),
            (Confidence::High, self.mz_matches_high),
            (Confidence::Certain, self.mz_matches_certain),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsInterpretation {
    pub ms_decision_params_id: Id,
    pub ms_data_id: Id,
    pub assembly_id: Id,
    pub confidence: Confidence,
}

// ---------------------------------------------------------------------------
// NMR
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NmrProcessingParams {
    pub relative_height: f64,
    pub peak_picking_range_left: f64,
    pub peak_picking_range_right: f64,
    pub peak_picking_threshold: f64,
    pub spectrum_size: i64,
    pub line_broadening: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NmrProcessedData {
    pub nmr_proc_params_id: Id,
    pub experiment_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NmrPeak {
    pub nmr_data_id: Id,
    pub peak_ppm: f64,
    /// Peak belongs to a starting material.
    pub is_sm: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NmrDecisionParams {
    pub peak_number_tolerance: i64,
    pub peak_shift_proportion: f64,
    pub sm_peaks_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NmrInterpretation {
    pub nmr_decision_params_id: Id,
    pub nmr_data_id: Id,
    pub symmetrical: bool,
    pub pure: bool,
    pub confidence: Confidence,
}

// ---------------------------------------------------------------------------
// Raw data files
// ---------------------------------------------------------------------------

/// A raw instrument file copied into the data store under a UUID name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataFile {
    pub uuid: String,
    pub kind: DataKind,
    /// Name the file had before ingestion.
    pub original_name: String,
    pub experiment_number: u32,
    pub batch: u32,
    pub acquired_on: NaiveDate,
    pub extension: String,
    /// Hex SHA-256 of the file content.
    pub sha256: String,
    pub size_bytes: u64,
    /// Location inside the data store.
    pub stored_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<Id>,
    pub ingested_at: DateTime<Utc>,
}

/// Serialize a [`Duration`] as whole seconds.
pub mod seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Duration::try_seconds(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("{secs} seconds is out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reagent_kind_is_tagged_by_role() {
        let reagent = Reagent {
            cas_number: Some("108-72-5".into()),
            name: "ethylenediamine".into(),
            exact_mass: 123.2,
            kind: ReagentKind::Amine {
                nmr_data: Some("tests/data/nmr/amine".into()),
            },
        };
        let json = serde_json::to_value(&reagent).expect("serialize");
        assert_eq!(json["kind"]["role"], "amine");
        assert_eq!(reagent.role(), ReagentRole::Amine);
    }

    #[test]
    fn descriptor_value_parsing() {
        let rd = ReagentDescriptor {
            reagent_id: 1,
            descriptor_id: 2,
            value: "0.88".into(),
        };
        let radius: f64 = rd.parse_value().expect("float");
        assert!((radius - 0.88).abs() < 1e-12);

        let err = rd.parse_value::<i64>().unwrap_err();
        assert!(err.to_string().contains("descriptor 2 of reagent 1"));
    }

    fn decision(low: i64, medium: i64, high: i64, certain: i64) -> MsDecisionParams {
        MsDecisionParams {
            multiple_mz_trigger_charge: Some(3),
            mz_matches_low: low,
            mz_matches_medium: medium,
            mz_matches_high: high,
            mz_matches_certain: certain,
        }
    }

    #[test]
    fn decision_thresholds_validate() {
        assert!(decision(1, 2, 3, 4).validate().is_ok());
        assert!(decision(1, 1, 1, 1).validate().is_ok());
        assert!(decision(0, 2, 3, 4).validate().is_err());
        assert!(decision(1, 3, 2, 4).validate().is_err());

        let mut params = decision(1, 2, 3, 4);
        params.multiple_mz_trigger_charge = Some(0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn experiment_time_in_seconds() {
        let experiment = Experiment {
            date: NaiveDate::from_ymd_opt(2024, 10, 29)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            solvent: "acetonitrile".into(),
            temperature: 363.0,
            time: Duration::hours(18),
            nmr_data_path: "tests/data/nmr/reaction1".into(),
            ms_data_path: "tests/data/ms/reaction1".into(),
            amine_id: 2,
            carbonyl_id: 3,
            metal_id: 1,
        };
        let json = serde_json::to_value(&experiment).expect("serialize");
        assert_eq!(json["time"], 64_800);
        let back: Experiment = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, experiment);
    }

    #[test]
    fn stored_flattens_id() {
        let stored = Stored::new(7, Descriptor { name: "radius".into() });
        let json = serde_json::to_value(&stored).expect("serialize");
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "radius");
        assert_eq!(stored.name, "radius");
    }
}
