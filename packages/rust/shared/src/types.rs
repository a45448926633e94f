//! Core enums and identifiers shared by every crate.

use serde::{Deserialize, Serialize};

use crate::error::SupramolError;

/// Row identifier (SQLite integer primary key).
pub type Id = i64;

// ---------------------------------------------------------------------------
// ReagentRole
// ---------------------------------------------------------------------------

/// Role of a reagent in the self-assembly reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReagentRole {
    Amine,
    Carbonyl,
    Metal,
}

impl ReagentRole {
    /// String form stored in the `reagent.role` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amine => "amine",
            Self::Carbonyl => "carbonyl",
            Self::Metal => "metal",
        }
    }
}

impl std::fmt::Display for ReagentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReagentRole {
    type Err = SupramolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amine" => Ok(Self::Amine),
            "carbonyl" => Ok(Self::Carbonyl),
            "metal" => Ok(Self::Metal),
            other => Err(SupramolError::parse(format!("unknown reagent role '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Confidence score attached to an NMR or MS interpretation.
///
/// Stored as its integer score; ordering follows the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    None = 0,
    Low = 25,
    Medium = 50,
    High = 75,
    Certain = 100,
}

impl Confidence {
    /// Integer score stored in the database.
    pub fn score(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for Confidence {
    type Error = SupramolError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            25 => Ok(Self::Low),
            50 => Ok(Self::Medium),
            75 => Ok(Self::High),
            100 => Ok(Self::Certain),
            other => Err(SupramolError::validation(format!(
                "{other} is not a confidence score"
            ))),
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Certain => "CERTAIN",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// DataKind
// ---------------------------------------------------------------------------

/// Instrument that produced a raw data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataKind {
    Nmr,
    Lcms,
}

impl DataKind {
    /// Prefix used in raw data file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nmr => "NMR",
            Self::Lcms => "LCMS",
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataKind {
    type Err = SupramolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NMR" => Ok(Self::Nmr),
            "LCMS" => Ok(Self::Lcms),
            other => Err(SupramolError::parse(format!("unknown data kind '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_string_forms() {
        for role in [ReagentRole::Amine, ReagentRole::Carbonyl, ReagentRole::Metal] {
            let parsed: ReagentRole = role.as_str().parse().expect("parse role");
            assert_eq!(parsed, role);
        }
        assert!("solvent".parse::<ReagentRole>().is_err());
        assert_eq!(
            serde_json::to_string(&ReagentRole::Metal).unwrap(),
            "\"metal\""
        );
    }

    #[test]
    fn confidence_scores_and_order() {
        assert_eq!(Confidence::Certain.score(), 100);
        assert_eq!(Confidence::try_from(25).unwrap(), Confidence::Low);
        assert!(Confidence::try_from(30).is_err());
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::None < Confidence::Low);
        assert_eq!(Confidence::High.to_string(), "HIGH");
    }

    #[test]
    fn data_kind_prefixes() {
        assert_eq!("LCMS".parse::<DataKind>().unwrap(), DataKind::Lcms);
        assert!("lcms".parse::<DataKind>().is_err());
        assert_eq!(DataKind::Nmr.to_string(), "NMR");
    }
}
