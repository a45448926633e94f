//! Raw data file naming scheme: `{NMR|LCMS}_SAMOSA_EXP{n}_B{n}_YYYY_MM_DD.{ext}`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use supramol_shared::{DataKind, Result, SupramolError};

/// Project tag carried by every raw data file name.
pub const PROJECT_TAG: &str = "SAMOSA";

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(NMR|LCMS)_SAMOSA_EXP(\d+)_B(\d+)_(\d{4})_(\d{2})_(\d{2})\.([A-Za-z0-9]+(?:\.[A-Za-z0-9]+)*)$",
    )
    .expect("valid regex")
});

/// The parts of a conforming raw data file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDataName {
    pub kind: DataKind,
    pub experiment_number: u32,
    pub batch: u32,
    pub date: NaiveDate,
    /// Extension without the leading dot, possibly compound (`tar.gz`).
    pub extension: String,
}

impl RawDataName {
    pub fn parse(file_name: &str) -> Result<Self> {
        let caps = NAME_RE.captures(file_name).ok_or_else(|| {
            SupramolError::parse(format!(
                "'{file_name}' does not follow {{NMR|LCMS}}_{PROJECT_TAG}_EXP{{n}}_B{{n}}_YYYY_MM_DD.ext"
            ))
        })?;

        let number = |idx: usize, what: &str| -> Result<u32> {
            caps[idx].parse::<u32>().map_err(|e| {
                SupramolError::parse(format!("{what} in '{file_name}': {e}"))
            })
        };
        let kind: DataKind = caps[1].parse()?;
        let experiment_number = number(2, "experiment number")?;
        let batch = number(3, "batch number")?;

        let year: i32 = caps[4]
            .parse()
            .map_err(|e| SupramolError::parse(format!("year in '{file_name}': {e}")))?;
        let month = number(5, "month")?;
        let day = number(6, "day")?;
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            SupramolError::parse(format!(
                "'{file_name}' has no such date {year:04}-{month:02}-{day:02}"
            ))
        })?;

        Ok(Self {
            kind,
            experiment_number,
            batch,
            date,
            extension: caps[7].to_string(),
        })
    }

    /// Canonical file name: numbers unpadded, date zero-padded.
    pub fn to_file_name(&self) -> String {
        format!(
            "{}_{PROJECT_TAG}_EXP{}_B{}_{:04}_{:02}_{:02}.{}",
            self.kind.as_str(),
            self.experiment_number,
            self.batch,
            self.date.year(),
            self.date.month(),
            self.date.day(),
            self.extension
        )
    }

    /// Name the file gets inside the data store.
    pub fn stored_file_name(&self, uuid: &str) -> String {
        format!("{uuid}.{}", self.extension)
    }
}

impl FromStr for RawDataName {
    type Err = SupramolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RawDataName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_file_name())
    }
}
