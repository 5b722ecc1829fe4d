//! Shared domain types.
//!
//! Column names are a closed set: every column the pipeline can ingest, persist
//! or serve is a [`Field`]. Allow-lists are slices of fields rather than
//! strings, so a typo is a compile error instead of an empty column.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A column of the canonical table (or of one of its sources).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "consommation")]
    Consommation,
    #[serde(rename = "prevision_j1")]
    PrevisionJ1,
    #[serde(rename = "fioul")]
    Fioul,
    #[serde(rename = "charbon")]
    Charbon,
    #[serde(rename = "gaz")]
    Gaz,
    #[serde(rename = "nucleaire")]
    Nucleaire,
    #[serde(rename = "eolien")]
    Eolien,
    #[serde(rename = "solaire")]
    Solaire,
    #[serde(rename = "hydraulique")]
    Hydraulique,
    #[serde(rename = "pompage")]
    Pompage,
    #[serde(rename = "bioenergies")]
    Bioenergies,
    /// Region code; averaged away by the regional cleaners but still addressable.
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "tmin")]
    Tmin,
    #[serde(rename = "tmax")]
    Tmax,
    #[serde(rename = "tmoy")]
    Tmoy,
    /// Mean wind speed (m/s).
    #[serde(rename = "wspd")]
    Wspd,
    /// Global solar radiation (W/m²).
    #[serde(rename = "sun")]
    Sun,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::Consommation,
        Field::PrevisionJ1,
        Field::Fioul,
        Field::Charbon,
        Field::Gaz,
        Field::Nucleaire,
        Field::Eolien,
        Field::Solaire,
        Field::Hydraulique,
        Field::Pompage,
        Field::Bioenergies,
        Field::Code,
        Field::Tmin,
        Field::Tmax,
        Field::Tmoy,
        Field::Wspd,
        Field::Sun,
    ];

    /// Canonical (lower-case, ASCII, unit-free) column name.
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Consommation => "consommation",
            Field::PrevisionJ1 => "prevision_j1",
            Field::Fioul => "fioul",
            Field::Charbon => "charbon",
            Field::Gaz => "gaz",
            Field::Nucleaire => "nucleaire",
            Field::Eolien => "eolien",
            Field::Solaire => "solaire",
            Field::Hydraulique => "hydraulique",
            Field::Pompage => "pompage",
            Field::Bioenergies => "bioenergies",
            Field::Code => "code",
            Field::Tmin => "tmin",
            Field::Tmax => "tmax",
            Field::Tmoy => "tmoy",
            Field::Wspd => "wspd",
            Field::Sun => "sun",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("unknown column '{s}'")))
    }
}

/// Where a raw table came from; selects the field-name conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Semicolon-separated export with French labels (`Date`, `Heure`, ...).
    Csv,
    /// JSON records export with snake-case field names (`date`, `heure`, ...).
    Api,
}

impl Origin {
    /// Name of the date field in raw tables from this origin.
    pub fn date_field(self) -> &'static str {
        match self {
            Origin::Csv => "Date",
            Origin::Api => "date",
        }
    }

    /// Name of the time-of-day field (power feed only).
    pub fn hour_field(self) -> &'static str {
        match self {
            Origin::Csv => "Heure",
            Origin::Api => "heure",
        }
    }
}

/// Trend shape of the forecaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Growth {
    /// Constant level.
    Flat,
    /// Level plus a slope over the training window.
    Linear,
}

/// Behaviour of `save_table` when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    Replace,
    Append,
    Fail,
}

/// Declarative description of one registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub display_name: String,
    pub target: Field,
    pub regressors: Vec<Field>,
    /// Training uses rows strictly before this timestamp.
    pub end_training: NaiveDateTime,
}

impl ModelSpec {
    /// Target followed by the regressors, in declaration order.
    pub fn base_columns(&self) -> Vec<Field> {
        let mut cols = Vec::with_capacity(self.regressors.len() + 1);
        cols.push(self.target);
        cols.extend(self.regressors.iter().copied());
        cols
    }
}
