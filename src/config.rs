//! Runtime configuration.
//!
//! Defaults mirror the on-disk layout the pipeline has always used
//! (`datasets/raw`, `datasets/processed`, `models`, `logs`) relative to a home
//! directory. `Config::from_env` reads `.env` and `CONSO_*` overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::domain::{Field, ModelSpec};
use crate::error::{PipelineError, Result};

/// Power columns kept from the national feed.
pub const COL_POWER: [Field; 11] = [
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
];

/// Temperature columns kept from the regional feed.
pub const COL_TEMP: [Field; 3] = [Field::Tmin, Field::Tmax, Field::Tmoy];

/// Weather columns kept from the tri-hourly feed.
pub const COL_WEATHER: [Field; 2] = [Field::Wspd, Field::Sun];

/// Production sources rendered by the production and repartition views.
pub const COL_VISUALISATION_PRODUCTION: [Field; 9] = [
    Field::Fioul,
    Field::Charbon,
    Field::Gaz,
    Field::Nucleaire,
    Field::Eolien,
    Field::Solaire,
    Field::Hydraulique,
    Field::Pompage,
    Field::Bioenergies,
];

const LINK_CSV_POWER: &str = "https://odre.opendatasoft.com/explore/dataset/eco2mix-national-cons-def/download/?format=csv&timezone=Europe/Berlin&lang=fr&use_labels_for_header=true&csv_separator=%3B";
const LINK_CSV_TEMP: &str = "https://odre.opendatasoft.com/explore/dataset/temperature-quotidienne-regionale/download/?format=csv&timezone=Europe/Berlin&lang=fr&use_labels_for_header=true&csv_separator=%3B";
const LINK_CSV_WEATHER: &str = "https://odre.opendatasoft.com/explore/dataset/rayonnement-solaire-vitesse-vent-tri-horaires-regionaux/download/?format=csv&timezone=Europe/Berlin&lang=fr&use_labels_for_header=true&csv_separator=%3B";

const LINK_API_POWER: &str = "https://odre.opendatasoft.com/api/explore/v2.1/catalog/datasets/eco2mix-national-cons-def/exports/json?timezone=Europe%2FBerlin";
const LINK_API_TEMP: &str = "https://odre.opendatasoft.com/api/explore/v2.1/catalog/datasets/temperature-quotidienne-regionale/exports/json?timezone=Europe%2FBerlin";
const LINK_API_WEATHER: &str = "https://odre.opendatasoft.com/api/explore/v2.1/catalog/datasets/rayonnement-solaire-vitesse-vent-tri-horaires-regionaux/exports/json?timezone=Europe%2FBerlin";

/// The three upstream feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Power,
    Temperature,
    Weather,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Power, Source::Temperature, Source::Weather];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Power => "power",
            Source::Temperature => "temperature",
            Source::Weather => "weather",
        }
    }
}

/// One remote feed: where to download it and where it lands on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub csv_url: String,
    pub api_url: String,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub power: SourceConfig,
    pub temperature: SourceConfig,
    pub weather: SourceConfig,
    pub db_name: String,
    pub table_name: String,
    pub download_timeout: Duration,
    pub log_level: String,
    pub log_max_bytes: u64,
    pub log_generations: usize,
    pub models: Vec<ModelSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self::rooted_at(".")
    }
}

impl Config {
    /// Default configuration with every path relative to `home`.
    pub fn rooted_at(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            power: SourceConfig {
                csv_url: LINK_CSV_POWER.to_string(),
                api_url: LINK_API_POWER.to_string(),
                file_name: "eco2mix-national-cons-def.csv".to_string(),
            },
            temperature: SourceConfig {
                csv_url: LINK_CSV_TEMP.to_string(),
                api_url: LINK_API_TEMP.to_string(),
                file_name: "temperature-quotidienne-regionale.csv".to_string(),
            },
            weather: SourceConfig {
                csv_url: LINK_CSV_WEATHER.to_string(),
                api_url: LINK_API_WEATHER.to_string(),
                file_name: "rayonnement-solaire-vitesse-vent-tri-horaires-regionaux.csv".to_string(),
            },
            db_name: "db_expanded.db".to_string(),
            table_name: "expanded".to_string(),
            download_timeout: Duration::from_secs(600),
            log_level: "info".to_string(),
            log_max_bytes: 512_000,
            log_generations: 10,
            models: default_models(),
        }
    }

    /// Defaults, then `.env`, then `CONSO_*` variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let home = std::env::var("CONSO_HOME").unwrap_or_else(|_| ".".to_string());
        let mut config = Self::rooted_at(home);

        if let Ok(level) = std::env::var("CONSO_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(url) = std::env::var("CONSO_URL_POWER") {
            config.power.csv_url = url;
        }
        if let Ok(url) = std::env::var("CONSO_URL_TEMPERATURE") {
            config.temperature.csv_url = url;
        }
        if let Ok(url) = std::env::var("CONSO_URL_WEATHER") {
            config.weather.csv_url = url;
        }
        if let Ok(raw) = std::env::var("CONSO_DOWNLOAD_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|e| {
                PipelineError::InvalidArgument(format!(
                    "CONSO_DOWNLOAD_TIMEOUT_SECS='{raw}' is not a number of seconds: {e}"
                ))
            })?;
            config.download_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn source(&self, source: Source) -> &SourceConfig {
        match source {
            Source::Power => &self.power,
            Source::Temperature => &self.temperature,
            Source::Weather => &self.weather,
        }
    }

    pub fn raw_folder(&self) -> PathBuf {
        self.home.join("datasets").join("raw")
    }

    pub fn processed_folder(&self) -> PathBuf {
        self.home.join("datasets").join("processed")
    }

    pub fn models_folder(&self) -> PathBuf {
        self.home.join("models")
    }

    pub fn logs_folder(&self) -> PathBuf {
        self.home.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_folder().join("journal.log")
    }

    pub fn db_path(&self) -> PathBuf {
        self.processed_folder().join(&self.db_name)
    }

    pub fn raw_path(&self, source: Source) -> PathBuf {
        self.raw_folder().join(&self.source(source).file_name)
    }

    pub fn model(&self, name: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Create every folder of the layout that does not exist yet.
    pub fn create_folders(&self) -> Result<()> {
        for dir in [
            self.raw_folder(),
            self.processed_folder(),
            self.models_folder(),
            self.logs_folder(),
        ] {
            create_dir(&dir)?;
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))
}

fn midnight(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

/// The three reference forecasters.
pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec {
            name: "prophet_time".to_string(),
            display_name: "Prophet based on time series".to_string(),
            target: Field::Consommation,
            regressors: Vec::new(),
            end_training: midnight(2019, 12, 31),
        },
        ModelSpec {
            name: "prophet_temp".to_string(),
            display_name: "Prophet with temperatures".to_string(),
            target: Field::Consommation,
            regressors: vec![Field::Tmoy],
            end_training: midnight(2021, 12, 31),
        },
        ModelSpec {
            name: "prophet_weather".to_string(),
            display_name: "Prophet with weather".to_string(),
            target: Field::Consommation,
            regressors: vec![Field::Tmoy, Field::Tmax, Field::Tmin, Field::Wspd, Field::Sun],
            end_training: midnight(2021, 12, 31),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_relative_to_home() {
        let config = Config::rooted_at("/srv/conso");
        assert_eq!(
            config.db_path(),
            PathBuf::from("/srv/conso/datasets/processed/db_expanded.db")
        );
        assert_eq!(
            config.raw_path(Source::Temperature),
            PathBuf::from("/srv/conso/datasets/raw/temperature-quotidienne-regionale.csv")
        );
        assert_eq!(config.log_file(), PathBuf::from("/srv/conso/logs/journal.log"));
    }

    #[test]
    fn default_registry_has_three_entries() {
        let config = Config::default();
        let names: Vec<&str> = config.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["prophet_time", "prophet_temp", "prophet_weather"]);

        let weather = config.model("prophet_weather").unwrap();
        assert_eq!(weather.regressors.len(), 5);
        assert_eq!(weather.end_training, midnight(2021, 12, 31));
        assert!(config.model("prophet_rain").is_none());
    }

    #[test]
    fn create_folders_builds_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        config.create_folders().unwrap();
        assert!(config.raw_folder().is_dir());
        assert!(config.models_folder().is_dir());
        assert!(config.logs_folder().is_dir());
    }

    #[test]
    fn allow_lists_cover_visualisation_set() {
        for field in COL_VISUALISATION_PRODUCTION {
            assert!(COL_POWER.contains(&field));
        }
    }
}
