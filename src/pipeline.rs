//! Orchestration: download → acquire → clean → join → save, then serve.
//!
//! The [`Pipeline`] owns the canonical table and the model registry.
//! Consumers only ever receive copies of slices.

use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::config::{COL_POWER, COL_TEMP, COL_WEATHER, Config, Source};
use crate::domain::{Field, Frame, Origin, SaveMode, Table};
use crate::error::{PipelineError, Result};
use crate::io::clean::{clean_power, clean_temperature, clean_weather};
use crate::io::collector::{Collector, RawTable, read_csv};
use crate::io::store::{self, LoadOutcome};
use crate::models::{Forecast, Forecaster, ModelRegistry};
use crate::select;

/// How [`Pipeline::process`] obtained the canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Loaded,
    Rebuilt,
}

#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    collector: Collector,
    table: Option<Frame>,
    registry: ModelRegistry,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let collector = Collector::new(config.download_timeout);
        let registry = ModelRegistry::new(&config.models, config.models_folder());
        Self {
            config,
            collector,
            table: None,
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    /// Whether [`Pipeline::process`] has completed at least once.
    pub fn is_ready(&self) -> bool {
        self.table.is_some()
    }

    /// Load the canonical table, or rebuild it from the sources.
    ///
    /// Without `update`, an empty or unreadable persisted table falls through
    /// to a single rebuild. `download` only applies to the `csv` origin.
    pub fn process(&mut self, update: bool, download: bool, origin: Origin) -> Result<ProcessOutcome> {
        if !update {
            let db = self.config.db_path();
            match store::try_load_table(&db, &self.config.table_name) {
                LoadOutcome::Loaded(frame) => {
                    info!(rows = frame.len(), path = %db.display(), "canonical table loaded");
                    self.table = Some(frame);
                    return Ok(ProcessOutcome::Loaded);
                }
                LoadOutcome::Empty => warn!(path = %db.display(), "persisted table is empty, rebuilding"),
                LoadOutcome::Failed(reason) => {
                    warn!(path = %db.display(), %reason, "persisted table unavailable, rebuilding")
                }
            }
        }

        self.rebuild(download, origin)?;
        Ok(ProcessOutcome::Rebuilt)
    }

    fn rebuild(&mut self, download: bool, origin: Origin) -> Result<()> {
        self.config.create_folders()?;
        if download && origin == Origin::Csv {
            self.download()?;
        }

        let power = self.prepare(Source::Power, origin)?;
        let weather = self.prepare(Source::Weather, origin)?;
        let temperature = self.prepare(Source::Temperature, origin)?;

        let frame = join(&power, &weather, &temperature)?;
        if frame.is_empty() {
            warn!("joined table has no complete row");
        }
        info!(
            rows = frame.len(),
            first = ?frame.first_timestamp(),
            last = ?frame.last_timestamp(),
            "canonical table rebuilt"
        );

        store::save_table(&frame, &self.config.db_path(), &self.config.table_name, SaveMode::Replace);
        self.table = Some(frame);
        Ok(())
    }

    /// Download the three source CSVs, replacing the local copies.
    pub fn download(&self) -> Result<()> {
        for source in Source::ALL {
            let url = &self.config.source(source).csv_url;
            self.collector.fetch(url, &self.config.raw_path(source))?;
        }
        Ok(())
    }

    /// Raw table of `source`, downloaded on demand when the local copy is missing.
    fn acquire(&self, source: Source, origin: Origin) -> Result<RawTable> {
        let urls = self.config.source(source);
        match origin {
            Origin::Api => self.collector.fetch_api(&urls.api_url),
            Origin::Csv => {
                let path = self.config.raw_path(source);
                if !path.exists() {
                    info!(source = source.as_str(), "raw file missing, downloading");
                    self.collector.fetch(&urls.csv_url, &path)?;
                }
                read_csv(&path)
            }
        }
    }

    fn prepare(&self, source: Source, origin: Origin) -> Result<Table> {
        let raw = self.acquire(source, origin)?;
        let table = clean_source(source, &raw, origin)?;
        debug!(source = source.as_str(), rows = table.len(), "source cleaned");
        Ok(table)
    }

    /// Copy of the canonical table restricted by [`select::dates`] then
    /// [`select::columns`].
    pub fn serve(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        date: Option<NaiveDateTime>,
        columns: &[Field],
    ) -> Result<Frame> {
        let table = self.table.as_ref().ok_or(PipelineError::NotReady)?;
        select::columns(&select::dates(table, start, end, date), columns)
    }

    /// Index of the canonical table.
    pub fn serve_index(&self) -> Result<Vec<NaiveDateTime>> {
        let table = self.table.as_ref().ok_or(PipelineError::NotReady)?;
        Ok(table.index().to_vec())
    }

    /// Forecast `[start, end)` with `model_name`, training it if needed.
    pub fn test(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        extras: &[Field],
        model_name: &str,
    ) -> Result<(Forecast, &Forecaster)> {
        let table = self.table.as_ref().ok_or(PipelineError::NotReady)?;
        self.registry.predict(model_name, table, start, end, extras)
    }

    /// Construct every registry entry without training.
    pub fn build_models(&mut self) {
        self.registry.build_all();
    }

    /// Train every registry entry; returns how many succeeded.
    pub fn train_models(&mut self) -> Result<usize> {
        let table = self.table.as_ref().ok_or(PipelineError::NotReady)?;
        Ok(self.registry.train_all(table))
    }

    pub fn train_model(&mut self, name: &str) -> Result<bool> {
        let table = self.table.as_ref().ok_or(PipelineError::NotReady)?;
        Ok(self.registry.train(name, table))
    }

    /// Latest modification time among the raw source files, or of the
    /// database when no source file is present.
    pub fn download_timestamp(&self) -> Option<DateTime<Local>> {
        Source::ALL
            .iter()
            .filter_map(|s| modified(&self.config.raw_path(*s)))
            .max()
            .or_else(|| modified(&self.config.db_path()))
    }
}

fn modified(path: &Path) -> Option<DateTime<Local>> {
    let meta = std::fs::metadata(path).ok()?;
    meta.modified().ok().map(DateTime::<Local>::from)
}

/// Clean `raw` with the recipe and field-set of `source`.
pub fn clean_source(source: Source, raw: &RawTable, origin: Origin) -> Result<Table> {
    match source {
        Source::Power => clean_power(raw, &COL_POWER, origin),
        Source::Temperature => clean_temperature(raw, &COL_TEMP, origin),
        Source::Weather => clean_weather(raw, &COL_WEATHER, origin),
    }
}

/// Align every source on its complete hourly grid, interpolate, then
/// `power ⋈ weather ⋈ temperature` and drop incomplete rows.
pub fn join(power: &Table, weather: &Table, temperature: &Table) -> Result<Frame> {
    let align = |table: &Table| {
        let mut aligned = table.reindex_hourly();
        aligned.interpolate_linear();
        aligned
    };

    let joined = align(power)
        .left_join(&align(weather))?
        .left_join(&align(temperature))?;
    Ok(joined.drop_missing_rows())
}
