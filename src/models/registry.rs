//! Named collection of forecasters.
//!
//! Each entry moves through
//! `Uninitialised → Initialised → Trained ⇄ Persisted`; a failed fit sends it
//! back to `Initialised`. Training failures are logged, never returned:
//! consumers only see [`PipelineError::NotTrained`] when loading, retraining
//! and predicting all failed.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::{Field, Frame, Growth, ModelSpec};
use crate::error::{PipelineError, Result};
use crate::models::{Forecast, Forecaster};
use crate::select;

#[derive(Debug, Clone, Default)]
pub enum ForecasterState {
    #[default]
    Uninitialised,
    Initialised(Forecaster),
    Trained(Forecaster),
    Persisted(Forecaster),
}

impl ForecasterState {
    pub fn label(&self) -> &'static str {
        match self {
            ForecasterState::Uninitialised => "uninitialised",
            ForecasterState::Initialised(_) => "initialised",
            ForecasterState::Trained(_) => "trained",
            ForecasterState::Persisted(_) => "persisted",
        }
    }

    pub fn forecaster(&self) -> Option<&Forecaster> {
        match self {
            ForecasterState::Uninitialised => None,
            ForecasterState::Initialised(f)
            | ForecasterState::Trained(f)
            | ForecasterState::Persisted(f) => Some(f),
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self, ForecasterState::Trained(_) | ForecasterState::Persisted(_))
    }
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub spec: ModelSpec,
    pub state: ForecasterState,
}

/// What consumers render for each entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub display_name: String,
    pub state: &'static str,
}

#[derive(Debug)]
pub struct ModelRegistry {
    entries: HashMap<String, RegistryEntry>,
    order: Vec<String>,
    models_folder: PathBuf,
    growth: Growth,
}

impl ModelRegistry {
    pub fn new(specs: &[ModelSpec], models_folder: impl Into<PathBuf>) -> Self {
        let mut entries = HashMap::new();
        let mut order = Vec::new();
        for spec in specs {
            if entries.contains_key(&spec.name) {
                warn!(model = %spec.name, "duplicate registry entry ignored");
                continue;
            }
            order.push(spec.name.clone());
            entries.insert(
                spec.name.clone(),
                RegistryEntry {
                    spec: spec.clone(),
                    state: ForecasterState::Uninitialised,
                },
            );
        }
        Self {
            entries,
            order,
            models_folder: models_folder.into(),
            growth: Growth::Flat,
        }
    }

    /// Trend shape used by every subsequent fit.
    pub fn set_growth(&mut self, growth: Growth) {
        self.growth = growth;
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn entry(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn forecaster(&self, name: &str) -> Option<&Forecaster> {
        self.entries.get(name).and_then(|e| e.state.forecaster())
    }

    /// Construct every forecaster that does not exist yet. Nothing is trained.
    pub fn build_all(&mut self) {
        for entry in self.entries.values_mut() {
            if let ForecasterState::Uninitialised = entry.state {
                entry.state = ForecasterState::Initialised(Forecaster::new(
                    entry.spec.clone(),
                    self.models_folder.clone(),
                ));
            }
        }
    }

    /// Fit `name` on the rows of `data` before its cutoff and persist it.
    ///
    /// Returns whether the entry ends up trained.
    pub fn train(&mut self, name: &str, data: &Frame) -> bool {
        let growth = self.growth;
        let folder = self.models_folder.clone();
        let Some(entry) = self.entries.get_mut(name) else {
            warn!(model = name, "unknown model, nothing to train");
            return false;
        };

        let mut forecaster = match std::mem::take(&mut entry.state) {
            ForecasterState::Uninitialised => Forecaster::new(entry.spec.clone(), folder),
            ForecasterState::Initialised(f)
            | ForecasterState::Trained(f)
            | ForecasterState::Persisted(f) => f,
        };

        let slice = select::dates(data, None, Some(entry.spec.end_training), None);
        let outcome = select::columns(&slice, &entry.spec.base_columns())
            .and_then(|train| forecaster.train(&train, growth, true));

        let (state, trained) = match outcome {
            Ok(()) => (ForecasterState::Persisted(forecaster), true),
            Err(err @ PipelineError::Persistence(_)) if forecaster.trained() => {
                warn!(model = name, error = %err, "model trained but not persisted");
                (ForecasterState::Trained(forecaster), true)
            }
            Err(err) => {
                error!(model = name, error = %err, "training failed");
                forecaster.forget();
                (ForecasterState::Initialised(forecaster), false)
            }
        };
        entry.state = state;
        trained
    }

    /// Train every entry, in declaration order. Returns how many succeeded.
    pub fn train_all(&mut self, data: &Frame) -> usize {
        let names = self.order.clone();
        let trained = names.iter().filter(|name| self.train(name, data)).count();
        info!(trained, total = names.len(), "registry trained");
        trained
    }

    /// Make sure `name` holds a fit: reuse it, else load its blob, else train.
    pub fn ensure_trained(&mut self, name: &str, data: &Frame) -> Result<()> {
        let folder = self.models_folder.clone();
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| PipelineError::NotFound(format!("model '{name}'")))?;
        if entry.state.is_trained() {
            return Ok(());
        }

        let mut forecaster = match std::mem::take(&mut entry.state) {
            ForecasterState::Initialised(f)
            | ForecasterState::Trained(f)
            | ForecasterState::Persisted(f) => f,
            ForecasterState::Uninitialised => Forecaster::new(entry.spec.clone(), folder),
        };
        match forecaster.restore() {
            Ok(()) => {
                entry.state = ForecasterState::Persisted(forecaster);
                return Ok(());
            }
            Err(err) => {
                info!(model = name, reason = %err, "no usable blob, retraining");
                entry.state = ForecasterState::Initialised(forecaster);
            }
        }

        if self.train(name, data) {
            Ok(())
        } else {
            Err(PipelineError::NotTrained(name.to_string()))
        }
    }

    /// Forecast `[start, end)` of `data` with model `name`.
    ///
    /// The test slice holds the model's base columns plus `extras`, so callers
    /// can compare against e.g. the day-ahead baseline.
    pub fn predict(
        &mut self,
        name: &str,
        data: &Frame,
        start: NaiveDateTime,
        end: NaiveDateTime,
        extras: &[Field],
    ) -> Result<(Forecast, &Forecaster)> {
        self.ensure_trained(name, data)?;

        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| PipelineError::NotFound(format!("model '{name}'")))?;

        let mut columns = entry.spec.base_columns();
        for field in extras {
            if !columns.contains(field) {
                columns.push(*field);
            }
        }
        let test = select::columns(&select::dates(data, Some(start), Some(end), None), &columns)?;

        let forecaster = match &mut entry.state {
            ForecasterState::Trained(f) | ForecasterState::Persisted(f) => f,
            _ => return Err(PipelineError::NotTrained(name.to_string())),
        };
        let forecast = forecaster.predict(&test)?;
        Ok((forecast, &*forecaster))
    }

    /// Drop the in-memory fit of `name`, keeping its blob.
    pub fn forget(&mut self, name: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| PipelineError::NotFound(format!("model '{name}'")))?;
        entry.state = match std::mem::take(&mut entry.state) {
            ForecasterState::Uninitialised => ForecasterState::Uninitialised,
            ForecasterState::Initialised(mut f)
            | ForecasterState::Trained(mut f)
            | ForecasterState::Persisted(mut f) => {
                f.forget();
                ForecasterState::Initialised(f)
            }
        };
        Ok(())
    }

    /// Entries in declaration order.
    pub fn list(&self) -> Vec<ModelSummary> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| ModelSummary {
                name: entry.spec.name.clone(),
                display_name: entry.spec.display_name.clone(),
                state: entry.state.label(),
            })
            .collect()
    }
}
