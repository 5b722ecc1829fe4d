//! A trainable, persistable additive forecaster.
//!
//! `y(t) = trend(t) + yearly(t) + weekly(t) + daily(t) + Σ β_j · z_j(t)`
//!
//! The forecaster owns its fit and the frames it last trained and predicted
//! on. Persistence goes through [`crate::io::store`] as a versioned JSON blob;
//! blobs written by another schema version, or for another model identity,
//! are refused.

use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::domain::{Field, Frame, Growth, ModelSpec};
use crate::error::{PipelineError, Result};
use crate::fit::{AdditiveFit, FitOptions, fit_additive};
use crate::io::store;
use crate::models::design::SEASONALITIES;

/// Version of the blob layout written by [`Forecaster::save`].
pub const BLOB_SCHEMA_VERSION: u32 = 1;

/// Coverage of `[yhat_lower, yhat_upper]`.
pub const INTERVAL_WIDTH: f64 = 0.8;

/// Standard normal quantile at `(1 + INTERVAL_WIDTH) / 2`.
const INTERVAL_Z: f64 = 1.281_551_565_544_600_4;

/// On-disk form of a trained forecaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterBlob {
    pub schema_version: u32,
    pub name: String,
    pub target: Field,
    pub regressors: Vec<Field>,
    pub end_training: NaiveDateTime,
    pub fitted: AdditiveFit,
}

/// Contribution of one regressor over the forecast horizon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressorTerm {
    pub field: Field,
    pub values: Vec<f64>,
}

/// Prediction table: one entry per input row, `ds` is the input index.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Forecast {
    pub ds: Vec<NaiveDateTime>,
    pub trend: Vec<f64>,
    pub yearly: Vec<f64>,
    pub weekly: Vec<f64>,
    pub daily: Vec<f64>,
    pub regressors: Vec<RegressorTerm>,
    pub extra_regressors_additive: Vec<f64>,
    pub additive_terms: Vec<f64>,
    pub yhat_lower: Vec<f64>,
    pub yhat_upper: Vec<f64>,
    pub yhat: Vec<f64>,
}

impl Forecast {
    pub fn len(&self) -> usize {
        self.ds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ds.is_empty()
    }

    /// Column names, `ds` first.
    pub fn columns(&self) -> Vec<String> {
        let mut names: Vec<String> = ["ds", "trend", "yearly", "weekly", "daily"]
            .into_iter()
            .map(str::to_string)
            .collect();
        names.extend(self.regressors.iter().map(|r| r.field.to_string()));
        names.extend(
            ["extra_regressors_additive", "additive_terms", "yhat_lower", "yhat_upper", "yhat"]
                .into_iter()
                .map(str::to_string),
        );
        names
    }

    /// Numeric column by name (`ds` is not numeric).
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let col = match name {
            "trend" => &self.trend,
            "yearly" => &self.yearly,
            "weekly" => &self.weekly,
            "daily" => &self.daily,
            "extra_regressors_additive" => &self.extra_regressors_additive,
            "additive_terms" => &self.additive_terms,
            "yhat_lower" => &self.yhat_lower,
            "yhat_upper" => &self.yhat_upper,
            "yhat" => &self.yhat,
            other => {
                return self
                    .regressors
                    .iter()
                    .find(|r| r.field.as_str() == other)
                    .map(|r| r.values.as_slice());
            }
        };
        Some(col.as_slice())
    }

    /// Root mean squared error of `yhat` against `observed`.
    pub fn rmse(&self, observed: &[f64]) -> Option<f64> {
        if self.is_empty() || observed.len() != self.len() {
            return None;
        }
        let sse: f64 = self
            .yhat
            .iter()
            .zip(observed)
            .map(|(p, o)| (p - o).powi(2))
            .sum();
        Some((sse / self.len() as f64).sqrt())
    }
}

/// One renderable component of a decomposition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentPanel {
    pub name: String,
    pub ds: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Components {
    pub panels: Vec<ComponentPanel>,
}

impl Components {
    pub fn get(&self, name: &str) -> Option<&ComponentPanel> {
        self.panels.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.panels.iter().map(|p| p.name.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Forecaster {
    spec: ModelSpec,
    folder: PathBuf,
    fitted: Option<AdditiveFit>,
    df_train: Option<Frame>,
    df_test: Option<Frame>,
}

impl Forecaster {
    /// An untrained forecaster persisting into `folder`.
    pub fn new(spec: ModelSpec, folder: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            folder: folder.into(),
            fitted: None,
            df_train: None,
            df_test: None,
        }
    }

    /// Restore a forecaster from `folder/<spec.name>.blob`.
    pub fn load(spec: ModelSpec, folder: impl Into<PathBuf>) -> Result<Self> {
        let mut forecaster = Self::new(spec, folder);
        forecaster.restore()?;
        Ok(forecaster)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn trained(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn fitted(&self) -> Option<&AdditiveFit> {
        self.fitted.as_ref()
    }

    /// Target followed by the regressors.
    pub fn base_columns(&self) -> Vec<Field> {
        self.spec.base_columns()
    }

    pub fn df_train(&self) -> Option<&Frame> {
        self.df_train.as_ref()
    }

    pub fn df_test(&self) -> Option<&Frame> {
        self.df_test.as_ref()
    }

    pub fn blob_path(&self) -> PathBuf {
        store::blob_path(&self.spec.name, &self.folder)
    }

    /// Drop the in-memory fit; the blob on disk is left alone.
    pub fn forget(&mut self) {
        self.fitted = None;
        self.df_train = None;
        self.df_test = None;
    }

    /// Fit on `frame`, which must hold the target and every regressor.
    ///
    /// With `autosave`, a failed save is reported as a persistence error but
    /// the fit is kept.
    pub fn train(&mut self, frame: &Frame, growth: Growth, autosave: bool) -> Result<()> {
        let train = frame.select_fields(&self.base_columns())?;
        if !train.is_strictly_increasing() {
            return Err(PipelineError::Schema(format!(
                "model '{}': training index is not strictly increasing",
                self.spec.name
            )));
        }

        let y = train.require(self.spec.target)?;
        let regressors: Vec<&[f64]> = self
            .spec
            .regressors
            .iter()
            .map(|f| train.require(*f))
            .collect::<Result<_>>()?;

        let opts = FitOptions {
            growth,
            ..FitOptions::default()
        };
        let fit = fit_additive(train.index(), y, &regressors, &opts)?;
        info!(
            model = %self.spec.name,
            rows = fit.n_obs,
            rmse = fit.rmse,
            "model trained"
        );

        self.fitted = Some(fit);
        self.df_train = Some(train);

        if autosave {
            self.save()?;
        }
        Ok(())
    }

    /// Predict every row of `frame`.
    pub fn predict(&mut self, frame: &Frame) -> Result<Forecast> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or_else(|| PipelineError::NotTrained(self.spec.name.clone()))?;

        let regressors: Vec<&[f64]> = self
            .spec
            .regressors
            .iter()
            .map(|f| frame.require(*f))
            .collect::<Result<_>>()?;

        let n = frame.len();
        let mut out = Forecast {
            ds: frame.index().to_vec(),
            regressors: self
                .spec
                .regressors
                .iter()
                .map(|f| RegressorTerm {
                    field: *f,
                    values: Vec::with_capacity(n),
                })
                .collect(),
            ..Forecast::default()
        };

        let design = &fit.design;
        let scale = fit.y_scale;
        let margin = INTERVAL_Z * fit.sigma;
        let mut row = vec![0.0; design.width()];
        let mut z = vec![0.0; regressors.len()];

        for (i, ts) in frame.index().iter().enumerate() {
            for (slot, values) in z.iter_mut().zip(&regressors) {
                *slot = values[i];
            }
            design.fill_row(*ts, &z, &mut row);
            let parts = design.decompose(&row, &fit.beta);

            let trend = scale * parts.trend;
            let [yearly, weekly, daily] = parts.seasonal.map(|v| scale * v);
            let mut extra = 0.0;
            for (term, value) in out.regressors.iter_mut().zip(&parts.regressors) {
                let v = scale * value;
                term.values.push(v);
                extra += v;
            }
            let additive = yearly + weekly + daily + extra;
            let yhat = trend + additive;

            out.trend.push(trend);
            out.yearly.push(yearly);
            out.weekly.push(weekly);
            out.daily.push(daily);
            out.extra_regressors_additive.push(extra);
            out.additive_terms.push(additive);
            out.yhat_lower.push(yhat - margin);
            out.yhat_upper.push(yhat + margin);
            out.yhat.push(yhat);
        }

        debug!(model = %self.spec.name, rows = n, "forecast computed");
        self.df_test = Some(frame.clone());
        Ok(out)
    }

    /// Renderable decomposition of `forecast`.
    ///
    /// Seasonal panels cover one reference period (a year of days, a week of
    /// hours, a day of quarter-hours); trend and regressors follow the
    /// forecast timestamps.
    pub fn components(&self, forecast: &Forecast, skip_trend: bool) -> Result<Components> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or_else(|| PipelineError::NotTrained(self.spec.name.clone()))?;

        let mut panels = Vec::new();
        if !skip_trend {
            panels.push(ComponentPanel {
                name: "Trend".to_string(),
                ds: forecast.ds.clone(),
                values: forecast.trend.clone(),
            });
        }

        let origin = reference_origin();
        let grids = [
            (365, Duration::days(1)),
            (7 * 24, Duration::hours(1)),
            (24 * 4, Duration::minutes(15)),
        ];
        for (i, (season, (count, step))) in SEASONALITIES.iter().zip(grids).enumerate() {
            let ds: Vec<NaiveDateTime> = (0..count).map(|k| origin + step * k).collect();
            let values = ds
                .iter()
                .map(|ts| fit.y_scale * fit.design.seasonal_value(i, *ts, &fit.beta))
                .collect();
            panels.push(ComponentPanel {
                name: capitalise(season.name),
                ds,
                values,
            });
        }

        if !self.spec.regressors.is_empty() {
            panels.push(ComponentPanel {
                name: "Extra_regressors_additive".to_string(),
                ds: forecast.ds.clone(),
                values: forecast.extra_regressors_additive.clone(),
            });
        }

        Ok(Components { panels })
    }

    /// Write the fit to `folder/<name>.blob`.
    pub fn save(&self) -> Result<PathBuf> {
        let fitted = self
            .fitted
            .clone()
            .ok_or_else(|| PipelineError::NotTrained(self.spec.name.clone()))?;
        let blob = ForecasterBlob {
            schema_version: BLOB_SCHEMA_VERSION,
            name: self.spec.name.clone(),
            target: self.spec.target,
            regressors: self.spec.regressors.clone(),
            end_training: self.spec.end_training,
            fitted,
        };

        match store::save_blob(&blob, &self.spec.name, &self.folder) {
            Ok(path) => {
                info!(model = %self.spec.name, path = %path.display(), "model saved");
                Ok(path)
            }
            Err(err) => {
                error!(model = %self.spec.name, error = %err, "failed to save model");
                Err(as_persistence(err))
            }
        }
    }

    /// Replace the in-memory fit with the persisted one.
    pub fn restore(&mut self) -> Result<()> {
        let blob: ForecasterBlob = store::load_blob(&self.spec.name, &self.folder)?;
        self.check_blob(&blob)?;
        self.fitted = Some(blob.fitted);
        self.df_train = None;
        info!(model = %self.spec.name, "model loaded from blob");
        Ok(())
    }

    fn check_blob(&self, blob: &ForecasterBlob) -> Result<()> {
        if blob.schema_version != BLOB_SCHEMA_VERSION {
            return Err(PipelineError::Persistence(format!(
                "blob of '{}' has schema version {}, expected {BLOB_SCHEMA_VERSION}",
                self.spec.name, blob.schema_version
            )));
        }
        let same_model = blob.name == self.spec.name
            && blob.target == self.spec.target
            && blob.regressors == self.spec.regressors
            && blob.end_training == self.spec.end_training;
        if !same_model {
            return Err(PipelineError::Persistence(format!(
                "blob in '{}' was written for a different model definition",
                self.blob_path().display()
            )));
        }
        if blob.fitted.beta.len() != blob.fitted.design.width()
            || blob.fitted.design.n_regressors() != self.spec.regressors.len()
        {
            return Err(PipelineError::Persistence(format!(
                "blob of '{}' has inconsistent coefficients",
                self.spec.name
            )));
        }
        Ok(())
    }
}

fn as_persistence(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::Persistence(_) => err,
        other => PipelineError::Persistence(other.to_string()),
    }
}

/// Sunday 2017-01-01, start of every seasonal panel.
fn reference_origin() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2017, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn capitalise(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
