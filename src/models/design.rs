//! Design rows and component decomposition for the additive model.
//!
//! Column layout of a design row:
//!
//! | block     | columns                              |
//! |-----------|--------------------------------------|
//! | trend     | `1` (flat) or `1, t` (linear)        |
//! | yearly    | 20 Fourier terms (period 365.25 d)   |
//! | weekly    | 6 Fourier terms (period 7 d)         |
//! | daily     | 8 Fourier terms (period 1 d)         |
//! | regressor | one standardised value per regressor |
//!
//! The fitter relies on [`Design::fill_row`]; prediction and the component
//! panels rely on [`Design::decompose`].

use std::ops::Range;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::Growth;
use crate::math::{days_since_epoch, fill_fourier};

/// A periodic component expressed as a Fourier series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seasonality {
    pub name: &'static str,
    /// Period in days.
    pub period: f64,
    pub order: usize,
}

impl Seasonality {
    pub const fn width(&self) -> usize {
        2 * self.order
    }
}

pub const YEARLY: Seasonality = Seasonality {
    name: "yearly",
    period: 365.25,
    order: 10,
};

pub const WEEKLY: Seasonality = Seasonality {
    name: "weekly",
    period: 7.0,
    order: 3,
};

pub const DAILY: Seasonality = Seasonality {
    name: "daily",
    period: 1.0,
    order: 4,
};

pub const SEASONALITIES: [Seasonality; 3] = [YEARLY, WEEKLY, DAILY];

/// Frozen preprocessing of a fit: time scaling and regressor standardisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Design {
    pub growth: Growth,
    /// First training timestamp, in days since the epoch.
    pub t_start: f64,
    /// Length of the training window in days (1 when degenerate).
    pub t_scale: f64,
    pub regressor_mean: Vec<f64>,
    pub regressor_std: Vec<f64>,
}

/// One row split into additive components, in target units before scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct RowComponents {
    pub trend: f64,
    pub seasonal: [f64; 3],
    pub regressors: Vec<f64>,
}

impl Design {
    /// Derive the preprocessing from the training timestamps and regressors.
    pub fn for_training(ts: &[NaiveDateTime], regressors: &[&[f64]], growth: Growth) -> Self {
        let first = ts.first().map(|t| days_since_epoch(*t)).unwrap_or(0.0);
        let last = ts.last().map(|t| days_since_epoch(*t)).unwrap_or(first);
        let span = last - first;

        let (regressor_mean, regressor_std) = regressors
            .iter()
            .map(|values| {
                let n = values.len().max(1) as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                (mean, if std > 0.0 && std.is_finite() { std } else { 1.0 })
            })
            .unzip();

        Self {
            growth,
            t_start: first,
            t_scale: if span > 0.0 { span } else { 1.0 },
            regressor_mean,
            regressor_std,
        }
    }

    pub fn trend_width(&self) -> usize {
        match self.growth {
            Growth::Flat => 1,
            Growth::Linear => 2,
        }
    }

    pub fn n_regressors(&self) -> usize {
        self.regressor_mean.len()
    }

    /// Number of columns of a design row.
    pub fn width(&self) -> usize {
        self.trend_width()
            + SEASONALITIES.iter().map(Seasonality::width).sum::<usize>()
            + self.n_regressors()
    }

    /// Column range of seasonality `i` (index into [`SEASONALITIES`]).
    pub fn seasonal_range(&self, i: usize) -> Range<usize> {
        let start = self.trend_width()
            + SEASONALITIES[..i].iter().map(Seasonality::width).sum::<usize>();
        start..start + SEASONALITIES[i].width()
    }

    pub fn regressor_range(&self) -> Range<usize> {
        let start = self.width() - self.n_regressors();
        start..self.width()
    }

    /// Fill the design row of one observation.
    ///
    /// # Panics
    /// Panics if `out.len() != self.width()` or `regressors.len()` differs
    /// from the number of regressors of the fit.
    pub fn fill_row(&self, ts: NaiveDateTime, regressors: &[f64], out: &mut [f64]) {
        let days = days_since_epoch(ts);
        out[0] = 1.0;
        if self.growth == Growth::Linear {
            out[1] = (days - self.t_start) / self.t_scale;
        }
        for (i, season) in SEASONALITIES.iter().enumerate() {
            let range = self.seasonal_range(i);
            fill_fourier(days, season.period, season.order, &mut out[range]);
        }
        let offset = self.regressor_range().start;
        for (j, value) in regressors.iter().enumerate() {
            out[offset + j] = (value - self.regressor_mean[j]) / self.regressor_std[j];
        }
    }

    /// Split `row · beta` into its additive components.
    pub fn decompose(&self, row: &[f64], beta: &[f64]) -> RowComponents {
        let dot = |range: Range<usize>| -> f64 {
            row[range.clone()]
                .iter()
                .zip(&beta[range])
                .map(|(x, b)| x * b)
                .sum()
        };

        let trend = dot(0..self.trend_width());
        let seasonal = [
            dot(self.seasonal_range(0)),
            dot(self.seasonal_range(1)),
            dot(self.seasonal_range(2)),
        ];
        let regressors = self
            .regressor_range()
            .map(|c| row[c] * beta[c])
            .collect();

        RowComponents {
            trend,
            seasonal,
            regressors,
        }
    }

    /// Value of seasonality `i` alone at `ts`.
    pub fn seasonal_value(&self, i: usize, ts: NaiveDateTime, beta: &[f64]) -> f64 {
        let season = SEASONALITIES[i];
        let mut terms = vec![0.0; season.width()];
        fill_fourier(days_since_epoch(ts), season.period, season.order, &mut terms);
        terms
            .iter()
            .zip(&beta[self.seasonal_range(i)])
            .map(|(x, b)| x * b)
            .sum()
    }
}
