//! Least squares calibration of the additive model.
//!
//! Given:
//! - timestamps `t_i`
//! - observed target values `y_i`
//! - regressor values `z_ij`
//!
//! we build a design row per observation (trend, Fourier seasonalities,
//! standardised regressors), accumulate `XᵀX` / `Xᵀy` on the target scaled
//! by `max |y|`, solve for β and estimate the residual spread used by the
//! prediction interval.

use chrono::NaiveDateTime;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::Growth;
use crate::error::{PipelineError, Result};
use crate::math::solve_normal_equations;
use crate::models::Design;

/// Options of a single fit.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub growth: Growth,
    /// Ridge penalty per observation, on the scaled problem.
    ///
    /// Small enough not to bias the fit; it only keeps the normal equations
    /// positive definite when a column is constant.
    pub ridge: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            growth: Growth::Flat,
            ridge: 1e-9,
        }
    }
}

/// Calibrated model, everything needed to predict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveFit {
    pub design: Design,
    /// Coefficients on the scaled target, in design-row order.
    pub beta: Vec<f64>,
    /// Divisor applied to the target before fitting.
    pub y_scale: f64,
    /// Residual standard deviation, in target units.
    pub sigma: f64,
    pub n_obs: usize,
    /// In-sample root mean squared error, in target units.
    pub rmse: f64,
}

impl AdditiveFit {
    /// Evaluate one design row, returning the prediction in target units.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.y_scale * row.iter().zip(&self.beta).map(|(x, b)| x * b).sum::<f64>()
    }
}

/// Fit the additive model on aligned observations.
pub fn fit_additive(
    ts: &[NaiveDateTime],
    y: &[f64],
    regressors: &[&[f64]],
    opts: &FitOptions,
) -> Result<AdditiveFit> {
    let n = ts.len();
    if n == 0 {
        return Err(PipelineError::Schema("no rows to train on".to_string()));
    }
    if y.len() != n || regressors.iter().any(|r| r.len() != n) {
        return Err(PipelineError::Schema(
            "target, regressors and timestamps differ in length".to_string(),
        ));
    }
    if y.iter().chain(regressors.iter().flat_map(|r| r.iter())).any(|v| !v.is_finite()) {
        return Err(PipelineError::Schema("training data contains non-finite values".to_string()));
    }

    let design = Design::for_training(ts, regressors, opts.growth);
    let p = design.width();

    let y_max = y.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let y_scale = if y_max > 0.0 { y_max } else { 1.0 };

    let mut xtx = DMatrix::<f64>::zeros(p, p);
    let mut xty = DVector::<f64>::zeros(p);
    let mut row = vec![0.0; p];
    let mut z = vec![0.0; regressors.len()];

    for i in 0..n {
        for (slot, values) in z.iter_mut().zip(regressors) {
            *slot = values[i];
        }
        design.fill_row(ts[i], &z, &mut row);
        let yi = y[i] / y_scale;
        for a in 0..p {
            let xa = row[a];
            xty[a] += xa * yi;
            for b in a..p {
                xtx[(a, b)] += xa * row[b];
            }
        }
    }
    for a in 0..p {
        for b in 0..a {
            xtx[(a, b)] = xtx[(b, a)];
        }
    }

    let beta = solve_normal_equations(&xtx, &xty, opts.ridge * n as f64)
        .ok_or_else(|| PipelineError::Schema("training data does not determine the model".to_string()))?
        .iter()
        .copied()
        .collect::<Vec<f64>>();

    let mut fit = AdditiveFit {
        design,
        beta,
        y_scale,
        sigma: 0.0,
        n_obs: n,
        rmse: 0.0,
    };

    let mut sse = 0.0;
    for i in 0..n {
        for (slot, values) in z.iter_mut().zip(regressors) {
            *slot = values[i];
        }
        fit.design.fill_row(ts[i], &z, &mut row);
        let r = y[i] - fit.predict_row(&row);
        sse += r * r;
    }
    let dof = n.saturating_sub(p).max(1);
    fit.sigma = (sse / dof as f64).sqrt();
    fit.rmse = (sse / n as f64).sqrt();

    Ok(fit)
}
