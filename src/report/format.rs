//! Terminal output of the `pipeline` binary.
//!
//! Formatting lives here so the pipeline and models stay free of
//! presentation concerns.

use chrono::{DateTime, Local, NaiveDateTime};

use crate::dates;
use crate::domain::Frame;
use crate::models::{Forecast, Forecaster, ModelSummary};

/// Caption shown above a forecast, as the dashboard renders it.
pub fn rmse_caption(start: NaiveDateTime, end: NaiveDateTime, rmse: Option<f64>) -> String {
    let from = start.format("%Y-%m-%d");
    let to = end.format("%Y-%m-%d");
    match rmse {
        Some(rmse) => format!("Consumption prediction from {from} to {to} (RMSE : {rmse:.0})"),
        None => format!("Consumption prediction from {from} to {to}"),
    }
}

/// Shape and freshness of the canonical table.
pub fn format_table_summary(frame: &Frame, freshness: Option<DateTime<Local>>) -> String {
    let mut out = String::new();
    out.push_str("=== conso-forecast ===\n");
    match (frame.first_timestamp(), frame.last_timestamp()) {
        (Some(first), Some(last)) => out.push_str(&format!(
            "Table: {} rows | {} -> {}\n",
            frame.len(),
            dates::format_timestamp(first),
            dates::format_timestamp(last)
        )),
        _ => out.push_str("Table: empty\n"),
    }
    let columns: Vec<&str> = frame.fields().iter().map(|f| f.as_str()).collect();
    out.push_str(&format!("Columns: {}\n", columns.join(", ")));
    if let Some(ts) = freshness {
        out.push_str(&format!("Downloaded: {}\n", ts.format("%Y-%m-%d %H:%M")));
    }
    out
}

/// Registry listing.
pub fn format_models(models: &[ModelSummary]) -> String {
    let mut out = String::new();
    out.push_str(format!("{:<18} {:<36} {:<14}", "name", "model", "state").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<18} {:-<36} {:-<14}", "", "", "").trim_end());
    out.push('\n');
    for m in models {
        out.push_str(
            format!(
                "{:<18} {:<36} {:<14}",
                truncate(&m.name, 18),
                truncate(&m.display_name, 36),
                m.state
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Forecast header: model, window, fit quality and errors against the
/// observed consumption and the day-ahead baseline when available.
pub fn format_forecast_summary(
    forecaster: &Forecaster,
    forecast: &Forecast,
    observed: Option<&[f64]>,
    baseline: Option<&[f64]>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Model: {} ({})\n",
        forecaster.spec().display_name,
        forecaster.name()
    ));
    let regressors: Vec<&str> = forecaster.spec().regressors.iter().map(|f| f.as_str()).collect();
    if !regressors.is_empty() {
        out.push_str(&format!("Regressors: {}\n", regressors.join(", ")));
    }
    out.push_str(&format!(
        "Trained until: {}\n",
        dates::format_timestamp(forecaster.spec().end_training)
    ));
    if let Some(fit) = forecaster.fitted() {
        out.push_str(&format!(
            "Fit: n={} | in-sample RMSE={:.1} | sigma={:.1}\n",
            fit.n_obs, fit.rmse, fit.sigma
        ));
    }

    let (Some(first), Some(last)) = (forecast.ds.first(), forecast.ds.last()) else {
        out.push_str("Forecast: no rows in the requested window\n");
        return out;
    };
    let rmse = observed.and_then(|o| forecast.rmse(o));
    out.push_str(&rmse_caption(*first, *last, rmse));
    out.push('\n');
    out.push_str(&format!("Rows: {}\n", forecast.len()));

    if let Some(baseline) = baseline.filter(|b| b.len() == forecast.len()) {
        if let Some(rmse) = observed.and_then(|o| rmse_between(baseline, o)) {
            out.push_str(&format!("Day-ahead baseline RMSE : {rmse:.0}\n"));
        }
    }
    out
}

fn rmse_between(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let sse: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    Some((sse / a.len() as f64).sqrt())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
