//! Export a forecast to CSV.
//!
//! Columns follow [`Forecast::columns`], with the observed target appended
//! when it is known.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::dates;
use crate::error::{PipelineError, Result};
use crate::models::Forecast;

/// Write `forecast` (and `observed`, when aligned) to a comma-separated file.
pub fn write_forecast_csv(path: &Path, forecast: &Forecast, observed: Option<&[f64]>) -> Result<()> {
    let observed = observed.filter(|o| o.len() == forecast.len());
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let io_err = |e| PipelineError::io(path, e);

    let columns = forecast.columns();
    let mut header = columns.join(",");
    if observed.is_some() {
        header.push_str(",y");
    }
    writeln!(out, "{header}").map_err(io_err)?;

    let numeric: Vec<&[f64]> = columns
        .iter()
        .skip(1)
        .filter_map(|name| forecast.column(name))
        .collect();
    for (row, ts) in forecast.ds.iter().enumerate() {
        let mut line = dates::format_timestamp(*ts);
        for col in &numeric {
            line.push_str(&format!(",{:.4}", col[row]));
        }
        if let Some(observed) = observed {
            line.push_str(&format!(",{:.4}", observed[row]));
        }
        writeln!(out, "{line}").map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;
    Ok(())
}
