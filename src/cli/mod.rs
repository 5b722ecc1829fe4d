//! Command-line parsing for the `pipeline` and `dashboard` binaries.
//!
//! Parsing stays here; dispatch lives in [`crate::app`].

use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::Parser;

use crate::dates;
use crate::domain::{Growth, Origin};

/// Batch driver: load or rebuild the canonical table, train, forecast.
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeline", version, about = "French power consumption pipeline")]
pub struct PipelineArgs {
    /// Rebuild the canonical table from the raw sources.
    #[arg(short = 'u', long)]
    pub update: bool,

    /// Download the raw sources before rebuilding (only with --update).
    #[arg(short = 'd', long)]
    pub download: bool,

    /// Where raw records come from.
    #[arg(long, value_enum, default_value_t = Origin::Csv)]
    pub origin: Origin,

    /// First forecast hour (`YYYY-mm-ddTHH:MM`, or a plain date).
    #[arg(long = "start-date", value_parser = parse_start)]
    pub start_date: Option<NaiveDateTime>,

    /// Number of days to forecast from --start-date.
    #[arg(short = 'n', long = "next-days", default_value_t = 21)]
    pub next_days: u32,

    /// Registry entry used for the forecast.
    #[arg(short = 'm', long = "model_name", default_value = "prophet_time")]
    pub model_name: String,

    /// Trend shape of every fit.
    #[arg(long, value_enum, default_value_t = Growth::Flat)]
    pub growth: Growth,

    /// Retrain every registry entry.
    #[arg(short = 't', long = "train-models")]
    pub train_models: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export the forecast to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

/// JSON data service consumed by the dashboard view.
#[derive(Debug, Parser, Clone)]
#[command(name = "dashboard", version, about = "Serve pipeline data to the dashboard")]
pub struct DashboardArgs {
    #[arg(long = "ip-address", default_value = "127.0.0.1")]
    pub ip_address: String,

    #[arg(long, default_value_t = 8050)]
    pub port: u16,

    /// Verbose logging.
    #[arg(long)]
    pub debug: bool,
}

fn parse_start(raw: &str) -> Result<NaiveDateTime, String> {
    dates::parse_timestamp(raw).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn pipeline_defaults() {
        let args = PipelineArgs::parse_from(["pipeline"]);
        assert!(!args.update && !args.download && !args.train_models);
        assert_eq!(args.next_days, 21);
        assert_eq!(args.model_name, "prophet_time");
        assert_eq!(args.origin, Origin::Csv);
        assert_eq!(args.growth, Growth::Flat);
        assert!(args.start_date.is_none());
    }

    #[test]
    fn pipeline_flags() {
        let args = PipelineArgs::parse_from([
            "pipeline",
            "-u",
            "-t",
            "--start-date",
            "2022-01-01T06:00",
            "-n",
            "7",
            "--model_name",
            "prophet_temp",
            "--growth",
            "linear",
        ]);
        assert!(args.update && args.train_models);
        assert_eq!(
            args.start_date,
            NaiveDate::from_ymd_opt(2022, 1, 1).unwrap().and_hms_opt(6, 0, 0)
        );
        assert_eq!(args.next_days, 7);
        assert_eq!(args.model_name, "prophet_temp");
        assert_eq!(args.growth, Growth::Linear);

        assert!(PipelineArgs::try_parse_from(["pipeline", "--start-date", "soon"]).is_err());
    }

    #[test]
    fn dashboard_defaults() {
        let args = DashboardArgs::parse_from(["dashboard"]);
        assert_eq!(args.ip_address, "127.0.0.1");
        assert_eq!(args.port, 8050);
        assert!(!args.debug);

        let args = DashboardArgs::parse_from(["dashboard", "--port", "9000", "--debug"]);
        assert_eq!(args.port, 9000);
        assert!(args.debug);
    }
}
