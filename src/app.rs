//! Top-level application orchestration.
//!
//! The binaries are tiny; this module is the "real main" of each:
//! - `pipeline`: load or rebuild the canonical table, train, forecast, print
//! - `dashboard`: serve the pipeline over HTTP

use clap::Parser;
use tracing::{error, info};

use crate::cli::{DashboardArgs, PipelineArgs};
use crate::config::Config;
use crate::dates;
use crate::domain::{Field, Origin};
use crate::error::{AppError, PipelineError};
use crate::logging::init_logging;
use crate::pipeline::Pipeline;

pub mod dashboard;

/// Entry point for the `pipeline` binary.
pub fn run_pipeline() -> Result<(), AppError> {
    let args = PipelineArgs::parse();
    let config = Config::from_env()?;
    init_logging(&config, &config.log_level)?;
    run_pipeline_with(args, config)
}

/// [`run_pipeline`] with parsed arguments and an explicit configuration.
pub fn run_pipeline_with(args: PipelineArgs, config: Config) -> Result<(), AppError> {
    let window = args
        .start_date
        .map(|start| {
            dates::days_after(start, args.next_days)
                .map(|end| (start, end))
                .ok_or_else(|| {
                    PipelineError::InvalidArgument(format!(
                        "--next-days {} is out of range",
                        args.next_days
                    ))
                })
        })
        .transpose()?;

    let mut pipeline = Pipeline::new(config);

    // --download without --update is ignored by `process`.
    let outcome = pipeline.process(args.update, args.download, args.origin)?;
    info!(?outcome, "canonical table ready");
    pipeline.registry_mut().set_growth(args.growth);
    pipeline.build_models();

    let table = pipeline.serve(None, None, None, &[])?;
    println!(
        "{}",
        crate::report::format_table_summary(&table, pipeline.download_timestamp())
    );

    if args.train_models {
        let trained = pipeline.train_models()?;
        println!("Trained {trained}/{} models", pipeline.registry().names().len());
    }
    println!("{}", crate::report::format_models(&pipeline.registry().list()));

    let Some((start, end)) = window else {
        return Ok(());
    };
    let (forecast, forecaster) = pipeline.test(start, end, &[Field::PrevisionJ1], &args.model_name)?;

    let test = forecaster.df_test();
    let observed = test.and_then(|f| f.column(forecaster.spec().target));
    let baseline = test.and_then(|f| f.column(Field::PrevisionJ1));

    println!(
        "{}",
        crate::report::format_forecast_summary(forecaster, &forecast, observed, baseline)
    );
    println!(
        "{}",
        crate::plot::render_forecast_plot(&forecast, observed, args.width, args.height)
    );

    if let Some(path) = &args.export {
        crate::io::write_forecast_csv(path, &forecast, observed)?;
        info!(path = %path.display(), rows = forecast.len(), "forecast exported");
    }

    Ok(())
}

/// Entry point for the `dashboard` binary.
pub fn run_dashboard() -> Result<(), AppError> {
    let args = DashboardArgs::parse();
    let config = Config::from_env()?;
    let level = if args.debug { "debug" } else { config.log_level.as_str() };
    init_logging(&config, level)?;

    // A dashboard without data still starts; data routes answer "not ready"
    // until an update succeeds.
    let mut pipeline = Pipeline::new(config);
    if let Err(err) = pipeline.process(false, false, Origin::Csv) {
        error!(error = %err, "initial processing failed");
    }
    pipeline.build_models();

    let addr = format!("{}:{}", args.ip_address, args.port);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::new(4, format!("Failed to start the async runtime: {e}")))?;
    runtime.block_on(dashboard::serve(&addr, pipeline))
}
