//! JSON data service for the dashboard view.
//!
//! The pipeline is shared behind a `parking_lot::RwLock`. Every route takes
//! the lock on the blocking pool: reads under the shared lock for the
//! duration of a copy, long operations (update, training, forecasting) under
//! the exclusive lock. Runtime workers never wait on the lock, and guards are
//! never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::COL_VISUALISATION_PRODUCTION;
use crate::dates;
use crate::domain::{Field, Frame, Origin};
use crate::error::{AppError, PipelineError};
use crate::models::{Components, Forecast, ModelSummary};
use crate::pipeline::{Pipeline, ProcessOutcome};
use crate::report::rmse_caption;

pub type SharedPipeline = Arc<RwLock<Pipeline>>;

const DEFAULT_MODEL: &str = "prophet_time";
const DEFAULT_FORECAST_DAYS: u32 = 7;

/// Error body of every failed route.
#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Pipeline(err) => {
                let (status, code) = match &err {
                    PipelineError::NotTrained(_) => (StatusCode::CONFLICT, "model_not_trained"),
                    PipelineError::Schema(_) => (StatusCode::UNPROCESSABLE_ENTITY, "AnalysisUnavailable"),
                    PipelineError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
                    PipelineError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
                    PipelineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
                };
                (status, code, err.to_string())
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        if status.is_server_error() {
            error!(code, %message, "request failed");
        } else {
            warn!(code, %message, "request rejected");
        }
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run `work` on the blocking pool with shared access to the pipeline.
async fn with_pipeline<T, F>(pipeline: &SharedPipeline, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Pipeline) -> Result<T, PipelineError> + Send + 'static,
{
    let pipeline = Arc::clone(pipeline);
    tokio::task::spawn_blocking(move || work(&pipeline.read()))
        .await
        .map_err(|e| ApiError::Internal(format!("background task failed: {e}")))?
        .map_err(ApiError::from)
}

/// Run `work` on the blocking pool with exclusive access to the pipeline.
async fn with_pipeline_mut<T, F>(pipeline: &SharedPipeline, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Pipeline) -> Result<T, PipelineError> + Send + 'static,
{
    let pipeline = Arc::clone(pipeline);
    tokio::task::spawn_blocking(move || work(&mut pipeline.write()))
        .await
        .map_err(|e| ApiError::Internal(format!("background task failed: {e}")))?
        .map_err(ApiError::from)
}

fn parse_param(name: &str, raw: Option<&str>) -> Result<Option<NaiveDateTime>, ApiError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| {
            dates::parse_timestamp(s).map_err(|e| {
                ApiError::Pipeline(PipelineError::InvalidArgument(format!("{name}: {e}")))
            })
        })
        .transpose()
}

pub fn router(pipeline: SharedPipeline) -> Router {
    Router::new()
        .route("/api/models", get(models))
        .route("/api/range", get(range))
        .route("/api/production", get(production))
        .route("/api/repartition", get(repartition))
        .route("/api/forecast", get(forecast))
        .route("/api/freshness", get(freshness))
        .route("/api/update", post(update))
        .route("/api/train", post(train))
        .with_state(pipeline)
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn serve(addr: &str, pipeline: Pipeline) -> Result<(), AppError> {
    let app = router(Arc::new(RwLock::new(pipeline)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::new(4, format!("Failed to bind to {addr}: {e}")))?;
    info!("Dashboard data service listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::new(4, format!("Server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl+C, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn models(State(pipeline): State<SharedPipeline>) -> ApiResult<Vec<ModelSummary>> {
    let list = with_pipeline(&pipeline, |p| Ok(p.registry().list())).await?;
    Ok(Json(list))
}

#[derive(Debug, Serialize)]
pub struct RangeResponse {
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    pub rows: usize,
}

async fn range(State(pipeline): State<SharedPipeline>) -> ApiResult<RangeResponse> {
    let index = with_pipeline(&pipeline, |p| p.serve_index()).await?;
    Ok(Json(RangeResponse {
        first: index.first().copied(),
        last: index.last().copied(),
        rows: index.len(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

async fn production(
    State(pipeline): State<SharedPipeline>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Frame> {
    let start = parse_param("start", query.start.as_deref())?;
    let end = parse_param("end", query.end.as_deref())?;
    let slice = with_pipeline(&pipeline, move |p| {
        p.serve(start, end, None, &COL_VISUALISATION_PRODUCTION)
    })
    .await?;
    Ok(Json(slice))
}

#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RepartitionResponse {
    pub date: NaiveDateTime,
    pub values: BTreeMap<Field, f64>,
}

async fn repartition(
    State(pipeline): State<SharedPipeline>,
    Query(query): Query<DateQuery>,
) -> ApiResult<RepartitionResponse> {
    let date = parse_param("date", query.date.as_deref())?.ok_or_else(|| {
        ApiError::Pipeline(PipelineError::InvalidArgument("date is required".to_string()))
    })?;
    let slice = with_pipeline(&pipeline, move |p| {
        p.serve(None, None, Some(date), &COL_VISUALISATION_PRODUCTION)
    })
    .await?;
    let row = slice.row(0).ok_or_else(|| {
        ApiError::Pipeline(PipelineError::NotFound(format!(
            "no row at {}",
            dates::format_timestamp(date)
        )))
    })?;
    Ok(Json(RepartitionResponse {
        date,
        values: slice.fields().iter().copied().zip(row).collect(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    pub model: Option<String>,
    pub start: Option<String>,
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub model: String,
    pub display_name: String,
    pub caption: String,
    pub rmse: Option<f64>,
    pub forecast: Forecast,
    pub observed: Option<Vec<f64>>,
    pub baseline: Option<Vec<f64>>,
    pub components: Components,
}

async fn forecast(
    State(pipeline): State<SharedPipeline>,
    Query(query): Query<ForecastQuery>,
) -> ApiResult<ForecastResponse> {
    let model = query.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let start = parse_param("start", query.start.as_deref())?.ok_or_else(|| {
        ApiError::Pipeline(PipelineError::InvalidArgument("start is required".to_string()))
    })?;
    let days = query.days.unwrap_or(DEFAULT_FORECAST_DAYS);
    let end = dates::days_after(start, days).ok_or_else(|| {
        ApiError::Pipeline(PipelineError::InvalidArgument(format!(
            "days: {days} is out of range"
        )))
    })?;

    let response = with_pipeline_mut(&pipeline, move |p| {
        let (forecast, forecaster) = p.test(start, end, &[Field::PrevisionJ1], &model)?;
        let test = forecaster.df_test();
        let observed = test.and_then(|f| f.column(forecaster.spec().target)).map(<[f64]>::to_vec);
        let baseline = test.and_then(|f| f.column(Field::PrevisionJ1)).map(<[f64]>::to_vec);
        let rmse = observed.as_deref().and_then(|o| forecast.rmse(o));
        let components = forecaster.components(&forecast, true)?;

        Ok(ForecastResponse {
            model: forecaster.name().to_string(),
            display_name: forecaster.spec().display_name.clone(),
            caption: rmse_caption(start, end, rmse),
            rmse,
            forecast,
            observed,
            baseline,
            components,
        })
    })
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct FreshnessResponse {
    pub downloaded_at: Option<String>,
}

async fn freshness(State(pipeline): State<SharedPipeline>) -> ApiResult<FreshnessResponse> {
    let ts = with_pipeline(&pipeline, |p| Ok(p.download_timestamp())).await?;
    Ok(Json(FreshnessResponse {
        downloaded_at: ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
    }))
}

async fn update(State(pipeline): State<SharedPipeline>) -> ApiResult<serde_json::Value> {
    let (outcome, rows) = with_pipeline_mut(&pipeline, |p| {
        let outcome = p.process(true, true, Origin::Csv)?;
        Ok((outcome, p.serve_index()?.len()))
    })
    .await?;
    let outcome = match outcome {
        ProcessOutcome::Loaded => "loaded",
        ProcessOutcome::Rebuilt => "rebuilt",
    };
    Ok(Json(json!({ "outcome": outcome, "rows": rows })))
}

async fn train(State(pipeline): State<SharedPipeline>) -> ApiResult<serde_json::Value> {
    let (trained, total) = with_pipeline_mut(&pipeline, |p| {
        let trained = p.train_models()?;
        Ok((trained, p.registry().names().len()))
    })
    .await?;
    Ok(Json(json!({ "trained": trained, "total": total })))
}
