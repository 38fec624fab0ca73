use crate::config::{HIDDEN_DIM, INPUT_DIM, LSTM_LAYERS, RECENT_LOGS_DEFAULT, WINDOW_LENGTH};
use crate::data::PriceProvider;
use crate::error::PredictError;
use crate::model_artifacts::ModelArtifacts;
use crate::pipeline::{self, PredictionRequest, PredictionResult, WindowPrediction, WindowPredictionRequest};
use crate::prediction_log::{DashboardData, LogStats, PredictionLogEntry, PredictionLogger};
use anyhow::Result;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared, read-only handles passed to every handler.
pub struct WebState<P> {
    pub artifacts: Arc<ModelArtifacts>,
    pub provider: Arc<P>,
    pub logger: Arc<PredictionLogger>,
}

impl<P> Clone for WebState<P> {
    fn clone(&self) -> Self {
        Self {
            artifacts: self.artifacts.clone(),
            provider: self.provider.clone(),
            logger: self.logger.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct ApiError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    model: &'static str,
    input_size: usize,
    hidden_size: usize,
    num_layers: usize,
    window_length: usize,
    weights_path: String,
    scaler_path: String,
    training_scaler_min: f64,
    training_scaler_max: f64,
}

pub fn router<P: PriceProvider + 'static>(state: WebState<P>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/info", get(model_info::<P>))
        .route("/api/predict", post(predict::<P>))
        .route("/predict", post(predict_window::<P>))
        .route("/api/logs/recent", get(recent_logs::<P>))
        .route("/api/stats", get(stats::<P>))
        .route("/api/dashboard", get(dashboard::<P>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server<P: PriceProvider + 'static>(port: u16, state: WebState<P>) -> Result<()> {
    let app = router(state);
    let addr = format!("0.0.0.0:{}", port);
    info!("Prediction API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "model_loaded": true }))
}

async fn model_info<P: PriceProvider + 'static>(State(state): State<WebState<P>>) -> Json<ModelInfo> {
    let artifacts = &state.artifacts;
    Json(ModelInfo {
        model: "StockLSTM",
        input_size: INPUT_DIM,
        hidden_size: HIDDEN_DIM,
        num_layers: LSTM_LAYERS,
        window_length: WINDOW_LENGTH,
        weights_path: artifacts.weights_path.display().to_string(),
        scaler_path: artifacts.scaler_path.display().to_string(),
        training_scaler_min: artifacts.training_scaler.data_min,
        training_scaler_max: artifacts.training_scaler.data_max,
    })
}

async fn predict<P: PriceProvider + 'static>(
    State(state): State<WebState<P>>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>, (StatusCode, Json<ApiError>)> {
    let Json(req) = payload.map_err(json_rejection)?;
    let started = Instant::now();
    let outcome = pipeline::run_prediction(&*state.provider, state.artifacts.clone(), req.clone()).await;

    let entry = match &outcome {
        Ok(result) => PredictionLogEntry::new(&req, Ok(result), started.elapsed()),
        Err(e) => {
            if e.is_client_error() {
                info!("Rejected prediction for '{}': {}", req.ticker, e);
            } else {
                warn!("Prediction for '{}' failed: {}", req.ticker, e);
            }
            PredictionLogEntry::new(&req, Err(e.to_string().as_str()), started.elapsed())
        }
    };
    let logger = state.logger.clone();
    match tokio::task::spawn_blocking(move || logger.log_prediction(&entry)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Could not write prediction log: {}", e),
        Err(e) => warn!("Prediction log task failed: {}", e),
    }

    outcome.map(Json).map_err(|e| predict_err(&e))
}

async fn predict_window<P: PriceProvider + 'static>(
    State(state): State<WebState<P>>,
    payload: Result<Json<WindowPredictionRequest>, JsonRejection>,
) -> Result<Json<WindowPrediction>, (StatusCode, Json<ApiError>)> {
    let Json(req) = payload.map_err(json_rejection)?;
    let artifacts = state.artifacts.clone();
    tokio::task::spawn_blocking(move || pipeline::predict_from_closes(&artifacts, &req))
        .await
        .map_err(|e| internal_err(PredictError::internal(e)))?
        .map(Json)
        .map_err(|e| predict_err(&e))
}

/// Runs a log-directory read on the blocking pool.
async fn read_logs<T, F>(logger: Arc<PredictionLogger>, read: F) -> Result<Json<T>, (StatusCode, Json<ApiError>)>
where
    T: Send + 'static,
    F: FnOnce(&PredictionLogger) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || read(logger.as_ref()))
        .await
        .map(Json)
        .map_err(|e| internal_err(PredictError::internal(e)))
}

async fn recent_logs<P: PriceProvider + 'static>(
    State(state): State<WebState<P>>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<Vec<PredictionLogEntry>>, (StatusCode, Json<ApiError>)> {
    let Query(query) = query.map_err(|e| api_err(StatusCode::BAD_REQUEST, &e.body_text()))?;
    let limit = query.limit.unwrap_or(RECENT_LOGS_DEFAULT);
    read_logs(state.logger.clone(), move |logger| logger.recent(limit)).await
}

async fn stats<P: PriceProvider + 'static>(
    State(state): State<WebState<P>>,
) -> Result<Json<LogStats>, (StatusCode, Json<ApiError>)> {
    read_logs(state.logger.clone(), |logger| logger.stats()).await
}

async fn dashboard<P: PriceProvider + 'static>(
    State(state): State<WebState<P>>,
) -> Result<Json<DashboardData>, (StatusCode, Json<ApiError>)> {
    read_logs(state.logger.clone(), |logger| logger.dashboard()).await
}

fn api_err(status: StatusCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.to_string(),
        }),
    )
}

fn json_rejection(rejection: JsonRejection) -> (StatusCode, Json<ApiError>) {
    api_err(StatusCode::BAD_REQUEST, &rejection.body_text())
}

fn internal_err(err: PredictError) -> (StatusCode, Json<ApiError>) {
    error!("Internal error while serving request: {}", err);
    api_err(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

fn predict_err(err: &PredictError) -> (StatusCode, Json<ApiError>) {
    match err {
        PredictError::InvalidInput(_) | PredictError::InsufficientData { .. } => {
            api_err(StatusCode::BAD_REQUEST, &err.to_string())
        }
        PredictError::NoData { .. } => api_err(StatusCode::NOT_FOUND, &err.to_string()),
        PredictError::Retrieval { .. } => api_err(StatusCode::BAD_GATEWAY, &err.to_string()),
        PredictError::ModelUnavailable(_) => api_err(StatusCode::SERVICE_UNAVAILABLE, &err.to_string()),
        PredictError::Internal(detail) => internal_err(PredictError::Internal(detail.clone())),
    }
}
