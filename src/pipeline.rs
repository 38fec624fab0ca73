use crate::config::{PLOT_HEIGHT, PLOT_WIDTH, WINDOW_LENGTH};
use crate::data::{self, PriceProvider, PriceSeries};
use crate::error::{PredictError, PredictResult};
use crate::inference::Predictor;
use crate::metrics::{round_to, RegressionMetrics};
use crate::model_artifacts::ModelArtifacts;
use crate::plot;
use crate::scaler::MinMaxScaler;
use crate::sequence::{tail_window, WindowedDataset};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub ticker: String,
    pub start_date: String,
    pub end_date: String,
}

impl PredictionRequest {
    /// Checks the ticker and parses the dates; `start_date` must precede `end_date`.
    pub fn validate(&self) -> PredictResult<(NaiveDate, NaiveDate)> {
        if self.ticker.trim().is_empty() {
            return Err(PredictError::invalid("ticker is required"));
        }
        let parse = |field: &str, value: &str| {
            NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
                PredictError::invalid(format!("{} must be a date in YYYY-MM-DD format, got '{}'", field, value))
            })
        };
        let start = parse("start_date", &self.start_date)?;
        let end = parse("end_date", &self.end_date)?;
        if start >= end {
            return Err(PredictError::invalid("start_date must be before end_date"));
        }
        Ok((start, end))
    }
}

/// Outcome of one range prediction. Serialized with exactly these keys.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictionResult {
    pub ticker: String,
    pub start_date: String,
    pub end_date: String,
    pub last_close: f64,
    pub next_price: f64,
    pub price_change: f64,
    pub price_change_pct: f64,
    pub metrics: RegressionMetrics,
    pub data_points: usize,
    /// `data:image/png;base64,...`
    pub plot: String,
}

/// Scales, windows, infers and scores `series`. CPU-bound and synchronous.
///
/// The scaler is fit on `series` itself rather than reusing the training
/// scaler, so results for the same ticker vary with the requested range.
pub fn evaluate_series(
    predictor: &Predictor,
    series: &PriceSeries,
    request: &PredictionRequest,
    window: usize,
) -> PredictResult<PredictionResult> {
    let closes = series.closes();
    if closes.len() <= window {
        return Err(PredictError::InsufficientData {
            required: window + 1,
            available: closes.len(),
        });
    }

    let scaler = MinMaxScaler::fit(&closes)
        .ok_or_else(|| PredictError::Retrieval {
            symbol: series.symbol.clone(),
            message: "provider returned non-finite closes".to_string(),
        })?;
    let scaled = scaler.transform(&closes);

    let dataset = WindowedDataset::build(&scaled, window)?;
    let y_pred = predictor.predict_windows(&dataset)?;
    let y_true = &dataset.targets;

    let metrics = RegressionMetrics::compute(y_true, &y_pred)
        .ok_or_else(|| PredictError::internal("prediction count does not match window count"))?;

    let next_scaled = predictor.predict_next(tail_window(&scaled, window)?)?;
    let next_price = scaler.inverse_one(next_scaled);

    let plot = plot::render_comparison_png(
        &scaler.inverse_transform(y_true),
        &scaler.inverse_transform(&y_pred),
        PLOT_WIDTH,
        PLOT_HEIGHT,
    )
    .map_err(PredictError::internal)?;

    let last_close = closes[closes.len() - 1];
    let price_change = next_price - last_close;
    let price_change_pct = price_change / last_close * 100.0;

    Ok(PredictionResult {
        ticker: request.ticker.trim().to_string(),
        start_date: request.start_date.trim().to_string(),
        end_date: request.end_date.trim().to_string(),
        last_close: round_to(last_close, 2),
        next_price: round_to(next_price, 2),
        price_change: round_to(price_change, 2),
        price_change_pct: round_to(price_change_pct, 2),
        metrics: metrics.rounded(),
        data_points: dataset.len(),
        plot,
    })
}

/// Full request path: validate, fetch (with regional fallback), evaluate.
pub async fn run_prediction<P: PriceProvider>(
    provider: &P,
    artifacts: Arc<ModelArtifacts>,
    request: PredictionRequest,
) -> PredictResult<PredictionResult> {
    let (start, end) = request.validate()?;
    let started = Instant::now();

    let series = data::load_price_series(provider, &request.ticker, start, end).await?;
    info!(
        "Evaluating {} ({} closes, {} to {})",
        series.symbol,
        series.len(),
        request.start_date,
        request.end_date
    );

    let result = tokio::task::spawn_blocking(move || {
        evaluate_series(&artifacts.predictor, &series, &request, WINDOW_LENGTH)
    })
    .await
    .map_err(|e| {
        error!("Evaluation task failed: {}", e);
        PredictError::internal("evaluation task failed")
    })??;

    info!(
        "Prediction for {} done in {:.2}s: next={} R2={}",
        result.ticker,
        started.elapsed().as_secs_f64(),
        result.next_price,
        result.metrics.r2
    );
    Ok(result)
}

fn default_window() -> usize {
    WINDOW_LENGTH
}

/// Raw closes (most recent last) scored with the training-time scaler.
#[derive(Clone, Debug, Deserialize)]
pub struct WindowPredictionRequest {
    pub close_prices: Vec<f64>,
    #[serde(default = "default_window")]
    pub window: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WindowPrediction {
    pub predicted_next_price: f64,
    pub duration_ms: f64,
}

pub fn predict_from_closes(
    artifacts: &ModelArtifacts,
    request: &WindowPredictionRequest,
) -> PredictResult<WindowPrediction> {
    let started = Instant::now();
    if request.window == 0 {
        return Err(PredictError::invalid("window must be positive"));
    }
    if request.close_prices.iter().any(|v| !v.is_finite()) {
        return Err(PredictError::invalid("close_prices must be finite numbers"));
    }
    if request.close_prices.len() < request.window {
        return Err(PredictError::invalid(format!(
            "Need at least {} points, got {}",
            request.window,
            request.close_prices.len()
        )));
    }

    let scaler = &artifacts.training_scaler;
    let scaled = scaler.transform(&request.close_prices);
    let next_scaled = artifacts.predictor.predict_next(tail_window(&scaled, request.window)?)?;

    Ok(WindowPrediction {
        predicted_next_price: scaler.inverse_one(next_scaled),
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

pub fn print_report(result: &PredictionResult) {
    let direction = if result.price_change >= 0.0 { "▲" } else { "▼" };
    let r2 = if result.metrics.r2.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.4}", result.metrics.r2)
    };

    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                 LSTM NEXT-CLOSE PREDICTION                 ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  Ticker:      {:<45}║", result.ticker);
    println!("║  Range:       {:<45}║", format!("{} to {}", result.start_date, result.end_date));
    println!("║  Last close:  {:<45}║", format!("{:.2}", result.last_close));
    println!("║  Next close:  {:<45}║", format!("{:.2}", result.next_price));
    println!(
        "║  Change:      {:<45}║",
        format!("{} {:.2} ({:.2}%)", direction, result.price_change.abs(), result.price_change_pct)
    );
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  R²:          {:<45}║", r2);
    println!("║  MAE:         {:<45}║", format!("{:.6}", result.metrics.mae));
    println!("║  RMSE:        {:<45}║", format!("{:.6}", result.metrics.rmse));
    println!("║  MSE:         {:<45}║", format!("{:.6}", result.metrics.mse));
    println!("║  MAPE:        {:<45}║", format!("{:.2}%", result.metrics.mape));
    println!("║  Windows:     {:<45}║", result.data_points);
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("⚠  Educational use only. Not financial advice.");
}
