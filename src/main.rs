mod config;
mod data;
mod error;
mod inference;
mod metrics;
mod model_artifacts;
mod models;
mod pipeline;
mod plot;
mod prediction_log;
mod scaler;
mod sequence;
mod server;

use base64::Engine;
use clap::Parser;
use error::{PredictError, PredictResult};
use model_artifacts::ModelArtifacts;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "LSTM stock predictor: next-close forecast and fit metrics for a ticker",
    after_help = "EXAMPLES:
    # Serve the prediction API on the default port
    cargo run --release

    # Serve on a custom port with artifacts elsewhere
    cargo run --release -- --port 9000 --artifacts-dir /srv/models

    # One-shot prediction printed to the terminal
    cargo run --release -- --predict PETR4 --start-date 2024-01-01 --end-date 2025-01-01 --plot-out petr4.png"
)]
struct Args {
    /// Run a single prediction for this ticker and exit instead of serving the API
    #[arg(long)]
    predict: Option<String>,

    /// First day of the price range (YYYY-MM-DD). Defaults to one year before --end-date.
    #[arg(long)]
    start_date: Option<String>,

    /// Day after the last close to include (YYYY-MM-DD, exclusive). Defaults to today.
    #[arg(long)]
    end_date: Option<String>,

    /// Write the comparison plot of a --predict run to this PNG file
    #[arg(long)]
    plot_out: Option<PathBuf>,

    /// API server port (env: PREDICTOR_PORT, default: 8000)
    #[arg(long)]
    port: Option<u16>,

    /// Directory with stock_lstm.safetensors and scaler.json (env: PREDICTOR_ARTIFACTS_DIR)
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Directory for per-request prediction logs (env: PREDICTOR_LOG_DIR, default: logs)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Use CUDA GPU acceleration (requires --features cuda at compile time)
    #[arg(long)]
    cuda: bool,
}

/// Fills in the missing ends of the CLI range. An explicit `--end-date` is
/// passed through untouched so request validation sees exactly what was typed;
/// the default start is derived only from a parseable end date.
fn default_range(start: Option<String>, end: Option<String>) -> PredictResult<(String, String)> {
    let end = end.unwrap_or_else(|| chrono::Local::now().date_naive().format("%Y-%m-%d").to_string());
    let start = match start {
        Some(start) => start,
        None => {
            let end_date = chrono::NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").map_err(|_| {
                PredictError::invalid(format!("end_date must be a date in YYYY-MM-DD format, got '{}'", end))
            })?;
            (end_date - chrono::Duration::days(365)).format("%Y-%m-%d").to_string()
        }
    };
    Ok((start, end))
}

async fn run_once(args: Args, artifacts: Arc<ModelArtifacts>, ticker: String) -> anyhow::Result<()> {
    let (start_date, end_date) = default_range(args.start_date, args.end_date)?;
    let request = pipeline::PredictionRequest {
        ticker,
        start_date,
        end_date,
    };
    let provider = data::YahooProvider::new();

    let result = pipeline::run_prediction(&provider, artifacts, request).await?;
    pipeline::print_report(&result);

    if let Some(path) = args.plot_out {
        let b64 = result
            .plot
            .strip_prefix(plot::PNG_DATA_URI_PREFIX)
            .unwrap_or(&result.plot);
        let png = base64::engine::general_purpose::STANDARD.decode(b64)?;
        std::fs::write(&path, png)?;
        info!("Saved comparison plot to {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lstm_stock_predictor=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();
    let args = Args::parse();

    let artifacts_dir = config::resolve_artifacts_dir(args.artifacts_dir.clone());
    let artifacts = match ModelArtifacts::load(&artifacts_dir, args.cuda) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            error!("Failed to load model artifacts: {}", e);
            return Err(e);
        }
    };

    if let Some(ticker) = args.predict.clone() {
        if let Err(e) = run_once(args, artifacts, ticker).await {
            error!("Prediction failed: {}", e);
            return Err(e);
        }
        return Ok(());
    }

    let logger = prediction_log::PredictionLogger::new(config::resolve_log_dir(args.log_dir.clone()))?;
    info!("Writing prediction logs to {}", logger.dir().display());

    let state = server::WebState {
        artifacts,
        provider: Arc::new(data::YahooProvider::new()),
        logger: Arc::new(logger),
    };
    let port = config::resolve_port(args.port);
    if let Err(e) = server::run_server(port, state).await {
        error!("Server failed: {}", e);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range_is_one_year_before_end() {
        let (start, end) = default_range(None, Some("2025-03-01".to_string())).unwrap();
        assert_eq!(end, "2025-03-01");
        assert_eq!(start, "2024-03-01");
    }

    #[test]
    fn test_explicit_range_is_kept() {
        let (start, end) = default_range(Some("2020-01-01".to_string()), Some("2021-01-01".to_string())).unwrap();
        assert_eq!((start.as_str(), end.as_str()), ("2020-01-01", "2021-01-01"));
    }

    #[test]
    fn test_unparseable_end_date_is_rejected_not_replaced() {
        let err = default_range(None, Some("2025-13-45".to_string())).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("2025-13-45"));

        // With an explicit start the raw end date reaches request validation.
        let (start_date, end_date) = default_range(Some("2024-01-01".to_string()), Some("garbage".to_string())).unwrap();
        assert_eq!(end_date, "garbage");
        let request = pipeline::PredictionRequest {
            ticker: "AAPL".to_string(),
            start_date,
            end_date,
        };
        assert!(request.validate().unwrap_err().is_client_error());
    }

    #[test]
    fn test_args_parse_one_shot_prediction() {
        let args = Args::parse_from([
            "lstm-stock-predictor",
            "--predict",
            "VALE3",
            "--start-date",
            "2024-01-01",
            "--cuda",
        ]);
        assert_eq!(args.predict.as_deref(), Some("VALE3"));
        assert_eq!(args.start_date.as_deref(), Some("2024-01-01"));
        assert!(args.cuda);
        assert!(args.port.is_none());
    }
}
