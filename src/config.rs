use candle_core::Device;
use std::path::PathBuf;
use tracing::{info, warn};

pub fn project_root_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn project_file_path(file_name: &str) -> PathBuf {
    project_root_path().join(file_name)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Directory holding `stock_lstm.safetensors` and `scaler.json`.
///
/// Resolution order: explicit CLI value, `PREDICTOR_ARTIFACTS_DIR`, then
/// `artifacts/` under the project root.
pub fn resolve_artifacts_dir(cli_value: Option<PathBuf>) -> PathBuf {
    cli_value
        .or_else(|| env_path("PREDICTOR_ARTIFACTS_DIR"))
        .unwrap_or_else(|| project_file_path(ARTIFACTS_DIR))
}

/// Directory where per-request prediction logs are written.
pub fn resolve_log_dir(cli_value: Option<PathBuf>) -> PathBuf {
    cli_value
        .or_else(|| env_path("PREDICTOR_LOG_DIR"))
        .unwrap_or_else(|| PathBuf::from(LOG_DIR))
}

pub fn resolve_port(cli_value: Option<u16>) -> u16 {
    cli_value
        .or_else(|| {
            std::env::var("PREDICTOR_PORT")
                .ok()
                .and_then(|v| v.trim().parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT)
}

pub fn get_device(use_cuda: bool) -> Device {
    if use_cuda {
        #[cfg(feature = "cuda")]
        {
            match Device::new_cuda(0) {
                Ok(device) => {
                    info!("Using CUDA device 0");
                    return device;
                }
                Err(e) => {
                    warn!("Failed to initialize CUDA: {}. Falling back to CPU.", e);
                }
            }
        }
        #[cfg(not(feature = "cuda"))]
        {
            warn!("--cuda flag set but binary was compiled without the 'cuda' feature. Falling back to CPU.");
        }
    }

    #[cfg(feature = "mkl")]
    info!("Using CPU device with Intel MKL BLAS acceleration");

    #[cfg(not(feature = "mkl"))]
    info!("Using CPU device");

    info!("CPU threads available: {}", num_cpus::get());

    Device::Cpu
}

// ── Model architecture ──────────────────────────────────────────────────────
/// Closing price is the only feature fed per time step.
pub const INPUT_DIM: usize = 1;
pub const HIDDEN_DIM: usize = 64;
pub const LSTM_LAYERS: usize = 2;
/// Number of past closes in one inference window.
pub const WINDOW_LENGTH: usize = 50;

// ── Artifacts ───────────────────────────────────────────────────────────────
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const MODEL_WEIGHTS_FILE: &str = "stock_lstm.safetensors";
pub const SCALER_FILE: &str = "scaler.json";

// ── Data provider ───────────────────────────────────────────────────────────
/// Suffix tried once when a bare ticker yields no data (B3 / São Paulo listings).
pub const REGIONAL_SUFFIX: &str = ".SA";
pub const PROVIDER_TIMEOUT_SECS: u64 = 15;

// ── Metrics ─────────────────────────────────────────────────────────────────
/// Lower clip applied to the true value in the MAPE denominator.
pub const MAPE_EPSILON: f64 = 1e-8;

// ── Service ─────────────────────────────────────────────────────────────────
pub const DEFAULT_PORT: u16 = 8000;
pub const LOG_DIR: &str = "logs";
pub const RECENT_LOGS_DEFAULT: usize = 10;

// ── Plot ────────────────────────────────────────────────────────────────────
pub const PLOT_WIDTH: u32 = 1400;
pub const PLOT_HEIGHT: u32 = 600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_value_wins_over_default() {
        let dir = resolve_artifacts_dir(Some(PathBuf::from("/tmp/custom-artifacts")));
        assert_eq!(dir, PathBuf::from("/tmp/custom-artifacts"));

        assert_eq!(resolve_port(Some(9001)), 9001);
    }

    #[test]
    fn test_default_artifacts_dir_is_under_project_root() {
        let dir = project_file_path(ARTIFACTS_DIR);
        assert!(dir.starts_with(project_root_path()));
        assert!(dir.ends_with(ARTIFACTS_DIR));
    }
}
