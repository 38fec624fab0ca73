use crate::metrics::{round_to, RegressionMetrics};
use crate::pipeline::{PredictionRequest, PredictionResult};
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const LOG_FILE_PREFIX: &str = "prediction_";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRequest {
    pub ticker: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogExecution {
    pub duration_seconds: f64,
    pub success: bool,
}

/// Result summary kept in the log; the plot is left out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogResult {
    pub last_close: f64,
    pub next_price: f64,
    pub price_change: f64,
    pub price_change_pct: f64,
    pub data_points: usize,
    pub metrics: RegressionMetrics,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictionLogEntry {
    pub timestamp: String,
    pub request: LogRequest,
    pub execution: LogExecution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<LogResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionLogEntry {
    pub fn new(
        request: &PredictionRequest,
        outcome: std::result::Result<&PredictionResult, &str>,
        duration: Duration,
    ) -> Self {
        let (success, result, error) = match outcome {
            Ok(r) => (
                true,
                Some(LogResult {
                    last_close: r.last_close,
                    next_price: r.next_price,
                    price_change: r.price_change,
                    price_change_pct: r.price_change_pct,
                    data_points: r.data_points,
                    metrics: r.metrics,
                }),
                None,
            ),
            Err(message) => (false, None, Some(message.to_string())),
        };

        Self {
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            request: LogRequest {
                ticker: request.ticker.trim().to_string(),
                start_date: request.start_date.clone(),
                end_date: request.end_date.clone(),
            },
            execution: LogExecution {
                duration_seconds: round_to(duration.as_secs_f64(), 3),
                success,
            },
            result,
            error,
        }
    }

    /// UTC day (`YYYY-MM-DD`) of the timestamp.
    pub fn day(&self) -> &str {
        self.timestamp.split('T').next().unwrap_or(&self.timestamp)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogStats {
    pub total_predictions: usize,
    pub successful: usize,
    pub failed: usize,
    pub unique_tickers: usize,
    pub tickers: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Default)]
pub struct DashboardData {
    pub total_predictions: usize,
    pub successful: usize,
    pub failed: usize,
    /// Newest first.
    pub logs: Vec<PredictionLogEntry>,
    pub tickers_count: BTreeMap<String, usize>,
    pub daily_predictions: BTreeMap<String, usize>,
    pub execution_times: Vec<f64>,
    pub r2_scores: Vec<f64>,
    pub prediction_changes: Vec<f64>,
}

/// Writes one JSON document per prediction request into a directory.
#[derive(Clone, Debug)]
pub struct PredictionLogger {
    dir: PathBuf,
}

fn sanitize_for_file_name(ticker: &str) -> String {
    ticker
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

impl PredictionLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `entry` as `prediction_{TICKER}_{YYYYmmdd_HHMMSS}.json`, adding a
    /// numeric suffix when that name is already taken. Returns the file path
    /// and the entry timestamp.
    pub fn log_prediction(&self, entry: &PredictionLogEntry) -> Result<(PathBuf, String)> {
        let stem = format!(
            "{}{}_{}",
            LOG_FILE_PREFIX,
            sanitize_for_file_name(&entry.request.ticker),
            Utc::now().format("%Y%m%d_%H%M%S")
        );

        let mut attempt = 0;
        let (file, file_path) = loop {
            let file_name = if attempt == 0 {
                format!("{}.json", stem)
            } else {
                format!("{}_{}.json", stem, attempt)
            };
            let file_path = self.dir.join(file_name);
            match std::fs::OpenOptions::new().write(true).create_new(true).open(&file_path) {
                Ok(file) => break (file, file_path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };

        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, entry)?;

        Ok((file_path, entry.timestamp.clone()))
    }

    fn log_files(&self) -> Vec<PathBuf> {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension().is_some_and(|ext| ext == "json")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
            })
            .collect();
        files.sort();
        files
    }

    /// Every readable entry; malformed files are skipped with a warning.
    fn load_entries(&self) -> Vec<PredictionLogEntry> {
        let mut entries = Vec::new();
        for path in self.log_files() {
            let parsed = std::fs::File::open(&path)
                .map_err(anyhow::Error::from)
                .and_then(|f| {
                    serde_json::from_reader::<_, PredictionLogEntry>(std::io::BufReader::new(f))
                        .map_err(anyhow::Error::from)
                });
            match parsed {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Error processing {}: {}", path.display(), e),
            }
        }
        entries
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<PredictionLogEntry> {
        let mut entries = self.load_entries();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        entries
    }

    pub fn stats(&self) -> LogStats {
        let entries = self.load_entries();
        let successful = entries.iter().filter(|e| e.execution.success).count();
        let tickers: BTreeSet<String> = entries.iter().map(|e| e.request.ticker.clone()).collect();

        LogStats {
            total_predictions: entries.len(),
            successful,
            failed: entries.len() - successful,
            unique_tickers: tickers.len(),
            tickers: tickers.into_iter().collect(),
        }
    }

    pub fn dashboard(&self) -> DashboardData {
        let mut data = DashboardData::default();

        for entry in self.load_entries() {
            if entry.execution.success {
                data.successful += 1;
                if let Some(result) = &entry.result {
                    if result.metrics.r2.is_finite() {
                        data.r2_scores.push(result.metrics.r2);
                    }
                    data.prediction_changes.push(result.price_change_pct);
                }
            } else {
                data.failed += 1;
            }

            *data.tickers_count.entry(entry.request.ticker.clone()).or_insert(0) += 1;
            *data.daily_predictions.entry(entry.day().to_string()).or_insert(0) += 1;
            data.execution_times.push(entry.execution.duration_seconds);
            data.logs.push(entry);
        }

        data.total_predictions = data.logs.len();
        data.logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ticker: &str) -> PredictionRequest {
        PredictionRequest {
            ticker: ticker.to_string(),
            start_date: "2024-01-01".to_string(),
            end_date: "2024-12-31".to_string(),
        }
    }

    fn result(ticker: &str, r2: f64, change_pct: f64) -> PredictionResult {
        PredictionResult {
            ticker: ticker.to_string(),
            start_date: "2024-01-01".to_string(),
            end_date: "2024-12-31".to_string(),
            last_close: 10.0,
            next_price: 10.5,
            price_change: 0.5,
            price_change_pct: change_pct,
            metrics: RegressionMetrics { mse: 0.01, mae: 0.05, rmse: 0.1, mape: 3.2, r2 },
            data_points: 200,
            plot: "data:image/png;base64,AAAA".to_string(),
        }
    }

    fn entry_at(timestamp: &str, ticker: &str, success: bool) -> PredictionLogEntry {
        let req = request(ticker);
        let res = result(ticker, 0.9, 1.0);
        let outcome = if success { Ok(&res) } else { Err("No data returned") };
        let mut entry = PredictionLogEntry::new(&req, outcome, Duration::from_millis(1234));
        entry.timestamp = timestamp.to_string();
        entry
    }

    #[test]
    fn test_entry_shape_for_success_and_failure() {
        let req = request("ABEV3");
        let res = result("ABEV3", 0.8123, 2.5);

        let ok = PredictionLogEntry::new(&req, Ok(&res), Duration::from_millis(1500));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["execution"]["success"], true);
        assert_eq!(json["execution"]["duration_seconds"], 1.5);
        assert_eq!(json["result"]["metrics"]["R2"], 0.8123);
        assert!(json.get("error").is_none());
        assert!(json["result"].get("plot").is_none());
        assert!(ok.timestamp.ends_with('Z'));

        let failed = PredictionLogEntry::new(&req, Err("boom"), Duration::from_millis(10));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["execution"]["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_logged_entries_feed_stats() {
        let dir = tempfile::tempdir().unwrap();
        let logger = PredictionLogger::new(dir.path().join("logs")).unwrap();

        let (a, a_ts) = logger.log_prediction(&entry_at("2024-05-01T10:00:00.000000Z", "PETR4", true)).unwrap();
        let (b, _) = logger.log_prediction(&entry_at("2024-05-02T10:00:00.000000Z", "VALE3", false)).unwrap();
        assert_eq!(a_ts, "2024-05-01T10:00:00.000000Z");
        assert!(a.exists() && b.exists());
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("prediction_PETR4_"));

        let stats = logger.stats();
        assert_eq!(stats.total_predictions, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.tickers, vec!["PETR4".to_string(), "VALE3".to_string()]);
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let logger = PredictionLogger::new(dir.path()).unwrap();
        // ticker order in file names is the reverse of timestamp order
        logger.log_prediction(&entry_at("2024-05-03T00:00:00.000000Z", "AAA", true)).unwrap();
        logger.log_prediction(&entry_at("2024-05-01T00:00:00.000000Z", "ZZZ", true)).unwrap();
        logger.log_prediction(&entry_at("2024-05-02T00:00:00.000000Z", "MMM", true)).unwrap();

        let recent = logger.recent(2);

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].request.ticker, "AAA");
        assert_eq!(recent[1].request.ticker, "MMM");
    }

    #[test]
    fn test_dashboard_aggregates_and_skips_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let logger = PredictionLogger::new(dir.path()).unwrap();
        logger.log_prediction(&entry_at("2024-05-01T09:00:00.000000Z", "PETR4", true)).unwrap();
        logger.log_prediction(&entry_at("2024-05-01T11:00:00.000000Z", "PETR4", false)).unwrap();
        logger.log_prediction(&entry_at("2024-05-02T12:00:00.000000Z", "ITUB4", true)).unwrap();
        std::fs::write(dir.path().join("prediction_BROKEN_1.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let dash = logger.dashboard();

        assert_eq!(dash.total_predictions, 3);
        assert_eq!(dash.successful, 2);
        assert_eq!(dash.failed, 1);
        assert_eq!(dash.tickers_count["PETR4"], 2);
        assert_eq!(dash.daily_predictions["2024-05-01"], 2);
        assert_eq!(dash.daily_predictions["2024-05-02"], 1);
        assert_eq!(dash.execution_times.len(), 3);
        assert_eq!(dash.r2_scores, vec![0.9, 0.9]);
        assert_eq!(dash.prediction_changes.len(), 2);
        assert_eq!(dash.logs[0].timestamp, "2024-05-02T12:00:00.000000Z");
    }

    #[test]
    fn test_missing_directory_yields_empty_summary() {
        let dir = tempfile::tempdir().unwrap();
        let logger = PredictionLogger::new(dir.path().join("logs")).unwrap();
        std::fs::remove_dir_all(logger.dir()).unwrap();

        let dash = logger.dashboard();

        assert_eq!(dash.total_predictions, 0);
        assert!(dash.logs.is_empty());
        assert_eq!(logger.stats().total_predictions, 0);
    }

    #[test]
    fn test_nan_r2_survives_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let logger = PredictionLogger::new(dir.path()).unwrap();
        let req = request("FLAT");
        let res = result("FLAT", f64::NAN, 0.0);
        logger
            .log_prediction(&PredictionLogEntry::new(&req, Ok(&res), Duration::from_millis(5)))
            .unwrap();

        let recent = logger.recent(1);

        assert!(recent[0].result.as_ref().unwrap().metrics.r2.is_nan());
        assert!(logger.dashboard().r2_scores.is_empty());
    }

    #[test]
    fn test_file_names_are_sanitized() {
        assert_eq!(sanitize_for_file_name("BRK/B"), "BRK_B");
        assert_eq!(sanitize_for_file_name("PETR4.SA"), "PETR4.SA");
    }
}
