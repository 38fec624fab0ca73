use crate::config::{PROVIDER_TIMEOUT_SECS, REGIONAL_SUFFIX};
use crate::error::{PredictError, PredictResult};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::future::Future;
use tracing::{info, warn};

/// One daily close.
#[derive(Clone, Debug, PartialEq)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closes for a symbol, ascending by date.
#[derive(Clone, Debug)]
pub struct PriceSeries {
    /// Symbol the provider actually answered for (may carry the regional suffix).
    pub symbol: String,
    pub history: Vec<ClosePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, mut history: Vec<ClosePoint>) -> Self {
        history.sort_by_key(|p| p.date);
        history.dedup_by_key(|p| p.date);
        Self {
            symbol: symbol.into(),
            history,
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.history.iter().map(|p| p.close).collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.history.last().map(|p| p.close)
    }
}

/// Source of daily closing prices.
///
/// Implementations return `Ok(vec![])` when the provider has nothing for the
/// symbol and reserve `Err` for transport or decoding failures.
pub trait PriceProvider: Send + Sync {
    fn fetch_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = PredictResult<Vec<ClosePoint>>> + Send;
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooChartError>,
}

#[derive(Deserialize, Debug)]
struct YahooChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Daily closes from the Yahoo Finance chart API.
#[derive(Clone, Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Self {
        Self::with_base_url("https://query1.finance.yahoo.com")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceProvider for YahooProvider {
    async fn fetch_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PredictResult<Vec<ClosePoint>> {
        // Yahoo treats period2 as exclusive, so `end` is not included.
        let period1 = start.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp()).unwrap_or(0);
        let period2 = end.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp()).unwrap_or(0);
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            self.base_url, symbol, period1, period2
        );

        let retrieval_err = |message: String| PredictError::Retrieval {
            symbol: symbol.to_string(),
            message,
        };

        let resp = self
            .client
            .get(&url)
            .header("User-Agent", "Mozilla/5.0")
            .timeout(std::time::Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| retrieval_err(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| retrieval_err(e.to_string()))?;

        // Unknown symbols come back as 404 with a chart.error body.
        match serde_json::from_str::<YahooChartResponse>(&body) {
            Ok(parsed) => Ok(parse_chart_response(symbol, parsed)),
            Err(_) if status == reqwest::StatusCode::NOT_FOUND => Ok(Vec::new()),
            Err(e) => Err(retrieval_err(format!("HTTP {}: {}", status, e))),
        }
    }
}

fn parse_chart_response(symbol: &str, response: YahooChartResponse) -> Vec<ClosePoint> {
    if let Some(err) = &response.chart.error {
        warn!(
            "Yahoo chart error for {}: {} ({})",
            symbol,
            err.description.as_deref().unwrap_or("no description"),
            err.code.as_deref().unwrap_or("no code")
        );
    }

    let Some(result) = response.chart.result.as_ref().and_then(|r| r.first()) else {
        return Vec::new();
    };
    let Some(quote) = result.indicators.quote.first() else {
        return Vec::new();
    };

    result
        .timestamp
        .iter()
        .zip(quote.close.iter())
        .filter_map(|(&ts, close)| {
            let close = (*close)?;
            if !close.is_finite() {
                return None;
            }
            let date = DateTime::from_timestamp(ts, 0)?.date_naive();
            Some(ClosePoint { date, close })
        })
        .collect()
}

fn has_market_suffix(symbol: &str) -> bool {
    symbol.contains('.')
}

/// Fetches the close series for `symbol`, retrying once with the regional
/// suffix when a bare ticker yields nothing.
pub async fn load_price_series<P: PriceProvider>(
    provider: &P,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> PredictResult<PriceSeries> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(PredictError::invalid("ticker is required"));
    }

    let first = provider.fetch_closes(&symbol, start, end).await;
    match first {
        Ok(points) if !points.is_empty() => {
            info!("Fetched {} closes for {}", points.len(), symbol);
            return Ok(PriceSeries::new(symbol, points));
        }
        Ok(_) if has_market_suffix(&symbol) => {
            return Err(PredictError::NoData { symbol });
        }
        Err(e) if has_market_suffix(&symbol) => return Err(e),
        Ok(_) => warn!(
            "Ticker '{}' returned no data. Retrying as '{}{}'",
            symbol, symbol, REGIONAL_SUFFIX
        ),
        Err(e) => warn!(
            "Fetching '{}' failed ({}). Retrying as '{}{}'",
            symbol, e, symbol, REGIONAL_SUFFIX
        ),
    }

    let suffixed = format!("{}{}", symbol, REGIONAL_SUFFIX);
    let points = provider.fetch_closes(&suffixed, start, end).await?;
    if points.is_empty() {
        return Err(PredictError::NoData { symbol: suffixed });
    }
    info!("Fetched {} closes for {}", points.len(), suffixed);
    Ok(PriceSeries::new(suffixed, points))
}

#[cfg(test)]
impl PriceSeries {
    /// Random-walk series starting at 100.0, one point per day.
    pub fn new_mock(symbol: &str, days: usize) -> Self {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut price: f64 = 100.0;
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let history = (0..days)
            .map(|i| {
                let change_pct: f64 = rng.gen_range(-0.02..0.02);
                price *= 1.0 + change_pct;
                ClosePoint {
                    date: start + chrono::Duration::days(i as i64),
                    close: price,
                }
            })
            .collect();
        Self::new(symbol, history)
    }

    pub fn from_closes(symbol: &str, closes: &[f64]) -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let history = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| ClosePoint {
                date: start + chrono::Duration::days(i as i64),
                close,
            })
            .collect();
        Self::new(symbol, history)
    }
}
