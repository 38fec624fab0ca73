use thiserror::Error;

/// Request-scoped failures of the prediction pipeline.
///
/// Every variant is recoverable: the serving process keeps handling later
/// requests no matter which of these a single request produced.
#[derive(Debug, Error)]
pub enum PredictError {
    /// Malformed request (bad dates, wrong ordering, empty ticker, ...).
    #[error("{0}")]
    InvalidInput(String),

    /// Not enough points to build a single window.
    #[error("insufficient data: need at least {required} points, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// The provider answered but had nothing for the symbol, even after the regional fallback.
    #[error("no data returned for {symbol}; check that the ticker is correct")]
    NoData { symbol: String },

    /// Transport or decoding failure talking to the market-data provider.
    #[error("failed to retrieve data for {symbol}: {message}")]
    Retrieval { symbol: String, message: String },

    #[error("model is not available: {0}")]
    ModelUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PredictError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    /// True for errors caused by the caller's input rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InsufficientData { .. })
    }
}

impl From<candle_core::Error> for PredictError {
    fn from(err: candle_core::Error) -> Self {
        Self::Internal(format!("tensor computation failed: {err}"))
    }
}

pub type PredictResult<T> = std::result::Result<T, PredictError>;
