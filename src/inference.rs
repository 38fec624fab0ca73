use crate::config::{HIDDEN_DIM, INPUT_DIM, LSTM_LAYERS};
use crate::error::{PredictError, PredictResult};
use crate::models::stock_lstm::StockLstm;
use crate::sequence::WindowedDataset;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use tracing::debug;

/// Frozen network plus the device it lives on. Read-only after construction,
/// so one instance is shared across all requests.
pub struct Predictor {
    model: StockLstm,
    device: Device,
}

impl Predictor {
    pub fn new(vb: VarBuilder, device: Device) -> candle_core::Result<Self> {
        let model = StockLstm::new(INPUT_DIM, HIDDEN_DIM, LSTM_LAYERS, vb)?;
        Ok(Self { model, device })
    }

    /// Runs every window through the network in a single batch.
    /// Returns one scaled-domain prediction per window, in window order.
    pub fn predict_windows(&self, dataset: &WindowedDataset) -> PredictResult<Vec<f64>> {
        if dataset.is_empty() {
            return Err(PredictError::InsufficientData {
                required: dataset.window + 1,
                available: dataset.window,
            });
        }
        let input = Tensor::from_vec(
            dataset.flat_inputs(),
            (dataset.len(), dataset.window, INPUT_DIM),
            &self.device,
        )?;
        let out = self.model.forward(&input)?;
        let preds = out.flatten_all()?.to_vec1::<f32>()?;
        debug!("Batch inference produced {} predictions", preds.len());
        ensure_finite(&preds)?;
        Ok(preds.into_iter().map(f64::from).collect())
    }

    /// Predicts the value following `window` (scaled domain).
    pub fn predict_next(&self, window: &[f64]) -> PredictResult<f64> {
        if window.is_empty() {
            return Err(PredictError::invalid("cannot predict from an empty window"));
        }
        let values: Vec<f32> = window.iter().map(|&v| v as f32).collect();
        let input = Tensor::from_vec(values, (1, window.len(), INPUT_DIM), &self.device)?;
        let out = self.model.forward(&input)?;
        let pred = out.flatten_all()?.to_vec1::<f32>()?;
        ensure_finite(&pred)?;
        pred.first()
            .map(|&v| f64::from(v))
            .ok_or_else(|| PredictError::internal("model returned no output"))
    }
}

/// NaN or infinite outputs mean the loaded weights are corrupt.
fn ensure_finite(preds: &[f32]) -> PredictResult<()> {
    if preds.iter().all(|p| p.is_finite()) {
        Ok(())
    } else {
        Err(PredictError::ModelUnavailable(
            "model produced non-finite predictions; the weights may be corrupt".to_string(),
        ))
    }
}
