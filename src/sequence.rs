use crate::error::{PredictError, PredictResult};

/// Overlapping one-step-ahead windows over a scaled series.
#[derive(Clone, Debug)]
pub struct WindowedDataset {
    pub window: usize,
    pub inputs: Vec<Vec<f64>>, // [count][window]
    pub targets: Vec<f64>,     // [count]
}

impl WindowedDataset {
    /// Builds `values.len() - window` pairs where input `i` is
    /// `values[i..i + window]` and target `i` is `values[i + window]`.
    pub fn build(values: &[f64], window: usize) -> PredictResult<Self> {
        if window == 0 {
            return Err(PredictError::invalid("window length must be positive"));
        }
        if values.len() <= window {
            return Err(PredictError::InsufficientData {
                required: window + 1,
                available: values.len(),
            });
        }

        let count = values.len() - window;
        let mut inputs = Vec::with_capacity(count);
        let mut targets = Vec::with_capacity(count);
        for i in 0..count {
            inputs.push(values[i..i + window].to_vec());
            targets.push(values[i + window]);
        }

        Ok(Self { window, inputs, targets })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Row-major `[count * window]` buffer for a `(count, window, 1)` tensor.
    pub fn flat_inputs(&self) -> Vec<f32> {
        self.inputs
            .iter()
            .flat_map(|w| w.iter().map(|&v| v as f32))
            .collect()
    }
}

/// The most recent `window` values, used for the next-step prediction.
pub fn tail_window(values: &[f64], window: usize) -> PredictResult<&[f64]> {
    if window == 0 || values.len() < window {
        return Err(PredictError::InsufficientData {
            required: window.max(1),
            available: values.len(),
        });
    }
    Ok(&values[values.len() - window..])
}
