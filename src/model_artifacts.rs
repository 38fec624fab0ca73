use crate::config::{get_device, HIDDEN_DIM, INPUT_DIM, LSTM_LAYERS, MODEL_WEIGHTS_FILE, SCALER_FILE};
use crate::inference::Predictor;
use crate::scaler::MinMaxScaler;
use anyhow::Result;
use candle_core::DType;
use candle_nn::VarBuilder;
use safetensors::SafeTensors;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything loaded from the artifacts directory at startup.
pub struct ModelArtifacts {
    pub predictor: Predictor,
    /// Scaler fitted at training time. Only the raw-window endpoint uses it;
    /// the range pipeline re-fits a scaler per request.
    pub training_scaler: MinMaxScaler,
    pub weights_path: PathBuf,
    pub scaler_path: PathBuf,
}

/// Tensor names and shapes the network expects in the weights file.
fn expected_tensors() -> Vec<(String, Vec<usize>)> {
    let mut out = Vec::new();
    for layer in 0..LSTM_LAYERS {
        let in_dim = if layer == 0 { INPUT_DIM } else { HIDDEN_DIM };
        out.push((format!("lstm.weight_ih_l{}", layer), vec![4 * HIDDEN_DIM, in_dim]));
        out.push((format!("lstm.weight_hh_l{}", layer), vec![4 * HIDDEN_DIM, HIDDEN_DIM]));
        out.push((format!("lstm.bias_ih_l{}", layer), vec![4 * HIDDEN_DIM]));
        out.push((format!("lstm.bias_hh_l{}", layer), vec![4 * HIDDEN_DIM]));
    }
    out.push(("fc.weight".to_string(), vec![1, HIDDEN_DIM]));
    out.push(("fc.bias".to_string(), vec![1]));
    out
}

fn validate_weights_file(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)
        .map_err(|e| anyhow::anyhow!("{} is not a valid safetensors file: {}", path.display(), e))?;

    for (name, shape) in expected_tensors() {
        let view = tensors
            .tensor(&name)
            .map_err(|_| anyhow::anyhow!("{} is missing tensor '{}'", path.display(), name))?;
        if view.shape() != shape.as_slice() {
            anyhow::bail!(
                "tensor '{}' in {} has shape {:?}, expected {:?}",
                name,
                path.display(),
                view.shape(),
                shape
            );
        }
    }
    Ok(())
}

impl ModelArtifacts {
    /// Loads `stock_lstm.safetensors` and `scaler.json` from `dir`.
    /// A missing or malformed artifact is an error; callers treat it as fatal.
    pub fn load(dir: &Path, use_cuda: bool) -> Result<Self> {
        let weights_path = dir.join(MODEL_WEIGHTS_FILE);
        let scaler_path = dir.join(SCALER_FILE);

        if !weights_path.is_file() || !scaler_path.is_file() {
            anyhow::bail!(
                "model artifacts not found in {} (expected {} and {}). Train the model and export the artifacts first.",
                dir.display(),
                MODEL_WEIGHTS_FILE,
                SCALER_FILE
            );
        }

        validate_weights_file(&weights_path)?;
        let training_scaler = MinMaxScaler::load(&scaler_path)?;

        let device = get_device(use_cuda);
        // SAFETY: the weights file is treated as read-only for the lifetime of the process.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device)? };
        let predictor = Predictor::new(vb, device)?;

        info!(
            "Loaded model weights from {} and training scaler from {}",
            weights_path.display(),
            scaler_path.display()
        );

        Ok(Self {
            predictor,
            training_scaler,
            weights_path,
            scaler_path,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inference::tests::random_predictor;

    /// Writes a randomly initialised model and a scaler into `dir`.
    pub fn write_test_artifacts(dir: &Path, scaler: MinMaxScaler) {
        let (varmap, _predictor) = random_predictor();
        varmap.save(dir.join(MODEL_WEIGHTS_FILE)).unwrap();
        scaler.save(&dir.join(SCALER_FILE)).unwrap();
    }

    #[test]
    fn test_load_round_trips_saved_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let scaler = MinMaxScaler { data_min: 10.0, data_max: 50.0 };
        write_test_artifacts(dir.path(), scaler);

        let artifacts = ModelArtifacts::load(dir.path(), false).unwrap();

        assert_eq!(artifacts.training_scaler, scaler);
        assert!(artifacts.weights_path.ends_with(MODEL_WEIGHTS_FILE));
        let pred = artifacts.predictor.predict_next(&[0.2; 50]).unwrap();
        assert!(pred.is_finite());
    }

    #[test]
    fn test_missing_scaler_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (varmap, _predictor) = random_predictor();
        varmap.save(dir.path().join(MODEL_WEIGHTS_FILE)).unwrap();

        let err = ModelArtifacts::load(dir.path(), false).err().unwrap();

        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_weights_with_wrong_layout_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = candle_core::Tensor::zeros((3, 3), DType::F32, &candle_core::Device::Cpu).unwrap();
        let tensors = std::collections::HashMap::from([("fc.weight".to_string(), bogus)]);
        candle_core::safetensors::save(&tensors, dir.path().join(MODEL_WEIGHTS_FILE)).unwrap();
        MinMaxScaler { data_min: 0.0, data_max: 1.0 }
            .save(&dir.path().join(SCALER_FILE))
            .unwrap();

        let err = ModelArtifacts::load(dir.path(), false).err().unwrap();

        assert!(err.to_string().contains("missing tensor"));
    }
}
