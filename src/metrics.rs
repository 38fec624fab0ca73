use crate::config::MAPE_EPSILON;
use serde::{Deserialize, Deserializer, Serialize};

/// Goodness-of-fit over aligned true/predicted arrays.
///
/// Field names match the JSON contract (`MSE`, `MAE`, `RMSE`, `MAPE`, `R2`).
/// An undefined R² is NaN in memory and `null` on the wire.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RegressionMetrics {
    #[serde(rename = "MSE")]
    pub mse: f64,
    #[serde(rename = "MAE")]
    pub mae: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    /// Percent.
    #[serde(rename = "MAPE")]
    pub mape: f64,
    #[serde(rename = "R2", deserialize_with = "nan_from_null")]
    pub r2: f64,
}

fn nan_from_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl RegressionMetrics {
    /// Computes the metrics; `y_true` and `y_pred` must have the same
    /// non-zero length. Returns `None` otherwise.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Option<Self> {
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return None;
        }
        let n = y_true.len() as f64;

        let mut ss_res = 0.0;
        let mut abs_sum = 0.0;
        let mut pct_sum = 0.0;
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            let err = t - p;
            ss_res += err * err;
            abs_sum += err.abs();
            pct_sum += (err / t.max(MAPE_EPSILON)).abs();
        }

        let mse = ss_res / n;
        let mean_true = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean_true).powi(2)).sum();
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { f64::NAN };

        Some(Self {
            mse,
            mae: abs_sum / n,
            rmse: mse.sqrt(),
            mape: pct_sum / n * 100.0,
            r2,
        })
    }

    /// Rounded copy for reporting: 6 decimals for the error terms, 2 for MAPE, 4 for R².
    pub fn rounded(&self) -> Self {
        Self {
            mse: round_to(self.mse, 6),
            mae: round_to(self.mae, 6),
            rmse: round_to(self.rmse, 6),
            mape: round_to(self.mape, 2),
            r2: round_to(self.r2, 4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_known_values() {
        let y_true = [0.5, 0.25, 1.0, 0.75];
        let y_pred = [0.4, 0.25, 0.8, 0.85];

        let m = RegressionMetrics::compute(&y_true, &y_pred).unwrap();

        // errors: 0.1, 0, 0.2, -0.1
        assert!((m.mse - 0.015).abs() < 1e-12);
        assert!((m.mae - 0.1).abs() < 1e-12);
        assert!((m.rmse - 0.015f64.sqrt()).abs() < 1e-12);
        let expected_mape = (0.1 / 0.5 + 0.0 + 0.2 / 1.0 + 0.1 / 0.75) / 4.0 * 100.0;
        assert!((m.mape - expected_mape).abs() < 1e-9);
        // mean 0.625, ss_tot = 0.015625 + 0.140625 + 0.140625 + 0.015625
        let expected_r2 = 1.0 - 0.06 / 0.3125;
        assert!((m.r2 - expected_r2).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_prediction_has_unit_r2() {
        let y = [0.1, 0.4, 0.35, 0.9, 0.0];

        let m = RegressionMetrics::compute(&y, &y).unwrap();

        assert_eq!(m.r2, 1.0);
        assert_eq!(m.mse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.mape, 0.0);
    }

    #[test]
    fn test_error_metrics_are_non_negative() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let n = rng.gen_range(1..40);
            let y_true: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let y_pred: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();

            let m = RegressionMetrics::compute(&y_true, &y_pred).unwrap();

            assert!(m.mse >= 0.0 && m.mae >= 0.0 && m.rmse >= 0.0 && m.mape >= 0.0);
            assert!((m.rmse * m.rmse - m.mse).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_truth_gives_nan_r2() {
        let m = RegressionMetrics::compute(&[0.5, 0.5, 0.5], &[0.4, 0.5, 0.6]).unwrap();
        assert!(m.r2.is_nan());
    }

    #[test]
    fn test_zero_truth_is_clipped_in_mape() {
        let m = RegressionMetrics::compute(&[0.0, 1.0], &[0.0, 1.0]).unwrap();
        assert_eq!(m.mape, 0.0);

        let m = RegressionMetrics::compute(&[0.0], &[1e-9]).unwrap();
        assert!((m.mape - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_or_empty_inputs() {
        assert!(RegressionMetrics::compute(&[], &[]).is_none());
        assert!(RegressionMetrics::compute(&[1.0, 2.0], &[1.0]).is_none());
    }

    #[test]
    fn test_rounding_and_nan_serialization() {
        let m = RegressionMetrics {
            mse: 0.001234567,
            mae: 0.0123456789,
            rmse: 0.035136,
            mape: 4.56789,
            r2: f64::NAN,
        }
        .rounded();

        assert_eq!(m.mse, 0.001235);
        assert_eq!(m.mae, 0.012346);
        assert_eq!(m.mape, 4.57);

        let json = serde_json::to_value(m).unwrap();
        assert!(json["R2"].is_null());
        assert_eq!(json["MAPE"], 4.57);

        let back: RegressionMetrics = serde_json::from_value(json).unwrap();
        assert!(back.r2.is_nan());
    }
}
