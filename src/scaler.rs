use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Min-max mapping of a series onto [0, 1].
///
/// A constant series (max == min) maps every value to 0.5, and the inverse
/// maps everything back to that constant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: f64,
    pub data_max: f64,
}

impl MinMaxScaler {
    /// Fits the mapping to `values`. Returns `None` for an empty slice or
    /// when any value is non-finite.
    pub fn fit(values: &[f64]) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let data_min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let data_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self { data_min, data_max })
    }

    pub fn range(&self) -> f64 {
        self.data_max - self.data_min
    }

    fn is_degenerate(&self) -> bool {
        self.range() == 0.0
    }

    pub fn transform_one(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            return 0.5;
        }
        (value - self.data_min) / self.range()
    }

    pub fn inverse_one(&self, scaled: f64) -> f64 {
        if self.is_degenerate() {
            return self.data_min;
        }
        scaled * self.range() + self.data_min
    }

    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform_one(v)).collect()
    }

    pub fn inverse_transform(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&v| self.inverse_one(v)).collect()
    }

    /// Loads the training-time scaler artifact (`{"data_min": .., "data_max": ..}`).
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("cannot open scaler artifact {}: {}", path.display(), e))?;
        let scaler: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| anyhow::anyhow!("malformed scaler artifact {}: {}", path.display(), e))?;
        if !scaler.data_min.is_finite() || !scaler.data_max.is_finite() || scaler.data_max < scaler.data_min {
            anyhow::bail!(
                "scaler artifact {} has an invalid range [{}, {}]",
                path.display(),
                scaler.data_min,
                scaler.data_max
            );
        }
        Ok(scaler)
    }
}

#[cfg(test)]
impl MinMaxScaler {
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_maps_onto_unit_interval() {
        let values = [10.0, 15.0, 20.0, 12.5];
        let scaler = MinMaxScaler::fit(&values).unwrap();

        let scaled = scaler.transform(&values);

        assert_eq!(scaled, vec![0.0, 0.5, 1.0, 0.25]);
    }

    #[test]
    fn test_round_trip_recovers_original_values() {
        let values = [101.37, 99.12, 104.88, 87.5, 120.01, 100.0];
        let scaler = MinMaxScaler::fit(&values).unwrap();

        let restored = scaler.inverse_transform(&scaler.transform(&values));

        for (orig, back) in values.iter().zip(restored.iter()) {
            assert!((orig - back).abs() < 1e-9, "{} != {}", orig, back);
        }
    }

    #[test]
    fn test_constant_series_maps_to_midpoint() {
        let values = [42.0; 5];
        let scaler = MinMaxScaler::fit(&values).unwrap();

        assert_eq!(scaler.transform(&values), vec![0.5; 5]);
        assert_eq!(scaler.inverse_one(0.5), 42.0);
        assert_eq!(scaler.inverse_one(0.9), 42.0);
    }

    #[test]
    fn test_fit_rejects_empty_and_non_finite() {
        assert!(MinMaxScaler::fit(&[]).is_none());
        assert!(MinMaxScaler::fit(&[1.0, f64::NAN]).is_none());
    }

    #[test]
    fn test_artifact_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        let scaler = MinMaxScaler { data_min: 5.5, data_max: 48.25 };

        scaler.save(&path).unwrap();
        let loaded = MinMaxScaler::load(&path).unwrap();

        assert_eq!(loaded, scaler);
    }

    #[test]
    fn test_load_rejects_inverted_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        std::fs::write(&path, r#"{"data_min": 10.0, "data_max": 1.0}"#).unwrap();

        assert!(MinMaxScaler::load(&path).is_err());
    }
}
