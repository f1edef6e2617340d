use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Feature scaling fitted at training time. Applied to every input before it
/// reaches the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureScaler {
    /// `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// `(x - data_min) / (data_max - data_min)`, mapped onto `feature_range`.
    MinMax {
        data_min: Vec<f64>,
        data_max: Vec<f64>,
        #[serde(default = "unit_range")]
        feature_range: (f64, f64),
    },
}

fn unit_range() -> (f64, f64) {
    (0.0, 1.0)
}

impl FeatureScaler {
    pub fn n_features(&self) -> usize {
        match self {
            FeatureScaler::Standard { mean, .. } => mean.len(),
            FeatureScaler::MinMax { data_min, .. } => data_min.len(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (a, b) = match self {
            FeatureScaler::Standard { mean, scale } => (mean.len(), scale.len()),
            FeatureScaler::MinMax {
                data_min, data_max, ..
            } => (data_min.len(), data_max.len()),
        };
        if a == 0 || a != b {
            bail!("scaler parameter lengths mismatch ({a} vs {b})");
        }
        Ok(())
    }

    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.n_features() {
            bail!(
                "scaler expects {} features, got {}",
                self.n_features(),
                features.len()
            );
        }

        let scaled = match self {
            FeatureScaler::Standard { mean, scale } => features
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| (x - m) / non_zero(*s))
                .collect(),
            FeatureScaler::MinMax {
                data_min,
                data_max,
                feature_range: (lo, hi),
            } => features
                .iter()
                .zip(data_min.iter().zip(data_max))
                .map(|(x, (min, max))| (x - min) / non_zero(max - min) * (hi - lo) + lo)
                .collect(),
        };
        Ok(scaled)
    }
}

// Constant training features have zero spread; leave them unscaled.
fn non_zero(value: f64) -> f64 {
    if value == 0.0 {
        1.0
    } else {
        value
    }
}
