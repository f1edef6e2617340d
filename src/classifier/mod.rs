mod lstm;
mod scaler;

pub use lstm::LstmModel;
pub use scaler::FeatureScaler;

use std::{fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};

use crate::db::Category;
use crate::error::MonitorError;

/// Maps a windowed rate to a clinical category.
///
/// `Ok(None)` means no classification was produced; the caller must not
/// invent one.
pub trait Classifier: Send + Sync {
    fn classify(&self, window_secs: u32, stored_rate: u32) -> Result<Option<Category>, MonitorError>;
}

/// A pretrained model taking a sequence of feature vectors and returning
/// per-class probabilities.
pub trait SequenceModel: Send + Sync {
    fn predict(&self, sequence: &[Vec<f64>]) -> Result<Vec<f64>>;
}

/// Scaler + model pair, fed `(window_secs, stored_rate)` as a one-step sequence.
pub struct ModelClassifier<M> {
    scaler: FeatureScaler,
    model: M,
}

impl<M: SequenceModel> ModelClassifier<M> {
    pub fn new(scaler: FeatureScaler, model: M) -> Result<Self> {
        scaler.validate()?;
        if scaler.n_features() != 2 {
            bail!(
                "scaler must be fitted on (window, rate), got {} features",
                scaler.n_features()
            );
        }
        Ok(Self { scaler, model })
    }

    fn predict_category(&self, window_secs: u32, stored_rate: u32) -> Result<Category> {
        let features = self
            .scaler
            .transform(&[f64::from(window_secs), f64::from(stored_rate)])?;
        let probs = self.model.predict(&[features])?;

        let mut best: Option<(usize, f64)> = None;
        for (index, p) in probs.iter().copied().enumerate() {
            if p.is_nan() {
                bail!("model produced NaN for class {index}");
            }
            if best.map_or(true, |(_, top)| p > top) {
                best = Some((index, p));
            }
        }

        let (index, _) = best.ok_or_else(|| anyhow!("model produced no outputs"))?;
        if probs.len() != Category::ALL.len() {
            bail!(
                "model produced {} classes, expected {}",
                probs.len(),
                Category::ALL.len()
            );
        }
        Category::from_index(index).ok_or_else(|| anyhow!("class index {index} out of range"))
    }
}

impl ModelClassifier<LstmModel> {
    pub fn load(model_path: &Path, scaler_path: &Path) -> Result<Self> {
        let model: LstmModel = read_json(model_path)?;
        model
            .validate()
            .with_context(|| format!("invalid model weights in {}", model_path.display()))?;
        if model.input_dim() != 2 || model.n_classes() != Category::ALL.len() {
            bail!(
                "model in {} has input_dim {} and {} classes, expected 2 and {}",
                model_path.display(),
                model.input_dim(),
                model.n_classes(),
                Category::ALL.len()
            );
        }

        let scaler: FeatureScaler = read_json(scaler_path)?;
        Self::new(scaler, model)
            .with_context(|| format!("invalid scaler in {}", scaler_path.display()))
    }
}

impl<M: SequenceModel> Classifier for ModelClassifier<M> {
    fn classify(&self, window_secs: u32, stored_rate: u32) -> Result<Option<Category>, MonitorError> {
        // An unseeded sensor has nothing to classify.
        if stored_rate == 0 {
            return Ok(None);
        }

        self.predict_category(window_secs, stored_rate)
            .map(Some)
            .map_err(MonitorError::classifier)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}
