//! Single-layer LSTM with a dense softmax head.
//!
//! Weights use the Keras layout: `kernel` is `[input_dim][4 * units]`,
//! `recurrent_kernel` is `[units][4 * units]`, gates ordered i, f, c, o.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::SequenceModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmModel {
    pub units: usize,
    pub kernel: Vec<Vec<f64>>,
    pub recurrent_kernel: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub dense_kernel: Vec<Vec<f64>>,
    pub dense_bias: Vec<f64>,
}

impl LstmModel {
    pub fn input_dim(&self) -> usize {
        self.kernel.len()
    }

    pub fn n_classes(&self) -> usize {
        self.dense_bias.len()
    }

    pub fn validate(&self) -> Result<()> {
        let gates = 4 * self.units;
        if self.units == 0 {
            bail!("lstm must have at least one unit");
        }
        if self.kernel.is_empty() || self.kernel.iter().any(|row| row.len() != gates) {
            bail!("kernel must be [input_dim][{gates}]");
        }
        if self.recurrent_kernel.len() != self.units
            || self.recurrent_kernel.iter().any(|row| row.len() != gates)
        {
            bail!("recurrent_kernel must be [{}][{gates}]", self.units);
        }
        if self.bias.len() != gates {
            bail!("bias must have {gates} entries, got {}", self.bias.len());
        }
        if self.dense_bias.is_empty()
            || self.dense_kernel.len() != self.units
            || self
                .dense_kernel
                .iter()
                .any(|row| row.len() != self.dense_bias.len())
        {
            bail!("dense_kernel must be [{}][{}]", self.units, self.n_classes());
        }
        Ok(())
    }

    fn step(&self, x: &[f64], h: &mut [f64], c: &mut [f64]) {
        let u = self.units;
        let mut z = self.bias.clone();
        for (xi, row) in x.iter().zip(&self.kernel) {
            for (zj, w) in z.iter_mut().zip(row) {
                *zj += xi * w;
            }
        }
        for (hi, row) in h.iter().zip(&self.recurrent_kernel) {
            for (zj, w) in z.iter_mut().zip(row) {
                *zj += hi * w;
            }
        }

        for k in 0..u {
            let i = sigmoid(z[k]);
            let f = sigmoid(z[u + k]);
            let g = z[2 * u + k].tanh();
            let o = sigmoid(z[3 * u + k]);
            c[k] = f * c[k] + i * g;
            h[k] = o * c[k].tanh();
        }
    }
}

impl SequenceModel for LstmModel {
    fn predict(&self, sequence: &[Vec<f64>]) -> Result<Vec<f64>> {
        if sequence.is_empty() {
            bail!("empty input sequence");
        }

        let mut h = vec![0.0; self.units];
        let mut c = vec![0.0; self.units];
        for x in sequence {
            if x.len() != self.input_dim() {
                bail!(
                    "model expects {} features per step, got {}",
                    self.input_dim(),
                    x.len()
                );
            }
            self.step(x, &mut h, &mut c);
        }

        let mut logits = self.dense_bias.clone();
        for (hi, row) in h.iter().zip(&self.dense_kernel) {
            for (l, w) in logits.iter_mut().zip(row) {
                *l += hi * w;
            }
        }
        Ok(softmax(&logits))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
