//! Per-channel standardization fitted on the train split.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    series::Series,
    tensor::Tensor,
};

/// Added to the standard deviation so that a constant channel never divides by zero.
pub const EPSILON: f32 = 1e-6;

/// Per-channel mean and population standard deviation.
///
/// Statistics are fitted once from the train split and then applied unchanged to every split.
/// There is no way to update them after fitting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Statistics {
    /// Compute the statistics of every channel of `series`.
    ///
    /// The standard deviation divides by the number of steps, not by one less.
    ///
    /// # Errors
    ///
    /// Returns an error if the series is empty.
    pub fn fit(series: &Series) -> Result<Self> {
        if series.is_empty() {
            return Err(Error::InvalidConfig(
                "can't fit normalization statistics on an empty split".into(),
            ));
        }
        let channels = series.channels();
        let n = series.len() as f64;
        // Accumulate in f64 so that long series don't lose precision.
        let mut sum = vec![0f64; channels];
        for row in series.iter() {
            sum.iter_mut().zip(row).for_each(|(s, &x)| *s += f64::from(x));
        }
        let mean: Vec<f64> = sum.into_iter().map(|s| s / n).collect();
        let mut sq = vec![0f64; channels];
        for row in series.iter() {
            for ((s, &x), m) in sq.iter_mut().zip(row).zip(&mean) {
                let d = f64::from(x) - m;
                *s += d * d;
            }
        }
        Ok(Self {
            mean: mean.iter().map(|&m| m as f32).collect(),
            std: sq.into_iter().map(|s| (s / n).sqrt() as f32).collect(),
        })
    }

    /// Create statistics from known values.
    ///
    /// # Errors
    ///
    /// Returns an error if the vectors have different lengths.
    pub fn from_parts(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(Error::DimensionMismatch {
                expected: mean.len(),
                actual: std.len(),
            });
        }
        Ok(Self { mean, std })
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Mean of each channel.
    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    /// Standard deviation of each channel.
    pub fn std(&self) -> &[f32] {
        &self.std
    }

    /// Standardize every vector in `t`, whose trailing axis holds the channels.
    ///
    /// Each element becomes `(x - mean) / (std + EPSILON)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailing axis of `t` isn't the channel count.
    pub fn normalize(&self, t: &Tensor) -> Result<Tensor> {
        let (mean, scale) = self.broadcastable(t)?;
        t.sub(&mean)?.div(&scale)
    }

    /// Undo [`Statistics::normalize`].
    ///
    /// # Errors
    ///
    /// Returns an error if the trailing axis of `t` isn't the channel count.
    pub fn denormalize(&self, t: &Tensor) -> Result<Tensor> {
        let (mean, scale) = self.broadcastable(t)?;
        t.mul(&scale)?.add(&mean)
    }

    fn broadcastable(&self, t: &Tensor) -> Result<(Tensor, Tensor)> {
        let channels = t.shape().last().copied().unwrap_or(0);
        if channels != self.channels() {
            return Err(Error::DimensionMismatch {
                expected: self.channels(),
                actual: channels,
            });
        }
        let scale: Vec<f32> = self.std.iter().map(|s| s + EPSILON).collect();
        Ok((
            Tensor::new(&[channels], &self.mean)?,
            Tensor::from_vec(&[channels], scale)?,
        ))
    }
}
