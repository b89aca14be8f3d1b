//! Streaming error metrics reported per channel.

use crate::{
    error::{Error, Result},
    tensor::Tensor,
};

/// Running mean absolute error, one value per channel.
///
/// A single MAE over all channels would hide a channel that is predicted much worse than the
/// others, so the error of every batch is reduced over every axis except the trailing channel
/// axis.
///
/// The state is a plain value threaded through [`MultiMae::update`] and [`MultiMae::reset`].
/// Each update adds the mean error of one batch and counts one, so batches weigh the same in
/// [`MultiMae::result`] whatever their size.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiMae {
    total: Vec<f32>,
    count: u64,
}

impl MultiMae {
    /// An empty accumulator for `channels` channels.
    pub fn new(channels: usize) -> Self {
        Self {
            total: vec![0.0; channels],
            count: 0,
        }
    }

    /// Number of channels tracked.
    pub fn channels(&self) -> usize {
        self.total.len()
    }

    /// Number of batches accumulated since the last reset.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Zero the totals and the count.
    #[must_use]
    pub fn reset(self) -> Self {
        Self::new(self.channels())
    }

    /// Accumulate the per-channel mean absolute error of one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the tensors don't have the same shape or if their trailing axis is not
    /// the channel count.
    pub fn update(mut self, predictions: &Tensor, targets: &Tensor) -> Result<Self> {
        if predictions.shape() != targets.shape() {
            return Err(Error::IncompatibleShapes(
                predictions.shape().to_vec(),
                targets.shape().to_vec(),
            ));
        }
        let rank = predictions.shape().len();
        let channels = predictions.shape().last().copied().unwrap_or(0);
        if rank == 0 || channels != self.channels() {
            return Err(Error::DimensionMismatch {
                expected: self.channels(),
                actual: channels,
            });
        }
        let axes: Vec<usize> = (0..rank - 1).collect();
        let error = predictions.sub(targets)?.abs().mean(&axes)?;
        self.total
            .iter_mut()
            .zip(error.iter())
            .for_each(|(total, e)| *total += e);
        self.count += 1;
        Ok(self)
    }

    /// The mean of the accumulated batch errors for every channel, or zeros if nothing was
    /// accumulated.
    pub fn result(&self) -> Vec<f32> {
        if self.count == 0 {
            return vec![0.0; self.channels()];
        }
        let count = self.count as f32;
        self.total.iter().map(|t| t / count).collect()
    }

    /// Combine 2 accumulators that saw different batches.
    ///
    /// # Errors
    ///
    /// Returns an error if they don't track the same number of channels.
    pub fn merge(mut self, other: &Self) -> Result<Self> {
        if other.channels() != self.channels() {
            return Err(Error::DimensionMismatch {
                expected: self.channels(),
                actual: other.channels(),
            });
        }
        self.total
            .iter_mut()
            .zip(&other.total)
            .for_each(|(total, t)| *total += t);
        self.count += other.count;
        Ok(self)
    }
}
