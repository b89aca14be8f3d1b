//! Sliding windows over a series, grouped into batches of input and label tensors.
//!
//! A window of total length `input_width + output_width` slides over a split with stride 1. The
//! leading `input_width` steps become the inputs and are standardized with the train-split
//! [`Statistics`]. The trailing `output_width` steps become the labels and stay in physical units,
//! so that errors on predictions are reported in those units too.
//!
//! ```text
//!   step:    0   1   2   3   4   5   6   7
//!   window 0 [in  in][lab lab]
//!   window 1     [in  in][lab lab]
//!   ...
//!   window 4                 [in  in][lab lab]
//! ```
//!
//! A [`WindowDataset`] materializes its batches on the first pass and keeps them, so every later
//! pass (one per epoch) only walks the cache. Training datasets go through a bounded
//! [`ShuffleBuffer`] that draws a new order on every pass.

use std::slice;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::{
    error::{Error, Result},
    normalize::Statistics,
    series::Series,
    tensor::Tensor,
};

/// Number of steps on each side of a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowShape {
    /// Steps given to the model.
    pub input_width: usize,
    /// Steps the model has to predict.
    pub output_width: usize,
}

impl WindowShape {
    /// Total number of steps covered by a window.
    pub fn total(&self) -> usize {
        self.input_width + self.output_width
    }

    /// Number of windows that fit in a split of `len` steps.
    pub fn window_count(&self, len: usize) -> usize {
        (len + 1).saturating_sub(self.total())
    }
}

/// Number of batches needed to hold `windows` windows, counting the last partial batch.
pub fn batch_count(windows: usize, batch_size: usize) -> usize {
    windows.div_ceil(batch_size)
}

/// One window, borrowed from the series it was cut from. Both sides are raw row-major values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window<'a> {
    /// `input_width * channels` values.
    pub inputs: &'a [f32],
    /// `output_width * channels` values.
    pub labels: &'a [f32],
}

/// Lazily cut every window of the given shape out of `series`, in chronological order.
pub fn windows(series: &Series, shape: WindowShape) -> impl Iterator<Item = Window<'_>> + '_ {
    (0..shape.window_count(series.len())).map(move |start| {
        let mid = start + shape.input_width;
        Window {
            inputs: series.rows(start..mid),
            labels: series.rows(mid..mid + shape.output_width),
        }
    })
}

/// A group of windows stacked into tensors.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// Standardized inputs shaped `[b, input_width, channels]`.
    pub inputs: Tensor,
    /// Raw labels shaped `[b, output_width, channels]`.
    pub labels: Tensor,
}

impl Batch {
    /// Number of windows in the batch.
    pub fn len(&self) -> usize {
        self.inputs.shape().first().copied().unwrap_or(0)
    }

    /// Check if the batch holds no window.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns splits into datasets of batched windows.
#[derive(Clone, Debug)]
pub struct WindowGenerator {
    shape: WindowShape,
    batch_size: usize,
    shuffle_buffer: usize,
    seed: u64,
    statistics: Statistics,
}

impl WindowGenerator {
    /// Create a generator that standardizes inputs with `statistics`.
    ///
    /// `seed` initializes the shuffling of training datasets; `shuffle_buffer` bounds how many
    /// batches are held while shuffling.
    ///
    /// # Errors
    ///
    /// Returns an error if a width, the batch size or the shuffle buffer size is zero.
    pub fn new(
        shape: WindowShape,
        batch_size: usize,
        shuffle_buffer: usize,
        seed: u64,
        statistics: Statistics,
    ) -> Result<Self> {
        if shape.input_width == 0 || shape.output_width == 0 {
            return Err(Error::InvalidConfig(format!(
                "window widths must be positive (got {} and {})",
                shape.input_width, shape.output_width
            )));
        }
        if batch_size == 0 || shuffle_buffer == 0 {
            return Err(Error::InvalidConfig(format!(
                "batch size and shuffle buffer must be positive (got {batch_size} and {shuffle_buffer})"
            )));
        }
        Ok(Self {
            shape,
            batch_size,
            shuffle_buffer,
            seed,
            statistics,
        })
    }

    /// The window shape.
    pub fn shape(&self) -> WindowShape {
        self.shape
    }

    /// The statistics applied to inputs.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Create a dataset over `split`. Batches of a training dataset are reshuffled on every pass;
    /// other datasets keep chronological order.
    ///
    /// Nothing is computed until the first pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the split doesn't have as many channels as the statistics.
    pub fn make_dataset(&self, split: &Series, training: bool) -> Result<WindowDataset> {
        if split.channels() != self.statistics.channels() {
            return Err(Error::DimensionMismatch {
                expected: self.statistics.channels(),
                actual: split.channels(),
            });
        }
        Ok(WindowDataset {
            generator: self.clone(),
            split: split.clone(),
            training,
            rng: StdRng::seed_from_u64(self.seed),
            cache: None,
        })
    }

    fn batches(&self, split: &Series) -> Result<Vec<Batch>> {
        let channels = split.channels();
        let count = self.shape.window_count(split.len());
        let mut batches = Vec::with_capacity(batch_count(count, self.batch_size));
        let mut pending = Vec::with_capacity(self.batch_size);
        for window in windows(split, self.shape) {
            pending.push(window);
            if pending.len() == self.batch_size {
                batches.push(self.batch(&pending, channels)?);
                pending.clear();
            }
        }
        if !pending.is_empty() {
            batches.push(self.batch(&pending, channels)?);
        }
        Ok(batches)
    }

    fn batch(&self, windows: &[Window<'_>], channels: usize) -> Result<Batch> {
        let size = windows.len();
        let inputs: Vec<f32> = windows.iter().flat_map(|w| w.inputs).copied().collect();
        let labels: Vec<f32> = windows.iter().flat_map(|w| w.labels).copied().collect();
        let inputs = Tensor::from_vec(&[size, self.shape.input_width, channels], inputs)?;
        Ok(Batch {
            inputs: self.statistics.normalize(&inputs)?,
            labels: Tensor::from_vec(&[size, self.shape.output_width, channels], labels)?,
        })
    }
}

/// A restartable sequence of batches over one split.
#[derive(Debug)]
pub struct WindowDataset {
    generator: WindowGenerator,
    split: Series,
    training: bool,
    rng: StdRng,
    cache: Option<Vec<Batch>>,
}

impl WindowDataset {
    /// Number of windows in the dataset.
    pub fn window_count(&self) -> usize {
        self.generator.shape.window_count(self.split.len())
    }

    /// Number of batches yielded by each pass.
    pub fn len(&self) -> usize {
        batch_count(self.window_count(), self.generator.batch_size)
    }

    /// Check if passes yield nothing, which happens when the split is shorter than a window.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the dataset reshuffles its batches on every pass.
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Start a pass over the dataset.
    ///
    /// The first pass materializes and caches every batch.
    ///
    /// # Errors
    ///
    /// Returns an error if batches can't be built from the split.
    pub fn epoch(&mut self) -> Result<Epoch<'_>> {
        if self.cache.is_none() {
            let batches = self.generator.batches(&self.split)?;
            debug!(
                windows = self.window_count(),
                batches = batches.len(),
                training = self.training,
                "materialized windows"
            );
            self.cache = Some(batches);
        }
        let batches = self.cache.as_deref().unwrap_or_default().iter();
        if self.training {
            Ok(Epoch::Shuffled(ShuffleBuffer::new(
                batches,
                self.generator.shuffle_buffer,
                &mut self.rng,
            )))
        } else {
            Ok(Epoch::Ordered(batches))
        }
    }
}

/// A single pass over a [`WindowDataset`].
pub enum Epoch<'a> {
    /// Batches in chronological order.
    Ordered(slice::Iter<'a, Batch>),
    /// Batches drawn through a shuffle buffer.
    Shuffled(ShuffleBuffer<slice::Iter<'a, Batch>, &'a mut StdRng>),
}

impl<'a> Iterator for Epoch<'a> {
    type Item = &'a Batch;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Ordered(it) => it.next(),
            Self::Shuffled(it) => it.next(),
        }
    }
}

/// Shuffles an iterator while holding at most `capacity` of its items.
///
/// The buffer is filled from the source, then each item is drawn uniformly from the buffer and
/// its slot is refilled from the source. With a capacity at least as large as the source, this is
/// a uniform shuffle.
pub struct ShuffleBuffer<I, R>
where
    I: Iterator,
{
    source: I,
    buffer: Vec<I::Item>,
    capacity: usize,
    rng: R,
}

impl<I, R> ShuffleBuffer<I, R>
where
    I: Iterator,
    R: Rng,
{
    /// Wrap `source`, buffering at most `capacity` items (at least one).
    pub fn new(source: I, capacity: usize, rng: R) -> Self {
        let capacity = capacity.max(1);
        Self {
            source,
            buffer: Vec::with_capacity(capacity),
            capacity,
            rng,
        }
    }
}

impl<I, R> Iterator for ShuffleBuffer<I, R>
where
    I: Iterator,
    R: Rng,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.len() < self.capacity {
            match self.source.next() {
                Some(item) => self.buffer.push(item),
                None => break,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(idx))
    }
}
