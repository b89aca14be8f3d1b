//! Settings for preparing windows and training a forecaster.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    optim::OptimizerKind,
    series::SplitRatios,
    window::WindowShape,
};

/// All knobs of a training run. Every field has a default, so a JSON file only needs the ones it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    /// Steps given to the model.
    pub input_width: usize,
    /// Steps to forecast.
    pub output_width: usize,
    /// Windows per batch.
    pub batch_size: usize,
    /// Batches held by the shuffle buffer of the training dataset.
    pub shuffle_buffer: usize,
    /// Seed for shuffling and weight initialization.
    pub seed: u64,
    /// Passes over the training dataset.
    pub epochs: usize,
    /// Optimizer step size.
    pub learning_rate: f64,
    /// Width multiplier of the hidden layers, which get `floor(128 * alpha)` units.
    pub alpha: f64,
    /// Update rule.
    pub optimizer: OptimizerKind,
    /// End of the train split as a fraction of the series.
    pub train_end: f64,
    /// End of the validation split as a fraction of the series.
    pub validation_end: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            input_width: 6,
            output_width: 6,
            batch_size: 32,
            shuffle_buffer: 100,
            seed: 42,
            epochs: 20,
            learning_rate: 0.001,
            alpha: 0.12,
            optimizer: OptimizerKind::Adam,
            train_end: 0.7,
            validation_end: 0.9,
        }
    }
}

impl ForecastConfig {
    /// Read a configuration from a JSON file and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or parsed, or if a value is out of range.
    pub fn from_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first value out of range.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("input_width", self.input_width),
            ("output_width", self.output_width),
            ("batch_size", self.batch_size),
            ("shuffle_buffer", self.shuffle_buffer),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be positive")));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be positive (got {})",
                self.learning_rate
            )));
        }
        if self.hidden_width() == 0 {
            return Err(Error::InvalidConfig(format!(
                "alpha {} leaves no hidden unit",
                self.alpha
            )));
        }
        self.split_ratios().validate()
    }

    /// The window shape.
    pub fn window_shape(&self) -> WindowShape {
        WindowShape {
            input_width: self.input_width,
            output_width: self.output_width,
        }
    }

    /// The split boundaries.
    pub fn split_ratios(&self) -> SplitRatios {
        SplitRatios {
            train_end: self.train_end,
            validation_end: self.validation_end,
        }
    }

    /// Units in each hidden layer.
    pub fn hidden_width(&self) -> usize {
        if self.alpha.is_finite() && self.alpha > 0.0 {
            (128.0 * self.alpha).floor() as usize
        } else {
            0
        }
    }
}
