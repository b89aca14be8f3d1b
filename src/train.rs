//! Fitting a forecaster on windowed splits and scoring it per channel.

use tracing::{debug, info};

use crate::{
    autodiff::Tape,
    error::Result,
    metrics::MultiMae,
    model::Forecaster,
    optim::Optimizer,
    window::WindowDataset,
};

/// Loss and per-channel error of one pass over a dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Mean squared error, averaged over windows.
    pub loss: f64,
    /// Mean absolute error of every channel, in the units of the labels.
    pub mae: Vec<f32>,
}

/// What happened during one epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Mean training loss over the batches of the epoch.
    pub loss: f64,
    /// Scores on the validation dataset after the epoch.
    pub validation: Evaluation,
}

/// Drives a forecaster through training and evaluation passes.
pub struct Trainer<'a> {
    tape: &'a Tape,
    forecaster: Forecaster<'a>,
    optimizer: Box<dyn Optimizer>,
}

impl<'a> Trainer<'a> {
    /// Create a trainer recording its passes on `tape`.
    pub fn new(tape: &'a Tape, forecaster: Forecaster<'a>, optimizer: Box<dyn Optimizer>) -> Self {
        Self {
            tape,
            forecaster,
            optimizer,
        }
    }

    /// The forecaster being trained.
    pub fn forecaster(&self) -> &Forecaster<'a> {
        &self.forecaster
    }

    /// Give up the trainer and keep the forecaster.
    pub fn into_forecaster(self) -> Forecaster<'a> {
        self.forecaster
    }

    /// Train for `epochs` passes over `train`, scoring `validation` after each one.
    ///
    /// # Errors
    ///
    /// Returns an error if a batch doesn't fit the forecaster.
    pub fn fit(
        &mut self,
        train: &mut WindowDataset,
        validation: &mut WindowDataset,
        epochs: usize,
    ) -> Result<Vec<EpochReport>> {
        info!(
            epochs,
            batches = train.len(),
            parameters = self.forecaster.parameter_count(),
            "training"
        );
        let mut reports = Vec::with_capacity(epochs);
        for epoch in 1..=epochs {
            let mut total = 0.0;
            let mut batches = 0usize;
            for batch in train.epoch()? {
                total += self
                    .forecaster
                    .train_step(self.tape, batch, self.optimizer.as_mut())?;
                batches += 1;
            }
            let loss = if batches == 0 {
                0.0
            } else {
                total / batches as f64
            };
            let validation = self.evaluate(validation)?;
            info!(
                epoch,
                loss,
                val_loss = validation.loss,
                val_mae = ?validation.mae,
                "epoch done"
            );
            reports.push(EpochReport {
                epoch,
                loss,
                validation,
            });
        }
        Ok(reports)
    }

    /// Score the forecaster on one pass over `dataset`, starting from a fresh error accumulator.
    ///
    /// # Errors
    ///
    /// Returns an error if a batch doesn't fit the forecaster.
    pub fn evaluate(&mut self, dataset: &mut WindowDataset) -> Result<Evaluation> {
        let mut mae = MultiMae::new(self.forecaster.channels());
        let mut loss = 0.0;
        let mut windows = 0usize;
        for batch in dataset.epoch()? {
            let (batch_loss, predictions) = self.forecaster.evaluate(self.tape, batch)?;
            mae = mae.update(&predictions, &batch.labels)?;
            loss += batch_loss * batch.len() as f64;
            windows += batch.len();
        }
        debug!(batches = mae.count(), windows, "evaluated");
        Ok(Evaluation {
            loss: if windows == 0 {
                0.0
            } else {
                loss / windows as f64
            },
            mae: mae.result(),
        })
    }
}
