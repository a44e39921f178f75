use crate::candle_data_loader::*;
use crate::candle_inference::TrainConfig;
use crate::candle_model_traits::PopulationModelT;

use anyhow::anyhow;
use candle_core::Device;
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use serde::Serialize;

/// Per-epoch losses of both splits. Both traces always have the same
/// length, one entry per completed epoch.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EpochLoss {
    train: Vec<f32>,
    val: Vec<f32>,
}

impl EpochLoss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_traces(train: Vec<f32>, val: Vec<f32>) -> anyhow::Result<Self> {
        if train.len() != val.len() {
            return Err(anyhow!(
                "{} train losses vs. {} val losses",
                train.len(),
                val.len()
            ));
        }
        Ok(Self { train, val })
    }

    pub fn push(&mut self, train_loss: f32, val_loss: f32) {
        self.train.push(train_loss);
        self.val.push(val_loss);
    }

    pub fn get(&self, split: Split) -> &[f32] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
        }
    }

    pub fn train(&self) -> &[f32] {
        &self.train
    }

    pub fn val(&self) -> &[f32] {
        &self.val
    }

    /// number of completed epochs
    pub fn len(&self) -> usize {
        self.train.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty()
    }

    /// `(train, val)` of each epoch in order
    pub fn iter(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.train.iter().copied().zip(self.val.iter().copied())
    }

    /// `(epoch index, loss)` of the lowest validation loss
    pub fn best_val(&self) -> Option<(usize, f32)> {
        self.val
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Keep track of the best loss and the epochs since it was seen
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: Option<usize>,
    best_loss: f32,
    epochs_without_improvement: usize,
}

impl EarlyStopping {
    /// `None` patience never stops
    pub fn new(patience: Option<usize>) -> Self {
        Self {
            patience,
            best_loss: f32::INFINITY,
            epochs_without_improvement: 0,
        }
    }

    /// Returns true if `loss` is the best so far
    pub fn check_improvement(&mut self, loss: f32) -> bool {
        if loss < self.best_loss {
            self.best_loss = loss;
            self.epochs_without_improvement = 0;
            true
        } else {
            self.epochs_without_improvement += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.patience
            .is_some_and(|patience| self.epochs_without_improvement >= patience)
    }

    pub fn best_loss(&self) -> f32 {
        self.best_loss
    }
}

/// Train a population model with the train loader, monitor the
/// validation loss with the val loader, and save the best model.
/// A non-finite loss ends training with an error.
///
/// * `model` - model wrapper with the training-step contract
/// * `loaders` - train and val loaders
/// * `train_config` - training configuration
///
pub fn train_population_model<M, S>(
    model: &mut M,
    loaders: &mut LoaderRegistry<S>,
    train_config: &TrainConfig,
) -> anyhow::Result<EpochLoss>
where
    M: PopulationModelT,
    S: SampleSource + 'static,
{
    let device = model.device().clone();

    let pb = ProgressBar::new(train_config.num_epochs as u64);

    if !train_config.show_progress || train_config.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut epoch_loss = EpochLoss::new();
    let mut stopping = EarlyStopping::new(train_config.early_stopping);

    info!(
        "Start training: {} train, {} val samples (batch sizes {}, {})",
        loaders.train.num_samples(),
        loaders.val.num_samples(),
        loaders.train.args().batch_size,
        loaders.val.args().batch_size
    );

    for epoch in 0..train_config.num_epochs {
        let train_loss = run_epoch(model, loaders.get_mut(Split::Train), Split::Train, &device)?;
        let val_loss = run_epoch(model, loaders.get_mut(Split::Val), Split::Val, &device)?;

        epoch_loss.push(train_loss, val_loss);
        pb.inc(1);

        if !train_loss.is_finite() || !val_loss.is_finite() {
            pb.finish_and_clear();
            return Err(anyhow!(
                "[{}] training diverged: train loss {}, val loss {}",
                epoch + 1,
                train_loss,
                val_loss
            ));
        }

        if train_config.verbose {
            info!(
                "[{}] train loss: {}, val loss: {}",
                epoch + 1,
                train_loss,
                val_loss
            );
        }

        if stopping.check_improvement(val_loss) {
            if let Some(save_path) = train_config.save_path.as_ref() {
                model.save(save_path)?;
                info!("[{}] saved the model: {}", epoch + 1, save_path.display());
            }
        } else if stopping.should_stop() {
            info!(
                "Early stopping at epoch {} (best val loss: {})",
                epoch + 1,
                stopping.best_loss()
            );
            break;
        }
    } // each epoch

    pb.finish_and_clear();
    Ok(epoch_loss)
}

/// One pass over a split; returns the loss averaged over samples
fn run_epoch<M, S>(
    model: &mut M,
    loader: &mut PrefetchLoader<S>,
    split: Split,
    device: &Device,
) -> anyhow::Result<f32>
where
    M: PopulationModelT,
    S: SampleSource + 'static,
{
    let mut loss_tot = 0f64;
    let mut ntot = 0usize;

    for minibatch in loader.epoch(device)? {
        let minibatch = minibatch?;
        let n = minibatch.num_samples();

        let loss = if split.is_train() {
            model.train_step(&minibatch.input, &minibatch.output)?
        } else {
            model.eval_step(&minibatch.input, &minibatch.output)?
        };

        loss_tot += loss as f64 * n as f64;
        ntot += n;
    }

    if ntot == 0 {
        return Err(anyhow!("no {} samples to go through", split));
    }

    Ok((loss_tot / ntot as f64) as f32)
}
