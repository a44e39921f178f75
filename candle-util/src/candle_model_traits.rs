use candle_core::{Device, Result, Tensor};
use std::path::Path;

pub trait PopulationNetT {
    /// A network that maps LTE columns to non-LTE populations
    ///
    /// # Arguments
    /// * `x_ncdww` - LTE input windows (n x levels x depth x w x w)
    /// * `train` - whether to use training-only layers or not
    ///
    /// # Returns `y_ncd`
    /// * `y_ncd` - predicted populations of the central column (n x levels x depth)
    fn forward_t(&self, x_ncdww: &Tensor, train: bool) -> Result<Tensor>;

    fn num_channels(&self) -> usize;

    fn num_features(&self) -> usize;

    fn window(&self) -> usize;
}

/// What the training driver needs from a model
pub trait PopulationModelT {
    /// One optimization step on a minibatch; returns the loss
    fn train_step(&mut self, x: &Tensor, y: &Tensor) -> anyhow::Result<f32>;

    /// Loss on a minibatch without updating parameters
    fn eval_step(&self, x: &Tensor, y: &Tensor) -> anyhow::Result<f32>;

    /// Write down all the parameters
    fn save(&self, path: &Path) -> anyhow::Result<()>;

    fn device(&self) -> &Device;
}
