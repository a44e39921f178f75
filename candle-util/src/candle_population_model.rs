use crate::candle_loss_functions::*;
use crate::candle_model_traits::{PopulationModelT, PopulationNetT};
use crate::candle_population_net::*;

use anyhow::anyhow;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap, SGD};
use clap::ValueEnum;
use log::{info, warn};
use serde::Serialize;
use std::path::Path;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[clap(rename_all = "lowercase")]
pub enum ComputeDevice {
    /// cuda if available, then metal, then cpu
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl ComputeDevice {
    pub fn resolve(&self, device_no: usize) -> anyhow::Result<Device> {
        use candle_core::utils::{cuda_is_available, metal_is_available};

        let dev = match self {
            ComputeDevice::Auto if cuda_is_available() => Device::new_cuda(device_no)?,
            ComputeDevice::Auto if metal_is_available() => Device::new_metal(device_no)?,
            ComputeDevice::Auto | ComputeDevice::Cpu => Device::Cpu,
            ComputeDevice::Cuda => Device::new_cuda(device_no)?,
            ComputeDevice::Metal => Device::new_metal(device_no)?,
        };
        Ok(dev)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OptimizerType {
    #[value(name = "Adam", alias = "adam")]
    Adam,
    #[value(name = "SGD", alias = "sgd")]
    #[serde(rename = "SGD")]
    Sgd,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LossType {
    #[value(name = "MSELoss", alias = "mse")]
    #[serde(rename = "MSELoss")]
    Mse,
    #[value(name = "L1Loss", alias = "l1")]
    #[serde(rename = "L1Loss")]
    L1,
}

impl LossType {
    pub fn apply(&self, hat: &Tensor, target: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            LossType::Mse => mse_loss(hat, target),
            LossType::L1 => l1_loss(hat, target),
        }
    }
}

/// Hyperparameters of a population model. Only `ModelParamsBuilder`
/// makes one, and only after the height vector of the training data
/// has been supplied.
#[derive(Clone, Debug, Serialize)]
pub struct ModelParams {
    arch: PopulationArch,
    optimizer: OptimizerType,
    loss_fn: LossType,
    learning_rate: f32,
    n_channels: usize,
    n_features: usize,
    hidden_channels: Vec<usize>,
    alpha: Option<f32>,
    device: ComputeDevice,
    device_no: usize,
    multi_gpu: bool,
    height_vector: Vec<f32>,
}

impl ModelParams {
    pub fn builder() -> ModelParamsBuilder {
        ModelParamsBuilder::default()
    }

    pub fn arch(&self) -> PopulationArch {
        self.arch
    }

    pub fn optimizer(&self) -> OptimizerType {
        self.optimizer
    }

    pub fn loss_fn(&self) -> LossType {
        self.loss_fn
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn hidden_channels(&self) -> &[usize] {
        &self.hidden_channels
    }

    pub fn alpha(&self) -> Option<f32> {
        self.alpha
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn device_no(&self) -> usize {
        self.device_no
    }

    pub fn multi_gpu(&self) -> bool {
        self.multi_gpu
    }

    pub fn height_vector(&self) -> &[f32] {
        &self.height_vector
    }
}

#[derive(Clone, Debug)]
pub struct ModelParamsBuilder {
    arch: PopulationArch,
    optimizer: OptimizerType,
    loss_fn: LossType,
    learning_rate: f32,
    n_channels: usize,
    n_features: usize,
    hidden_channels: Vec<usize>,
    alpha: Option<f32>,
    device: ComputeDevice,
    device_no: usize,
    multi_gpu: bool,
    height_vector: Option<Vec<f32>>,
}

impl Default for ModelParamsBuilder {
    fn default() -> Self {
        Self {
            arch: PopulationArch::SunnyNet7x7,
            optimizer: OptimizerType::Adam,
            loss_fn: LossType::Mse,
            learning_rate: 1e-3,
            n_channels: 6,
            n_features: 400,
            hidden_channels: vec![32, 32],
            alpha: None,
            device: ComputeDevice::Auto,
            device_no: 0,
            multi_gpu: false,
            height_vector: None,
        }
    }
}

impl ModelParamsBuilder {
    pub fn arch(mut self, arch: PopulationArch) -> Self {
        self.arch = arch;
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizerType) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn loss_fn(mut self, loss_fn: LossType) -> Self {
        self.loss_fn = loss_fn;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn n_channels(mut self, n_channels: usize) -> Self {
        self.n_channels = n_channels;
        self
    }

    pub fn n_features(mut self, n_features: usize) -> Self {
        self.n_features = n_features;
        self
    }

    pub fn hidden_channels(mut self, hidden_channels: &[usize]) -> Self {
        self.hidden_channels = hidden_channels.to_vec();
        self
    }

    pub fn alpha(mut self, alpha: Option<f32>) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn device(mut self, device: ComputeDevice, device_no: usize) -> Self {
        self.device = device;
        self.device_no = device_no;
        self
    }

    pub fn multi_gpu(mut self, multi_gpu: bool) -> Self {
        self.multi_gpu = multi_gpu;
        self
    }

    /// heights of the depth grid, taken from the training data
    pub fn height_vector(mut self, z: Vec<f32>) -> Self {
        self.height_vector = Some(z);
        self
    }

    pub fn build(self) -> anyhow::Result<ModelParams> {
        let height_vector = self
            .height_vector
            .ok_or(anyhow!("height vector is missing; build the training data first"))?;

        if height_vector.is_empty() {
            return Err(anyhow!("empty height vector"));
        }

        if height_vector.len() != self.n_features {
            return Err(anyhow!(
                "height vector has {} points, but the model expects {} features",
                height_vector.len(),
                self.n_features
            ));
        }

        if self.n_channels == 0 {
            return Err(anyhow!("need at least one channel"));
        }

        if self.hidden_channels.contains(&0) {
            return Err(anyhow!("zero-width hidden layer: {:?}", self.hidden_channels));
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return Err(anyhow!("invalid learning rate: {}", self.learning_rate));
        }

        if let Some(alpha) = self.alpha {
            if !(0. ..=1.).contains(&alpha) {
                return Err(anyhow!("alpha should be in [0, 1]: {}", alpha));
            }
        }

        Ok(ModelParams {
            arch: self.arch,
            optimizer: self.optimizer,
            loss_fn: self.loss_fn,
            learning_rate: self.learning_rate,
            n_channels: self.n_channels,
            n_features: self.n_features,
            hidden_channels: self.hidden_channels,
            alpha: self.alpha,
            device: self.device,
            device_no: self.device_no,
            multi_gpu: self.multi_gpu,
            height_vector,
        })
    }
}

enum ModelOptimizer {
    Adam(AdamW),
    Sgd(SGD),
}

impl ModelOptimizer {
    fn new(kind: OptimizerType, vars: Vec<Var>, learning_rate: f32) -> candle_core::Result<Self> {
        match kind {
            OptimizerType::Adam => {
                let adam_params = ParamsAdamW {
                    lr: learning_rate.into(),
                    weight_decay: 0.,
                    ..Default::default()
                };
                Ok(ModelOptimizer::Adam(AdamW::new(vars, adam_params)?))
            }
            OptimizerType::Sgd => Ok(ModelOptimizer::Sgd(SGD::new(vars, learning_rate.into())?)),
        }
    }

    fn backward_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        match self {
            ModelOptimizer::Adam(adam) => adam.backward_step(loss),
            ModelOptimizer::Sgd(sgd) => sgd.backward_step(loss),
        }
    }
}

///
/// Network, optimizer and loss function put together
///
pub struct PopulationModel {
    params: ModelParams,
    net: PopulationNet,
    variable_map: VarMap,
    optimizer: ModelOptimizer,
    z_d: Tensor,
    device: Device,
}

impl PopulationModel {
    pub fn new(params: ModelParams) -> anyhow::Result<Self> {
        let device = params.device.resolve(params.device_no)?;

        if params.multi_gpu {
            warn!(
                "multi-GPU training is not supported; training on {:?} only",
                device.location()
            );
        }

        let variable_map = VarMap::new();
        let param_builder = VarBuilder::from_varmap(&variable_map, DType::F32, &device);

        let net = PopulationNet::new(
            PopulationNetArgs {
                arch: params.arch,
                n_channels: params.n_channels,
                n_features: params.n_features,
                hidden: &params.hidden_channels,
            },
            param_builder,
        )?;

        let optimizer =
            ModelOptimizer::new(params.optimizer, variable_map.all_vars(), params.learning_rate)?;

        let z_d = Tensor::from_slice(&params.height_vector, params.height_vector.len(), &device)?;

        info!(
            "{}: {} x {} -> {:?} -> {} x {}",
            params.arch,
            params.n_channels,
            params.n_features,
            params.hidden_channels,
            params.n_channels,
            params.n_features
        );

        Ok(Self {
            params,
            net,
            variable_map,
            optimizer,
            z_d,
            device,
        })
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Restore the parameters written by `save`
    pub fn load(&mut self, path: &Path) -> anyhow::Result<()> {
        self.variable_map.load(path)?;
        Ok(())
    }

    pub fn predict(&self, x_ncdww: &Tensor) -> anyhow::Result<Tensor> {
        Ok(self.net.forward_t(x_ncdww, false)?)
    }

    /// cell-by-cell loss, mixed with the mass conservation loss by
    /// `alpha` if given
    fn loss(&self, x_ncdww: &Tensor, y_ncd: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let hat_ncd = self.net.forward_t(x_ncdww, train)?;
        let loss_fn = self.params.loss_fn;
        let cell = loss_fn.apply(&hat_ncd, y_ncd)?;

        match self.params.alpha {
            Some(alpha) => {
                let mass_fn = |a: &Tensor, b: &Tensor| loss_fn.apply(a, b);
                let mass = mass_conservation_loss(&hat_ncd, y_ncd, &self.z_d, &mass_fn)?;
                let alpha = alpha as f64;
                (cell * (1. - alpha))? + (mass * alpha)?
            }
            None => Ok(cell),
        }
    }
}

impl PopulationModelT for PopulationModel {
    fn train_step(&mut self, x: &Tensor, y: &Tensor) -> anyhow::Result<f32> {
        let loss = self.loss(x, y, true)?;
        self.optimizer.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    fn eval_step(&self, x: &Tensor, y: &Tensor) -> anyhow::Result<f32> {
        let loss = self.loss(x, y, false)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        self.variable_map.save(path)?;
        Ok(())
    }

    fn device(&self) -> &Device {
        &self.device
    }
}
