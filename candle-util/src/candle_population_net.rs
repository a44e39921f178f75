use crate::candle_aux_layers::*;
use crate::candle_model_traits::PopulationNetT;

use candle_core::{Result, Tensor};
use candle_nn::{Activation, Conv1d, Module, VarBuilder};
use clap::ValueEnum;
use serde::Serialize;

/// Convolutional architectures that read an LTE column together with
/// its `w x w` horizontal neighbourhood
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PopulationArch {
    #[value(name = "SunnyNet_1x1")]
    #[serde(rename = "SunnyNet_1x1")]
    SunnyNet1x1,
    #[value(name = "SunnyNet_3x3")]
    #[serde(rename = "SunnyNet_3x3")]
    SunnyNet3x3,
    #[value(name = "SunnyNet_5x5")]
    #[serde(rename = "SunnyNet_5x5")]
    SunnyNet5x5,
    #[value(name = "SunnyNet_7x7")]
    #[serde(rename = "SunnyNet_7x7")]
    SunnyNet7x7,
}

impl PopulationArch {
    /// width of the horizontal window
    pub fn window(&self) -> usize {
        match self {
            PopulationArch::SunnyNet1x1 => 1,
            PopulationArch::SunnyNet3x3 => 3,
            PopulationArch::SunnyNet5x5 => 5,
            PopulationArch::SunnyNet7x7 => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PopulationArch::SunnyNet1x1 => "SunnyNet_1x1",
            PopulationArch::SunnyNet3x3 => "SunnyNet_3x3",
            PopulationArch::SunnyNet5x5 => "SunnyNet_5x5",
            PopulationArch::SunnyNet7x7 => "SunnyNet_7x7",
        }
    }
}

impl std::fmt::Display for PopulationArch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub struct PopulationNetArgs<'a> {
    pub arch: PopulationArch,
    pub n_channels: usize,
    pub n_features: usize,
    pub hidden: &'a [usize],
}

/// The window `(c, d, w, w)` is folded into `(c * w * w, d)` so that
/// neighbouring columns become input channels of 1-D convolutions
/// running along depth. The head projects back to `c` levels.
pub struct PopulationNet {
    arch: PopulationArch,
    n_channels: usize,
    n_features: usize,
    layers: StackLayers<Conv1d>,
}

impl PopulationNet {
    pub fn new(args: PopulationNetArgs, vb: VarBuilder) -> Result<Self> {
        let w = args.arch.window();
        let d_in = args.n_channels * w * w;

        let layers = conv1d_stack(
            d_in,
            args.hidden,
            args.n_channels,
            3,
            Activation::Relu,
            vb.pp("net"),
        )?;

        Ok(Self {
            arch: args.arch,
            n_channels: args.n_channels,
            n_features: args.n_features,
            layers,
        })
    }

    pub fn arch(&self) -> PopulationArch {
        self.arch
    }
}

impl PopulationNetT for PopulationNet {
    fn forward_t(&self, x_ncdww: &Tensor, _train: bool) -> Result<Tensor> {
        let (n, c, d, w1, w2) = x_ncdww.dims5()?;
        let w = self.arch.window();

        if c != self.n_channels || d != self.n_features || w1 != w || w2 != w {
            candle_core::bail!(
                "{} expects (n, {}, {}, {}, {}) windows, but got (n, {}, {}, {}, {})",
                self.arch,
                self.n_channels,
                self.n_features,
                w,
                w,
                c,
                d,
                w1,
                w2
            );
        }

        let h_nkd = x_ncdww
            .permute((0, 1, 3, 4, 2))?
            .contiguous()?
            .reshape((n, c * w * w, d))?;

        self.layers.forward(&h_nkd)
    }

    fn num_channels(&self) -> usize {
        self.n_channels
    }

    fn num_features(&self) -> usize {
        self.n_features
    }

    fn window(&self) -> usize {
        self.arch.window()
    }
}
