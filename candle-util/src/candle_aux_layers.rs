use candle_core::{Result, Tensor};
use candle_nn::{Activation, Conv1d, Conv1dConfig, Module, VarBuilder};

/// build a stack of alternating `M` and `A` layers
pub struct StackLayers<M>
where
    M: Module,
{
    module_layers: Vec<M>,
    activation_layers: Vec<Option<Activation>>,
}

impl<M> Module for StackLayers<M>
where
    M: Module,
{
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = input.clone();
        for (module, activation) in self.module_layers.iter().zip(self.activation_layers.iter()) {
            x = module.forward(&x)?;
            if let Some(activation) = activation {
                x = activation.forward(&x)?;
            }
        }
        Ok(x)
    }
}

impl<M> StackLayers<M>
where
    M: Module,
{
    pub fn new() -> Self {
        Self {
            module_layers: Vec::new(),
            activation_layers: Vec::new(),
        }
    }

    /// Appends a layer after all the current layers.
    pub fn push_with_act(&mut self, layer: M, activation: Activation) {
        self.module_layers.push(layer);
        self.activation_layers.push(Some(activation));
    }

    pub fn push(&mut self, layer: M) {
        self.module_layers.push(layer);
        self.activation_layers.push(None);
    }

    pub fn len(&self) -> usize {
        self.module_layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.module_layers.is_empty()
    }
}

impl<M> Default for StackLayers<M>
where
    M: Module,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-preserving 1-D convolutions along the last axis:
/// `(n, in, d) -> (n, out, d)`.
///
/// * `in_channels` - input channels
/// * `hidden` - hidden channel widths, each followed by `act`
/// * `out_channels` - output channels of the final pointwise layer
/// * `kernel_size` - odd kernel width of the hidden layers
///
pub fn conv1d_stack(
    in_channels: usize,
    hidden: &[usize],
    out_channels: usize,
    kernel_size: usize,
    act: Activation,
    vb: VarBuilder,
) -> Result<StackLayers<Conv1d>> {
    if kernel_size % 2 == 0 {
        candle_core::bail!("kernel size should be odd: {}", kernel_size);
    }

    let same = Conv1dConfig {
        padding: kernel_size / 2,
        ..Default::default()
    };

    let mut stack = StackLayers::new();
    let mut prev = in_channels;

    for (j, &next) in hidden.iter().enumerate() {
        let conv = candle_nn::conv1d(prev, next, kernel_size, same, vb.pp(format!("conv.{}", j)))?;
        stack.push_with_act(conv, act);
        prev = next;
    }

    let head = candle_nn::conv1d(prev, out_channels, 1, Conv1dConfig::default(), vb.pp("head"))?;
    stack.push(head);

    Ok(stack)
}
