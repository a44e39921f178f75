pub mod candle_aux_layers;
pub mod candle_data_loader;
pub mod candle_inference;
pub mod candle_loss_functions;
pub mod candle_model_traits;
pub mod candle_population_model;
pub mod candle_population_net;
pub mod candle_trainer;

pub use candle_core;
pub use candle_nn;
