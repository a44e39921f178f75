pub use log::{info, warn};
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use candle_util::candle_data_loader::*;
pub use candle_util::candle_inference::TrainConfig;
pub use candle_util::candle_model_traits::*;
pub use candle_util::candle_population_model::*;
pub use candle_util::candle_population_net::PopulationArch;
pub use candle_util::candle_trainer::*;
pub use candle_util::candle_core;

pub use population_data::population_dataset::*;
pub use population_data::simulate::*;

pub const DEFAULT_MODEL_FILE: &str = "trained_model.safetensors";
pub const LOSS_LOG_SUFFIX: &str = "_loss.txt";
pub const CONFIG_SUFFIX: &str = "_config.json";
