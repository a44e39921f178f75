use crate::diagnostics::Diagnostics;
use crate::loss_log::write_loss_log;
use crate::run_config::RunConfig;
use crate::sunny_common::*;

use anyhow::{anyhow, Context};
use clap::Args;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(
        long,
        short = 'd',
        required = true,
        help = "Population data file",
        long_help = "Population data file with `z`, LTE windows and non-LTE\n\
		     targets of the training and test sets (`.safetensors`, or `.h5`\n\
		     when built with the `hdf5` feature)."
    )]
    pub data_path: Box<str>,

    #[arg(
        long,
        short = 'o',
        required = true,
        help = "Output folder",
        long_help = "Output folder for results (created if missing):\n\
		     - {folder}/{model_save}\n\
		     - {folder}/{stem}_loss.txt\n\
		     - {folder}/{stem}_config.json\n"
    )]
    pub save_folder: Box<str>,

    #[arg(
        long,
        short = 'm',
        default_value = DEFAULT_MODEL_FILE,
        help = "Model file name",
        long_help = "File name of the trained model inside the output folder.\n\
		     Training refuses to start if this file already exists."
    )]
    pub model_save: Box<str>,

    #[arg(
        long,
        value_enum,
        default_value = "SunnyNet_7x7",
        help = "Network architecture",
        long_help = "Network architecture. The window size of the architecture\n\
		     should match the windows of the data file."
    )]
    pub arch: PopulationArch,

    #[arg(long, value_enum, default_value = "Adam", help = "Optimizer")]
    pub optimizer: OptimizerType,

    #[arg(long, value_enum, default_value = "MSELoss", help = "Cell-by-cell loss function")]
    pub loss_fn: LossType,

    #[arg(long, default_value_t = 1e-3, help = "Learning rate")]
    pub learning_rate: f32,

    #[arg(
        long,
        default_value_t = 6,
        help = "Number of atomic levels",
        long_help = "Number of atomic levels (channels) in each population."
    )]
    pub n_channels: usize,

    #[arg(
        long,
        default_value_t = 400,
        help = "Number of depth points",
        long_help = "Number of depth points (features) in each column."
    )]
    pub n_features: usize,

    #[arg(
        long,
        value_delimiter(','),
        default_values_t = vec![32, 32],
        help = "Hidden channels",
        long_help = "Widths of the hidden convolution layers (comma-separated).\n\
		     Example: 32,32"
    )]
    pub hidden_channels: Vec<usize>,

    #[arg(
        long,
        default_value_t = 0.2,
        help = "Weight of the mass-conservation loss",
        long_help = "Weight of the mass-conservation loss in [0, 1].\n\
		     loss = (1 - alpha) * cell_loss + alpha * mass_loss"
    )]
    pub alpha: f32,

    #[arg(
        long,
        default_value_t = false,
        help = "Drop the mass-conservation loss",
        long_help = "Train with the cell-by-cell loss only, ignoring `--alpha`."
    )]
    pub no_mass_loss: bool,

    #[arg(long, short = 'i', default_value_t = 50, help = "Number of epochs")]
    pub num_epochs: usize,

    #[arg(
        long,
        default_value_t = 5,
        help = "Early stopping patience",
        long_help = "Stop after this many epochs without a better validation loss.\n\
		     Set to 0 to run all the epochs."
    )]
    pub early_stopping: usize,

    #[arg(
        long,
        help = "Number of training samples",
        long_help = "Use only the first {n} training samples.\n\
		     If not specified, all of them."
    )]
    pub train_size: Option<usize>,

    #[arg(
        long,
        help = "Number of validation samples",
        long_help = "Use only the first {n} validation samples.\n\
		     If not specified, all of them."
    )]
    pub val_size: Option<usize>,

    #[arg(long, default_value_t = 128, help = "Minibatch size of training")]
    pub batch_size_train: usize,

    #[arg(long, default_value_t = 128, help = "Minibatch size of validation")]
    pub batch_size_val: usize,

    #[arg(
        long,
        help = "Number of loader threads",
        long_help = "Number of threads assembling minibatches, shared by\n\
		     the training and validation loaders.\n\
		     If not specified, the number of CPUs."
    )]
    pub num_workers: Option<usize>,

    #[arg(
        long,
        default_value_t = false,
        help = "Move minibatches on the main thread",
        long_help = "Let the training loop move minibatches to the device\n\
		     instead of the loader threads."
    )]
    pub no_pin_memory: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Keep the order of training samples",
        long_help = "Visit training samples in the file order every epoch.\n\
		     Validation samples are never shuffled."
    )]
    pub no_shuffle: bool,

    #[arg(long, value_enum, default_value = "auto", help = "Candle device")]
    pub device: ComputeDevice,

    #[arg(long, default_value_t = 0, help = "Device ordinal (cuda or metal)")]
    pub device_no: usize,

    #[arg(
        long,
        default_value_t = false,
        help = "Ask for multiple GPUs",
        long_help = "Ask for data-parallel training on multiple GPUs.\n\
		     Not supported by candle: training stays on one device."
    )]
    pub multi_gpu: bool,
}

impl TrainArgs {
    /// weight of the mass-conservation term, if any
    pub fn alpha(&self) -> Option<f32> {
        (!self.no_mass_loss).then_some(self.alpha)
    }

    /// Everything but the height vector, which comes from the data
    pub fn model_builder(&self) -> ModelParamsBuilder {
        ModelParams::builder()
            .arch(self.arch)
            .optimizer(self.optimizer)
            .loss_fn(self.loss_fn)
            .learning_rate(self.learning_rate)
            .n_channels(self.n_channels)
            .n_features(self.n_features)
            .hidden_channels(&self.hidden_channels)
            .alpha(self.alpha())
            .device(self.device, self.device_no)
            .multi_gpu(self.multi_gpu)
    }
}

#[derive(Serialize)]
struct RunRecord<'a> {
    config: &'a RunConfig,
    params: &'a ModelParams,
}

///
/// Train a population model:
///
/// 1. refuse to run if the model file is already there
/// 2. read train and val views of the data file
/// 3. take the height vector of the training view into the model
/// 4. train with early stopping, keeping the best model on disk
/// 5. write the per-epoch losses next to the model
///
pub fn run_train(args: &TrainArgs, verbose: bool) -> anyhow::Result<EpochLoss> {
    let config = RunConfig::try_from(args)?;

    // 1. never overwrite a trained model
    let model_path = config.model_path();
    if model_path.exists() {
        return Err(anyhow!(
            "save path already exists: {}; exiting",
            model_path.display()
        ));
    }

    Diagnostics::collect().log();
    info!("Requested device: {:?} (#{})", args.device, args.device_no);
    info!("Using {} architecture", args.arch);

    // 2. datasets
    info!("Creating datasets ...");
    let train_data =
        PopulationDataset::open(config.data_path(), Split::Train)?.with_size(config.train_size())?;

    let mut builder = args.model_builder();
    if let Some(z) = train_data.height_vector() {
        builder = builder.height_vector(z);
    }
    let params = builder
        .build()
        .context("failed to set up the model from the training data")?;

    let val_data =
        PopulationDataset::open(config.data_path(), Split::Val)?.with_size(config.val_size())?;

    check_views(&train_data, &val_data, &params)?;

    // 3. loaders
    info!("Creating data loaders ...");
    let mut loaders = LoaderRegistry {
        train: PrefetchLoader::new(Arc::new(train_data), config.loader_args(Split::Train))?,
        val: PrefetchLoader::new(Arc::new(val_data), config.loader_args(Split::Val))?,
    };

    // 4. model
    let mut model = PopulationModel::new(params)?;
    info!("Training on {:?}", model.device().location());

    std::fs::create_dir_all(config.save_folder())?;
    write_run_record(&config, model.params())?;

    let epoch_loss = train_population_model(
        &mut model,
        &mut loaders,
        &config.train_config(verbose),
    )?;

    // 5. losses
    let loss_file = config.loss_log_path();
    write_loss_log(&epoch_loss, &loss_file)?;

    if let Some((epoch, loss)) = epoch_loss.best_val() {
        info!("Best val loss {} at epoch {}", loss, epoch + 1);
    }
    info!("Done");
    Ok(epoch_loss)
}

fn check_views(
    train: &PopulationDataset,
    val: &PopulationDataset,
    params: &ModelParams,
) -> anyhow::Result<()> {
    for data in [train, val] {
        if data.num_channels() != params.n_channels() || data.num_features() != params.n_features()
        {
            return Err(anyhow!(
                "{} data has {} levels x {} depth points, but the model expects {} x {}",
                data.split(),
                data.num_channels(),
                data.num_features(),
                params.n_channels(),
                params.n_features()
            ));
        }
        if data.window() != params.arch().window() {
            return Err(anyhow!(
                "{} data has {}x{} windows, but {} reads {}x{}",
                data.split(),
                data.window(),
                data.window(),
                params.arch(),
                params.arch().window(),
                params.arch().window()
            ));
        }
    }
    Ok(())
}

fn write_run_record(config: &RunConfig, params: &ModelParams) -> anyhow::Result<()> {
    let config_file = config.config_path();
    let writer = BufWriter::new(
        File::create(&config_file)
            .with_context(|| format!("failed to create {}", config_file.display()))?,
    );
    serde_json::to_writer_pretty(writer, &RunRecord { config, params })?;
    info!("Wrote the configuration: {}", config_file.display());
    Ok(())
}
