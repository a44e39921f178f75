use crate::run_train::TrainArgs;
use crate::sunny_common::*;

use anyhow::anyhow;
use serde::Serialize;

/// Where the data comes from, where the results go, and how the
/// loaders and the training loop run
#[derive(Clone, Debug, Serialize)]
pub struct RunConfig {
    data_path: Box<str>,
    save_folder: PathBuf,
    model_save: Box<str>,
    num_epochs: usize,
    early_stopping: Option<usize>,
    train_size: Option<usize>,
    val_size: Option<usize>,
    batch_size_train: usize,
    batch_size_val: usize,
    num_workers: usize,
    pin_memory: bool,
    shuffle: bool,
}

impl TryFrom<&TrainArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: &TrainArgs) -> anyhow::Result<Self> {
        let model_save = args.model_save.trim();

        if model_save.is_empty() {
            return Err(anyhow!("empty model file name"));
        }

        let model_file = Path::new(model_save);
        if model_file.components().count() != 1 || model_file.file_stem().is_none() {
            return Err(anyhow!(
                "model file name should be a plain file name: {}",
                model_save
            ));
        }

        if args.num_epochs == 0 {
            return Err(anyhow!("need at least one epoch"));
        }

        if args.batch_size_train == 0 || args.batch_size_val == 0 {
            return Err(anyhow!(
                "batch sizes should be positive: train {}, val {}",
                args.batch_size_train,
                args.batch_size_val
            ));
        }

        let num_workers = args.num_workers.unwrap_or_else(num_cpus::get);
        if num_workers == 0 {
            return Err(anyhow!("need at least one loader thread"));
        }

        Ok(Self {
            data_path: args.data_path.clone(),
            save_folder: PathBuf::from(args.save_folder.as_ref()),
            model_save: model_save.into(),
            num_epochs: args.num_epochs,
            early_stopping: (args.early_stopping > 0).then_some(args.early_stopping),
            train_size: args.train_size,
            val_size: args.val_size,
            batch_size_train: args.batch_size_train,
            batch_size_val: args.batch_size_val,
            num_workers,
            pin_memory: !args.no_pin_memory,
            shuffle: !args.no_shuffle,
        })
    }
}

impl RunConfig {
    pub fn data_path(&self) -> &str {
        &self.data_path
    }

    pub fn save_folder(&self) -> &Path {
        &self.save_folder
    }

    pub fn num_epochs(&self) -> usize {
        self.num_epochs
    }

    pub fn early_stopping(&self) -> Option<usize> {
        self.early_stopping
    }

    pub fn train_size(&self) -> Option<usize> {
        self.train_size
    }

    pub fn val_size(&self) -> Option<usize> {
        self.val_size
    }

    /// `{save_folder}/{model_save}`
    pub fn model_path(&self) -> PathBuf {
        self.save_folder.join(self.model_save.as_ref())
    }

    /// `{save_folder}/{stem}_loss.txt`
    pub fn loss_log_path(&self) -> PathBuf {
        self.save_folder
            .join(format!("{}{}", self.model_stem(), LOSS_LOG_SUFFIX))
    }

    /// `{save_folder}/{stem}_config.json`
    pub fn config_path(&self) -> PathBuf {
        self.save_folder
            .join(format!("{}{}", self.model_stem(), CONFIG_SUFFIX))
    }

    fn model_stem(&self) -> String {
        Path::new(self.model_save.as_ref())
            .file_stem()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.model_save.to_string())
    }

    /// Both loaders share the worker count and the pin-memory
    /// behaviour; only the training loader shuffles
    pub fn loader_args(&self, split: Split) -> LoaderArgs {
        LoaderArgs {
            batch_size: match split {
                Split::Train => self.batch_size_train,
                Split::Val => self.batch_size_val,
            },
            num_workers: self.num_workers,
            pin_memory: self.pin_memory,
            shuffle: split.is_train() && self.shuffle,
        }
    }

    pub fn train_config(&self, verbose: bool) -> TrainConfig {
        TrainConfig {
            num_epochs: self.num_epochs,
            early_stopping: self.early_stopping,
            save_path: Some(self.model_path()),
            verbose,
            show_progress: true,
        }
    }
}
