use std::path::PathBuf;

pub struct TrainConfig {
    pub num_epochs: usize,
    /// stop after this many epochs without a better validation loss
    pub early_stopping: Option<usize>,
    /// where the best model so far goes
    pub save_path: Option<PathBuf>,
    pub verbose: bool,
    pub show_progress: bool,
}
