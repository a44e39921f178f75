use crate::run_info::InfoArgs;
use crate::run_simulate::SimulateArgs;
use crate::run_train::TrainArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sunny",
    version,
    about = "SUNNY",
    long_about = "Train convolutional networks that map LTE populations of 3-D\n\
		  atmospheric columns to their non-LTE counterparts.\n\
		  Data files of either `.safetensors` or `.h5` (with the `hdf5` feature) format.",
    term_width = 80
)]
pub struct Cli {
    #[command(subcommand)]
    pub commands: Commands,

    #[arg(
        long,
        short,
        global = true,
        help = "Verbosity",
        long_help = "Print info-level log messages.\n\
		     Progress bars are hidden in the verbose mode."
    )]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Train a population model",
        long_about = "Train a population model in the three stages: \n\
		      (1) Read train and validation views of the data file\n\
		      (2) Fit the network by SGD, keeping the best validation model\n\
		      (3) Write the per-epoch loss history next to the model.\n"
    )]
    Train(TrainArgs),

    #[command(
        about = "Simulate a population data file",
        long_about = "Simulate LTE windows and non-LTE targets of stratified\n\
		      columns, laid out as `sunny train` reads them.\n"
    )]
    Simulate(SimulateArgs),

    #[command(
        about = "Report the compute environment",
        long_about = "Report the compute environment and, if a data file is given,\n\
		      the shapes of its train and validation views.\n"
    )]
    Info(InfoArgs),
}
