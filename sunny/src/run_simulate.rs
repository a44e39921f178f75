use crate::sunny_common::*;

use anyhow::anyhow;
use clap::Args;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(
        long,
        short,
        required = true,
        help = "Output data file",
        long_help = "Output data file (`.safetensors`)."
    )]
    pub out: Box<str>,

    #[arg(long, default_value_t = 64, help = "Number of training samples")]
    pub n_train: usize,

    #[arg(long, default_value_t = 16, help = "Number of validation samples")]
    pub n_val: usize,

    #[arg(long, default_value_t = 6, help = "Number of atomic levels")]
    pub n_channels: usize,

    #[arg(long, default_value_t = 400, help = "Number of depth points")]
    pub n_features: usize,

    #[arg(
        long,
        short,
        default_value_t = 7,
        help = "Window size",
        long_help = "Horizontal window size around each column (odd).\n\
		     Use 1, 3, 5 or 7 to match a SunnyNet architecture."
    )]
    pub window: usize,

    #[arg(long, default_value_t = 2.0, help = "Height of the top of the grid")]
    pub z_max: f32,

    #[arg(long, default_value_t = 0.05, help = "Noise standard deviation")]
    pub noise: f32,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    pub rseed: u64,

    #[arg(long, default_value_t = false, help = "Overwrite an existing file")]
    pub overwrite: bool,
}

pub fn run_simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    if Path::new(args.out.as_ref()).exists() && !args.overwrite {
        return Err(anyhow!(
            "{} already exists; use --overwrite to replace it",
            args.out
        ));
    }

    if !args.out.ends_with(".safetensors") {
        return Err(anyhow!("simulated data go to a `.safetensors` file"));
    }

    let arrays = simulate_population_data(&SimArgs {
        n_train: args.n_train,
        n_val: args.n_val,
        n_channels: args.n_channels,
        n_features: args.n_features,
        window: args.window,
        z_max: args.z_max,
        noise: args.noise,
        rseed: args.rseed,
    })?;

    write_arrays(&arrays, &args.out)?;
    info!("Wrote {}", args.out);
    Ok(())
}
