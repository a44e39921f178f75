use crate::diagnostics::Diagnostics;
use crate::sunny_common::*;

use clap::Args;

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[arg(help = "Population data file to summarize")]
    pub data_path: Option<Box<str>>,
}

pub fn run_info(args: &InfoArgs) -> anyhow::Result<()> {
    println!("{}", Diagnostics::collect());

    if let Some(data_path) = args.data_path.as_deref() {
        for split in [Split::Train, Split::Val] {
            let data = PopulationDataset::open(data_path, split)?;
            println!("{}", summarize(&data));
        }
    }
    Ok(())
}

/// One line about a split of a data file
pub fn summarize(data: &PopulationDataset) -> String {
    let heights = match data.height_vector() {
        Some(z) => {
            let lo = z.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = z.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            format!("z in [{}, {}]", lo, hi)
        }
        None => "no z".to_string(),
    };

    format!(
        "{}: {} samples, {} levels x {} depth points, {}x{} windows, {}",
        data.split(),
        data.len(),
        data.num_channels(),
        data.num_features(),
        data.window(),
        data.window(),
        heights
    )
}
