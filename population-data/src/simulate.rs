use crate::population_dataset::*;

use candle_util::candle_core::{Device, Tensor};
use candle_util::candle_data_loader::Split;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;

pub struct SimArgs {
    pub n_train: usize,
    pub n_val: usize,
    pub n_channels: usize,
    pub n_features: usize,
    pub window: usize,
    /// height of the top of the grid
    pub z_max: f32,
    pub noise: f32,
    pub rseed: u64,
}

impl Default for SimArgs {
    fn default() -> Self {
        Self {
            n_train: 64,
            n_val: 16,
            n_channels: 6,
            n_features: 400,
            window: 7,
            z_max: 2.0,
            noise: 0.05,
            rseed: 42,
        }
    }
}

///
/// Simulate log populations of stratified columns. Each level
/// decays with height on top of a column-specific offset; the non-LTE
/// target of the central column departs from its LTE value by a
/// smooth level- and height-dependent amount.
///
/// Returns arrays keyed as `PopulationDataset` expects them.
///
pub fn simulate_population_data(args: &SimArgs) -> anyhow::Result<HashMap<String, Tensor>> {
    if args.window % 2 == 0 {
        return Err(anyhow::anyhow!("window should be odd: {}", args.window));
    }
    if args.n_features < 2 {
        return Err(anyhow::anyhow!("need at least two depth points"));
    }

    let mut rng = StdRng::seed_from_u64(args.rseed);

    let dz = args.z_max / (args.n_features - 1) as f32;
    let z: Vec<f32> = (0..args.n_features).map(|d| d as f32 * dz).collect();

    let mut arrays = HashMap::new();

    for (split, n) in [(Split::Train, args.n_train), (Split::Val, args.n_val)] {
        let (x, y) = simulate_split(n, &z, args, &mut rng)?;
        arrays.insert(input_key(split).to_string(), x);
        arrays.insert(output_key(split).to_string(), y);
    }

    arrays.insert(
        HEIGHT_KEY.to_string(),
        Tensor::from_vec(z, args.n_features, &Device::Cpu)?,
    );

    info!(
        "simulated {} + {} samples of {} levels x {} depth points",
        args.n_train, args.n_val, args.n_channels, args.n_features
    );

    Ok(arrays)
}

fn simulate_split(
    n: usize,
    z: &[f32],
    args: &SimArgs,
    rng: &mut StdRng,
) -> anyhow::Result<(Tensor, Tensor)> {
    let (nc, nd, w) = (args.n_channels, args.n_features, args.window);
    let center = w / 2;

    let offset = Normal::new(0f32, 0.3)?;
    let noise = Normal::new(0f32, args.noise.max(f32::EPSILON))?;

    let mut x_data = Vec::with_capacity(n * nc * nd * w * w);
    let mut y_data = Vec::with_capacity(n * nc * nd);

    for _ in 0..n {
        let column_offset: Vec<f32> = (0..w * w).map(|_| offset.sample(rng)).collect();

        for c in 0..nc {
            let level = -(c as f32);
            let mut center_profile = Vec::with_capacity(nd);

            for &zd in z {
                let lte = level - zd / args.z_max;
                for i in 0..w {
                    for j in 0..w {
                        let value = lte + column_offset[i * w + j] + noise.sample(rng);
                        if i == center && j == center {
                            center_profile.push(value);
                        }
                        x_data.push(value);
                    }
                }
            }

            for (d, &zd) in z.iter().enumerate() {
                let departure = 0.1 * (c + 1) as f32 * (zd / args.z_max * 4. - 2.).tanh();
                y_data.push(center_profile[d] + departure);
            }
        }
    }

    let x = Tensor::from_vec(x_data, (n, nc, nd, w, w), &Device::Cpu)?;
    let y = Tensor::from_vec(y_data, (n, nc, nd), &Device::Cpu)?;
    Ok((x, y))
}
