use anyhow::{anyhow, Context};
use candle_util::candle_core::{DType, Device, Tensor};
use candle_util::candle_data_loader::*;
use log::info;
use std::collections::HashMap;
use std::path::Path;

pub const HEIGHT_KEY: &str = "z";

/// name of the LTE window array of each split
pub fn input_key(split: Split) -> &'static str {
    match split {
        Split::Train => "lte training windows",
        Split::Val => "lte test windows",
    }
}

/// name of the non-LTE target array of each split
pub fn output_key(split: Split) -> &'static str {
    match split {
        Split::Train => "non lte training points",
        Split::Val => "non lte test points",
    }
}

/// One split of a population data file
///
/// ```text
/// (file)
///     ├── z                        (depth)
///     ├── lte training windows     (n x levels x depth x w x w)
///     ├── non lte training points  (n x levels x depth) or (n x levels x 1 x 1 x depth)
///     ├── lte test windows         (m x levels x depth x w x w)
///     └── non lte test points      (m x levels x depth) or (m x levels x 1 x 1 x depth)
/// ```
///
pub struct PopulationDataset {
    split: Split,
    input: Tensor,
    output: Tensor,
    z: Option<Vec<f32>>,
}

impl PopulationDataset {
    /// Read the arrays of `split` from a `.safetensors` file, or from
    /// an `.h5`/`.hdf5` file with the `hdf5` feature
    ///
    /// * `data_file` - population data file
    /// * `split` - train or val
    pub fn open(data_file: &str, split: Split) -> anyhow::Result<Self> {
        let keys = [HEIGHT_KEY, input_key(split), output_key(split)];

        let mut arrays = read_arrays(data_file, &keys)
            .with_context(|| format!("failed to read {}", data_file))?;

        let input = arrays
            .remove(input_key(split))
            .ok_or(anyhow!("no `{}` in {}", input_key(split), data_file))?;

        let output = arrays
            .remove(output_key(split))
            .ok_or(anyhow!("no `{}` in {}", output_key(split), data_file))?;

        let z = arrays.remove(HEIGHT_KEY);

        let ret = Self::from_tensors(split, input, output, z)?;

        info!(
            "{} data: {} samples, {} levels x {} depth points, {}x{} windows",
            split,
            ret.len(),
            ret.num_channels(),
            ret.num_features(),
            ret.window(),
            ret.window()
        );

        Ok(ret)
    }

    /// Check and put together the arrays of a split
    ///
    /// * `input` - LTE windows (n x levels x depth x w x w)
    /// * `output` - non-LTE targets (n x levels x depth)
    /// * `z` - height grid (depth)
    pub fn from_tensors(
        split: Split,
        input: Tensor,
        output: Tensor,
        z: Option<Tensor>,
    ) -> anyhow::Result<Self> {
        let input = input.to_dtype(DType::F32)?;
        let (n, c, d, w1, w2) = input
            .dims5()
            .context("LTE windows should be n x levels x depth x w x w")?;

        if w1 != w2 {
            return Err(anyhow!("non-square windows: {} x {}", w1, w2));
        }

        let output = output.to_dtype(DType::F32)?;
        let output = match output.rank() {
            3 => output,
            5 => {
                let (m, cc, a, b, dd) = output.dims5()?;
                if a * b != 1 {
                    return Err(anyhow!("targets should be single columns: {} x {}", a, b));
                }
                output.reshape((m, cc, dd))?
            }
            r => return Err(anyhow!("targets of rank {} are not supported", r)),
        };

        if output.dims() != [n, c, d] {
            return Err(anyhow!(
                "inputs ({}, {}, {}) and targets {:?} don't match",
                n,
                c,
                d,
                output.dims()
            ));
        }

        let z = match z {
            Some(z) => {
                let z = z.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
                if z.len() != d {
                    return Err(anyhow!("{} heights vs. {} depth points", z.len(), d));
                }
                Some(z)
            }
            None => None,
        };

        Ok(Self {
            split,
            input,
            output,
            z,
        })
    }

    /// Keep only the first `size` samples
    pub fn with_size(self, size: Option<usize>) -> anyhow::Result<Self> {
        match size {
            None => Ok(self),
            Some(size) if size > self.len() => Err(anyhow!(
                "asked for {} {} samples, but only {} available",
                size,
                self.split,
                self.len()
            )),
            Some(size) => Ok(Self {
                input: self.input.narrow(0, 0, size)?,
                output: self.output.narrow(0, 0, size)?,
                ..self
            }),
        }
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn len(&self) -> usize {
        self.input.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_channels(&self) -> usize {
        self.input.dims()[1]
    }

    pub fn num_features(&self) -> usize {
        self.input.dims()[2]
    }

    pub fn window(&self) -> usize {
        self.input.dims()[3]
    }

    /// The `i`-th (window, target) pair
    pub fn get(&self, i: usize) -> anyhow::Result<(Tensor, Tensor)> {
        check_indices(&[i], self.len())?;
        Ok((
            self.input.narrow(0, i, 1)?.squeeze(0)?,
            self.output.narrow(0, i, 1)?.squeeze(0)?,
        ))
    }

    /// The height grid; nothing for an empty view
    pub fn height_vector(&self) -> Option<Vec<f32>> {
        if self.is_empty() {
            None
        } else {
            self.z.clone()
        }
    }
}

impl SampleSource for PopulationDataset {
    fn num_samples(&self) -> usize {
        self.len()
    }

    fn take_samples(&self, indices: &[usize]) -> anyhow::Result<MinibatchData> {
        check_indices(indices, self.len())?;
        Ok(MinibatchData {
            input: take_rows(&self.input, indices)?,
            output: take_rows(&self.output, indices)?,
        })
    }
}

/// Write named arrays into a `.safetensors` file
pub fn write_arrays(arrays: &HashMap<String, Tensor>, data_file: &str) -> anyhow::Result<()> {
    if let Some(dir) = Path::new(data_file).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    candle_util::candle_core::safetensors::save(arrays, data_file)?;
    Ok(())
}

/// Read the arrays among `keys` present in `data_file`
pub fn read_arrays(data_file: &str, keys: &[&str]) -> anyhow::Result<HashMap<String, Tensor>> {
    let ext = Path::new(data_file)
        .extension()
        .and_then(|x| x.to_str())
        .map(|x| x.to_lowercase());

    match ext.as_deref() {
        Some("safetensors") => {
            let mut arrays = candle_util::candle_core::safetensors::load(data_file, &Device::Cpu)?;
            arrays.retain(|k, _| keys.contains(&k.as_str()));
            Ok(arrays)
        }
        Some("h5") | Some("hdf5") => read_hdf5_arrays(data_file, keys),
        _ => Err(anyhow!("unknown data file format: {}", data_file)),
    }
}

#[cfg(feature = "hdf5")]
fn read_hdf5_arrays(data_file: &str, keys: &[&str]) -> anyhow::Result<HashMap<String, Tensor>> {
    let file = hdf5::File::open(data_file)?;
    let mut arrays = HashMap::new();

    for &key in keys {
        if let Ok(dataset) = file.dataset(key) {
            let arr = dataset.read_dyn::<f32>()?;
            let shape = arr.shape().to_vec();
            let data = arr.iter().copied().collect::<Vec<f32>>();
            arrays.insert(key.to_string(), Tensor::from_vec(data, shape, &Device::Cpu)?);
        }
    }
    Ok(arrays)
}

#[cfg(not(feature = "hdf5"))]
fn read_hdf5_arrays(data_file: &str, _keys: &[&str]) -> anyhow::Result<HashMap<String, Tensor>> {
    Err(anyhow!(
        "{}: reading HDF5 needs the `hdf5` feature; convert to .safetensors otherwise",
        data_file
    ))
}
