use candle_util::candle_core::{DType, Device, Tensor};
use candle_util::candle_data_loader::*;
use population_data::population_dataset::*;
use population_data::simulate::*;
use std::sync::Arc;

fn small_sim() -> SimArgs {
    SimArgs {
        n_train: 10,
        n_val: 4,
        n_channels: 3,
        n_features: 12,
        window: 3,
        ..Default::default()
    }
}

#[test]
fn simulated_file_opens_per_split() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let data_file = dir.path().join("pops.safetensors");
    let data_file = data_file.to_str().unwrap();

    let args = small_sim();
    write_arrays(&simulate_population_data(&args)?, data_file)?;

    let train = PopulationDataset::open(data_file, Split::Train)?;
    let val = PopulationDataset::open(data_file, Split::Val)?;

    assert_eq!(train.len(), 10);
    assert_eq!(val.len(), 4);
    assert_eq!(train.num_channels(), 3);
    assert_eq!(train.num_features(), 12);
    assert_eq!(train.window(), 3);

    let z = train.height_vector().expect("heights");
    assert_eq!(z.len(), 12);
    approx::assert_abs_diff_eq!(z[0], 0.0);
    approx::assert_abs_diff_eq!(z[11], args.z_max, epsilon = 1e-5);

    let (x, y) = val.get(3)?;
    assert_eq!(x.dims(), &[3, 12, 3, 3]);
    assert_eq!(y.dims(), &[3, 12]);
    assert!(val.get(4).is_err());

    Ok(())
}

#[test]
fn restrict_split_size() -> anyhow::Result<()> {
    let arrays = simulate_population_data(&small_sim())?;
    let x = arrays[input_key(Split::Train)].clone();
    let y = arrays[output_key(Split::Train)].clone();
    let z = arrays.get(HEIGHT_KEY).cloned();

    let data = PopulationDataset::from_tensors(Split::Train, x.clone(), y.clone(), z.clone())?;
    let data = data.with_size(Some(6))?;
    assert_eq!(data.len(), 6);
    assert_eq!(data.take_samples(&[5])?.num_samples(), 1);
    assert!(data.take_samples(&[6]).is_err());

    let data = PopulationDataset::from_tensors(Split::Train, x, y, z)?;
    assert!(data.with_size(Some(11)).is_err());
    Ok(())
}

#[test]
fn single_column_targets_are_flattened() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let x = Tensor::zeros((2, 3, 5, 1, 1), DType::F32, &dev)?;
    let y = Tensor::ones((2, 3, 1, 1, 5), DType::F64, &dev)?;

    let data = PopulationDataset::from_tensors(Split::Val, x, y, None)?;
    let (_, target) = data.get(0)?;
    assert_eq!(target.dims(), &[3, 5]);
    assert_eq!(target.dtype(), DType::F32);

    // no `z` in the file, no heights
    assert!(data.height_vector().is_none());
    Ok(())
}

#[test]
fn mismatched_arrays_are_rejected() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let x = Tensor::zeros((2, 3, 5, 3, 3), DType::F32, &dev)?;

    let fewer_samples = Tensor::zeros((1, 3, 5), DType::F32, &dev)?;
    assert!(PopulationDataset::from_tensors(Split::Train, x.clone(), fewer_samples, None).is_err());

    let y = Tensor::zeros((2, 3, 5), DType::F32, &dev)?;
    let wrong_heights = Tensor::zeros(4, DType::F32, &dev)?;
    let wrong_z = Some(wrong_heights);
    assert!(PopulationDataset::from_tensors(Split::Train, x.clone(), y.clone(), wrong_z).is_err());

    let not_windows = Tensor::zeros((2, 3, 5), DType::F32, &dev)?;
    assert!(PopulationDataset::from_tensors(Split::Train, not_windows, y, None).is_err());
    Ok(())
}

#[test]
fn empty_view_has_no_heights() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let x = Tensor::zeros((0, 2, 4, 1, 1), DType::F32, &dev)?;
    let y = Tensor::zeros((0, 2, 4), DType::F32, &dev)?;
    let z = Tensor::new(&[0f32, 1., 2., 3.], &dev)?;

    let data = PopulationDataset::from_tensors(Split::Train, x, y, Some(z))?;
    assert!(data.is_empty());
    assert!(data.height_vector().is_none());
    Ok(())
}

#[test]
fn unknown_formats_fail() {
    assert!(PopulationDataset::open("pops.csv", Split::Train).is_err());
    assert!(PopulationDataset::open("/no/such/file.safetensors", Split::Train).is_err());
}

#[test]
fn dataset_feeds_a_loader() -> anyhow::Result<()> {
    let arrays = simulate_population_data(&small_sim())?;
    let data = PopulationDataset::from_tensors(
        Split::Val,
        arrays[input_key(Split::Val)].clone(),
        arrays[output_key(Split::Val)].clone(),
        arrays.get(HEIGHT_KEY).cloned(),
    )?;

    let mut loader = PrefetchLoader::new(
        Arc::new(data),
        LoaderArgs {
            batch_size: 3,
            num_workers: 2,
            pin_memory: true,
            shuffle: false,
        },
    )?;

    let sizes = loader
        .epoch(&Device::Cpu)?
        .map(|mb| mb.map(|mb| mb.input.dims().to_vec()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    assert_eq!(sizes, vec![vec![3, 3, 12, 3, 3], vec![1, 3, 12, 3, 3]]);
    Ok(())
}

#[test]
fn extensions_ignore_case() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let data_file = dir.path().join("pops.SafeTensors");
    let data_file = data_file.to_str().unwrap();

    write_arrays(&simulate_population_data(&small_sim())?, data_file)?;
    assert_eq!(PopulationDataset::open(data_file, Split::Val)?.len(), 4);
    Ok(())
}

#[cfg(not(feature = "hdf5"))]
#[test]
fn hdf5_needs_the_feature() {
    match PopulationDataset::open("pops.H5", Split::Train) {
        Err(err) => assert!(format!("{:#}", err).contains("`hdf5` feature")),
        Ok(_) => panic!("opened an HDF5 file without the `hdf5` feature"),
    }
}

#[cfg(feature = "hdf5")]
#[test]
fn hdf5_file_opens_per_split() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let data_file = dir.path().join("pops.H5");

    let arrays = simulate_population_data(&small_sim())?;
    {
        let file = hdf5::File::create(&data_file)?;
        for (key, tensor) in arrays.iter() {
            let data = tensor.flatten_all()?.to_vec1::<f32>()?;
            file.new_dataset::<f32>()
                .shape(tensor.dims().to_vec())
                .create(key.as_str())?
                .write_raw(data.as_slice())?;
        }
    }

    let data_file = data_file.to_str().unwrap();
    let train = PopulationDataset::open(data_file, Split::Train)?;
    assert_eq!(train.len(), 10);
    assert_eq!(train.window(), 3);
    assert_eq!(train.height_vector().map(|z| z.len()), Some(12));

    let (x, y) = train.get(0)?;
    let (x0, y0) = (
        arrays[input_key(Split::Train)].get(0)?,
        arrays[output_key(Split::Train)].get(0)?,
    );
    let diff = (x - x0)?.abs()?.sum_all()?.to_scalar::<f32>()?
        + (y - y0)?.abs()?.sum_all()?.to_scalar::<f32>()?;
    approx::assert_abs_diff_eq!(diff, 0.0);
    Ok(())
}
