use candle_core::{Device, Tensor};
use candle_util::candle_data_loader::*;
use std::sync::Arc;

fn count_data(n: usize) -> anyhow::Result<InMemoryData> {
    let x = Tensor::arange(0f32, n as f32, &Device::Cpu)?.reshape((n, 1))?;
    let y = (&x * 2.)?;
    InMemoryData::new(x, y)
}

#[test]
fn minibatches_partition_all_samples() {
    let mut mb = Minibatches::new(10);

    mb.shuffle_minibatch(4);
    let sizes: Vec<usize> = mb.chunks.iter().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);

    let mut seen: Vec<usize> = mb.chunks.concat();
    seen.sort();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());

    mb.sequential_minibatch(5);
    assert_eq!(mb.chunks, vec![vec![0, 1, 2, 3, 4], vec![5, 6, 7, 8, 9]]);
}

#[test]
fn prefetch_loader_visits_each_sample_once() -> anyhow::Result<()> {
    let data = Arc::new(count_data(11)?);

    let mut loader = PrefetchLoader::new(
        data,
        LoaderArgs {
            batch_size: 3,
            num_workers: 2,
            pin_memory: false,
            shuffle: true,
        },
    )?;

    assert_eq!(loader.num_minibatch(), 4);

    for _epoch in 0..3 {
        let mut inputs = vec![];
        let mut sizes = vec![];

        for mb in loader.epoch(&Device::Cpu)? {
            let mb = mb?;
            sizes.push(mb.num_samples());

            let x = mb.input.flatten_all()?.to_vec1::<f32>()?;
            let y = mb.output.flatten_all()?.to_vec1::<f32>()?;
            for (xi, yi) in x.iter().zip(y.iter()) {
                assert_eq!(*yi, xi * 2.);
            }
            inputs.extend(x);
        }

        sizes.sort();
        assert_eq!(sizes, vec![2, 3, 3, 3]);

        inputs.sort_by(|a, b| a.total_cmp(b));
        let expected: Vec<f32> = (0..11).map(|i| i as f32).collect();
        assert_eq!(inputs, expected);
    }

    Ok(())
}

#[test]
fn sequential_loader_keeps_order() -> anyhow::Result<()> {
    let mut loader = PrefetchLoader::new(
        Arc::new(count_data(7)?),
        LoaderArgs {
            batch_size: 2,
            num_workers: 3,
            pin_memory: true,
            shuffle: false,
        },
    )?;

    let mut inputs = vec![];
    for mb in loader.epoch(&Device::Cpu)? {
        inputs.extend(mb?.input.flatten_all()?.to_vec1::<f32>()?);
    }

    assert_eq!(inputs, vec![0., 1., 2., 3., 4., 5., 6.]);
    Ok(())
}

#[test]
fn dropping_an_epoch_early_is_fine() -> anyhow::Result<()> {
    let mut loader = PrefetchLoader::new(
        Arc::new(count_data(100)?),
        LoaderArgs {
            batch_size: 1,
            num_workers: 2,
            pin_memory: false,
            shuffle: false,
        },
    )?;

    let first = loader.epoch(&Device::Cpu)?.next().expect("a minibatch")?;
    assert_eq!(first.input.flatten_all()?.to_vec1::<f32>()?, vec![0.]);

    // a fresh epoch starts over
    assert_eq!(loader.epoch(&Device::Cpu)?.count(), 100);
    Ok(())
}

#[test]
fn out_of_range_samples_surface_as_errors() -> anyhow::Result<()> {
    let data = count_data(3)?;
    assert!(data.take_samples(&[0, 3]).is_err());
    assert_eq!(data.take_samples(&[2, 0])?.num_samples(), 2);
    Ok(())
}

#[test]
fn invalid_loader_args() -> anyhow::Result<()> {
    let data = Arc::new(count_data(3)?);

    let zero_batch = LoaderArgs {
        batch_size: 0,
        ..Default::default()
    };
    assert!(PrefetchLoader::new(data.clone(), zero_batch).is_err());

    let zero_workers = LoaderArgs {
        num_workers: 0,
        ..Default::default()
    };
    assert!(PrefetchLoader::new(data, zero_workers).is_err());
    Ok(())
}
