use anyhow::anyhow;
use candle_core::{Device, Tensor};
use log::warn;
use rand::prelude::SliceRandom;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

/// how many minibatches per worker may wait in the channel
const PREFETCH_FACTOR: usize = 2;

/// A pair of stacked input and output tensors; the first dimension
/// indexes samples.
pub struct MinibatchData {
    pub input: Tensor,
    pub output: Tensor,
}

impl MinibatchData {
    pub fn num_samples(&self) -> usize {
        self.input.dims().first().copied().unwrap_or(0)
    }

    pub fn to_device(self, target_device: &Device) -> candle_core::Result<Self> {
        Ok(MinibatchData {
            input: self.input.to_device(target_device)?,
            output: self.output.to_device(target_device)?,
        })
    }
}

/// Anything that can hand out stacked samples by their indexes.
/// Loader workers call `take_samples` concurrently.
pub trait SampleSource: Send + Sync {
    fn num_samples(&self) -> usize;

    fn take_samples(&self, indices: &[usize]) -> anyhow::Result<MinibatchData>;
}

///
/// A simple sample source for in-memory tensors. The first
/// dimension of `input` and `output` is the sample index.
///
pub struct InMemoryData {
    input: Tensor,
    output: Tensor,
}

impl InMemoryData {
    pub fn new(input: Tensor, output: Tensor) -> anyhow::Result<Self> {
        let (n_in, n_out) = (input.dim(0)?, output.dim(0)?);
        if n_in != n_out {
            return Err(anyhow!(
                "input has {} samples, but output has {}",
                n_in,
                n_out
            ));
        }
        Ok(InMemoryData { input, output })
    }
}

impl SampleSource for InMemoryData {
    fn num_samples(&self) -> usize {
        self.input.dims().first().copied().unwrap_or(0)
    }

    fn take_samples(&self, indices: &[usize]) -> anyhow::Result<MinibatchData> {
        check_indices(indices, self.num_samples())?;
        Ok(MinibatchData {
            input: take_rows(&self.input, indices)?,
            output: take_rows(&self.output, indices)?,
        })
    }
}

/// Make sure every index falls in `[0, ntot)`
pub fn check_indices(indices: &[usize], ntot: usize) -> anyhow::Result<()> {
    if let Some(&bad) = indices.iter().find(|&&i| i >= ntot) {
        return Err(anyhow!("invalid index = {} vs. total # = {}", bad, ntot));
    }
    Ok(())
}

/// Stack the rows `indices` of `data` along the first dimension
pub fn take_rows(data: &Tensor, indices: &[usize]) -> candle_core::Result<Tensor> {
    let idx = indices.iter().map(|&i| i as u32).collect::<Vec<_>>();
    let idx = Tensor::from_vec(idx, indices.len(), data.device())?;
    data.index_select(&idx, 0)
}

///
/// A helper `struct` for creating minibatch indexes; after
/// `shuffle_minibatch` or `sequential_minibatch` is called, `chunks`
/// partition all the samples. Only the last chunk can be shorter
/// than the batch size.
///
pub struct Minibatches {
    samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    pub fn new(nsamples: usize) -> Self {
        Minibatches {
            samples: (0..nsamples).collect(),
            chunks: vec![],
        }
    }

    pub fn shuffle_minibatch(&mut self, batch_size: usize) {
        let mut rng = rand::rng();
        self.samples.shuffle(&mut rng);
        self.partition(batch_size);
    }

    pub fn sequential_minibatch(&mut self, batch_size: usize) {
        self.samples.sort_unstable();
        self.partition(batch_size);
    }

    fn partition(&mut self, batch_size: usize) {
        self.chunks = self
            .samples
            .chunks(batch_size.max(1))
            .map(<[usize]>::to_vec)
            .collect();
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }
}

/// Which part of the data a loader or a loss trace belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
        }
    }

    pub fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LoaderArgs {
    pub batch_size: usize,
    pub num_workers: usize,
    /// move minibatches to the target device inside the workers
    pub pin_memory: bool,
    pub shuffle: bool,
}

impl Default for LoaderArgs {
    fn default() -> Self {
        LoaderArgs {
            batch_size: 128,
            num_workers: num_cpus::get(),
            pin_memory: true,
            shuffle: false,
        }
    }
}

///
/// Minibatch loader over a shared `SampleSource`. Every call of
/// `epoch` partitions the samples again (shuffled or not) and starts
/// a background thread that assembles minibatches on a dedicated
/// pool of `num_workers` threads.
///
pub struct PrefetchLoader<S>
where
    S: SampleSource + 'static,
{
    data: Arc<S>,
    args: LoaderArgs,
    minibatches: Minibatches,
    pool: Arc<rayon::ThreadPool>,
}

impl<S> PrefetchLoader<S>
where
    S: SampleSource + 'static,
{
    pub fn new(data: Arc<S>, args: LoaderArgs) -> anyhow::Result<Self> {
        if args.batch_size == 0 {
            return Err(anyhow!("batch size must be positive"));
        }
        if args.num_workers == 0 {
            return Err(anyhow!("need at least one loader worker"));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.num_workers)
            .thread_name(|i| format!("loader-{}", i))
            .build()?;

        let minibatches = Minibatches::new(data.num_samples());

        Ok(PrefetchLoader {
            data,
            args,
            minibatches,
            pool: Arc::new(pool),
        })
    }

    pub fn args(&self) -> &LoaderArgs {
        &self.args
    }

    pub fn num_samples(&self) -> usize {
        self.minibatches.size()
    }

    pub fn num_minibatch(&self) -> usize {
        self.num_samples().div_ceil(self.args.batch_size)
    }

    /// Start one pass over the data. Minibatches come out in chunk
    /// order and live on `target_device`.
    pub fn epoch(&mut self, target_device: &Device) -> anyhow::Result<PrefetchBatches> {
        if self.args.shuffle {
            self.minibatches.shuffle_minibatch(self.args.batch_size);
        } else {
            self.minibatches.sequential_minibatch(self.args.batch_size);
        }

        let chunks = self.minibatches.chunks.clone();
        let expected = chunks.len();
        let group_size = self.args.num_workers;

        let (tx, rx) = sync_channel(self.args.num_workers * PREFETCH_FACTOR);

        let data = self.data.clone();
        let pool = self.pool.clone();
        let pinned = self.args.pin_memory.then(|| target_device.clone());

        let producer = std::thread::Builder::new()
            .name("loader-prefetch".into())
            .spawn(move || {
                for group in chunks.chunks(group_size) {
                    let batches: Vec<anyhow::Result<MinibatchData>> = pool.install(|| {
                        group
                            .par_iter()
                            .map(|samples| {
                                let mb = data.take_samples(samples)?;
                                match pinned.as_ref() {
                                    Some(dev) => Ok(mb.to_device(dev)?),
                                    None => Ok(mb),
                                }
                            })
                            .collect()
                    });

                    for mb in batches {
                        if tx.send(mb).is_err() {
                            // consumer is gone
                            return;
                        }
                    }
                }
            })?;

        Ok(PrefetchBatches {
            rx: Some(rx),
            producer: Some(producer),
            expected,
            received: 0,
            pinned: self.args.pin_memory,
            target_device: target_device.clone(),
        })
    }
}

/// Iterator over the minibatches of one epoch
pub struct PrefetchBatches {
    rx: Option<Receiver<anyhow::Result<MinibatchData>>>,
    producer: Option<JoinHandle<()>>,
    expected: usize,
    received: usize,
    pinned: bool,
    target_device: Device,
}

impl PrefetchBatches {
    pub fn num_minibatch(&self) -> usize {
        self.expected
    }
}

impl Iterator for PrefetchBatches {
    type Item = anyhow::Result<MinibatchData>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.received >= self.expected {
            return None;
        }

        let rx = self.rx.as_ref()?;

        match rx.recv() {
            Ok(Ok(mb)) => {
                self.received += 1;
                if self.pinned {
                    Some(Ok(mb))
                } else {
                    Some(mb.to_device(&self.target_device).map_err(anyhow::Error::from))
                }
            }
            Ok(Err(err)) => {
                self.received = self.expected;
                Some(Err(err))
            }
            Err(_) => {
                let msg = format!(
                    "loader stopped after {} of {} minibatches",
                    self.received, self.expected
                );
                self.received = self.expected;
                Some(Err(anyhow!(msg)))
            }
        }
    }
}

impl Drop for PrefetchBatches {
    fn drop(&mut self) {
        // hang up first so that a blocked producer can return
        self.rx.take();
        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                warn!("loader prefetch thread panicked");
            }
        }
    }
}

/// Loaders of both splits
pub struct LoaderRegistry<S>
where
    S: SampleSource + 'static,
{
    pub train: PrefetchLoader<S>,
    pub val: PrefetchLoader<S>,
}

impl<S> LoaderRegistry<S>
where
    S: SampleSource + 'static,
{
    pub fn get(&self, split: Split) -> &PrefetchLoader<S> {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
        }
    }

    pub fn get_mut(&mut self, split: Split) -> &mut PrefetchLoader<S> {
        match split {
            Split::Train => &mut self.train,
            Split::Val => &mut self.val,
        }
    }
}
