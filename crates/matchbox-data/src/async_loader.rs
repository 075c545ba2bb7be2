// AsyncDataLoader — Prefetching data loader with background workers
//
// Spawns a pool of background threads that fetch, augment and collate batches
// ahead of the consumer.  The consumer pulls ready batches from bounded
// channels, overlapping data preparation with training.
//
// Worker `w` owns batches `w, w + W, w + 2W, ...` and has its own channel, so
// the consumer reads the channels round-robin and batches arrive in epoch
// order no matter which worker finishes first.
//
// Usage:
//
//   let mut loader = AsyncDataLoader::new(
//       dataset,
//       AsyncDataLoaderConfig::default()
//           .batch_size(64)
//           .prefetch_factor(2)
//           .num_workers(4),
//   )?;
//
//   for epoch in 0..num_epochs {
//       for batch in loader.iter_epoch() {
//           let batch = batch?;
//           // train on batch ...
//       }
//   }

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::error::{DataError, Result};
use crate::loader::{collate, Batch, DataLoaderConfig};
use crate::views::{ViewDataset, ViewSample};

// Configuration

/// Configuration for the async prefetching data loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncDataLoaderConfig {
    /// Batch size, shuffling, drop-last and seed, shared with [`DataLoaderConfig`].
    pub base: DataLoaderConfig,
    /// How many batches each worker may have ready ahead of the consumer.
    /// Total buffered batches = prefetch_factor * max(num_workers, 1).
    pub prefetch_factor: usize,
}

impl Default for AsyncDataLoaderConfig {
    fn default() -> Self {
        Self {
            base: DataLoaderConfig::default().num_workers(2),
            prefetch_factor: 2,
        }
    }
}

impl AsyncDataLoaderConfig {
    pub fn batch_size(mut self, bs: usize) -> Self {
        self.base.batch_size = bs;
        self
    }
    pub fn shuffle(mut self, s: bool) -> Self {
        self.base.shuffle = s;
        self
    }
    pub fn drop_last(mut self, d: bool) -> Self {
        self.base.drop_last = d;
        self
    }
    pub fn num_workers(mut self, n: usize) -> Self {
        self.base.num_workers = n;
        self
    }
    pub fn prefetch_factor(mut self, pf: usize) -> Self {
        self.prefetch_factor = pf;
        self
    }
    pub fn seed(mut self, s: u64) -> Self {
        self.base.seed = Some(s);
        self
    }
}

impl From<DataLoaderConfig> for AsyncDataLoaderConfig {
    fn from(base: DataLoaderConfig) -> Self {
        Self {
            base,
            prefetch_factor: 2,
        }
    }
}

// AsyncDataLoader

/// A data loader that prefetches batches on background threads.
///
/// On each call to [`iter_epoch`](AsyncDataLoader::iter_epoch), the loader:
/// 1. Computes the epoch's sample order (shuffled if configured).
/// 2. Spawns worker threads that fetch, augment, and collate batches.
/// 3. Returns an iterator that yields the batches in order.
pub struct AsyncDataLoader {
    dataset: Arc<dyn ViewDataset>,
    config: AsyncDataLoaderConfig,
    epoch: u64,
}

impl AsyncDataLoader {
    /// Create a new async data loader.
    pub fn new(dataset: Arc<dyn ViewDataset>, config: AsyncDataLoaderConfig) -> Result<Self> {
        if config.base.batch_size == 0 {
            crate::bail_config!("batch_size must be > 0");
        }
        if config.prefetch_factor == 0 {
            crate::bail_config!("prefetch_factor must be > 0");
        }
        Ok(Self {
            dataset,
            config,
            epoch: 0,
        })
    }

    pub fn config(&self) -> &AsyncDataLoaderConfig {
        &self.config
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        self.config.base.num_batches(self.dataset.len())
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Views produced per sample.
    pub fn num_views(&self) -> usize {
        self.dataset.num_views()
    }

    /// Iterate over one epoch of prefetched batches.
    ///
    /// The background workers are joined when the iterator is dropped.
    pub fn iter_epoch(&mut self) -> PrefetchIterator {
        let base = &self.config.base;
        let order = base.epoch_order(self.dataset.len(), self.epoch);
        self.epoch += 1;

        let bs = base.batch_size;
        let num_batches = self.num_batches();
        let workers = base.num_workers.max(1).min(num_batches.max(1));

        // Batch `b` goes to worker `b % workers`.
        let mut assignments: Vec<Vec<Vec<usize>>> = vec![Vec::new(); workers];
        for b in 0..num_batches {
            let start = b * bs;
            let end = (start + bs).min(order.len());
            assignments[b % workers].push(order[start..end].to_vec());
        }

        debug!(
            dataset = self.dataset.name(),
            epoch = self.epoch - 1,
            batches = num_batches,
            workers,
            "starting prefetch epoch"
        );

        let mut receivers = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        let mut failure = None;
        for (worker_id, jobs) in assignments.into_iter().enumerate() {
            let (tx, rx) = mpsc::sync_channel::<Result<Batch>>(self.config.prefetch_factor);
            let ds = self.dataset.clone();

            let spawned = thread::Builder::new()
                .name(format!("matchbox-prefetch-{worker_id}"))
                .spawn(move || {
                    for sample_indices in jobs {
                        let samples: Vec<ViewSample> =
                            sample_indices.iter().map(|&i| ds.get_views(i)).collect();
                        let result = collate(samples, sample_indices);
                        // Receiver dropped, stop early.
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(worker_id, "failed to spawn prefetch worker: {e}");
                    failure = Some(DataError::msg(format!(
                        "failed to spawn prefetch worker {worker_id}: {e}"
                    )));
                    break;
                }
            }
            receivers.push(rx);
        }

        let remaining = if failure.is_none() { num_batches } else { 0 };
        PrefetchIterator {
            receivers,
            handles,
            next_batch: 0,
            remaining,
            failure,
        }
    }
}

// PrefetchIterator

/// An iterator that yields prefetched batches from background workers, in
/// epoch order.
///
/// Workers are joined when the iterator is fully consumed or dropped.
pub struct PrefetchIterator {
    receivers: Vec<mpsc::Receiver<Result<Batch>>>,
    handles: Vec<thread::JoinHandle<()>>,
    next_batch: usize,
    remaining: usize,
    /// Reported once, in place of the epoch, when the workers could not start.
    failure: Option<DataError>,
}

impl Iterator for PrefetchIterator {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.failure.take() {
            return Some(Err(err));
        }
        if self.remaining == 0 || self.receivers.is_empty() {
            return None;
        }
        let rx = &self.receivers[self.next_batch % self.receivers.len()];
        match rx.recv() {
            Ok(batch) => {
                self.next_batch += 1;
                self.remaining -= 1;
                Some(batch)
            }
            Err(_) => {
                // Channel closed — worker exited early
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining + usize::from(self.failure.is_some());
        (n, Some(n))
    }
}

impl ExactSizeIterator for PrefetchIterator {}

impl Drop for PrefetchIterator {
    fn drop(&mut self) {
        // Closing the receivers makes blocked workers' sends fail.
        self.receivers.clear();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}
