// DataLoader — batching, shuffling, iteration over multi-view datasets

use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{DataError, Result};
use crate::views::{ViewDataset, ViewSample};

/// Configuration for the DataLoader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLoaderConfig {
    /// Number of samples per batch.
    pub batch_size: usize,
    /// Whether to shuffle indices each epoch.
    pub shuffle: bool,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
    /// Number of parallel workers for sample fetching (0 = sequential).
    pub num_workers: usize,
    /// Optional random seed for reproducible shuffling.
    pub seed: Option<u64>,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            drop_last: false,
            num_workers: 0,
            seed: None,
        }
    }
}

impl DataLoaderConfig {
    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs;
        self
    }

    pub fn shuffle(mut self, s: bool) -> Self {
        self.shuffle = s;
        self
    }

    pub fn drop_last(mut self, d: bool) -> Self {
        self.drop_last = d;
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }

    /// Number of batches an epoch over `len` samples yields.
    pub fn num_batches(&self, len: usize) -> usize {
        if self.drop_last {
            len / self.batch_size
        } else {
            len.div_ceil(self.batch_size)
        }
    }

    /// Sample order for `epoch`: identity, or a shuffle seeded by
    /// `seed + epoch` so every epoch differs but runs are reproducible.
    pub(crate) fn epoch_order(&self, len: usize, epoch: u64) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        if self.shuffle {
            match self.seed {
                Some(seed) => {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch));
                    indices.shuffle(&mut rng);
                }
                None => indices.shuffle(&mut thread_rng()),
            }
        }
        indices
    }
}

/// One collated batch.
///
/// `views[v]` stacks view `v` of every sample into a `[batch, C, H, W]`
/// tensor; `targets[i]` and `indices[i]` belong to row `i`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub views: Vec<ArrayD<f32>>,
    pub targets: Vec<usize>,
    /// Positions of the samples in the loader's dataset.
    pub indices: Vec<usize>,
}

impl Batch {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The first (or only) view.
    pub fn input(&self) -> Option<&ArrayD<f32>> {
        self.views.first()
    }
}

/// A DataLoader wraps a [`ViewDataset`] and produces batches of tensors.
pub struct DataLoader {
    dataset: Arc<dyn ViewDataset>,
    config: DataLoaderConfig,
    pool: Option<ThreadPool>,
    epoch: u64,
}

impl DataLoader {
    /// Create a new DataLoader over a dataset.
    pub fn new(dataset: Arc<dyn ViewDataset>, config: DataLoaderConfig) -> Result<Self> {
        if config.batch_size == 0 {
            crate::bail_config!("batch_size must be > 0");
        }
        let pool = if config.num_workers > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.num_workers)
                .thread_name(|i| format!("matchbox-loader-{i}"))
                .build()
                .map_err(|e| DataError::msg(format!("failed to start loader workers: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            dataset,
            config,
            pool,
            epoch: 0,
        })
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    /// The number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        self.config.num_batches(self.dataset.len())
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Views produced per sample.
    pub fn num_views(&self) -> usize {
        self.dataset.num_views()
    }

    /// Epochs started so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Fetch a slice of samples, in parallel when workers are configured.
    fn fetch_samples(&self, indices: &[usize]) -> Vec<ViewSample> {
        match &self.pool {
            Some(pool) if indices.len() > 1 => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&i| self.dataset.get_views(i))
                    .collect()
            }),
            _ => indices.iter().map(|&i| self.dataset.get_views(i)).collect(),
        }
    }

    /// Produce all batches for one epoch.
    pub fn epoch_batches(&mut self) -> Result<Vec<Batch>> {
        self.iter_batches().collect()
    }

    /// Iterate over batches one at a time (lower memory than `epoch_batches`).
    ///
    /// Each call starts a new epoch and reshuffles if configured.
    pub fn iter_batches(&mut self) -> BatchIterator<'_> {
        let order = self.config.epoch_order(self.dataset.len(), self.epoch);
        debug!(
            dataset = self.dataset.name(),
            epoch = self.epoch,
            batches = self.num_batches(),
            "starting loader epoch"
        );
        self.epoch += 1;
        BatchIterator {
            loader: self,
            order,
            batch_idx: 0,
        }
    }
}

/// Iterator that yields one batch at a time.
pub struct BatchIterator<'l> {
    loader: &'l DataLoader,
    order: Vec<usize>,
    batch_idx: usize,
}

impl Iterator for BatchIterator<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch_idx >= self.loader.num_batches() {
            return None;
        }
        let bs = self.loader.config.batch_size;
        let start = self.batch_idx * bs;
        let end = (start + bs).min(self.order.len());
        self.batch_idx += 1;

        let batch_indices = &self.order[start..end];
        let samples = self.loader.fetch_samples(batch_indices);
        Some(collate(samples, batch_indices.to_vec()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.loader.num_batches() - self.batch_idx;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchIterator<'_> {}

// Collation

/// Stack view samples into one [`Batch`].
///
/// Every sample must have the same number of views and view `v` must have
/// the same shape across samples.
pub(crate) fn collate(samples: Vec<ViewSample>, indices: Vec<usize>) -> Result<Batch> {
    let batch_size = samples.len();
    let Some(first) = samples.first() else {
        return Ok(Batch {
            views: Vec::new(),
            targets: Vec::new(),
            indices,
        });
    };
    let num_views = first.views.len();
    let shapes: Vec<Vec<usize>> = first.views.iter().map(|v| v.feature_shape.clone()).collect();

    let mut data: Vec<Vec<f32>> = shapes
        .iter()
        .map(|s| Vec::with_capacity(batch_size * s.iter().product::<usize>()))
        .collect();
    let mut targets = Vec::with_capacity(batch_size);

    for sample in &samples {
        if sample.views.len() != num_views {
            return Err(DataError::msg(format!(
                "sample has {} views, batch expects {num_views}",
                sample.views.len()
            )));
        }
        for ((view, shape), buf) in sample.views.iter().zip(&shapes).zip(data.iter_mut()) {
            if &view.feature_shape != shape {
                return Err(DataError::ShapeMismatch {
                    expected: shape.clone(),
                    got: view.feature_shape.clone(),
                });
            }
            buf.extend(view.features.iter().map(|&x| x as f32));
        }
        targets.push(sample.class);
    }

    let views = data
        .into_iter()
        .zip(&shapes)
        .map(|(buf, shape)| {
            let mut batch_shape = vec![batch_size];
            batch_shape.extend_from_slice(shape);
            ArrayD::from_shape_vec(IxDyn(&batch_shape), buf)
                .map_err(|e| DataError::msg(format!("collate: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Batch {
        views,
        targets,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Sample;

    fn view_sample(value: f64, shape: Vec<usize>, class: usize) -> ViewSample {
        let n = shape.iter().product();
        ViewSample {
            views: vec![
                Sample::image(vec![value; n], shape.clone(), class),
                Sample::image(vec![-value; n], shape, class),
            ],
            class,
        }
    }

    #[test]
    fn collate_stacks_views() {
        let batch = collate(
            vec![view_sample(1.0, vec![1, 2, 2], 3), view_sample(2.0, vec![1, 2, 2], 4)],
            vec![7, 9],
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.views.len(), 2);
        assert_eq!(batch.views[0].shape(), &[2, 1, 2, 2]);
        assert_eq!(batch.views[1][&[1, 0, 1, 1][..]], -2.0);
        assert_eq!(batch.targets, vec![3, 4]);
        assert_eq!(batch.indices, vec![7, 9]);
    }

    #[test]
    fn collate_rejects_shape_mismatch() {
        let err = collate(
            vec![view_sample(1.0, vec![1, 2, 2], 0), view_sample(1.0, vec![1, 3, 3], 0)],
            vec![0, 1],
        )
        .unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch { .. }));
    }

    #[test]
    fn epoch_order_seeded_differs_per_epoch() {
        let config = DataLoaderConfig::default().seed(11);
        let e0 = config.epoch_order(50, 0);
        let e0_again = config.epoch_order(50, 0);
        let e1 = config.epoch_order(50, 1);
        assert_eq!(e0, e0_again);
        assert_ne!(e0, e1);
        let mut sorted = e1.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn epoch_order_without_shuffle() {
        let config = DataLoaderConfig::default().shuffle(false);
        assert_eq!(config.epoch_order(4, 3), vec![0, 1, 2, 3]);
    }

    #[test]
    fn num_batches_rounding() {
        let config = DataLoaderConfig::default().batch_size(3);
        assert_eq!(config.num_batches(10), 4);
        assert_eq!(config.clone().drop_last(true).num_batches(10), 3);
        assert_eq!(config.num_batches(0), 0);
    }
}
