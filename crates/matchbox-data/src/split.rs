// Labeled / unlabeled split — stratified index sampling
//
// Draws a fixed number of labeled indices per class without replacement and
// keeps the whole dataset as the unlabeled pool.  Optionally repeats the
// labeled list so that a single pass over it lasts `eval_step` optimisation
// steps at `batch_size`.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{thread_rng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DataError, Result};

/// Parameters of the labeled/unlabeled split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Number of classes in the dataset.
    pub num_classes: usize,
    /// Total labeled budget; must be a multiple of `num_classes`.
    pub num_labeled: usize,
    /// Optimisation steps per epoch.
    pub eval_step: usize,
    /// Labeled batch size.
    pub batch_size: usize,
    /// Repeat the labeled list to cover `eval_step * batch_size` samples.
    pub expand_labels: bool,
    /// Optional random seed for a reproducible split.
    pub seed: Option<u64>,
}

impl SplitConfig {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            num_labeled: 4000,
            eval_step: 1024,
            batch_size: 128,
            expand_labels: true,
            seed: None,
        }
    }

    pub fn num_labeled(mut self, n: usize) -> Self {
        self.num_labeled = n;
        self
    }

    pub fn eval_step(mut self, n: usize) -> Self {
        self.eval_step = n;
        self
    }

    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs;
        self
    }

    pub fn expand_labels(mut self, e: bool) -> Self {
        self.expand_labels = e;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }

    /// Labeled samples drawn from each class.
    pub fn label_per_class(&self) -> usize {
        if self.num_classes == 0 {
            0
        } else {
            self.num_labeled / self.num_classes
        }
    }

    /// Whether the labeled list will be repeated.
    pub fn expands(&self) -> bool {
        self.expand_labels || self.num_labeled < self.batch_size
    }

    /// How many times the labeled list is repeated (1 when not expanding).
    pub fn expansion_factor(&self) -> usize {
        if self.expands() && self.num_labeled > 0 {
            (self.batch_size * self.eval_step).div_ceil(self.num_labeled)
        } else {
            1
        }
    }
}

/// Result of [`x_u_split`]: indices into the original dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSplit {
    /// Labeled indices, possibly repeated, in shuffled order.
    pub labeled: Vec<usize>,
    /// Unlabeled indices: every sample of the dataset, in order.
    pub unlabeled: Vec<usize>,
}

/// Counts describing an [`IndexSplit`], mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitStats {
    pub labeled: usize,
    pub unique_labeled: usize,
    pub unlabeled: usize,
}

impl IndexSplit {
    pub fn stats(&self) -> SplitStats {
        let unique: HashSet<usize> = self.labeled.iter().copied().collect();
        SplitStats {
            labeled: self.labeled.len(),
            unique_labeled: unique.len(),
            unlabeled: self.unlabeled.len(),
        }
    }
}

/// Split `labels` into a stratified labeled subset and an unlabeled pool.
///
/// `labels[i]` is the class of sample `i`.  Every class contributes exactly
/// `num_labeled / num_classes` labeled samples drawn without replacement; the
/// unlabeled pool is the whole dataset.
pub fn x_u_split(labels: &[usize], config: &SplitConfig) -> Result<IndexSplit> {
    match config.seed {
        Some(seed) => x_u_split_with_rng(labels, config, &mut StdRng::seed_from_u64(seed)),
        None => x_u_split_with_rng(labels, config, &mut thread_rng()),
    }
}

/// [`x_u_split`] with a caller-provided RNG.
pub fn x_u_split_with_rng<R: Rng + ?Sized>(
    labels: &[usize],
    config: &SplitConfig,
    rng: &mut R,
) -> Result<IndexSplit> {
    let num_classes = config.num_classes;
    if num_classes == 0 || config.num_labeled == 0 {
        return Err(DataError::LabelBudget {
            num_labeled: config.num_labeled,
            num_classes,
        });
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= num_classes) {
        return Err(DataError::LabelOutOfRange {
            label: bad,
            num_classes,
        });
    }

    let label_per_class = config.label_per_class();

    // Bucket sample indices by class, preserving dataset order.
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); num_classes];
    for (i, &l) in labels.iter().enumerate() {
        by_class[l].push(i);
    }

    let mut labeled = Vec::with_capacity(config.num_labeled);
    for (class, members) in by_class.iter().enumerate() {
        if members.len() < label_per_class {
            return Err(DataError::InsufficientSamples {
                class,
                available: members.len(),
                requested: label_per_class,
            });
        }
        let picks = index::sample(rng, members.len(), label_per_class);
        labeled.extend(picks.into_iter().map(|p| members[p]));
    }

    if labeled.len() != config.num_labeled {
        return Err(DataError::LabelBudget {
            num_labeled: config.num_labeled,
            num_classes,
        });
    }

    let unlabeled: Vec<usize> = (0..labels.len()).collect();

    if config.num_labeled < config.batch_size {
        warn!(
            num_labeled = config.num_labeled,
            batch_size = config.batch_size,
            "label budget smaller than batch size, expanding labeled set"
        );
    }
    let factor = config.expansion_factor();
    if config.expands() {
        let base = labeled;
        labeled = Vec::with_capacity(base.len() * factor);
        for _ in 0..factor {
            labeled.extend_from_slice(&base);
        }
    }
    labeled.shuffle(rng);

    debug!(
        labeled = labeled.len(),
        label_per_class,
        expansion = factor,
        unlabeled = unlabeled.len(),
        "computed labeled/unlabeled split"
    );

    Ok(IndexSplit { labeled, unlabeled })
}
