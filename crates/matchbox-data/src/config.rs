// SslDataModuleConfig — settings for the semi-supervised data module
//
// Every field has a default, so a JSON file only needs the keys it changes:
//
//   { "data_path": "/data/cifar", "dataset": "cifar100", "num_labeled": 10000 }

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cifar::CifarKind;
use crate::error::{DataError, Result};
use crate::split::SplitConfig;
use crate::views::AugmentMode;

/// Configuration for [`SslDataModule`](crate::SslDataModule).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SslDataModuleConfig {
    /// Directory containing the extracted CIFAR binary archive.
    pub data_path: PathBuf,
    pub dataset: CifarKind,
    /// Unlabeled-to-labeled batch size ratio.
    pub mu: usize,
    /// View mode of the unlabeled training set.
    pub mode: AugmentMode,
    /// Total labeled budget, spread evenly over the classes.
    pub num_labeled: usize,
    /// Labeled (and validation) batch size.
    pub batch_size: usize,
    /// Optimisation steps per epoch.
    pub eval_step: usize,
    pub expand_labels: bool,
    /// Worker threads for each training loader.
    pub train_workers: usize,
    /// Worker threads for the validation loader.
    pub val_workers: usize,
    /// Seed for the split; also handed to every loader's config.
    pub seed: Option<u64>,
}

impl Default for SslDataModuleConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            dataset: CifarKind::Cifar10,
            mu: 7,
            mode: AugmentMode::FixMatch,
            num_labeled: 4000,
            batch_size: 128,
            eval_step: 1024,
            expand_labels: true,
            train_workers: 16,
            val_workers: 8,
            seed: None,
        }
    }
}

impl SslDataModuleConfig {
    pub fn data_path(mut self, p: impl Into<PathBuf>) -> Self {
        self.data_path = p.into();
        self
    }

    pub fn dataset(mut self, kind: CifarKind) -> Self {
        self.dataset = kind;
        self
    }

    pub fn mu(mut self, mu: usize) -> Self {
        self.mu = mu;
        self
    }

    pub fn mode(mut self, mode: AugmentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn num_labeled(mut self, n: usize) -> Self {
        self.num_labeled = n;
        self
    }

    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs;
        self
    }

    pub fn eval_step(mut self, n: usize) -> Self {
        self.eval_step = n;
        self
    }

    pub fn expand_labels(mut self, e: bool) -> Self {
        self.expand_labels = e;
        self
    }

    pub fn train_workers(mut self, n: usize) -> Self {
        self.train_workers = n;
        self
    }

    pub fn val_workers(mut self, n: usize) -> Self {
        self.val_workers = n;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }

    /// Parse a config from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::MissingFile(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check value ranges that would otherwise fail deep inside the loaders.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            crate::bail_config!("batch_size must be > 0");
        }
        if self.mu == 0 {
            crate::bail_config!("mu must be > 0");
        }
        if self.eval_step == 0 {
            crate::bail_config!("eval_step must be > 0");
        }
        if self.num_labeled == 0 {
            crate::bail_config!("num_labeled must be > 0");
        }
        if !self.mode.is_unlabeled_train() {
            return Err(DataError::InvalidMode {
                mode: self.mode.to_string(),
                context: "the unlabeled training set",
            });
        }
        Ok(())
    }

    /// Unlabeled batch size, `batch_size * mu`.
    pub fn unlabeled_batch_size(&self) -> usize {
        self.batch_size * self.mu
    }

    /// The split parameters implied by this config.
    pub fn split_config(&self) -> SplitConfig {
        let split = SplitConfig::new(self.dataset.num_classes())
            .num_labeled(self.num_labeled)
            .eval_step(self.eval_step)
            .batch_size(self.batch_size)
            .expand_labels(self.expand_labels);
        match self.seed {
            Some(seed) => split.seed(seed),
            None => split,
        }
    }
}
