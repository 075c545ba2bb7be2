//! # matchbox-data
//!
//! Dataset preparation for FixMatch / CoMatch semi-supervised training.
//!
//! This crate provides:
//! - [`CifarDataset`] — CIFAR-10 / CIFAR-100 binary-format parser
//! - [`x_u_split`] — stratified labeled / unlabeled index split with label expansion
//! - [`TransformSsl`] — multi-view augmentation (test, casual, fixmatch, comatch)
//! - [`RandAugmentMc`] — RandAugment with Cutout for the strong views
//! - [`DataLoader`] — batching over multi-view datasets into `ndarray` tensors
//! - [`AsyncDataLoader`] — prefetching data loader with background workers
//! - [`SslDataModule`] — labeled, unlabeled and validation loaders from one config
//!
//! ```no_run
//! use matchbox_data::{SslDataModule, SslDataModuleConfig};
//!
//! let config = SslDataModuleConfig::default().data_path("data").seed(0);
//! let mut module = SslDataModule::new(config)?;
//! module.prepare_data()?;
//! let mut train = module.train_dataloader()?;
//! for (x, u) in train.labeled.iter_batches().zip(train.unlabeled.iter_batches()) {
//!     let (x, u) = (x?, u?);
//!     // x.views[0]: weak labeled view, u.views[0..2]: weak / strong unlabeled views
//!     # let _ = (x, u);
//! }
//! # Ok::<(), matchbox_data::DataError>(())
//! ```

pub mod async_loader;
pub mod augment;
pub mod cifar;
pub mod combinators;
pub mod config;
pub mod datamodule;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod randaugment;
pub mod split;
pub mod transform;
pub mod views;

pub use async_loader::{AsyncDataLoader, AsyncDataLoaderConfig, PrefetchIterator};
pub use augment::{
    ColorJitter, PaddingMode, RandomCrop, RandomGrayscale, RandomHorizontalFlip, RandomResizedCrop,
};
pub use cifar::{CifarDataset, CifarKind, CifarSplit};
pub use combinators::{SubsetDataset, VecDataset};
pub use config::SslDataModuleConfig;
pub use datamodule::{get_train_dataset, SslDataModule, TrainLoaders};
pub use dataset::{Dataset, Sample};
pub use error::{DataError, Result};
pub use loader::{Batch, DataLoader, DataLoaderConfig};
pub use randaugment::{AugmentOp, RandAugmentMc};
pub use split::{x_u_split, IndexSplit, SplitConfig, SplitStats};
pub use transform::{Compose, Transform};
pub use views::{AugmentMode, SslDataset, TransformSsl, ViewDataset, ViewSample};
