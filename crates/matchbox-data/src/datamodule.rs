// SslDataModule — datasets and loaders for FixMatch / CoMatch training
//
// prepare_data() loads CIFAR, splits the train set into a labeled subset and
// an unlabeled pool, and wraps each side in its view pipeline:
//
//   labeled    SubsetDataset(train, split.labeled)    casual   1 view
//   unlabeled  SubsetDataset(train, split.unlabeled)  mode     2 or 3 views
//   test       test split                             test     1 view
//
// The loaders are then cheap to build and can be requested repeatedly.

use std::sync::Arc;

use tracing::info;

use crate::cifar::{CifarDataset, CifarKind, CifarSplit};
use crate::combinators::SubsetDataset;
use crate::config::SslDataModuleConfig;
use crate::dataset::Dataset;
use crate::error::{DataError, Result};
use crate::loader::{DataLoader, DataLoaderConfig};
use crate::split::{x_u_split, IndexSplit, SplitConfig, SplitStats};
use crate::views::{AugmentMode, SslDataset, TransformSsl, ViewDataset};

/// Build the labeled and unlabeled training sets from `base`.
///
/// The labeled side always uses the casual (weak-only) views; the unlabeled
/// side uses `mode`, which must be [`AugmentMode::FixMatch`] or
/// [`AugmentMode::CoMatch`].
#[allow(clippy::type_complexity)]
pub fn get_train_dataset<D: Dataset + Clone>(
    base: D,
    kind: CifarKind,
    mode: AugmentMode,
    split_config: &SplitConfig,
) -> Result<(SslDataset<SubsetDataset<D>>, SslDataset<SubsetDataset<D>>)> {
    if !mode.is_unlabeled_train() {
        return Err(DataError::InvalidMode {
            mode: mode.to_string(),
            context: "the unlabeled training set",
        });
    }

    let split = x_u_split(&base.labels(), split_config)?;
    let labeled = SubsetDataset::new(base.clone(), split.labeled)?;
    let unlabeled = SubsetDataset::new(base, split.unlabeled)?;

    Ok((
        SslDataset::new(labeled, TransformSsl::new(kind, AugmentMode::Casual)),
        SslDataset::new(unlabeled, TransformSsl::new(kind, mode)),
    ))
}

/// The pair of training loaders consumed in lockstep.
pub struct TrainLoaders {
    pub labeled: DataLoader,
    pub unlabeled: DataLoader,
}

struct Prepared {
    labeled: Arc<dyn ViewDataset>,
    unlabeled: Arc<dyn ViewDataset>,
    test: Arc<dyn ViewDataset>,
    stats: SplitStats,
}

/// Owns the semi-supervised datasets and hands out their loaders.
pub struct SslDataModule {
    config: SslDataModuleConfig,
    sources: Option<(CifarDataset, CifarDataset)>,
    prepared: Option<Prepared>,
}

impl SslDataModule {
    /// A module that reads CIFAR from `config.data_path`.
    pub fn new(config: SslDataModuleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sources: None,
            prepared: None,
        })
    }

    /// A module over already-loaded train and test sets.
    pub fn from_datasets(
        config: SslDataModuleConfig,
        train: CifarDataset,
        test: CifarDataset,
    ) -> Result<Self> {
        config.validate()?;
        for ds in [&train, &test] {
            if ds.kind() != config.dataset {
                crate::bail_config!(
                    "dataset {} does not match configured dataset {}",
                    ds.kind(),
                    config.dataset
                );
            }
        }
        Ok(Self {
            config,
            sources: Some((train, test)),
            prepared: None,
        })
    }

    pub fn config(&self) -> &SslDataModuleConfig {
        &self.config
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Load the data and build the labeled, unlabeled and test sets.
    ///
    /// Calling it again redraws the labeled split.
    pub fn prepare_data(&mut self) -> Result<()> {
        let kind = self.config.dataset;
        let (train, test) = match &self.sources {
            Some((train, test)) => (train.clone(), test.clone()),
            None => (
                CifarDataset::load(&self.config.data_path, kind, CifarSplit::Train)?,
                CifarDataset::load(&self.config.data_path, kind, CifarSplit::Test)?,
            ),
        };

        let (labeled, unlabeled) =
            get_train_dataset(train, kind, self.config.mode, &self.config.split_config())?;
        let stats = IndexSplit {
            labeled: labeled.inner().indices().to_vec(),
            unlabeled: unlabeled.inner().indices().to_vec(),
        }
        .stats();
        let test = SslDataset::new(test, TransformSsl::new(kind, AugmentMode::Test));

        info!(
            dataset = %kind,
            mode = %self.config.mode,
            labeled = stats.labeled,
            unique_labeled = stats.unique_labeled,
            unlabeled = stats.unlabeled,
            test = test.len(),
            "prepared semi-supervised data"
        );

        self.prepared = Some(Prepared {
            labeled: Arc::new(labeled),
            unlabeled: Arc::new(unlabeled),
            test: Arc::new(test),
            stats,
        });
        Ok(())
    }

    /// Loader defaults carrying the module's seed.
    fn loader_config(&self) -> DataLoaderConfig {
        DataLoaderConfig {
            seed: self.config.seed,
            ..DataLoaderConfig::default()
        }
    }

    fn prepared(&self) -> Result<&Prepared> {
        self.prepared.as_ref().ok_or(DataError::NotPrepared)
    }

    /// Sizes of the current split.
    pub fn split_stats(&self) -> Result<SplitStats> {
        Ok(self.prepared()?.stats)
    }

    pub fn labeled_dataset(&self) -> Result<Arc<dyn ViewDataset>> {
        Ok(self.prepared()?.labeled.clone())
    }

    pub fn unlabeled_dataset(&self) -> Result<Arc<dyn ViewDataset>> {
        Ok(self.prepared()?.unlabeled.clone())
    }

    pub fn test_dataset(&self) -> Result<Arc<dyn ViewDataset>> {
        Ok(self.prepared()?.test.clone())
    }

    /// Labeled loader at `batch_size` and unlabeled loader at
    /// `batch_size * mu`, both dropping the last partial batch.
    ///
    /// Neither reshuffles: the split is already in random order.
    pub fn train_dataloader(&self) -> Result<TrainLoaders> {
        let prepared = self.prepared()?;
        let base = self
            .loader_config()
            .shuffle(false)
            .drop_last(true)
            .num_workers(self.config.train_workers);

        let labeled = DataLoader::new(
            prepared.labeled.clone(),
            base.clone().batch_size(self.config.batch_size),
        )?;
        let unlabeled = DataLoader::new(
            prepared.unlabeled.clone(),
            base.batch_size(self.config.unlabeled_batch_size()),
        )?;
        Ok(TrainLoaders { labeled, unlabeled })
    }

    /// Sequential loader over the test set.
    pub fn val_dataloader(&self) -> Result<DataLoader> {
        let prepared = self.prepared()?;
        DataLoader::new(
            prepared.test.clone(),
            self.loader_config()
                .batch_size(self.config.batch_size)
                .shuffle(false)
                .drop_last(false)
                .num_workers(self.config.val_workers),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SslDataModuleConfig {
        SslDataModuleConfig::default()
            .num_labeled(20)
            .batch_size(4)
            .eval_step(10)
            .mu(2)
            .train_workers(0)
            .val_workers(0)
            .seed(5)
    }

    #[test]
    fn train_dataset_modes() {
        let base = CifarDataset::synthetic(50, CifarKind::Cifar10, CifarSplit::Train);
        let split = SplitConfig::new(10)
            .num_labeled(20)
            .batch_size(4)
            .expand_labels(false)
            .seed(1);

        let (labeled, unlabeled) =
            get_train_dataset(base.clone(), CifarKind::Cifar10, AugmentMode::CoMatch, &split)
                .unwrap();
        assert_eq!(labeled.mode(), AugmentMode::Casual);
        assert_eq!(labeled.len(), 20);
        assert_eq!(unlabeled.mode(), AugmentMode::CoMatch);
        assert_eq!(unlabeled.num_views(), 3);
        assert_eq!(unlabeled.len(), 50);

        for mode in [AugmentMode::Test, AugmentMode::Casual] {
            let err = get_train_dataset(base.clone(), CifarKind::Cifar10, mode, &split)
                .err()
                .unwrap();
            assert!(matches!(err, DataError::InvalidMode { .. }));
        }
    }

    #[test]
    fn loaders_before_prepare() {
        let module = SslDataModule::from_datasets(
            small_config(),
            CifarDataset::synthetic(40, CifarKind::Cifar10, CifarSplit::Train),
            CifarDataset::synthetic(10, CifarKind::Cifar10, CifarSplit::Test),
        )
        .unwrap();
        assert!(!module.is_prepared());
        assert!(matches!(module.train_dataloader(), Err(DataError::NotPrepared)));
        assert!(matches!(module.val_dataloader(), Err(DataError::NotPrepared)));
    }

    #[test]
    fn prepared_loader_sizes() {
        let mut module = SslDataModule::from_datasets(
            small_config(),
            CifarDataset::synthetic(40, CifarKind::Cifar10, CifarSplit::Train),
            CifarDataset::synthetic(10, CifarKind::Cifar10, CifarSplit::Test),
        )
        .unwrap();
        module.prepare_data().unwrap();

        // 20 labeled, expanded by ceil(4 * 10 / 20) = 2.
        let stats = module.split_stats().unwrap();
        assert_eq!(stats.labeled, 40);
        assert_eq!(stats.unique_labeled, 20);
        assert_eq!(stats.unlabeled, 40);

        let train = module.train_dataloader().unwrap();
        assert_eq!(train.labeled.config().batch_size, 4);
        assert_eq!(train.unlabeled.config().batch_size, 8);
        assert_eq!(train.labeled.num_batches(), 10);
        assert_eq!(train.unlabeled.num_batches(), 5);
        assert_eq!(train.unlabeled.num_views(), 2);

        assert_eq!(train.labeled.config().seed, Some(5));
        assert_eq!(train.unlabeled.config().seed, Some(5));

        let val = module.val_dataloader().unwrap();
        assert_eq!(val.config().seed, Some(5));
        assert_eq!(val.num_batches(), 3);
        assert_eq!(val.num_views(), 1);
    }

    #[test]
    fn mismatched_dataset_rejected() {
        let result = SslDataModule::from_datasets(
            small_config(),
            CifarDataset::synthetic(40, CifarKind::Cifar100, CifarSplit::Train),
            CifarDataset::synthetic(10, CifarKind::Cifar100, CifarSplit::Test),
        );
        assert!(matches!(result, Err(DataError::InvalidConfig(_))));
    }
}
