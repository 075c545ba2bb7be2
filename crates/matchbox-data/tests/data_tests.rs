// Tests for matchbox-data: CIFAR loading, splitting, views, loaders, data module

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use matchbox_data::cifar::{build_cifar_record_bytes, PIXELS_PER_IMAGE};
use matchbox_data::{
    x_u_split, AsyncDataLoader, AsyncDataLoaderConfig, AugmentMode, CifarDataset, CifarKind,
    CifarSplit, DataError, DataLoader, DataLoaderConfig, Dataset, SplitConfig, SslDataModule,
    SslDataModuleConfig, SslDataset, SubsetDataset, TransformSsl, ViewDataset,
};

// Fixtures

/// Write a CIFAR-10 archive layout with `per_file` train records in each of
/// the five batches and `test` records in the test batch.
fn write_cifar10(root: &Path, per_file: usize, test: usize) {
    let dir = root.join("cifar-10-batches-bin");
    fs::create_dir_all(&dir).unwrap();
    let pixels = vec![128u8; PIXELS_PER_IMAGE];

    let mut next = 0usize;
    for b in 1..=5 {
        let records: Vec<(u8, &[u8])> = (0..per_file)
            .map(|_| {
                let label = (next % 10) as u8;
                next += 1;
                (label, pixels.as_slice())
            })
            .collect();
        let bytes = build_cifar_record_bytes(CifarKind::Cifar10, &records);
        fs::write(dir.join(format!("data_batch_{b}.bin")), bytes).unwrap();
    }

    let records: Vec<(u8, &[u8])> = (0..test)
        .map(|i| ((i % 10) as u8, pixels.as_slice()))
        .collect();
    fs::write(
        dir.join("test_batch.bin"),
        build_cifar_record_bytes(CifarKind::Cifar10, &records),
    )
    .unwrap();
}

fn class_counts(labels: impl Iterator<Item = usize>) -> HashMap<usize, usize> {
    let mut counts = HashMap::new();
    for l in labels {
        *counts.entry(l).or_insert(0) += 1;
    }
    counts
}

// CIFAR loading

#[test]
fn test_cifar10_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_cifar10(dir.path(), 4, 6);

    let train = CifarDataset::load(dir.path(), CifarKind::Cifar10, CifarSplit::Train).unwrap();
    assert_eq!(train.len(), 20);
    assert_eq!(train.name(), "CIFAR10-train");
    assert_eq!(train.feature_shape(), &[3, 32, 32]);
    assert_eq!(&train.labels()[..11], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0]);

    let test = CifarDataset::load(dir.path(), CifarKind::Cifar10, CifarSplit::Test).unwrap();
    assert_eq!(test.len(), 6);
    assert_eq!(test.get(0).features[0], 128.0);
}

#[test]
fn test_cifar_missing_and_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let err = CifarDataset::load(dir.path(), CifarKind::Cifar100, CifarSplit::Train).unwrap_err();
    assert!(matches!(err, DataError::MissingFile(_)));

    fs::write(dir.path().join("test.bin"), vec![0u8; 100]).unwrap();
    let err = CifarDataset::load(dir.path(), CifarKind::Cifar100, CifarSplit::Test).unwrap_err();
    assert!(matches!(err, DataError::Truncated { len: 100, .. }));
}

#[test]
fn test_cifar100_fine_labels() {
    let pixels = vec![0u8; PIXELS_PER_IMAGE];
    let records: [(u8, &[u8]); 2] = [(42, &pixels), (99, &pixels)];
    let bytes = build_cifar_record_bytes(CifarKind::Cifar100, &records);
    let ds = CifarDataset::from_raw(&bytes, CifarKind::Cifar100, CifarSplit::Test).unwrap();
    assert_eq!(ds.labels(), vec![42, 99]);
}

// Split

#[test]
fn test_split_is_stratified() {
    let ds = CifarDataset::synthetic(1000, CifarKind::Cifar10, CifarSplit::Train);
    let config = SplitConfig::new(10)
        .num_labeled(250)
        .expand_labels(false)
        .batch_size(64)
        .seed(7);
    let split = x_u_split(&ds.labels(), &config).unwrap();

    assert_eq!(split.labeled.len(), 250);
    let counts = class_counts(split.labeled.iter().map(|&i| ds.label(i)));
    assert_eq!(counts.len(), 10);
    assert!(counts.values().all(|&c| c == 25));
    assert_eq!(split.unlabeled, (0..1000).collect::<Vec<_>>());

    // Same seed, same split.
    assert_eq!(split, x_u_split(&ds.labels(), &config).unwrap());
}

#[test]
fn test_split_expansion() {
    let ds = CifarDataset::synthetic(200, CifarKind::Cifar10, CifarSplit::Train);
    let config = SplitConfig::new(10)
        .num_labeled(40)
        .batch_size(16)
        .eval_step(5)
        .seed(3);
    let split = x_u_split(&ds.labels(), &config).unwrap();

    // ceil(16 * 5 / 40) = 2
    assert_eq!(split.labeled.len(), 80);
    let repeats = class_counts(split.labeled.iter().copied());
    assert_eq!(repeats.len(), 40);
    assert!(repeats.values().all(|&c| c == 2));
}

// Views and loaders

#[test]
fn test_fixmatch_loader_batches() {
    let ds = CifarDataset::synthetic(30, CifarKind::Cifar10, CifarSplit::Train);
    let views = SslDataset::new(ds, TransformSsl::new(CifarKind::Cifar10, AugmentMode::FixMatch));
    let mut loader = DataLoader::new(
        Arc::new(views),
        DataLoaderConfig::default().batch_size(8).num_workers(2).seed(1),
    )
    .unwrap();

    assert_eq!(loader.num_batches(), 4);
    let batches = loader.epoch_batches().unwrap();
    assert_eq!(batches.len(), 4);
    for batch in &batches {
        assert_eq!(batch.views.len(), 2);
        assert_eq!(batch.views[0].shape(), batch.views[1].shape());
        assert_eq!(&batch.views[0].shape()[1..], &[3, 32, 32]);
        for (&i, &t) in batch.indices.iter().zip(&batch.targets) {
            assert_eq!(t, i % 10);
        }
    }
    assert_eq!(batches[3].len(), 6);

    let mut seen: Vec<usize> = batches.iter().flat_map(|b| b.indices.clone()).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..30).collect::<Vec<_>>());
}

#[test]
fn test_comatch_subset_views() {
    let ds = CifarDataset::synthetic(20, CifarKind::Cifar100, CifarSplit::Train);
    let subset = SubsetDataset::new(ds, vec![3, 3, 7]).unwrap();
    let views = SslDataset::new(
        subset,
        TransformSsl::new(CifarKind::Cifar100, AugmentMode::CoMatch),
    );
    assert_eq!(views.len(), 3);
    let vs = views.get_views(1);
    assert_eq!(vs.views.len(), 3);
    assert_eq!(vs.class, 3);
    assert!(vs.views.iter().all(|v| v.features.iter().all(|x| x.is_finite())));
}

#[test]
fn test_async_loader_matches_sync_order() {
    let ds = CifarDataset::synthetic(25, CifarKind::Cifar10, CifarSplit::Test);
    let views: Arc<dyn ViewDataset> = Arc::new(SslDataset::new(
        ds,
        TransformSsl::new(CifarKind::Cifar10, AugmentMode::Test),
    ));

    let mut sync = DataLoader::new(
        views.clone(),
        DataLoaderConfig::default().batch_size(4).seed(9),
    )
    .unwrap();
    let mut prefetch = AsyncDataLoader::new(
        views,
        AsyncDataLoaderConfig::default()
            .batch_size(4)
            .seed(9)
            .num_workers(3),
    )
    .unwrap();

    let a: Vec<Vec<usize>> = sync
        .iter_batches()
        .map(|b| b.unwrap().indices)
        .collect();
    let b: Vec<Vec<usize>> = prefetch
        .iter_epoch()
        .map(|b| b.unwrap().indices)
        .collect();
    assert_eq!(a.len(), 7);
    assert_eq!(a, b);
}

// Data module

#[test]
fn test_datamodule_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_cifar10(dir.path(), 4, 6);

    let config = SslDataModuleConfig::default()
        .data_path(dir.path())
        .num_labeled(10)
        .batch_size(2)
        .eval_step(5)
        .mu(2)
        .train_workers(2)
        .val_workers(0)
        .seed(11);
    let mut module = SslDataModule::new(config).unwrap();
    module.prepare_data().unwrap();

    let mut train = module.train_dataloader().unwrap();
    assert_eq!(train.labeled.len(), 10);
    assert_eq!(train.unlabeled.len(), 20);
    assert_eq!(train.labeled.num_batches(), 5);
    assert_eq!(train.unlabeled.num_batches(), 5);

    let x = train.labeled.iter_batches().next().unwrap().unwrap();
    let u = train.unlabeled.iter_batches().next().unwrap().unwrap();
    assert_eq!(x.views.len(), 1);
    assert_eq!(x.views[0].shape(), &[2, 3, 32, 32]);
    assert_eq!(u.views.len(), 2);
    assert_eq!(u.views[1].shape(), &[4, 3, 32, 32]);

    let mut val = module.val_dataloader().unwrap();
    let sizes: Vec<usize> = val.iter_batches().map(|b| b.unwrap().len()).collect();
    assert_eq!(sizes, vec![2, 2, 2]);
}

#[test]
fn test_datamodule_missing_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut module =
        SslDataModule::new(SslDataModuleConfig::default().data_path(dir.path())).unwrap();
    assert!(matches!(module.prepare_data(), Err(DataError::MissingFile(_))));
    assert!(matches!(module.val_dataloader(), Err(DataError::NotPrepared)));
}

#[test]
fn test_datamodule_label_budget_errors() {
    let config = SslDataModuleConfig::default()
        .num_labeled(15)
        .batch_size(4)
        .train_workers(0)
        .val_workers(0);
    let mut module = SslDataModule::from_datasets(
        config,
        CifarDataset::synthetic(100, CifarKind::Cifar10, CifarSplit::Train),
        CifarDataset::synthetic(10, CifarKind::Cifar10, CifarSplit::Test),
    )
    .unwrap();
    assert!(matches!(
        module.prepare_data(),
        Err(DataError::LabelBudget { num_labeled: 15, num_classes: 10 })
    ));
}
