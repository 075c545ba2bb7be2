// CIFAR-10 / CIFAR-100 datasets — binary record format parser
//
// Both datasets ship a "binary version" made of fixed-size records:
//
//   CIFAR-10   cifar-10-batches-bin/data_batch_{1..5}.bin, test_batch.bin
//              record = label(u8) | pixels(3072 × u8)
//   CIFAR-100  cifar-100-binary/train.bin, test.bin
//              record = coarse_label(u8) | fine_label(u8) | pixels(3072 × u8)
//
// Pixels are channel-planar: 1024 red, 1024 green, 1024 blue bytes, each plane
// row-major 32×32.  That is exactly the [C, H, W] layout Sample expects.
//
// Download from: https://www.cs.toronto.edu/~kriz/cifar.html

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{Dataset, Sample};
use crate::error::{DataError, Result};

/// Side length of a CIFAR image.
pub const IMAGE_SIZE: usize = 32;
/// Colour channels of a CIFAR image.
pub const CHANNELS: usize = 3;
/// Bytes of pixel data per record.
pub const PIXELS_PER_IMAGE: usize = CHANNELS * IMAGE_SIZE * IMAGE_SIZE;

const FEATURE_SHAPE: [usize; 3] = [CHANNELS, IMAGE_SIZE, IMAGE_SIZE];

/// Which CIFAR variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CifarKind {
    Cifar10,
    Cifar100,
}

impl CifarKind {
    /// Number of (fine) classes.
    pub fn num_classes(self) -> usize {
        match self {
            CifarKind::Cifar10 => 10,
            CifarKind::Cifar100 => 100,
        }
    }

    /// Per-channel mean and standard deviation of the training set, in `[0, 1]`
    /// pixel units.
    pub fn normalization(self) -> ([f64; 3], [f64; 3]) {
        let (mean, std) = match self {
            CifarKind::Cifar10 => ([125.3, 123.0, 113.9], [63.0, 62.1, 66.7]),
            CifarKind::Cifar100 => ([129.3, 124.1, 112.4], [68.2, 65.4, 70.4]),
        };
        (mean.map(|m| m / 255.0), std.map(|s| s / 255.0))
    }

    /// Number of label bytes preceding the pixels in each record.
    fn label_bytes(self) -> usize {
        match self {
            CifarKind::Cifar10 => 1,
            CifarKind::Cifar100 => 2,
        }
    }

    /// Size of one binary record in bytes.
    pub fn record_size(self) -> usize {
        self.label_bytes() + PIXELS_PER_IMAGE
    }

    fn dir_name(self) -> &'static str {
        match self {
            CifarKind::Cifar10 => "cifar-10-batches-bin",
            CifarKind::Cifar100 => "cifar-100-binary",
        }
    }

    fn file_names(self, split: CifarSplit) -> &'static [&'static str] {
        match (self, split) {
            (CifarKind::Cifar10, CifarSplit::Train) => &[
                "data_batch_1.bin",
                "data_batch_2.bin",
                "data_batch_3.bin",
                "data_batch_4.bin",
                "data_batch_5.bin",
            ],
            (CifarKind::Cifar10, CifarSplit::Test) => &["test_batch.bin"],
            (CifarKind::Cifar100, CifarSplit::Train) => &["train.bin"],
            (CifarKind::Cifar100, CifarSplit::Test) => &["test.bin"],
        }
    }
}

impl fmt::Display for CifarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CifarKind::Cifar10 => write!(f, "cifar10"),
            CifarKind::Cifar100 => write!(f, "cifar100"),
        }
    }
}

impl FromStr for CifarKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cifar10" => Ok(CifarKind::Cifar10),
            "cifar100" => Ok(CifarKind::Cifar100),
            _ => Err(DataError::UnknownDataset(s.to_string())),
        }
    }
}

/// Which split of CIFAR to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarSplit {
    Train,
    Test,
}

/// A loaded CIFAR dataset stored entirely in memory.
///
/// Pixel buffers are shared behind an `Arc`, so cloning the dataset to build
/// labeled/unlabeled subsets does not copy image data.
#[derive(Debug, Clone)]
pub struct CifarDataset {
    images: Arc<Vec<[u8; PIXELS_PER_IMAGE]>>,
    labels: Arc<Vec<u8>>,
    kind: CifarKind,
    split: CifarSplit,
}

impl CifarDataset {
    /// Load CIFAR from `root`.
    ///
    /// Looks for the extracted archive directory (`cifar-10-batches-bin` or
    /// `cifar-100-binary`) under `root`, falling back to `root` itself.
    pub fn load(root: impl AsRef<Path>, kind: CifarKind, split: CifarSplit) -> Result<Self> {
        let dir = resolve_dir(root.as_ref(), kind);

        let mut images = Vec::new();
        let mut labels = Vec::new();
        for name in kind.file_names(split) {
            let path = dir.join(name);
            if !path.exists() {
                return Err(DataError::MissingFile(path));
            }
            let bytes = fs::read(&path)?;
            if bytes.len() % kind.record_size() != 0 {
                return Err(DataError::Truncated {
                    path,
                    len: bytes.len(),
                    record_size: kind.record_size(),
                });
            }
            let before = labels.len();
            parse_records(&bytes, kind, &mut images, &mut labels)?;
            debug!(file = %path.display(), records = labels.len() - before, "parsed CIFAR batch");
        }

        info!(
            dataset = %kind,
            split = ?split,
            samples = labels.len(),
            "loaded CIFAR dataset from {}",
            dir.display()
        );

        Ok(Self {
            images: Arc::new(images),
            labels: Arc::new(labels),
            kind,
            split,
        })
    }

    /// Load from raw record bytes (useful for embedded/testing).
    pub fn from_raw(bytes: &[u8], kind: CifarKind, split: CifarSplit) -> Result<Self> {
        if bytes.len() % kind.record_size() != 0 {
            return Err(DataError::Truncated {
                path: PathBuf::from("<memory>"),
                len: bytes.len(),
                record_size: kind.record_size(),
            });
        }
        let mut images = Vec::new();
        let mut labels = Vec::new();
        parse_records(bytes, kind, &mut images, &mut labels)?;
        Ok(Self {
            images: Arc::new(images),
            labels: Arc::new(labels),
            kind,
            split,
        })
    }

    /// Create a small synthetic CIFAR-like dataset for testing.
    ///
    /// Generates `n` random images with labels cycling through every class,
    /// so each class gets `n / num_classes` samples (plus one for the first
    /// `n % num_classes` classes).
    pub fn synthetic(n: usize, kind: CifarKind, split: CifarSplit) -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut images = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);

        for i in 0..n {
            let mut img = [0u8; PIXELS_PER_IMAGE];
            rng.fill(&mut img[..]);
            images.push(img);
            labels.push((i % kind.num_classes()) as u8);
        }

        Self {
            images: Arc::new(images),
            labels: Arc::new(labels),
            kind,
            split,
        }
    }

    /// Which CIFAR variant this is.
    pub fn kind(&self) -> CifarKind {
        self.kind
    }

    /// Which split this dataset represents.
    pub fn split(&self) -> CifarSplit {
        self.split
    }

    /// Raw pixel bytes of sample `i`, channel-planar.
    pub fn image_u8(&self, i: usize) -> &[u8] {
        &self.images[i]
    }
}

impl Dataset for CifarDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Sample {
        Sample::image(
            self.images[index].iter().map(|&p| p as f64).collect(),
            FEATURE_SHAPE.to_vec(),
            self.labels[index] as usize,
        )
    }

    fn label(&self, index: usize) -> usize {
        self.labels[index] as usize
    }

    fn feature_shape(&self) -> &[usize] {
        &FEATURE_SHAPE
    }

    fn target_shape(&self) -> &[usize] {
        &[1]
    }

    fn name(&self) -> &str {
        match (self.kind, self.split) {
            (CifarKind::Cifar10, CifarSplit::Train) => "CIFAR10-train",
            (CifarKind::Cifar10, CifarSplit::Test) => "CIFAR10-test",
            (CifarKind::Cifar100, CifarSplit::Train) => "CIFAR100-train",
            (CifarKind::Cifar100, CifarSplit::Test) => "CIFAR100-test",
        }
    }
}

// Binary record parsing

fn resolve_dir(root: &Path, kind: CifarKind) -> PathBuf {
    let nested = root.join(kind.dir_name());
    if nested.is_dir() {
        nested
    } else {
        root.to_path_buf()
    }
}

/// Append every record in `bytes` to `images` / `labels`.
///
/// `bytes.len()` must already be a multiple of the record size.
fn parse_records(
    bytes: &[u8],
    kind: CifarKind,
    images: &mut Vec<[u8; PIXELS_PER_IMAGE]>,
    labels: &mut Vec<u8>,
) -> Result<()> {
    let label_bytes = kind.label_bytes();
    let num_classes = kind.num_classes();

    for record in bytes.chunks_exact(kind.record_size()) {
        // CIFAR-100 stores (coarse, fine); the fine label is the target.
        let label = record[label_bytes - 1];
        if label as usize >= num_classes {
            return Err(DataError::LabelOutOfRange {
                label: label as usize,
                num_classes,
            });
        }
        let mut img = [0u8; PIXELS_PER_IMAGE];
        img.copy_from_slice(&record[label_bytes..]);
        images.push(img);
        labels.push(label);
    }
    Ok(())
}

// Builder helpers

/// Build binary CIFAR record bytes (useful for tests).
///
/// Each entry is `(label, pixels)`; for CIFAR-100 the coarse label byte is
/// written as `label / 5`.
pub fn build_cifar_record_bytes(kind: CifarKind, records: &[(u8, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(records.len() * kind.record_size());
    for &(label, pixels) in records {
        if kind == CifarKind::Cifar100 {
            buf.push(label / 5);
        }
        buf.push(label);
        let mut img = [0u8; PIXELS_PER_IMAGE];
        let n = pixels.len().min(PIXELS_PER_IMAGE);
        img[..n].copy_from_slice(&pixels[..n]);
        buf.extend_from_slice(&img);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cifar10_records() {
        let red = [200u8; 1024];
        let bytes = build_cifar_record_bytes(CifarKind::Cifar10, &[(3, &red), (7, &[])]);
        assert_eq!(bytes.len(), 2 * 3073);
        let ds = CifarDataset::from_raw(&bytes, CifarKind::Cifar10, CifarSplit::Train).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.label(0), 3);
        assert_eq!(ds.label(1), 7);
        // red plane filled, green plane empty
        assert_eq!(ds.image_u8(0)[0], 200);
        assert_eq!(ds.image_u8(0)[1024], 0);
    }

    #[test]
    fn test_parse_cifar100_uses_fine_label() {
        let bytes = build_cifar_record_bytes(CifarKind::Cifar100, &[(42, &[]), (99, &[])]);
        assert_eq!(bytes[0], 8); // coarse
        assert_eq!(bytes[1], 42); // fine
        let ds = CifarDataset::from_raw(&bytes, CifarKind::Cifar100, CifarSplit::Test).unwrap();
        assert_eq!(ds.labels(), vec![42, 99]);
        assert_eq!(ds.name(), "CIFAR100-test");
    }

    #[test]
    fn test_truncated_bytes() {
        let mut bytes = build_cifar_record_bytes(CifarKind::Cifar10, &[(1, &[])]);
        bytes.pop();
        let err =
            CifarDataset::from_raw(&bytes, CifarKind::Cifar10, CifarSplit::Train).unwrap_err();
        assert!(matches!(err, DataError::Truncated { record_size: 3073, .. }));
    }

    #[test]
    fn test_label_out_of_range() {
        let bytes = build_cifar_record_bytes(CifarKind::Cifar10, &[(10, &[])]);
        let err =
            CifarDataset::from_raw(&bytes, CifarKind::Cifar10, CifarSplit::Train).unwrap_err();
        assert!(matches!(
            err,
            DataError::LabelOutOfRange {
                label: 10,
                num_classes: 10
            }
        ));
    }

    #[test]
    fn test_dataset_trait() {
        let pixels: Vec<u8> = (0..PIXELS_PER_IMAGE).map(|i| (i % 256) as u8).collect();
        let bytes = build_cifar_record_bytes(CifarKind::Cifar10, &[(5, &pixels)]);
        let ds = CifarDataset::from_raw(&bytes, CifarKind::Cifar10, CifarSplit::Test).unwrap();

        let s = ds.get(0);
        assert_eq!(s.feature_shape, vec![3, 32, 32]);
        assert_eq!(s.features.len(), 3072);
        assert_eq!(s.features[255], 255.0);
        assert_eq!(s.target, vec![5.0]);
        assert_eq!(ds.name(), "CIFAR10-test");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("cifar10".parse::<CifarKind>().unwrap(), CifarKind::Cifar10);
        assert_eq!("CIFAR100".parse::<CifarKind>().unwrap(), CifarKind::Cifar100);
        let err = "svhn".parse::<CifarKind>().unwrap_err();
        assert!(matches!(err, DataError::UnknownDataset(ref s) if s == "svhn"));
    }

    #[test]
    fn test_normalization_constants() {
        let (mean, std) = CifarKind::Cifar10.normalization();
        assert!((mean[0] - 125.3 / 255.0).abs() < 1e-12);
        assert!((std[2] - 66.7 / 255.0).abs() < 1e-12);
        let (mean, _) = CifarKind::Cifar100.normalization();
        assert!((mean[1] - 124.1 / 255.0).abs() < 1e-12);
    }

    #[test]
    fn test_synthetic_balanced() {
        let ds = CifarDataset::synthetic(100, CifarKind::Cifar10, CifarSplit::Train);
        assert_eq!(ds.len(), 100);
        for class in 0..10 {
            assert_eq!(ds.labels().iter().filter(|&&l| l == class).count(), 10);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err =
            CifarDataset::load(dir.path(), CifarKind::Cifar100, CifarSplit::Train).unwrap_err();
        match err {
            DataError::MissingFile(p) => assert!(p.ends_with("train.bin")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
