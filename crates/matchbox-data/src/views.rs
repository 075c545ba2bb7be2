// Multi-view transforms — one, two or three augmented views per sample
//
//   test      Resize(32)                 -> 1 view
//   casual    weak                       -> 1 view
//   fixmatch  weak, strong               -> 2 views
//   comatch   weak, strong, strong-color -> 3 views
//
// Every view is scaled to [0, 1] before augmenting and standardized with the
// dataset's per-channel mean/std afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::augment::{
    ColorJitter, PaddingMode, RandomCrop, RandomGrayscale, RandomHorizontalFlip, RandomResizedCrop,
};
use crate::cifar::{CifarKind, IMAGE_SIZE};
use crate::dataset::{Dataset, Sample};
use crate::error::{DataError, Result};
use crate::randaugment::RandAugmentMc;
use crate::transform::{ChannelNormalize, Compose, Normalize, RandomApply, Resize, Transform};

/// Which set of views [`TransformSsl`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AugmentMode {
    /// Evaluation: resize only.
    Test,
    /// Labeled training: one weak view.
    Casual,
    /// Unlabeled training: weak + strong.
    #[serde(rename = "fixmatch")]
    FixMatch,
    /// Unlabeled training: weak + strong + color-jittered strong.
    #[serde(rename = "comatch")]
    CoMatch,
}

impl AugmentMode {
    /// Number of views produced per sample.
    pub fn num_views(self) -> usize {
        match self {
            AugmentMode::Test | AugmentMode::Casual => 1,
            AugmentMode::FixMatch => 2,
            AugmentMode::CoMatch => 3,
        }
    }

    /// Whether this mode can drive the unlabeled training set.
    pub fn is_unlabeled_train(self) -> bool {
        matches!(self, AugmentMode::FixMatch | AugmentMode::CoMatch)
    }
}

impl fmt::Display for AugmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AugmentMode::Test => "test",
            AugmentMode::Casual => "casual",
            AugmentMode::FixMatch => "fixmatch",
            AugmentMode::CoMatch => "comatch",
        };
        f.write_str(s)
    }
}

impl FromStr for AugmentMode {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "test" => Ok(AugmentMode::Test),
            "casual" => Ok(AugmentMode::Casual),
            "fixmatch" => Ok(AugmentMode::FixMatch),
            "comatch" => Ok(AugmentMode::CoMatch),
            _ => Err(DataError::UnknownMode(s.to_string())),
        }
    }
}

/// Weak view: random horizontal flip, then a reflect-padded random crop.
pub fn weak_transform(size: usize) -> Compose {
    Compose::new(vec![
        Box::new(RandomHorizontalFlip::new(0.5)),
        Box::new(RandomCrop::new(size, size / 8).padding_mode(PaddingMode::Reflect)),
    ])
}

/// Strong view: the weak view followed by RandAugment(2, 10) with Cutout.
pub fn strong_transform(size: usize) -> Compose {
    Compose::new(vec![
        Box::new(RandomHorizontalFlip::new(0.5)),
        Box::new(RandomCrop::new(size, size / 8).padding_mode(PaddingMode::Reflect)),
        Box::new(RandAugmentMc::new(2, 10).cutout(size / 2)),
    ])
}

/// Second strong view used for contrastive learning: resized crop, flip,
/// color jitter and random grayscale.
pub fn strong_contrastive_transform(size: usize) -> Compose {
    Compose::new(vec![
        Box::new(RandomResizedCrop::new(size).scale(0.2, 1.0)),
        Box::new(RandomHorizontalFlip::new(0.5)),
        Box::new(RandomApply::new(
            Box::new(ColorJitter::new(0.4, 0.4, 0.4, 0.1)),
            0.8,
        )),
        Box::new(RandomGrayscale::new(0.2)),
    ])
}

/// Dispatches a sample to the views required by an [`AugmentMode`].
pub struct TransformSsl {
    mode: AugmentMode,
    to_unit: Normalize,
    test: Resize,
    weak: Compose,
    strong: Compose,
    strong_contrastive: Compose,
    normalize: ChannelNormalize,
}

impl TransformSsl {
    /// Build the view pipeline for a CIFAR variant (32×32 images and the
    /// variant's normalization constants).
    pub fn new(kind: CifarKind, mode: AugmentMode) -> Self {
        let (mean, std) = kind.normalization();
        Self::with_normalization(&mean, &std, IMAGE_SIZE, mode)
    }

    /// Build the view pipeline for arbitrary `size × size` images with the
    /// given per-channel statistics (in `[0, 1]` pixel units).
    pub fn with_normalization(mean: &[f64], std: &[f64], size: usize, mode: AugmentMode) -> Self {
        Self {
            mode,
            to_unit: Normalize::new(255.0),
            test: Resize::new(size),
            weak: weak_transform(size),
            strong: strong_transform(size),
            strong_contrastive: strong_contrastive_transform(size),
            normalize: ChannelNormalize::new(mean, std),
        }
    }

    pub fn mode(&self) -> AugmentMode {
        self.mode
    }

    pub fn num_views(&self) -> usize {
        self.mode.num_views()
    }

    /// Produce the views of `sample`, whose pixels are in `0..=255`.
    pub fn views(&self, sample: Sample) -> Vec<Sample> {
        let sample = self.to_unit.apply(sample);
        let finish = |s: Sample| self.normalize.apply(s);
        match self.mode {
            AugmentMode::Test => vec![finish(self.test.apply(sample))],
            AugmentMode::Casual => vec![finish(self.weak.apply(sample))],
            AugmentMode::FixMatch => vec![
                finish(self.weak.apply(sample.clone())),
                finish(self.strong.apply(sample)),
            ],
            AugmentMode::CoMatch => vec![
                finish(self.weak.apply(sample.clone())),
                finish(self.strong.apply(sample.clone())),
                finish(self.strong_contrastive.apply(sample)),
            ],
        }
    }
}

/// The views of one sample plus its class label.
#[derive(Debug, Clone)]
pub struct ViewSample {
    pub views: Vec<Sample>,
    pub class: usize,
}

/// An indexed source of multi-view samples, consumed by the data loaders.
pub trait ViewDataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Views produced for every sample.
    fn num_views(&self) -> usize;

    /// Views of the sample at `index`.
    fn get_views(&self, index: usize) -> ViewSample;

    fn name(&self) -> &str {
        "views"
    }
}

/// A dataset whose samples are expanded into views by a [`TransformSsl`].
pub struct SslDataset<D: Dataset> {
    inner: D,
    transform: TransformSsl,
}

impl<D: Dataset> SslDataset<D> {
    pub fn new(inner: D, transform: TransformSsl) -> Self {
        Self { inner, transform }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn mode(&self) -> AugmentMode {
        self.transform.mode()
    }
}

impl<D: Dataset> ViewDataset for SslDataset<D> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn num_views(&self) -> usize {
        self.transform.num_views()
    }

    fn get_views(&self, index: usize) -> ViewSample {
        let sample = self.inner.get(index);
        let class = sample.class();
        ViewSample {
            views: self.transform.views(sample),
            class,
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
