// Dataset trait — indexed source of labeled images

/// A single sample: an image plus its class label.
///
/// Images are stored flattened in channel-first `[C, H, W]` order so that
/// augmentations and collation can work on them without reshaping.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Pixel values (flattened, channel-first).
    pub features: Vec<f64>,
    /// Shape of the image, e.g. `[3, 32, 32]` for CIFAR.
    pub feature_shape: Vec<usize>,
    /// Target value(s).  For classification a single-element vec holding the
    /// class index as `f64`.
    pub target: Vec<f64>,
    /// Shape of the target, `[1]` for a class index.
    pub target_shape: Vec<usize>,
}

impl Sample {
    /// Build a classification sample from an image and a class index.
    pub fn image(features: Vec<f64>, feature_shape: Vec<usize>, class: usize) -> Self {
        Self {
            features,
            feature_shape,
            target: vec![class as f64],
            target_shape: vec![1],
        }
    }

    /// The class index stored in `target[0]`.
    pub fn class(&self) -> usize {
        self.target.first().map(|&t| t as usize).unwrap_or(0)
    }

    /// `(C, H, W)` if the sample is a 3-d image.
    pub fn chw(&self) -> Option<(usize, usize, usize)> {
        match self.feature_shape.as_slice() {
            &[c, h, w] => Some((c, h, w)),
            _ => None,
        }
    }
}

/// A dataset is an indexed collection of samples.
///
/// Implementations must be `Send + Sync` so loaders can read from multiple
/// threads when parallel fetching is enabled.
pub trait Dataset: Send + Sync {
    /// Total number of samples in the dataset.
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the sample at position `index`.
    ///
    /// # Panics
    /// May panic if `index >= self.len()`.
    fn get(&self, index: usize) -> Sample;

    /// Class label of the sample at `index`.
    ///
    /// The default decodes the full sample; in-memory datasets override this
    /// so stratified sampling does not touch pixel data.
    fn label(&self, index: usize) -> usize {
        self.get(index).class()
    }

    /// All labels in index order.
    fn labels(&self) -> Vec<usize> {
        (0..self.len()).map(|i| self.label(i)).collect()
    }

    /// The shape of a single feature sample (without batch dim).
    fn feature_shape(&self) -> &[usize];

    /// The shape of a single target sample (without batch dim).
    fn target_shape(&self) -> &[usize];

    /// Optional human-readable name.
    fn name(&self) -> &str {
        "dataset"
    }
}
