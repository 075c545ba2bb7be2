// Dataset Combinators — subset views and in-memory datasets

use std::sync::Arc;

use crate::dataset::{Dataset, Sample};
use crate::error::{DataError, Result};

// SubsetDataset — view of selected indices

/// A dataset that exposes only the samples at the given indices.
///
/// Indices may repeat: an expanded labeled split lists every labeled sample
/// several times so one pass covers a full epoch of optimisation steps.
#[derive(Clone)]
pub struct SubsetDataset<D: Dataset> {
    inner: D,
    indices: Vec<usize>,
}

impl<D: Dataset> SubsetDataset<D> {
    /// Create a subset of `inner` containing only the samples at `indices`.
    ///
    /// Returns an error if any index is out of range for `inner`.
    pub fn new(inner: D, indices: Vec<usize>) -> Result<Self> {
        let n = inner.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(DataError::msg(format!(
                "SubsetDataset: index {bad} out of range for dataset of {n} samples"
            )));
        }
        Ok(Self { inner, indices })
    }

    /// The indices into the wrapped dataset, in subset order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// The wrapped dataset.
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Dataset> Dataset for SubsetDataset<D> {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&self, index: usize) -> Sample {
        self.inner.get(self.indices[index])
    }

    fn label(&self, index: usize) -> usize {
        self.inner.label(self.indices[index])
    }

    fn feature_shape(&self) -> &[usize] {
        self.inner.feature_shape()
    }

    fn target_shape(&self) -> &[usize] {
        self.inner.target_shape()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// VecDataset — in-memory dataset from raw vectors

/// A simple in-memory dataset backed by a shared `Vec<Sample>`.
///
/// Cloning is cheap, so it can be split into subsets without copying pixels.
#[derive(Clone)]
pub struct VecDataset {
    samples: Arc<Vec<Sample>>,
    feature_shape: Vec<usize>,
    target_shape: Vec<usize>,
    dataset_name: String,
}

impl VecDataset {
    /// Create a VecDataset from a vector of samples.
    ///
    /// All samples must share the shape of the first one.
    pub fn new(samples: Vec<Sample>, name: &str) -> Result<Self> {
        let first = samples
            .first()
            .ok_or_else(|| DataError::msg("VecDataset: need at least one sample"))?;
        let feature_shape = first.feature_shape.clone();
        let target_shape = first.target_shape.clone();
        if let Some(bad) = samples.iter().find(|s| s.feature_shape != feature_shape) {
            return Err(DataError::ShapeMismatch {
                expected: feature_shape,
                got: bad.feature_shape.clone(),
            });
        }
        Ok(Self {
            samples: Arc::new(samples),
            feature_shape,
            target_shape,
            dataset_name: name.to_string(),
        })
    }

    /// Build an image-classification dataset from flat pixels and class labels.
    ///
    /// `pixels` holds `labels.len()` images of `image_shape` back to back.
    pub fn from_flat(
        pixels: &[f64],
        image_shape: &[usize],
        labels: &[usize],
        name: &str,
    ) -> Result<Self> {
        let per_image: usize = image_shape.iter().product();
        if per_image == 0 || pixels.len() != labels.len() * per_image {
            return Err(DataError::msg(format!(
                "VecDataset: {} pixels do not hold {} images of shape {:?}",
                pixels.len(),
                labels.len(),
                image_shape
            )));
        }

        let samples: Vec<Sample> = pixels
            .chunks_exact(per_image)
            .zip(labels)
            .map(|(img, &label)| Sample::image(img.to_vec(), image_shape.to_vec(), label))
            .collect();

        Self::new(samples, name)
    }
}

impl Dataset for VecDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Sample {
        self.samples[index].clone()
    }

    fn label(&self, index: usize) -> usize {
        self.samples[index].class()
    }

    fn feature_shape(&self) -> &[usize] {
        &self.feature_shape
    }

    fn target_shape(&self) -> &[usize] {
        &self.target_shape
    }

    fn name(&self) -> &str {
        &self.dataset_name
    }
}

// Tests
