// Transform — preprocessing pipeline applied to one sample at a time

use rand::{thread_rng, Rng};

use crate::dataset::Sample;

/// A transform applied to each sample before batching.
pub trait Transform: Send + Sync {
    /// Apply the transform to a sample, returning the modified sample.
    fn apply(&self, sample: Sample) -> Sample;
}

// Built-in transforms

/// Normalize features to [0, 1] by dividing by a given scale factor.
///
/// Commonly used for image pixels: `Normalize::new(255.0)`.
#[derive(Debug, Clone)]
pub struct Normalize {
    scale: f64,
}

impl Normalize {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }
}

impl Transform for Normalize {
    fn apply(&self, mut sample: Sample) -> Sample {
        for v in &mut sample.features {
            *v /= self.scale;
        }
        sample
    }
}

/// Per-channel standardization: `x[c] = (x[c] - mean[c]) / std[c]`.
///
/// Expects `feature_shape = [C, H, W]` with `C == mean.len()`; other shapes
/// are passed through unchanged.
#[derive(Debug, Clone)]
pub struct ChannelNormalize {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl ChannelNormalize {
    pub fn new(mean: &[f64], std: &[f64]) -> Self {
        assert_eq!(
            mean.len(),
            std.len(),
            "ChannelNormalize: mean and std must have the same length"
        );
        Self {
            mean: mean.to_vec(),
            std: std.to_vec(),
        }
    }
}

impl Transform for ChannelNormalize {
    fn apply(&self, mut sample: Sample) -> Sample {
        let Some((c, h, w)) = sample.chw() else {
            return sample;
        };
        if c != self.mean.len() || h * w == 0 {
            return sample;
        }
        let plane = h * w;
        for (ch, values) in sample.features.chunks_mut(plane).enumerate() {
            let (m, s) = (self.mean[ch], self.std[ch]);
            for v in values {
                *v = (*v - m) / s;
            }
        }
        sample
    }
}

/// Resize so the shorter side equals `size`, keeping the aspect ratio.
///
/// Bilinear interpolation; a no-op when the shorter side already matches.
#[derive(Debug, Clone)]
pub struct Resize {
    pub size: usize,
}

impl Resize {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Transform for Resize {
    fn apply(&self, mut sample: Sample) -> Sample {
        let Some((c, h, w)) = sample.chw() else {
            return sample;
        };
        if h == 0 || w == 0 {
            return sample;
        }
        let (new_h, new_w) = if h <= w {
            (self.size, self.size * w / h)
        } else {
            (self.size * h / w, self.size)
        };
        if (new_h, new_w) == (h, w) {
            return sample;
        }
        sample.features = resize_bilinear(&sample.features, (c, h, w), (0, 0, h, w), new_h, new_w);
        sample.feature_shape = vec![c, new_h, new_w];
        sample
    }
}

/// Apply the inner transform with probability `p`.
pub struct RandomApply {
    inner: Box<dyn Transform>,
    p: f64,
}

impl RandomApply {
    pub fn new(inner: Box<dyn Transform>, p: f64) -> Self {
        Self { inner, p }
    }
}

impl Transform for RandomApply {
    fn apply(&self, sample: Sample) -> Sample {
        if thread_rng().gen::<f64>() < self.p {
            self.inner.apply(sample)
        } else {
            sample
        }
    }
}

/// Chain multiple transforms.
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }
}

impl Transform for Compose {
    fn apply(&self, mut sample: Sample) -> Sample {
        for t in &self.transforms {
            sample = t.apply(sample);
        }
        sample
    }
}

/// Bilinearly resample the window `(top, left, win_h, win_w)` of a `[C, H, W]`
/// image to `out_h × out_w` (half-pixel centers, edges clamped).
pub(crate) fn resize_bilinear(
    src: &[f64],
    (c, h, w): (usize, usize, usize),
    (top, left, win_h, win_w): (usize, usize, usize, usize),
    out_h: usize,
    out_w: usize,
) -> Vec<f64> {
    let scale_y = win_h as f64 / out_h as f64;
    let scale_x = win_w as f64 / out_w as f64;
    let max_y = (win_h - 1) as f64;
    let max_x = (win_w - 1) as f64;

    let mut out = vec![0.0; c * out_h * out_w];
    for ch in 0..c {
        let plane = &src[ch * h * w..(ch + 1) * h * w];
        for oy in 0..out_h {
            let sy = ((oy as f64 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);
            let y0 = sy.floor() as usize;
            let y1 = (y0 + 1).min(win_h - 1);
            let fy = sy - y0 as f64;
            for ox in 0..out_w {
                let sx = ((ox as f64 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
                let x0 = sx.floor() as usize;
                let x1 = (x0 + 1).min(win_w - 1);
                let fx = sx - x0 as f64;

                let at = |y: usize, x: usize| plane[(top + y) * w + left + x];
                let top_row = at(y0, x0) * (1.0 - fx) + at(y0, x1) * fx;
                let bottom_row = at(y1, x0) * (1.0 - fx) + at(y1, x1) * fx;
                out[ch * out_h * out_w + oy * out_w + ox] = top_row * (1.0 - fy) + bottom_row * fy;
            }
        }
    }
    out
}
