// Image Augmentation — random transforms for data augmentation
//
// All augmentations operate on `Sample::features` treating them as images
// in [C, H, W] layout (channel-first, row-major) with values in [0, 1].
// Samples of any other rank are returned unchanged.

use rand::seq::SliceRandom;
use rand::thread_rng;
use rand::Rng;

use crate::dataset::Sample;
use crate::transform::{resize_bilinear, Transform};

// RandomHorizontalFlip

/// Randomly flip an image horizontally with probability `p`.
#[derive(Debug, Clone)]
pub struct RandomHorizontalFlip {
    pub p: f64,
}

impl RandomHorizontalFlip {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl Transform for RandomHorizontalFlip {
    fn apply(&self, mut sample: Sample) -> Sample {
        let mut rng = thread_rng();
        if rng.gen::<f64>() >= self.p {
            return sample;
        }
        let Some((_, _, w)) = sample.chw().filter(|&(_, _, w)| w > 0) else {
            return sample;
        };
        for row in sample.features.chunks_mut(w) {
            row.reverse();
        }
        sample
    }
}

// RandomCrop

/// How [`RandomCrop`] fills the border it pads around the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingMode {
    /// Pad with zeros.
    Zero,
    /// Mirror the image at its edge, without repeating the edge pixel.
    Reflect,
}

/// Pad an image by `padding` pixels on all sides, then crop a random
/// `size × size` window.
#[derive(Debug, Clone)]
pub struct RandomCrop {
    pub size: usize,
    pub padding: usize,
    pub padding_mode: PaddingMode,
}

impl RandomCrop {
    pub fn new(size: usize, padding: usize) -> Self {
        Self {
            size,
            padding,
            padding_mode: PaddingMode::Zero,
        }
    }

    pub fn padding_mode(mut self, mode: PaddingMode) -> Self {
        self.padding_mode = mode;
        self
    }
}

impl Transform for RandomCrop {
    fn apply(&self, mut sample: Sample) -> Sample {
        let Some((c, h, w)) = sample.chw() else {
            return sample;
        };
        let pad = self.padding as isize;
        let padded_h = h + 2 * self.padding;
        let padded_w = w + 2 * self.padding;
        if self.size > padded_h || self.size > padded_w {
            return sample;
        }
        // Reflection needs at least one interior pixel to mirror over.
        let reflect_ok = self.padding < h && self.padding < w;
        let mode = if self.padding_mode == PaddingMode::Reflect && !reflect_ok {
            PaddingMode::Zero
        } else {
            self.padding_mode
        };

        // Random crop position in padded coordinates
        let mut rng = thread_rng();
        let y0 = rng.gen_range(0..=padded_h - self.size) as isize;
        let x0 = rng.gen_range(0..=padded_w - self.size) as isize;

        let size = self.size;
        let mut cropped = vec![0.0; c * size * size];
        for ch in 0..c {
            for row in 0..size {
                let sy = y0 + row as isize - pad;
                for col in 0..size {
                    let sx = x0 + col as isize - pad;
                    let value = match mode {
                        PaddingMode::Zero => {
                            if sy < 0 || sx < 0 || sy >= h as isize || sx >= w as isize {
                                0.0
                            } else {
                                sample.features[ch * h * w + sy as usize * w + sx as usize]
                            }
                        }
                        PaddingMode::Reflect => {
                            let ry = reflect(sy, h);
                            let rx = reflect(sx, w);
                            sample.features[ch * h * w + ry * w + rx]
                        }
                    };
                    cropped[ch * size * size + row * size + col] = value;
                }
            }
        }

        sample.features = cropped;
        sample.feature_shape = vec![c, size, size];
        sample
    }
}

/// Mirror a coordinate into `0..len` (edge pixel not repeated).
fn reflect(i: isize, len: usize) -> usize {
    let last = len as isize - 1;
    let r = if i < 0 {
        -i
    } else if i > last {
        2 * last - i
    } else {
        i
    };
    r.clamp(0, last) as usize
}

// RandomResizedCrop

/// Crop a random region of random area and aspect ratio, then resize it to
/// `size × size`.
///
/// `scale` bounds the crop area as a fraction of the image, `ratio` bounds
/// its width/height ratio.
#[derive(Debug, Clone)]
pub struct RandomResizedCrop {
    pub size: usize,
    pub scale: (f64, f64),
    pub ratio: (f64, f64),
}

impl RandomResizedCrop {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            scale: (0.08, 1.0),
            ratio: (3.0 / 4.0, 4.0 / 3.0),
        }
    }

    pub fn scale(mut self, min: f64, max: f64) -> Self {
        self.scale = (min, max);
        self
    }

    pub fn ratio(mut self, min: f64, max: f64) -> Self {
        self.ratio = (min, max);
        self
    }

    /// Pick `(top, left, height, width)` of the crop window.
    fn window<R: Rng>(&self, rng: &mut R, h: usize, w: usize) -> (usize, usize, usize, usize) {
        let area = (h * w) as f64;
        let (log_lo, log_hi) = (self.ratio.0.ln(), self.ratio.1.ln());
        for _ in 0..10 {
            let target_area = area * rng.gen_range(self.scale.0..=self.scale.1);
            let aspect = rng.gen_range(log_lo..=log_hi).exp();
            let cw = (target_area * aspect).sqrt().round() as usize;
            let ch = (target_area / aspect).sqrt().round() as usize;
            if cw > 0 && cw <= w && ch > 0 && ch <= h {
                let top = rng.gen_range(0..=h - ch);
                let left = rng.gen_range(0..=w - cw);
                return (top, left, ch, cw);
            }
        }

        // Fallback to a central crop
        let in_ratio = w as f64 / h as f64;
        let (ch, cw) = if in_ratio < self.ratio.0 {
            (((w as f64 / self.ratio.0).round() as usize).clamp(1, h), w)
        } else if in_ratio > self.ratio.1 {
            (h, ((h as f64 * self.ratio.1).round() as usize).clamp(1, w))
        } else {
            (h, w)
        };
        ((h - ch) / 2, (w - cw) / 2, ch, cw)
    }
}

impl Transform for RandomResizedCrop {
    fn apply(&self, mut sample: Sample) -> Sample {
        let Some((c, h, w)) = sample.chw() else {
            return sample;
        };
        if h == 0 || w == 0 {
            return sample;
        }
        let window = self.window(&mut thread_rng(), h, w);
        sample.features =
            resize_bilinear(&sample.features, (c, h, w), window, self.size, self.size);
        sample.feature_shape = vec![c, self.size, self.size];
        sample
    }
}

// ColorJitter — random brightness/contrast/saturation/hue for images in [0,1]

/// Randomly adjust brightness, contrast, saturation and hue, in random order.
///
/// Brightness, contrast and saturation factors are drawn from
/// `[max(0, 1 - v), 1 + v]`; the hue shift from `[-hue, hue]` (fraction of a
/// full turn, at most 0.5).  Saturation and hue need 3-channel RGB images.
#[derive(Debug, Clone)]
pub struct ColorJitter {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub hue: f64,
}

impl ColorJitter {
    pub fn new(brightness: f64, contrast: f64, saturation: f64, hue: f64) -> Self {
        Self {
            brightness,
            contrast,
            saturation,
            hue: hue.min(0.5),
        }
    }
}

#[derive(Clone, Copy)]
enum JitterOp {
    Brightness,
    Contrast,
    Saturation,
    Hue,
}

impl Transform for ColorJitter {
    fn apply(&self, mut sample: Sample) -> Sample {
        let Some((c, h, w)) = sample.chw() else {
            return sample;
        };
        let plane = h * w;
        let mut rng = thread_rng();
        let mut ops = [
            JitterOp::Brightness,
            JitterOp::Contrast,
            JitterOp::Saturation,
            JitterOp::Hue,
        ];
        ops.shuffle(&mut rng);

        for op in ops {
            match op {
                JitterOp::Brightness if self.brightness > 0.0 => {
                    let f = jitter_factor(&mut rng, self.brightness);
                    blend_constant(&mut sample.features, 0.0, f);
                }
                JitterOp::Contrast if self.contrast > 0.0 => {
                    let f = jitter_factor(&mut rng, self.contrast);
                    let mean = if c == 3 {
                        mean(&grayscale_plane(&sample.features, plane))
                    } else {
                        mean(&sample.features)
                    };
                    blend_constant(&mut sample.features, mean, f);
                }
                JitterOp::Saturation if self.saturation > 0.0 && c == 3 => {
                    let f = jitter_factor(&mut rng, self.saturation);
                    adjust_saturation(&mut sample.features, plane, f);
                }
                JitterOp::Hue if self.hue > 0.0 && c == 3 => {
                    let shift = rng.gen_range(-self.hue..=self.hue);
                    shift_hue(&mut sample.features, plane, shift);
                }
                _ => {}
            }
        }
        sample
    }
}

fn jitter_factor<R: Rng>(rng: &mut R, v: f64) -> f64 {
    rng.gen_range((1.0 - v).max(0.0)..=1.0 + v)
}

// RandomGrayscale

/// Convert an RGB image to grayscale (kept as 3 identical channels) with
/// probability `p`.
#[derive(Debug, Clone)]
pub struct RandomGrayscale {
    pub p: f64,
}

impl RandomGrayscale {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl Transform for RandomGrayscale {
    fn apply(&self, mut sample: Sample) -> Sample {
        let Some((3, h, w)) = sample.chw() else {
            return sample;
        };
        if thread_rng().gen::<f64>() >= self.p {
            return sample;
        }
        let gray = grayscale_plane(&sample.features, h * w);
        for channel in sample.features.chunks_mut(h * w) {
            channel.copy_from_slice(&gray);
        }
        sample
    }
}

// Pixel helpers shared with RandAugment

/// ITU-R 601-2 luma of a channel-planar RGB image.
pub(crate) fn grayscale_plane(features: &[f64], plane: usize) -> Vec<f64> {
    let (r, rest) = features.split_at(plane);
    let (g, b) = rest.split_at(plane);
    r.iter()
        .zip(g)
        .zip(b)
        .map(|((&r, &g), &b)| 0.299 * r + 0.587 * g + 0.114 * b)
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// `x = clamp(f * x + (1 - f) * target)`; `f = 0` gives the target, `f = 1`
/// the original.
pub(crate) fn blend_constant(features: &mut [f64], target: f64, f: f64) {
    for v in features {
        *v = (f * *v + (1.0 - f) * target).clamp(0.0, 1.0);
    }
}

/// Blend each pixel with its luma by factor `f`.
pub(crate) fn adjust_saturation(features: &mut [f64], plane: usize, f: f64) {
    let gray = grayscale_plane(features, plane);
    for channel in features.chunks_mut(plane) {
        for (v, &g) in channel.iter_mut().zip(&gray) {
            *v = (f * *v + (1.0 - f) * g).clamp(0.0, 1.0);
        }
    }
}

/// Rotate hue by `shift` of a full turn via HSV.
fn shift_hue(features: &mut [f64], plane: usize, shift: f64) {
    for i in 0..plane {
        let (r, g, b) = (features[i], features[plane + i], features[2 * plane + i]);
        let (hue, s, v) = rgb_to_hsv(r, g, b);
        let (r, g, b) = hsv_to_rgb((hue + shift).rem_euclid(1.0), s, v);
        features[i] = r;
        features[plane + i] = g;
        features[2 * plane + i] = b;
    }
}

fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    if delta == 0.0 {
        return (0.0, s, max);
    }
    let h = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    (h / 6.0, s, max)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    let h6 = h * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as i64 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn make_image_sample(c: usize, h: usize, w: usize) -> Sample {
        let n = c * h * w;
        Sample::image((0..n).map(|i| i as f64).collect(), vec![c, h, w], 0)
    }

    fn unit_image(c: usize, h: usize, w: usize) -> Sample {
        let n = c * h * w;
        Sample::image((0..n).map(|i| i as f64 / n as f64).collect(), vec![c, h, w], 0)
    }

    #[test]
    fn horizontal_flip_deterministic() {
        // p=1.0 always flips
        let flip = RandomHorizontalFlip::new(1.0);
        let sample = make_image_sample(1, 2, 3);
        // Original: [0,1,2, 3,4,5]
        let result = flip.apply(sample);
        // Flipped:  [2,1,0, 5,4,3]
        assert_eq!(result.features, vec![2.0, 1.0, 0.0, 5.0, 4.0, 3.0]);
    }

    #[test]
    fn horizontal_flip_never() {
        let flip = RandomHorizontalFlip::new(0.0);
        let sample = make_image_sample(2, 2, 2);
        assert_eq!(flip.apply(sample.clone()), sample);
    }

    #[test]
    fn random_crop_no_padding_same_size() {
        let crop = RandomCrop::new(3, 0);
        let sample = make_image_sample(1, 3, 3);
        let result = crop.apply(sample.clone());
        assert_eq!(result, sample);
    }

    #[test]
    fn random_crop_with_padding() {
        let crop = RandomCrop::new(4, 1);
        let sample = make_image_sample(2, 4, 4);
        let result = crop.apply(sample);
        assert_eq!(result.feature_shape, vec![2, 4, 4]);
        assert_eq!(result.features.len(), 32);
    }

    #[test]
    fn reflect_padding_never_zero_fills() {
        // All pixels >= 1, so a zero would reveal constant padding.
        let crop = RandomCrop::new(4, 2).padding_mode(PaddingMode::Reflect);
        let sample = Sample::image((1..=16).map(|i| i as f64).collect(), vec![1, 4, 4], 0);
        for _ in 0..20 {
            let result = crop.apply(sample.clone());
            assert!(result.features.iter().all(|&v| v >= 1.0));
        }
    }

    #[test]
    fn reflect_index() {
        assert_eq!(reflect(-1, 4), 1);
        assert_eq!(reflect(-2, 4), 2);
        assert_eq!(reflect(4, 4), 2);
        assert_eq!(reflect(5, 4), 1);
        assert_eq!(reflect(2, 4), 2);
    }

    #[test]
    fn random_resized_crop_output_shape() {
        let crop = RandomResizedCrop::new(8).scale(0.2, 1.0);
        let result = crop.apply(unit_image(3, 12, 16));
        assert_eq!(result.feature_shape, vec![3, 8, 8]);
        assert_eq!(result.features.len(), 3 * 64);
        assert!(result.features.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn random_resized_crop_window_in_bounds() {
        let crop = RandomResizedCrop::new(4).scale(0.2, 1.0);
        let mut rng = thread_rng();
        for _ in 0..50 {
            let (top, left, ch, cw) = crop.window(&mut rng, 10, 7);
            assert!(ch > 0 && cw > 0);
            assert!(top + ch <= 10);
            assert!(left + cw <= 7);
        }
    }

    #[test]
    fn color_jitter_stays_in_range() {
        let jitter = ColorJitter::new(0.4, 0.4, 0.4, 0.1);
        let sample = unit_image(3, 4, 4);
        for _ in 0..10 {
            let result = jitter.apply(sample.clone());
            assert_eq!(result.features.len(), sample.features.len());
            assert!(result.features.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn color_jitter_zero_is_identity() {
        let jitter = ColorJitter::new(0.0, 0.0, 0.0, 0.0);
        let sample = unit_image(3, 2, 2);
        assert_eq!(jitter.apply(sample.clone()), sample);
    }

    #[test]
    fn grayscale_equal_channels() {
        let gray = RandomGrayscale::new(1.0);
        let result = gray.apply(unit_image(3, 2, 2));
        let (r, rest) = result.features.split_at(4);
        let (g, b) = rest.split_at(4);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn grayscale_ignores_single_channel() {
        let gray = RandomGrayscale::new(1.0);
        let sample = unit_image(1, 2, 2);
        assert_eq!(gray.apply(sample.clone()), sample);
    }

    #[test]
    fn hsv_roundtrip() {
        for &(r, g, b) in &[(0.2, 0.4, 0.6), (0.9, 0.1, 0.3), (0.5, 0.5, 0.5), (0.0, 1.0, 0.0)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            let (r2, g2, b2) = hsv_to_rgb(h, s, v);
            assert!((r - r2).abs() < 1e-9 && (g - g2).abs() < 1e-9 && (b - b2).abs() < 1e-9);
        }
    }
}
