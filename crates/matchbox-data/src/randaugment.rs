// RandAugment (FixMatch variant) — strong augmentation policy
//
// Each call picks `n` operations (with replacement) from a fixed pool, draws a
// magnitude in [1, m) for each, and applies every pick with probability 0.5.
// A gray Cutout square is always applied last.
//
// Operations work on [C, H, W] images with values in [0, 1].  Ops that are
// defined on 8-bit levels (posterize, solarize, equalize) quantize to 0..=255
// internally.  Geometric ops use nearest-neighbour sampling and fill the
// uncovered area with black.

use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};

use crate::augment::{adjust_saturation, blend_constant, grayscale_plane, mean};
use crate::dataset::Sample;
use crate::transform::Transform;

/// Magnitudes are expressed on a 0..10 scale.
const PARAMETER_MAX: f64 = 10.0;

/// Cutout fill, mid gray (127 / 255).
const CUTOUT_FILL: f64 = 127.0 / 255.0;

/// A single RandAugment operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentOp {
    AutoContrast,
    Brightness,
    Color,
    Contrast,
    Equalize,
    Identity,
    Posterize,
    Rotate,
    Sharpness,
    ShearX,
    ShearY,
    Solarize,
    TranslateX,
    TranslateY,
}

/// The FixMatch operation pool: `(op, max value, bias)`.
pub const FIXMATCH_POOL: [(AugmentOp, f64, f64); 14] = [
    (AugmentOp::AutoContrast, 0.0, 0.0),
    (AugmentOp::Brightness, 0.9, 0.05),
    (AugmentOp::Color, 0.9, 0.05),
    (AugmentOp::Contrast, 0.9, 0.05),
    (AugmentOp::Equalize, 0.0, 0.0),
    (AugmentOp::Identity, 0.0, 0.0),
    (AugmentOp::Posterize, 4.0, 4.0),
    (AugmentOp::Rotate, 30.0, 0.0),
    (AugmentOp::Sharpness, 0.9, 0.05),
    (AugmentOp::ShearX, 0.3, 0.0),
    (AugmentOp::ShearY, 0.3, 0.0),
    (AugmentOp::Solarize, 256.0, 0.0),
    (AugmentOp::TranslateX, 0.3, 0.0),
    (AugmentOp::TranslateY, 0.3, 0.0),
];

fn float_parameter(v: usize, max_v: f64) -> f64 {
    v as f64 * max_v / PARAMETER_MAX
}

fn int_parameter(v: usize, max_v: f64) -> i64 {
    (v as f64 * max_v / PARAMETER_MAX) as i64
}

fn random_sign<R: Rng>(rng: &mut R, v: f64) -> f64 {
    if rng.gen::<f64>() < 0.5 {
        -v
    } else {
        v
    }
}

/// RandAugment with the FixMatch pool and a fixed Cutout.
#[derive(Debug, Clone)]
pub struct RandAugmentMc {
    /// Operations drawn per image.
    pub n: usize,
    /// Upper bound (exclusive) of the magnitude draw.
    pub m: usize,
    /// Side of the Cutout square in pixels.
    pub cutout: usize,
}

impl RandAugmentMc {
    pub fn new(n: usize, m: usize) -> Self {
        assert!((1..=10).contains(&m), "RandAugmentMc: m must be in 1..=10, got {m}");
        Self { n, m, cutout: 16 }
    }

    pub fn cutout(mut self, size: usize) -> Self {
        self.cutout = size;
        self
    }
}

impl Transform for RandAugmentMc {
    fn apply(&self, mut sample: Sample) -> Sample {
        if sample.chw().is_none() {
            return sample;
        }
        let mut rng = thread_rng();
        for _ in 0..self.n {
            let Some(&(op, max_v, bias)) = FIXMATCH_POOL.choose(&mut rng) else {
                break;
            };
            let v = if self.m > 1 { rng.gen_range(1..self.m) } else { 1 };
            if rng.gen::<f64>() < 0.5 {
                apply_op(&mut sample, op, v, max_v, bias, &mut rng);
            }
        }
        cutout_abs(&mut sample, self.cutout, &mut rng);
        sample
    }
}

/// Apply one operation at magnitude `v` (0..10 scale).
pub fn apply_op<R: Rng>(
    sample: &mut Sample,
    op: AugmentOp,
    v: usize,
    max_v: f64,
    bias: f64,
    rng: &mut R,
) {
    let Some((c, h, w)) = sample.chw().filter(|&(_, h, w)| h * w > 0) else {
        return;
    };
    let plane = h * w;
    let img = &mut sample.features;
    match op {
        AugmentOp::Identity => {}
        AugmentOp::AutoContrast => auto_contrast(img, plane),
        AugmentOp::Equalize => equalize(img, plane),
        AugmentOp::Brightness => {
            blend_constant(img, 0.0, float_parameter(v, max_v) + bias);
        }
        AugmentOp::Color => {
            if c == 3 {
                adjust_saturation(img, plane, float_parameter(v, max_v) + bias);
            }
        }
        AugmentOp::Contrast => {
            let m = if c == 3 {
                mean(&grayscale_plane(img, plane))
            } else {
                mean(img)
            };
            blend_constant(img, m, float_parameter(v, max_v) + bias);
        }
        AugmentOp::Sharpness => sharpness(img, (c, h, w), float_parameter(v, max_v) + bias),
        AugmentOp::Posterize => {
            let bits = (int_parameter(v, max_v) + bias as i64).clamp(1, 8) as u32;
            let mask = !((1u16 << (8 - bits)) - 1) as u8;
            for x in img.iter_mut() {
                *x = (to_level(*x) & mask) as f64 / 255.0;
            }
        }
        AugmentOp::Solarize => {
            let threshold = 256 - int_parameter(v, max_v);
            for x in img.iter_mut() {
                let level = to_level(*x) as i64;
                if level >= threshold {
                    *x = (255 - level) as f64 / 255.0;
                }
            }
        }
        AugmentOp::Rotate => {
            let degrees = random_sign(rng, int_parameter(v, max_v) as f64);
            let a = -degrees.to_radians();
            let (cos, sin) = (a.cos(), a.sin());
            let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
            // Rotation about the centre, expressed as an output → input map.
            let matrix = [
                cos,
                sin,
                cx - cos * cx - sin * cy,
                -sin,
                cos,
                cy + sin * cx - cos * cy,
            ];
            *img = affine(img, (c, h, w), matrix);
        }
        AugmentOp::ShearX => {
            let s = random_sign(rng, float_parameter(v, max_v));
            *img = affine(img, (c, h, w), [1.0, s, 0.0, 0.0, 1.0, 0.0]);
        }
        AugmentOp::ShearY => {
            let s = random_sign(rng, float_parameter(v, max_v));
            *img = affine(img, (c, h, w), [1.0, 0.0, 0.0, s, 1.0, 0.0]);
        }
        AugmentOp::TranslateX => {
            let t = random_sign(rng, float_parameter(v, max_v));
            let px = (t * w as f64).trunc();
            *img = affine(img, (c, h, w), [1.0, 0.0, px, 0.0, 1.0, 0.0]);
        }
        AugmentOp::TranslateY => {
            let t = random_sign(rng, float_parameter(v, max_v));
            let py = (t * h as f64).trunc();
            *img = affine(img, (c, h, w), [1.0, 0.0, 0.0, 0.0, 1.0, py]);
        }
    }
}

fn to_level(x: f64) -> u8 {
    (x * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Stretch each channel so its darkest pixel maps to 0 and brightest to 1.
fn auto_contrast(img: &mut [f64], plane: usize) {
    for channel in img.chunks_mut(plane) {
        let lo = channel.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = channel.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if hi > lo {
            for x in channel {
                *x = (*x - lo) / (hi - lo);
            }
        }
    }
}

/// Per-channel histogram equalization over 256 levels.
fn equalize(img: &mut [f64], plane: usize) {
    for channel in img.chunks_mut(plane) {
        let mut hist = [0usize; 256];
        for &x in channel.iter() {
            hist[to_level(x) as usize] += 1;
        }
        let last_nonzero = hist.iter().rev().find(|&&n| n > 0).copied().unwrap_or(0);
        let step = (channel.len() - last_nonzero) / 255;
        if step == 0 {
            continue;
        }
        let mut lut = [0u8; 256];
        let mut n = step / 2;
        for (level, &count) in hist.iter().enumerate() {
            lut[level] = (n / step).min(255) as u8;
            n += count;
        }
        for x in channel {
            *x = lut[to_level(*x) as usize] as f64 / 255.0;
        }
    }
}

/// Blend the image with a 3×3 smoothed copy: `f = 0` smooth, `f = 1` original.
fn sharpness(img: &mut [f64], (c, h, w): (usize, usize, usize), f: f64) {
    if h < 3 || w < 3 {
        return;
    }
    let original = img.to_vec();
    for ch in 0..c {
        let base = ch * h * w;
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let mut acc = 0.0;
                for dy in 0..3 {
                    for dx in 0..3 {
                        let weight = if dy == 1 && dx == 1 { 5.0 } else { 1.0 };
                        acc += weight * original[base + (y + dy - 1) * w + (x + dx - 1)];
                    }
                }
                let smooth = acc / 13.0;
                let idx = base + y * w + x;
                img[idx] = (smooth + f * (original[idx] - smooth)).clamp(0.0, 1.0);
            }
        }
    }
}

/// Resample with an output → input affine map `[a, b, c, d, e, f]`:
/// `x_in = a·x + b·y + c`, `y_in = d·x + e·y + f` (pixel centres).
fn affine(img: &[f64], (c, h, w): (usize, usize, usize), m: [f64; 6]) -> Vec<f64> {
    let mut out = vec![0.0; img.len()];
    for y in 0..h {
        let yc = y as f64 + 0.5;
        for x in 0..w {
            let xc = x as f64 + 0.5;
            let sx = (m[0] * xc + m[1] * yc + m[2]).floor();
            let sy = (m[3] * xc + m[4] * yc + m[5]).floor();
            if sx < 0.0 || sy < 0.0 || sx >= w as f64 || sy >= h as f64 {
                continue;
            }
            let (sx, sy) = (sx as usize, sy as usize);
            for ch in 0..c {
                out[ch * h * w + y * w + x] = img[ch * h * w + sy * w + sx];
            }
        }
    }
    out
}

/// Fill a `size × size` square at a random centre with mid gray.
fn cutout_abs<R: Rng>(sample: &mut Sample, size: usize, rng: &mut R) {
    let Some((c, h, w)) = sample.chw() else {
        return;
    };
    if size == 0 || h == 0 || w == 0 {
        return;
    }
    let cx = rng.gen_range(0.0..w as f64);
    let cy = rng.gen_range(0.0..h as f64);
    let half = size as f64 / 2.0;
    // Only the far edge is clipped: near the top-left border the square
    // still spans `size` pixels.
    let x0 = (cx - half).max(0.0) as usize;
    let y0 = (cy - half).max(0.0) as usize;
    let x1 = (x0 + size).min(w);
    let y1 = (y0 + size).min(h);
    for ch in 0..c {
        for y in y0..y1 {
            let row = ch * h * w + y * w;
            sample.features[row + x0..row + x1].fill(CUTOUT_FILL);
        }
    }
}
