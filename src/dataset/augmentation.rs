//! Data Augmentation
//!
//! Per-image augmentation applied during training only. Each option is
//! sampled independently per image, with a fixed composition order:
//! geometric transforms first (composed into a single affine warp), then
//! horizontal flip, then photometric adjustments. Rescaling to the model's
//! input range happens later, in the batcher.

use image::{imageops, Rgb, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Augmentation options. All ranges are symmetric around the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Max rotation in degrees (sampled from [-r, r])
    pub rotation_degrees: f32,
    /// Max horizontal shift as a fraction of width
    pub width_shift: f32,
    /// Max vertical shift as a fraction of height
    pub height_shift: f32,
    /// Max shear angle in degrees
    pub shear_degrees: f32,
    /// Zoom ratio: scale sampled from [1 - z, 1 + z]
    pub zoom: f32,
    /// Randomly mirror left-right with probability 0.5
    pub horizontal_flip: bool,
    /// Multiplicative brightness range [min, max]
    pub brightness: [f32; 2],
    /// Max additive per-channel shift (in raw 0-255 units)
    pub channel_shift: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 30.0,
            width_shift: 0.2,
            height_shift: 0.2,
            shear_degrees: 0.2,
            zoom: 0.2,
            horizontal_flip: true,
            brightness: [0.8, 1.2],
            channel_shift: 10.0,
        }
    }
}

impl AugmentationConfig {
    /// Identity configuration: every pass through the augmenter is a no-op.
    pub fn none() -> Self {
        Self {
            rotation_degrees: 0.0,
            width_shift: 0.0,
            height_shift: 0.0,
            shear_degrees: 0.0,
            zoom: 0.0,
            horizontal_flip: false,
            brightness: [1.0, 1.0],
            channel_shift: 0.0,
        }
    }

    fn is_identity(&self) -> bool {
        self.rotation_degrees == 0.0
            && self.width_shift == 0.0
            && self.height_shift == 0.0
            && self.shear_degrees == 0.0
            && self.zoom == 0.0
            && !self.horizontal_flip
            && self.brightness == [1.0, 1.0]
            && self.channel_shift == 0.0
    }
}

/// Applies randomized augmentations to decoded images
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// An augmenter that passes images through unchanged
    pub fn identity() -> Self {
        Self::new(AugmentationConfig::none())
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply one random augmentation pass.
    pub fn apply(&self, img: RgbImage, rng: &mut impl Rng) -> RgbImage {
        let c = &self.config;
        if c.is_identity() {
            return img;
        }

        let mut img = self.warp(&img, rng);

        if c.horizontal_flip && rng.gen_bool(0.5) {
            img = imageops::flip_horizontal(&img);
        }

        let brightness = if c.brightness[0] < c.brightness[1] {
            rng.gen_range(c.brightness[0]..=c.brightness[1])
        } else {
            c.brightness[0]
        };
        let shift: [f32; 3] = if c.channel_shift > 0.0 {
            [
                rng.gen_range(-c.channel_shift..=c.channel_shift),
                rng.gen_range(-c.channel_shift..=c.channel_shift),
                rng.gen_range(-c.channel_shift..=c.channel_shift),
            ]
        } else {
            [0.0; 3]
        };

        if brightness != 1.0 || shift != [0.0; 3] {
            for pixel in img.pixels_mut() {
                for ch in 0..3 {
                    let v = pixel[ch] as f32 * brightness + shift[ch];
                    pixel[ch] = v.clamp(0.0, 255.0) as u8;
                }
            }
        }

        img
    }

    /// Rotation, shear, zoom, and shift composed into one inverse-mapped
    /// affine warp with bilinear sampling. Out-of-range source coordinates
    /// clamp to the nearest edge pixel.
    fn warp(&self, img: &RgbImage, rng: &mut impl Rng) -> RgbImage {
        let c = &self.config;
        let theta = sample_symmetric(rng, c.rotation_degrees).to_radians();
        let phi = sample_symmetric(rng, c.shear_degrees).to_radians();
        let zoom = if c.zoom > 0.0 {
            rng.gen_range(1.0 - c.zoom..=1.0 + c.zoom)
        } else {
            1.0
        };
        let (width, height) = img.dimensions();
        let tx = sample_symmetric(rng, c.width_shift) * width as f32;
        let ty = sample_symmetric(rng, c.height_shift) * height as f32;

        if theta == 0.0 && phi == 0.0 && zoom == 1.0 && tx == 0.0 && ty == 0.0 {
            return img.clone();
        }

        // Forward map: p' = A (p - center) + center + t, with
        // A = R(theta) * Shear(phi) * zoom. det(A) = zoom^2.
        let (sin_t, cos_t) = theta.sin_cos();
        let tan_p = phi.tan();
        let a = zoom * cos_t;
        let b = zoom * (cos_t * tan_p - sin_t);
        let cc = zoom * sin_t;
        let d = zoom * (sin_t * tan_p + cos_t);
        let det = zoom * zoom;
        let (ia, ib, ic, id) = (d / det, -b / det, -cc / det, a / det);

        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;

        let mut out = RgbImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx - tx;
                let dy = y as f32 - cy - ty;
                let sx = ia * dx + ib * dy + cx;
                let sy = ic * dx + id * dy + cy;
                out.put_pixel(x, y, sample_bilinear(img, sx, sy));
            }
        }
        out
    }
}

fn sample_symmetric(rng: &mut impl Rng, max: f32) -> f32 {
    if max > 0.0 {
        rng.gen_range(-max..=max)
    } else {
        0.0
    }
}

fn sample_bilinear(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for ch in 0..3 {
        let top = p00[ch] as f32 * (1.0 - fx) + p10[ch] as f32 * fx;
        let bottom = p01[ch] as f32 * (1.0 - fx) + p11[ch] as f32 * fx;
        out[ch] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_identity_passes_through() {
        let img = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
        let augmenter = Augmenter::identity();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let out = augmenter.apply(img.clone(), &mut rng);
        assert_eq!(out, img);
    }

    #[test]
    fn test_output_dimensions_preserved() {
        let img = RgbImage::from_pixel(32, 32, Rgb([100, 150, 200]));
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let out = augmenter.apply(img, &mut rng);
        assert_eq!(out.dimensions(), (32, 32));
    }

    #[test]
    fn test_brightness_only_scales() {
        let config = AugmentationConfig {
            brightness: [0.5, 0.5],
            ..AugmentationConfig::none()
        };
        let img = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        let augmenter = Augmenter::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let out = augmenter.apply(img, &mut rng);
        assert_eq!(out.get_pixel(0, 0)[0], 50);
    }

    #[test]
    fn test_seeded_runs_reproduce() {
        let img = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 128]));
        let augmenter = Augmenter::new(AugmentationConfig::default());

        let out_a = augmenter.apply(img.clone(), &mut ChaCha8Rng::seed_from_u64(9));
        let out_b = augmenter.apply(img, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(out_a, out_b);
    }
}
