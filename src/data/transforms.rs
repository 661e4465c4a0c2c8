use image::{Rgb, RgbImage};
use rand::Rng;

use crate::training::AugmentationConfig;

/// Parameters of one random draw; kept separate so a draw can be replayed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentParams {
    pub rotation_deg: f32,
    pub zoom_x: f32,
    pub zoom_y: f32,
    pub shear: f32,
    pub brightness: f32,
    pub flip: bool,
}

impl AugmentParams {
    pub fn identity() -> Self {
        Self {
            rotation_deg: 0.0,
            zoom_x: 1.0,
            zoom_y: 1.0,
            shear: 0.0,
            brightness: 1.0,
            flip: false,
        }
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, r: f32) -> f32 {
    if r > 0.0 {
        rng.gen_range(-r..=r)
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct DataAugmentation {
    config: AugmentationConfig,
}

impl DataAugmentation {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> AugmentParams {
        let cfg = &self.config;
        let (b_lo, b_hi) = cfg.brightness_range;

        AugmentParams {
            rotation_deg: symmetric(rng, cfg.rotation_degrees),
            zoom_x: 1.0 + symmetric(rng, cfg.zoom_range),
            zoom_y: 1.0 + symmetric(rng, cfg.zoom_range),
            shear: symmetric(rng, cfg.shear_range),
            brightness: if b_hi > b_lo { rng.gen_range(b_lo..=b_hi) } else { b_lo },
            flip: cfg.horizontal_flip && rng.gen_bool(0.5),
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: &RgbImage, rng: &mut R) -> RgbImage {
        let params = self.sample(rng);
        apply_params(img, &params)
    }
}

/// Apply a geometric + photometric transform.
///
/// Output pixels are mapped back into the source through
/// `rotation * shear * zoom` about the image centre and sampled bilinearly;
/// coordinates outside the image are clamped to the nearest edge pixel.
pub fn apply_params(img: &RgbImage, params: &AugmentParams) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let theta = params.rotation_deg.to_radians();
    let (sin, cos) = theta.sin_cos();
    // rotation * shear * zoom, shear = [[1, -s], [0, 1]]
    let a = cos * params.zoom_x;
    let b = (-cos * params.shear - sin) * params.zoom_y;
    let c = sin * params.zoom_x;
    let d = (-sin * params.shear + cos) * params.zoom_y;

    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let max_x = w as f32 - 1.0;
    let max_y = h as f32 - 1.0;

    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let sx = (a * dx + b * dy + cx).clamp(0.0, max_x);
            let sy = (c * dx + d * dy + cy).clamp(0.0, max_y);

            let src = bilinear(img, sx, sy);
            let px = Rgb(src.map(|v| (v * params.brightness).round().clamp(0.0, 255.0) as u8));

            let ox = if params.flip { w - 1 - x } else { x };
            out.put_pixel(ox, y, px);
        }
    }
    out
}

fn bilinear(img: &RgbImage, x: f32, y: f32) -> [f32; 3] {
    let (w, h) = img.dimensions();
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0.0; 3];
    for (ch, value) in result.iter_mut().enumerate() {
        let top = p00[ch] as f32 * (1.0 - fx) + p10[ch] as f32 * fx;
        let bottom = p01[ch] as f32 * (1.0 - fx) + p11[ch] as f32 * fx;
        *value = top * (1.0 - fy) + bottom * fy;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn gradient() -> RgbImage {
        RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 100]))
    }

    #[test]
    fn test_identity_preserves_image() {
        let img = gradient();
        assert_eq!(apply_params(&img, &AugmentParams::identity()), img);
    }

    #[test]
    fn test_flip_mirrors_columns() {
        let img = gradient();
        let params = AugmentParams {
            flip: true,
            ..AugmentParams::identity()
        };
        let out = apply_params(&img, &params);
        assert_eq!(out.get_pixel(0, 3), img.get_pixel(7, 3));
        assert_eq!(out.get_pixel(7, 0), img.get_pixel(0, 0));
    }

    #[test]
    fn test_brightness_saturates() {
        let img = RgbImage::from_pixel(4, 4, Rgb([200, 100, 0]));
        let params = AugmentParams {
            brightness: 1.2,
            ..AugmentParams::identity()
        };
        let out = apply_params(&img, &params);
        assert_eq!(out.get_pixel(1, 1), &Rgb([240, 120, 0]));

        let params = AugmentParams {
            brightness: 2.0,
            ..AugmentParams::identity()
        };
        assert_eq!(apply_params(&img, &params).get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_zoom_out_replicates_edges() {
        // Zoom factor > 1 samples beyond the border, which is clamped.
        let img = gradient();
        let params = AugmentParams {
            zoom_x: 1.15,
            zoom_y: 1.15,
            ..AugmentParams::identity()
        };
        let out = apply_params(&img, &params);
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(0, 0));
        assert_eq!(out.get_pixel(7, 7), img.get_pixel(7, 7));
    }

    #[test]
    fn test_sampled_params_within_ranges() {
        let aug = DataAugmentation::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..500 {
            let p = aug.sample(&mut rng);
            assert!(p.rotation_deg.abs() <= 15.0);
            assert!((0.85..=1.15).contains(&p.zoom_x));
            assert!((0.85..=1.15).contains(&p.zoom_y));
            assert!(p.shear.abs() <= 0.15);
            assert!((0.6..=1.2).contains(&p.brightness));
        }
    }

    #[test]
    fn test_apply_keeps_dimensions() {
        let aug = DataAugmentation::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = aug.apply(&gradient(), &mut rng);
        assert_eq!(out.dimensions(), (8, 8));
    }
}
