use image::{GrayImage, Rgba, RgbaImage};

use crate::DisplacementConfig;

// Rec. 709 luma weights
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Apply brightness, contrast and saturation to the color channels.
///
/// Brightness first, then contrast around mid-grey, then saturation around
/// the pixel's luma. Alpha is left alone. Neutral factors skip the pass.
pub fn adjust_colors(image: &mut RgbaImage, config: &DisplacementConfig) {
    if config.is_identity_adjustment() {
        return;
    }

    for pixel in image.pixels_mut() {
        let mut rgb = [0f32; 3];
        for (c, v) in rgb.iter_mut().enumerate() {
            let mut value = f32::from(pixel[c]) / 255.0 * config.brightness;
            value = (value - 0.5) * config.contrast + 0.5;
            *v = value;
        }
        let luma: f32 = rgb.iter().zip(LUMA).map(|(v, w)| v * w).sum();
        for (c, v) in rgb.iter().enumerate() {
            let value = luma + (v - luma) * config.saturation;
            pixel[c] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Scale color channels by `factor`, keeping alpha.
pub fn modulate_brightness(image: &mut RgbaImage, factor: f32) {
    if factor == 1.0 {
        return;
    }
    for pixel in image.pixels_mut() {
        for c in 0..3 {
            pixel[c] = (f32::from(pixel[c]) * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Multiply a coverage mask into the alpha channel.
pub fn apply_mask(image: &mut RgbaImage, mask: &GrayImage) {
    for (pixel, coverage) in image.pixels_mut().zip(mask.pixels()) {
        let a = u32::from(pixel[3]) * u32::from(coverage[0]);
        pixel[3] = ((a + 127) / 255) as u8;
    }
}

/// Neutral-grey grain layer for the texture overlay.
///
/// Values come from an integer hash of the pixel position, so the same size
/// always yields the same layer.
pub fn grain_layer(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let noise = (hash2(x, y) % 97) as i32 - 48;
        let v = (128 + noise) as u8;
        Rgba([v, v, v, 255])
    })
}

fn hash2(x: u32, y: u32) -> u32 {
    let mut h = x.wrapping_mul(0x27d4_eb2d) ^ y.wrapping_mul(0x1656_67b1);
    h ^= h >> 15;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{gradient, solid};

    #[test]
    fn neutral_config_is_bit_exact() {
        let original = gradient(16, 16);
        let mut adjusted = original.clone();
        adjust_colors(&mut adjusted, &DisplacementConfig::neutral());
        assert_eq!(adjusted, original);
    }

    #[test]
    fn brightness_darkens_and_keeps_alpha() {
        let mut image = solid(1, 1, [200, 100, 50, 77]);
        let config = DisplacementConfig {
            brightness: 0.5,
            ..DisplacementConfig::neutral()
        };
        adjust_colors(&mut image, &config);
        assert_eq!(*image.get_pixel(0, 0), Rgba([100, 50, 25, 77]));
    }

    #[test]
    fn zero_saturation_is_greyscale() {
        let mut image = solid(1, 1, [200, 40, 90, 255]);
        let config = DisplacementConfig {
            saturation: 0.0,
            ..DisplacementConfig::neutral()
        };
        adjust_colors(&mut image, &config);
        let p = image.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn contrast_pivots_on_mid_grey() {
        let mut image = RgbaImage::from_raw(2, 1, vec![64, 64, 64, 255, 192, 192, 192, 255]).unwrap();
        let config = DisplacementConfig {
            contrast: 1.5,
            ..DisplacementConfig::neutral()
        };
        adjust_colors(&mut image, &config);
        assert!(image.get_pixel(0, 0)[0] < 64);
        assert!(image.get_pixel(1, 0)[0] > 192);
    }

    #[test]
    fn mask_scales_alpha() {
        let mut image = solid(3, 1, [10, 10, 10, 255]);
        let mask = GrayImage::from_raw(3, 1, vec![0, 128, 255]).unwrap();
        apply_mask(&mut image, &mask);
        let alphas: Vec<u8> = image.pixels().map(|p| p[3]).collect();
        assert_eq!(alphas, vec![0, 128, 255]);
    }

    #[test]
    fn grain_is_deterministic_and_centered() {
        let a = grain_layer(32, 32);
        assert_eq!(a, grain_layer(32, 32));
        let mean: f64 = a.pixels().map(|p| f64::from(p[0])).sum::<f64>() / 1024.0;
        assert!((110.0..146.0).contains(&mean), "mean {mean}");
    }
}
