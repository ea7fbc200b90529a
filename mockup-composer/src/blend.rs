//! Straight-alpha layer blending.
//!
//! Colors are composited with the W3C Compositing Level 1 separable-blend
//! formula on non-premultiplied RGBA:
//!
//! ```text
//! Cs' = (1 - ab) * Cs + ab * B(Cb, Cs)
//! ao  = as + ab * (1 - as)
//! Co  = (as * Cs' + (1 - as) * ab * Cb) / ao
//! ```
//!
//! so a partially covered source pixel (an anti-aliased mask edge) lands
//! on a linear mix of the backdrop and the blended color.

use image::{Rgba, RgbaImage};

use crate::BlendMode;

fn blend_channel(mode: BlendMode, cb: f32, cs: f32) -> f32 {
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => cb * cs,
        BlendMode::Screen => cb + cs - cb * cs,
        BlendMode::Overlay => {
            if cb <= 0.5 {
                2.0 * cb * cs
            } else {
                1.0 - 2.0 * (1.0 - cb) * (1.0 - cs)
            }
        }
        BlendMode::Darken => cb.min(cs),
        BlendMode::Lighten => cb.max(cs),
    }
}

fn to_unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Composite one source pixel over a backdrop pixel.
pub fn blend_pixel(mode: BlendMode, dst: Rgba<u8>, src: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let a_s = to_unit(src[3]) * opacity;
    let a_b = to_unit(dst[3]);
    let a_o = a_s + a_b * (1.0 - a_s);
    if a_o <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let cb = to_unit(dst[i]);
        let cs = to_unit(src[i]);
        let mixed = (1.0 - a_b) * cs + a_b * blend_channel(mode, cb, cs);
        out[i] = to_u8((a_s * mixed + (1.0 - a_s) * a_b * cb) / a_o);
    }
    out[3] = to_u8(a_o);
    Rgba(out)
}

/// Composite `src` onto `dst` with its top-left corner at `(x, y)`.
/// Pixels falling outside `dst` are clipped.
pub fn blend_at(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, mode: BlendMode, opacity: f32) {
    let (dw, dh) = (i64::from(dst.width()), i64::from(dst.height()));
    let (sw, sh) = (i64::from(src.width()), i64::from(src.height()));

    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + sw).min(dw);
    let y1 = (y + sh).min(dh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    for dy in y0..y1 {
        for dx in x0..x1 {
            let s = *src.get_pixel((dx - x) as u32, (dy - y) as u32);
            if s[3] == 0 {
                continue;
            }
            let d = dst.get_pixel_mut(dx as u32, dy as u32);
            *d = blend_pixel(mode, *d, s, opacity);
        }
    }
}

/// Composite a full-size layer onto `dst`.
pub fn blend_layer(dst: &mut RgbaImage, src: &RgbaImage, mode: BlendMode, opacity: f32) {
    blend_at(dst, src, 0, 0, mode, opacity);
}
