use std::io::Cursor;

use image::{
    ImageEncoder, Rgb, RgbImage, RgbaImage,
    codecs::{jpeg::JpegEncoder, png::PngEncoder, webp::WebPEncoder},
};

use crate::{OutputFormat, OutputQuality};

#[derive(thiserror::Error, Debug)]
#[error("Failed to encode {format:?}: {source}")]
pub struct EncodeError {
    pub format: OutputFormat,
    #[source]
    pub source: image::ImageError,
}

/// Encode an RGBA raster.
///
/// JPEG has no alpha, so the image is flattened over white first. The WebP
/// encoder shipped with `image` is lossless only and ignores `quality`.
pub fn encode_image(
    image: &RgbaImage,
    format: OutputFormat,
    quality: OutputQuality,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Cursor::new(Vec::new());
    let (width, height) = image.dimensions();

    let result = match format {
        OutputFormat::Png => PngEncoder::new(&mut buf).write_image(
            image.as_raw(),
            width,
            height,
            image::ExtendedColorType::Rgba8,
        ),
        OutputFormat::Jpeg => {
            let flat = flatten_over(image, Rgb([255, 255, 255]));
            JpegEncoder::new_with_quality(&mut buf, quality.get()).write_image(
                flat.as_raw(),
                width,
                height,
                image::ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Webp => WebPEncoder::new_lossless(&mut buf).write_image(
            image.as_raw(),
            width,
            height,
            image::ExtendedColorType::Rgba8,
        ),
    };

    result.map_err(|source| EncodeError { format, source })?;
    Ok(buf.into_inner())
}

/// Flatten onto an opaque background color.
pub fn flatten_over(image: &RgbaImage, background: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let a = u32::from(p[3]);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = u32::from(p[c]) * a + u32::from(background[c]) * (255 - a);
            out[c] = ((v + 127) / 255) as u8;
        }
        Rgb(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{gradient, solid};

    #[test]
    fn every_format_decodes_back_to_the_same_size() {
        let image = gradient(40, 30);
        for format in [OutputFormat::Png, OutputFormat::Jpeg, OutputFormat::Webp] {
            let bytes = encode_image(&image, format, OutputQuality::DEFAULT).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (40, 30), "{format:?}");
        }
    }

    #[test]
    fn png_keeps_pixels_exactly() {
        let image = gradient(8, 8);
        let bytes = encode_image(&image, OutputFormat::Png, OutputQuality::DEFAULT).unwrap();
        assert_eq!(image::load_from_memory(&bytes).unwrap().to_rgba8(), image);
    }

    #[test]
    fn transparent_pixels_flatten_to_background() {
        let image = solid(1, 1, [0, 0, 0, 0]);
        let flat = flatten_over(&image, Rgb([255, 255, 255]));
        assert_eq!(*flat.get_pixel(0, 0), Rgb([255, 255, 255]));
    }
}
