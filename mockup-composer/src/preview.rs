use image::{Rgba, RgbaImage};

use crate::{
    BlendMode, OutputFormat, OutputQuality,
    blend::{blend_at, blend_pixel},
    encode::{EncodeError, encode_image},
    library::Template,
};

const AREA_TINT: Rgba<u8> = Rgba([255, 0, 170, 70]);
const AREA_OUTLINE: Rgba<u8> = Rgba([255, 0, 170, 255]);
const MASKED_OUT_SHADE: Rgba<u8> = Rgba([0, 0, 0, 110]);

/// Authoring aid: the base photo with the print area tinted and outlined
/// and everything the mask hides darkened.
pub fn preview_image(template: &Template) -> RgbaImage {
    let mut out = template.base.clone();
    let area = template.print_area();

    if let Some(mask) = &template.mask {
        for (pixel, coverage) in out.pixels_mut().zip(mask.pixels()) {
            let hidden = 255 - coverage[0];
            if hidden > 0 {
                let opacity = f32::from(hidden) / 255.0;
                *pixel = blend_pixel(BlendMode::Normal, *pixel, MASKED_OUT_SHADE, opacity);
            }
        }
    }

    let tint = RgbaImage::from_pixel(area.width, area.height, AREA_TINT);
    blend_at(
        &mut out,
        &tint,
        i64::from(area.x),
        i64::from(area.y),
        BlendMode::Normal,
        1.0,
    );

    let thickness = (area.width.min(area.height) / 100).clamp(1, 4);
    let (right, bottom) = (area.x + area.width, area.y + area.height);
    for y in area.y..bottom {
        for x in area.x..right {
            let on_edge = x < area.x + thickness
                || y < area.y + thickness
                || x + thickness >= right
                || y + thickness >= bottom;
            if on_edge {
                out.put_pixel(x, y, AREA_OUTLINE);
            }
        }
    }
    out
}

#[tracing::instrument(skip(template), fields(template_id = %template.id()))]
pub fn render_preview(template: &Template) -> Result<Vec<u8>, EncodeError> {
    encode_image(&preview_image(template), OutputFormat::Png, OutputQuality::DEFAULT)
}

#[cfg(test)]
mod tests {
    use image::GrayImage;

    use super::*;
    use crate::{PrintArea, TemplateMetadata, testutil::solid};

    fn template(mask: Option<GrayImage>) -> Template {
        Template {
            metadata: TemplateMetadata {
                id: "preview".to_string(),
                print_area: PrintArea::new(10, 10, 20, 20),
                ..TemplateMetadata::default()
            },
            base: solid(50, 50, [200, 200, 200, 255]),
            mask,
            shadow: None,
            highlight: None,
            has_displacement: false,
        }
    }

    #[test]
    fn outlines_and_tints_the_print_area() {
        let out = preview_image(&template(None));
        assert_eq!(*out.get_pixel(0, 0), Rgba([200, 200, 200, 255]));
        assert_eq!(*out.get_pixel(10, 10), AREA_OUTLINE);
        assert_eq!(*out.get_pixel(29, 29), AREA_OUTLINE);

        let inside = out.get_pixel(20, 20);
        assert_ne!(*inside, Rgba([200, 200, 200, 255]));
        assert!(inside[0] > inside[1]);
    }

    #[test]
    fn masked_out_regions_are_darkened() {
        let mut mask = GrayImage::from_pixel(50, 50, image::Luma([255]));
        mask.put_pixel(45, 45, image::Luma([0]));
        let out = preview_image(&template(Some(mask)));
        assert_eq!(*out.get_pixel(40, 40), Rgba([200, 200, 200, 255]));
        assert!(out.get_pixel(45, 45)[0] < 200);
    }

    #[test]
    fn preview_is_png() {
        let bytes = render_preview(&template(None)).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Png);
    }
}
