use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

pub fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
            255,
        ])
    })
}

pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

pub fn manifest_entry(id: &str, base_path: &str, area: [u32; 4]) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": id,
        "productType": "t-shirt",
        "color": "black",
        "angle": "front",
        "basePath": base_path,
        "printArea": { "x": area[0], "y": area[1], "width": area[2], "height": area[3] },
    })
}
