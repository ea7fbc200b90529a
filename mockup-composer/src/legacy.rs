use base64::Engine;
use image::{Rgba, RgbaImage, imageops};

use crate::{
    BlendMode, OutputFormat, OutputQuality,
    adjust::modulate_brightness,
    blend::{blend_at, blend_layer},
    encode::{EncodeError, encode_image},
    source::{AssetSource, SourceError},
};

#[derive(thiserror::Error, Debug)]
pub enum LegacyError {
    #[error("Malformed artwork data URL: {0}")]
    MalformedDataUrl(String),
    #[error("Artwork payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Artwork is not a decodable image: {0}")]
    UndecodableArtwork(#[source] image::ImageError),
    #[error("Cannot read mockup photo: {0}")]
    MockupAsset(#[from] SourceError),
    #[error("Cannot decode mockup photo: {0}")]
    MockupImage(#[source] image::ImageError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Placement as fractions of the mockup photo's width and height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionalRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyEntry {
    pub product_type: &'static str,
    pub mockup_path: &'static str,
    pub position: FractionalRect,
    pub brightness: f32,
    pub blend_mode: BlendMode,
}

const fn entry(
    product_type: &'static str,
    mockup_path: &'static str,
    [x, y, width, height]: [f32; 4],
    brightness: f32,
    blend_mode: BlendMode,
) -> LegacyEntry {
    LegacyEntry {
        product_type,
        mockup_path,
        position: FractionalRect {
            x,
            y,
            width,
            height,
        },
        brightness,
        blend_mode,
    }
}

pub const DEFAULT_PRODUCT_TYPE: &str = "t-shirt";

pub const LEGACY_TABLE: &[LegacyEntry] = &[
    entry("t-shirt", "mockups/tshirt.png", [0.30, 0.25, 0.40, 0.35], 0.95, BlendMode::Multiply),
    entry("hoodie", "mockups/hoodie.png", [0.32, 0.30, 0.36, 0.30], 0.92, BlendMode::Multiply),
    entry("poster", "mockups/poster.png", [0.15, 0.10, 0.70, 0.80], 1.0, BlendMode::Normal),
    entry("canvas", "mockups/canvas.png", [0.10, 0.10, 0.80, 0.80], 1.0, BlendMode::Normal),
    entry("mug", "mockups/mug.png", [0.25, 0.30, 0.40, 0.35], 0.97, BlendMode::Multiply),
    entry("tote-bag", "mockups/tote-bag.png", [0.25, 0.35, 0.50, 0.45], 0.94, BlendMode::Multiply),
];

impl LegacyEntry {
    /// Table entry for a product type; unknown types get the t-shirt entry.
    pub fn lookup(product_type: &str) -> &'static LegacyEntry {
        LEGACY_TABLE
            .iter()
            .find(|e| e.product_type == product_type)
            .unwrap_or_else(|| {
                tracing::debug!(product_type, "Unknown product type, using default entry");
                Self::default_entry()
            })
    }

    fn default_entry() -> &'static LegacyEntry {
        &LEGACY_TABLE[0]
    }
}

/// Decode a `data:image/...;base64,` URL into raw bytes.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, LegacyError> {
    let malformed = |why: &str| LegacyError::MalformedDataUrl(why.to_string());

    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| malformed("missing data: scheme"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| malformed("missing ',' separator"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| malformed("payload is not base64 encoded"))?;
    if !mime.starts_with("image/") {
        return Err(malformed("media type is not an image"));
    }

    Ok(base64::engine::general_purpose::STANDARD.decode(payload.trim())?)
}

/// Fixed-table compositor kept for old clients: one placement per product
/// type, no mask or highlight layers.
pub struct LegacyCompositor {
    assets: Box<dyn AssetSource>,
}

impl LegacyCompositor {
    pub fn new(assets: impl AssetSource + 'static) -> Self {
        Self::from_boxed(Box::new(assets))
    }

    pub fn from_boxed(assets: Box<dyn AssetSource>) -> Self {
        Self { assets }
    }

    #[tracing::instrument(skip(self, artwork_data_url), fields(data_url_len = artwork_data_url.len()))]
    pub fn generate_legacy(
        &self,
        artwork_data_url: &str,
        product_type: &str,
    ) -> Result<Vec<u8>, LegacyError> {
        let artwork_bytes = decode_data_url(artwork_data_url)?;
        let artwork =
            image::load_from_memory(&artwork_bytes).map_err(LegacyError::UndecodableArtwork)?;

        let entry = LegacyEntry::lookup(product_type);
        let mockup = image::load_from_memory(&self.assets.read(entry.mockup_path)?)
            .map_err(LegacyError::MockupImage)?;

        let composed = compose_legacy(&mockup.to_rgba8(), &artwork.to_rgba8(), entry);
        tracing::info!(product_type = entry.product_type, "Legacy mockup generated");

        Ok(encode_image(&composed, OutputFormat::Png, OutputQuality::DEFAULT)?)
    }
}

/// Place the artwork by the entry's fractional rectangle.
pub fn compose_legacy(mockup: &RgbaImage, artwork: &RgbaImage, entry: &LegacyEntry) -> RgbaImage {
    let (mw, mh) = (mockup.width() as f32, mockup.height() as f32);
    let pos = entry.position;
    let x = (pos.x * mw).round() as i64;
    let y = (pos.y * mh).round() as i64;
    let width = ((pos.width * mw).round() as u32).max(1);
    let height = ((pos.height * mh).round() as u32).max(1);

    let mut placed = imageops::resize(artwork, width, height, imageops::FilterType::Lanczos3);
    modulate_brightness(&mut placed, entry.brightness);
    let shadow = inset_shadow(&placed);
    blend_layer(&mut placed, &shadow, BlendMode::Normal, 1.0);

    let mut out = mockup.clone();
    blend_at(&mut out, &placed, x, y, entry.blend_mode, 1.0);
    out
}

/// Soft dark frame just inside the artwork edges, clipped to the artwork's
/// own alpha.
fn inset_shadow(artwork: &RgbaImage) -> RgbaImage {
    let (width, height) = artwork.dimensions();
    let border = (width.min(height) / 40).clamp(2, 12);
    let frame = RgbaImage::from_fn(width, height, |x, y| {
        let edge = x < border || y < border || x + border >= width || y + border >= height;
        if edge { Rgba([0, 0, 0, 90]) } else { Rgba([0, 0, 0, 0]) }
    });
    let mut shadow = imageops::blur(&frame, border as f32 / 2.0);
    for (shade, art) in shadow.pixels_mut().zip(artwork.pixels()) {
        shade[3] = ((u16::from(shade[3]) * u16::from(art[3]) + 127) / 255) as u8;
    }
    shadow
}
