use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use image::{DynamicImage, RgbaImage, imageops};

use crate::{
    BlendMode, DisplacementConfig, MockupError, OutputFormat, OutputQuality,
    adjust::{adjust_colors, apply_mask, grain_layer},
    blend::{blend_at, blend_layer},
    encode::{EncodeError, encode_image},
    library::{LibraryCache, Template, TemplateError},
};

#[derive(thiserror::Error, Debug)]
pub enum ComposeError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Design is not a decodable image: {0}")]
    UndecodableDesign(#[source] image::ImageError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

#[derive(Debug, Clone)]
pub struct MockupRequest {
    pub template_id: String,
    pub design: Vec<u8>,
    pub config: DisplacementConfig,
    pub format: OutputFormat,
    pub quality: OutputQuality,
}

impl MockupRequest {
    pub fn new(template_id: impl Into<String>, design: Vec<u8>) -> Self {
        Self {
            template_id: template_id.into(),
            design,
            config: DisplacementConfig::default(),
            format: OutputFormat::default(),
            quality: OutputQuality::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockupResult {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub elapsed: Duration,
}

/// The mask-based rendering path: template lookup, then [`compose_mockup`],
/// then encoding.
#[derive(Clone)]
pub struct MockupCompositor {
    library: Arc<LibraryCache>,
}

impl MockupCompositor {
    pub fn new(library: Arc<LibraryCache>) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &Arc<LibraryCache> {
        &self.library
    }

    #[tracing::instrument(
        skip(self, request),
        fields(template_id = %request.template_id, format = ?request.format, design_bytes = request.design.len())
    )]
    pub fn generate(&self, request: &MockupRequest) -> Result<MockupResult, ComposeError> {
        let started = Instant::now();

        request
            .config
            .validate()
            .map_err(|err| match err {
                MockupError::Validation(msg) => ComposeError::InvalidParameters(msg),
                other => ComposeError::InvalidParameters(other.to_string()),
            })?;

        let template = self.library.get_template(&request.template_id)?;
        let design =
            image::load_from_memory(&request.design).map_err(ComposeError::UndecodableDesign)?;

        let composed = compose_mockup(&template, &design, &request.config);
        let (width, height) = composed.dimensions();
        let bytes = encode_image(&composed, request.format, request.quality)?;

        let elapsed = started.elapsed();
        tracing::info!(
            width,
            height,
            bytes = bytes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Mockup generated"
        );

        Ok(MockupResult {
            bytes,
            format: request.format,
            width,
            height,
            elapsed,
        })
    }
}

/// Resize the design into the print area and fit it to the product.
///
/// Pure over its inputs: the same template, design and config always give
/// the same pixels.
pub fn compose_mockup(
    template: &Template,
    design: &DynamicImage,
    config: &DisplacementConfig,
) -> RgbaImage {
    let area = template.print_area();
    let (width, height) = template.dimensions();

    // fill the print area, ignoring aspect ratio
    let mut placed = imageops::resize(
        &design.to_rgba8(),
        area.width,
        area.height,
        imageops::FilterType::Lanczos3,
    );
    tracing::debug!(
        from = ?(design.width(), design.height()),
        to = ?(area.width, area.height),
        "Design resized"
    );

    adjust_colors(&mut placed, config);

    let mut layer = RgbaImage::new(width, height);
    imageops::replace(&mut layer, &placed, i64::from(area.x), i64::from(area.y));

    if let Some(mask) = &template.mask {
        apply_mask(&mut layer, mask);
        tracing::debug!("Mask applied");
    }

    let mut out = template.base.clone();
    blend_layer(&mut out, &layer, config.blend_mode, 1.0);

    if let Some(shadow) = &template.shadow {
        blend_layer(&mut out, shadow, BlendMode::Multiply, 1.0);
        tracing::debug!("Shadow layer applied");
    }

    if let Some(highlight) = &template.highlight {
        blend_layer(&mut out, highlight, BlendMode::Screen, 1.0);
        tracing::debug!("Highlight layer applied");
    }

    if config.texture_overlay && config.texture_opacity > 0.0 {
        let grain = grain_layer(width, height);
        blend_at(&mut out, &grain, 0, 0, BlendMode::Overlay, config.texture_opacity);
        tracing::debug!(opacity = config.texture_opacity, "Texture overlay applied");
    }

    out
}
