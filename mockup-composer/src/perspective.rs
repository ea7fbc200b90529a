//! Angled "canvas on a wall" renders for promotional room scenes.
//!
//! The flat canvas is keystoned through a [`PerspectiveTransform`] port so
//! the near edge keeps its full height and the far edge shrinks. When the
//! port is missing or fails, the canvas is only narrowed by `cos(angle)`
//! and the render carries on.

mod homography;
mod transform;

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use image::{DynamicImage, Rgb, Rgba, RgbaImage, imageops};
use serde::{Deserialize, Serialize};

pub use homography::{Homography, Point, Quad, warp_perspective};
pub use transform::{
    MagickTransform, NativeTransform, PerspectiveMode, PerspectiveTransform, TransformError,
};

use crate::{
    BlendMode, OutputFormat, OutputQuality,
    blend::blend_at,
    encode::{EncodeError, encode_image},
};

const CANVAS_PADDING: u32 = 40;
const MAX_CANVAS_SIDE: u32 = 4000;
const MAX_ANGLE_DEGREES: f64 = 75.0;
const BACKGROUND_SIZE: (u32, u32) = (1600, 1200);
const VERTICAL_OFFSET: i64 = -40;
const SHADOW_BLUR: f32 = 18.0;
const SHADOW_OFFSET: (i64, i64) = (24, 28);
const SHADOW_ALPHA: u32 = 110;
const SCENE_JPEG_QUALITY: OutputQuality = OutputQuality::DEFAULT;

#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    #[error("Invalid scene: {0}")]
    InvalidScene(String),
    #[error("Design is not a decodable image: {0}")]
    UndecodableDesign(#[source] image::ImageError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("Scene render panicked: {0}")]
    Panicked(String),
}

fn default_wall_color() -> String {
    "#ece8e1".to_string()
}

fn default_depth_effect() -> f64 {
    0.3
}

/// One angled canvas-in-a-room render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_wall_color")]
    pub wall_color: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Rotation about the vertical axis in degrees; positive turns the right
    /// edge away from the viewer.
    #[serde(default)]
    pub angle: f64,
    #[serde(default = "default_depth_effect")]
    pub depth_effect: f64,
}

impl Scene {
    pub fn new(canvas_width: u32, canvas_height: u32, angle: f64) -> Self {
        Self {
            name: None,
            wall_color: default_wall_color(),
            canvas_width,
            canvas_height,
            angle,
            depth_effect: default_depth_effect(),
        }
    }

    fn validate(&self) -> Result<Rgb<u8>, SceneError> {
        let invalid = |msg: String| Err(SceneError::InvalidScene(msg));
        let min_side = 2 * CANVAS_PADDING + 1;
        for (side, value) in [("canvasWidth", self.canvas_width), ("canvasHeight", self.canvas_height)] {
            if !(min_side..=MAX_CANVAS_SIDE).contains(&value) {
                return invalid(format!(
                    "{side} must be between {min_side} and {MAX_CANVAS_SIDE}, got {value}"
                ));
            }
        }
        if !self.angle.is_finite() || self.angle.abs() > MAX_ANGLE_DEGREES {
            return invalid(format!(
                "angle must be within ±{MAX_ANGLE_DEGREES} degrees, got {}",
                self.angle
            ));
        }
        if !self.depth_effect.is_finite() || !(0.0..=1.0).contains(&self.depth_effect) {
            return invalid(format!(
                "depthEffect must be between 0 and 1, got {}",
                self.depth_effect
            ));
        }
        parse_hex_color(&self.wall_color)
            .ok_or_else(|| SceneError::InvalidScene(format!("bad wall color '{}'", self.wall_color)))
    }
}

/// `#rrggbb` or `rrggbb`.
pub fn parse_hex_color(s: &str) -> Option<Rgb<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneMockup {
    pub index: usize,
    pub name: Option<String>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub success: bool,
    pub mockups: Vec<SceneMockup>,
    pub failed: Vec<usize>,
}

/// The keystoned canvas plus where its far edge ended up.
struct Keystoned {
    image: RgbaImage,
    /// Vertical inset of the far edge's top and bottom corners.
    far_inset: f64,
}

#[derive(Clone)]
pub struct SceneRenderer {
    transform: Option<Arc<dyn PerspectiveTransform>>,
    perspective: bool,
}

impl SceneRenderer {
    pub fn new(transform: Option<Arc<dyn PerspectiveTransform>>) -> Self {
        Self {
            transform,
            perspective: true,
        }
    }

    pub fn from_mode(mode: PerspectiveMode) -> Self {
        let renderer = Self::new(mode.transform());
        tracing::info!(
            mode = %mode,
            transform = renderer.transform.as_ref().map(|t| t.name()).unwrap_or("none"),
            "Scene renderer ready"
        );
        renderer
    }

    /// Render every scene as if it faced the viewer head-on.
    pub fn flat() -> Self {
        Self {
            transform: None,
            perspective: false,
        }
    }

    #[tracing::instrument(skip(self, design), fields(design_bytes = design.len()))]
    pub fn render_scene(&self, scene: &Scene, design: &[u8]) -> Result<Vec<u8>, SceneError> {
        let design = image::load_from_memory(design).map_err(SceneError::UndecodableDesign)?;
        self.render_decoded(scene, &design)
    }

    /// Render each scene independently. A scene that fails or panics is
    /// logged and left out; only an undecodable design fails the whole batch.
    #[tracing::instrument(skip(self, scenes, design), fields(scenes = scenes.len()))]
    pub fn render_batch(&self, scenes: &[Scene], design: &[u8]) -> Result<BatchOutcome, SceneError> {
        let design = image::load_from_memory(design).map_err(SceneError::UndecodableDesign)?;

        let mut mockups = Vec::with_capacity(scenes.len());
        let mut failed = Vec::new();
        for (index, scene) in scenes.iter().enumerate() {
            let rendered = catch_unwind(AssertUnwindSafe(|| self.render_decoded(scene, &design)))
                .unwrap_or_else(|payload| Err(SceneError::Panicked(panic_message(&*payload))));
            match rendered {
                Ok(bytes) => mockups.push(SceneMockup {
                    index,
                    name: scene.name.clone(),
                    bytes,
                }),
                Err(err) => {
                    tracing::warn!(index, error = %err, "Scene render failed, omitting it");
                    failed.push(index);
                }
            }
        }

        tracing::info!(rendered = mockups.len(), failed = failed.len(), "Scene batch done");
        Ok(BatchOutcome {
            success: true,
            mockups,
            failed,
        })
    }

    fn render_decoded(&self, scene: &Scene, design: &DynamicImage) -> Result<Vec<u8>, SceneError> {
        let image = self.render_image(scene, design)?;
        Ok(encode_image(&image, OutputFormat::Jpeg, SCENE_JPEG_QUALITY)?)
    }

    /// Full scene raster before encoding.
    pub fn render_image(&self, scene: &Scene, design: &DynamicImage) -> Result<RgbaImage, SceneError> {
        let wall = scene.validate()?;
        let canvas = flat_canvas(scene, design);

        let angled = self.perspective && scene.angle != 0.0;
        let framed = if angled {
            let keystoned = self.keystone(&canvas, scene.angle, scene.depth_effect);
            with_depth_edge(&keystoned, scene.angle, scene.canvas_width)
        } else {
            canvas
        };

        let direction = if angled { scene.angle.signum() as i64 } else { 0 };
        Ok(stage(&framed, wall, direction))
    }

    fn keystone(&self, canvas: &RgbaImage, angle: f64, depth_effect: f64) -> Keystoned {
        let (w, h) = canvas.dimensions();
        let radians = angle.abs().to_radians();
        let far_width = ((f64::from(w) * radians.cos()).round() as u32).max(1);
        let inset = f64::from(h) * depth_effect * radians.sin() * 0.5;

        let (fw, fh) = (f64::from(far_width), f64::from(h));
        let from = [
            Point::new(0.0, 0.0),
            Point::new(f64::from(w), 0.0),
            Point::new(f64::from(w), fh),
            Point::new(0.0, fh),
        ];
        let to = if angle > 0.0 {
            [
                Point::new(0.0, 0.0),
                Point::new(fw, inset),
                Point::new(fw, fh - inset),
                Point::new(0.0, fh),
            ]
        } else {
            [
                Point::new(0.0, inset),
                Point::new(fw, 0.0),
                Point::new(fw, fh),
                Point::new(0.0, fh - inset),
            ]
        };

        let attempt = match &self.transform {
            Some(transform) => transform
                .distort(canvas, &from, &to, far_width, h)
                .and_then(|image| {
                    if image.dimensions() == (far_width, h) {
                        Ok(image)
                    } else {
                        Err(TransformError::Unavailable(format!(
                            "{} returned {:?}, expected {:?}",
                            transform.name(),
                            image.dimensions(),
                            (far_width, h)
                        )))
                    }
                }),
            None => Err(TransformError::Unavailable("no transform configured".to_string())),
        };

        match attempt {
            Ok(image) => Keystoned {
                image,
                far_inset: inset,
            },
            Err(err) => {
                tracing::warn!(error = %err, angle, "Perspective transform failed, scaling width instead");
                Keystoned {
                    image: imageops::resize(canvas, far_width, h, imageops::FilterType::Triangle),
                    far_inset: 0.0,
                }
            }
        }
    }
}

/// White canvas with the design fitted inside the padding, centered.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn flat_canvas(scene: &Scene, design: &DynamicImage) -> RgbaImage {
    let (cw, ch) = (scene.canvas_width, scene.canvas_height);
    let (aw, ah) = (cw - 2 * CANVAS_PADDING, ch - 2 * CANVAS_PADDING);
    let (dw, dh) = (design.width().max(1), design.height().max(1));

    let scale = (f64::from(aw) / f64::from(dw)).min(f64::from(ah) / f64::from(dh));
    let nw = ((f64::from(dw) * scale).round() as u32).clamp(1, aw);
    let nh = ((f64::from(dh) * scale).round() as u32).clamp(1, ah);
    let fitted = imageops::resize(&design.to_rgba8(), nw, nh, imageops::FilterType::Lanczos3);

    let mut canvas = RgbaImage::from_pixel(cw, ch, Rgba([255, 255, 255, 255]));
    blend_at(
        &mut canvas,
        &fitted,
        i64::from((cw - nw) / 2),
        i64::from((ch - nh) / 2),
        BlendMode::Normal,
        1.0,
    );
    canvas
}

/// Append the canvas thickness as a flat-shaded trapezoid on the far edge.
fn with_depth_edge(keystoned: &Keystoned, angle: f64, canvas_width: u32) -> RgbaImage {
    let image = &keystoned.image;
    let (w, h) = image.dimensions();
    let sin = angle.abs().to_radians().sin();
    let edge = ((f64::from(canvas_width) * 0.04 * sin).round() as u32).max(3);
    let shade = (170.0 - 90.0 * sin).round().clamp(0.0, 255.0) as u8;

    // continue the slope of the keystoned top/bottom edges across the strip
    let slope = keystoned.far_inset / f64::from(w.max(1));
    let mut out = RgbaImage::new(w + edge, h);
    let canvas_x = if angle > 0.0 { 0 } else { i64::from(edge) };
    imageops::replace(&mut out, image, canvas_x, 0);

    for i in 0..edge {
        // distance from the canvas' far edge, in pixels
        let outward = f64::from(i) + 0.5;
        let top = keystoned.far_inset + outward * slope;
        let bottom = f64::from(h) - top;
        let x = if angle > 0.0 { w + i } else { edge - 1 - i };
        for y in 0..h {
            let cy = f64::from(y) + 0.5;
            if cy >= top && cy <= bottom {
                out.put_pixel(x, y, Rgba([shade, shade, shade, 255]));
            }
        }
    }
    out
}

/// Drop shadow and canvas on the wall background.
fn stage(canvas: &RgbaImage, wall: Rgb<u8>, direction: i64) -> RgbaImage {
    let (bw, bh) = BACKGROUND_SIZE;
    let mut background = RgbaImage::from_pixel(bw, bh, Rgba([wall[0], wall[1], wall[2], 255]));
    let (cw, ch) = canvas.dimensions();

    let x = (i64::from(bw) - i64::from(cw)) / 2;
    let y = (i64::from(bh) - i64::from(ch)) / 2 + VERTICAL_OFFSET;

    let margin = (SHADOW_BLUR * 3.0).ceil() as u32;
    let mut silhouette = RgbaImage::new(cw + 2 * margin, ch + 2 * margin);
    for (sx, sy, p) in canvas.enumerate_pixels() {
        let a = (u32::from(p[3]) * SHADOW_ALPHA / 255) as u8;
        silhouette.put_pixel(sx + margin, sy + margin, Rgba([0, 0, 0, a]));
    }
    let shadow = imageops::fast_blur(&silhouette, SHADOW_BLUR);

    let m = i64::from(margin);
    blend_at(
        &mut background,
        &shadow,
        x - m + direction * SHADOW_OFFSET.0,
        y - m + SHADOW_OFFSET.1,
        BlendMode::Normal,
        1.0,
    );
    blend_at(&mut background, canvas, x, y, BlendMode::Normal, 1.0);
    background
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{gradient, png_bytes};

    struct FailingTransform;

    impl PerspectiveTransform for FailingTransform {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn distort(
            &self,
            _image: &RgbaImage,
            _from: &Quad,
            _to: &Quad,
            _width: u32,
            _height: u32,
        ) -> Result<RgbaImage, TransformError> {
            Err(TransformError::Unavailable("fake tool crashed".to_string()))
        }
    }

    /// Keystones normally but panics on its third call.
    #[derive(Default)]
    struct PanicOnThirdCall {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl PerspectiveTransform for PanicOnThirdCall {
        fn name(&self) -> &'static str {
            "panic-on-third"
        }

        fn distort(
            &self,
            image: &RgbaImage,
            from: &Quad,
            to: &Quad,
            width: u32,
            height: u32,
        ) -> Result<RgbaImage, TransformError> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 2 {
                panic!("distortion blew up");
            }
            NativeTransform.distort(image, from, to, width, height)
        }
    }

    fn native() -> SceneRenderer {
        SceneRenderer::new(Some(Arc::new(NativeTransform)))
    }

    fn design() -> DynamicImage {
        DynamicImage::ImageRgba8(gradient(300, 150))
    }

    #[test]
    fn angle_zero_matches_flat_render() {
        let scene = Scene::new(400, 300, 0.0);
        let angled = native().render_image(&scene, &design()).unwrap();
        let flat = SceneRenderer::flat().render_image(&scene, &design()).unwrap();
        assert_eq!(angled, flat);

        let bytes = png_bytes(&gradient(300, 150));
        assert_eq!(
            native().render_scene(&scene, &bytes).unwrap(),
            SceneRenderer::flat().render_scene(&scene, &bytes).unwrap()
        );
    }

    #[test]
    fn output_is_background_sized_jpeg() {
        let bytes = native()
            .render_scene(&Scene::new(400, 300, 25.0), &png_bytes(&gradient(64, 64)))
            .unwrap();
        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), BACKGROUND_SIZE);
    }

    #[test]
    fn failing_transform_degrades_to_width_scale() {
        let renderer = SceneRenderer::new(Some(Arc::new(FailingTransform)));
        let keystoned = renderer.keystone(&RgbaImage::new(400, 300), 60.0, 0.5);
        assert_eq!(keystoned.image.dimensions(), (200, 300));
        assert_eq!(keystoned.far_inset, 0.0);

        let scene = Scene::new(400, 300, 60.0);
        assert!(renderer.render_image(&scene, &design()).is_ok());
    }

    #[test]
    fn positive_angle_shrinks_the_right_edge() {
        let canvas = RgbaImage::from_pixel(400, 300, Rgba([255, 255, 255, 255]));
        let keystoned = native().keystone(&canvas, 30.0, 1.0);
        let (w, h) = keystoned.image.dimensions();
        assert_eq!((w, h), (346, 300));
        // near (left) edge keeps full height, far corners are cut away
        assert_eq!(keystoned.image.get_pixel(2, 2)[3], 255);
        assert_eq!(keystoned.image.get_pixel(2, h - 3)[3], 255);
        assert_eq!(keystoned.image.get_pixel(w - 1, 0)[3], 0);
        assert_eq!(keystoned.image.get_pixel(w - 1, h - 1)[3], 0);
        assert!((keystoned.far_inset - 75.0).abs() < 1e-9);
    }

    #[test]
    fn negative_angle_shrinks_the_left_edge_and_puts_depth_edge_left() {
        let canvas = RgbaImage::from_pixel(400, 300, Rgba([255, 255, 255, 255]));
        let keystoned = native().keystone(&canvas, -30.0, 1.0);
        let (w, h) = keystoned.image.dimensions();
        assert_eq!(keystoned.image.get_pixel(0, 0)[3], 0);
        assert_eq!(keystoned.image.get_pixel(w - 3, 2)[3], 255);

        let framed = with_depth_edge(&keystoned, -30.0, 400);
        let edge = framed.width() - w;
        assert!(edge >= 3);
        let strip = framed.get_pixel(0, h / 2);
        assert_eq!(strip[3], 255);
        assert!(strip[0] < 255);
    }

    #[test]
    fn steeper_angles_get_darker_depth_edges() {
        let shade_at = |angle: f64| {
            let keystoned = Keystoned {
                image: RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255])),
                far_inset: 0.0,
            };
            let framed = with_depth_edge(&keystoned, angle, 400);
            framed.get_pixel(framed.width() - 1, 50)[0]
        };
        assert!(shade_at(60.0) < shade_at(15.0));
    }

    #[test]
    fn invalid_scenes_are_rejected() {
        let too_small = Scene::new(10, 300, 0.0);
        assert!(matches!(
            native().render_image(&too_small, &design()),
            Err(SceneError::InvalidScene(_))
        ));

        let mut bad_color = Scene::new(400, 300, 0.0);
        bad_color.wall_color = "tomato".to_string();
        assert!(bad_color.validate().is_err());

        let steep = Scene::new(400, 300, 89.0);
        assert!(steep.validate().is_err());
    }

    #[test]
    fn batch_omits_failed_scene() {
        let mut scenes: Vec<Scene> = [0.0, 20.0, -20.0, 35.0]
            .into_iter()
            .map(|angle| Scene::new(300, 240, angle))
            .collect();
        scenes[2].canvas_width = 0;

        let outcome = native()
            .render_batch(&scenes, &png_bytes(&gradient(64, 64)))
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.mockups.len(), 3);
        assert_eq!(outcome.failed, vec![2]);
        let indices: Vec<usize> = outcome.mockups.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 1, 3]);
    }

    #[test]
    fn batch_omits_scene_whose_transform_panics() {
        let renderer = SceneRenderer::new(Some(Arc::new(PanicOnThirdCall::default())));
        let scenes: Vec<Scene> = [10.0, 20.0, -20.0, 35.0]
            .into_iter()
            .map(|angle| Scene::new(300, 240, angle))
            .collect();

        let outcome = renderer
            .render_batch(&scenes, &png_bytes(&gradient(64, 64)))
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.mockups.len(), 3);
        assert_eq!(outcome.failed, vec![2]);
        let indices: Vec<usize> = outcome.mockups.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 1, 3]);
    }

    #[test]
    fn batch_survives_transform_failures() {
        let renderer = SceneRenderer::new(Some(Arc::new(FailingTransform)));
        let scenes: Vec<Scene> = (0..4).map(|i| Scene::new(300, 240, 10.0 * i as f64)).collect();
        let outcome = renderer
            .render_batch(&scenes, &png_bytes(&gradient(32, 32)))
            .unwrap();
        assert_eq!(outcome.mockups.len(), 4);
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn undecodable_design_fails_the_batch() {
        let err = native()
            .render_batch(&[Scene::new(300, 240, 0.0)], b"nope")
            .unwrap_err();
        assert!(matches!(err, SceneError::UndecodableDesign(_)));
    }

    #[test]
    fn scene_deserializes_with_defaults() {
        let scene: Scene =
            serde_json::from_str(r#"{"canvasWidth": 600, "canvasHeight": 400, "angle": -15}"#)
                .unwrap();
        assert_eq!(scene.wall_color, "#ece8e1");
        assert_eq!(scene.depth_effect, 0.3);
        assert_eq!(scene.angle, -15.0);
        assert_eq!(parse_hex_color(&scene.wall_color), Some(Rgb([0xec, 0xe8, 0xe1])));
    }
}
