use std::{
    fmt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    str::FromStr,
    sync::Arc,
};

use image::{ImageFormat, RgbaImage};

use super::homography::{Quad, warp_perspective};
use crate::MockupError;

#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    #[error("Projective transform tool unavailable: {0}")]
    Unavailable(String),
    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Temp file IO failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot exchange image with transform tool: {0}")]
    Image(#[from] image::ImageError),
    #[error("Control points are degenerate")]
    Degenerate,
}

/// Port for the projective ("keystone") distortion of a flat canvas.
pub trait PerspectiveTransform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Map the corners `from` of `image` onto `to` in a `width`×`height`
    /// output; uncovered pixels must be transparent.
    fn distort(
        &self,
        image: &RgbaImage,
        from: &Quad,
        to: &Quad,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, TransformError>;
}

/// In-process homography warp with bilinear sampling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeTransform;

impl PerspectiveTransform for NativeTransform {
    fn name(&self) -> &'static str {
        "native"
    }

    fn distort(
        &self,
        image: &RgbaImage,
        from: &Quad,
        to: &Quad,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, TransformError> {
        warp_perspective(image, from, to, width, height).ok_or(TransformError::Degenerate)
    }
}

/// ImageMagick `-distort Perspective` run as a subprocess.
#[derive(Debug, Clone)]
pub struct MagickTransform {
    program: String,
    temp_dir: PathBuf,
}

impl MagickTransform {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// `magick` (ImageMagick 7) or `convert` (ImageMagick 6), whichever is
    /// on PATH.
    pub fn detect() -> Option<Self> {
        ["magick", "convert"]
            .into_iter()
            .find(|program| is_on_path(program))
            .map(Self::new)
    }

    fn temp_path(&self, suffix: &str) -> PathBuf {
        self.temp_dir
            .join(format!("mockup-perspective-{}-{suffix}.png", uuid::Uuid::new_v4()))
    }
}

fn is_on_path(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Removes the file when dropped, whichever way the scope is left.
struct TempFile(PathBuf);

impl TempFile {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.0) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.0.display(), error = %err, "Failed to remove temp file");
            }
        }
    }
}

fn control_points(from: &Quad, to: &Quad) -> String {
    from.iter()
        .zip(to)
        .map(|(s, d)| format!("{:.3},{:.3} {:.3},{:.3}", s.x, s.y, d.x, d.y))
        .collect::<Vec<_>>()
        .join("  ")
}

impl PerspectiveTransform for MagickTransform {
    fn name(&self) -> &'static str {
        "imagemagick"
    }

    fn distort(
        &self,
        image: &RgbaImage,
        from: &Quad,
        to: &Quad,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, TransformError> {
        let input = TempFile(self.temp_path("in"));
        let output = TempFile(self.temp_path("out"));

        image.save_with_format(input.path(), ImageFormat::Png)?;

        let result = Command::new(&self.program)
            .arg(input.path())
            .args(["-alpha", "set", "-virtual-pixel", "transparent", "-define"])
            .arg(format!("distort:viewport={width}x{height}+0+0"))
            .args(["-distort", "Perspective"])
            .arg(control_points(from, to))
            .arg("+repage")
            .arg(output.path())
            .stdout(Stdio::null())
            .output();

        let out = match result {
            Ok(out) => out,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransformError::Unavailable(self.program.clone()));
            }
            Err(err) => return Err(err.into()),
        };
        if !out.status.success() {
            return Err(TransformError::ToolFailed {
                program: self.program.clone(),
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        Ok(image::open(output.path())?.to_rgba8())
    }
}

/// Which projective strategy a [`super::SceneRenderer`] starts with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PerspectiveMode {
    /// ImageMagick when installed, native warp otherwise.
    #[default]
    Auto,
    External,
    Native,
    /// No projective transform; angled scenes use the width-scale fallback.
    Scale,
}

impl PerspectiveMode {
    pub fn transform(&self) -> Option<Arc<dyn PerspectiveTransform>> {
        match self {
            PerspectiveMode::Auto => Some(match MagickTransform::detect() {
                Some(magick) => Arc::new(magick),
                None => Arc::new(NativeTransform),
            }),
            PerspectiveMode::External => Some(Arc::new(
                MagickTransform::detect().unwrap_or_else(|| MagickTransform::new("magick")),
            )),
            PerspectiveMode::Native => Some(Arc::new(NativeTransform)),
            PerspectiveMode::Scale => None,
        }
    }
}

impl fmt::Display for PerspectiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PerspectiveMode::Auto => "auto",
            PerspectiveMode::External => "external",
            PerspectiveMode::Native => "native",
            PerspectiveMode::Scale => "scale",
        })
    }
}

impl FromStr for PerspectiveMode {
    type Err = MockupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(PerspectiveMode::Auto),
            "external" | "magick" | "imagemagick" => Ok(PerspectiveMode::External),
            "native" => Ok(PerspectiveMode::Native),
            "scale" | "off" => Ok(PerspectiveMode::Scale),
            other => Err(MockupError::validation(format!(
                "unknown perspective mode '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::perspective::homography::Point;

    fn rect(w: f64, h: f64) -> Quad {
        [
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ]
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mockup_transform_{name}_{}_{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn control_points_pair_source_and_destination() {
        let s = control_points(&rect(2.0, 1.0), &rect(4.0, 3.0));
        assert!(s.starts_with("0.000,0.000 0.000,0.000  2.000,0.000 4.000,0.000"));
    }

    #[test]
    fn missing_tool_is_unavailable_and_leaves_no_temp_files() {
        let dir = temp_dir("missing_tool");
        let magick = MagickTransform::new("definitely-not-an-imagemagick-binary").with_temp_dir(&dir);
        let image = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));

        let err = magick
            .distort(&image, &rect(4.0, 4.0), &rect(4.0, 4.0), 4, 4)
            .unwrap_err();
        assert!(matches!(err, TransformError::Unavailable(_)));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn successful_distort_cleans_up_temp_files() {
        let Some(magick) = MagickTransform::detect() else {
            return;
        };
        let dir = temp_dir("distort");
        let magick = magick.with_temp_dir(&dir);
        let image = RgbaImage::from_pixel(20, 10, Rgba([200, 40, 40, 255]));
        let to = [
            Point::new(0.0, 0.0),
            Point::new(16.0, 2.0),
            Point::new(16.0, 8.0),
            Point::new(0.0, 10.0),
        ];

        let warped = magick.distort(&image, &rect(20.0, 10.0), &to, 16, 10).unwrap();
        assert_eq!(warped.dimensions(), (16, 10));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn temp_file_guard_removes_on_drop() {
        let dir = temp_dir("guard");
        let path = dir.join("x.png");
        std::fs::write(&path, b"x").unwrap();
        drop(TempFile(path.clone()));
        assert!(!path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn native_transform_rejects_degenerate_points() {
        let image = RgbaImage::new(2, 2);
        let err = NativeTransform
            .distort(&image, &rect(2.0, 2.0), &[Point::new(1.0, 1.0); 4], 2, 2)
            .unwrap_err();
        assert!(matches!(err, TransformError::Degenerate));
    }

    #[test]
    fn perspective_mode_parses() {
        assert_eq!("auto".parse::<PerspectiveMode>().unwrap(), PerspectiveMode::Auto);
        assert_eq!("magick".parse::<PerspectiveMode>().unwrap(), PerspectiveMode::External);
        assert_eq!("off".parse::<PerspectiveMode>().unwrap(), PerspectiveMode::Scale);
        assert!("gpu".parse::<PerspectiveMode>().is_err());
        assert!(PerspectiveMode::Scale.transform().is_none());
        assert_eq!(PerspectiveMode::Native.transform().unwrap().name(), "native");
    }
}
