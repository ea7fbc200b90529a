use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::MockupError;

/// Pixel-combination function used when layering one image over another.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    Normal,
    #[default]
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
}

impl BlendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendMode {
    type Err = MockupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "over" => Ok(BlendMode::Normal),
            "multiply" => Ok(BlendMode::Multiply),
            "screen" => Ok(BlendMode::Screen),
            "overlay" => Ok(BlendMode::Overlay),
            "darken" => Ok(BlendMode::Darken),
            "lighten" => Ok(BlendMode::Lighten),
            other => Err(MockupError::validation(format!(
                "unsupported blend mode '{other}'"
            ))),
        }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = MockupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::Webp),
            other => Err(MockupError::validation(format!(
                "unsupported output format '{other}'"
            ))),
        }
    }
}

/// Encoder quality in `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct OutputQuality(u8);

impl OutputQuality {
    pub const DEFAULT: OutputQuality = OutputQuality(90);

    pub fn new(value: u8) -> Result<Self, MockupError> {
        if (1..=100).contains(&value) {
            Ok(Self(value))
        } else {
            Err(MockupError::validation(format!(
                "quality must be between 1 and 100, got {value}"
            )))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for OutputQuality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for OutputQuality {
    type Error = MockupError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OutputQuality> for u8 {
    fn from(value: OutputQuality) -> Self {
        value.0
    }
}

/// Per-request color-science parameters for the adjustment and blend stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplacementConfig {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub blend_mode: BlendMode,
    pub texture_overlay: bool,
    pub texture_opacity: f32,
}

impl Default for DisplacementConfig {
    fn default() -> Self {
        Self {
            brightness: 0.92,
            contrast: 1.0,
            saturation: 1.0,
            blend_mode: BlendMode::Multiply,
            texture_overlay: false,
            texture_opacity: 0.15,
        }
    }
}

impl DisplacementConfig {
    /// Settings under which the adjustment stage leaves pixels untouched.
    pub fn neutral() -> Self {
        Self {
            brightness: 1.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MockupError> {
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MockupError::validation(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if !self.texture_opacity.is_finite() || !(0.0..=1.0).contains(&self.texture_opacity) {
            return Err(MockupError::validation(format!(
                "textureOpacity must be between 0 and 1, got {}",
                self.texture_opacity
            )));
        }
        Ok(())
    }

    pub fn is_identity_adjustment(&self) -> bool {
        self.brightness == 1.0 && self.contrast == 1.0 && self.saturation == 1.0
    }
}
