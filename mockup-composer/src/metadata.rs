use serde::{Deserialize, Serialize};

/// Pixel rectangle on the base photo where the design is placed.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PrintArea {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the rectangle lies entirely within an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = u64::from(self.x) + u64::from(self.width);
        let bottom = u64::from(self.y) + u64::from(self.height);
        right <= u64::from(width) && bottom <= u64::from(height)
    }
}

/// Template metadata as declared in the manifest.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    pub id: String,
    pub name: String,
    pub product_type: String,
    pub color: String,
    pub angle: String,
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displacement_path: Option<String>,
    pub print_area: PrintArea,
}

pub(crate) mod json_model {
    use serde::Deserialize;

    /// Entries stay untyped so each one is validated on its own.
    #[derive(Debug, Deserialize)]
    pub struct Root {
        #[serde(default)]
        pub version: Option<String>,
        pub templates: Vec<serde_json::Value>,
    }
}
