use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io::Cursor,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, ImageReader, RgbaImage};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    PrintArea, TemplateMetadata,
    metadata::json_model,
    source::{AssetSource, SourceError},
};

/// Manifest file name at the root of every template source.
pub const MANIFEST_FILE: &str = "templates.json";

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),
    #[error("Failed to read template manifest: {0}")]
    Manifest(#[source] SourceError),
    #[error("Failed to parse template manifest: {0}")]
    ManifestParsing(#[from] serde_json::Error),
    #[error("Template {template}: cannot read {path}: {source}")]
    Asset {
        template: String,
        path: String,
        #[source]
        source: SourceError,
    },
    #[error("Template {template}: cannot decode {path}: {source}")]
    Image {
        template: String,
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Template entry {index} is malformed: {source}")]
    InvalidEntry {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Template {0}: print area is empty")]
    EmptyPrintArea(String),
    #[error("Template {template}: print area {area:?} exceeds base image {width}x{height}")]
    PrintAreaOutOfBounds {
        template: String,
        area: PrintArea,
        width: u32,
        height: u32,
    },
    #[error("Template {template}: {layer} layer is {actual:?}, base image is {expected:?}")]
    LayerDimensions {
        template: String,
        layer: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Duplicate template id {0}")]
    DuplicateId(String),
}

/// A validated template with its raster layers decoded.
#[derive(Debug)]
pub struct Template {
    pub metadata: TemplateMetadata,
    pub base: RgbaImage,
    /// Per-pixel coverage in `0..=255`; 0 hides the design.
    pub mask: Option<GrayImage>,
    pub shadow: Option<RgbaImage>,
    pub highlight: Option<RgbaImage>,
    /// The bump map is checked at load time but not kept; no render stage reads it.
    pub has_displacement: bool,
}

impl Template {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn print_area(&self) -> PrintArea {
        self.metadata.print_area
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.base.dimensions()
    }

    /// Decode and validate one manifest entry.
    pub fn load(source: &dyn AssetSource, metadata: TemplateMetadata) -> Result<Self, TemplateError> {
        let id = metadata.id.clone();
        let base = decode_asset(source, &id, &metadata.base_path)?.to_rgba8();
        let (width, height) = base.dimensions();

        let area = metadata.print_area;
        if area.is_empty() {
            return Err(TemplateError::EmptyPrintArea(id));
        }
        if !area.fits_within(width, height) {
            return Err(TemplateError::PrintAreaOutOfBounds {
                template: id,
                area,
                width,
                height,
            });
        }

        let check = |layer: &'static str, actual: (u32, u32)| {
            if actual == (width, height) {
                Ok(())
            } else {
                Err(TemplateError::LayerDimensions {
                    template: id.clone(),
                    layer,
                    expected: (width, height),
                    actual,
                })
            }
        };

        let mask = match &metadata.mask_path {
            Some(path) => {
                let image = decode_asset(source, &id, path)?;
                check("mask", (image.width(), image.height()))?;
                Some(mask_coverage(&image))
            }
            None => None,
        };

        let shadow = match &metadata.shadow_path {
            Some(path) => {
                let image = decode_asset(source, &id, path)?.to_rgba8();
                check("shadow", image.dimensions())?;
                Some(image)
            }
            None => None,
        };

        let highlight = match &metadata.highlight_path {
            Some(path) => {
                let image = decode_asset(source, &id, path)?.to_rgba8();
                check("highlight", image.dimensions())?;
                Some(image)
            }
            None => None,
        };

        let has_displacement = match &metadata.displacement_path {
            Some(path) => {
                check("displacement", asset_dimensions(source, &id, path)?)?;
                true
            }
            None => false,
        };

        Ok(Self {
            metadata,
            base,
            mask,
            shadow,
            highlight,
            has_displacement,
        })
    }
}

fn read_asset(source: &dyn AssetSource, id: &str, path: &str) -> Result<Vec<u8>, TemplateError> {
    source.read(path).map_err(|source| TemplateError::Asset {
        template: id.to_string(),
        path: path.to_string(),
        source,
    })
}

fn decode_asset(
    source: &dyn AssetSource,
    id: &str,
    path: &str,
) -> Result<DynamicImage, TemplateError> {
    let bytes = read_asset(source, id, path)?;
    image::load_from_memory(&bytes).map_err(|source| TemplateError::Image {
        template: id.to_string(),
        path: path.to_string(),
        source,
    })
}

fn asset_dimensions(
    source: &dyn AssetSource,
    id: &str,
    path: &str,
) -> Result<(u32, u32), TemplateError> {
    let bytes = read_asset(source, id, path)?;
    let to_err = |source: image::ImageError| TemplateError::Image {
        template: id.to_string(),
        path: path.to_string(),
        source,
    };
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| to_err(image::ImageError::IoError(err)))?
        .into_dimensions()
        .map_err(to_err)
}

/// Masks carrying real transparency use their alpha as coverage; opaque
/// masks (white = printable) use luma.
pub fn mask_coverage(mask: &DynamicImage) -> GrayImage {
    if mask.color().has_alpha() {
        let rgba = mask.to_rgba8();
        if rgba.pixels().any(|p| p[3] != u8::MAX) {
            return GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                image::Luma([rgba.get_pixel(x, y)[3]])
            });
        }
    }
    mask.to_luma8()
}

/// Immutable snapshot of the template catalog.
#[derive(Debug)]
pub struct TemplateLibrary {
    templates: Vec<Arc<Template>>,
    index: HashMap<String, usize>,
    version: String,
    last_updated: DateTime<Utc>,
}

impl TemplateLibrary {
    /// Read the manifest and every template it lists.
    ///
    /// Templates failing validation are logged and left out; only an
    /// unreadable manifest fails the whole build.
    #[tracing::instrument(skip(source), fields(source = %source.describe()))]
    pub fn build(source: &dyn AssetSource) -> Result<Self, TemplateError> {
        let manifest_bytes = source.read(MANIFEST_FILE).map_err(TemplateError::Manifest)?;
        let manifest: json_model::Root = serde_json::from_slice(&manifest_bytes)?;

        let version = manifest
            .version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| fingerprint(&manifest_bytes));

        let declared = manifest.templates.len();
        let mut seen = HashSet::new();
        let mut templates = Vec::with_capacity(declared);
        for (index, entry) in manifest.templates.into_iter().enumerate() {
            let metadata: TemplateMetadata = match serde_json::from_value(entry) {
                Ok(metadata) => metadata,
                Err(source) => {
                    let err = TemplateError::InvalidEntry { index, source };
                    tracing::warn!(error = %err, "Skipping template");
                    continue;
                }
            };
            if !seen.insert(metadata.id.clone()) {
                let err = TemplateError::DuplicateId(metadata.id);
                tracing::warn!(error = %err, "Skipping template");
                continue;
            }
            match Template::load(source, metadata) {
                Ok(template) => templates.push(Arc::new(template)),
                Err(err) => tracing::warn!(error = %err, "Skipping template"),
            }
        }

        tracing::info!(
            version = %version,
            declared,
            loaded = templates.len(),
            "Template library built"
        );

        Ok(Self::from_templates(templates, version))
    }

    pub fn from_templates(templates: Vec<Arc<Template>>, version: impl Into<String>) -> Self {
        let index = templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id().to_string(), i))
            .collect();
        Self {
            templates,
            index,
            version: version.into(),
            last_updated: Utc::now(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Template>> {
        self.index.get(id).map(|&i| &self.templates[i])
    }

    pub fn templates(&self) -> &[Arc<Template>] {
        &self.templates
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn summary(&self) -> LibrarySummary {
        LibrarySummary {
            templates: self.templates.iter().map(|t| t.metadata.clone()).collect(),
            version: self.version.clone(),
            last_updated: self.last_updated,
        }
    }

    pub fn stats(&self) -> LibraryStats {
        let mut stats = LibraryStats {
            total: self.templates.len(),
            version: self.version.clone(),
            last_updated: self.last_updated,
            ..LibraryStats::default()
        };
        for template in &self.templates {
            let meta = &template.metadata;
            *stats.by_product_type.entry(meta.product_type.clone()).or_default() += 1;
            *stats.by_color.entry(meta.color.clone()).or_default() += 1;
            *stats.by_angle.entry(meta.angle.clone()).or_default() += 1;
            stats.with_mask += usize::from(template.mask.is_some());
            stats.with_shadow += usize::from(template.shadow.is_some());
            stats.with_highlight += usize::from(template.highlight.is_some());
            stats.with_displacement += usize::from(template.has_displacement);
        }
        stats
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySummary {
    pub templates: Vec<TemplateMetadata>,
    pub version: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub total: usize,
    pub by_product_type: BTreeMap<String, usize>,
    pub by_color: BTreeMap<String, usize>,
    pub by_angle: BTreeMap<String, usize>,
    pub with_mask: usize,
    pub with_shadow: usize,
    pub with_highlight: usize,
    pub with_displacement: usize,
    pub version: String,
    pub last_updated: DateTime<Utc>,
}

/// Process-wide holder of the current [`TemplateLibrary`] snapshot.
///
/// Reload and clear replace the `Arc` rather than touching the snapshot, so a
/// caller holding the previous snapshot finishes its render against it.
pub struct LibraryCache {
    source: Box<dyn AssetSource>,
    snapshot: RwLock<Option<Arc<TemplateLibrary>>>,
    // serializes rebuilds so a cold start decodes the catalog once
    build_lock: Mutex<()>,
}

impl LibraryCache {
    pub fn new(source: impl AssetSource + 'static) -> Self {
        Self::from_boxed(Box::new(source))
    }

    pub fn from_boxed(source: Box<dyn AssetSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn load_library(&self, force_reload: bool) -> Result<Arc<TemplateLibrary>, TemplateError> {
        if !force_reload {
            if let Some(library) = self.cached() {
                return Ok(library);
            }
        }

        let _guard = self.build_lock.lock();
        if !force_reload {
            // another caller may have finished the build while we waited
            if let Some(library) = self.cached() {
                return Ok(library);
            }
        }

        let library = Arc::new(TemplateLibrary::build(self.source.as_ref())?);
        *self.snapshot.write() = Some(library.clone());
        Ok(library)
    }

    pub fn get_template(&self, id: &str) -> Result<Arc<Template>, TemplateError> {
        self.load_library(false)?
            .get(id)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    pub fn clear_cache(&self) {
        let dropped = self.snapshot.write().take();
        if let Some(library) = dropped {
            tracing::info!(version = %library.version(), "Template library cache cleared");
        }
    }

    pub fn stats(&self) -> Result<LibraryStats, TemplateError> {
        Ok(self.load_library(false)?.stats())
    }

    /// Current snapshot without triggering a build.
    pub fn cached(&self) -> Option<Arc<TemplateLibrary>> {
        self.snapshot.read().clone()
    }
}
