mod adjust;
mod blend;
mod compose;
mod encode;
mod error;
mod legacy;
mod library;
mod metadata;
mod params;
pub mod perspective;
mod preview;
mod source;

#[cfg(test)]
mod testutil;

pub use compose::{ComposeError, MockupCompositor, MockupRequest, MockupResult, compose_mockup};
pub use encode::{EncodeError, encode_image};
pub use error::MockupError;
pub use legacy::{
    DEFAULT_PRODUCT_TYPE, LEGACY_TABLE, LegacyCompositor, LegacyEntry, LegacyError, decode_data_url,
};
pub use library::{
    LibraryCache, LibraryStats, LibrarySummary, MANIFEST_FILE, Template, TemplateError,
    TemplateLibrary,
};
pub use metadata::{PrintArea, TemplateMetadata};
pub use params::{BlendMode, DisplacementConfig, OutputFormat, OutputQuality};
pub use perspective::{BatchOutcome, PerspectiveMode, Scene, SceneError, SceneMockup, SceneRenderer};
pub use preview::render_preview;
pub use source::{
    AssetSource, DirectorySource, MemorySource, SourceError, ZipSource, source_for_path,
};
