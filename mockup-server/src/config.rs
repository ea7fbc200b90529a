use std::{env, path::PathBuf};

use anyhow::Context;
use mockup_composer::PerspectiveMode;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub struct AppConfig {
    pub servlet: ServletConfig,
    pub templates: TemplateConfig,
    pub legacy: LegacyConfig,
    pub perspective: PerspectiveConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Ok(Self {
            servlet: ServletConfig::from_env()?,
            templates: TemplateConfig::from_env()?,
            legacy: LegacyConfig::from_env()?,
            perspective: PerspectiveConfig::from_env()?,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

pub struct ServletConfig {
    pub address: String,
    /// Upper bound for one request body, multipart or JSON.
    pub max_upload_bytes: usize,
}

impl ServletConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let max_upload_bytes = match env::var("MOCKUP_MAX_UPLOAD_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("MOCKUP_MAX_UPLOAD_BYTES is not a byte count: {raw}"))?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };
        Ok(Self {
            address: var_or("MOCKUP_ADDRESS", "127.0.0.1:8080"),
            max_upload_bytes,
        })
    }
}

pub struct TemplateConfig {
    /// Directory or `.zip` pack holding `templates.json`.
    pub source: PathBuf,
}

impl TemplateConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Ok(Self {
            source: var_or("MOCKUP_TEMPLATE_SOURCE", "./resources/templates").into(),
        })
    }
}

pub struct LegacyConfig {
    pub assets: PathBuf,
}

impl LegacyConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Ok(Self {
            assets: var_or("MOCKUP_LEGACY_ASSETS", "./resources/legacy").into(),
        })
    }
}

pub struct PerspectiveConfig {
    pub mode: PerspectiveMode,
}

impl PerspectiveConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let raw = var_or("MOCKUP_PERSPECTIVE", "auto");
        Ok(Self {
            mode: raw
                .parse()
                .with_context(|| format!("MOCKUP_PERSPECTIVE has an unknown value: {raw}"))?,
        })
    }
}
