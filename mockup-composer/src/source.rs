use std::{
    collections::HashMap,
    fs::File,
    io::{self, Read},
    path::{Component, Path, PathBuf},
};

use zip::ZipArchive;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("No asset at {0}")]
    Missing(String),
    #[error("Asset path {0} escapes the source root")]
    InvalidPath(String),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Broken template archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Read-only byte store for template manifests and image assets.
///
/// Paths are relative and `/`-separated regardless of the backing store.
pub trait AssetSource: Send + Sync {
    fn read(&self, path: &str) -> Result<Vec<u8>, SourceError>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}

fn normalize(path: &str) -> Result<String, SourceError> {
    let normalized = path.replace('\\', "/");
    let relative = Path::new(&normalized);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || normalized.is_empty() {
        return Err(SourceError::InvalidPath(path.to_string()));
    }
    Ok(normalized.trim_start_matches("./").to_string())
}

/// Assets laid out in a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirectorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        let relative = normalize(path)?;
        let full = self.root.join(&relative);
        std::fs::read(&full).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => SourceError::Missing(relative),
            _ => SourceError::Io {
                path: full.display().to_string(),
                source: err,
            },
        })
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Assets packed into a zip archive (a "template pack").
///
/// The archive is reopened per read so a pack replaced on disk is picked up
/// by the next library reload.
#[derive(Debug, Clone)]
pub struct ZipSource {
    archive: PathBuf,
}

impl ZipSource {
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
        }
    }
}

impl AssetSource for ZipSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        let relative = normalize(path)?;
        let file = File::open(&self.archive).map_err(|source| SourceError::Io {
            path: self.archive.display().to_string(),
            source,
        })?;
        let mut zip = ZipArchive::new(file)?;

        let mut entry = match zip.by_name(&relative) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Err(SourceError::Missing(relative)),
            Err(err) => return Err(err.into()),
        };

        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).map_err(|source| SourceError::Io {
            path: relative.clone(),
            source,
        })?;
        Ok(buf)
    }

    fn describe(&self) -> String {
        format!("zip archive {}", self.archive.display())
    }
}

/// Assets held in memory, keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        let relative = normalize(path)?;
        self.files
            .get(&relative)
            .cloned()
            .ok_or(SourceError::Missing(relative))
    }

    fn describe(&self) -> String {
        format!("memory ({} files)", self.files.len())
    }
}

/// Pick a source for a path: `.zip` files are template packs, anything else
/// a directory.
pub fn source_for_path(path: &Path) -> Box<dyn AssetSource> {
    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
        Box::new(ZipSource::new(path))
    } else {
        Box::new(DirectorySource::new(path))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "mockup_source_{name}_{}_{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn normalize_rejects_escaping_paths() {
        assert!(normalize("../secret.png").is_err());
        assert!(normalize("/etc/passwd").is_err());
        assert!(normalize("").is_err());
        assert_eq!(normalize("a\\b.png").unwrap(), "a/b.png");
        assert_eq!(normalize("./a/b.png").unwrap(), "a/b.png");
    }

    #[test]
    fn memory_source_reports_missing_files() {
        let source = MemorySource::new().with_file("a.png", vec![1, 2, 3]);
        assert_eq!(source.read("a.png").unwrap(), vec![1, 2, 3]);
        assert!(matches!(source.read("b.png"), Err(SourceError::Missing(p)) if p == "b.png"));
    }

    #[test]
    fn directory_source_reads_relative_files() {
        let root = temp_dir("dir");
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("nested/file.bin"), b"hello").unwrap();

        let source = DirectorySource::new(&root);
        assert_eq!(source.read("nested/file.bin").unwrap(), b"hello");
        assert!(matches!(
            source.read("nested/other.bin"),
            Err(SourceError::Missing(_))
        ));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn zip_source_reads_entries() {
        let root = temp_dir("zip");
        std::fs::create_dir_all(&root).unwrap();
        let archive = root.join("pack.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
            writer
                .start_file("templates.json", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"{}").unwrap();
            writer.finish().unwrap();
        }

        let source = source_for_path(&archive);
        assert_eq!(source.read("templates.json").unwrap(), b"{}");
        assert!(matches!(
            source.read("missing.png"),
            Err(SourceError::Missing(_))
        ));

        std::fs::remove_dir_all(&root).ok();
    }
}
