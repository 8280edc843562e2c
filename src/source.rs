//! Photo sources: directory scanning and asset stores

use crate::config::Config;
use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Collect every supported photo below `root`
///
/// Files are yielded in file-name order within each directory. A missing
/// root yields no files rather than an error.
pub fn enumerate(root: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        warn!(?root, "Photo directory does not exist");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(config.follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e.path(), &config.exclude_dirs))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().is_file()
            && let Some(ext) = path.extension().and_then(|e| e.to_str())
            && config.is_supported(ext)
        {
            files.push(path.to_path_buf());
        }
    }

    debug!(count = files.len(), ?root, "Collected photo files");
    Ok(files)
}

/// Check if a path matches one of the excluded directories
fn is_excluded_dir(path: &Path, exclude_dirs: &[PathBuf]) -> bool {
    for exclude in exclude_dirs {
        if exclude.is_absolute() {
            if path.starts_with(exclude) {
                debug!(?path, ?exclude, "Excluding directory (absolute path match)");
                return true;
            }
        } else if let Some(exclude_name) = exclude.file_name() {
            let matched = path
                .components()
                .any(|c| matches!(c, Component::Normal(name) if name == exclude_name));
            if matched {
                debug!(?path, ?exclude, "Excluding directory (folder name match)");
                return true;
            }
        }
    }

    false
}

/// A photo library that hands out image bytes and takes rewritten ones back
pub trait AssetStore: Send {
    /// Identifiers of every asset, in processing order
    fn enumerate(&self) -> Result<Vec<String>>;

    /// Full encoded bytes of one asset
    fn load_bytes(&self, id: &str) -> Result<Vec<u8>>;

    /// Replace an asset's content
    fn persist(&mut self, id: &str, bytes: Vec<u8>) -> Result<()>;

    /// Creation time recorded by the library, in Unix seconds
    fn creation_time(&self, _id: &str) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone)]
struct StoredAsset {
    id: String,
    bytes: Vec<u8>,
    created: Option<f64>,
}

/// Asset store kept entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    assets: Vec<StoredAsset>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset, replacing any with the same id
    pub fn insert(&mut self, id: impl Into<String>, bytes: Vec<u8>, created: Option<f64>) {
        let id = id.into();
        match self.assets.iter_mut().find(|a| a.id == id) {
            Some(asset) => {
                asset.bytes = bytes;
                asset.created = created;
            }
            None => self.assets.push(StoredAsset { id, bytes, created }),
        }
    }

    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.assets
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.bytes.as_slice())
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn missing(id: &str) -> Error {
        Error::Asset {
            id: id.to_string(),
            message: "no such asset".to_string(),
        }
    }
}

impl AssetStore for MemoryStore {
    fn enumerate(&self) -> Result<Vec<String>> {
        Ok(self.assets.iter().map(|a| a.id.clone()).collect())
    }

    fn load_bytes(&self, id: &str) -> Result<Vec<u8>> {
        self.get(id)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Self::missing(id))
    }

    fn persist(&mut self, id: &str, bytes: Vec<u8>) -> Result<()> {
        let asset = self
            .assets
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Self::missing(id))?;
        asset.bytes = bytes;
        Ok(())
    }

    fn creation_time(&self, id: &str) -> Option<f64> {
        self.assets.iter().find(|a| a.id == id)?.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_enumerate_filters_extensions() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        for name in ["a.jpg", "b.JPG", "c.jpeg", "sub/d.heic", "sub/deeper/e.HEIF"] {
            touch(&root.join(name));
        }
        touch(&root.join("notes.txt"));
        touch(&root.join("sub/clip.mp4"));

        let files = enumerate(root, &Config::default()).unwrap();
        assert_eq!(files.len(), 5);
        assert!(files.iter().all(|f| f.extension().is_some()));
    }

    #[test]
    fn test_enumerate_sorted_by_name() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["IMG_0003.jpg", "IMG_0001.jpg", "IMG_0002.jpg"] {
            touch(&dir.path().join(name));
        }

        let names: Vec<String> = enumerate(dir.path(), &Config::default())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["IMG_0001.jpg", "IMG_0002.jpg", "IMG_0003.jpg"]);
    }

    #[test]
    fn test_enumerate_excludes_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        touch(&dir.path().join("keep.jpg"));
        touch(&dir.path().join(".thumbnails/thumb.jpg"));
        touch(&dir.path().join("skip/inner.jpg"));

        let config = Config {
            exclude_dirs: vec![PathBuf::from(".thumbnails"), dir.path().join("skip")],
            ..Config::default()
        };
        let files = enumerate(dir.path(), &config).unwrap();
        assert_eq!(files, vec![dir.path().join("keep.jpg")]);
    }

    #[test]
    fn test_enumerate_missing_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let files = enumerate(&dir.path().join("missing"), &Config::default()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        store.insert("one", vec![1], Some(10.0));
        store.insert("two", vec![2], None);
        store.insert("one", vec![3], Some(11.0));

        assert_eq!(store.len(), 2);
        assert_eq!(store.enumerate().unwrap(), vec!["one", "two"]);
        assert_eq!(store.load_bytes("one").unwrap(), vec![3]);
        assert_eq!(store.creation_time("one"), Some(11.0));
        assert_eq!(store.creation_time("two"), None);

        store.persist("two", vec![9, 9]).unwrap();
        assert_eq!(store.get("two"), Some(&[9u8, 9][..]));

        assert!(matches!(store.load_bytes("three"), Err(Error::Asset { .. })));
        assert!(store.persist("three", vec![]).is_err());
    }
}
