//! Local filesystem object store

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{validate_location, ObjectInfo, ObjectStore};
use crate::error::{Error, Result};

/// Prefix of in-flight temp files, hidden from listings
const TEMP_PREFIX: &str = ".tmp-";

/// Objects stored as plain files under `{root}/{bucket}/{key}`
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                Error::Storage(format!(
                    "Failed to create storage directory {}: {}",
                    root.display(),
                    e
                ))
            })?;
            info!("Created storage directory: {}", root.display());
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_location(bucket, key)?;
        let mut path = self.root.join(bucket);
        path.extend(key.split('/'));
        Ok(path)
    }
}

/// Collect files under `dir`, recording keys relative to the bucket root
fn walk(dir: &Path, rel: &str, out: &mut Vec<(String, fs::Metadata)>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(TEMP_PREFIX) {
            continue;
        }

        let key = if rel.is_empty() {
            name
        } else {
            format!("{}/{}", rel, name)
        };

        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            walk(&entry.path(), &key, out)?;
        } else {
            out.push((key, metadata));
        }
    }
    Ok(())
}

impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &str {
        "local"
    }

    fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        let parent = path
            .parent()
            .ok_or_else(|| Error::Storage(format!("No parent directory for {}", path.display())))?;
        fs::create_dir_all(parent)?;

        // Write beside the target, then rename over it
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| Error::Storage(format!("Failed to store {}: {}", path.display(), e)))?;

        debug!(bucket, key, size = data.len(), "Stored object");
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(format!(
                "Object {}:{} does not exist",
                bucket, key
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(bucket, key, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        walk(&bucket_dir, "", &mut files)?;

        let mut objects: Vec<ObjectInfo> = files
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, metadata)| ObjectInfo {
                bucket: bucket.to_string(),
                key,
                size: metadata.len(),
                modified: metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect();

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.object_path(bucket, key)?.is_file())
    }
}
