use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

/// Path-addressed blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn get(&self, object_path: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(object_path)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read object '{object_path}'")),
        }
    }

    pub async fn put(&self, object_path: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(object_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create directory '{}'", parent.display())
            })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write object '{object_path}'"))?;
        debug!(object_path, size = bytes.len(), "objects: stored");
        Ok(())
    }

    fn resolve(&self, object_path: &str) -> Result<PathBuf> {
        let relative = normalize_object_path(object_path)
            .ok_or_else(|| anyhow!("invalid object path '{object_path}'"))?;
        Ok(self.root.join(relative))
    }
}

/// Accepts only relative, `/`-separated paths without `..` segments.
pub fn normalize_object_path(object_path: &str) -> Option<PathBuf> {
    let trimmed = object_path.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.contains('\\') {
        return None;
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    (!normalized.as_os_str().is_empty()).then_some(normalized)
}
