/*!
 * Local snapshot store
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use vigil_camera::{CameraError, ObjectStore};

/// [`ObjectStore`] writing into a directory on local disk
///
/// Locators are `file://` URLs. Keys are flat file names; anything that would
/// escape the directory is rejected.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, CameraError> {
        let mut components = Path::new(key).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Ok(self.root.join(name)),
            _ => Err(CameraError::Storage(format!("invalid object key: {:?}", key))),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(
        &self,
        key: &str,
        mime_type: &str,
        bytes: Bytes,
    ) -> Result<String, CameraError> {
        let path = self.object_path(key)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CameraError::Storage(format!("{}: {}", self.root.display(), e)))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| CameraError::Storage(format!("{}: {}", path.display(), e)))?;

        let absolute = std::path::absolute(&path).unwrap_or(path);
        debug!(key, mime_type, size = bytes.len(), "Snapshot stored");
        Ok(format!("file://{}", absolute.display()))
    }
}
