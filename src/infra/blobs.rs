//! Blob store adapters: a filesystem container and an in-process map.

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
    sync::RwLock,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt, sync::OnceCell};
use uuid::Uuid;

use crate::{
    application::repos::{BlobRepo, BlobStoreError},
    cache::{rw_read, rw_write},
    domain::blob::BlobPath,
};

/// Objects live under `<root>/<container>/<path>`. The container directory is
/// created on the first write.
#[derive(Debug)]
pub struct FsBlobStore {
    container: PathBuf,
    created: OnceCell<()>,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, container: &str) -> Self {
        Self {
            container: root.into().join(container),
            created: OnceCell::new(),
        }
    }

    pub fn container(&self) -> &Path {
        &self.container
    }

    fn resolve(&self, path: &BlobPath) -> Result<PathBuf, BlobStoreError> {
        let relative = Path::new(path.as_str());
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(BlobStoreError::Io {
                path: path.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path escapes the blob container",
                ),
            });
        }
        Ok(self.container.join(relative))
    }

    async fn ensure_container(&self) -> Result<(), BlobStoreError> {
        self.created
            .get_or_try_init(|| async {
                fs::create_dir_all(&self.container)
                    .await
                    .map_err(|source| BlobStoreError::Io {
                        path: self.container.display().to_string(),
                        source,
                    })
            })
            .await
            .map(|_| ())
    }
}

/// Hidden sibling of `target`, unique per write.
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.partial", Uuid::new_v4().simple()))
}

async fn write_file(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(target).await?;
    file.write_all(bytes).await?;
    file.flush().await
}

fn io_error(path: &BlobPath) -> impl FnOnce(std::io::Error) -> BlobStoreError + '_ {
    move |source| BlobStoreError::Io {
        path: path.to_string(),
        source,
    }
}

#[async_trait]
impl BlobRepo for FsBlobStore {
    async fn get(&self, path: &BlobPath) -> Result<Option<Bytes>, BlobStoreError> {
        let absolute = self.resolve(path)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(path)(err)),
        }
    }

    async fn put(
        &self,
        path: &BlobPath,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), BlobStoreError> {
        self.ensure_container().await?;
        let absolute = self.resolve(path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(io_error(path))?;
        }

        // Staged next to the target, then renamed into place.
        let staging = staging_path(&absolute);
        let written = match write_file(&staging, &bytes).await {
            Ok(()) => fs::rename(&staging, &absolute).await,
            Err(err) => Err(err),
        };
        if written.is_err() {
            let _ = fs::remove_file(&staging).await;
        }
        written.map_err(io_error(path))
    }

    async fn stat(&self, path: &BlobPath) -> Result<Option<u64>, BlobStoreError> {
        let absolute = self.resolve(path)?;
        match fs::metadata(&absolute).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(path)(err)),
        }
    }
}

const SOURCE: &str = "infra::blobs";

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

/// In-process blob store for tests and single-node development.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        rw_read(&self.objects, SOURCE, "object").get(path).cloned()
    }

    pub fn remove(&self, path: &str) -> bool {
        rw_write(&self.objects, SOURCE, "remove")
            .remove(path)
            .is_some()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.objects, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobRepo for MemoryBlobStore {
    async fn get(&self, path: &BlobPath) -> Result<Option<Bytes>, BlobStoreError> {
        Ok(self.object(path.as_str()).map(|object| object.bytes))
    }

    async fn put(
        &self,
        path: &BlobPath,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BlobStoreError> {
        rw_write(&self.objects, SOURCE, "put").insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn stat(&self, path: &BlobPath) -> Result<Option<u64>, BlobStoreError> {
        Ok(self
            .object(path.as_str())
            .map(|object| object.bytes.len() as u64))
    }
}
