use std::{io::ErrorKind, path::PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;

pub const ACTORS_CONTAINER: &str = "actors";
pub const MOVIES_CONTAINER: &str = "movies";

/// Where uploaded images are kept. Files are addressed by the public URL `save` returns.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn save(&self, content: &[u8], extension: &str, container: &str, content_type: &str)
    -> AppResult<String>;

    async fn delete(&self, url: &str, container: &str) -> AppResult<()>;
}

/// Stores files under `<root>/<container>/` and serves them from `<public_base_url>/<container>/`.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let public_base_url: String = public_base_url.into();
        Self { root: root.into(), public_base_url: public_base_url.trim_end_matches('/').to_string() }
    }

    fn file_name_from_url(url: &str) -> Option<&str> {
        url.rsplit('/').next().filter(|name| !name.is_empty() && *name != "." && *name != "..")
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(
        &self,
        content: &[u8],
        extension: &str,
        container: &str,
        content_type: &str,
    ) -> AppResult<String> {
        let dir = self.root.join(container);
        tokio::fs::create_dir_all(&dir).await.with_context(|| format!("create {}", dir.display()))?;

        let extension = extension.trim_start_matches('.');
        let file_name = if extension.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            format!("{}.{extension}", Uuid::new_v4())
        };
        let path = dir.join(&file_name);
        tokio::fs::write(&path, content).await.with_context(|| format!("write {}", path.display()))?;

        tracing::debug!(path = %path.display(), bytes = content.len(), content_type, "stored upload");
        Ok(format!("{}/{container}/{file_name}", self.public_base_url))
    }

    async fn delete(&self, url: &str, container: &str) -> AppResult<()> {
        let Some(file_name) = Self::file_name_from_url(url) else {
            return Ok(());
        };
        let path = self.root.join(container).join(file_name);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("remove {}", path.display())).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn storage(temp: &TempDir) -> LocalFileStorage {
        LocalFileStorage::new(temp.path(), "http://localhost:3000/uploads/")
    }

    fn local_path(temp: &TempDir, url: &str) -> PathBuf {
        let name = url.rsplit('/').next().unwrap();
        temp.path().join(MOVIES_CONTAINER).join(name)
    }

    #[tokio::test]
    async fn save_writes_file_and_returns_public_url() {
        let temp = TempDir::new().unwrap();
        let url = storage(&temp).save(b"png-bytes", ".png", MOVIES_CONTAINER, "image/png").await.unwrap();

        assert!(url.starts_with("http://localhost:3000/uploads/movies/"));
        assert!(url.ends_with(".png"));
        assert_eq!(std::fs::read(local_path(&temp, &url)).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn delete_removes_only_the_named_file() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let first = storage.save(b"one", "jpg", MOVIES_CONTAINER, "image/jpeg").await.unwrap();
        let second = storage.save(b"two", "jpg", MOVIES_CONTAINER, "image/jpeg").await.unwrap();

        storage.delete(&first, MOVIES_CONTAINER).await.unwrap();

        assert_ne!(first, second);
        assert!(!local_path(&temp, &first).exists());
        assert_eq!(std::fs::read(local_path(&temp, &second)).unwrap(), b"two");
    }

    #[tokio::test]
    async fn deleting_missing_file_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        storage(&temp)
            .delete("http://localhost:3000/uploads/movies/gone.png", MOVIES_CONTAINER)
            .await
            .unwrap();
        storage(&temp).delete("", MOVIES_CONTAINER).await.unwrap();
    }
}
