use std::{collections::HashMap, path::Path, str::FromStr};

use axum::{body::Bytes, extract::Multipart};
use serde::de::DeserializeOwned;

use crate::{
    error::{AppError, AppResult},
    storage::FileStorage,
};

pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;
pub const IMAGE_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    /// Extension taken from the client file name, or derived from the content type.
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| {
                match self.content_type.as_str() {
                    "image/jpeg" => "jpg",
                    "image/png" => "png",
                    "image/gif" => "gif",
                    _ => "",
                }
                .to_string()
            })
    }

    fn validate_image(&self, field: &str) -> AppResult<()> {
        let mut errors = Vec::new();
        if self.bytes.len() > MAX_IMAGE_BYTES {
            errors.push(format!("file must not exceed {} MB", MAX_IMAGE_BYTES / (1024 * 1024)));
        }
        if !IMAGE_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            errors.push(format!("file type must be one of: {}", IMAGE_CONTENT_TYPES.join(", ")));
        }

        if errors.is_empty() {
            return Ok(());
        }
        Err(AppError::Validation([(field.to_string(), errors)].into_iter().collect()))
    }
}

/// An upload already written to storage while the row that will point at it
/// is still being saved. Exactly one of [`settle`]'s outcomes removes a file:
/// the replaced one after a successful write, or this one after a failed write.
#[must_use]
pub struct StagedFile<'a> {
    storage: &'a dyn FileStorage,
    container: &'static str,
    url: String,
}

impl StagedFile<'_> {
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn remove(storage: &dyn FileStorage, url: &str, container: &str) {
        if let Err(err) = storage.delete(url, container).await {
            tracing::warn!(error = %err, url, container, "could not remove stored file");
        }
    }
}

/// Writes `file` (when present) to `container` under a fresh name.
pub async fn stage<'a>(
    file: Option<UploadedFile>,
    storage: &'a dyn FileStorage,
    container: &'static str,
) -> AppResult<Option<StagedFile<'a>>> {
    let Some(file) = file else {
        return Ok(None);
    };
    let url = storage.save(&file.bytes, &file.extension(), container, &file.content_type).await?;
    Ok(Some(StagedFile { storage, container, url }))
}

/// Finishes a staged upload once the write referencing it is done. `outcome`
/// carries the write's result and the URL the upload replaced, if any.
pub async fn settle<T>(staged: Option<StagedFile<'_>>, outcome: AppResult<(T, Option<String>)>) -> AppResult<T> {
    let Some(staged) = staged else {
        return outcome.map(|(value, _)| value);
    };

    match outcome {
        Ok((value, replaced)) => {
            if let Some(previous) = replaced.filter(|p| *p != staged.url) {
                StagedFile::remove(staged.storage, &previous, staged.container).await;
            }
            Ok(value)
        },
        Err(err) => {
            tracing::debug!(url = %staged.url, "write failed, dropping staged upload");
            StagedFile::remove(staged.storage, &staged.url, staged.container).await;
            Err(err)
        },
    }
}

/// A multipart form read fully into memory.
#[derive(Debug, Default)]
pub struct MultipartForm {
    text: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type =
                        field.content_type().unwrap_or("application/octet-stream").to_string();
                    let bytes = field.bytes().await?;
                    // Browsers send an empty part when no file was picked.
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.insert(name, UploadedFile { file_name, content_type, bytes });
                },
                None => {
                    let value = field.text().await?;
                    form.text.insert(name, value);
                },
            }
        }

        tracing::debug!(text = form.text.len(), files = form.files.len(), "read multipart form");
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }

    pub fn required_text(&self, name: &str) -> AppResult<String> {
        self.text(name)
            .map(str::to_string)
            .ok_or_else(|| AppError::invalid(name, "is required"))
    }

    /// Parses a required text field.
    pub fn parse<T>(&self, name: &str) -> AppResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.text(name).ok_or_else(|| AppError::invalid(name, "is required"))?;
        raw.trim().parse().map_err(|e: T::Err| AppError::invalid(name, e.to_string()))
    }

    /// Parses an optional text field, treating an empty value as absent.
    pub fn parse_opt<T>(&self, name: &str) -> AppResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.text(name).map(str::trim) {
            None | Some("") => Ok(None),
            Some(_) => self.parse(name).map(Some),
        }
    }

    /// Decodes a text field carrying a JSON document.
    pub fn json<T: DeserializeOwned>(&self, name: &str) -> AppResult<Option<T>> {
        match self.text(name).map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| AppError::invalid(name, e.to_string())),
        }
    }

    /// Removes and validates an image part.
    pub fn take_image(&mut self, name: &str) -> AppResult<Option<UploadedFile>> {
        let Some(file) = self.files.remove(name) else {
            return Ok(None);
        };
        file.validate_image(name)?;
        Ok(Some(file))
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::{FromRequest, Request},
    };

    use tempfile::TempDir;

    use super::*;
    use crate::{
        storage::{LocalFileStorage, MOVIES_CONTAINER},
        test_support::MultipartBody,
    };

    fn file(name: &str, content_type: &str, len: usize) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            content_type: content_type.into(),
            bytes: Bytes::from(vec![0u8; len]),
        }
    }

    async fn read(body: MultipartBody) -> MultipartForm {
        let (content_type, bytes) = body.finish();
        let req = Request::builder()
            .method("POST")
            .header("content-type", content_type)
            .body(Body::from(bytes))
            .unwrap();
        let multipart = Multipart::from_request(req, &()).await.unwrap();
        MultipartForm::read(multipart).await.unwrap()
    }

    #[test]
    fn extension_prefers_file_name() {
        assert_eq!(file("poster.PNG", "image/png", 1).extension(), "png");
        assert_eq!(file("blob", "image/jpeg", 1).extension(), "jpg");
        assert_eq!(file("blob", "text/plain", 1).extension(), "");
    }

    #[test]
    fn image_rules() {
        assert!(file("a.png", "image/png", 10).validate_image("photo").is_ok());

        let err = file("a.txt", "text/plain", 10).validate_image("photo").unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.contains_key("photo")));

        let err = file("a.png", "image/png", MAX_IMAGE_BYTES + 1).validate_image("photo").unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e["photo"].len() == 1));
    }

    #[tokio::test]
    async fn reads_text_json_and_files() {
        let mut form = read(
            MultipartBody::new()
                .text("title", "Pelicula 1")
                .text("inTheaters", "true")
                .text("releaseDate", "2024-03-01")
                .text("genreIds", "[1,2]")
                .file("poster", "p.gif", "image/gif", b"GIF89a"),
        )
        .await;

        assert_eq!(form.required_text("title").unwrap(), "Pelicula 1");
        assert!(form.parse::<bool>("inTheaters").unwrap());
        assert_eq!(form.parse_opt::<bool>("missing").unwrap(), None);
        assert_eq!(form.json::<Vec<i32>>("genreIds").unwrap(), Some(vec![1, 2]));

        let poster = form.take_image("poster").unwrap().unwrap();
        assert_eq!(poster.bytes.as_ref(), b"GIF89a");
        assert!(form.take_image("poster").unwrap().is_none());

        let err = form.parse::<i32>("title").unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.contains_key("title")));
    }

    fn stored_path(temp: &TempDir, url: &str) -> std::path::PathBuf {
        temp.path().join(MOVIES_CONTAINER).join(url.rsplit('/').next().unwrap())
    }

    #[tokio::test]
    async fn settled_success_removes_the_replaced_file() {
        let temp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp.path(), "http://localhost/uploads");
        let old = storage.save(b"old", "png", MOVIES_CONTAINER, "image/png").await.unwrap();

        let staged = stage(Some(file("new.png", "image/png", 3)), &storage, MOVIES_CONTAINER).await.unwrap();
        let new = staged.as_ref().unwrap().url().to_string();
        let value = settle(staged, Ok((7, Some(old.clone())))).await.unwrap();

        assert_eq!(value, 7);
        assert!(!stored_path(&temp, &old).exists());
        assert!(stored_path(&temp, &new).exists());
    }

    #[tokio::test]
    async fn settled_failure_keeps_the_old_file_and_drops_the_upload() {
        let temp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp.path(), "http://localhost/uploads");
        let old = storage.save(b"old", "png", MOVIES_CONTAINER, "image/png").await.unwrap();

        let staged = stage(Some(file("new.png", "image/png", 3)), &storage, MOVIES_CONTAINER).await.unwrap();
        let new = staged.as_ref().unwrap().url().to_string();
        let outcome: AppResult<((), Option<String>)> = Err(AppError::NotFound);
        assert!(matches!(settle(staged, outcome).await, Err(AppError::NotFound)));

        assert!(stored_path(&temp, &old).exists());
        assert!(!stored_path(&temp, &new).exists());
    }

    #[tokio::test]
    async fn nothing_to_stage_passes_the_outcome_through() {
        let temp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp.path(), "http://localhost/uploads");
        let staged = stage(None, &storage, MOVIES_CONTAINER).await.unwrap();
        assert!(staged.is_none());
        assert_eq!(settle(staged, Ok(("kept", Some("ignored".to_string())))).await.unwrap(), "kept");
    }
}
