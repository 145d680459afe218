//! Uploaded image storage
//!
//! Images land under the upload directory in a per-purpose subdirectory
//! (`reviews/`, `users/avatars/`) with a random file name, and are served
//! from `/media/`.

use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

use crate::config::UploadConfig;

/// File part read from a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Недопустимый тип файла: {0}")]
    UnsupportedType(String),

    #[error("Файл слишком большой (максимум {0} МБ)")]
    TooLarge(u64),

    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Whether the error is the uploader's fault rather than ours
    pub fn is_user_error(&self) -> bool {
        !matches!(self, UploadError::Io(_))
    }
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    config: UploadConfig,
}

impl MediaStore {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &PathBuf {
        &self.config.path
    }

    /// Check type and size without writing anything
    pub fn check(&self, file: &UploadedFile) -> Result<(), UploadError> {
        if !self.config.is_type_allowed(&file.content_type) {
            return Err(UploadError::UnsupportedType(file.content_type.clone()));
        }
        if file.data.len() as u64 > self.config.max_file_size {
            return Err(UploadError::TooLarge(self.config.max_file_size / 1024 / 1024));
        }
        Ok(())
    }

    /// Store an image under `subdir`, returning its path relative to the
    /// upload directory
    pub async fn save_image(&self, subdir: &str, file: &UploadedFile) -> Result<String, UploadError> {
        self.check(file)?;

        let dir = self.config.path.join(subdir);
        fs::create_dir_all(&dir).await?;

        let name = format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            self.config.get_extension(&file.content_type)
        );
        fs::write(dir.join(&name), &file.data).await?;

        let relative = format!("{}/{}", subdir.trim_matches('/'), name);
        tracing::debug!(path = %relative, size = file.data.len(), "Stored upload");
        Ok(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> MediaStore {
        MediaStore::new(UploadConfig {
            path: dir.path().to_path_buf(),
            max_file_size: 16,
            ..UploadConfig::default()
        })
    }

    fn png(len: usize) -> UploadedFile {
        UploadedFile {
            file_name: "photo.PNG".to_string(),
            content_type: "image/png".to_string(),
            data: vec![7; len],
        }
    }

    #[tokio::test]
    async fn test_save_image() {
        let dir = TempDir::new().unwrap();
        let path = store(&dir).save_image("reviews", &png(10)).await.unwrap();

        assert!(path.starts_with("reviews/"));
        assert!(path.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&path)).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_rejects_type_and_size() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut file = png(10);
        file.content_type = "application/pdf".to_string();
        let err = store.save_image("reviews", &file).await.unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType(_)));
        assert!(err.is_user_error());

        assert!(matches!(
            store.save_image("reviews", &png(17)).await,
            Err(UploadError::TooLarge(_))
        ));
        assert!(!dir.path().join("reviews").exists());
    }
}
