//! Local media selection behind a device permission.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of asking for media-library access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// A file the user selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedFile {
    pub path: PathBuf,
    /// Display name, usually the last path component.
    pub name: String,
}

impl PickedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
        Self { path, name }
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|extension| extension.to_str())
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}

#[async_trait]
pub trait MediaPicker: Send + Sync {
    async fn request_permission(&self) -> Result<Permission>;

    /// `None` when the user cancelled.
    async fn select(&self) -> Result<Option<PickedFile>>;
}

/// Picks a file given on the command line.
#[derive(Debug, Clone)]
pub struct FilePathPicker {
    path: PathBuf,
}

impl FilePathPicker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MediaPicker for FilePathPicker {
    async fn request_permission(&self) -> Result<Permission> {
        match tokio::fs::File::open(&self.path).await {
            Err(error) if error.kind() == io::ErrorKind::PermissionDenied => {
                tracing::warn!("Read access denied for {}", self.path.display());
                Ok(Permission::Denied)
            }
            // Missing files surface from `select` as a cancelled pick.
            _ => Ok(Permission::Granted),
        }
    }

    async fn select(&self) -> Result<Option<PickedFile>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(PickedFile::new(&self.path))),
            Ok(_) => {
                tracing::info!("{} is not a file; nothing selected", self.path.display());
                Ok(None)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::info!("{} does not exist; nothing selected", self.path.display());
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picked_file_name_and_extension() {
        let file = PickedFile::new("/tmp/photos/beach.JPG");
        assert_eq!(file.name, "beach.JPG");
        assert_eq!(file.extension(), Some("JPG"));
        assert_eq!(PickedFile::new("/tmp/notes").extension(), None);
    }

    #[tokio::test]
    async fn existing_file_is_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        let picker = FilePathPicker::new(&path);
        assert_eq!(picker.request_permission().await.unwrap(), Permission::Granted);
        let picked = picker.select().await.unwrap().unwrap();
        assert_eq!(picked.name, "clip.mp4");
        assert_eq!(picked.read().await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn missing_file_or_directory_selects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FilePathPicker::new(dir.path().join("gone.png"))
            .select()
            .await
            .unwrap()
            .is_none());
        assert!(FilePathPicker::new(dir.path()).select().await.unwrap().is_none());
    }
}
