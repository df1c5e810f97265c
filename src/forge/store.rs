//! Persistence Layer
//!
//! One file per capability, `<dir>/<identity>.py`. Writes go to a hidden
//! temporary file in the same directory and are renamed into place, so a
//! concurrent scan sees either the old artifact or the new one.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::ForgeError;

pub const ARTIFACT_EXTENSION: &str = "py";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", identity, ARTIFACT_EXTENSION))
    }

    pub async fn exists(&self, identity: &str) -> bool {
        fs::try_exists(self.path_for(identity)).await.unwrap_or(false)
    }

    /// Current persisted source for `identity`
    pub async fn read(&self, identity: &str) -> Result<String, ForgeError> {
        match fs::read_to_string(self.path_for(identity)).await {
            Ok(source) => Ok(source),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ForgeError::PriorArtifactMissing(identity.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write or overwrite the artifact for `identity` atomically
    pub async fn write(&self, identity: &str, source: &str) -> Result<PathBuf, ForgeError> {
        fs::create_dir_all(&self.dir).await?;

        let dir = self.dir.clone();
        let target = self.path_for(identity);
        let bytes = source.as_bytes().to_vec();
        let dest = target.clone();

        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".")
                .suffix(".partial")
                .tempfile_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&dest).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        info!("💾 Persisted artifact for '{}' at {:?}", identity, target);
        Ok(target)
    }

    /// Delete the artifact for `identity`; absent is not an error
    pub async fn remove(&self, identity: &str) -> Result<(), ForgeError> {
        match fs::remove_file(self.path_for(identity)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All artifact files, sorted. A missing directory holds no artifacts.
    pub async fn list(&self) -> Result<Vec<PathBuf>, ForgeError> {
        list_artifacts(&self.dir).await
    }
}

/// Artifact files in `dir`; hidden and partially written files are skipped
pub async fn list_artifacts(dir: &Path) -> Result<Vec<PathBuf>, ForgeError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Artifact directory {:?} does not exist; nothing to load", dir);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_artifact_file(&path) && entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn is_artifact_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.'));
    visible && path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_read_overwrite() {
        let temp_dir = tempdir().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("generated-tools"));

        assert!(!store.exists("alpha").await);
        let path = store.write("alpha", "x = 1\n").await.unwrap();
        assert_eq!(path, store.path_for("alpha"));
        assert_eq!(store.read("alpha").await.unwrap(), "x = 1\n");

        store.write("alpha", "x = 2\n").await.unwrap();
        assert_eq!(store.read("alpha").await.unwrap(), "x = 2\n");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        store.write("alpha", "x = 1\n").await.unwrap();

        store.remove("alpha").await.unwrap();
        assert!(!store.exists("alpha").await);
        store.remove("alpha").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_is_prior_artifact_missing() {
        let temp_dir = tempdir().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        let err = store.read("ghost").await.unwrap_err();
        assert!(matches!(err, ForgeError::PriorArtifactMissing(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let temp_dir = tempdir().unwrap();
        let files = list_artifacts(&temp_dir.path().join("nope")).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_partial_and_foreign_files() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path();
        std::fs::write(dir.join("b_tool.py"), "x = 1").unwrap();
        std::fs::write(dir.join("a_tool.py"), "x = 1").unwrap();
        std::fs::write(dir.join(".tmp123.partial"), "x =").unwrap();
        std::fs::write(dir.join(".hidden.py"), "x = 1").unwrap();
        std::fs::write(dir.join("notes.json"), "{}").unwrap();

        let files = list_artifacts(dir).await.unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a_tool.py", "b_tool.py"]);
    }
}
