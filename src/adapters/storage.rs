use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// Output directory on the local filesystem.
///
/// Writes land in a `.partial` sibling first and are renamed into place,
/// so an interrupted run never leaves a truncated archive under the final name.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.locate(path)).await?)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.locate(path);
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut staging = target.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, data).await?;
        tokio::fs::rename(&staging, &target).await?;
        tracing::debug!("Wrote {} bytes to {}", data.len(), target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.write_file("nested/out.csv", b"cik\n").await.unwrap();

        assert_eq!(storage.read_file("nested/out.csv").await.unwrap(), b"cik\n");
        assert!(!dir.path().join("nested/out.csv.partial").exists());
        assert!(storage.read_file("missing.csv").await.is_err());
    }

    #[tokio::test]
    async fn test_rewrite_replaces_previous_output() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.write_file("cik_cusip.zip", b"first run").await.unwrap();
        storage.write_file("cik_cusip.zip", b"second").await.unwrap();

        assert_eq!(storage.read_file("cik_cusip.zip").await.unwrap(), b"second");
        assert_eq!(storage.root(), dir.path());
    }
}
