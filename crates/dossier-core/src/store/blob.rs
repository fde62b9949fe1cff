//! Local directory holding raw uploaded bytes, keyed by artefact id.
//!
//! Not a storage service: just where the extraction stage reads the original
//! upload from, and what the cleanup stage removes after the webhook fires.

use std::path::PathBuf;

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BlobDir {
    root: PathBuf,
}

impl BlobDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Persist uploaded bytes for later extraction.
    pub async fn write(&self, id: Uuid, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path(id), bytes).await
    }

    pub async fn read(&self, id: Uuid) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.path(id)).await
    }

    /// Remove the stored bytes. Missing files are fine: cleanup re-runs.
    pub async fn remove(&self, id: Uuid) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobDir::new(dir.path());
        let id = Uuid::new_v4();

        blobs.write(id, b"payload").await.unwrap();
        assert_eq!(blobs.read(id).await.unwrap(), b"payload");

        blobs.remove(id).await.unwrap();
        assert!(blobs.read(id).await.is_err());
        // Second removal is a no-op, not an error.
        blobs.remove(id).await.unwrap();
    }
}
