use crate::utils::validation::check_path_segment;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader};

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("unsafe path segment '{segment}': {reason}")]
    UnsafePath {
        segment: String,
        reason: &'static str,
    },

    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to create file {}: {source}", .path.display())]
    CreateFile { path: PathBuf, source: io::Error },

    #[error("failed to write file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// `<namespace>/<origin>/<key>/<fileName>`, derived purely from its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingPath {
    dir: PathBuf,
    file: PathBuf,
}

impl StagingPath {
    pub fn new(
        namespace_root: &Path,
        origin: &str,
        key: &str,
        file_name: &str,
    ) -> Result<Self, StagingError> {
        for segment in [origin, key, file_name] {
            check_path_segment(segment).map_err(|reason| StagingError::UnsafePath {
                segment: segment.to_string(),
                reason,
            })?;
        }

        let dir = namespace_root.join(origin).join(key);
        let file = dir.join(file_name);
        Ok(Self { dir, file })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

/// Writes uploads into the local staging tree.
#[derive(Debug, Clone)]
pub struct StagingSink {
    namespace_root: PathBuf,
    buffer_size: usize,
}

impl StagingSink {
    pub fn new(namespace_root: PathBuf, buffer_size: usize) -> Self {
        Self {
            namespace_root,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn namespace_root(&self) -> &Path {
        &self.namespace_root
    }

    pub fn path_for(
        &self,
        origin: &str,
        key: &str,
        file_name: &str,
    ) -> Result<StagingPath, StagingError> {
        StagingPath::new(&self.namespace_root, origin, key, file_name)
    }

    /// Streams `reader` into the staging file, replacing any previous
    /// content. Returns the number of bytes written. A failed write may
    /// leave a partial file behind.
    pub async fn write<R>(&self, path: &StagingPath, reader: R) -> Result<u64, StagingError>
    where
        R: AsyncRead + Unpin + Send,
    {
        fs::create_dir_all(path.dir())
            .await
            .map_err(|source| StagingError::CreateDir {
                path: path.dir().to_path_buf(),
                source,
            })?;

        let mut dst = File::create(path.file())
            .await
            .map_err(|source| StagingError::CreateFile {
                path: path.file().to_path_buf(),
                source,
            })?;

        let write_err = |source| StagingError::Write {
            path: path.file().to_path_buf(),
            source,
        };

        let mut src = BufReader::with_capacity(self.buffer_size, reader);
        let written = tokio::io::copy_buf(&mut src, &mut dst)
            .await
            .map_err(write_err)?;
        dst.flush().await.map_err(write_err)?;
        dst.sync_all().await.map_err(write_err)?;

        tracing::debug!(path = %path.file().display(), bytes = written, "staged upload");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_path_layout() {
        let path = StagingPath::new(Path::new("/data/prod"), "albums", "abc123", "photo.jpg")
            .unwrap();
        assert_eq!(path.dir(), Path::new("/data/prod/albums/abc123"));
        assert_eq!(path.file(), Path::new("/data/prod/albums/abc123/photo.jpg"));
    }

    #[test]
    fn test_staging_path_rejects_traversal() {
        let err = StagingPath::new(Path::new("/data"), "..", "abc", "a.jpg").unwrap_err();
        assert!(matches!(err, StagingError::UnsafePath { .. }));
        assert!(StagingPath::new(Path::new("/data"), "albums", "a/b", "a.jpg").is_err());
    }

    #[tokio::test]
    async fn test_write_creates_tree_and_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let sink = StagingSink::new(root.path().join("test"), 4);
        let path = sink.path_for("albums", "abc123", "photo.jpg").unwrap();

        let n = sink.write(&path, &b"a much longer first body"[..]).await.unwrap();
        assert_eq!(n, 24);

        let n = sink.write(&path, &b"short"[..]).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(tokio::fs::read(path.file()).await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_write_fails_when_directory_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("albums"), b"not a dir").unwrap();
        let sink = StagingSink::new(root.path().to_path_buf(), 1024);
        let path = sink.path_for("albums", "abc123", "photo.jpg").unwrap();

        let err = sink.write(&path, &b"data"[..]).await.unwrap_err();
        assert!(matches!(err, StagingError::CreateDir { .. }));
    }
}
