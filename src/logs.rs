//! Per-job output storage.
//!
//! Each job gets one append-only sink while it runs; the same bytes can be
//! read back through a source at any time, including while the job is still
//! writing.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::jobs::JobId;

/// Write half of a job's output channel.
pub type LogSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Read half of a job's output channel.
pub type LogSource = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Create (or truncate) the sink for `job_id`.
    async fn create_sink(&self, job_id: JobId) -> Result<LogSink>;

    /// Open the captured output of `job_id`. Fails with `NotFound` when no
    /// sink was ever created for it.
    async fn open_source(&self, job_id: JobId) -> Result<LogSource>;

    /// Discard every stored log.
    async fn remove_all(&self) -> Result<()>;
}

/// Stores each job's output in `<dir>/<job id>`.
#[derive(Debug, Clone)]
pub struct FileLogStore {
    dir: PathBuf,
}

impl FileLogStore {
    /// Create the store, creating `dir` (owner-only permissions) if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir).await.map_err(|e| {
            Error::internal(
                "FileLogStore::new",
                format!("failed to create log dir {}", dir.display()),
                e,
            )
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, job_id: JobId) -> PathBuf {
        self.dir.join(job_id.to_string())
    }
}

async fn ensure_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await
}

#[async_trait]
impl LogStore for FileLogStore {
    async fn create_sink(&self, job_id: JobId) -> Result<LogSink> {
        const OP: &str = "FileLogStore::create_sink";

        // The directory may have been removed by a previous cleanup.
        ensure_dir(&self.dir)
            .await
            .map_err(|e| Error::internal(OP, "failed to create log dir", e))?;

        let file = File::create(self.path_for(job_id))
            .await
            .map_err(|e| Error::internal(OP, "failed to create log file", e))?;
        Ok(Box::new(file))
    }

    async fn open_source(&self, job_id: JobId) -> Result<LogSource> {
        const OP: &str = "FileLogStore::open_source";

        match File::open(self.path_for(job_id)).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::not_found(OP, "no logs exist for this job"))
            }
            Err(e) => Err(Error::internal(OP, "failed to open log file", e)),
        }
    }

    async fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                tracing::info!(dir = %self.dir.display(), "Removed job logs");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::internal(
                "FileLogStore::remove_all",
                "failed to delete log dir",
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use uuid::Uuid;

    async fn read_source(store: &FileLogStore, id: JobId) -> String {
        let mut source = store.open_source(id).await.unwrap();
        let mut buf = String::new();
        source.read_to_string(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn new_creates_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("logs");
        let store = FileLogStore::new(&dir).await.unwrap();
        assert!(store.dir().is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[tokio::test]
    async fn source_sees_bytes_written_so_far() {
        let tmp = TempDir::new().unwrap();
        let store = FileLogStore::new(tmp.path()).await.unwrap();
        let id = Uuid::new_v4();

        let mut sink = store.create_sink(id).await.unwrap();
        sink.write_all(b"hello ").await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(read_source(&store, id).await, "hello ");

        sink.write_all(b"world").await.unwrap();
        sink.shutdown().await.unwrap();
        assert_eq!(read_source(&store, id).await, "hello world");
    }

    #[tokio::test]
    async fn open_unknown_job_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = FileLogStore::new(tmp.path()).await.unwrap();
        let err = store.open_source(Uuid::new_v4()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn remove_all_is_idempotent_and_dir_is_recreated() {
        let tmp = TempDir::new().unwrap();
        let store = FileLogStore::new(tmp.path().join("logs")).await.unwrap();
        let id = Uuid::new_v4();
        store.create_sink(id).await.unwrap();

        store.remove_all().await.unwrap();
        assert!(!store.dir().exists());
        store.remove_all().await.unwrap();

        let err = store.open_source(id).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        store.create_sink(id).await.unwrap();
        assert!(store.dir().is_dir());
    }
}
