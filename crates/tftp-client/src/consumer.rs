//! The pluggable sink a transfer delivers bytes to.
//!
//! `Consumer` is held by the engine as `Box<dyn Consumer>`, and native
//! `async fn` in traits is not object-safe, so methods that need to await
//! are hand-desugared to return a boxed future. This is the same pattern
//! the `async-trait` crate expands to; written out by hand here since
//! nothing else in this crate needs the macro.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{Result, TftpError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Consumer: Send {
    /// Positions the next `deliver` call at `offset` bytes into the
    /// logical file. Out-of-order multicast delivery means this can move
    /// backwards as well as forwards.
    fn seek(&mut self, offset: u64) -> BoxFuture<'_, Result<()>>;

    /// Writes `data` at the consumer's current position.
    fn deliver(&mut self, data: &[u8]) -> BoxFuture<'_, Result<()>>;

    /// Informs the consumer of the negotiated block size, conveyed as a
    /// flow-control window hint.
    fn set_window(&mut self, blksize: usize);

    /// Final call on every code path: `status` is `0` on success and a
    /// `TftpError::status_code()` value otherwise.
    fn close(&mut self, status: u32) -> BoxFuture<'_, ()>;
}

/// Writes the transfer to a file on disk, using positioned writes so
/// out-of-order multicast delivery lands correctly.
pub struct FileConsumer {
    file: File,
    path: std::path::PathBuf,
}

impl FileConsumer {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await.map_err(TftpError::Network)?;
        Ok(Self { file, path })
    }
}

impl Consumer for FileConsumer {
    fn seek(&mut self, offset: u64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.file
                .seek(std::io::SeekFrom::Start(offset))
                .await
                .map_err(TftpError::Network)?;
            Ok(())
        })
    }

    fn deliver(&mut self, data: &[u8]) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.file.write_all(data).await.map_err(TftpError::Network)?;
            Ok(())
        })
    }

    fn set_window(&mut self, _blksize: usize) {
        // A file on local disk has no meaningful flow-control window of
        // its own; nothing to record.
    }

    fn close(&mut self, status: u32) -> BoxFuture<'_, ()> {
        let path = self.path.clone();
        Box::pin(async move {
            if status == 0 {
                tracing::info!(path = %path.display(), "transfer complete");
            } else {
                tracing::warn!(path = %path.display(), status, "transfer failed");
            }
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default, Clone)]
    pub struct Recorded {
        pub writes: Vec<(u64, Vec<u8>)>,
        pub seeks: Vec<u64>,
        pub window: Option<usize>,
        pub closed: Option<u32>,
        position: u64,
    }

    /// An in-memory consumer for unit tests: records every call instead of
    /// touching the filesystem.
    #[derive(Clone, Default)]
    pub struct RecordingConsumer {
        pub inner: Arc<Mutex<Recorded>>,
    }

    impl Consumer for RecordingConsumer {
        fn seek(&mut self, offset: u64) -> BoxFuture<'_, Result<()>> {
            let inner = self.inner.clone();
            Box::pin(async move {
                let mut guard = inner.lock().unwrap();
                guard.position = offset;
                guard.seeks.push(offset);
                Ok(())
            })
        }

        fn deliver(&mut self, data: &[u8]) -> BoxFuture<'_, Result<()>> {
            let inner = self.inner.clone();
            let data = data.to_vec();
            Box::pin(async move {
                let mut guard = inner.lock().unwrap();
                let pos = guard.position;
                guard.writes.push((pos, data));
                Ok(())
            })
        }

        fn set_window(&mut self, blksize: usize) {
            self.inner.lock().unwrap().window = Some(blksize);
        }

        fn close(&mut self, status: u32) -> BoxFuture<'_, ()> {
            let inner = self.inner.clone();
            Box::pin(async move {
                inner.lock().unwrap().closed = Some(status);
            })
        }
    }
}
