//! Writable byte destinations for export runs
//!
//! A [`Sink`] owns its writer exclusively. Whoever holds it must call
//! [`Sink::close`]; closing is idempotent, so cleanup paths may call it
//! unconditionally.

use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::Result;

/// Buffer capacity used for file sinks
const FILE_BUFFER_CAPACITY: usize = 8 * 1024 * 1024;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Exclusive handle to an output byte stream
pub struct Sink {
    writer: Option<BoxedWriter>,
    label: String,
    bytes_written: u64,
}

impl Sink {
    /// Wrap any async writer
    ///
    /// # Arguments
    /// * `writer` - Destination writer (file, socket, response body, buffer)
    /// * `label` - Human readable name used in logs
    pub fn new<W>(writer: W, label: impl Into<String>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Some(Box::new(writer)),
            label: label.into(),
            bytes_written: 0,
        }
    }

    /// Open a buffered file sink, creating parent directories as needed
    ///
    /// # Arguments
    /// * `path` - File path to create or truncate
    ///
    /// # Returns
    /// * `Result<Self>` - Open sink, or the I/O error raised while opening it
    pub async fn create_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = File::create(path).await?;
        debug!("Opened file sink: {}", path.display());

        Ok(Self::new(
            BufWriter::with_capacity(FILE_BUFFER_CAPACITY, file),
            path.display().to_string(),
        ))
    }

    /// Whether the sink has been released
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of bytes accepted by the underlying writer so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write a whole buffer; writing to a closed sink is a no-op.
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(buf).await?;
            self.bytes_written += buf.len() as u64;
        }
        Ok(())
    }

    /// Flush and release the writer.
    ///
    /// The writer is dropped even when flushing fails, so a second call is
    /// always a no-op.
    pub async fn close(&mut self) -> io::Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        writer.flush().await?;
        writer.shutdown().await?;
        debug!("Closed sink {} ({} bytes)", self.label, self.bytes_written);
        Ok(())
    }
}

/// Cloneable in-memory writer; every clone appends to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().map(|buf| buf.clone()).unwrap_or_default()
    }

    /// Contents decoded as UTF-8, replacing invalid sequences
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.inner.lock() {
            Ok(mut inner) => {
                inner.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            Err(_) => Poll::Ready(Err(io::Error::other("shared buffer poisoned"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut sink = Sink::new(Vec::<u8>::new(), "memory");
        sink.write_all(b"abc").await.unwrap();
        assert_eq!(sink.bytes_written(), 3);

        sink.close().await.unwrap();
        assert!(sink.is_closed());
        sink.close().await.unwrap();

        // Writes after close are ignored
        sink.write_all(b"more").await.unwrap();
        assert_eq!(sink.bytes_written(), 3);
    }

    #[tokio::test]
    async fn test_shared_buffer_sees_sink_writes() {
        let buffer = SharedBuffer::new();
        let mut sink = Sink::new(buffer.clone(), "buffer");
        sink.write_all(b"id\n1\n").await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(buffer.to_string_lossy(), "id\n1\n");
    }

    #[tokio::test]
    async fn test_create_file_makes_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.csv");

        let mut sink = Sink::create_file(&path).await.unwrap();
        sink.write_all(b"a,b\n").await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(fs::read_to_string(&path).await.unwrap(), "a,b\n");
    }

    #[tokio::test]
    async fn test_create_file_fails_on_directory() {
        let dir = tempdir().unwrap();
        let err = Sink::create_file(dir.path()).await.unwrap_err();
        assert!(err.is_io_failure());
    }
}
