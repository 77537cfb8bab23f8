//! Response objects handed to an HTTP-like transport
//!
//! The transport decides when the body is produced. [`StreamedResponse`]
//! runs the export straight into the response body; [`DownloadResponse`]
//! serves a finished temporary file and removes it afterwards.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::Stream;
use futures::future::BoxFuture;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::Result;

use super::pipeline::ExportReport;
use super::sink::Sink;

/// Capacity of the in-process pipe used by [`StreamedResponse::into_body_stream`]
const BODY_PIPE_CAPACITY: usize = 64 * 1024;

/// Standard headers for a non-cacheable CSV attachment
pub fn csv_headers(file_name: &str) -> Vec<(String, String)> {
    let escaped = file_name.replace('\\', "\\\\").replace('"', "\\\"");
    vec![
        ("Content-Type".into(), "text/csv; charset=UTF-8".into()),
        (
            "Cache-Control".into(),
            "must-revalidate, post-check=0, pre-check=0".into(),
        ),
        ("Expires".into(), "0".into()),
        ("Pragma".into(), "public".into()),
        (
            "Access-Control-Expose-Headers".into(),
            "Content-Disposition".into(),
        ),
        (
            "Content-Disposition".into(),
            format!("attachment; filename=\"{escaped}\""),
        ),
    ]
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Produces the response body once a sink is bound to it
pub type BodyProducer = Box<dyn FnOnce(Sink) -> BoxFuture<'static, Result<ExportReport>> + Send>;

/// Deferred CSV response whose body is exported on demand
pub struct StreamedResponse {
    file_name: String,
    headers: Vec<(String, String)>,
    producer: BodyProducer,
}

impl StreamedResponse {
    pub fn new(file_name: impl Into<String>, producer: BodyProducer) -> Self {
        let file_name = file_name.into();
        Self {
            headers: csv_headers(&file_name),
            file_name,
            producer,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Run the export into the given response body.
    ///
    /// Bytes flushed before a failure have already reached the transport.
    pub async fn send_to<W>(self, body: W) -> Result<ExportReport>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let label = format!("response body ({})", self.file_name);
        (self.producer)(Sink::new(body, label)).await
    }

    /// Run the export on a background task and expose the body as a byte stream
    ///
    /// The stream ends when the export finishes; the task's result reports
    /// whether the body is complete.
    pub fn into_body_stream(
        self,
    ) -> (
        impl Stream<Item = io::Result<Bytes>> + Send + 'static,
        JoinHandle<Result<ExportReport>>,
    ) {
        let (writer, reader) = tokio::io::duplex(BODY_PIPE_CAPACITY);
        let task = tokio::spawn(self.send_to(writer));
        (ReaderStream::new(reader), task)
    }
}

impl fmt::Debug for StreamedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedResponse")
            .field("file_name", &self.file_name)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Finished CSV file served as an attachment
///
/// The file is deleted when the response is dropped, whether or not it was
/// sent.
#[derive(Debug)]
pub struct DownloadResponse {
    path: PathBuf,
    file_name: String,
    headers: Vec<(String, String)>,
}

impl DownloadResponse {
    pub fn new(path: PathBuf, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        Self {
            headers: csv_headers(&file_name),
            path,
            file_name,
        }
    }

    /// Location of the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Copy the file into the response body, then delete it
    ///
    /// # Returns
    /// * `Result<u64>` - Number of bytes sent
    pub async fn send_to<W>(self, mut body: W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let sent = tokio::io::copy(&mut file, &mut body).await?;
        body.flush().await?;
        debug!("Sent {} ({} bytes)", self.file_name, sent);
        Ok(sent)
    }
}

impl Drop for DownloadResponse {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}
