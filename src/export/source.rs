//! Export source contract
//!
//! An [`ExportSource`] describes one export job: its column headings, how to
//! obtain rows, how to flatten a row into CSV values, and its own default
//! settings. Rows come from a [`RowProvider`], which is either a lazily
//! paginated query or an already materialized list.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use tracing::debug;

use crate::error::Result;

use super::value::Value;

/// Default number of rows fetched per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default maximum number of data rows per export
pub const DEFAULT_ROW_CAP: usize = 10_000;

/// Settings an export source applies when no override is given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDefaults {
    pub batch_size: usize,
    /// `None` means the source has no cap of its own
    pub row_cap: Option<usize>,
    pub row_cap_enabled: bool,
    pub bom_enabled: bool,
}

impl Default for SourceDefaults {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            row_cap: Some(DEFAULT_ROW_CAP),
            row_cap_enabled: true,
            bom_enabled: false,
        }
    }
}

impl SourceDefaults {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_row_cap(mut self, row_cap: Option<usize>) -> Self {
        self.row_cap = row_cap;
        self
    }

    pub fn with_row_cap_enabled(mut self, enabled: bool) -> Self {
        self.row_cap_enabled = enabled;
        self
    }

    pub fn with_bom(mut self, enabled: bool) -> Self {
        self.bom_enabled = enabled;
        self
    }
}

/// Lazily paginated row provider
///
/// Iteration is stateful: the pipeline calls [`limit`](Paginate::limit) at
/// most once before the first fetch, then pulls batches until `None`, then
/// calls [`close`](Paginate::close).
#[async_trait]
pub trait Paginate<R>: Send {
    /// Restrict the total number of rows this provider will yield
    fn limit(&mut self, max_rows: usize);

    /// Fetch up to `size` rows, or `None` once exhausted
    ///
    /// An empty batch also ends the run.
    async fn next_batch(&mut self, size: usize) -> Result<Option<Vec<R>>>;

    /// Release any resources held by the provider
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Rows of an export, in source order
pub enum RowProvider<R> {
    /// Query-like source fetched batch by batch
    Paginated(Box<dyn Paginate<R>>),
    /// Rows already held in memory
    Materialized(Vec<R>),
}

impl<R: Send + 'static> RowProvider<R> {
    /// Wrap a fallible stream of rows as a paginated provider
    pub fn from_stream(stream: BoxStream<'static, Result<R>>) -> Self {
        RowProvider::Paginated(Box::new(StreamPager::new(stream)))
    }
}

impl<R> From<Vec<R>> for RowProvider<R> {
    fn from(rows: Vec<R>) -> Self {
        RowProvider::Materialized(rows)
    }
}

impl<R> std::fmt::Debug for RowProvider<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowProvider::Paginated(_) => f.write_str("RowProvider::Paginated"),
            RowProvider::Materialized(rows) => {
                write!(f, "RowProvider::Materialized({} rows)", rows.len())
            }
        }
    }
}

/// Contract between an export job and the pipeline
///
/// Only `query` and `map` are required. `headings` defaults to none (no
/// header row) and `defaults` to [`SourceDefaults::default`].
#[async_trait]
pub trait ExportSource: Send + Sync {
    /// Row type produced by `query` and consumed by `map`
    type Row: Send + Sync + 'static;

    /// Column headings; empty means no header row is written
    fn headings(&self) -> Vec<String> {
        Vec::new()
    }

    /// Provide the rows to export
    async fn query(&self) -> Result<RowProvider<Self::Row>>;

    /// Flatten one row into values, in heading order
    fn map(&self, row: &Self::Row) -> Result<Vec<Value>>;

    /// Settings used when a run has no override for them
    fn defaults(&self) -> SourceDefaults {
        SourceDefaults::default()
    }
}

/// Paginated provider over a fallible row stream
///
/// Mirrors a database cursor: rows are pulled on demand and the stream is
/// dropped as soon as it is exhausted, fails or reaches its limit.
pub struct StreamPager<R> {
    stream: Option<BoxStream<'static, Result<R>>>,
    remaining: Option<usize>,
    total_fetched: u64,
}

impl<R> StreamPager<R> {
    pub fn new(stream: BoxStream<'static, Result<R>>) -> Self {
        Self {
            stream: Some(stream),
            remaining: None,
            total_fetched: 0,
        }
    }
}

#[async_trait]
impl<R: Send + 'static> Paginate<R> for StreamPager<R> {
    fn limit(&mut self, max_rows: usize) {
        self.remaining = Some(max_rows);
    }

    async fn next_batch(&mut self, size: usize) -> Result<Option<Vec<R>>> {
        let want = match self.remaining {
            Some(remaining) => size.min(remaining),
            None => size,
        };
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        if want == 0 {
            self.stream = None;
            return Ok(None);
        }

        let mut batch = Vec::with_capacity(want);
        while batch.len() < want {
            match stream.try_next().await {
                Ok(Some(row)) => batch.push(row),
                Ok(None) => break,
                Err(e) => {
                    self.stream = None;
                    return Err(e);
                }
            }
        }

        if batch.is_empty() {
            debug!("Row stream exhausted after {} rows", self.total_fetched);
            self.stream = None;
            return Ok(None);
        }

        self.total_fetched += batch.len() as u64;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= batch.len();
        }
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExportError, SourceError};
    use futures::stream::{self, StreamExt};

    fn numbers(n: u32) -> BoxStream<'static, Result<u32>> {
        stream::iter((1..=n).map(Ok)).boxed()
    }

    #[test]
    fn test_source_defaults() {
        let defaults = SourceDefaults::default();
        assert_eq!(defaults.batch_size, 1000);
        assert_eq!(defaults.row_cap, Some(10_000));
        assert!(defaults.row_cap_enabled);
        assert!(!defaults.bom_enabled);
    }

    #[tokio::test]
    async fn test_stream_pager_batches_in_order() {
        let mut pager = StreamPager::new(numbers(5));

        assert_eq!(pager.next_batch(2).await.unwrap(), Some(vec![1, 2]));
        assert_eq!(pager.next_batch(2).await.unwrap(), Some(vec![3, 4]));
        assert_eq!(pager.next_batch(2).await.unwrap(), Some(vec![5]));
        assert_eq!(pager.next_batch(2).await.unwrap(), None);
        assert_eq!(pager.next_batch(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stream_pager_honours_limit() {
        let mut pager = StreamPager::new(numbers(10));
        pager.limit(3);

        assert_eq!(pager.next_batch(2).await.unwrap(), Some(vec![1, 2]));
        assert_eq!(pager.next_batch(2).await.unwrap(), Some(vec![3]));
        assert_eq!(pager.next_batch(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stream_pager_stops_after_error() {
        let rows: Vec<Result<u32>> = vec![
            Ok(1),
            Err(ExportError::Source(SourceError::msg("cursor died"))),
            Ok(3),
        ];
        let mut pager = StreamPager::new(stream::iter(rows).boxed());

        assert!(pager.next_batch(5).await.is_err());
        assert_eq!(pager.next_batch(5).await.unwrap(), None);
    }

    #[test]
    fn test_provider_debug() {
        let provider: RowProvider<u32> = vec![1, 2, 3].into();
        assert_eq!(format!("{provider:?}"), "RowProvider::Materialized(3 rows)");
    }
}
