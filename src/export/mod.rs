//! Streaming CSV export
//!
//! This module turns rows from an arbitrary data source into CSV text and
//! delivers it to a file, a response body or a storage disk, without holding
//! the whole result in memory.
//!
//! # Architecture
//!
//! The export system is built on four main components:
//!
//! 1. **ExportSource**: Describes one export job (headings, rows, row mapping, defaults)
//! 2. **CsvEncoder**: Escapes values into CSV records and writes them to a [`Sink`]
//! 3. **ExportPipeline**: Resolves settings, applies the row cap and walks rows in batches
//! 4. **CsvExporter**: Stages per-call overrides and delivers runs to paths, streams and disks
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use csvexport::export::{CsvExporter, ExportSource, RowProvider, Value};
//!
//! struct Users;
//!
//! #[async_trait]
//! impl ExportSource for Users {
//!     type Row = (u32, String);
//!
//!     fn headings(&self) -> Vec<String> {
//!         vec!["id".into(), "name".into()]
//!     }
//!
//!     async fn query(&self) -> csvexport::Result<RowProvider<Self::Row>> {
//!         Ok(vec![(1, "Ann".to_string())].into())
//!     }
//!
//!     fn map(&self, row: &Self::Row) -> csvexport::Result<Vec<Value>> {
//!         Ok(vec![row.0.into(), row.1.as_str().into()])
//!     }
//! }
//!
//! # async fn demo() -> csvexport::Result<()> {
//! let exporter = CsvExporter::default();
//! exporter.include_bom(true).to_path(&Users, "users.csv").await?;
//! # Ok(())
//! # }
//! ```

pub mod delivery;
pub mod encoder;
pub mod jsonl;
pub mod overrides;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod response;
pub mod sink;
pub mod source;
pub mod storage;
pub mod value;

pub use delivery::CsvExporter;
pub use encoder::{CsvDialect, CsvEncoder, LineTerminator, UTF8_BOM};
pub use jsonl::JsonLinesSource;
pub use overrides::{ExportConfig, ExportSettings, RowCap};
pub use pipeline::{ExportPipeline, ExportReport, Exportable};
pub use progress::ProgressTracker;
pub use registry::SourceRegistry;
pub use response::{csv_headers, BodyProducer, DownloadResponse, StreamedResponse};
pub use sink::{SharedBuffer, Sink};
pub use source::{
    ExportSource, Paginate, RowProvider, SourceDefaults, StreamPager, DEFAULT_BATCH_SIZE,
    DEFAULT_ROW_CAP,
};
pub use storage::{LocalDisk, MemoryDisk, StorageBackend, StorageManager, DEFAULT_DISK};
pub use value::Value;
