//! csvexport Library
//!
//! Streaming, memory-bounded CSV export of large datasets. Rows are pulled
//! from an export source in fixed-size batches, escaped into CSV and written
//! to a file, a response body or a storage disk.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `export`: Encoder, pipeline, sources and delivery adapters
//! - `scaffold`: Generation of new export source skeletons
//!
//! # Example
//!
//! ```no_run
//! use csvexport::export::{CsvExporter, JsonLinesSource, SourceDefaults};
//!
//! #[tokio::main]
//! async fn main() -> csvexport::Result<()> {
//!     let source =
//!         JsonLinesSource::open("users.jsonl", None, true, SourceDefaults::default()).await?;
//!
//!     let exporter = CsvExporter::default();
//!     exporter
//!         .set_row_cap(None)
//!         .to_path(&source, "users.csv")
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod scaffold;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExportError, Result};
pub use export::{
    CsvEncoder, CsvExporter, ExportConfig, ExportPipeline, ExportReport, ExportSource,
    Exportable, RowProvider, Sink, Value,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
