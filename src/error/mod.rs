//! Error handling module for export operations.
//!
//! Errors fall into three classes:
//! - Configuration errors: invalid settings or a closed sink handed to the encoder
//! - I/O failures: a sink cannot be opened or written, or a storage upload is rejected
//! - Source errors: whatever an export source raises from `query` or `map`
//!
//! # Example
//!
//! ```rust
//! use csvexport::error::{ExportError, Result, SourceError};
//!
//! fn parse_age(raw: &str) -> Result<i64> {
//!     raw.parse::<i64>()
//!         .map_err(|e| ExportError::Source(SourceError::new(e)))
//! }
//!
//! assert!(parse_age("x").unwrap_err().is_source_error());
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ExportError, RegistryError, Result, ScaffoldError, SourceError, StorageError,
};
