use std::{error::Error as StdError, fmt, io};

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ExportError {
    /// Invalid settings, config files or sink handles.
    Config(ConfigError),

    /// I/O errors while opening, writing or closing a sink.
    Io(io::Error),

    /// Storage backend errors.
    Storage(StorageError),

    /// Errors raised by an export source's `query` or `map`.
    Source(SourceError),

    /// Source registry lookup errors.
    Registry(RegistryError),

    /// Exporter scaffolding errors.
    Scaffold(ScaffoldError),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// The sink handed to the encoder was already closed.
    SinkClosed,

    /// A mapped row does not have as many values as there are headings.
    ArityMismatch { expected: usize, found: usize },
}

/// Storage-specific errors.
#[derive(Debug)]
pub enum StorageError {
    /// No backend registered under the disk name.
    DiskNotFound(String),

    /// The backend refused the upload.
    PutRejected { disk: String, path: String },

    /// The temporary export file could not be read back.
    TempReadFailed(String),
}

/// Error raised by an [`ExportSource`](crate::export::ExportSource).
///
/// The original error is kept untouched and exposed through
/// [`std::error::Error::source`].
#[derive(Debug)]
pub struct SourceError {
    inner: Box<dyn StdError + Send + Sync>,
}

/// Source registry errors.
#[derive(Debug)]
pub enum RegistryError {
    /// No source registered under the key.
    NotFound(String),

    /// A source was already registered under the key.
    Duplicate(String),
}

/// Scaffolding errors.
#[derive(Debug)]
pub enum ScaffoldError {
    /// The requested name is not a valid type path.
    InvalidName(String),

    /// The target file exists already.
    AlreadyExists(String),
}

impl SourceError {
    /// Wrap any error raised by a source.
    pub fn new<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self { inner: err.into() }
    }

    /// Build a source error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            inner: message.into().into(),
        }
    }

    /// Borrow the wrapped error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    /// Take back the wrapped error.
    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
        self.inner
    }
}

impl ExportError {
    /// Whether this error belongs to the I/O failure class
    /// (sink open/write failures and rejected storage uploads).
    pub fn is_io_failure(&self) -> bool {
        matches!(self, ExportError::Io(_) | ExportError::Storage(_))
    }

    /// Whether this error was raised by the export source.
    pub fn is_source_error(&self) -> bool {
        matches!(self, ExportError::Source(_))
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::Storage(e) => write!(f, "Storage error: {e}"),
            ExportError::Source(e) => write!(f, "Source error: {e}"),
            ExportError::Registry(e) => write!(f, "Registry error: {e}"),
            ExportError::Scaffold(e) => write!(f, "Scaffold error: {e}"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::SinkClosed => write!(f, "CSV encoder expects an open sink"),
            ConfigError::ArityMismatch { expected, found } => {
                write!(f, "Row has {found} values but {expected} headings")
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DiskNotFound(disk) => write!(f, "Storage disk not found: {disk}"),
            StorageError::PutRejected { disk, path } => {
                write!(f, "Failed to store CSV to disk: {disk} at path: {path}")
            }
            StorageError::TempReadFailed(msg) => {
                write!(f, "Failed to read temporary CSV contents: {msg}")
            }
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound(key) => write!(f, "No export source registered as '{key}'"),
            RegistryError::Duplicate(key) => {
                write!(f, "An export source is already registered as '{key}'")
            }
        }
    }
}

impl fmt::Display for ScaffoldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaffoldError::InvalidName(name) => write!(f, "Invalid exporter name: {name}"),
            ScaffoldError::AlreadyExists(path) => write!(f, "Exporter already exists: {path}"),
        }
    }
}

impl StdError for ExportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::Source(e) => Some(e.inner.as_ref()),
            _ => None,
        }
    }
}

impl StdError for ConfigError {}
impl StdError for StorageError {}
impl StdError for RegistryError {}
impl StdError for ScaffoldError {}

impl StdError for SourceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<StorageError> for ExportError {
    fn from(err: StorageError) -> Self {
        ExportError::Storage(err)
    }
}

impl From<SourceError> for ExportError {
    fn from(err: SourceError) -> Self {
        ExportError::Source(err)
    }
}

impl From<RegistryError> for ExportError {
    fn from(err: RegistryError) -> Self {
        ExportError::Registry(err)
    }
}

impl From<ScaffoldError> for ExportError {
    fn from(err: ScaffoldError) -> Self {
        ExportError::Scaffold(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Source(SourceError::new(err))
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

impl From<&str> for ExportError {
    fn from(msg: &str) -> Self {
        ExportError::Generic(msg.to_owned())
    }
}
