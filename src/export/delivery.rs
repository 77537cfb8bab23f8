//! Delivery of export runs to paths, streams and storage disks
//!
//! [`CsvExporter`] is the entry point most callers use. It owns a pipeline,
//! the storage disks and a temp directory, and stages per-call overrides:
//!
//! ```no_run
//! # use csvexport::export::{CsvExporter, Exportable};
//! # async fn demo(exporter: &CsvExporter, users: &dyn Exportable) -> csvexport::Result<()> {
//! exporter
//!     .set_row_cap(Some(500))
//!     .include_bom(true)
//!     .to_path(users, "exports/users.csv")
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Staged overrides are taken out of the holder when a delivery call starts,
//! so they apply to that call only and the holder is empty again right away.
//! Callers sharing one exporter across tasks should prefer the `*_with`
//! variants, which take the overrides as an argument.

use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, StorageError};

use super::overrides::{ExportConfig, RowCap};
use super::pipeline::{ExportPipeline, ExportReport, Exportable};
use super::response::{DownloadResponse, StreamedResponse};
use super::sink::Sink;
use super::storage::StorageManager;

/// Export service: pipeline, delivery adapters and staged overrides
#[derive(Debug)]
pub struct CsvExporter {
    pipeline: ExportPipeline,
    storage: StorageManager,
    temp_dir: PathBuf,
    pending: Mutex<ExportConfig>,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new(ExportPipeline::default())
    }
}

impl CsvExporter {
    pub fn new(pipeline: ExportPipeline) -> Self {
        Self {
            pipeline,
            storage: StorageManager::new(),
            temp_dir: std::env::temp_dir(),
            pending: Mutex::new(ExportConfig::default()),
        }
    }

    /// Build an exporter from the `[export]` and `[storage]` config sections
    pub fn from_config(config: &Config) -> Result<Self> {
        let dialect = config.export.dialect()?;
        let pipeline = ExportPipeline::new(dialect).with_progress(config.export.progress);

        Ok(Self::new(pipeline)
            .with_storage(StorageManager::from_config(&config.storage))
            .with_temp_dir(config.storage.temp_dir()))
    }

    pub fn with_storage(mut self, storage: StorageManager) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn pipeline(&self) -> &ExportPipeline {
        &self.pipeline
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut StorageManager {
        &mut self.storage
    }

    /* ---------------------------- staged overrides ---------------------------- */

    fn pending(&self) -> MutexGuard<'_, ExportConfig> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_batch_size(&self, batch_size: usize) -> &Self {
        self.pending().batch_size = Some(batch_size);
        self
    }

    /// Stage a row cap; `None` disables the cap for the next call
    pub fn set_row_cap(&self, row_cap: Option<usize>) -> &Self {
        self.pending().row_cap = Some(RowCap::from(row_cap));
        self
    }

    pub fn set_row_cap_enabled(&self, enabled: bool) -> &Self {
        self.pending().row_cap_enabled = Some(enabled);
        self
    }

    pub fn include_bom(&self, include: bool) -> &Self {
        self.pending().bom_enabled = Some(include);
        self
    }

    /// Overrides staged for the next call
    pub fn staged(&self) -> ExportConfig {
        *self.pending()
    }

    /// Take the staged overrides, leaving the holder empty
    fn take_overrides(&self) -> ExportConfig {
        mem::take(&mut *self.pending())
    }

    /* ------------------------------- to a sink -------------------------------- */

    /// Export into a caller-supplied sink, which the run closes
    pub async fn export_to_sink(&self, source: &dyn Exportable, sink: Sink) -> Result<ExportReport> {
        let overrides = self.take_overrides();
        self.export_to_sink_with(source, sink, overrides).await
    }

    pub async fn export_to_sink_with(
        &self,
        source: &dyn Exportable,
        sink: Sink,
        overrides: ExportConfig,
    ) -> Result<ExportReport> {
        source.export(&self.pipeline, sink, overrides).await
    }

    /* ------------------------------- to a path -------------------------------- */

    /// Write the export to a file, creating parent directories
    ///
    /// # Returns
    /// * `Result<PathBuf>` - The path written, or an I/O error if it cannot be opened
    pub async fn to_path(&self, source: &dyn Exportable, path: impl AsRef<Path>) -> Result<PathBuf> {
        let overrides = self.take_overrides();
        self.to_path_with(source, path, overrides).await
    }

    pub async fn to_path_with(
        &self,
        source: &dyn Exportable,
        path: impl AsRef<Path>,
        overrides: ExportConfig,
    ) -> Result<PathBuf> {
        let path = path.as_ref();
        // Bad settings must not truncate an existing file
        source.settings(&overrides)?;
        let sink = Sink::create_file(path).await?;
        source.export(&self.pipeline, sink, overrides).await?;
        Ok(path.to_path_buf())
    }

    /* ------------------------------ to a stream ------------------------------- */

    /// Build a streamed response; the export runs when the transport sends it
    pub fn stream(&self, source: Arc<dyn Exportable>, file_name: &str) -> StreamedResponse {
        let overrides = self.take_overrides();
        self.stream_with(source, file_name, overrides)
    }

    pub fn stream_with(
        &self,
        source: Arc<dyn Exportable>,
        file_name: &str,
        overrides: ExportConfig,
    ) -> StreamedResponse {
        let pipeline = self.pipeline.clone();
        StreamedResponse::new(
            file_name,
            Box::new(move |sink: Sink| -> BoxFuture<'static, Result<ExportReport>> {
                async move { source.export(&pipeline, sink, overrides).await }.boxed()
            }),
        )
    }

    /* ----------------------------- as a download ------------------------------ */

    /// Export to a temporary file served as an attachment
    ///
    /// The file is removed once the response is dropped.
    pub async fn download(&self, source: &dyn Exportable, file_name: &str) -> Result<DownloadResponse> {
        let overrides = self.take_overrides();
        self.download_with(source, file_name, overrides).await
    }

    pub async fn download_with(
        &self,
        source: &dyn Exportable,
        file_name: &str,
        overrides: ExportConfig,
    ) -> Result<DownloadResponse> {
        let temp = self.temp_path(Some(file_name));
        match self.to_path_with(source, &temp, overrides).await {
            Ok(path) => Ok(DownloadResponse::new(path, file_name)),
            Err(e) => {
                remove_temp(&temp).await;
                Err(e)
            }
        }
    }

    /* ------------------------------ to storage -------------------------------- */

    /// Export to a temporary file, upload it to `disk` at `path`, then delete
    /// the temporary file whatever the outcome
    ///
    /// # Returns
    /// * `Result<String>` - The stored path
    pub async fn store(&self, source: &dyn Exportable, path: &str, disk: &str) -> Result<String> {
        let overrides = self.take_overrides();
        self.store_with(source, path, disk, overrides).await
    }

    pub async fn store_with(
        &self,
        source: &dyn Exportable,
        path: &str,
        disk: &str,
        overrides: ExportConfig,
    ) -> Result<String> {
        let backend = self.storage.disk(disk)?;
        let temp = self.temp_path(None);

        let outcome = async {
            self.to_path_with(source, &temp, overrides).await?;

            let contents = tokio::fs::read(&temp)
                .await
                .map_err(|e| StorageError::TempReadFailed(e.to_string()))?;
            let size = contents.len();

            if !backend.put(path, contents).await {
                return Err(StorageError::PutRejected {
                    disk: disk.to_string(),
                    path: path.to_string(),
                }
                .into());
            }

            info!("Stored {} bytes on disk {} at {}", size, disk, path);
            Ok(path.to_string())
        }
        .await;

        remove_temp(&temp).await;
        outcome
    }

    /// Unique path inside the temp directory
    fn temp_path(&self, file_name: Option<&str>) -> PathBuf {
        let id = Uuid::new_v4().simple();
        let name = match file_name {
            Some(file_name) => {
                let base = Path::new(file_name)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("export.csv");
                format!("csv_{id}_{base}")
            }
            None => format!("csv_{id}"),
        };
        self.temp_dir.join(name)
    }
}

/// Remove a temporary file, tolerating its absence
async fn remove_temp(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed temporary file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temporary file {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::storage::MemoryDisk;

    #[test]
    fn test_setters_chain_and_stage() {
        let exporter = CsvExporter::default();
        exporter
            .set_batch_size(10)
            .set_row_cap(Some(2))
            .set_row_cap_enabled(true)
            .include_bom(true);

        assert_eq!(
            exporter.staged(),
            ExportConfig::new()
                .batch_size(10)
                .row_cap(Some(2))
                .row_cap_enabled(true)
                .bom(true)
        );

        let taken = exporter.take_overrides();
        assert!(!taken.is_empty());
        assert!(exporter.staged().is_empty());
    }

    #[test]
    fn test_temp_paths_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::default().with_temp_dir(dir.path());

        let a = exporter.temp_path(None);
        let b = exporter.temp_path(None);
        assert_ne!(a, b);
        assert!(a.starts_with(dir.path()));

        let named = exporter.temp_path(Some("../../users.csv"));
        assert!(named.starts_with(dir.path()));
        assert!(named.to_string_lossy().ends_with("_users.csv"));
    }

    #[test]
    fn test_from_config_registers_disks() {
        let mut config = Config::default();
        config.storage.disks.insert(
            "archive".to_string(),
            crate::config::DiskConfig {
                root: PathBuf::from("/tmp/archive"),
            },
        );

        let mut exporter = CsvExporter::from_config(&config).unwrap();
        assert!(exporter.storage().disk("archive").is_ok());
        assert!(exporter.storage().disk("local").is_ok());

        exporter
            .storage_mut()
            .register("memory", Arc::new(MemoryDisk::new()));
        assert!(exporter.storage().disk("memory").is_ok());
    }
}
