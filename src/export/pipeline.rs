//! Export pipeline for orchestrating export runs
//!
//! The pipeline brings together an export source, the CSV encoder and a sink:
//! it resolves the effective settings, applies the row cap, walks the rows in
//! fixed-size batches and always closes the sink before returning.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::encoder::{CsvDialect, CsvEncoder};
use super::overrides::{ExportConfig, ExportSettings};
use super::progress::ProgressTracker;
use super::sink::Sink;
use super::source::{ExportSource, Paginate, RowProvider};

/// Result of an export run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// Number of data rows written (heading row excluded)
    pub rows_written: u64,
    /// Bytes accepted by the sink, BOM and headings included
    pub bytes_written: u64,
    /// Number of batches processed
    pub batches: u32,
    /// Time taken for the run
    pub elapsed_ms: u64,
}

/// Running totals while rows are written
#[derive(Debug, Default)]
struct RunStats {
    batches: u32,
}

/// Orchestrates single export runs
///
/// A pipeline holds no per-run state, so one instance can serve any number of
/// concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct ExportPipeline {
    dialect: CsvDialect,
    strict_arity: bool,
    show_progress: bool,
}

impl ExportPipeline {
    pub fn new(dialect: CsvDialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Reject rows whose value count differs from the heading count
    pub fn strict_arity(mut self, strict: bool) -> Self {
        self.strict_arity = strict;
        self
    }

    /// Display progress on stderr while running
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn dialect(&self) -> &CsvDialect {
        &self.dialect
    }

    /// Execute one export run
    ///
    /// The sink is closed exactly once whatever happens. Errors raised by the
    /// source or the encoder are returned after the sink has been closed; a
    /// close failure is only reported when the run itself succeeded.
    ///
    /// # Arguments
    /// * `source` - Export source, borrowed for the run
    /// * `sink` - Open sink, owned by the run
    /// * `overrides` - Settings for this run only
    ///
    /// # Returns
    /// * `Result<ExportReport>` - Run statistics or error
    pub async fn run<S>(
        &self,
        source: &S,
        sink: Sink,
        overrides: ExportConfig,
    ) -> Result<ExportReport>
    where
        S: ExportSource + ?Sized,
    {
        let start_time = Instant::now();
        let label = sink.label().to_string();
        let mut encoder = CsvEncoder::new(sink, self.dialect)?;

        info!("Starting CSV export to {}", label);
        let outcome = self.write_all(source, &mut encoder, &overrides).await;

        let closed = encoder.close().await;

        if let (Err(_), Err(e)) = (&outcome, &closed) {
            warn!("Failed to close {} after a failed export: {}", label, e);
        }
        let stats = outcome?;
        closed?;

        let report = ExportReport {
            rows_written: encoder.rows_written(),
            bytes_written: encoder.bytes_written(),
            batches: stats.batches,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Export completed: {} rows, {} bytes, {} ms",
            report.rows_written, report.bytes_written, report.elapsed_ms
        );

        Ok(report)
    }

    /// Steps run while the sink is open: BOM, headings, then the batch loop
    async fn write_all<S>(
        &self,
        source: &S,
        encoder: &mut CsvEncoder,
        overrides: &ExportConfig,
    ) -> Result<RunStats>
    where
        S: ExportSource + ?Sized,
    {
        let settings = overrides.resolve(&source.defaults())?;
        debug!("Effective export settings: {:?}", settings);

        if settings.bom_enabled {
            encoder.write_bom().await?;
        }

        let headings = source.headings();
        if !headings.is_empty() {
            encoder.write_headings(&headings).await?;
        }

        let mut stats = RunStats::default();
        let provider = source.query().await?;
        let tracker =
            ProgressTracker::for_provider(&provider, settings.row_cap, self.show_progress);

        match provider {
            RowProvider::Materialized(mut rows) => {
                if let Some(cap) = settings.row_cap {
                    rows.truncate(cap);
                }

                for chunk in rows.chunks(settings.batch_size) {
                    self.write_batch(source, encoder, chunk, headings.len())
                        .await?;
                    self.batch_done(&mut stats, encoder, &tracker);
                }
            }
            RowProvider::Paginated(mut pager) => {
                if let Some(cap) = settings.row_cap {
                    pager.limit(cap);
                }

                let drained = self
                    .drain_pages(
                        source,
                        encoder,
                        &mut pager,
                        &settings,
                        &mut stats,
                        headings.len(),
                        &tracker,
                    )
                    .await;
                let closed = pager.close().await;
                drained?;
                closed?;
            }
        }

        tracker.finish();
        Ok(stats)
    }

    /// Pull batches from a paginated provider until it runs dry or the cap is hit
    #[allow(clippy::too_many_arguments)]
    async fn drain_pages<S>(
        &self,
        source: &S,
        encoder: &mut CsvEncoder,
        pager: &mut Box<dyn Paginate<S::Row>>,
        settings: &ExportSettings,
        stats: &mut RunStats,
        width: usize,
        tracker: &ProgressTracker,
    ) -> Result<()>
    where
        S: ExportSource + ?Sized,
    {
        loop {
            let remaining = settings
                .row_cap
                .map(|cap| cap.saturating_sub(encoder.rows_written() as usize));
            let size = match remaining {
                Some(0) => break,
                Some(n) => settings.batch_size.min(n),
                None => settings.batch_size,
            };

            debug!("Fetching batch #{}", stats.batches + 1);
            let Some(mut rows) = pager.next_batch(size).await? else {
                debug!("No more rows available");
                break;
            };
            if rows.is_empty() {
                debug!("Empty batch, treating provider as exhausted");
                break;
            }

            // The cap holds even if a provider ignores `limit`
            if let Some(n) = remaining {
                rows.truncate(n);
            }
            self.write_batch(source, encoder, &rows, width).await?;
            self.batch_done(stats, encoder, tracker);
        }

        Ok(())
    }

    /// Map and write one batch, preserving row order
    async fn write_batch<S>(
        &self,
        source: &S,
        encoder: &mut CsvEncoder,
        rows: &[S::Row],
        width: usize,
    ) -> Result<()>
    where
        S: ExportSource + ?Sized,
    {
        for row in rows {
            let values = source.map(row)?;
            if self.strict_arity && width > 0 && values.len() != width {
                return Err(ConfigError::ArityMismatch {
                    expected: width,
                    found: values.len(),
                }
                .into());
            }
            encoder.write_row(&values).await?;
        }
        Ok(())
    }

    fn batch_done(&self, stats: &mut RunStats, encoder: &CsvEncoder, tracker: &ProgressTracker) {
        stats.batches += 1;
        let written = encoder.rows_written();
        tracker.update(written);

        debug!("Wrote batch #{} (total: {} rows)", stats.batches, written);
        if stats.batches % 10 == 0 {
            info!(
                "Progress: {} rows exported ({} batches)",
                written, stats.batches
            );
        }
    }
}

/// Object-safe view of an export source
///
/// Every [`ExportSource`] is `Exportable`, whatever its row type, so sources
/// with different rows can sit behind one `dyn Exportable` (registries,
/// delivery adapters).
#[async_trait]
pub trait Exportable: Send + Sync {
    /// Settings a run with `overrides` would use, or the configuration error
    /// it would fail with
    fn settings(&self, overrides: &ExportConfig) -> Result<ExportSettings>;

    /// Run `pipeline` for this source into `sink`
    async fn export(
        &self,
        pipeline: &ExportPipeline,
        sink: Sink,
        overrides: ExportConfig,
    ) -> Result<ExportReport>;
}

#[async_trait]
impl<S: ExportSource> Exportable for S {
    fn settings(&self, overrides: &ExportConfig) -> Result<ExportSettings> {
        overrides.resolve(&self.defaults())
    }

    async fn export(
        &self,
        pipeline: &ExportPipeline,
        sink: Sink,
        overrides: ExportConfig,
    ) -> Result<ExportReport> {
        pipeline.run(self, sink, overrides).await
    }
}
