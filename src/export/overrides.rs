//! Per-run overrides and effective settings
//!
//! An [`ExportConfig`] holds optional overrides for exactly one run. Anything
//! left unset defers to the source's [`SourceDefaults`].

use crate::error::{ConfigError, Result};

use super::source::SourceDefaults;

/// Row cap override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCap {
    /// Write at most this many data rows
    Limit(usize),
    /// No cap for this run, whatever `row_cap_enabled` says
    Unlimited,
}

impl From<Option<usize>> for RowCap {
    fn from(cap: Option<usize>) -> Self {
        cap.map_or(RowCap::Unlimited, RowCap::Limit)
    }
}

/// Run-scoped overrides; `None` means "use the source default"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportConfig {
    pub batch_size: Option<usize>,
    pub row_cap: Option<RowCap>,
    pub row_cap_enabled: Option<bool>,
    pub bom_enabled: Option<bool>,
}

impl ExportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Cap the run at `Some(n)` rows; `None` removes the cap for this run
    pub fn row_cap(mut self, row_cap: Option<usize>) -> Self {
        self.row_cap = Some(RowCap::from(row_cap));
        self
    }

    pub fn row_cap_enabled(mut self, enabled: bool) -> Self {
        self.row_cap_enabled = Some(enabled);
        self
    }

    pub fn bom(mut self, enabled: bool) -> Self {
        self.bom_enabled = Some(enabled);
        self
    }

    /// Whether no override is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Resolve the effective settings against a source's defaults
    ///
    /// # Arguments
    /// * `defaults` - The source's own settings
    ///
    /// # Returns
    /// * `Result<ExportSettings>` - Effective settings, or an error for a zero batch size
    pub fn resolve(&self, defaults: &SourceDefaults) -> Result<ExportSettings> {
        let bom_enabled = self.bom_enabled.unwrap_or(defaults.bom_enabled);
        let row_cap_enabled = self.row_cap_enabled.unwrap_or(defaults.row_cap_enabled);
        let row_cap = match self.row_cap {
            Some(RowCap::Limit(n)) => Some(n),
            Some(RowCap::Unlimited) => None,
            None => defaults.row_cap,
        };
        let batch_size = self.batch_size.unwrap_or(defaults.batch_size);

        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: batch_size.to_string(),
            }
            .into());
        }

        Ok(ExportSettings {
            batch_size,
            // A zero cap counts as "no cap"
            row_cap: row_cap.filter(|&n| row_cap_enabled && n > 0),
            bom_enabled,
        })
    }
}

/// Settings in force for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    pub batch_size: usize,
    /// Cap actually applied; `None` when disabled or unset
    pub row_cap: Option<usize>,
    pub bom_enabled: bool,
}
