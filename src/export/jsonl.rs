//! JSON Lines export source
//!
//! Reads one JSON object per line and exports the selected columns. Nested
//! fields are addressed with dot paths (`address.city`); objects and arrays
//! that end up in a cell are written as compact JSON text.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

use crate::error::{Result, SourceError};

use super::source::{ExportSource, Paginate, RowProvider, SourceDefaults};
use super::value::Value;

/// One parsed input line
pub type JsonRow = Map<String, JsonValue>;

/// Export source over a JSON Lines file
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    columns: Vec<String>,
    paginated: bool,
    defaults: SourceDefaults,
}

impl JsonLinesSource {
    /// Open a JSON Lines file as an export source
    ///
    /// # Arguments
    /// * `path` - Input file
    /// * `columns` - Columns to export; `None` uses the sorted keys of the first object
    /// * `paginated` - Read lines lazily in batches instead of loading the file up front
    /// * `defaults` - Settings applied when a run has no override
    ///
    /// # Returns
    /// * `Result<Self>` - The source, or an error if the file cannot be read
    pub async fn open(
        path: impl AsRef<Path>,
        columns: Option<Vec<String>>,
        paginated: bool,
        defaults: SourceDefaults,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let columns = match columns {
            Some(columns) => columns,
            None => Self::discover_columns(&path).await?,
        };

        debug!(
            "Opened JSON Lines source {} with {} columns",
            path.display(),
            columns.len()
        );

        Ok(Self {
            path,
            columns,
            paginated,
            defaults,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_paginated(&self) -> bool {
        self.paginated
    }

    /// Sorted top-level keys of the first object in the file
    async fn discover_columns(path: &Path) -> Result<Vec<String>> {
        let mut lines = open_lines(path).await?;
        let mut line_no = 0;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if let Some(row) = parse_line(&line, line_no)? {
                let mut keys: Vec<String> = row.keys().cloned().collect();
                keys.sort();
                return Ok(keys);
            }
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl ExportSource for JsonLinesSource {
    type Row = JsonRow;

    fn headings(&self) -> Vec<String> {
        self.columns.clone()
    }

    async fn query(&self) -> Result<RowProvider<JsonRow>> {
        let lines = open_lines(&self.path).await?;
        if self.paginated {
            return Ok(RowProvider::Paginated(Box::new(JsonLinesPager::new(lines))));
        }

        let mut pager = JsonLinesPager::new(lines);
        let mut rows = Vec::new();
        while let Some(batch) = pager.next_batch(1024).await? {
            rows.extend(batch);
        }
        debug!("Loaded {} rows from {}", rows.len(), self.path.display());
        Ok(rows.into())
    }

    fn map(&self, row: &JsonRow) -> Result<Vec<Value>> {
        Ok(self
            .columns
            .iter()
            .map(|column| lookup(row, column).map_or(Value::Null, Value::from))
            .collect())
    }

    fn defaults(&self) -> SourceDefaults {
        self.defaults
    }
}

async fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>> {
    let file = File::open(path).await?;
    Ok(BufReader::new(file).lines())
}

/// Parse a line into an object; blank lines yield `None`
fn parse_line(line: &str, line_no: u64) -> Result<Option<JsonRow>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<JsonValue>(trimmed) {
        Ok(JsonValue::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(SourceError::msg(format!("line {line_no}: expected a JSON object")).into()),
        Err(e) => Err(SourceError::msg(format!("line {line_no}: {e}")).into()),
    }
}

/// Resolve a dot path; an exact key match wins over nesting
fn lookup<'a>(row: &'a JsonRow, column: &str) -> Option<&'a JsonValue> {
    if let Some(value) = row.get(column) {
        return Some(value);
    }

    let mut parts = column.split('.');
    let mut current = row.get(parts.next()?)?;
    for part in parts {
        current = match current {
            JsonValue::Object(map) => map.get(part)?,
            JsonValue::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Lazily reads batches of lines
struct JsonLinesPager {
    lines: Option<Lines<BufReader<File>>>,
    remaining: Option<usize>,
    line_no: u64,
}

impl JsonLinesPager {
    fn new(lines: Lines<BufReader<File>>) -> Self {
        Self {
            lines: Some(lines),
            remaining: None,
            line_no: 0,
        }
    }
}

#[async_trait]
impl Paginate<JsonRow> for JsonLinesPager {
    fn limit(&mut self, max_rows: usize) {
        self.remaining = Some(max_rows);
    }

    async fn next_batch(&mut self, size: usize) -> Result<Option<Vec<JsonRow>>> {
        let want = self.remaining.map_or(size, |r| size.min(r));
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };

        let mut batch = Vec::with_capacity(want);
        while batch.len() < want {
            let Some(line) = lines.next_line().await? else {
                break;
            };
            self.line_no += 1;
            if let Some(row) = parse_line(&line, self.line_no)? {
                batch.push(row);
            }
        }

        if batch.is_empty() {
            self.lines = None;
            return Ok(None);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= batch.len();
        }
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        self.lines = None;
        Ok(())
    }
}
