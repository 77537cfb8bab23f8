//! CSV encoder for export operations
//!
//! This module turns rows of [`Value`]s into CSV records and writes them to a
//! [`Sink`], with an optional UTF-8 byte-order mark in front.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::sink::Sink;
use super::value::Value;

/// UTF-8 byte-order mark
pub const UTF8_BOM: &[u8; 3] = b"\xEF\xBB\xBF";

/// Record separator written after each row
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    #[default]
    Lf,
    CrLf,
}

impl LineTerminator {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineTerminator::Lf => b"\n",
            LineTerminator::CrLf => b"\r\n",
        }
    }
}

/// Delimiter / enclosure / escape policy
///
/// All three characters are single ASCII bytes, so they can be matched
/// byte-wise inside UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvDialect {
    pub delimiter: u8,
    pub enclosure: u8,
    /// `None` disables escaping; only enclosure doubling is applied.
    pub escape: Option<u8>,
    pub terminator: LineTerminator,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            enclosure: b'"',
            escape: Some(b'\\'),
            terminator: LineTerminator::Lf,
        }
    }
}

impl CsvDialect {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_enclosure(mut self, enclosure: u8) -> Self {
        self.enclosure = enclosure;
        self
    }

    pub fn with_escape(mut self, escape: Option<u8>) -> Self {
        self.escape = escape;
        self
    }

    pub fn with_terminator(mut self, terminator: LineTerminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Check that the policy can produce unambiguous output
    pub fn validate(&self) -> Result<()> {
        for (field, byte) in [("delimiter", self.delimiter), ("enclosure", self.enclosure)]
            .into_iter()
            .chain(self.escape.map(|e| ("escape", e)))
        {
            if !byte.is_ascii() || byte == b'\n' || byte == b'\r' {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: (byte as char).escape_default().to_string(),
                }
                .into());
            }
        }

        if self.delimiter == self.enclosure || self.escape == Some(self.delimiter) {
            return Err(ConfigError::InvalidValue {
                field: "delimiter".to_string(),
                value: (self.delimiter as char).to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Whether a field must be wrapped in enclosure characters
    fn needs_enclosure(&self, field: &[u8]) -> bool {
        field.iter().any(|&b| {
            b == self.delimiter
                || b == self.enclosure
                || b == b'\n'
                || b == b'\r'
                || Some(b) == self.escape
        })
    }

    /// Append one escaped field to `out`
    pub fn push_field(&self, field: &str, out: &mut Vec<u8>) {
        let bytes = field.as_bytes();
        if !self.needs_enclosure(bytes) {
            out.extend_from_slice(bytes);
            return;
        }

        out.push(self.enclosure);
        for &b in bytes {
            if b == self.enclosure {
                out.push(self.enclosure);
            } else if Some(b) == self.escape {
                out.push(b);
            }
            out.push(b);
        }
        out.push(self.enclosure);
    }

    /// Encode a complete record, terminator included.
    ///
    /// `None` entries are written as empty, unquoted fields.
    pub fn encode_record<'a, I>(&self, fields: I) -> Vec<u8>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut out = Vec::new();
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                out.push(self.delimiter);
            }
            if let Some(text) = field {
                self.push_field(text, &mut out);
            }
        }
        out.extend_from_slice(self.terminator.as_bytes());
        out
    }

    /// Encode a row of values
    pub fn encode_row(&self, values: &[Value]) -> Vec<u8> {
        let fields: Vec<_> = values.iter().map(Value::as_field).collect();
        self.encode_record(fields.iter().map(|f| f.as_deref()))
    }
}

/// Streaming CSV encoder bound to one sink
///
/// Rows are encoded one at a time and handed straight to the sink; the only
/// buffering is whatever the sink's writer provides.
#[derive(Debug)]
pub struct CsvEncoder {
    sink: Sink,
    dialect: CsvDialect,
    rows_written: u64,
}

impl CsvEncoder {
    /// Create a new encoder
    ///
    /// # Arguments
    /// * `sink` - Open sink; the encoder takes ownership and closes it
    /// * `dialect` - Delimiter / enclosure / escape policy
    ///
    /// # Returns
    /// * `Result<Self>` - Encoder, or a configuration error for a closed sink
    pub fn new(sink: Sink, dialect: CsvDialect) -> Result<Self> {
        if sink.is_closed() {
            return Err(ConfigError::SinkClosed.into());
        }

        Ok(Self {
            sink,
            dialect,
            rows_written: 0,
        })
    }

    /// Write the 3-byte UTF-8 BOM; no-op once the sink is closed
    pub async fn write_bom(&mut self) -> Result<()> {
        self.sink.write_all(UTF8_BOM).await?;
        Ok(())
    }

    /// Write the heading row
    pub async fn write_headings(&mut self, headings: &[String]) -> Result<()> {
        let record = self
            .dialect
            .encode_record(headings.iter().map(|h| Some(h.as_str())));
        self.sink.write_all(&record).await?;
        debug!("Wrote CSV headings: {} fields", headings.len());
        Ok(())
    }

    /// Write one data row
    pub async fn write_row(&mut self, values: &[Value]) -> Result<()> {
        if self.sink.is_closed() {
            return Ok(());
        }
        let record = self.dialect.encode_row(values);
        self.sink.write_all(&record).await?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flush and release the sink; calling twice is safe
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    /// Number of data rows written (headings excluded)
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.sink.bytes_written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::sink::SharedBuffer;

    fn escape(value: &str) -> String {
        let mut out = Vec::new();
        CsvDialect::default().push_field(value, &mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_csv_escape_value() {
        assert_eq!(escape("simple"), "simple");
        assert_eq!(escape("with,comma"), "\"with,comma\"");
        assert_eq!(escape("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape("with\nnewline"), "\"with\nnewline\"");
        assert_eq!(escape("with\rreturn"), "\"with\rreturn\"");
        assert_eq!(escape("C:\\temp"), "\"C:\\\\temp\"");
        assert_eq!(escape(""), "");
    }

    #[test]
    fn test_null_is_empty_unquoted() {
        let row = CsvDialect::default().encode_row(&[
            Value::from("a"),
            Value::Null,
            Value::from(""),
            Value::from(3),
        ]);
        assert_eq!(row, b"a,,,3\n");
    }

    #[test]
    fn test_custom_dialect() {
        let dialect = CsvDialect::default()
            .with_delimiter(b';')
            .with_enclosure(b'\'')
            .with_escape(None)
            .with_terminator(LineTerminator::CrLf);

        let row = dialect.encode_row(&[
            Value::from("a;b"),
            Value::from("it's"),
            Value::from("x,y"),
            Value::from("back\\slash"),
        ]);
        assert_eq!(row, b"'a;b';'it''s';x,y;back\\slash\r\n");
    }

    #[test]
    fn test_dialect_validation() {
        assert!(CsvDialect::default().validate().is_ok());
        assert!(CsvDialect::default().with_delimiter(b'"').validate().is_err());
        assert!(CsvDialect::default().with_delimiter(b'\n').validate().is_err());
        assert!(
            CsvDialect::default()
                .with_delimiter(b'\\')
                .validate()
                .is_err()
        );
        assert!(CsvDialect::default().with_escape(None).validate().is_ok());
    }

    #[test]
    fn test_round_trip_with_standard_reader() {
        let values = vec![
            "plain".to_string(),
            "has,delimiter".to_string(),
            "has \"quotes\" inside".to_string(),
            "multi\nline".to_string(),
            "path\\to\\file".to_string(),
        ];
        let row: Vec<Value> = values.iter().map(Value::from).collect();
        let encoded = CsvDialect::default().encode_row(&row);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b',')
            .quote(b'"')
            .escape(Some(b'\\'))
            .from_reader(encoded.as_slice());
        let record = reader.records().next().unwrap().unwrap();
        let decoded: Vec<String> = record.iter().map(str::to_string).collect();

        assert_eq!(decoded, values);
    }

    #[tokio::test]
    async fn test_encoder_writes_bom_and_rows() {
        let buffer = SharedBuffer::new();
        let mut encoder =
            CsvEncoder::new(Sink::new(buffer.clone(), "buffer"), CsvDialect::default()).unwrap();

        encoder.write_bom().await.unwrap();
        encoder
            .write_headings(&["name".to_string(), "age".to_string()])
            .await
            .unwrap();
        encoder
            .write_row(&[Value::from("Alice"), Value::from(30)])
            .await
            .unwrap();
        encoder.close().await.unwrap();
        encoder.close().await.unwrap();

        assert_eq!(encoder.rows_written(), 1);
        assert_eq!(buffer.contents(), b"\xEF\xBB\xBFname,age\nAlice,30\n");
    }

    #[tokio::test]
    async fn test_encoder_rejects_closed_sink() {
        let mut sink = Sink::new(SharedBuffer::new(), "buffer");
        sink.close().await.unwrap();

        let err = CsvEncoder::new(sink, CsvDialect::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ExportError::Config(ConfigError::SinkClosed)
        ));
    }

    #[tokio::test]
    async fn test_bom_after_close_is_noop() {
        let buffer = SharedBuffer::new();
        let mut encoder =
            CsvEncoder::new(Sink::new(buffer.clone(), "buffer"), CsvDialect::default()).unwrap();
        encoder.close().await.unwrap();
        encoder.write_bom().await.unwrap();
        encoder.write_row(&[Value::from(1)]).await.unwrap();

        assert!(buffer.contents().is_empty());
        assert_eq!(encoder.rows_written(), 0);
    }
}
