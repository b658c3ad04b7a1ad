// ============================================================
// RECORD WRITER
// ============================================================
// Serialize row records back to delimited text

use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};

use crate::domain::csv::{ColumnSeparator, LineSeparator};
use crate::domain::error::{AppError, Result};

/// Serializes one record at a time, echoing the input delimiter and
/// terminator.
pub struct RecordWriter {
    builder: WriterBuilder,
    writer: Writer<Vec<u8>>,
}

impl RecordWriter {
    pub fn new(column_separator: ColumnSeparator, line_separator: LineSeparator) -> Self {
        let terminator = match line_separator {
            LineSeparator::CrLf => Terminator::CRLF,
            LineSeparator::Lf => Terminator::Any(b'\n'),
            LineSeparator::Cr => Terminator::Any(b'\r'),
        };

        let mut builder = WriterBuilder::new();
        builder
            .delimiter(column_separator.as_byte())
            .terminator(terminator)
            .quote_style(QuoteStyle::Necessary)
            .flexible(true);
        let writer = builder.from_writer(Vec::new());

        Self { builder, writer }
    }

    /// Serialize a record and hand back the text produced for it.
    pub fn write<I, T>(&mut self, fields: I) -> Result<String>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(fields)?;

        let fresh = self.builder.from_writer(Vec::new());
        let buffer = std::mem::replace(&mut self.writer, fresh)
            .into_inner()
            .map_err(|e| AppError::Internal(format!("Failed to flush row: {}", e.error())))?;
        String::from_utf8(buffer)
            .map_err(|e| AppError::Internal(format!("Serialized row is not UTF-8: {}", e)))
    }
}
