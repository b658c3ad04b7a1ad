//! The five stages of a CSV geocoding pipeline, leaves first.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use once_cell::sync::OnceCell;

use crate::application::use_cases::query_normalizer::validate_q;
use crate::domain::csv::{ColumnSeparator, LineSeparator, TextEncoding};
use crate::domain::error::{AppError, Result};
use crate::domain::query::{NormalizedQuery, QueryKey, QueryMode};
use crate::infrastructure::addok::{RowGeocoder, RowOutcome};
use crate::infrastructure::csv::{DecodingReader, RecordWriter, TextEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Geocode,
    Serialize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Geocode => "geocode",
            Stage::Serialize => "serialize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a running pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineError {
    pub stage: Stage,
    /// 1-based data row being processed, 0 for the header
    pub row: u64,
    pub source: AppError,
}

impl PipelineError {
    pub fn new(stage: Stage, row: u64, source: AppError) -> Self {
        Self { stage, row, source }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stage failed at row {}: {}",
            self.stage, self.row, self.source
        )
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// A record flowing between stages
#[derive(Debug, Clone)]
pub enum Record {
    Header(StringRecord),
    Row { number: u64, fields: StringRecord },
}

/// A row record after the geocode stage
#[derive(Debug, Clone)]
pub enum GeocodedRecord {
    Header(StringRecord),
    Row {
        number: u64,
        fields: StringRecord,
        outcome: RowOutcome,
    },
}

impl GeocodedRecord {
    pub fn number(&self) -> u64 {
        match self {
            GeocodedRecord::Header(_) => 0,
            GeocodedRecord::Row { number, .. } => *number,
        }
    }
}

/// Stage 1: bytes to text. Decoding is lossy and cannot fail.
pub struct DecodeStage;

impl DecodeStage {
    pub fn open(source: Bytes, encoding: TextEncoding) -> DecodingReader {
        DecodingReader::new(source, encoding)
    }
}

/// Stage 2: text to records. Nothing is read until the first `next()`.
pub struct ParseStage {
    records: StringRecordsIntoIter<DecodingReader>,
    emitted: u64,
}

impl ParseStage {
    pub fn new(text: DecodingReader, separator: ColumnSeparator) -> Self {
        let records = ReaderBuilder::new()
            .delimiter(separator.as_byte())
            .has_headers(false)
            .flexible(true)
            .from_reader(text)
            .into_records();

        Self {
            records,
            emitted: 0,
        }
    }
}

impl Iterator for ParseStage {
    type Item = std::result::Result<Record, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.records.next()?;
        let number = self.emitted;
        self.emitted += 1;

        Some(match item {
            Ok(fields) if number == 0 => Ok(Record::Header(fields)),
            Ok(fields) => Ok(Record::Row { number, fields }),
            Err(err) => Err(PipelineError::new(Stage::Parse, number, err.into())),
        })
    }
}

/// Stage 3: per-row lookup against the external geocoder.
pub struct GeocodeStage {
    geocoder: Arc<dyn RowGeocoder>,
    /// Columns joined into the query text; empty means all of them
    column_names: Vec<String>,
    /// Positions of `column_names` in the parsed header
    query_columns: OnceCell<Vec<usize>>,
    citycode: Option<String>,
    postcode: Option<String>,
}

impl GeocodeStage {
    /// `citycode` and `postcode` must already be validated.
    pub fn new(
        geocoder: Arc<dyn RowGeocoder>,
        column_names: Vec<String>,
        citycode: Option<String>,
        postcode: Option<String>,
    ) -> Self {
        Self {
            geocoder,
            column_names,
            query_columns: OnceCell::new(),
            citycode,
            postcode,
        }
    }

    /// Resolve the query columns against the parsed header. Must run before
    /// any row is processed; later headers are ignored.
    pub fn bind_header(&self, header: &StringRecord) {
        self.query_columns.get_or_init(|| {
            if self.column_names.is_empty() {
                return (0..header.len()).collect();
            }
            self.column_names
                .iter()
                .filter_map(|name| header.iter().position(|field| field.trim() == name))
                .collect()
        });
    }

    /// Text sent for a row: selected columns joined by a space.
    pub fn query_text(&self, fields: &StringRecord) -> String {
        let columns = self.query_columns.get().map(Vec::as_slice).unwrap_or_default();
        columns
            .iter()
            .filter_map(|&i| fields.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn process(
        &self,
        record: Record,
    ) -> std::result::Result<GeocodedRecord, PipelineError> {
        let (number, fields) = match record {
            Record::Header(header) => {
                self.bind_header(&header);
                return Ok(GeocodedRecord::Header(header));
            }
            Record::Row { number, fields } => (number, fields),
        };

        let outcome = self
            .lookup(&fields)
            .await
            .map_err(|err| PipelineError::new(Stage::Geocode, number, err))?;

        Ok(GeocodedRecord::Row {
            number,
            fields,
            outcome,
        })
    }

    async fn lookup(&self, fields: &StringRecord) -> Result<RowOutcome> {
        let q = match validate_q(&self.query_text(fields)) {
            Ok(q) => q,
            Err(_) => return Ok(RowOutcome::Skipped),
        };

        // Row text is data, not a query string: no placeholder rules apply.
        let mut params = BTreeMap::new();
        params.insert(QueryKey::Q, q);
        params.insert(QueryKey::Limit, "1".to_string());
        if let Some(citycode) = &self.citycode {
            params.insert(QueryKey::Citycode, citycode.clone());
        }
        if let Some(postcode) = &self.postcode {
            params.insert(QueryKey::Postcode, postcode.clone());
        }
        let query = NormalizedQuery::new(QueryMode::Geocode, params);

        self.geocoder.geocode_row(&query).await
    }
}

/// Stage 4: records back to delimited text.
pub struct SerializeStage {
    writer: RecordWriter,
    result_columns: Vec<String>,
    width: usize,
}

impl SerializeStage {
    pub fn new(
        column_separator: ColumnSeparator,
        line_separator: LineSeparator,
        result_columns: Vec<String>,
    ) -> Self {
        Self {
            writer: RecordWriter::new(column_separator, line_separator),
            result_columns,
            width: 0,
        }
    }

    pub fn apply(&mut self, record: GeocodedRecord) -> Result<String> {
        match record {
            GeocodedRecord::Header(header) => {
                self.width = header.len();
                let names: Vec<&str> = header
                    .iter()
                    .chain(self.result_columns.iter().map(String::as_str))
                    .collect();
                self.writer.write(names)
            }
            GeocodedRecord::Row {
                fields, outcome, ..
            } => {
                let mut values: Vec<String> = (0..self.width)
                    .map(|i| fields.get(i).unwrap_or_default().to_string())
                    .collect();
                values.extend(self.result_columns.iter().map(|c| outcome.field(c)));
                self.writer.write(values)
            }
        }
    }
}

/// Stage 5: text to bytes in the input's encoding.
pub struct EncodeStage {
    encoder: TextEncoder,
}

impl EncodeStage {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoder: TextEncoder::new(encoding),
        }
    }

    pub fn apply(&self, text: String) -> Bytes {
        self.encoder.encode(text)
    }
}
