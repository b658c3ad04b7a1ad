//! Batch CSV geocoding.
//!
//! [`GeocodeCsvUseCase::build`] sniffs the upload, validates the options and
//! wires decode → parse → geocode → serialize → encode into one
//! [`PipelineStream`]. All validation happens before any stage runs; once
//! running, the stream reports failures through [`PipelineError`] items and
//! the paired [`PipelineMonitor`].

mod running;
mod stages;

use std::sync::Arc;

use bytes::Bytes;
use futures::future::{self, Either};
use futures::stream::{self, StreamExt};

use crate::application::use_cases::query_normalizer::{validate_citycode, validate_postcode};
use crate::domain::csv::{DetectedFormat, GeocodeCsvOptions};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::addok::RowGeocoder;
use crate::infrastructure::csv::FormatSniffer;

pub use stages::{
    DecodeStage, EncodeStage, GeocodeStage, GeocodedRecord, ParseStage, PipelineError, Record,
    SerializeStage, Stage,
};
pub use running::{PipelineMonitor, PipelineOutcome, PipelineStream};

use running::Chunk;

pub struct GeocodeCsvUseCase {
    geocoder: Arc<dyn RowGeocoder>,
    concurrency: usize,
}

impl GeocodeCsvUseCase {
    pub fn new(geocoder: Arc<dyn RowGeocoder>, concurrency: usize) -> Self {
        Self {
            geocoder,
            concurrency: concurrency.max(1),
        }
    }

    /// Validate and wire a pipeline for `buffer`. Nothing past the sniffing
    /// prefix is read until the returned pipeline is polled.
    pub fn build(&self, buffer: Bytes, options: GeocodeCsvOptions) -> Result<Pipeline> {
        let format = FormatSniffer::detect(&buffer)?;

        if options.columns.iter().any(|c| !format.has_column(c)) {
            return Err(AppError::validation(
                "At least one given column name is unknown",
            ));
        }
        if options.unknown_result_column().is_some() {
            return Err(AppError::validation(
                "At least one given result column name is unknown",
            ));
        }
        let citycode = options.citycode.as_deref().map(validate_citycode).transpose()?;
        let postcode = options.postcode.as_deref().map(validate_postcode).transpose()?;

        let text = DecodeStage::open(buffer, format.encoding);
        let parse = ParseStage::new(text, format.column_separator);
        let geocode = GeocodeStage::new(
            self.geocoder.clone(),
            options.columns.clone(),
            citycode,
            postcode,
        );
        let serialize = SerializeStage::new(
            format.column_separator,
            format.line_separator,
            options.effective_result_columns(),
        );
        let encode = EncodeStage::new(format.encoding);

        Ok(Pipeline {
            format,
            parse,
            geocode,
            serialize,
            encode,
            concurrency: self.concurrency,
        })
    }
}

/// A wired, not yet running, pipeline
pub struct Pipeline {
    format: DetectedFormat,
    parse: ParseStage,
    geocode: GeocodeStage,
    serialize: SerializeStage,
    encode: EncodeStage,
    concurrency: usize,
}

impl Pipeline {
    pub fn format(&self) -> &DetectedFormat {
        &self.format
    }

    /// Start the pipeline. At most `concurrency` rows are looked up at once
    /// and output keeps input order.
    pub fn run(self) -> (PipelineStream, PipelineMonitor) {
        let Pipeline {
            parse,
            geocode,
            mut serialize,
            encode,
            concurrency,
            ..
        } = self;
        let geocode = Arc::new(geocode);

        let chunks = stream::iter(parse)
            .map(move |record| match record {
                Ok(record) => {
                    // Rows are looked up concurrently; resolve columns first.
                    if let Record::Header(header) = &record {
                        geocode.bind_header(header);
                    }
                    let geocode = geocode.clone();
                    Either::Left(async move { geocode.process(record).await })
                }
                Err(err) => Either::Right(future::ready(Err(err))),
            })
            .buffered(concurrency)
            .map(move |record| -> std::result::Result<Chunk, PipelineError> {
                let record = record?;
                let row = record.number();
                let text = serialize
                    .apply(record)
                    .map_err(|err| PipelineError::new(Stage::Serialize, row, err))?;
                Ok(Chunk {
                    bytes: encode.apply(text),
                    is_row: row > 0,
                })
            })
            .scan(false, |failed, chunk: std::result::Result<Chunk, PipelineError>| {
                if *failed {
                    return future::ready(None);
                }
                *failed = chunk.is_err();
                future::ready(Some(chunk))
            })
            .boxed();

        PipelineStream::new(chunks)
    }
}
