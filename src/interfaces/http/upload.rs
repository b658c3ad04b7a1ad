use actix_multipart::{Field, Multipart};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::domain::csv::GeocodeCsvOptions;
use crate::domain::error::{AppError, Result};

/// The `data` field of a CSV geocoding request
#[derive(Debug)]
pub struct UploadedFile {
    pub name: Option<String>,
    pub bytes: Bytes,
}

/// A fully read `multipart/form-data` body for `POST /search/csv`
#[derive(Debug, Default)]
pub struct CsvUpload {
    pub file: Option<UploadedFile>,
    pub options: GeocodeCsvOptions,
}

impl CsvUpload {
    /// Drain the multipart payload. The file may not exceed `max_bytes`;
    /// unknown fields are ignored.
    pub async fn read(mut payload: Multipart, max_bytes: usize) -> Result<Self> {
        let mut upload = CsvUpload::default();

        while let Some(item) = payload.next().await {
            let field = item.map_err(multipart_error)?;
            let disposition = field.content_disposition();
            let name = disposition.get_name().unwrap_or_default().to_string();
            let filename = disposition.get_filename().map(str::to_string);

            match name.as_str() {
                "data" => {
                    let bytes = read_field(field, max_bytes).await?;
                    upload.file = Some(UploadedFile {
                        name: filename,
                        bytes,
                    });
                }
                "columns" => upload.options.columns.push(read_text(field).await?),
                "result_columns" => upload.options.result_columns.push(read_text(field).await?),
                "citycode" => upload.options.citycode = non_empty(read_text(field).await?),
                "postcode" => upload.options.postcode = non_empty(read_text(field).await?),
                _ => {
                    read_field(field, max_bytes).await?;
                }
            }
        }

        Ok(upload)
    }
}

async fn read_field(mut field: Field, max_bytes: usize) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(multipart_error)?;
        if buffer.len() + chunk.len() > max_bytes {
            return Err(AppError::validation(format!(
                "Uploaded file is too large (max {} bytes)",
                max_bytes
            )));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// Text fields are small; 64 KiB is plenty for a column name or a code.
async fn read_text(field: Field) -> Result<String> {
    let bytes = read_field(field, 64 * 1024).await?;
    String::from_utf8(bytes.to_vec())
        .map(|s| s.trim().to_string())
        .map_err(|_| AppError::validation("Form fields must be valid UTF-8"))
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn multipart_error(err: actix_multipart::MultipartError) -> AppError {
    AppError::validation(format!("Invalid multipart payload: {}", err))
}
