// ============================================================
// FORMAT SNIFFER
// ============================================================
// Infer encoding, line terminator and delimiter from raw bytes

use chardetng::EncodingDetector;

use crate::domain::csv::{ColumnSeparator, DetectedFormat, LineSeparator, TextEncoding};
use crate::domain::error::{AppError, Result};

use super::codec::decode_prefix;

/// Upper bound on the bytes inspected, whatever the upload size
pub const SNIFF_LIMIT: usize = 1024 * 1024;

const CR: &str = "\r";
const LF: &str = "\n";
const CRLF: &str = "\r\n";

/// Format sniffer over an in-memory upload
pub struct FormatSniffer;

impl FormatSniffer {
    /// Detect the format of `buffer` from its first megabyte.
    pub fn detect(buffer: &[u8]) -> Result<DetectedFormat> {
        let prefix = &buffer[..buffer.len().min(SNIFF_LIMIT)];

        let encoding = Self::detect_encoding(prefix);
        let text = decode_prefix(prefix, encoding);

        let line_separator = Self::detect_line_separator(&text)?;
        let first_line = match text.find(line_separator.as_str()) {
            Some(end) => &text[..end],
            None => text.as_ref(),
        };

        let column_separator = Self::detect_column_separator(first_line);
        let columns = first_line
            .split(column_separator.as_char())
            .map(clean_column_name)
            .collect();

        Ok(DetectedFormat {
            encoding,
            line_separator,
            column_separator,
            columns,
        })
    }

    /// Run the statistical detector and map its label onto a decoding.
    pub fn detect_encoding(prefix: &[u8]) -> TextEncoding {
        TextEncoding::from_detector_label(Self::detector_label(prefix).as_deref())
    }

    fn detector_label(prefix: &[u8]) -> Option<String> {
        if prefix.is_empty() {
            return None;
        }
        if prefix.is_ascii() {
            return Some("ascii".to_string());
        }

        let mut detector = EncodingDetector::new();
        detector.feed(prefix, prefix.len() < SNIFF_LIMIT);
        Some(detector.guess(None, true).name().to_ascii_lowercase())
    }

    /// First terminator in `text`. A CRLF is never read as a lone CR.
    pub fn detect_line_separator(text: &str) -> Result<LineSeparator> {
        let cr = text.find(CR);
        let lf = text.find(LF);
        let crlf = text.find(CRLF);

        if let Some(crlf) = crlf {
            if lf.map_or(true, |lf| crlf <= lf) && cr.map_or(true, |cr| crlf <= cr) {
                return Ok(LineSeparator::CrLf);
            }
        }

        match (cr, lf) {
            (Some(cr), Some(lf)) if cr <= lf => Ok(LineSeparator::Cr),
            (Some(_), Some(_)) => Ok(LineSeparator::Lf),
            (Some(_), None) => Ok(LineSeparator::Cr),
            (None, Some(_)) => Ok(LineSeparator::Lf),
            (None, None) => Err(AppError::Format(
                "Unable to detect line separator".to_string(),
            )),
        }
    }

    /// Most frequent candidate in the header line, comma when none occurs.
    pub fn detect_column_separator(first_line: &str) -> ColumnSeparator {
        let mut best = ColumnSeparator::default();
        let mut best_count = 0;

        for candidate in ColumnSeparator::CANDIDATES {
            let count = first_line.matches(candidate.as_char()).count();
            if count > best_count {
                best = candidate;
                best_count = count;
            }
        }

        best
    }
}

fn clean_column_name(raw: &str) -> String {
    let name = raw.trim();
    let name = name
        .strip_prefix(|c| c == '"' || c == '\'')
        .unwrap_or(name);
    let name = name
        .strip_suffix(|c| c == '"' || c == '\'')
        .unwrap_or(name);
    name.trim().to_string()
}
