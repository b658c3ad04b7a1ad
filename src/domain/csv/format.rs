// ============================================================
// DETECTED FORMAT
// ============================================================
// Shape of an uploaded CSV file, inferred once from its raw bytes

use serde::{Deserialize, Serialize};

/// Text encodings the service knows how to decode and re-encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    /// Map a charset detector label onto a supported decoding.
    ///
    /// Unknown labels fall back to UTF-8.
    pub fn from_detector_label(label: Option<&str>) -> Self {
        match label.map(|l| l.to_ascii_lowercase()).as_deref() {
            Some("windows-1252") => TextEncoding::Latin1,
            Some("utf-8") | Some("ascii") => TextEncoding::Utf8,
            _ => TextEncoding::Utf8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::Latin1 => "latin1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSeparator {
    #[serde(rename = "CR")]
    Cr,
    #[serde(rename = "LF")]
    Lf,
    #[serde(rename = "CRLF")]
    CrLf,
}

impl LineSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineSeparator::Cr => "\r",
            LineSeparator::Lf => "\n",
            LineSeparator::CrLf => "\r\n",
        }
    }
}

/// Candidate field delimiters, in tie-break order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSeparator {
    #[serde(rename = ",")]
    Comma,
    #[serde(rename = ";")]
    Semicolon,
    #[serde(rename = "\t")]
    Tab,
    #[serde(rename = "|")]
    Pipe,
}

impl ColumnSeparator {
    pub const CANDIDATES: [ColumnSeparator; 4] = [
        ColumnSeparator::Comma,
        ColumnSeparator::Semicolon,
        ColumnSeparator::Tab,
        ColumnSeparator::Pipe,
    ];

    pub fn as_char(&self) -> char {
        match self {
            ColumnSeparator::Comma => ',',
            ColumnSeparator::Semicolon => ';',
            ColumnSeparator::Tab => '\t',
            ColumnSeparator::Pipe => '|',
        }
    }

    pub fn as_byte(&self) -> u8 {
        self.as_char() as u8
    }
}

impl Default for ColumnSeparator {
    fn default() -> Self {
        ColumnSeparator::Comma
    }
}

/// Format inferred from the first bytes of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFormat {
    pub encoding: TextEncoding,
    pub line_separator: LineSeparator,
    pub column_separator: ColumnSeparator,
    /// Header names in file order. Never empty, not necessarily unique.
    pub columns: Vec<String>,
}

impl DetectedFormat {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
