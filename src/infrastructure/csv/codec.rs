// ============================================================
// TEXT CODEC
// ============================================================
// Incremental decode/encode between upload bytes and UTF-8 text

use std::borrow::Cow;
use std::io::{self, Read};

use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, UTF_8};

use crate::domain::csv::TextEncoding;

/// Bytes fed to the decoder per read
pub const DECODE_CHUNK_SIZE: usize = 64 * 1024;

const LATIN1_REPLACEMENT: u8 = b'?';

/// One-shot decode of a sniffing prefix. A UTF-8 BOM is dropped.
pub fn decode_prefix(bytes: &[u8], encoding: TextEncoding) -> Cow<'_, str> {
    match encoding {
        TextEncoding::Utf8 => UTF_8.decode_with_bom_removal(bytes).0,
        TextEncoding::Latin1 => encoding_rs::mem::decode_latin1(bytes),
    }
}

/// Stateful decoder; multi-byte sequences may straddle chunks.
pub struct TextDecoder {
    inner: Option<Decoder>,
}

impl TextDecoder {
    pub fn new(encoding: TextEncoding) -> Self {
        let inner = match encoding {
            TextEncoding::Utf8 => Some(UTF_8.new_decoder_with_bom_removal()),
            TextEncoding::Latin1 => None,
        };
        Self { inner }
    }

    /// Decode `src`, appending to `dst`. Set `last` on the final chunk so a
    /// dangling partial sequence is flushed as U+FFFD.
    pub fn decode(&mut self, src: &[u8], dst: &mut String, last: bool) {
        let decoder = match self.inner.as_mut() {
            Some(decoder) => decoder,
            None => {
                dst.push_str(&encoding_rs::mem::decode_latin1(src));
                return;
            }
        };

        let mut remaining = src;
        loop {
            let needed = decoder
                .max_utf8_buffer_length(remaining.len())
                .unwrap_or(remaining.len() * 3 + 16);
            dst.reserve(needed);

            let (result, read, _) = decoder.decode_to_string(remaining, dst, last);
            remaining = &remaining[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }
}

/// Encoder for serialized output text
#[derive(Debug, Clone, Copy)]
pub struct TextEncoder {
    encoding: TextEncoding,
}

impl TextEncoder {
    pub fn new(encoding: TextEncoding) -> Self {
        Self { encoding }
    }

    /// Characters above U+00FF have no Latin-1 byte and become `?`.
    pub fn encode(&self, text: String) -> Bytes {
        match self.encoding {
            TextEncoding::Utf8 => Bytes::from(text),
            TextEncoding::Latin1 if text.is_ascii() => Bytes::from(text),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(c).unwrap_or(LATIN1_REPLACEMENT))
                .collect::<Vec<u8>>()
                .into(),
        }
    }
}

/// `Read` adapter yielding UTF-8 text from an encoded upload, one chunk at
/// a time.
pub struct DecodingReader {
    source: Bytes,
    decoder: TextDecoder,
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
}

impl DecodingReader {
    pub fn new(source: Bytes, encoding: TextEncoding) -> Self {
        Self {
            source,
            decoder: TextDecoder::new(encoding),
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        }
    }

    fn refill(&mut self) {
        let take = self.source.len().min(DECODE_CHUNK_SIZE);
        let chunk = self.source.split_to(take);
        let last = self.source.is_empty();

        let mut text = String::new();
        self.decoder.decode(&chunk, &mut text, last);

        self.pending = text.into_bytes();
        self.pending_pos = 0;
        self.finished = last;
    }
}

impl Read for DecodingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending_pos >= self.pending.len() {
            if self.finished {
                return Ok(0);
            }
            self.refill();
        }

        let available = &self.pending[self.pending_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        Ok(n)
    }
}
