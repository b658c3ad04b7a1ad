// ============================================================
// CSV INFRASTRUCTURE LAYER
// ============================================================
// Format sniffing, text codecs and record serialization

mod codec;
mod record_writer;
mod sniffer;

pub use codec::{decode_prefix, DecodingReader, TextDecoder, TextEncoder, DECODE_CHUNK_SIZE};
pub use record_writer::RecordWriter;
pub use sniffer::{FormatSniffer, SNIFF_LIMIT};
