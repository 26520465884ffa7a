// In: src/format/mod.rs

//! Defines all on-disk structures and constants for the STRF format.
//! This is the single source of truth for both the file-level container format
//! and the individual column chunk format.
//!
//! ```text
//! file   := header stripe* footer_json footer_len:u64
//! header := b"STRF" version:u16
//! stripe := column_chunk*
//! ```

use serde::{Deserialize, Serialize};

use crate::types::NativeKind;

pub mod chunk;
pub mod reader;

pub use chunk::{ChunkHeaderInfo, ColumnChunk};
pub use reader::{ColumnDescriptor, FileMetadata, SourceFile, Stripe};

//==================================================================================
// I. File-Level Format
//==================================================================================

/// The magic number to identify the start of a STRF file.
pub const FILE_MAGIC: &[u8; 4] = b"STRF";
/// The current version of the STRF file format.
pub const FILE_FORMAT_VERSION: u16 = 1;
/// magic(4) + version(2)
pub const FILE_HEADER_LEN: u64 = 6;
/// The trailing little-endian `u64` holding the footer length.
pub const FOOTER_LEN_BYTES: u64 = 8;

/// One entry of the footer schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub native_kind: NativeKind,
    #[serde(default)]
    pub nullable: bool,
}

/// Statistics recorded per column chunk by the writer.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ColumnStatistics {
    #[serde(default)]
    pub null_count: u64,
    /// The distinct non-null values of a string column within this stripe.
    /// `None` when the writer did not record them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_values: Option<Vec<String>>,
}

/// Metadata for a single physical column chunk stored within a stripe.
/// Its `column_idx` links it to a logical column in the stripe's column list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ColumnChunkEntry {
    pub column_idx: u32,
    pub offset_in_file: u64,
    pub size: u64,
    #[serde(default)]
    pub statistics: ColumnStatistics,
}

/// A row group: a contiguous byte range holding one chunk per column.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StripeManifestEntry {
    pub offset: u64,
    pub length: u64,
    pub num_rows: u64,
    /// The column names this stripe was written with.
    pub column_names: Vec<String>,
    pub columns: Vec<ColumnChunkEntry>,
}

/// The file footer, containing the schema and the stripe manifest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileFooter {
    pub writer_version: String,
    pub schema: Vec<ColumnSchema>,
    pub stripes: Vec<StripeManifestEntry>,
}

//==================================================================================
// II. Chunk-Level Format
//==================================================================================

/// The magic number to identify an individual column chunk.
pub const CHUNK_MAGIC: &[u8; 4] = b"CHNK";
/// The version of the individual chunk format.
pub const CHUNK_FORMAT_VERSION: u16 = 1;

pub const STREAM_PRESENT: &str = "present";
pub const STREAM_DATA: &str = "data";
pub const STREAM_LENGTH: &str = "length";
pub const STREAM_DICTIONARY_LENGTH: &str = "dictionary_length";
pub const STREAM_DICTIONARY_DATA: &str = "dictionary_data";

/// How the values of a chunk are laid out.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkLayout {
    #[default]
    Direct,
    /// String chunks only: a per-chunk dictionary plus one index per valid row.
    Dictionary,
}

/// The codec applied to every stream of a chunk.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamCodec {
    #[default]
    None,
    Zstd,
}

/// The encoding descriptor stored as JSON in each chunk header.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkEncoding {
    #[serde(default)]
    pub layout: ChunkLayout,
    #[serde(default)]
    pub codec: StreamCodec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footer_json_contract() {
        let json = r#"{
            "writer_version": "test",
            "schema": [{"name": "userid", "type": {"kind": "int64"}, "nullable": true}],
            "stripes": [{
                "offset": 6, "length": 40, "num_rows": 3,
                "column_names": ["userid"],
                "columns": [{"column_idx": 0, "offset_in_file": 6, "size": 40,
                             "statistics": {"null_count": 1}}]
            }]
        }"#;
        let footer: FileFooter = serde_json::from_str(json).unwrap();
        assert_eq!(footer.schema[0].native_kind, NativeKind::Int64);
        assert_eq!(footer.stripes[0].columns[0].statistics.null_count, 1);
        assert!(footer.stripes[0].columns[0].statistics.distinct_values.is_none());
    }

    #[test]
    fn test_encoding_defaults() {
        let enc: ChunkEncoding = serde_json::from_str("{}").unwrap();
        assert_eq!(enc, ChunkEncoding::default());
        let enc: ChunkEncoding =
            serde_json::from_str(r#"{"layout":"dictionary","codec":"zstd"}"#).unwrap();
        assert_eq!(enc.layout, ChunkLayout::Dictionary);
        assert_eq!(enc.codec, StreamCodec::Zstd);
    }
}
