//! Defines the self-describing on-disk format for a single column chunk.
//! This module is the single source of truth for serialization, deserialization,
//! and efficient metadata peeking of a chunk.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use crate::error::StripeError;
use crate::format::{ChunkEncoding, StreamCodec, CHUNK_FORMAT_VERSION, CHUNK_MAGIC};
use crate::kernels;

//==================================================================================
// Format Constants
//==================================================================================
/// The minimum possible size of a valid chunk in bytes.
const MIN_CHUNK_SIZE: usize = 18; // magic(4) + ver(2) + rows(8) + header_len(4)
/// A reasonable limit to prevent OOM from malformed string lengths. (16MB)
const MAX_REASONABLE_STRING_LEN: usize = 16 * 1024 * 1024;

//==================================================================================
// Public Structs
//==================================================================================

/// The metadata extracted from a chunk header by [`ColumnChunk::peek_info`],
/// without reading any stream payloads.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ChunkHeaderInfo {
    pub format_version: u16,
    pub total_rows: u64,
    /// The native kind name, e.g. `Int64` or `Decimal(10,2)`.
    pub native_type: String,
    /// The encoding descriptor as a UTF-8 JSON string.
    pub encoding_json: String,
    /// `(stream name, size in bytes)`, sorted by name.
    pub stream_metadata: Vec<(String, usize)>,
    pub header_size: usize,
    pub data_size: usize,
}

/// A column chunk held fully in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChunk {
    pub total_rows: u64,
    pub native_type: String,
    pub encoding_json: String,
    /// Raw (possibly compressed) stream payloads keyed by stream name.
    pub streams: BTreeMap<String, Vec<u8>>,
}

//==================================================================================
// Core Implementation
//==================================================================================

impl ColumnChunk {
    /// Serializes the chunk into its canonical byte form. Streams are written
    /// in name order, so the output is deterministic.
    #[cfg(any(test, feature = "fixtures"))]
    pub fn to_bytes(&self) -> Result<Vec<u8>, StripeError> {
        let mut header = Vec::new();
        LenPrefix::U16.write(&mut header, &self.native_type)?;
        LenPrefix::U32.write(&mut header, &self.encoding_json)?;
        let stream_count = u16::try_from(self.streams.len()).map_err(|_| {
            StripeError::ChunkFormatError(format!("{} streams do not fit a chunk", self.streams.len()))
        })?;
        header.extend_from_slice(&stream_count.to_le_bytes());
        for (name, data) in &self.streams {
            LenPrefix::U16.write(&mut header, name)?;
            header.extend_from_slice(&(data.len() as u64).to_le_bytes());
        }

        let data_size: usize = self.streams.values().map(Vec::len).sum();
        let mut out = Vec::with_capacity(MIN_CHUNK_SIZE + header.len() + data_size);
        out.extend_from_slice(CHUNK_MAGIC);
        out.extend_from_slice(&CHUNK_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.total_rows.to_le_bytes());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        for data in self.streams.values() {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    /// Deserializes a full byte slice into a `ColumnChunk`, reading every
    /// stream payload into memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StripeError> {
        let info = Self::peek_info(bytes)?;

        // `peek_info` has already checked that every payload is in bounds.
        let mut at = info.header_size;
        let mut streams = BTreeMap::new();
        for (name, len) in info.stream_metadata {
            streams.insert(name, bytes[at..at + len].to_vec());
            at += len;
        }

        Ok(Self {
            total_rows: info.total_rows,
            native_type: info.native_type,
            encoding_json: info.encoding_json,
            streams,
        })
    }

    /// Reads a serialized chunk's header without touching the stream payloads.
    pub fn peek_info(bytes: &[u8]) -> Result<ChunkHeaderInfo, StripeError> {
        if bytes.len() < MIN_CHUNK_SIZE {
            return Err(StripeError::ChunkFormatError(format!(
                "chunk is {} bytes, the fixed prefix alone needs {}",
                bytes.len(),
                MIN_CHUNK_SIZE
            )));
        }

        // 1. Fixed prefix.
        let mut prefix = ChunkCursor::new(bytes);
        if prefix.take(4)? != CHUNK_MAGIC {
            return Err(StripeError::ChunkFormatError("invalid chunk magic".into()));
        }
        let format_version = prefix.u16()?;
        if format_version != CHUNK_FORMAT_VERSION {
            return Err(StripeError::ChunkFormatError(format!(
                "unsupported chunk version {} (expected {})",
                format_version, CHUNK_FORMAT_VERSION
            )));
        }
        let total_rows = prefix.u64()?;
        let header_len = prefix.u32()? as usize;
        let header_size = MIN_CHUNK_SIZE
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                StripeError::ChunkFormatError(format!(
                    "declared header of {} bytes runs past the chunk",
                    header_len
                ))
            })?;

        // 2. Variable header.
        let mut header = ChunkCursor::new(&bytes[MIN_CHUNK_SIZE..header_size]);
        let native_type = header.string(LenPrefix::U16)?;
        let encoding_json = header.string(LenPrefix::U32)?;
        let stream_count = header.u16()?;
        let mut stream_metadata = Vec::with_capacity(stream_count as usize);
        let mut data_size = 0usize;
        for _ in 0..stream_count {
            let name = header.string(LenPrefix::U16)?;
            let len = usize::try_from(header.u64()?).map_err(|_| {
                StripeError::ChunkFormatError(format!("stream '{}' is too large", name))
            })?;
            data_size = data_size.saturating_add(len);
            stream_metadata.push((name, len));
        }

        // 3. Payloads must fit.
        if header_size.saturating_add(data_size) > bytes.len() {
            return Err(StripeError::ChunkFormatError(format!(
                "streams declare {} bytes, only {} follow the header",
                data_size,
                bytes.len() - header_size
            )));
        }

        Ok(ChunkHeaderInfo {
            format_version,
            total_rows,
            native_type,
            encoding_json,
            stream_metadata,
            header_size,
            data_size,
        })
    }

    /// Parses the encoding descriptor.
    pub fn encoding(&self) -> Result<ChunkEncoding, StripeError> {
        serde_json::from_str(&self.encoding_json).map_err(|e| {
            StripeError::ChunkFormatError(format!("Invalid encoding descriptor: {}", e))
        })
    }

    /// Returns the payload of stream `name` with the chunk codec undone, or
    /// `None` if the chunk does not carry that stream.
    pub fn stream(&self, name: &str, codec: StreamCodec) -> Result<Option<Vec<u8>>, StripeError> {
        let Some(raw) = self.streams.get(name) else {
            return Ok(None);
        };
        match codec {
            StreamCodec::None => Ok(Some(raw.clone())),
            StreamCodec::Zstd => kernels::zstd::decode(raw).map(Some),
        }
    }

    /// Like [`Self::stream`], but the stream must exist.
    pub fn required_stream(&self, name: &str, codec: StreamCodec) -> Result<Vec<u8>, StripeError> {
        self.stream(name, codec)?.ok_or_else(|| {
            StripeError::ChunkFormatError(format!(
                "{} chunk is missing its '{}' stream",
                self.native_type, name
            ))
        })
    }
}

//==================================================================================
// Header Reading
//==================================================================================

/// Width of a string length prefix in the chunk header.
#[derive(Debug, Clone, Copy)]
enum LenPrefix {
    U16,
    U32,
}

impl LenPrefix {
    #[cfg(any(test, feature = "fixtures"))]
    fn write(self, out: &mut Vec<u8>, s: &str) -> Result<(), StripeError> {
        let too_long = || {
            StripeError::ChunkFormatError(format!("header string of {} bytes is too long", s.len()))
        };
        if s.len() > MAX_REASONABLE_STRING_LEN {
            return Err(too_long());
        }
        match self {
            LenPrefix::U16 => {
                let len = u16::try_from(s.len()).map_err(|_| too_long())?;
                out.extend_from_slice(&len.to_le_bytes());
            }
            LenPrefix::U32 => out.extend_from_slice(&(s.len() as u32).to_le_bytes()),
        }
        out.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

/// Little-endian reads over a chunk slice; every short read is a format error.
struct ChunkCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ChunkCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(bytes),
        }
    }

    fn take(&mut self, n: usize) -> Result<Vec<u8>, StripeError> {
        let mut buf = vec![0u8; n];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| StripeError::ChunkFormatError(format!("chunk header cut short: {}", e)))?;
        Ok(buf)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StripeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.take(N)?);
        Ok(buf)
    }

    fn u16(&mut self) -> Result<u16, StripeError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, StripeError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, StripeError> {
        self.array().map(u64::from_le_bytes)
    }

    fn string(&mut self, prefix: LenPrefix) -> Result<String, StripeError> {
        let len = match prefix {
            LenPrefix::U16 => self.u16()? as usize,
            LenPrefix::U32 => self.u32()? as usize,
        };
        if len > MAX_REASONABLE_STRING_LEN {
            return Err(StripeError::ChunkFormatError(format!(
                "header string of {} bytes exceeds the {} byte limit",
                len, MAX_REASONABLE_STRING_LEN
            )));
        }
        String::from_utf8(self.take(len)?)
            .map_err(|e| StripeError::ChunkFormatError(format!("header string is not UTF-8: {}", e)))
    }
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_chunk() -> ColumnChunk {
        let mut streams = BTreeMap::new();
        streams.insert("present".to_string(), vec![0b101]);
        streams.insert("data".to_string(), vec![2, 4]);

        ColumnChunk {
            total_rows: 3,
            native_type: "Int64".to_string(),
            encoding_json: r#"{"layout":"direct","codec":"none"}"#.to_string(),
            streams,
        }
    }

    #[test]
    fn test_chunk_roundtrip_is_successful() {
        let original = create_test_chunk();
        let bytes = original.to_bytes().unwrap();
        assert_eq!(ColumnChunk::from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn test_peek_info_is_correct() {
        let bytes = create_test_chunk().to_bytes().unwrap();
        let info = ColumnChunk::peek_info(&bytes).unwrap();

        assert_eq!(info.total_rows, 3);
        assert_eq!(info.native_type, "Int64");
        assert_eq!(info.data_size, 3);
        assert_eq!(info.header_size + info.data_size, bytes.len());
        assert_eq!(info.stream_metadata[0], ("data".to_string(), 2));
        assert_eq!(info.stream_metadata[1], ("present".to_string(), 1));
    }

    #[test]
    fn test_parsing_errors_are_handled_gracefully() {
        assert!(matches!(
            ColumnChunk::peek_info(b"short"),
            Err(StripeError::ChunkFormatError(_))
        ));
        assert!(matches!(
            ColumnChunk::peek_info(b"BAD_MAGIC_and_the_rest_is_long_enough"),
            Err(StripeError::ChunkFormatError(_))
        ));

        let mut bad_version = create_test_chunk().to_bytes().unwrap();
        bad_version[4] = 0xFF;
        bad_version[5] = 0xFF;
        assert!(matches!(
            ColumnChunk::peek_info(&bad_version),
            Err(StripeError::ChunkFormatError(_))
        ));

        let full = create_test_chunk().to_bytes().unwrap();
        assert!(matches!(
            ColumnChunk::from_bytes(&full[..full.len() - 1]),
            Err(StripeError::ChunkFormatError(_))
        ));
    }

    #[test]
    fn test_malformed_string_length_is_rejected() {
        let mut bytes = create_test_chunk().to_bytes().unwrap();
        bytes[18] = 0xFF;
        bytes[19] = 0xFF;
        assert!(matches!(
            ColumnChunk::peek_info(&bytes),
            Err(StripeError::ChunkFormatError(_))
        ));
    }

    #[test]
    fn test_streams_are_decoded_through_codec() {
        let mut chunk = create_test_chunk();
        let payload = vec![9u8; 40];
        chunk
            .streams
            .insert("data".into(), kernels::zstd::encode(&payload, 3).unwrap());
        assert_eq!(
            chunk.required_stream("data", StreamCodec::Zstd).unwrap(),
            payload
        );
        assert!(chunk.stream("length", StreamCodec::Zstd).unwrap().is_none());
        assert!(chunk.required_stream("length", StreamCodec::None).is_err());
    }
}
