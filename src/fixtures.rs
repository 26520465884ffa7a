//! A small STRF writer for tests and benchmarks.
//!
//! Production code only reads STRF; this module exists so test suites can
//! build files with exact, known contents (including deliberately broken ones).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::StripeError;
use crate::format::{
    ChunkEncoding, ChunkLayout, ColumnChunk, ColumnChunkEntry, ColumnSchema, ColumnStatistics,
    FileFooter, StreamCodec, StripeManifestEntry, FILE_FORMAT_VERSION, FILE_HEADER_LEN,
    FILE_MAGIC, STREAM_DATA, STREAM_DICTIONARY_DATA, STREAM_DICTIONARY_LENGTH, STREAM_LENGTH,
    STREAM_PRESENT,
};
use crate::kernels;
use crate::null_handling::pack_bits;
use crate::types::NativeKind;

const FIXTURE_ZSTD_LEVEL: i32 = 3;

/// A single cell. Integers, decimals (unscaled), timestamps (epoch millis) and
/// dates (epoch days) all use `Int`.
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
}

impl FixtureValue {
    pub fn str(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct FixtureColumn {
    pub name: String,
    pub native_kind: NativeKind,
    pub nullable: bool,
}

impl FixtureColumn {
    pub fn new(name: &str, native_kind: NativeKind) -> Self {
        Self {
            name: name.to_string(),
            native_kind,
            nullable: true,
        }
    }
}

/// One stripe worth of rows plus how to encode it.
#[derive(Debug, Clone)]
pub struct FixtureStripe {
    rows: Vec<Vec<FixtureValue>>,
    column_names: Option<Vec<String>>,
    encoding: ChunkEncoding,
    record_distinct_values: bool,
}

impl FixtureStripe {
    pub fn rows(rows: Vec<Vec<FixtureValue>>) -> Self {
        Self {
            rows,
            column_names: None,
            encoding: ChunkEncoding::default(),
            record_distinct_values: true,
        }
    }

    /// Builds a stripe from column-major data.
    pub fn columns(columns: Vec<Vec<FixtureValue>>) -> Self {
        let num_rows = columns.first().map_or(0, Vec::len);
        let rows = (0..num_rows)
            .map(|r| columns.iter().map(|c| c[r].clone()).collect())
            .collect();
        Self::rows(rows)
    }

    /// Overrides the column names written into this stripe's manifest entry.
    pub fn with_column_names(mut self, names: Vec<String>) -> Self {
        self.column_names = Some(names);
        self
    }

    /// Dictionary layout applies to string columns only.
    pub fn with_encoding(mut self, layout: ChunkLayout, codec: StreamCodec) -> Self {
        self.encoding = ChunkEncoding { layout, codec };
        self
    }

    /// Omits distinct value statistics, as writers that skip them do.
    pub fn without_distinct_values(mut self) -> Self {
        self.record_distinct_values = false;
        self
    }
}

/// A complete file under construction.
#[derive(Debug, Clone)]
pub struct FixtureFile {
    columns: Vec<FixtureColumn>,
    stripes: Vec<FixtureStripe>,
}

impl FixtureFile {
    pub fn new(columns: Vec<FixtureColumn>) -> Self {
        Self {
            columns,
            stripes: Vec::new(),
        }
    }

    pub fn stripe(mut self, stripe: FixtureStripe) -> Self {
        self.stripes.push(stripe);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StripeError> {
        let mut out = Vec::new();
        out.extend_from_slice(FILE_MAGIC);
        out.extend_from_slice(&FILE_FORMAT_VERSION.to_le_bytes());
        debug_assert_eq!(out.len() as u64, FILE_HEADER_LEN);

        let mut manifest = Vec::with_capacity(self.stripes.len());
        for stripe in &self.stripes {
            let stripe_offset = out.len() as u64;
            let mut entries = Vec::with_capacity(self.columns.len());
            for (idx, column) in self.columns.iter().enumerate() {
                let values: Vec<&FixtureValue> = stripe
                    .rows
                    .iter()
                    .map(|row| {
                        row.get(idx).ok_or_else(|| {
                            StripeError::InternalError(format!(
                                "fixture row has no value for column {}",
                                idx
                            ))
                        })
                    })
                    .collect::<Result<_, _>>()?;
                let (chunk, statistics) = encode_column(column, &values, stripe)?;
                let bytes = chunk.to_bytes()?;
                entries.push(ColumnChunkEntry {
                    column_idx: idx as u32,
                    offset_in_file: out.len() as u64,
                    size: bytes.len() as u64,
                    statistics,
                });
                out.extend_from_slice(&bytes);
            }
            manifest.push(StripeManifestEntry {
                offset: stripe_offset,
                length: out.len() as u64 - stripe_offset,
                num_rows: stripe.rows.len() as u64,
                column_names: stripe
                    .column_names
                    .clone()
                    .unwrap_or_else(|| self.columns.iter().map(|c| c.name.clone()).collect()),
                columns: entries,
            });
        }

        let footer = FileFooter {
            writer_version: format!("stripefile-fixtures {}", crate::VERSION),
            schema: self
                .columns
                .iter()
                .map(|c| ColumnSchema {
                    name: c.name.clone(),
                    native_kind: c.native_kind.clone(),
                    nullable: c.nullable,
                })
                .collect(),
            stripes: manifest,
        };
        let footer_bytes = serde_json::to_vec(&footer)?;
        out.extend_from_slice(&footer_bytes);
        out.extend_from_slice(&(footer_bytes.len() as u64).to_le_bytes());
        Ok(out)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), StripeError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

/// A five-column, three-stripe file modelled on a split-elimination sample:
/// `userid` (int64), `string1` (string), `subtype` (float64),
/// `decimal1` (decimal(10,2)) and `ts` (timestamp).
///
/// `string1` holds `zebra foo dog cat bar eat` spread over the stripes, with
/// the second stripe dictionary-encoded and the third zstd-compressed.
pub fn split_elim_file() -> FixtureFile {
    let row = |id: i64, s: Option<&str>, sub: f64, dec: i64, ts: i64| {
        vec![
            FixtureValue::Int(id),
            s.map_or(FixtureValue::Null, FixtureValue::str),
            FixtureValue::Float(sub),
            FixtureValue::Int(dec),
            FixtureValue::Int(ts),
        ]
    };
    FixtureFile::new(vec![
        FixtureColumn::new("userid", NativeKind::Int64),
        FixtureColumn::new("string1", NativeKind::String),
        FixtureColumn::new("subtype", NativeKind::Float64),
        FixtureColumn::new(
            "decimal1",
            NativeKind::Decimal {
                precision: 10,
                scale: 2,
            },
        ),
        FixtureColumn::new("ts", NativeKind::Timestamp),
    ])
    .stripe(FixtureStripe::rows(vec![
        row(2, Some("zebra"), 0.8, 1200, 1_349_000_000_000),
        row(100, Some("foo"), 0.8, -250, 1_349_000_001_000),
    ]))
    .stripe(
        FixtureStripe::rows(vec![
            row(13, Some("dog"), 0.8, 99, 1_349_000_002_000),
            row(29, None, f64::NAN, 0, 1_349_000_003_000),
            row(70, Some("cat"), 0.8, 1, 1_349_000_004_000),
            row(5, Some("dog"), 0.8, 12, 1_349_000_005_000),
        ])
        .with_encoding(ChunkLayout::Dictionary, StreamCodec::None),
    )
    .stripe(
        FixtureStripe::rows(vec![
            row(1, Some("bar"), 0.8, 7, 1_349_000_006_000),
            row(3, Some("eat"), 0.5, 100_000, 1_349_000_007_000),
            row(4, Some("foo"), 0.8, 5, 1_349_000_008_000),
        ])
        .with_encoding(ChunkLayout::Direct, StreamCodec::Zstd),
    )
}

/// Writes a file holding only the 6-byte header.
pub fn write_header_only(path: impl AsRef<Path>) -> Result<(), StripeError> {
    let mut out = Vec::with_capacity(FILE_HEADER_LEN as usize);
    out.extend_from_slice(FILE_MAGIC);
    out.extend_from_slice(&FILE_FORMAT_VERSION.to_le_bytes());
    std::fs::write(path, out)?;
    Ok(())
}

//==================================================================================
// Column encoding
//==================================================================================

fn encode_column(
    column: &FixtureColumn,
    values: &[&FixtureValue],
    stripe: &FixtureStripe,
) -> Result<(ColumnChunk, ColumnStatistics), StripeError> {
    let kind = &column.native_kind;
    let present: Vec<bool> = values.iter().map(|v| **v != FixtureValue::Null).collect();
    let valid: Vec<&FixtureValue> = values
        .iter()
        .copied()
        .filter(|v| **v != FixtureValue::Null)
        .collect();
    let null_count = (values.len() - valid.len()) as u64;

    let mismatch = |v: &FixtureValue| {
        StripeError::InternalError(format!("fixture value {:?} does not fit column {}", v, kind))
    };

    let layout = match kind {
        NativeKind::String => stripe.encoding.layout,
        _ => ChunkLayout::Direct,
    };
    let mut streams: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut distinct_values = None;

    if !matches!(kind, NativeKind::Unsupported { .. }) && null_count > 0 {
        streams.insert(STREAM_PRESENT.into(), pack_bits(&present));
    }

    match kind {
        k if k.is_varint() => {
            let ints = valid
                .iter()
                .map(|v| match v {
                    FixtureValue::Int(i) => Ok(*i),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            streams.insert(STREAM_DATA.into(), kernels::encode_signed_varints(&ints)?);
        }
        NativeKind::Float32 | NativeKind::Float64 => {
            let floats = valid
                .iter()
                .map(|v| match v {
                    FixtureValue::Float(f) => Ok(*f),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let data = if *kind == NativeKind::Float32 {
                let narrowed: Vec<f32> = floats.iter().map(|&f| f as f32).collect();
                kernels::bitcast::encode(&narrowed)
            } else {
                kernels::bitcast::encode(&floats)
            };
            streams.insert(STREAM_DATA.into(), data);
        }
        NativeKind::Boolean => {
            let bools = valid
                .iter()
                .map(|v| match v {
                    FixtureValue::Bool(b) => Ok(*b),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            streams.insert(STREAM_DATA.into(), pack_bits(&bools));
        }
        NativeKind::String | NativeKind::Binary => {
            let byte_values = valid
                .iter()
                .map(|v| match (kind, v) {
                    (NativeKind::String, FixtureValue::Str(s)) => Ok(s.as_bytes().to_vec()),
                    (NativeKind::Binary, FixtureValue::Bytes(b)) => Ok(b.clone()),
                    (_, other) => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>, _>>()?;

            if *kind == NativeKind::String && stripe.record_distinct_values {
                let distinct: BTreeSet<String> = byte_values
                    .iter()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .collect();
                distinct_values = Some(distinct.into_iter().collect());
            }

            match layout {
                ChunkLayout::Direct => {
                    let lengths: Vec<u64> = byte_values.iter().map(|b| b.len() as u64).collect();
                    streams.insert(
                        STREAM_LENGTH.into(),
                        kernels::encode_unsigned_varints(&lengths)?,
                    );
                    streams.insert(STREAM_DATA.into(), byte_values.concat());
                }
                ChunkLayout::Dictionary => {
                    let mut dictionary: Vec<&Vec<u8>> = Vec::new();
                    let mut indices = Vec::with_capacity(byte_values.len());
                    for value in &byte_values {
                        let idx = match dictionary.iter().position(|d| *d == value) {
                            Some(idx) => idx,
                            None => {
                                dictionary.push(value);
                                dictionary.len() - 1
                            }
                        };
                        indices.push(idx as u64);
                    }
                    let lengths: Vec<u64> = dictionary.iter().map(|d| d.len() as u64).collect();
                    let dictionary_data: Vec<u8> =
                        dictionary.iter().flat_map(|d| d.iter().copied()).collect();
                    streams.insert(
                        STREAM_DICTIONARY_LENGTH.into(),
                        kernels::encode_unsigned_varints(&lengths)?,
                    );
                    streams.insert(STREAM_DICTIONARY_DATA.into(), dictionary_data);
                    streams.insert(
                        STREAM_DATA.into(),
                        kernels::encode_unsigned_varints(&indices)?,
                    );
                }
            }
        }
        NativeKind::Unsupported { .. } => {}
        other => return Err(StripeError::InternalError(format!("unhandled kind {}", other))),
    }

    if stripe.encoding.codec == StreamCodec::Zstd {
        for payload in streams.values_mut() {
            *payload = kernels::zstd::encode(payload, FIXTURE_ZSTD_LEVEL)?;
        }
    }

    let encoding = ChunkEncoding {
        layout,
        codec: stripe.encoding.codec,
    };
    let chunk = ColumnChunk {
        total_rows: values.len() as u64,
        native_type: kind.chunk_type_name(),
        encoding_json: serde_json::to_string(&encoding)?,
        streams,
    };
    Ok((
        chunk,
        ColumnStatistics {
            null_count,
            distinct_values,
        },
    ))
}
