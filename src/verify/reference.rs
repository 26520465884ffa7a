//! The reference decode path.
//!
//! A deliberately plain, single-threaded reader: it walks the footer as an
//! untyped `serde_json::Value`, parses chunk headers and streams by hand and
//! produces one row-ordered value vector per column. It shares no stream
//! decoding, type resolution or domain code with the decode job.

use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeDelta};
use serde_json::Value;

use crate::error::StripeError;

const MAGIC: &[u8; 4] = b"STRF";
const CHUNK_MAGIC: &[u8; 4] = b"CHNK";
const HEADER_LEN: usize = 6;
const TRAILER_LEN: usize = 8;
const ZSTD_PREFIX_LEN: usize = 8;

/// One cell as the reference path sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceValue {
    Missing,
    /// Integers, booleans (0/1), timestamps and dates (epoch millis).
    Int(i64),
    /// Floats and decimals.
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ReferenceColumn {
    pub name: String,
    /// The footer's `kind` tag, e.g. `int64` or `decimal`.
    pub kind: String,
    pub values: Vec<ReferenceValue>,
}

#[derive(Debug, Clone)]
pub struct ReferenceTable {
    pub columns: Vec<ReferenceColumn>,
    pub num_rows: usize,
}

/// What the reference path could make of a file.
#[derive(Debug, Clone)]
pub enum ReferenceRead {
    Usable(ReferenceTable),
    /// The file cannot serve as a reference; the string says why.
    Unusable(String),
}

impl ReferenceRead {
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Usable(_))
    }
}

/// Reads `path` along the reference path.
///
/// Only filesystem failures are errors. Everything the bytes get wrong is
/// reported as [`ReferenceRead::Unusable`].
pub fn read_reference(path: &Path) -> Result<ReferenceRead, StripeError> {
    let bytes = std::fs::read(path).map_err(|e| StripeError::from_io(path, e))?;
    Ok(match read_table(&bytes) {
        Ok(table) if table.columns.is_empty() && table.num_rows == 0 => {
            ReferenceRead::Unusable("no column or row data".into())
        }
        Ok(table) => ReferenceRead::Usable(table),
        Err(reason) => {
            log::debug!("Reference read of {} unusable: {}", path.display(), reason);
            ReferenceRead::Unusable(reason)
        }
    })
}

//==================================================================================
// 1. Footer navigation
//==================================================================================

struct FooterColumn {
    name: String,
    kind: String,
    scale: u32,
}

fn read_table(bytes: &[u8]) -> Result<ReferenceTable, String> {
    // 1. Header.
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err("not an STRF file".into());
    }
    if u16::from_le_bytes([bytes[4], bytes[5]]) != 1 {
        return Err("unknown file version".into());
    }
    if bytes.len() == HEADER_LEN {
        return Ok(ReferenceTable {
            columns: Vec::new(),
            num_rows: 0,
        });
    }

    // 2. Footer.
    if bytes.len() < HEADER_LEN + TRAILER_LEN {
        return Err("truncated footer length".into());
    }
    let trailer_at = bytes.len() - TRAILER_LEN;
    let footer_len = usize::try_from(read_u64(bytes, trailer_at)?)
        .map_err(|_| "footer length overflows".to_string())?;
    let footer_at = trailer_at
        .checked_sub(footer_len)
        .filter(|&at| at >= HEADER_LEN)
        .ok_or("footer length exceeds the file")?;
    let footer: Value = serde_json::from_slice(&bytes[footer_at..trailer_at])
        .map_err(|e| format!("unreadable footer: {e}"))?;

    // 3. Schema.
    let schema = footer
        .get("schema")
        .and_then(Value::as_array)
        .ok_or("footer has no schema")?;
    let columns = schema
        .iter()
        .map(|entry| -> Result<FooterColumn, String> {
            let name = entry.get("name").and_then(Value::as_str).ok_or("unnamed column")?;
            let ty = entry.get("type").ok_or("column without a type")?;
            let kind = ty.get("kind").and_then(Value::as_str).ok_or("type without a kind")?;
            let scale = ty.get("scale").and_then(Value::as_u64).unwrap_or(0);
            Ok(FooterColumn {
                name: name.to_string(),
                kind: kind.to_string(),
                scale: u32::try_from(scale).map_err(|_| "decimal scale out of range")?,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();

    // 4. Stripes, in file order.
    let stripes = footer
        .get("stripes")
        .and_then(Value::as_array)
        .ok_or("footer has no stripes")?;
    let mut values: Vec<Vec<ReferenceValue>> = vec![Vec::new(); columns.len()];
    let mut num_rows = 0usize;
    for (s, stripe) in stripes.iter().enumerate() {
        let stripe_names: Vec<&str> = stripe
            .get("column_names")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("stripe {s} has no column names"))?
            .iter()
            .map(|v| v.as_str().unwrap_or_default())
            .collect();
        if stripe_names != names {
            return Err(format!("stripe {s} has a conflicting column set"));
        }
        let rows = stripe
            .get("num_rows")
            .and_then(Value::as_u64)
            .and_then(|r| usize::try_from(r).ok())
            .ok_or_else(|| format!("stripe {s} has no row count"))?;

        let entries = stripe
            .get("columns")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("stripe {s} has no chunks"))?;
        for (c, column) in columns.iter().enumerate() {
            let entry = entries
                .iter()
                .find(|e| e.get("column_idx").and_then(Value::as_u64) == Some(c as u64))
                .ok_or_else(|| format!("stripe {s} has no chunk for column {c}"))?;
            let offset = field_usize(entry, "offset_in_file")?;
            let size = field_usize(entry, "size")?;
            let chunk_bytes = offset
                .checked_add(size)
                .filter(|&end| offset >= HEADER_LEN && end <= footer_at)
                .map(|end| &bytes[offset..end])
                .ok_or_else(|| format!("stripe {s} column {c} lies outside the data"))?;
            let decoded = read_chunk(chunk_bytes, column, rows)
                .map_err(|e| format!("stripe {s} column '{}': {e}", column.name))?;
            values[c].extend(decoded);
        }
        num_rows = num_rows
            .checked_add(rows)
            .ok_or("row count overflows")?;
    }

    Ok(ReferenceTable {
        columns: columns
            .into_iter()
            .zip(values)
            .map(|(column, values)| ReferenceColumn {
                name: column.name,
                kind: column.kind,
                values,
            })
            .collect(),
        num_rows,
    })
}

fn field_usize(entry: &Value, key: &str) -> Result<usize, String> {
    entry
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| format!("chunk entry has no {key}"))
}

//==================================================================================
// 2. Chunks and streams
//==================================================================================

/// A little-endian byte reader over one chunk.
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.bytes.len());
        let end = end.ok_or("chunk ends early")?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, String> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, String> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, String> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn text(&mut self, len: usize) -> Result<String, String> {
        String::from_utf8(self.take(len)?.to_vec()).map_err(|_| "header text is not UTF-8".into())
    }
}

fn read_u64(bytes: &[u8], at: usize) -> Result<u64, String> {
    let mut reader = ByteReader { bytes, pos: at };
    reader.u64()
}

fn read_chunk(bytes: &[u8], column: &FooterColumn, rows: usize) -> Result<Vec<ReferenceValue>, String> {
    let mut reader = ByteReader { bytes, pos: 0 };
    if reader.take(4)? != CHUNK_MAGIC {
        return Err("bad chunk magic".into());
    }
    if reader.u16()? != 1 {
        return Err("unknown chunk version".into());
    }
    if reader.u64()? != rows as u64 {
        return Err("chunk row count disagrees with the stripe".into());
    }
    let _header_len = reader.u32()?;
    let type_len = reader.u16()? as usize;
    let _native_type = reader.text(type_len)?;
    let encoding_len = reader.u32()? as usize;
    let encoding: Value = serde_json::from_str(&reader.text(encoding_len)?)
        .map_err(|e| format!("bad encoding descriptor: {e}"))?;
    let dictionary = encoding.get("layout").and_then(Value::as_str) == Some("dictionary");
    let zstd = encoding.get("codec").and_then(Value::as_str) == Some("zstd");

    let stream_count = reader.u16()?;
    let mut lengths = Vec::with_capacity(stream_count as usize);
    for _ in 0..stream_count {
        let name_len = reader.u16()? as usize;
        let name = reader.text(name_len)?;
        let len = usize::try_from(reader.u64()?).map_err(|_| "stream length overflows")?;
        lengths.push((name, len));
    }
    let mut streams = Vec::with_capacity(lengths.len());
    for (name, len) in lengths {
        let raw = reader.take(len)?;
        let payload = if zstd { inflate(raw)? } else { raw.to_vec() };
        streams.push((name, payload));
    }
    let stream = |name: &str| streams.iter().find(|(n, _)| n == name).map(|(_, p)| p.as_slice());

    // Unsupported kinds carry no values at all.
    if column.kind == "unsupported" {
        let mut out = Vec::new();
        out.try_reserve_exact(rows)
            .map_err(|_| format!("cannot hold {rows} rows"))?;
        out.resize(rows, ReferenceValue::Missing);
        return Ok(out);
    }

    // Every row costs at least one bit in some stream.
    let stream_bits = streams
        .iter()
        .map(|(_, p)| p.len())
        .sum::<usize>()
        .saturating_mul(8);
    if rows > stream_bits {
        return Err(format!("{rows} rows declared over {stream_bits} stream bits"));
    }

    let present = match stream("present") {
        Some(bits) => read_bits(bits, rows)?,
        None => vec![true; rows],
    };
    let valid = present.iter().filter(|p| **p).count();
    let data = stream("data").unwrap_or_default();

    let mut valid_values = match column.kind.as_str() {
        "int8" | "int16" | "int32" | "int64" | "timestamp" | "date" | "decimal" => {
            let ints = read_varints(data)?
                .into_iter()
                .map(unzigzag)
                .collect::<Vec<_>>();
            ints.into_iter()
                .map(|v| int_value(&column.kind, column.scale, v))
                .collect::<Result<Vec<_>, _>>()?
        }
        "float32" => data
            .chunks_exact(4)
            .map(|b| ReferenceValue::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64))
            .collect(),
        "float64" => data
            .chunks_exact(8)
            .map(|b| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(b);
                ReferenceValue::Float(f64::from_le_bytes(buf))
            })
            .collect(),
        "boolean" => read_bits(data, valid)?
            .into_iter()
            .map(|b| ReferenceValue::Int(b as i64))
            .collect(),
        "string" | "binary" => {
            let raw = if dictionary {
                let dict = split(
                    stream("dictionary_data").unwrap_or_default(),
                    &read_varints(stream("dictionary_length").unwrap_or_default())?,
                )?;
                read_varints(data)?
                    .into_iter()
                    .map(|i| dict.get(i as usize).cloned().ok_or("dictionary index out of range"))
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                split(data, &read_varints(stream("length").unwrap_or_default())?)?
            };
            raw.into_iter()
                .map(|b| {
                    if column.kind == "string" {
                        String::from_utf8(b)
                            .map(ReferenceValue::Text)
                            .map_err(|_| "string value is not UTF-8")
                    } else {
                        Ok(ReferenceValue::Bytes(b))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        other => return Err(format!("unknown kind '{other}'")),
    };

    if valid_values.len() != valid {
        return Err(format!("{} values for {} present rows", valid_values.len(), valid));
    }
    let mut out = Vec::with_capacity(rows);
    let mut next = valid_values.drain(..);
    for is_present in present {
        out.push(if is_present {
            next.next().ok_or("value stream ran dry")?
        } else {
            ReferenceValue::Missing
        });
    }
    Ok(out)
}

/// Undoes the zstd codec: a u64 length prefix followed by one frame.
fn inflate(raw: &[u8]) -> Result<Vec<u8>, String> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let expected = read_u64(raw, 0)?;
    let frame = raw.get(ZSTD_PREFIX_LEN..).unwrap_or_default();
    let out = zstd::decode_all(frame).map_err(|e| format!("zstd: {e}"))?;
    if out.len() as u64 != expected {
        return Err("zstd stream has the wrong length".into());
    }
    Ok(out)
}

//==================================================================================
// 3. Value primitives
//==================================================================================

fn read_bits(bytes: &[u8], n: usize) -> Result<Vec<bool>, String> {
    if bytes.len() * 8 < n {
        return Err("bitmap is too short".into());
    }
    Ok((0..n).map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1).collect())
}

fn read_varints(bytes: &[u8]) -> Result<Vec<u64>, String> {
    let mut out = Vec::new();
    let mut value = 0u64;
    let mut shift = 0u32;
    for &byte in bytes {
        if shift >= 64 {
            return Err("varint overflows 64 bits".into());
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            out.push(value);
            value = 0;
            shift = 0;
        } else {
            shift += 7;
        }
    }
    if shift != 0 {
        return Err("truncated varint".into());
    }
    Ok(out)
}

fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

fn split(data: &[u8], lengths: &[u64]) -> Result<Vec<Vec<u8>>, String> {
    let mut out = Vec::with_capacity(lengths.len());
    let mut at = 0usize;
    for &len in lengths {
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| at.checked_add(len))
            .filter(|&end| end <= data.len())
            .ok_or("length stream overruns the data")?;
        out.push(data[at..end].to_vec());
        at = end;
    }
    Ok(out)
}

fn int_value(kind: &str, scale: u32, v: i64) -> Result<ReferenceValue, String> {
    match kind {
        "decimal" => format!("{v}e-{scale}")
            .parse::<f64>()
            .map(ReferenceValue::Float)
            .map_err(|e| format!("decimal {v}: {e}")),
        "timestamp" => DateTime::from_timestamp_millis(v)
            .map(|t| ReferenceValue::Int(t.timestamp_millis()))
            .ok_or_else(|| format!("timestamp {v} is out of range")),
        "date" => NaiveDate::from_ymd_opt(1970, 1, 1)
            .zip(TimeDelta::try_days(v))
            .and_then(|(epoch, days)| epoch.checked_add_signed(days))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| ReferenceValue::Int(d.and_utc().timestamp_millis()))
            .ok_or_else(|| format!("date {v} is out of range")),
        _ => Ok(ReferenceValue::Int(v)),
    }
}
