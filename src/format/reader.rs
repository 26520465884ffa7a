// In: src/format/reader.rs

//! The Format Reader: opens a STRF file, parses its footer and exposes the
//! column descriptors and stripe index. It never decodes column values.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::StripeError;
use crate::format::{
    ColumnChunk, ColumnStatistics, FileFooter, FILE_FORMAT_VERSION, FILE_HEADER_LEN, FILE_MAGIC,
    FOOTER_LEN_BYTES,
};
use crate::types::NativeKind;

//==================================================================================
// I. Metadata Model
//==================================================================================

/// A column as declared by the footer schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub ordinal: usize,
    pub native_kind: NativeKind,
    pub nullable: bool,
}

/// The location and statistics of one column chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLocation {
    pub column_idx: usize,
    pub offset_in_file: u64,
    pub size: u64,
    pub statistics: ColumnStatistics,
}

/// One stripe of the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Stripe {
    pub index: usize,
    pub offset: u64,
    pub length: u64,
    pub num_rows: u64,
    pub column_names: Vec<String>,
    /// Sorted by `column_idx`.
    pub chunks: Vec<ChunkLocation>,
}

impl Stripe {
    pub fn chunk(&self, column_idx: usize) -> Option<&ChunkLocation> {
        self.chunks
            .binary_search_by_key(&column_idx, |c| c.column_idx)
            .ok()
            .map(|i| &self.chunks[i])
    }

    pub fn byte_range(&self) -> Range<u64> {
        self.offset..self.offset + self.length
    }
}

/// Everything the footer says about the file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub writer_version: String,
    pub columns: Vec<ColumnDescriptor>,
    pub stripes: Vec<Stripe>,
}

impl FileMetadata {
    pub fn num_rows(&self) -> u64 {
        self.stripes.iter().map(|s| s.num_rows).sum()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// The union of the per-stripe distinct value sets of `column`.
    /// Returns `None` if any stripe did not record them.
    pub fn distinct_value_union(&self, column: usize) -> Option<BTreeSet<&str>> {
        let mut union = BTreeSet::new();
        for stripe in &self.stripes {
            let values = stripe
                .chunk(column)?
                .statistics
                .distinct_values
                .as_ref()?;
            union.extend(values.iter().map(String::as_str));
        }
        Some(union)
    }
}

//==================================================================================
// II. SourceFile
//==================================================================================

/// An immutable handle to an opened STRF file.
///
/// Opening validates the header and parses the footer; the handle is then
/// shared read-only by every decode unit.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    byte_len: u64,
    /// End of the stripe region (start of the footer).
    data_end: u64,
    /// `None` for a header-only file.
    footer: Option<FileFooter>,
}

impl SourceFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StripeError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| StripeError::from_io(&path, e))?;
        let byte_len = file
            .metadata()
            .map_err(|e| StripeError::from_io(&path, e))?
            .len();

        let corrupt = |reason: String| StripeError::CorruptFile {
            path: path.clone(),
            reason,
        };

        // 1. Fixed header.
        if byte_len < FILE_HEADER_LEN {
            return Err(corrupt(format!(
                "file is {} bytes, shorter than the {}-byte header",
                byte_len, FILE_HEADER_LEN
            )));
        }
        let mut header = [0u8; FILE_HEADER_LEN as usize];
        file.read_exact(&mut header)
            .map_err(|e| StripeError::from_io(&path, e))?;
        if &header[..4] != FILE_MAGIC {
            return Err(corrupt("invalid file magic number".into()));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != FILE_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported file version: expected {}, got {}",
                FILE_FORMAT_VERSION, version
            )));
        }

        // 2. Header-only file.
        if byte_len == FILE_HEADER_LEN {
            return Ok(Self {
                path,
                byte_len,
                data_end: FILE_HEADER_LEN,
                footer: None,
            });
        }
        if byte_len < FILE_HEADER_LEN + FOOTER_LEN_BYTES {
            return Err(corrupt("file too short to hold a footer length".into()));
        }

        // 3. Footer length, then the footer itself.
        let mut u64_buf = [0u8; 8];
        file.seek(SeekFrom::Start(byte_len - FOOTER_LEN_BYTES))
            .map_err(|e| StripeError::from_io(&path, e))?;
        file.read_exact(&mut u64_buf)
            .map_err(|e| StripeError::from_io(&path, e))?;
        let footer_len = u64::from_le_bytes(u64_buf);

        let data_end = (byte_len - FOOTER_LEN_BYTES)
            .checked_sub(footer_len)
            .filter(|&start| start >= FILE_HEADER_LEN)
            .ok_or_else(|| {
                corrupt(format!(
                    "footer length {} does not fit in a {}-byte file",
                    footer_len, byte_len
                ))
            })?;

        file.seek(SeekFrom::Start(data_end))
            .map_err(|e| StripeError::from_io(&path, e))?;
        let mut footer_bytes = vec![0; footer_len as usize];
        file.read_exact(&mut footer_bytes)
            .map_err(|e| StripeError::from_io(&path, e))?;
        let footer: FileFooter = serde_json::from_slice(&footer_bytes)
            .map_err(|e| corrupt(format!("unparsable footer: {}", e)))?;

        log::debug!(
            "Opened {} ({} bytes, {} stripes, writer '{}')",
            path.display(),
            byte_len,
            footer.stripes.len(),
            footer.writer_version
        );

        Ok(Self {
            path,
            byte_len,
            data_end,
            footer: Some(footer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    /// `true` when the file holds only a header.
    pub fn is_empty(&self) -> bool {
        self.footer.is_none()
    }

    pub fn stripe_count(&self) -> usize {
        self.footer.as_ref().map_or(0, |f| f.stripes.len())
    }

    pub fn stripe_ranges(&self) -> Vec<Range<u64>> {
        self.footer.as_ref().map_or_else(Vec::new, |f| {
            f.stripes
                .iter()
                .map(|s| s.offset..s.offset.saturating_add(s.length))
                .collect()
        })
    }

    /// Returns the ordered column descriptors and the stripe index.
    ///
    /// Fails with `EmptyFile` for a header-only file and with `CorruptFile`
    /// when any stripe or chunk range falls outside the data region.
    pub fn metadata(&self) -> Result<FileMetadata, StripeError> {
        let footer = self
            .footer
            .as_ref()
            .ok_or_else(|| StripeError::EmptyFile(self.path.clone()))?;

        let columns = footer
            .schema
            .iter()
            .enumerate()
            .map(|(ordinal, col)| ColumnDescriptor {
                name: col.name.clone(),
                ordinal,
                native_kind: col.native_kind.clone(),
                nullable: col.nullable,
            })
            .collect();

        let mut stripes = Vec::with_capacity(footer.stripes.len());
        for (index, entry) in footer.stripes.iter().enumerate() {
            let stripe_end = entry
                .offset
                .checked_add(entry.length)
                .filter(|&end| entry.offset >= FILE_HEADER_LEN && end <= self.data_end)
                .ok_or_else(|| {
                    self.corrupt(format!(
                        "stripe {} range {}+{} lies outside the data region",
                        index, entry.offset, entry.length
                    ))
                })?;

            let mut chunks = Vec::with_capacity(entry.columns.len());
            for col in &entry.columns {
                let column_idx = col.column_idx as usize;
                if column_idx >= entry.column_names.len() {
                    return Err(self.corrupt(format!(
                        "stripe {} has a chunk for column {} but declares {} columns",
                        index,
                        column_idx,
                        entry.column_names.len()
                    )));
                }
                let in_range = col
                    .offset_in_file
                    .checked_add(col.size)
                    .is_some_and(|end| col.offset_in_file >= entry.offset && end <= stripe_end);
                if !in_range {
                    return Err(self.corrupt(format!(
                        "stripe {} column {} chunk lies outside the stripe",
                        index, column_idx
                    )));
                }
                chunks.push(ChunkLocation {
                    column_idx,
                    offset_in_file: col.offset_in_file,
                    size: col.size,
                    statistics: col.statistics.clone(),
                });
            }
            chunks.sort_by_key(|c| c.column_idx);
            if chunks.windows(2).any(|w| w[0].column_idx == w[1].column_idx) {
                return Err(self.corrupt(format!(
                    "stripe {} lists a column chunk twice",
                    index
                )));
            }

            stripes.push(Stripe {
                index,
                offset: entry.offset,
                length: entry.length,
                num_rows: entry.num_rows,
                column_names: entry.column_names.clone(),
                chunks,
            });
        }

        Ok(FileMetadata {
            writer_version: footer.writer_version.clone(),
            columns,
            stripes,
        })
    }

    /// Rejects a file whose stripes do not all carry the schema's column names.
    pub fn ensure_uniform_stripe_schema(&self, metadata: &FileMetadata) -> Result<(), StripeError> {
        let expected = metadata.column_names();
        match metadata
            .stripes
            .iter()
            .find(|s| s.column_names != expected)
        {
            Some(stripe) => Err(StripeError::InconsistentStripeSchema {
                path: self.path.clone(),
                stripe: stripe.index,
                expected,
                found: stripe.column_names.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Reads `len` bytes at `offset`. Each call uses its own file handle, so
    /// concurrent units never share a cursor.
    pub fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>, StripeError> {
        let mut file = File::open(&self.path).map_err(|e| StripeError::from_io(&self.path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StripeError::from_io(&self.path, e))?;
        let mut buffer = vec![0; len as usize];
        file.read_exact(&mut buffer)
            .map_err(|e| StripeError::from_io(&self.path, e))?;
        Ok(buffer)
    }

    pub fn read_chunk(&self, location: &ChunkLocation) -> Result<ColumnChunk, StripeError> {
        let bytes = self.read_range(location.offset_in_file, location.size)?;
        ColumnChunk::from_bytes(&bytes)
    }

    fn corrupt(&self, reason: String) -> StripeError {
        StripeError::CorruptFile {
            path: self.path.clone(),
            reason,
        }
    }
}

//==================================================================================
// III. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, FixtureColumn, FixtureStripe, FixtureValue};

    fn two_stripe_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("two.strf");
        fixtures::FixtureFile::new(vec![
            FixtureColumn::new("id", NativeKind::Int64),
            FixtureColumn::new("name", NativeKind::String),
        ])
        .stripe(FixtureStripe::rows(vec![
            vec![FixtureValue::Int(1), FixtureValue::Str("b".into())],
            vec![FixtureValue::Int(2), FixtureValue::Str("a".into())],
        ]))
        .stripe(FixtureStripe::rows(vec![vec![
            FixtureValue::Int(3),
            FixtureValue::Null,
        ]]))
        .write_to(&path)
        .unwrap();
        path
    }

    #[test]
    fn test_open_reads_descriptors_and_stripes() {
        let dir = tempfile::tempdir().unwrap();
        let path = two_stripe_file(&dir);
        let source = SourceFile::open(&path).unwrap();
        assert_eq!(source.stripe_count(), 2);
        assert!(!source.is_empty());

        let meta = source.metadata().unwrap();
        assert_eq!(meta.column_names(), vec!["id", "name"]);
        assert_eq!(meta.columns[1].native_kind, NativeKind::String);
        assert_eq!(meta.num_rows(), 3);
        assert_eq!(meta.stripes[1].chunk(1).unwrap().statistics.null_count, 1);

        let union = meta.distinct_value_union(1).unwrap();
        assert_eq!(union.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
        source.ensure_uniform_stripe_schema(&meta).unwrap();
    }

    #[test]
    fn test_header_only_file_is_empty_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.strf");
        fixtures::write_header_only(&path).unwrap();

        let source = SourceFile::open(&path).unwrap();
        assert!(source.is_empty());
        assert_eq!(source.stripe_count(), 0);
        assert!(matches!(source.metadata(), Err(StripeError::EmptyFile(_))));
    }

    #[test]
    fn test_truncated_and_garbage_files_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = two_stripe_file(&dir);
        let bytes = std::fs::read(&path).unwrap();

        let truncated = dir.path().join("truncated.strf");
        std::fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(
            SourceFile::open(&truncated),
            Err(StripeError::CorruptFile { .. })
        ));

        let garbage = dir.path().join("garbage.strf");
        std::fs::write(&garbage, b"NOPE-this is not a stripe file").unwrap();
        assert!(matches!(
            SourceFile::open(&garbage),
            Err(StripeError::CorruptFile { .. })
        ));

        let tiny = dir.path().join("tiny.strf");
        std::fs::write(&tiny, b"ST").unwrap();
        assert!(matches!(
            SourceFile::open(&tiny),
            Err(StripeError::CorruptFile { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceFile::open(dir.path().join("nope.strf")).unwrap_err();
        assert!(matches!(err, StripeError::FileNotFound(_)));
        assert!(err.is_io());
    }

    #[test]
    fn test_conflicting_stripe_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conflict.strf");
        fixtures::FixtureFile::new(vec![FixtureColumn::new("a", NativeKind::Int32)])
            .stripe(FixtureStripe::rows(vec![vec![FixtureValue::Int(1)]]))
            .stripe(
                FixtureStripe::rows(vec![vec![FixtureValue::Int(2)]])
                    .with_column_names(vec!["b".into()]),
            )
            .write_to(&path)
            .unwrap();

        let source = SourceFile::open(&path).unwrap();
        let meta = source.metadata().unwrap();
        let err = source.ensure_uniform_stripe_schema(&meta).unwrap_err();
        assert!(matches!(
            err,
            StripeError::InconsistentStripeSchema { stripe: 1, .. }
        ));
    }

    #[test]
    fn test_read_chunk_roundtrips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = two_stripe_file(&dir);
        let source = SourceFile::open(&path).unwrap();
        let meta = source.metadata().unwrap();
        let chunk = source.read_chunk(meta.stripes[0].chunk(0).unwrap()).unwrap();
        assert_eq!(chunk.total_rows, 2);
        assert_eq!(chunk.native_type, "Int64");
    }
}
