//! On-disk format for flat vector indices.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic `DSVX`, version, dimension, vector count (all u32 LE)
//! - Vectors: `count * dimension` contiguous f32 values in little-endian order
//!
//! Row `i` of the file is the vector at position `i`; there are no stored ids.
//! Files are read back through a memory map and copied out once.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use memmap2::MmapOptions;
use thiserror::Error;

use crate::vector::types::{VectorDimension, VectorError};

/// Current storage format version.
pub const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify vector storage files.
const MAGIC_BYTES: &[u8; 4] = b"DSVX";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Errors specific to vector storage operations.
#[derive(Error, Debug)]
pub enum VectorStorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Re-run 'docsift index' to rebuild the vector files"
    )]
    VersionMismatch { expected: u32, actual: u32 },

    #[error(
        "Vector file size mismatch: header declares {expected} bytes, file has {actual}\nSuggestion: The file is truncated; re-run 'docsift index'"
    )]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

/// Write `data` (row-major, `data.len() / dimension` rows) to `path`.
pub fn write_vector_file(
    path: &Path,
    dimension: VectorDimension,
    data: &[f32],
) -> Result<(), VectorStorageError> {
    let dim = dimension.get();
    if data.len() % dim != 0 {
        return Err(VectorStorageError::InvalidFormat(format!(
            "{} values do not divide into rows of {dim}",
            data.len()
        )));
    }
    let count = data.len() / dim;
    let dim_u32 = u32::try_from(dim)
        .map_err(|_| VectorStorageError::InvalidFormat(format!("dimension {dim} too large")))?;
    let count_u32 = u32::try_from(count)
        .map_err(|_| VectorStorageError::InvalidFormat(format!("{count} vectors too many")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(MAGIC_BYTES)?;
    writer.write_all(&STORAGE_VERSION.to_le_bytes())?;
    writer.write_all(&dim_u32.to_le_bytes())?;
    writer.write_all(&count_u32.to_le_bytes())?;
    for &value in data {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Read a file written by [`write_vector_file`].
///
/// Returns the dimension and the row-major values.
pub fn read_vector_file(path: &Path) -> Result<(VectorDimension, Vec<f32>), VectorStorageError> {
    let file = File::open(path)?;
    // Safety: the file is opened read-only and only read during this call
    let mmap = unsafe { MmapOptions::new().map(&file)? };

    if mmap.len() < HEADER_SIZE {
        return Err(VectorStorageError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }
    if &mmap[0..4] != MAGIC_BYTES {
        return Err(VectorStorageError::InvalidFormat(
            "Invalid magic bytes".to_string(),
        ));
    }

    let read_u32 = |offset: usize| {
        u32::from_le_bytes([
            mmap[offset],
            mmap[offset + 1],
            mmap[offset + 2],
            mmap[offset + 3],
        ])
    };

    let version = read_u32(4);
    if version != STORAGE_VERSION {
        return Err(VectorStorageError::VersionMismatch {
            expected: STORAGE_VERSION,
            actual: version,
        });
    }
    let dimension = VectorDimension::new(read_u32(8) as usize)?;
    let count = read_u32(12) as usize;

    let expected = HEADER_SIZE + count * dimension.get() * BYTES_PER_F32;
    if mmap.len() != expected {
        return Err(VectorStorageError::SizeMismatch {
            expected,
            actual: mmap.len(),
        });
    }

    let data = mmap[HEADER_SIZE..]
        .chunks_exact(BYTES_PER_F32)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((dimension, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.vec");
        let dim = VectorDimension::new(3).unwrap();
        let data = vec![1.0, 2.0, 3.0, -4.0, 5.5, 0.0];

        write_vector_file(&path, dim, &data).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16 + 6 * 4);

        let (read_dim, read_data) = read_vector_file(&path).unwrap();
        assert_eq!(read_dim, dim);
        assert_eq!(read_data, data);
    }

    #[test]
    fn test_empty_file_has_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.vec");
        write_vector_file(&path, VectorDimension::new(4).unwrap(), &[]).unwrap();
        let (_, data) = read_vector_file(&path).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_rejects_bad_files() {
        let dir = TempDir::new().unwrap();

        let bad_magic = dir.path().join("magic.vec");
        std::fs::write(&bad_magic, b"CVEC\x01\0\0\0\x01\0\0\0\0\0\0\0").unwrap();
        assert!(matches!(
            read_vector_file(&bad_magic),
            Err(VectorStorageError::InvalidFormat(_))
        ));

        let bad_version = dir.path().join("version.vec");
        std::fs::write(&bad_version, b"DSVX\x09\0\0\0\x01\0\0\0\0\0\0\0").unwrap();
        assert!(matches!(
            read_vector_file(&bad_version),
            Err(VectorStorageError::VersionMismatch { actual: 9, .. })
        ));

        let truncated = dir.path().join("short.vec");
        let dim = VectorDimension::new(2).unwrap();
        write_vector_file(&truncated, dim, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let bytes = std::fs::read(&truncated).unwrap();
        std::fs::write(&truncated, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(
            read_vector_file(&truncated),
            Err(VectorStorageError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_ragged_data_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ragged.vec");
        let result = write_vector_file(&path, VectorDimension::new(4).unwrap(), &[1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));
    }
}
