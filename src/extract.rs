//! Text extraction seam.
//!
//! The pipeline only needs "path in, plain text out". Rich formats (PDF,
//! office documents, OCR) plug in behind [`TextExtractor`].

use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes inspected when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("File '{path}' is {size} bytes, above the {limit} byte limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("File '{path}' looks like binary content")]
    Binary { path: PathBuf },

    #[error("Extraction failed for '{path}': {reason}")]
    Failed { path: PathBuf, reason: String },
}

/// Turns a file into plain text.
///
/// `Ok(None)` means the file has no usable text; it is skipped without a record.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Option<String>, ExtractError>;
}

/// Reads files as UTF-8 text, replacing invalid sequences.
#[derive(Debug, Clone)]
pub struct PlainTextExtractor {
    max_file_size: u64,
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

impl PlainTextExtractor {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<Option<String>, ExtractError> {
        let io_err = |source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        };

        let size = std::fs::metadata(path).map_err(io_err)?.len();
        if size > self.max_file_size {
            return Err(ExtractError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.max_file_size,
            });
        }

        let mut bytes = Vec::with_capacity(size as usize);
        std::fs::File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(io_err)?;

        if bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0) {
            return Err(ExtractError::Binary {
                path: path.to_path_buf(),
            });
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extracts_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello world").unwrap();

        let text = PlainTextExtractor::default().extract(&path).unwrap();
        assert_eq!(text.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_blank_file_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.txt");
        std::fs::write(&path, "  \n ").unwrap();

        assert!(PlainTextExtractor::default().extract(&path).unwrap().is_none());
    }

    #[test]
    fn test_binary_and_oversized_files_fail() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("blob.bin");
        std::fs::write(&bin, [0x50u8, 0x4b, 0x00, 0x01]).unwrap();
        assert!(matches!(
            PlainTextExtractor::default().extract(&bin),
            Err(ExtractError::Binary { .. })
        ));

        let big = dir.path().join("big.txt");
        std::fs::write(&big, "x".repeat(64)).unwrap();
        assert!(matches!(
            PlainTextExtractor::new(10).extract(&big),
            Err(ExtractError::TooLarge { size: 64, .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PlainTextExtractor::default()
            .extract(Path::new("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }
}
