//! Vector dimension wrapper and the errors shared by embedding and search.

use thiserror::Error;

/// Dimension produced by the default hashing embedder.
pub const VECTOR_DIMENSION_384: usize = 384;

/// Type-safe wrapper for vector dimensions.
///
/// Every vector in one index shares a single dimension; mixing two is a
/// [`VectorError::DimensionMismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension and finite components.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
            return Err(VectorError::NonFinite { index });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Vector component {index} is not a finite number")]
    NonFinite { index: usize },

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding provider is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error(
        "Embedding provider returned {actual} vectors for {expected} texts\nSuggestion: Check the provider's batch handling"
    )]
    BatchLength { expected: usize, actual: usize },
}
