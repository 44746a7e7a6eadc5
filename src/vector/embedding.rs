//! Embedding generation for chunk texts, cluster summaries and queries.
//!
//! The pipeline only depends on [`EmbeddingProvider`]. The default
//! [`HashingEmbedder`] is a deterministic bag-of-words feature hasher: every
//! token from the keyword tokenizer is hashed with sha256 into one signed
//! bucket, and the result is L2-normalized. It needs no model download and
//! produces identical vectors across runs and machines.

use crate::keyword::tokenize;
use crate::vector::{VectorDimension, VectorError};
use sha2::{Digest, Sha256};

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe; the index builder calls
/// `embed_documents` from several workers at once.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts, one per input, in input order.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Generate the embedding for a search query.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        self.embed_documents(&[text])?
            .pop()
            .ok_or(VectorError::BatchLength {
                expected: 1,
                actual: 0,
            })
    }

    /// Get the dimension of embeddings produced by this provider.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// Feature-hashing embedder over keyword tokens.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: VectorDimension,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: VectorDimension::dimension_384(),
        }
    }
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut embedding = vec![0.0f32; dim];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }
        embedding
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Check a provider's batch output: one vector per text, all of `dimension`.
pub fn validate_batch(
    dimension: VectorDimension,
    expected: usize,
    embeddings: &[Vec<f32>],
) -> Result<(), VectorError> {
    if embeddings.len() != expected {
        return Err(VectorError::BatchLength {
            expected,
            actual: embeddings.len(),
        });
    }
    for embedding in embeddings {
        dimension.validate_vector(embedding)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::VECTOR_DIMENSION_384;

    #[test]
    fn test_hashing_embedder_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::default();
        let texts = ["Mars is the fourth planet", "Jupiter is the largest planet"];
        let first = embedder.embed_documents(&texts).unwrap();
        let second = embedder.embed_documents(&texts).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        for embedding in &first {
            assert_eq!(embedding.len(), VECTOR_DIMENSION_384);
            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((magnitude - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_query_matches_document_embedding() {
        let embedder = HashingEmbedder::default();
        let doc = embedder.embed_documents(&["Roman Empire"]).unwrap();
        let query = embedder.embed_query("roman empire").unwrap();
        assert_eq!(doc[0], query);
    }

    #[test]
    fn test_text_without_tokens_is_zero_vector() {
        let embedder = HashingEmbedder::new(VectorDimension::new(8).unwrap());
        let embedding = embedder.embed_query("the a of").unwrap();
        assert!(embedding.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_validate_batch() {
        let dim = VectorDimension::new(2).unwrap();
        assert!(validate_batch(dim, 1, &[vec![0.0, 1.0]]).is_ok());
        assert!(matches!(
            validate_batch(dim, 2, &[vec![0.0, 1.0]]),
            Err(VectorError::BatchLength { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            validate_batch(dim, 1, &[vec![0.0]]),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }
}
