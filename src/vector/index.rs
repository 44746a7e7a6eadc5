//! Exact nearest-neighbor index over a flat row-major vector buffer.

use std::path::Path;

use rayon::prelude::*;

use crate::vector::storage::{VectorStorageError, read_vector_file, write_vector_file};
use crate::vector::{VectorDimension, VectorError};

/// Brute-force L2 index. Row `i` is the `i`-th added vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatVectorIndex {
    dimension: VectorDimension,
    data: Vec<f32>,
}

impl FlatVectorIndex {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Build from rows, validating each one.
    pub fn from_rows(dimension: VectorDimension, rows: &[Vec<f32>]) -> Result<Self, VectorError> {
        let mut index = Self::new(dimension);
        index.data.reserve(rows.len() * dimension.get());
        for row in rows {
            index.add(row)?;
        }
        Ok(index)
    }

    /// Append one vector; returns its row.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, VectorError> {
        self.dimension.validate_vector(vector)?;
        let row = self.len();
        self.data.extend_from_slice(vector);
        Ok(row)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension.get()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn get(&self, row: usize) -> Option<&[f32]> {
        let dim = self.dimension.get();
        self.data.get(row * dim..(row + 1) * dim)
    }

    /// The `k` rows closest to `query` by squared L2 distance, ascending.
    ///
    /// Equal distances are ordered by row.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, VectorError> {
        if query.len() != self.dimension.get() {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension.get(),
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .par_chunks_exact(self.dimension.get())
            .enumerate()
            .map(|(row, vector)| (row, squared_l2(query, vector)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Write the index in the binary vector format.
    pub fn save(&self, path: &Path) -> Result<(), VectorStorageError> {
        write_vector_file(path, self.dimension, &self.data)
    }

    /// Load an index written by [`FlatVectorIndex::save`].
    pub fn load(path: &Path) -> Result<Self, VectorStorageError> {
        let (dimension, data) = read_vector_file(path)?;
        Ok(Self { dimension, data })
    }
}

/// Squared Euclidean distance.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
