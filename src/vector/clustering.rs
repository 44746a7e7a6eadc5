//! Grouping of chunk embeddings for cluster summaries.
//!
//! A build asks for `n / target_size` groups and gets back only the
//! non-empty ones. The same `clustering.seed` over the same embeddings
//! always gives the same groups.

use crate::types::ChunkPosition;
use crate::vector::types::VectorError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

const MAX_ITERATIONS: usize = 100;

/// Mean centroid drift below which iteration stops
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

const EPSILON: f32 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Unit-length centroids
    pub centroids: Vec<Vec<f32>>,
    /// Centroid of each input row
    pub assignments: Vec<usize>,
    pub iterations: usize,
}

#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Ensure vectors are generated before clustering"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of vectors")]
    InvalidClusterCount(usize),

    #[error(
        "Invalid target cluster size: {0}\nSuggestion: Set 'clustering.target_cluster_size' to at least 1"
    )]
    InvalidTargetSize(usize),

    #[error(
        "Dimension mismatch in vectors\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,

    #[error("Too many vectors to address: {0}")]
    TooManyVectors(usize),

    #[error("Vector operation error: {0}")]
    VectorError(#[from] VectorError),
}

/// Partition chunk embeddings into groups of roughly `target_size`.
///
/// Returns compacted cluster ids (0..) mapped to the member positions, where
/// position `i` is the row of `vectors[i]`. With `n <= target_size` every
/// chunk lands in cluster 0 without running k-means.
pub fn cluster(
    vectors: &[Vec<f32>],
    target_size: usize,
    seed: u64,
) -> Result<BTreeMap<usize, BTreeSet<ChunkPosition>>, ClusteringError> {
    if target_size == 0 {
        return Err(ClusteringError::InvalidTargetSize(target_size));
    }
    if vectors.is_empty() {
        return Ok(BTreeMap::new());
    }
    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let positions = (0..vectors.len())
        .map(|i| ChunkPosition::from_index(i).ok_or(ClusteringError::TooManyVectors(vectors.len())))
        .collect::<Result<Vec<_>, _>>()?;

    if vectors.len() <= target_size {
        return Ok(BTreeMap::from([(0, positions.into_iter().collect())]));
    }

    let k = (vectors.len() / target_size).max(1);
    let result = kmeans_clustering(vectors, k, seed)?;

    // Drop empty clusters and renumber the rest in centroid order
    let mut by_centroid: BTreeMap<usize, BTreeSet<ChunkPosition>> = BTreeMap::new();
    for (position, centroid) in positions.into_iter().zip(result.assignments) {
        by_centroid.entry(centroid).or_default().insert(position);
    }
    Ok(by_centroid.into_values().enumerate().collect())
}

/// Cosine k-means over `vectors`, seeded k-means++ style from `seed`.
///
/// Stops after `MAX_ITERATIONS` or once centroids settle. When the input has
/// fewer than `k` distinct directions, fewer centroids are returned.
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering(
    vectors: &[Vec<f32>],
    k: usize,
    seed: u64,
) -> Result<KMeansResult, ClusteringError> {
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }

    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, &mut rng);
    let mut assignments = vec![usize::MAX; vectors.len()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let new_assignments: Vec<usize> = vectors
            .iter()
            .map(|vector| assign_to_nearest_centroid(vector, &centroids))
            .collect();

        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= MAX_ITERATIONS {
            break;
        }

        let new_centroids = update_centroids(vectors, &assignments, centroids.len(), &mut rng);

        let centroid_movement = calculate_centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if centroid_movement < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    if iterations >= MAX_ITERATIONS {
        tracing::debug!(
            "k-means stopped at {MAX_ITERATIONS} iterations without full convergence"
        );
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Index of the centroid most similar to `vector`; ties go to the lower index.
pub fn assign_to_nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best_similarity = f32::NEG_INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = cosine_similarity(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_cluster = i;
        }
    }
    best_cluster
}

/// Move each centroid to the normalized mean of its members.
fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut new_centroids = vec![vec![0.0; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, &cluster_idx) in vectors.iter().zip(assignments.iter()) {
        for (i, &value) in vector.iter().enumerate() {
            new_centroids[cluster_idx][i] += value;
        }
        cluster_sizes[cluster_idx] += 1;
    }

    for (centroid, &size) in new_centroids.iter_mut().zip(cluster_sizes.iter()) {
        if size == 0 {
            // Empty cluster: reseed from a random input
            let random_idx = rng.random_range(0..vectors.len());
            *centroid = normalize_vector_copy(&vectors[random_idx]);
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
            normalize_vector(centroid);
        }
    }

    new_centroids
}

/// Zero vectors have similarity 0 with anything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Selects up to `k` initial centroids that are far apart.
fn initialize_centroids_kmeans_plus_plus(
    vectors: &[Vec<f32>],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(normalize_vector_copy(&vectors[first_idx]));

    for _ in 1..k {
        let mut distances = vec![0.0f32; vectors.len()];
        let mut total_distance = 0.0f32;

        for (i, vector) in vectors.iter().enumerate() {
            let mut min_distance = f32::MAX;
            for centroid in &centroids {
                let distance = 1.0 - cosine_similarity(vector, centroid);
                min_distance = min_distance.min(distance);
            }
            distances[i] = min_distance * min_distance;
            total_distance += distances[i];
        }

        if total_distance < EPSILON {
            // Remaining points coincide with chosen centroids
            break;
        }

        let mut cumulative = 0.0;
        let target = rng.random::<f32>() * total_distance;
        let mut chosen = vectors.len() - 1;
        for (i, &distance) in distances.iter().enumerate() {
            cumulative += distance;
            if distance > 0.0 && cumulative >= target {
                chosen = i;
                break;
            }
        }
        centroids.push(normalize_vector_copy(&vectors[chosen]));
    }

    centroids
}

/// Mean cosine distance between matching centroids of two iterations.
fn calculate_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| 1.0 - cosine_similarity(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}

fn normalize_vector(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn normalize_vector_copy(vector: &[f32]) -> Vec<f32> {
    let mut normalized = vector.to_vec();
    normalize_vector(&mut normalized);
    normalized
}
