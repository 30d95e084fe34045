//! Nearest-neighbor search over fixed-dimension embedding vectors
//!
//! An index is built once from an ordered set of vectors and is read-only
//! afterwards. Results refer to vectors by their insertion position, which
//! the caller maps back to whatever the vectors describe.

pub mod flat;

use std::cmp::Ordering;
use thiserror::Error;

pub use flat::FlatL2Index;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Cannot build an index from zero vectors")]
    Empty,

    #[error("Vectors must have at least one dimension")]
    ZeroDimension,

    #[error("Vector at position {position} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Query vector has dimension {actual}, index has dimension {expected}")]
    QueryDimensionMismatch { expected: usize, actual: usize },
}

/// One search hit: the insertion position of a stored vector and its distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    /// Squared L2 distance, lower is closer
    pub distance: f32,
}

impl Neighbor {
    /// Closest first; equal distances keep insertion order and NaN sorts last
    #[inline]
    pub fn rank(&self, other: &Self) -> Ordering {
        self.distance
            .is_nan()
            .cmp(&other.distance.is_nan())
            .then_with(|| self.distance.total_cmp(&other.distance))
            .then_with(|| self.position.cmp(&other.position))
    }
}

/// A read-only k-nearest-neighbor index.
///
/// Implementations must be safe to search from many threads at once and must
/// return identical results for identical queries.
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    /// Return the `min(k, len)` stored vectors closest to `query`, closest first
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError>;

    /// Number of stored vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension shared by every stored vector
    fn dimension(&self) -> usize;
}

/// Squared Euclidean distance between two equal-length vectors
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

    a.iter().zip(b).fold(0.0_f32, |acc, (x, y)| {
        let d = x - y;
        d.mul_add(d, acc)
    })
}
