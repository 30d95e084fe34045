
use tracing::debug;

use super::{IndexError, Neighbor, VectorIndex, squared_l2};

/// Exact brute-force index over squared L2 distance.
///
/// Vectors are stored back to back in a single row-major buffer. Search cost
/// is linear in the number of stored vectors, which is fine for corpora of a
/// few thousand fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Build an index from `vectors`, which must be non-empty and share one dimension
    #[inline]
    pub fn build<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Self, IndexError> {
        let first = vectors.first().ok_or(IndexError::Empty)?;
        let dimension = first.as_ref().len();
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for (position, vector) in vectors.iter().enumerate() {
            let vector = vector.as_ref();
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        debug!(
            "Built flat L2 index with {} vectors of dimension {}",
            vectors.len(),
            dimension
        );

        Ok(Self { dimension, data })
    }

    /// The stored vector at `position`
    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dimension).nth(position)
    }
}

impl VectorIndex for FlatL2Index {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::QueryDimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                distance: squared_l2(query, vector),
            })
            .collect();

        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, Neighbor::rank);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(Neighbor::rank);

        Ok(neighbors)
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
