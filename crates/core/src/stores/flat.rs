use crate::error::IndexError;
use crate::traits::{Neighbor, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    SquaredL2,
}

impl Metric {
    pub fn tag(self) -> u8 {
        match self {
            Metric::SquaredL2 => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Metric::SquaredL2),
            _ => None,
        }
    }
}

/// Exhaustive index over vectors stored row-major in one buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Rebuilds an index from a row-major buffer, as read back from disk.
    pub fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: data.len(),
            });
        }
        Ok(Self { dimension, data })
    }

    pub fn metric(&self) -> Metric {
        Metric::SquaredL2
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        let start = ordinal.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let delta = a - b;
            delta * delta
        })
        .sum()
}

impl VectorIndex for FlatL2Index {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if self.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored = self
            .rows()
            .enumerate()
            .map(|(ordinal, row)| Neighbor {
                ordinal,
                distance: squared_l2(query, row),
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then_with(|| left.ordinal.cmp(&right.ordinal))
        });
        scored.truncate(k.min(self.len()));
        Ok(scored)
    }
}
