use crate::error::IndexError;

/// One k-NN result: position in insertion order plus squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub ordinal: usize,
    pub distance: f32,
}

pub trait VectorIndex {
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends in order. Nothing is deduplicated or reordered.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError>;

    /// Nearest first, ties broken by lower ordinal. `k` is clamped to `len`.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError>;
}
