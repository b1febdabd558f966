//! Embeddings
//!
//! The engine does not ship a model. An [`Embedder`] is injected at open
//! and turns text into fixed-dimension unit vectors; text operations
//! without one fail with `NoEmbedder`.
//!
//! [`HashEmbedder`] is a deterministic bag-of-tokens embedder for tests and
//! offline smoke use: related texts share tokens and land near each other,
//! and individual texts can be pinned to exact vectors.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::error::{ChittaError, Result};
use crate::index::tokenize;

pub use crate::primitives::cosine_f32 as cosine_similarity;

/// Text → unit vector transform, injected by the host
pub trait Embedder: Send + Sync {
    /// Output dimensionality; must match the index
    fn dimensions(&self) -> usize;

    /// Embed one text into a unit vector of [`Embedder::dimensions`] length
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Normalize a vector to unit length in place; a zero vector stays zero
pub fn normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

// ============================================================================
// HASH EMBEDDER
// ============================================================================

/// Deterministic token-hashing embedder.
///
/// Each token is hashed into a handful of signed lanes; the sum is
/// normalized. No semantics, but stable, fast, and overlap-sensitive,
/// which is what tests and offline smoke runs need.
pub struct HashEmbedder {
    dimensions: usize,
    pinned: HashMap<String, Vec<f32>>,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            pinned: HashMap::new(),
        }
    }

    /// Pin an exact vector for a text (normalized on insert)
    pub fn pin(&mut self, text: &str, vector: Vec<f32>) -> &mut Self {
        let mut vector = vector;
        normalize(&mut vector);
        self.pinned.insert(text.to_string(), vector);
        self
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.pinned.get(text) {
            if vector.len() != self.dimensions {
                return Err(ChittaError::InvalidParams(format!(
                    "pinned vector has {} lanes, embedder is {}-dimensional",
                    vector.len(),
                    self.dimensions
                )));
            }
            return Ok(vector.clone());
        }

        let mut values = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let mut state = hasher.finish();
            for _ in 0..4 {
                state = state.wrapping_mul(0x5851_F42D_4C95_7F2D).wrapping_add(1);
                let lane = (state >> 32) as usize % self.dimensions;
                let sign = if state & 1 == 0 { 1.0 } else { -1.0 };
                values[lane] += sign;
            }
        }
        normalize(&mut values);
        Ok(values)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("the borrow checker").unwrap();
        let b = embedder.embed("the borrow checker").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_overlapping_texts_are_closer() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("rust ownership borrow checker lifetimes").unwrap();
        let b = embedder.embed("rust ownership borrow checker traits").unwrap();
        let c = embedder.embed("sourdough starter hydration schedule").unwrap();

        let near = cosine_similarity(&a, &b);
        let far = cosine_similarity(&a, &c);
        assert!(near > far);
    }

    #[test]
    fn test_pinned_vectors_win() {
        let mut embedder = HashEmbedder::new(4);
        embedder.pin("red", vec![1.0, 0.0, 0.0, 0.0]);
        let v = embedder.embed("red").unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_output_is_unit_length() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed("some text to embed").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
