//! Quantized embedding vectors
//!
//! A vector stores D signed 8-bit lanes plus a float scale; conceptually it
//! approximates a unit vector in R^D. Dequantization is `v[i] = scale * q[i]`.
//! The approximate cosine used by ANN search divides the integer dot product
//! of lanes by the product of the cached lane norms; the exact path
//! dequantizes first.

use serde::{Deserialize, Serialize};

/// Quantized embedding vector: signed 8-bit lanes with a scalar scale.
///
/// The lane norm is cached at quantization time so approximate cosine is a
/// single integer dot product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedVector {
    lanes: Vec<i8>,
    scale: f32,
    norm: f32,
}

impl QuantizedVector {
    /// Quantize a float vector into 8-bit lanes.
    ///
    /// The scale maps the largest-magnitude component onto ±127, so unit
    /// vectors survive with at worst one quantization step of error per lane.
    pub fn quantize(values: &[f32]) -> Self {
        let max_abs = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let scale = if max_abs > 0.0 { max_abs / 127.0 } else { 0.0 };
        let lanes: Vec<i8> = if scale > 0.0 {
            values
                .iter()
                .map(|v| (v / scale).round().clamp(-127.0, 127.0) as i8)
                .collect()
        } else {
            vec![0; values.len()]
        };
        let norm = lane_norm(&lanes);
        Self { lanes, scale, norm }
    }

    /// Rebuild from stored parts (on-disk load path). Recomputes the cached
    /// lane norm rather than trusting the file.
    pub fn from_parts(lanes: Vec<i8>, scale: f32) -> Self {
        let norm = lane_norm(&lanes);
        Self { lanes, scale, norm }
    }

    /// The reserved zero vector, used only as a "pending embedding" sentinel.
    pub fn zero(dimensions: usize) -> Self {
        Self {
            lanes: vec![0; dimensions],
            scale: 0.0,
            norm: 0.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.norm == 0.0
    }

    pub fn dimensions(&self) -> usize {
        self.lanes.len()
    }

    pub fn lanes(&self) -> &[i8] {
        &self.lanes
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Cached L2 norm of the integer lanes
    pub fn lane_norm(&self) -> f32 {
        self.norm
    }

    /// Norm of the dequantized vector; within tolerance of 1.0 for stored
    /// unit vectors, 0.0 for the pending sentinel.
    pub fn real_norm(&self) -> f32 {
        self.norm * self.scale
    }

    /// Dequantize back to floats
    pub fn dequantize(&self) -> Vec<f32> {
        self.lanes.iter().map(|&q| self.scale * q as f32).collect()
    }

    /// Approximate cosine via the integer dot product of lanes.
    ///
    /// Scale cancels out of cosine, so this differs from the exact path only
    /// by per-lane rounding. Zero vectors compare as 0.
    pub fn approx_cosine(&self, other: &QuantizedVector) -> f32 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        debug_assert_eq!(self.lanes.len(), other.lanes.len());
        let dot: i64 = self
            .lanes
            .iter()
            .zip(other.lanes.iter())
            .map(|(&a, &b)| a as i64 * b as i64)
            .sum();
        (dot as f32 / (self.norm * other.norm)).clamp(-1.0, 1.0)
    }

    /// Exact cosine: dequantizes this operand against a float query
    pub fn exact_cosine(&self, query: &[f32]) -> f32 {
        cosine_f32(&self.dequantize(), query)
    }
}

fn lane_norm(lanes: &[i8]) -> f32 {
    let sq: i64 = lanes.iter().map(|&q| q as i64 * q as i64).sum();
    (sq as f32).sqrt()
}

/// Cosine similarity between two float vectors
pub fn cosine_f32(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0)
}
