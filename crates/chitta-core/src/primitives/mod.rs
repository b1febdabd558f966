//! Primitives
//!
//! The leaf types everything else is built from:
//! - 128-bit node identifiers
//! - quantized embedding vectors with approximate and exact cosine paths
//! - Hilbert keys for neighborhood-preserving pre-candidate pruning

mod hilbert;
mod id;
mod vector;

pub use hilbert::hilbert_key;
pub use id::NodeId;
pub use vector::{QuantizedVector, cosine_f32};
