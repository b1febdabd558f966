//! Secondary indexes
//!
//! - exact-match tag postings with a persisted sidecar
//! - the in-memory BM25 lexical scorer, rebuilt from payloads at open

mod sparse;
mod tags;

pub use sparse::{tokenize, Bm25Index};
pub use tags::TagIndex;
