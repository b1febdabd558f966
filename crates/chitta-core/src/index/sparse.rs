//! Sparse lexical index
//!
//! A BM25 scorer over payload text. Tokenization is lowercase, punctuation
//! stripped, whitespace split. The index is in-memory only and is rebuilt
//! by streaming over payloads at open.

use std::collections::HashMap;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lowercase, strip punctuation, split on whitespace
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Incremental BM25 index keyed by slot
#[derive(Debug, Default)]
pub struct Bm25Index {
    /// term → slot → term frequency
    postings: HashMap<String, HashMap<u64, u32>>,
    doc_len: HashMap<u64, u32>,
    total_len: u64,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.doc_len.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_len.is_empty()
    }

    pub fn add_document(&mut self, slot: u64, text: &str) {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return;
        }
        self.total_len += tokens.len() as u64;
        self.doc_len.insert(slot, tokens.len() as u32);
        for token in tokens {
            *self.postings.entry(token).or_default().entry(slot).or_insert(0) += 1;
        }
    }

    /// Remove a document given its original text
    pub fn remove_document(&mut self, slot: u64, text: &str) {
        let Some(len) = self.doc_len.remove(&slot) else {
            return;
        };
        self.total_len -= len as u64;
        for token in tokenize(text) {
            if let Some(slots) = self.postings.get_mut(&token) {
                slots.remove(&slot);
                if slots.is_empty() {
                    self.postings.remove(&token);
                }
            }
        }
    }

    /// Top-k slots by BM25 score, descending
    pub fn search(&self, query: &str, k: usize) -> Vec<(u64, f32)> {
        let n = self.doc_len.len() as f32;
        if n == 0.0 || k == 0 {
            return Vec::new();
        }
        let avgdl = self.total_len as f32 / n;
        let mut scores: HashMap<u64, f32> = HashMap::new();

        for token in tokenize(query) {
            let Some(slots) = self.postings.get(&token) else {
                continue;
            };
            let df = slots.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for (&slot, &tf) in slots {
                let dl = self.doc_len.get(&slot).copied().unwrap_or(0) as f32;
                let tf = tf as f32;
                let score = idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * dl / avgdl));
                *scores.entry(slot).or_default() += score;
            }
        }

        let mut results: Vec<(u64, f32)> = scores.into_iter().collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        results
    }

    /// Rebuild by streaming over payload text
    pub fn rebuild(documents: impl Iterator<Item = (u64, String)>) -> Self {
        let mut index = Self::new();
        for (slot, text) in documents {
            index.add_document(slot, &text);
        }
        index
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation() {
        assert_eq!(
            tokenize("Hello, World! foo_bar x2"),
            vec!["hello", "world", "foo", "bar", "x2"]
        );
    }

    #[test]
    fn test_search_ranks_by_relevance() {
        let mut index = Bm25Index::new();
        index.add_document(1, "the borrow checker enforces ownership rules");
        index.add_document(2, "ownership ownership ownership is the core rust idea");
        index.add_document(3, "completely unrelated gardening advice");

        let results = index.search("ownership rules", 10);
        assert!(results.len() >= 2);
        assert!(results.iter().all(|&(slot, _)| slot != 3));
        // scores descend
        for w in results.windows(2) {
            assert!(w[0].1 >= w[1].1);
        }
    }

    #[test]
    fn test_remove_document() {
        let mut index = Bm25Index::new();
        index.add_document(1, "ephemeral note");
        index.remove_document(1, "ephemeral note");
        assert!(index.search("ephemeral", 10).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_rebuild_from_stream() {
        let docs = vec![(4u64, "alpha beta".to_string()), (9u64, "beta gamma".to_string())];
        let index = Bm25Index::rebuild(docs.into_iter());
        assert_eq!(index.len(), 2);
        let results = index.search("gamma", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 9);
    }

    #[test]
    fn test_k_truncates() {
        let mut index = Bm25Index::new();
        for slot in 0..20 {
            index.add_document(slot, "shared term document");
        }
        assert_eq!(index.search("shared", 5).len(), 5);
    }
}
