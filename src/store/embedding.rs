//! Text embedders backing the in-process vector store.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Produces fixed-size embeddings for similarity search.
pub trait Embedder: Send + Sync {
    /// Embedding dimensionality.
    fn dimensions(&self) -> usize;

    /// Embed a text into a vector of `dimensions()` length.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic hashed n-gram embedder.
///
/// Buckets word tokens and character trigrams into a fixed-size vector
/// and L2-normalizes. Not a semantic model: it is the degraded-mode
/// and test-time stand-in that still gives lexical-overlap similarity,
/// so memory and RAG keep functioning when no embedding service is
/// configured.
pub struct HashedNgramEmbedder {
    dimensions: usize,
}

impl HashedNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimensions
    }
}

impl Default for HashedNgramEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashedNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            vector[self.bucket(word)] += 1.0;

            let chars: Vec<char> = word.chars().collect();
            if chars.len() >= 3 {
                for window in chars.windows(3) {
                    let gram: String = window.iter().collect();
                    vector[self.bucket(&gram)] += 0.5;
                }
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_deterministic() {
        let embedder = HashedNgramEmbedder::default();
        assert_eq!(embedder.embed("быстрая сортировка"), embedder.embed("быстрая сортировка"));
    }

    #[test]
    fn test_similar_texts_score_higher() {
        let embedder = HashedNgramEmbedder::default();
        let query = embedder.embed("быстрая сортировка quicksort");
        let near = embedder.embed("быстрая сортировка это алгоритм quicksort");
        let distant = embedder.embed("кулинарный рецепт борща со сметаной");

        let close = cosine_similarity(&query, &near);
        let far = cosine_similarity(&query, &distant);
        assert!(close > far, "close={close} far={far}");
    }

    #[test]
    fn test_vectors_are_normalized() {
        let embedder = HashedNgramEmbedder::default();
        let v = embedder.embed("дерево отрезков");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_embeds_to_zero() {
        let embedder = HashedNgramEmbedder::default();
        let v = embedder.embed("");
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(cosine_similarity(&v, &v), 0.0);
    }
}
