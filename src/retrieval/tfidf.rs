//! Character n-gram tf-idf retrieval over the RAG corpus.
//!
//! The index is built offline from the same corpus the semantic store
//! embeds, persisted as JSON and loaded read-only at startup. Character
//! n-grams (2..=4, word-boundary padded) give good recall on Russian
//! morphology without stemming.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::document::Document;
use crate::error::{Error, Result};

/// Index construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfOptions {
    /// Minimum document frequency for a term
    pub min_df: usize,
    /// Maximum document-frequency ratio for a term
    pub max_df_ratio: f64,
    /// Vocabulary size cap, most frequent first
    pub max_features: usize,
    /// Smallest n-gram length
    pub ngram_min: usize,
    /// Largest n-gram length
    pub ngram_max: usize,
}

impl Default for TfidfOptions {
    fn default() -> Self {
        Self {
            min_df: 2,
            max_df_ratio: 0.8,
            max_features: 10_000,
            ngram_min: 2,
            ngram_max: 4,
        }
    }
}

/// Sparse vector sorted by term index.
type SparseVec = Vec<(u32, f32)>;

/// Persisted tf-idf index.
#[derive(Debug, Serialize, Deserialize)]
pub struct TfidfIndex {
    options: TfidfOptions,
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
    doc_vectors: Vec<SparseVec>,
    documents: Vec<Document>,
}

pub(crate) const RUSSIAN_STOPWORDS: &[&str] = &[
    "и", "в", "во", "не", "что", "он", "на", "я", "с", "со", "как", "а", "то", "все", "она",
    "так", "его", "но", "да", "ты", "к", "у", "же", "вы", "за", "бы", "по", "только", "ее",
    "мне", "было", "вот", "от", "меня", "еще", "нет", "о", "из", "ему", "теперь", "когда",
    "даже", "ну", "ли", "если", "уже", "или", "ни", "быть", "был", "него", "до", "вас",
    "вам", "ведь", "там", "потом", "себя", "ничего", "ей", "может", "они", "тут", "где",
    "есть", "надо", "ней", "для", "мы", "тебя", "их", "чем", "была", "сам", "чтоб", "без",
    "будто", "чего", "раз", "тоже", "себе", "под", "будет", "ж", "тогда", "кто", "этот",
    "того", "потому", "этого", "какой", "совсем", "ним", "здесь", "этом", "один", "почти",
    "мой", "тем", "чтобы", "нее",
];

fn is_stopword(word: &str) -> bool {
    RUSSIAN_STOPWORDS.contains(&word)
}

impl TfidfIndex {
    /// Build an index from a corpus.
    pub fn build(documents: Vec<Document>, options: TfidfOptions) -> Self {
        let n_docs = documents.len();
        let mut doc_grams: Vec<HashMap<String, u32>> = Vec::with_capacity(n_docs);
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for doc in &documents {
            let grams = extract_ngrams(&doc.content, options.ngram_min, options.ngram_max);
            for gram in grams.keys() {
                *document_frequency.entry(gram.clone()).or_insert(0) += 1;
            }
            doc_grams.push(grams);
        }

        let max_df = ((n_docs as f64) * options.max_df_ratio).ceil() as usize;
        let mut terms: Vec<(&String, &usize)> = document_frequency
            .iter()
            .filter(|(_, df)| **df >= options.min_df && **df <= max_df.max(1))
            .collect();

        // A tiny corpus can leave nothing above min_df; fall back to
        // keeping every term rather than producing a dead index.
        if terms.is_empty() && !document_frequency.is_empty() {
            warn!("min_df filtered out the whole vocabulary, keeping all terms");
            terms = document_frequency.iter().collect();
        }

        terms.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        terms.truncate(options.max_features);

        let mut vocabulary = HashMap::with_capacity(terms.len());
        let mut idf = Vec::with_capacity(terms.len());
        for (index, (term, df)) in terms.into_iter().enumerate() {
            vocabulary.insert(term.clone(), index as u32);
            // Smoothed idf, never zero.
            idf.push((((1 + n_docs) as f32) / ((1 + *df) as f32)).ln() + 1.0);
        }

        let doc_vectors = doc_grams
            .into_iter()
            .map(|grams| vectorize(&grams, &vocabulary, &idf))
            .collect();

        info!(
            documents = n_docs,
            vocabulary = vocabulary.len(),
            "tf-idf index built"
        );

        Self {
            options,
            vocabulary,
            idf,
            doc_vectors,
            documents,
        }
    }

    /// Load a persisted index.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| Error::Storage(e.to_string()))?;
        let index: Self = serde_json::from_str(&data)?;
        info!(
            documents = index.documents.len(),
            vocabulary = index.vocabulary.len(),
            "tf-idf index loaded"
        );
        Ok(index)
    }

    /// Persist the index as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string(self)?;
        std::fs::write(path, data).map_err(|e| Error::Storage(e.to_string()))
    }

    /// Whether the index can serve queries.
    pub fn is_ready(&self) -> bool {
        !self.vocabulary.is_empty() && !self.documents.is_empty()
    }

    /// Top-k documents by cosine similarity; zero-similarity results
    /// are dropped.
    pub fn search(&self, query: &str, k: usize) -> Vec<Document> {
        if !self.is_ready() {
            return Vec::new();
        }

        let grams = extract_ngrams(query, self.options.ngram_min, self.options.ngram_max);
        let query_vector = vectorize(&grams, &self.vocabulary, &self.idf);
        if query_vector.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f32, usize)> = self
            .doc_vectors
            .iter()
            .enumerate()
            .map(|(i, dv)| (sparse_dot(&query_vector, dv), i))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(score, i)| {
                self.documents[i]
                    .clone()
                    .with_metadata("tfidf_score", serde_json::json!(score))
                    .with_relevance(f64::from(score.clamp(0.0, 1.0)))
            })
            .collect()
    }
}

/// Word-boundary padded character n-grams, stopwords removed.
fn extract_ngrams(text: &str, min_n: usize, max_n: usize) -> HashMap<String, u32> {
    let mut grams: HashMap<String, u32> = HashMap::new();
    let lowered = text.to_lowercase();

    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !is_stopword(w))
    {
        let padded: Vec<char> = std::iter::once(' ')
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for n in min_n..=max_n {
            if padded.len() < n {
                continue;
            }
            for window in padded.windows(n) {
                let gram: String = window.iter().collect();
                *grams.entry(gram).or_insert(0) += 1;
            }
        }
    }
    grams
}

/// tf·idf weighted, L2-normalized sparse vector.
fn vectorize(grams: &HashMap<String, u32>, vocabulary: &HashMap<String, u32>, idf: &[f32]) -> SparseVec {
    let mut vector: SparseVec = grams
        .iter()
        .filter_map(|(gram, count)| {
            vocabulary
                .get(gram)
                .map(|&index| (index, *count as f32 * idf[index as usize]))
        })
        .collect();

    vector.sort_by_key(|(index, _)| *index);

    let norm: f32 = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, w) in &mut vector {
            *w /= norm;
        }
    }
    vector
}

/// Dot product of two index-sorted sparse vectors.
fn sparse_dot(a: &SparseVec, b: &SparseVec) -> f32 {
    let mut sum = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("Быстрая сортировка делит массив вокруг опорного элемента", "rag"),
            Document::new("Быстрая сортировка работает за O(n log n) в среднем", "rag"),
            Document::new("Сортировка слиянием устойчива и работает за O(n log n)", "rag"),
            Document::new("Обход графа в ширину использует очередь", "rag"),
            Document::new("Обход графа в глубину использует стек", "rag"),
        ]
    }

    #[test]
    fn test_search_ranks_matching_documents_first(){
        let index = TfidfIndex::build(corpus(), TfidfOptions::default());
        assert!(index.is_ready());

        let results = index.search("быстрая сортировка", 3);
        assert!(!results.is_empty());
        assert!(results[0].content.contains("Быстрая сортировка"));
        assert!(results[0].metadata.contains_key("tfidf_score"));
    }

    #[test]
    fn test_unrelated_query_returns_nothing_or_low() {
        let index = TfidfIndex::build(corpus(), TfidfOptions::default());
        let results = index.search("xyzzy qwerty", 3);
        assert!(results.is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tfidf.json");

        let index = TfidfIndex::build(corpus(), TfidfOptions::default());
        index.save(&path).unwrap();

        let loaded = TfidfIndex::load(&path).unwrap();
        assert!(loaded.is_ready());
        let results = loaded.search("обход графа", 2);
        assert!(!results.is_empty());
        assert!(results[0].content.contains("графа"));
    }

    #[test]
    fn test_empty_corpus_is_not_ready() {
        let index = TfidfIndex::build(Vec::new(), TfidfOptions::default());
        assert!(!index.is_ready());
        assert!(index.search("сортировка", 5).is_empty());
    }

    #[test]
    fn test_tiny_corpus_falls_back_below_min_df() {
        // A single document cannot satisfy min_df=2.
        let index = TfidfIndex::build(
            vec![Document::new("уникальная быстрая сортировка", "rag")],
            TfidfOptions::default(),
        );
        assert!(index.is_ready());
        assert!(!index.search("быстрая сортировка", 1).is_empty());
    }

    #[test]
    fn test_stopwords_do_not_match() {
        let index = TfidfIndex::build(corpus(), TfidfOptions::default());
        // Pure stopword query vectorizes to nothing.
        assert!(index.search("и в на с", 3).is_empty());
    }
}
