//! Document types shared by tools, the content guard and the search tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Number of leading characters that define document identity.
///
/// Two documents with the same first 100 characters are considered the
/// same document. This keeps deduplication cheap (no embedding lookups)
/// at the cost of occasionally merging near-identical chunks.
pub const DEDUP_PREFIX_CHARS: usize = 100;

/// A retrieved or processed text chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Text content
    pub content: String,
    /// Source identifier (URL, corpus id, "memory", ...)
    pub source: String,
    /// Arbitrary key/value metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Relevance score in [0, 1]
    #[serde(default = "default_relevance")]
    pub relevance_score: f64,
}

fn default_relevance() -> f64 {
    1.0
}

impl Document {
    /// Create a document with content and source.
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            metadata: HashMap::new(),
            relevance_score: 1.0,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set the relevance score, clamped to [0, 1].
    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = score.clamp(0.0, 1.0);
        self
    }

    /// The identity prefix used for equality and hashing.
    pub fn dedup_key(&self) -> String {
        self.content.chars().take(DEDUP_PREFIX_CHARS).collect()
    }

    /// Whether this document came from a web source.
    ///
    /// Checked against both the source identifier and the metadata
    /// `source` entry, since tools record provenance in either place.
    pub fn is_web_sourced(&self) -> bool {
        if self.source.to_lowercase().contains("web") || self.source.starts_with("http") {
            return true;
        }
        self.metadata
            .get("source")
            .and_then(Value::as_str)
            .is_some_and(|s| s.to_lowercase().contains("web"))
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.content
            .chars()
            .take(DEDUP_PREFIX_CHARS)
            .eq(other.content.chars().take(DEDUP_PREFIX_CHARS))
    }
}

impl Eq for Document {}

impl Hash for Document {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.content.chars().take(DEDUP_PREFIX_CHARS) {
            c.hash(state);
        }
    }
}

/// A document that has passed through the Content Guard pipeline.
///
/// `content_guarded == true` implies the document passed all four
/// stages; the only constructor that sets the flag is the pipeline
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanDocument {
    /// The (possibly rewritten) document
    pub document: Document,
    /// Passed the full pipeline
    pub content_guarded: bool,
    /// Toxicity score assigned by the first stage
    pub toxicity_score: f64,
    /// Passed the policy compliance stage
    pub policy_compliant: bool,
    /// Went through rule-based sanitization
    pub sanitized: bool,
    /// Passed the quality gate
    pub quality_passed: bool,
}

impl CleanDocument {
    /// Wrap a document without processing it (pipeline disabled).
    pub fn unguarded(document: Document) -> Self {
        Self {
            document,
            content_guarded: false,
            toxicity_score: 0.0,
            policy_compliant: false,
            sanitized: false,
            quality_passed: false,
        }
    }

    /// Unwrap into the inner document.
    pub fn into_document(self) -> Document {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_on_first_100_chars() {
        let base: String = "x".repeat(100);
        let a = Document::new(format!("{base}AAAA"), "rag");
        let b = Document::new(format!("{base}BBBB"), "web");
        assert_eq!(a, b);

        let c = Document::new("y".repeat(100), "rag");
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_set_dedup() {
        let base: String = "п".repeat(100); // multi-byte chars, char-based prefix
        let mut set = HashSet::new();
        set.insert(Document::new(format!("{base} хвост один"), "a"));
        set.insert(Document::new(format!("{base} хвост два"), "b"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_short_documents_compare_fully() {
        let a = Document::new("быстрая сортировка", "rag");
        let b = Document::new("быстрая сортировка", "web");
        let c = Document::new("пирамидальная сортировка", "rag");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_web_source_detection() {
        assert!(Document::new("t", "web_scraper").is_web_sourced());
        assert!(Document::new("t", "https://example.org/page").is_web_sourced());
        assert!(!Document::new("t", "rag_corpus").is_web_sourced());

        let doc = Document::new("t", "")
            .with_metadata("source", serde_json::json!("web_search"));
        assert!(doc.is_web_sourced());
    }

    #[test]
    fn test_relevance_clamped() {
        assert_eq!(Document::new("t", "s").with_relevance(1.7).relevance_score, 1.0);
        assert_eq!(Document::new("t", "s").with_relevance(-0.2).relevance_score, 0.0);
    }
}
