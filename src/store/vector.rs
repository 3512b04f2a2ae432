//! Vector store seam and the in-process implementation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::document::Document;
use crate::error::Result;

use super::embedding::{cosine_similarity, Embedder};

/// Metadata predicate for get/delete/search operations.
///
/// All clauses must match: exact equality on `equals`, numeric
/// lower bounds on `min_scores`.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub equals: HashMap<String, Value>,
    pub min_scores: HashMap<String, f64>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equals(mut self, key: impl Into<String>, value: Value) -> Self {
        self.equals.insert(key.into(), value);
        self
    }

    pub fn with_min_score(mut self, key: impl Into<String>, min: f64) -> Self {
        self.min_scores.insert(key.into(), min);
        self
    }

    /// Whether a metadata map satisfies every clause.
    pub fn matches(&self, metadata: &HashMap<String, Value>) -> bool {
        for (key, expected) in &self.equals {
            if metadata.get(key) != Some(expected) {
                return false;
            }
        }
        for (key, min) in &self.min_scores {
            match metadata.get(key).and_then(Value::as_f64) {
                Some(v) if v >= *min => {}
                _ => return false,
            }
        }
        true
    }
}

/// Embedding-indexed document store with named collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-k nearest documents to the query, optionally filtered.
    async fn similarity_search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Document>>;

    /// Append documents; ids are taken from metadata `id` or generated.
    async fn add_documents(&self, collection: &str, documents: &[Document]) -> Result<()>;

    /// All documents matching the filter, in insertion order.
    async fn get(&self, collection: &str, filter: &MetadataFilter) -> Result<Vec<Document>>;

    /// Insert or replace a document by id.
    async fn upsert(&self, collection: &str, id: &str, document: &Document) -> Result<()>;

    /// Delete documents matching the filter.
    async fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<()>;
}

struct StoredDoc {
    id: String,
    document: Document,
    embedding: Vec<f32>,
}

/// In-process vector store over an [`Embedder`].
///
/// Backs tests and the degraded mode; production deployments plug an
/// HTTP-backed store in through the same trait.
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, Vec<StoredDoc>>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn doc_id(document: &Document) -> String {
        document
            .metadata
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Document>> {
        let query_embedding = self.embedder.embed(query);
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, &StoredDoc)> = docs
            .iter()
            .filter(|stored| filter.map_or(true, |f| f.matches(&stored.document.metadata)))
            .map(|stored| (cosine_similarity(&query_embedding, &stored.embedding), stored))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, stored)| {
                stored
                    .document
                    .clone()
                    .with_relevance(f64::from(score.clamp(0.0, 1.0)))
            })
            .collect())
    }

    async fn add_documents(&self, collection: &str, documents: &[Document]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        for document in documents {
            entry.push(StoredDoc {
                id: Self::doc_id(document),
                document: document.clone(),
                embedding: self.embedder.embed(&document.content),
            });
        }
        Ok(())
    }

    async fn get(&self, collection: &str, filter: &MetadataFilter) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|stored| filter.matches(&stored.document.metadata))
                    .map(|stored| stored.document.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(&self, collection: &str, id: &str, document: &Document) -> Result<()> {
        let embedding = self.embedder.embed(&document.content);
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();

        match entry.iter_mut().find(|stored| stored.id == id) {
            Some(stored) => {
                stored.document = document.clone();
                stored.embedding = embedding;
            }
            None => entry.push(StoredDoc {
                id: id.to_string(),
                document: document.clone(),
                embedding,
            }),
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.retain(|stored| !filter.matches(&stored.document.metadata));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::embedding::HashedNgramEmbedder;
    use serde_json::json;

    fn store() -> InMemoryVectorStore {
        InMemoryVectorStore::new(Arc::new(HashedNgramEmbedder::default()))
    }

    #[tokio::test]
    async fn test_similarity_search_ranks_by_relatedness() {
        let store = store();
        store
            .add_documents(
                "rag_corpus",
                &[
                    Document::new("быстрая сортировка разделяет массив вокруг опорного элемента", "rag"),
                    Document::new("рецепт пиццы с грибами и сыром", "rag"),
                ],
            )
            .await
            .unwrap();

        let results = store
            .similarity_search("rag_corpus", "быстрая сортировка массива", 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].content.contains("сортировка"));
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let results = store()
            .similarity_search("нет такой", "запрос", 5, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_filter_equals_and_min_score() {
        let store = store();
        store
            .add_documents(
                "patterns",
                &[
                    Document::new("паттерн успешный", "memory")
                        .with_metadata("category", json!("sorting"))
                        .with_metadata("success_score", json!(0.9)),
                    Document::new("паттерн слабый", "memory")
                        .with_metadata("category", json!("sorting"))
                        .with_metadata("success_score", json!(0.5)),
                ],
            )
            .await
            .unwrap();

        let filter = MetadataFilter::new()
            .with_equals("category", json!("sorting"))
            .with_min_score("success_score", 0.8);
        let results = store.get("patterns", &filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("успешный"));
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = store();
        store
            .upsert("patterns", "pat_1", &Document::new("версия один", "memory"))
            .await
            .unwrap();
        store
            .upsert("patterns", "pat_1", &Document::new("версия два", "memory"))
            .await
            .unwrap();

        let all = store.get("patterns", &MetadataFilter::new()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "версия два");
    }

    #[tokio::test]
    async fn test_delete_by_filter() {
        let store = store();
        store
            .add_documents(
                "working_memory",
                &[
                    Document::new("шаг 1", "wm").with_metadata("session_id", json!("s1")),
                    Document::new("шаг 2", "wm").with_metadata("session_id", json!("s2")),
                ],
            )
            .await
            .unwrap();

        store
            .delete(
                "working_memory",
                &MetadataFilter::new().with_equals("session_id", json!("s1")),
            )
            .await
            .unwrap();

        let rest = store.get("working_memory", &MetadataFilter::new()).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].metadata["session_id"], json!("s2"));
    }
}
