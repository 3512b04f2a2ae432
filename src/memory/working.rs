//! Working memory: the per-session append-only reasoning trace.
//!
//! Primary storage is the vector store's session collection; when it
//! becomes unreachable the store degrades to an in-process map that
//! preserves append order and survives until process exit.

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::document::Document;
use crate::store::{MetadataFilter, VectorStore};

use super::types::WorkingMemoryEntry;

pub struct WorkingMemoryStore {
    vector: Arc<dyn VectorStore>,
    config: MemoryConfig,
    degraded: AtomicBool,
    fallback: Mutex<HashMap<String, Vec<WorkingMemoryEntry>>>,
}

impl WorkingMemoryStore {
    pub fn new(vector: Arc<dyn VectorStore>, config: MemoryConfig) -> Self {
        Self {
            vector,
            config,
            degraded: AtomicBool::new(false),
            fallback: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the store has fallen back to in-process storage.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Append a reasoning step to the session trace.
    pub async fn append_step(&self, entry: WorkingMemoryEntry) {
        if !self.is_degraded() {
            let document = Document::new(
                serde_json::to_string(&entry).unwrap_or_default(),
                "working_memory",
            )
            .with_metadata("session_id", json!(entry.session_id.clone()))
            .with_metadata("iteration", json!(entry.iteration));

            match self
                .vector
                .add_documents(&self.config.working_collection, &[document])
                .await
            {
                Ok(()) => {
                    debug!(session = %entry.session_id, iteration = entry.iteration, "stored step");
                    return;
                }
                Err(e) => {
                    warn!(
                        "{}",
                        crate::error::Error::MemoryDegraded(format!(
                            "working memory write failed: {e}"
                        ))
                    );
                    self.degraded.store(true, Ordering::Relaxed);
                }
            }
        }

        let mut fallback = self.fallback.lock().await;
        fallback
            .entry(entry.session_id.clone())
            .or_default()
            .push(entry);
    }

    /// All steps of a session, in iteration order.
    pub async fn get_session_context(&self, session_id: &str) -> Vec<WorkingMemoryEntry> {
        if !self.is_degraded() {
            let filter = MetadataFilter::new().with_equals("session_id", json!(session_id));
            match self.vector.get(&self.config.working_collection, &filter).await {
                Ok(documents) => {
                    let mut steps: Vec<WorkingMemoryEntry> = documents
                        .iter()
                        .filter_map(|doc| serde_json::from_str(&doc.content).ok())
                        .collect();
                    steps.sort_by_key(|s: &WorkingMemoryEntry| s.iteration);
                    return steps;
                }
                Err(e) => {
                    warn!(error = %e, "working memory read failed, using in-process fallback");
                }
            }
        }

        let fallback = self.fallback.lock().await;
        fallback.get(session_id).cloned().unwrap_or_default()
    }

    /// Remove a finished session from both backends.
    pub async fn clear_session(&self, session_id: &str) {
        let filter = MetadataFilter::new().with_equals("session_id", json!(session_id));
        if let Err(e) = self
            .vector
            .delete(&self.config.working_collection, &filter)
            .await
        {
            warn!(error = %e, "working memory delete failed");
        }

        let mut fallback = self.fallback.lock().await;
        fallback.remove(session_id);
    }

    /// Expire in-process sessions older than the configured TTL.
    ///
    /// Returns the number of sessions removed.
    pub async fn cleanup_old_sessions(&self) -> usize {
        let cutoff = chrono::Utc::now() - chrono::Duration::hours(self.config.working_ttl_hours);
        let mut fallback = self.fallback.lock().await;

        let expired: Vec<String> = fallback
            .iter()
            .filter(|(_, steps)| {
                steps
                    .last()
                    .map(|s| s.timestamp < cutoff)
                    .unwrap_or(true)
            })
            .map(|(session, _)| session.clone())
            .collect();

        for session in &expired {
            fallback.remove(session);
        }

        info!(removed = expired.len(), "cleaned up expired sessions");
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::store::{HashedNgramEmbedder, InMemoryVectorStore};
    use async_trait::async_trait;
    use chrono::Utc;

    fn entry(session: &str, iteration: u32) -> WorkingMemoryEntry {
        WorkingMemoryEntry {
            session_id: session.to_string(),
            iteration,
            node_id: format!("node_{iteration}"),
            depth: iteration,
            thought: "мысль".to_string(),
            tool_used: Some("adaptive_rag_search".to_string()),
            tool_params: json!({"query": "q"}),
            observation: String::new(),
            completeness: 0.4,
            timestamp: Utc::now(),
        }
    }

    fn vector_backed() -> WorkingMemoryStore {
        let store = Arc::new(InMemoryVectorStore::new(Arc::new(HashedNgramEmbedder::default())));
        WorkingMemoryStore::new(store, MemoryConfig::default())
    }

    /// Vector store that always fails, to force the degraded path.
    struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        async fn similarity_search(
            &self,
            _c: &str,
            _q: &str,
            _k: usize,
            _f: Option<&MetadataFilter>,
        ) -> Result<Vec<Document>> {
            Err(Error::Storage("down".into()))
        }

        async fn add_documents(&self, _c: &str, _d: &[Document]) -> Result<()> {
            Err(Error::Storage("down".into()))
        }

        async fn get(&self, _c: &str, _f: &MetadataFilter) -> Result<Vec<Document>> {
            Err(Error::Storage("down".into()))
        }

        async fn upsert(&self, _c: &str, _id: &str, _d: &Document) -> Result<()> {
            Err(Error::Storage("down".into()))
        }

        async fn delete(&self, _c: &str, _f: &MetadataFilter) -> Result<()> {
            Err(Error::Storage("down".into()))
        }
    }

    #[tokio::test]
    async fn test_append_and_read_ordered() {
        let store = vector_backed();
        store.append_step(entry("s1", 2)).await;
        store.append_step(entry("s1", 1)).await;
        store.append_step(entry("s2", 1)).await;

        let steps = store.get_session_context("s1").await;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].iteration, 1);
        assert_eq!(steps[1].iteration, 2);
        assert!(!store.is_degraded());
    }

    #[tokio::test]
    async fn test_degraded_mode_preserves_append_order() {
        let store = WorkingMemoryStore::new(Arc::new(DownStore), MemoryConfig::default());
        store.append_step(entry("s1", 1)).await;
        store.append_step(entry("s1", 2)).await;
        store.append_step(entry("s1", 3)).await;

        assert!(store.is_degraded());
        let steps = store.get_session_context("s1").await;
        assert_eq!(
            steps.iter().map(|s| s.iteration).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_clear_session() {
        let store = vector_backed();
        store.append_step(entry("s1", 1)).await;
        store.clear_session("s1").await;
        assert!(store.get_session_context("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expires_old_sessions() {
        let store = WorkingMemoryStore::new(Arc::new(DownStore), MemoryConfig::default());
        let mut old = entry("old", 1);
        old.timestamp = Utc::now() - chrono::Duration::hours(48);
        store.append_step(old).await;
        store.append_step(entry("fresh", 1)).await;

        let removed = store.cleanup_old_sessions().await;
        assert_eq!(removed, 1);
        assert!(store.get_session_context("old").await.is_empty());
        assert_eq!(store.get_session_context("fresh").await.len(), 1);
    }
}
