//! Process-wide metrics: atomic counters over searches, model calls,
//! tools and filtering.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::llm::ModelTier;

/// Atomic counter collector; injected into the orchestrator and
/// engine, safe to share across concurrent searches.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    searches_started: AtomicU64,
    searches_completed: AtomicU64,
    searches_failed: AtomicU64,
    expensive_calls: AtomicU64,
    cheap_calls: AtomicU64,
    tool_invocations: AtomicU64,
    documents_filtered: AtomicU64,
    memory_degraded_events: AtomicU64,
}

/// Point-in-time snapshot of the counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub searches_started: u64,
    pub searches_completed: u64,
    pub searches_failed: u64,
    pub expensive_calls: u64,
    pub cheap_calls: u64,
    pub tool_invocations: u64,
    pub documents_filtered: u64,
    pub memory_degraded_events: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_started(&self) {
        self.searches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn search_completed(&self) {
        self.searches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn search_failed(&self) {
        self.searches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn model_calls(&self, tier: ModelTier, count: u64) {
        match tier {
            ModelTier::Expensive => self.expensive_calls.fetch_add(count, Ordering::Relaxed),
            ModelTier::Cheap => self.cheap_calls.fetch_add(count, Ordering::Relaxed),
        };
    }

    pub fn tool_invoked(&self) {
        self.tool_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn documents_filtered(&self, count: u64) {
        self.documents_filtered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn memory_degraded(&self) {
        self.memory_degraded_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            searches_started: self.searches_started.load(Ordering::Relaxed),
            searches_completed: self.searches_completed.load(Ordering::Relaxed),
            searches_failed: self.searches_failed.load(Ordering::Relaxed),
            expensive_calls: self.expensive_calls.load(Ordering::Relaxed),
            cheap_calls: self.cheap_calls.load(Ordering::Relaxed),
            tool_invocations: self.tool_invocations.load(Ordering::Relaxed),
            documents_filtered: self.documents_filtered.load(Ordering::Relaxed),
            memory_degraded_events: self.memory_degraded_events.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.search_started();
        metrics.search_completed();
        metrics.model_calls(ModelTier::Expensive, 2);
        metrics.model_calls(ModelTier::Cheap, 5);
        metrics.tool_invoked();
        metrics.documents_filtered(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.searches_started, 1);
        assert_eq!(snapshot.searches_completed, 1);
        assert_eq!(snapshot.searches_failed, 0);
        assert_eq!(snapshot.expensive_calls, 2);
        assert_eq!(snapshot.cheap_calls, 5);
        assert_eq!(snapshot.tool_invocations, 1);
        assert_eq!(snapshot.documents_filtered, 3);
    }

    #[test]
    fn test_shared_across_threads() {
        let metrics = std::sync::Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = std::sync::Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.tool_invoked();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().tool_invocations, 400);
    }
}
