//! SQLite-backed write-through logging tables.
//!
//! Append-only: one row per search, one row per explored node, rolled-
//! up tool usage per day, content-guard reports and a backup mirror of
//! procedural patterns. Writes are best-effort at the call sites;
//! failures are logged and never abort a search.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::guard::ContentGuardReport;
use crate::memory::ProceduralPattern;
use crate::tree::{ToTResult, TreeNode};

/// SQLite-backed relational log.
pub struct RelationalLog {
    conn: Arc<Mutex<Connection>>,
}

impl RelationalLog {
    /// Open or create the log database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        let log = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        log.initialize_schema()?;
        Ok(log)
    }

    /// Create an in-memory log (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        let log = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        log.initialize_schema()?;
        Ok(log)
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Storage(format!("failed to lock connection: {e}")))?;
        f(&conn).map_err(|e| Error::Storage(e.to_string()))
    }

    fn initialize_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS material_generations (
                    id TEXT PRIMARY KEY,
                    session_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    query TEXT NOT NULL,
                    user_level TEXT NOT NULL,
                    final_completeness REAL NOT NULL,
                    iterations INTEGER NOT NULL,
                    tools_used TEXT NOT NULL,
                    expensive_calls INTEGER NOT NULL,
                    cheap_calls INTEGER NOT NULL,
                    documents_collected INTEGER NOT NULL,
                    total_time_ms REAL NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS tot_node_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    parent_id TEXT,
                    depth INTEGER NOT NULL,
                    thought TEXT NOT NULL,
                    tool_name TEXT,
                    promise REAL NOT NULL,
                    completeness REAL NOT NULL,
                    relevance REAL NOT NULL,
                    quality REAL NOT NULL,
                    status TEXT NOT NULL,
                    execution_time_ms REAL NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS tool_usage_stats (
                    tool_name TEXT NOT NULL,
                    day TEXT NOT NULL,
                    invocations INTEGER NOT NULL DEFAULT 0,
                    successes INTEGER NOT NULL DEFAULT 0,
                    documents INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (tool_name, day)
                );
                CREATE TABLE IF NOT EXISTS content_guard_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    total INTEGER NOT NULL,
                    passed INTEGER NOT NULL,
                    filtered_toxicity INTEGER NOT NULL,
                    filtered_policy INTEGER NOT NULL,
                    filtered_quality INTEGER NOT NULL,
                    avg_toxicity REAL NOT NULL,
                    processing_time_ms REAL NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS procedural_patterns (
                    pattern_id TEXT PRIMARY KEY,
                    category TEXT NOT NULL,
                    user_level TEXT NOT NULL,
                    tools_sequence TEXT NOT NULL,
                    avg_iterations REAL NOT NULL,
                    success_score REAL NOT NULL,
                    usage_count INTEGER NOT NULL,
                    reasoning_pattern TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    last_used TEXT NOT NULL
                );",
            )
        })
    }

    /// One row per finished search.
    #[allow(clippy::too_many_arguments)]
    pub fn log_generation(
        &self,
        session_id: &str,
        user_id: &str,
        query: &str,
        user_level: &str,
        result: &ToTResult,
    ) -> Result<()> {
        let tools: Vec<String> = result.tools_used.iter().cloned().collect();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO material_generations (
                    id, session_id, user_id, query, user_level, final_completeness,
                    iterations, tools_used, expensive_calls, cheap_calls,
                    documents_collected, total_time_ms, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    session_id,
                    user_id,
                    query,
                    user_level,
                    result.final_completeness,
                    result.iterations,
                    tools.join(","),
                    result.model_usage.expensive as i64,
                    result.model_usage.cheap as i64,
                    result.collected_documents.len() as i64,
                    result.total_time_ms,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// One row per explored node.
    pub fn log_node(&self, session_id: &str, node: &TreeNode) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tot_node_logs (
                    session_id, node_id, parent_id, depth, thought, tool_name,
                    promise, completeness, relevance, quality, status,
                    execution_time_ms, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    session_id,
                    node.id.to_string(),
                    node.parent_id.as_ref().map(ToString::to_string),
                    node.depth,
                    node.thought,
                    node.planned_tool(),
                    node.promise_score,
                    node.completeness_score,
                    node.relevance_score,
                    node.quality_score,
                    node.status.to_string(),
                    node.execution_time_ms,
                    node.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Bump the per-tool daily rollup.
    pub fn record_tool_usage(&self, tool_name: &str, success: bool, documents: usize) -> Result<()> {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tool_usage_stats (tool_name, day, invocations, successes, documents)
                 VALUES (?1, ?2, 1, ?3, ?4)
                 ON CONFLICT(tool_name, day) DO UPDATE SET
                    invocations = invocations + 1,
                    successes = successes + ?3,
                    documents = documents + ?4",
                params![tool_name, day, i64::from(success), documents as i64],
            )?;
            Ok(())
        })
    }

    /// Persist a content-guard report.
    pub fn log_content_guard(&self, session_id: &str, report: &ContentGuardReport) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO content_guard_logs (
                    session_id, total, passed, filtered_toxicity, filtered_policy,
                    filtered_quality, avg_toxicity, processing_time_ms, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    session_id,
                    report.total_documents as i64,
                    report.passed_documents as i64,
                    report.filtered_by_toxicity as i64,
                    report.filtered_by_policy as i64,
                    report.filtered_by_quality as i64,
                    report.avg_toxicity_score,
                    report.processing_time_ms,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Mirror a procedural pattern into the backup table.
    pub fn upsert_pattern(&self, pattern: &ProceduralPattern) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO procedural_patterns (
                    pattern_id, category, user_level, tools_sequence, avg_iterations,
                    success_score, usage_count, reasoning_pattern, created_at, last_used
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(pattern_id) DO UPDATE SET
                    usage_count = excluded.usage_count,
                    last_used = excluded.last_used",
                params![
                    pattern.pattern_id,
                    pattern.category,
                    pattern.user_level,
                    pattern.tools_sequence.join(","),
                    pattern.avg_iterations,
                    pattern.success_score,
                    pattern.usage_count,
                    pattern.reasoning_pattern,
                    pattern.created_at.to_rfc3339(),
                    pattern.last_used.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Row count of a logging table, for maintenance and tests.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        // Table names are fixed by the schema; guard anyway.
        let allowed = [
            "material_generations",
            "tot_node_logs",
            "tool_usage_stats",
            "content_guard_logs",
            "procedural_patterns",
        ];
        if !allowed.contains(&table) {
            return Err(Error::Storage(format!("unknown table: {table}")));
        }
        self.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::llm::TierUsage;
    use std::collections::BTreeSet;

    fn sample_result() -> ToTResult {
        ToTResult {
            best_path: vec![TreeNode::root("q")],
            explored_nodes: vec![TreeNode::root("q")],
            collected_documents: vec![Document::new("контент документа", "rag")],
            final_completeness: 0.9,
            iterations: 2,
            tools_used: BTreeSet::from(["adaptive_rag_search".to_string()]),
            total_time_ms: 1500.0,
            model_usage: TierUsage { expensive: 1, cheap: 3 },
        }
    }

    #[test]
    fn test_schema_and_generation_row() {
        let log = RelationalLog::in_memory().unwrap();
        log.log_generation("sess_1", "user_1", "сортировка", "beginner", &sample_result())
            .unwrap();
        assert_eq!(log.count_rows("material_generations").unwrap(), 1);
    }

    #[test]
    fn test_node_log_row() {
        let log = RelationalLog::in_memory().unwrap();
        let node = TreeNode::root("q");
        log.log_node("sess_1", &node).unwrap();
        assert_eq!(log.count_rows("tot_node_logs").unwrap(), 1);
    }

    #[test]
    fn test_tool_usage_rollup_increments() {
        let log = RelationalLog::in_memory().unwrap();
        log.record_tool_usage("web_search", true, 3).unwrap();
        log.record_tool_usage("web_search", false, 0).unwrap();
        // One rollup row, two invocations recorded.
        assert_eq!(log.count_rows("tool_usage_stats").unwrap(), 1);
    }

    #[test]
    fn test_pattern_mirror_upsert() {
        let log = RelationalLog::in_memory().unwrap();
        let mut pattern = ProceduralPattern::new(
            "sorting",
            "beginner",
            vec!["adaptive_rag_search".into()],
            2.0,
            0.9,
            "теория затем проверка",
        );
        log.upsert_pattern(&pattern).unwrap();
        pattern.usage_count = 5;
        log.upsert_pattern(&pattern).unwrap();
        assert_eq!(log.count_rows("procedural_patterns").unwrap(), 1);
    }

    #[test]
    fn test_count_rows_rejects_unknown_table() {
        let log = RelationalLog::in_memory().unwrap();
        assert!(log.count_rows("users; DROP TABLE x").is_err());
    }
}
