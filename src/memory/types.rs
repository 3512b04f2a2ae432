//! Memory record types and topic category detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context loaded from memory for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryContext {
    /// Fresh session id generated per request
    pub session_id: String,
    pub user_id: String,
    /// Prose summary of retrieved patterns, embedded into the
    /// thought-generation prompt verbatim
    pub procedural_hints: String,
    /// Raw pattern records backing the hints
    pub patterns: Vec<ProceduralPattern>,
}

impl MemoryContext {
    /// Context with no memory available (degraded or cold start).
    pub fn empty(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            procedural_hints: "No prior patterns available".to_string(),
            patterns: Vec::new(),
        }
    }
}

/// Immutable-after-save summary of a successful generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProceduralPattern {
    pub pattern_id: String,
    /// Topic category inferred from query keywords
    pub category: String,
    pub user_level: String,
    /// Ordered tool names along the best path
    pub tools_sequence: Vec<String>,
    pub avg_iterations: f64,
    /// Always at or above the configured save threshold
    pub success_score: f64,
    pub usage_count: u32,
    /// Prose description of the reasoning pattern
    pub reasoning_pattern: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl ProceduralPattern {
    pub fn new(
        category: impl Into<String>,
        user_level: impl Into<String>,
        tools_sequence: Vec<String>,
        avg_iterations: f64,
        success_score: f64,
        reasoning_pattern: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self {
            pattern_id: format!("pat_{}", &hex[..12]),
            category: category.into(),
            user_level: user_level.into(),
            tools_sequence,
            avg_iterations,
            success_score,
            usage_count: 1,
            reasoning_pattern: reasoning_pattern.into(),
            created_at: now,
            last_used: now,
        }
    }
}

/// One reasoning step appended to the per-session trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryEntry {
    pub session_id: String,
    pub iteration: u32,
    pub node_id: String,
    pub depth: u32,
    pub thought: String,
    pub tool_used: Option<String>,
    #[serde(default)]
    pub tool_params: Value,
    #[serde(default)]
    pub observation: String,
    pub completeness: f64,
    pub timestamp: DateTime<Utc>,
}

/// Keyword buckets for topic categories.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("sorting", &["сортировка", "quicksort", "mergesort", "heapsort", "bubble sort"]),
    ("graphs", &["граф", "дейкстра", "bfs", "dfs", "кратчайший путь", "поиск в ширину"]),
    ("dynamic_programming", &["динамическое программирование", "мемоизация", "рюкзак"]),
    ("data_structures", &["структура данных", "дерево", "хеш", "стек", "очередь"]),
    ("complexity", &["сложность", "big o", "время выполнения", "асимптотика"]),
    ("recursion", &["рекурсия", "рекурсивный"]),
    ("greedy", &["жадный алгоритм", "greedy"]),
];

/// Infer the topic category of a query from keyword buckets.
pub fn detect_category(query: &str) -> &'static str {
    let query_lower = query.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|kw| query_lower.contains(kw)) {
            return category;
        }
    }
    "general"
}

/// Format retrieved patterns into the prose hint block.
pub fn format_hints(patterns: &[ProceduralPattern]) -> String {
    if patterns.is_empty() {
        return "No prior patterns available".to_string();
    }

    let mut hints = String::from("## Успешные стратегии из памяти:\n\n");
    for (i, pattern) in patterns.iter().enumerate() {
        let strategy: String = pattern.reasoning_pattern.chars().take(100).collect();
        hints.push_str(&format!(
            "{}. **{}** (успех: {:.2})\n   - Инструменты: {}\n   - Итераций: ~{:.0}\n   - Стратегия: {}...\n\n",
            i + 1,
            pattern.category,
            pattern.success_score,
            pattern.tools_sequence.join(" → "),
            pattern.avg_iterations,
            strategy,
        ));
    }
    hints
}

/// Format one pattern as the readable document returned by the memory
/// retrieval tool.
pub fn format_pattern(pattern: &ProceduralPattern) -> String {
    format!(
        r#"# Успешная стратегия: {}

**Уровень**: {}
**Успешность**: {:.2}
**Использований**: {}
**Среднее количество итераций**: {:.1}

## Последовательность инструментов
{}

## Паттерн рассуждений
{}
"#,
        pattern.category,
        pattern.user_level,
        pattern.success_score,
        pattern.usage_count,
        pattern.avg_iterations,
        pattern.tools_sequence.join(" → "),
        pattern.reasoning_pattern,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_category_buckets() {
        assert_eq!(detect_category("Быстрая сортировка пузырьком"), "sorting");
        assert_eq!(detect_category("алгоритм Дейкстры на графе"), "graphs");
        assert_eq!(detect_category("Задача о рюкзаке"), "dynamic_programming");
        assert_eq!(detect_category("хеш-таблица изнутри"), "data_structures");
        assert_eq!(detect_category("асимптотика и Big O"), "complexity");
        assert_eq!(detect_category("рекурсивный обход"), "recursion");
        assert_eq!(detect_category("жадный алгоритм размена"), "greedy");
        assert_eq!(detect_category("как приготовить пиццу"), "general");
    }

    #[test]
    fn test_format_hints_contains_tool_sequence() {
        let pattern = ProceduralPattern::new(
            "sorting",
            "beginner",
            vec!["adaptive_rag_search".into(), "corrective_check".into()],
            2.0,
            0.92,
            "Сначала теория из RAG, затем проверка качества",
        );
        let hints = format_hints(&[pattern]);
        assert!(hints.contains("adaptive_rag_search → corrective_check"));
        assert!(hints.contains("0.92"));
    }

    #[test]
    fn test_format_hints_empty() {
        assert_eq!(format_hints(&[]), "No prior patterns available");
    }

    #[test]
    fn test_pattern_ids_unique() {
        let a = ProceduralPattern::new("sorting", "beginner", vec![], 1.0, 0.9, "r");
        let b = ProceduralPattern::new("sorting", "beginner", vec![], 1.0, 0.9, "r");
        assert_ne!(a.pattern_id, b.pattern_id);
        assert!(a.pattern_id.starts_with("pat_"));
    }
}
