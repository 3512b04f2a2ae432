//! Concept extraction: ranked key phrases from text.
//!
//! Two native extractors — a frequency/position keyword ranker and a
//! capitalized-phrase entity scanner — plus a hybrid merge with
//! Jaccard deduplication and a static-vocabulary heuristic fallback.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, warn};

use crate::document::Document;
use crate::retrieval::tfidf::RUSSIAN_STOPWORDS;

use super::params::{ConceptMethod, ConceptParams, ToolParams};
use super::{wrong_params, Tool, ToolResult};

/// Known algorithm and data-structure terms for the heuristic scan and
/// coverage checks.
pub(crate) const DOMAIN_VOCABULARY: &[&str] = &[
    "сортировка",
    "поиск",
    "дерево",
    "граф",
    "хеш",
    "таблица",
    "стек",
    "очередь",
    "список",
    "массив",
    "алгоритм",
    "сложность",
    "o(n)",
    "рекурсия",
    "итерация",
    "динамическое программирование",
    "жадный алгоритм",
    "bfs",
    "dfs",
    "дейкстра",
    "быстрая сортировка",
    "пирамидальная сортировка",
    "двоичное дерево",
    "avl",
    "красно-черное дерево",
    "хеш-таблица",
    "связный список",
];

/// Jaccard word-set similarity between two phrases.
fn jaccard(a: &str, b: &str) -> f64 {
    let words_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let words_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

fn capitalized_phrases() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[А-ЯЁA-Z][а-яёa-z]+(?:\s+[А-ЯЁA-Z][а-яёa-z]+)*").unwrap()
    })
}

fn is_stopword(word: &str) -> bool {
    RUSSIAN_STOPWORDS.contains(&word)
}

pub struct ConceptExtractorTool {
    /// Jaccard threshold above which two phrases are duplicates
    dedup_threshold: f64,
}

impl ConceptExtractorTool {
    pub fn new() -> Self {
        Self {
            dedup_threshold: 0.85,
        }
    }
}

impl Default for ConceptExtractorTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Frequency/position-scored word and bigram ranking.
pub(crate) fn extract_keyword(text: &str, top_n: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();

    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();

    fn record(
        phrase: String,
        position: usize,
        scores: &mut HashMap<String, f64>,
        first_seen: &mut HashMap<String, usize>,
    ) {
        *scores.entry(phrase.clone()).or_insert(0.0) += 1.0;
        first_seen.entry(phrase).or_insert(position);
    }

    for (i, word) in words.iter().enumerate() {
        if word.chars().count() > 3 && !is_stopword(word) {
            record(word.to_string(), i, &mut scores, &mut first_seen);
        }
        if i + 1 < words.len() && !is_stopword(word) && !is_stopword(words[i + 1]) {
            record(format!("{} {}", word, words[i + 1]), i, &mut scores, &mut first_seen);
        }
    }

    let mut ranked: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(phrase, freq)| {
            // Earlier phrases carry more weight.
            let position_boost = 2.0 / (1.0 + first_seen[&phrase] as f64 / 10.0);
            (phrase, freq + position_boost)
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    ranked.into_iter().take(top_n).map(|(phrase, _)| phrase).collect()
}

/// Capitalized-phrase extraction (names, titles, proper terms).
pub(crate) fn extract_entity(text: &str, top_n: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut concepts = Vec::new();

    for found in capitalized_phrases().find_iter(text) {
        let phrase = found.as_str().to_string();
        if phrase.split_whitespace().count() <= 3 && seen.insert(phrase.to_lowercase()) {
            concepts.push(phrase);
            if concepts.len() >= top_n {
                break;
            }
        }
    }
    concepts
}

/// Static domain vocabulary scan followed by capitalized phrases.
pub(crate) fn extract_heuristic(text: &str, top_n: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut concepts: Vec<String> = DOMAIN_VOCABULARY
        .iter()
        .filter(|term| lowered.contains(*term))
        .map(|term| term.to_string())
        .take(top_n)
        .collect();

    if concepts.len() < top_n {
        for phrase in extract_entity(text, top_n - concepts.len()) {
            let lowered = phrase.to_lowercase();
            if !concepts.iter().any(|c| c.to_lowercase() == lowered) {
                concepts.push(phrase);
            }
        }
    }
    concepts.truncate(top_n);
    concepts
}

impl ConceptExtractorTool {
    /// Merge keyword and entity lists, keyword ordering first, fuzzy
    /// duplicates dropped.
    fn merge(&self, keyword: Vec<String>, entity: Vec<String>, top_n: usize) -> Vec<String> {
        let mut merged: Vec<String> = Vec::new();

        for phrase in keyword.into_iter().chain(entity) {
            let lowered = phrase.to_lowercase();
            let duplicate = merged
                .iter()
                .any(|existing| jaccard(&existing.to_lowercase(), &lowered) >= self.dedup_threshold);
            if !duplicate {
                merged.push(phrase);
            }
            if merged.len() >= top_n {
                break;
            }
        }
        merged
    }
}

#[async_trait]
impl Tool for ConceptExtractorTool {
    fn name(&self) -> &'static str {
        "extract_concepts"
    }

    async fn execute(&self, params: ToolParams) -> ToolResult {
        let ToolParams::Concepts(ConceptParams { text, method, top_n }) = params else {
            return wrong_params(self.name());
        };
        if text.is_empty() {
            return ToolResult::failure("text parameter is required");
        }

        let started = Instant::now();
        let top_n = top_n.unwrap_or(10);
        let method = if method == ConceptMethod::Auto {
            ConceptMethod::Keyword
        } else {
            method
        };

        let concepts = match method {
            ConceptMethod::Keyword => extract_keyword(&text, top_n),
            ConceptMethod::Entity => extract_entity(&text, top_n),
            ConceptMethod::Hybrid => self.merge(
                extract_keyword(&text, top_n),
                extract_entity(&text, top_n),
                top_n,
            ),
            ConceptMethod::Heuristic | ConceptMethod::Auto => extract_heuristic(&text, top_n),
        };

        let concepts = if concepts.is_empty() {
            warn!("extraction produced nothing, using heuristic fallback");
            extract_heuristic(&text, top_n)
        } else {
            concepts
        };

        info!(count = concepts.len(), ?method, "extracted concepts");

        let snippet: String = text.chars().take(500).collect();
        let document = Document::new(snippet, "concept_extraction")
            .with_metadata("concepts", json!(concepts))
            .with_metadata("method", json!(format!("{method:?}").to_lowercase()))
            .with_metadata("count", json!(concepts.len()));

        ToolResult {
            success: true,
            documents: vec![document],
            error: None,
            metadata: HashMap::from([
                ("concepts".to_string(), json!(concepts)),
                ("count".to_string(), json!(concepts.len())),
            ]),
            execution_time_ms: started.elapsed().as_millis() as f64,
        }
    }
}
