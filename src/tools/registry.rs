//! Name→tool registry with aliases and lazy initialization.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::llm::ModelRouter;
use crate::memory::MemoryManager;
use crate::retrieval::TfidfIndex;
use crate::store::VectorStore;

use super::adaptive_rag::AdaptiveRagTool;
use super::concepts::ConceptExtractorTool;
use super::corrective::CorrectiveRagTool;
use super::memory_lookup::MemoryRetrievalTool;
use super::params::ToolParams;
use super::web_scraper::{WebScraper, WebScraperTool};
use super::web_search::WebSearchTool;
use super::Tool;

/// Alias → canonical tool name.
const ALIASES: &[(&str, &str)] = &[
    ("adaptive_rag", "adaptive_rag_search"),
    ("adaptive_rag_search", "adaptive_rag_search"),
    ("rag_adaptive", "adaptive_rag_search"),
    ("corrective_rag", "corrective_check"),
    ("corrective_check", "corrective_check"),
    ("rag_corrective", "corrective_check"),
    ("web_search", "web_search"),
    ("search_web", "web_search"),
    ("search", "web_search"),
    ("web_scraper", "web_scraper"),
    ("scrape_web", "web_scraper"),
    ("fetch_content", "web_scraper"),
    ("concept_extractor", "extract_concepts"),
    ("extract_concepts", "extract_concepts"),
    ("concepts", "extract_concepts"),
    ("memory_retrieval", "memory_retrieval"),
    ("retrieve_memory", "memory_retrieval"),
    ("memory_search", "memory_retrieval"),
];

/// Shared dependencies the tools are built from.
pub struct ToolContext {
    pub settings: Arc<Settings>,
    pub router: Arc<ModelRouter>,
    pub vector: Arc<dyn VectorStore>,
    pub tfidf: Option<Arc<TfidfIndex>>,
    pub memory: Arc<MemoryManager>,
}

/// Registry of singleton tools, built lazily on first lookup and
/// read-only afterwards.
pub struct ToolRegistry {
    context: ToolContext,
    tools: OnceLock<HashMap<&'static str, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context,
            tools: OnceLock::new(),
        }
    }

    fn tools(&self) -> &HashMap<&'static str, Arc<dyn Tool>> {
        self.tools.get_or_init(|| {
            let ctx = &self.context;
            let scraper = Arc::new(WebScraper::new(ctx.settings.web_scraper.clone()));

            let mut tools: HashMap<&'static str, Arc<dyn Tool>> = HashMap::new();
            tools.insert(
                "adaptive_rag_search",
                Arc::new(AdaptiveRagTool::new(
                    ctx.settings.adaptive_rag.clone(),
                    Arc::clone(&ctx.vector),
                    ctx.tfidf.clone(),
                )),
            );
            tools.insert(
                "corrective_check",
                Arc::new(CorrectiveRagTool::new(
                    ctx.settings.corrective.clone(),
                    Arc::clone(&ctx.router),
                )),
            );
            tools.insert(
                "web_search",
                Arc::new(WebSearchTool::new(
                    ctx.settings.web_search.clone(),
                    Arc::clone(&scraper),
                )),
            );
            tools.insert(
                "web_scraper",
                Arc::new(WebScraperTool::new(scraper, ctx.settings.web_scraper.clone())),
            );
            tools.insert("extract_concepts", Arc::new(ConceptExtractorTool::new()));
            tools.insert(
                "memory_retrieval",
                Arc::new(MemoryRetrievalTool::new(
                    ctx.settings.memory.clone(),
                    Arc::clone(&ctx.memory),
                )),
            );

            info!(count = tools.len(), "tool registry initialized");
            tools
        })
    }

    /// Canonical name for a tool name or alias.
    pub fn canonical(&self, name_or_alias: &str) -> Option<&'static str> {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == name_or_alias)
            .map(|(_, canonical)| *canonical)
    }

    /// Tool by name or alias.
    pub fn get(&self, name_or_alias: &str) -> Option<Arc<dyn Tool>> {
        let Some(canonical) = self.canonical(name_or_alias) else {
            warn!(name = name_or_alias, "tool not found");
            return None;
        };
        self.tools().get(canonical).cloned()
    }

    /// Parse a free-form parameter map for the named tool, rejecting
    /// unknown tools and ill-typed parameters before any I/O.
    pub fn parse_params(&self, name_or_alias: &str, raw: &Value) -> Result<ToolParams> {
        let canonical = self
            .canonical(name_or_alias)
            .ok_or_else(|| crate::error::Error::tool(name_or_alias, "unknown tool"))?;
        ToolParams::parse(canonical, raw)
    }

    /// Canonical names of all registered tools.
    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools().keys().copied().collect();
        names.sort_unstable();
        names
    }
}
