//! Rule-based sanitization stage.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::ContentGuardConfig;

/// Result of sanitizing one document.
#[derive(Debug, Clone)]
pub struct SanitizeOutcome {
    pub content: String,
    pub removed: Vec<&'static str>,
}

fn html_tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn suspicious_urls() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            bit\.ly/\S+ | tinyurl\.com/\S+ | goo\.gl/\S+ |
            \S+\.exe\b | \S+\.bat\b | \S+\.sh\b
            ",
        )
        .unwrap()
    })
}

fn emails() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
    })
}

fn multi_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" +").unwrap())
}

fn multi_newline() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

/// Rule-based content sanitizer.
///
/// HTML stripping runs only for web-sourced documents; RAG corpus text
/// is assumed pre-cleaned.
pub struct Sanitizer {
    config: ContentGuardConfig,
}

impl Sanitizer {
    pub fn new(config: ContentGuardConfig) -> Self {
        Self { config }
    }

    pub fn sanitize(&self, content: &str, web_sourced: bool) -> SanitizeOutcome {
        let mut removed = Vec::new();
        let mut text = content.to_string();

        if web_sourced {
            let stripped = html_tags().replace_all(&text, "").into_owned();
            if stripped != text {
                removed.push("html_tags");
                text = stripped;
            }
        }

        if self.config.sanitize_remove_urls {
            let stripped = suspicious_urls().replace_all(&text, "[URL removed]").into_owned();
            if stripped != text {
                removed.push("suspicious_urls");
                text = stripped;
            }
        }

        if self.config.sanitize_remove_emails {
            let stripped = emails().replace_all(&text, "[email removed]").into_owned();
            if stripped != text {
                removed.push("emails");
                text = stripped;
            }
        }

        text = multi_space().replace_all(&text, " ").into_owned();
        text = multi_newline().replace_all(&text, "\n\n").into_owned();
        text = text.trim().to_string();

        if text.chars().count() > self.config.sanitize_max_length {
            text = text.chars().take(self.config.sanitize_max_length).collect();
            text.push_str("...");
            removed.push("truncated");
        }

        SanitizeOutcome { content: text, removed }
    }
}
