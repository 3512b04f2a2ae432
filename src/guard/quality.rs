//! Quality gate: final rule-based checks before a document enters the
//! reasoning trace.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::ContentGuardConfig;

/// Quality verdict for one document.
#[derive(Debug, Clone)]
pub struct QualityVerdict {
    pub passed: bool,
    pub length_ok: bool,
    pub sentence_count_ok: bool,
    pub url_ratio_ok: bool,
    pub reason: Option<String>,
}

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").unwrap())
}

pub struct QualityGate {
    config: ContentGuardConfig,
}

impl QualityGate {
    pub fn new(config: ContentGuardConfig) -> Self {
        Self { config }
    }

    pub fn check(&self, content: &str) -> QualityVerdict {
        let length = content.chars().count();
        let length_ok =
            length >= self.config.min_content_length && length <= self.config.max_content_length;

        let sentence_count = content
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count();
        let sentence_count_ok = sentence_count >= self.config.min_sentence_count;

        let url_chars: usize = url_pattern()
            .find_iter(content)
            .map(|m| m.as_str().chars().count())
            .sum();
        let url_ratio = if length > 0 {
            url_chars as f64 / length as f64
        } else {
            0.0
        };
        let url_ratio_ok = url_ratio < self.config.max_url_ratio;

        let passed = length_ok && sentence_count_ok && url_ratio_ok;

        let reason = if passed {
            None
        } else {
            let mut reasons = Vec::new();
            if !length_ok {
                reasons.push(format!(
                    "length not in range [{}, {}]",
                    self.config.min_content_length, self.config.max_content_length
                ));
            }
            if !sentence_count_ok {
                reasons.push(format!(
                    "sentence count < {}",
                    self.config.min_sentence_count
                ));
            }
            if !url_ratio_ok {
                reasons.push("content is mostly URLs".to_string());
            }
            Some(reasons.join("; "))
        };

        QualityVerdict {
            passed,
            length_ok,
            sentence_count_ok,
            url_ratio_ok,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> QualityGate {
        QualityGate::new(ContentGuardConfig::default())
    }

    #[test]
    fn test_good_document_passes() {
        let content = "Быстрая сортировка выбирает опорный элемент. \
                       Затем массив делится на две части. \
                       Каждая часть сортируется рекурсивно.";
        let verdict = gate().check(content);
        assert!(verdict.passed, "{:?}", verdict.reason);
    }

    #[test]
    fn test_short_document_fails_length() {
        let verdict = gate().check("Коротко. Мало.");
        assert!(!verdict.passed);
        assert!(!verdict.length_ok);
        assert!(verdict.reason.unwrap().contains("length"));
    }

    #[test]
    fn test_single_sentence_fails_count() {
        let content = "Одно очень длинное предложение без знаков завершения в середине которое тянется и тянется чтобы пройти проверку длины".to_string();
        let verdict = gate().check(&content);
        assert!(!verdict.passed);
        assert!(!verdict.sentence_count_ok);
    }

    #[test]
    fn test_url_heavy_document_fails() {
        let urls = "https://a.example.com/очень/длинный/путь ".repeat(5);
        let content = format!("Ссылки. Много ссылок. {urls}");
        let verdict = gate().check(&content);
        assert!(!verdict.url_ratio_ok);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_no_urls_ratio_ok() {
        let verdict = gate().check("Текст без ссылок. Совсем без ссылок. Правда без ссылок.");
        assert!(verdict.url_ratio_ok);
    }
}
