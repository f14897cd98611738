//! The external semantic retrieval service, abstracted as a trait so the
//! agents depend on a capability rather than a concrete backend — the same
//! shape as [`sa_providers::LlmProvider`].
//!
//! The bundled [`KeywordFaqStore`] is a keyword-overlap stand-in: production
//! deployments would swap in a real embedding-backed retriever behind the
//! same trait.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use sa_domain::error::{Error, Result};

/// Fixed topic words that mark an utterance as an FAQ-shaped question.
pub const FAQ_TOPIC_WORDS: &[&str] = &[
    "horario", "horarios", "devolución", "devolucion", "envío", "envio", "pago", "pagos",
    "garantía", "garantia", "ubicación", "ubicacion", "tienda",
];

pub fn looks_like_faq(utterance: &str) -> bool {
    let lower = utterance.to_lowercase();
    FAQ_TOPIC_WORDS.iter().any(|w| lower.contains(w))
}

#[async_trait::async_trait]
pub trait FaqRetriever: Send + Sync {
    /// Return up to `k` passages relevant to `query`, best first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Deserialize)]
struct FaqFixture {
    entries: Vec<FaqEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct FaqEntry {
    keywords: Vec<String>,
    passage: String,
}

/// Keyword-overlap FAQ store, seeded from a JSON fixture at startup.
pub struct KeywordFaqStore {
    entries: Vec<FaqEntry>,
}

impl KeywordFaqStore {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        let fixture: FaqFixture = serde_json::from_str(&raw)?;
        Ok(Self {
            entries: fixture.entries,
        })
    }

    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    fn score(entry: &FaqEntry, query_lower: &str) -> usize {
        entry
            .keywords
            .iter()
            .filter(|k| query_lower.contains(k.as_str()))
            .count()
    }
}

#[async_trait::async_trait]
impl FaqRetriever for KeywordFaqStore {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        let query_lower = query.to_lowercase();
        let mut scored: Vec<(usize, &str)> = self
            .entries
            .iter()
            .map(|e| (Self::score(e, &query_lower), e.passage.as_str()))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(k).map(|(_, p)| p.to_string()).collect())
    }
}

/// Strip a leading "Answer:" prefix from a retrieved passage, if present.
pub fn strip_answer_prefix(passage: &str) -> &str {
    passage
        .strip_prefix("Answer:")
        .or_else(|| passage.strip_prefix("Respuesta:"))
        .map(str::trim)
        .unwrap_or(passage)
}

/// A static `HashMap` view, useful for tests that want direct entries
/// without going through a fixture file.
#[cfg(test)]
pub(crate) fn fixture_store(entries: HashMap<&str, &str>) -> KeywordFaqStore {
    KeywordFaqStore {
        entries: entries
            .into_iter()
            .map(|(kw, passage)| FaqEntry {
                keywords: vec![kw.to_string()],
                passage: passage.to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retrieve_ranks_by_keyword_overlap() {
        let store = fixture_store(HashMap::from([
            ("envío", "Respuesta: el envío tarda 3 días."),
            ("garantía", "La garantía dura un año."),
        ]));
        let results = store.retrieve("cuanto tarda el envío", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].contains("3 días"));
    }

    #[test]
    fn answer_prefix_is_stripped() {
        assert_eq!(strip_answer_prefix("Answer: hola"), "hola");
        assert_eq!(strip_answer_prefix("sin prefijo"), "sin prefijo");
    }

    #[test]
    fn looks_like_faq_detects_topic_words() {
        assert!(looks_like_faq("¿Cuál es el horario de atención?"));
        assert!(!looks_like_faq("busco zapatillas nike"));
    }
}
