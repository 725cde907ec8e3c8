//! Knowledge base retrieval — snippets that ground generated drafts.
//!
//! Retrieval is an external collaborator; the engine consumes it through the
//! [`KnowledgeStore`] trait and never owns the documents. The bundled
//! in-memory store does naive term-overlap scoring, enough for local runs and
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A retrieved reference text with its similarity score (0.0–1.0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub document_title: String,
    pub content: String,
    pub similarity: f32,
}

/// Knowledge retrieval boundary.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Return up to `k` snippets most similar to `query`, best first.
    async fn search(&self, query: &str, k: usize) -> Vec<KnowledgeSnippet>;
}

/// A knowledge document held by the in-memory store.
#[derive(Debug, Clone)]
pub struct KnowledgeDocument {
    pub title: String,
    pub content: String,
}

/// In-memory store with term-overlap scoring.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    documents: Vec<KnowledgeDocument>,
}

impl InMemoryKnowledgeStore {
    pub fn new(documents: Vec<KnowledgeDocument>) -> Self {
        Self { documents }
    }

    /// Fraction of query terms that appear in the document.
    fn score(query_terms: &[String], doc: &KnowledgeDocument) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let haystack = format!("{} {}", doc.title, doc.content).to_lowercase();
        let hits = query_terms
            .iter()
            .filter(|t| haystack.contains(t.as_str()))
            .count();
        hits as f32 / query_terms.len() as f32
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn search(&self, query: &str, k: usize) -> Vec<KnowledgeSnippet> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(String::from)
            .collect();

        let mut scored: Vec<KnowledgeSnippet> = self
            .documents
            .iter()
            .map(|doc| KnowledgeSnippet {
                document_title: doc.title.clone(),
                content: doc.content.clone(),
                similarity: Self::score(&terms, doc),
            })
            .filter(|s| s.similarity > 0.0)
            .collect();

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(k);
        scored
    }
}
