//! Lookup value objects
//!
//! Results of the two external lookups an expert relies on: knowledge-base
//! chunks (quality-scored) and literature articles.

use crate::consultation::entities::{Citation, SourceKind};
use crate::core::string::truncate;
use crate::expert::ExpertId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A scored chunk returned by a knowledge-base similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Similarity in `[0, 1]`, higher is better
    pub score: f64,
}

impl KnowledgeChunk {
    pub fn new(content: impl Into<String>, score: f64) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
            score,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity used for de-duplication across fetches.
    ///
    /// `source` + `chunk_index` metadata when present, the content otherwise.
    pub fn identity(&self) -> String {
        match (self.metadata.get("source"), self.metadata.get("chunk_index")) {
            (Some(source), Some(index)) => format!("{}#{}", value_text(source), value_text(index)),
            (Some(source), None) => format!("{}#{}", value_text(source), self.content),
            _ => self.content.clone(),
        }
    }

    pub fn source_name(&self) -> String {
        self.metadata
            .get("source")
            .map(value_text)
            .unwrap_or_else(|| "knowledge base".to_string())
    }

    pub fn to_citation(&self) -> Citation {
        Citation {
            kind: SourceKind::KnowledgeBase,
            title: self.source_name(),
            excerpt: truncate(&self.content, 300),
            reference: self.metadata.get("source").map(value_text),
            score: Some(self.score),
        }
    }
}

/// Literature query for an expert question: the question followed by the
/// expert's field
pub fn literature_query(question: &str, expert: &ExpertId) -> String {
    format!("{} {}", question.trim(), expert)
}

/// Convert a raw distance (lower is closer) into a similarity score
pub fn distance_to_score(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

/// A literature article returned by a literature search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    /// Authors, journal, publication date, doi, url ...
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Article {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: String::new(),
            metadata: Map::new(),
        }
    }

    pub fn url(&self) -> Option<String> {
        self.metadata.get("url").map(value_text)
    }

    /// Up to three authors, `et al.` beyond that
    pub fn author_line(&self) -> String {
        let authors: Vec<String> = self
            .metadata
            .get("authors")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().map(value_text).collect())
            .unwrap_or_default();
        let mut line = authors.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
        if authors.len() > 3 {
            line.push_str(" et al.");
        }
        line
    }

    pub fn to_citation(&self) -> Citation {
        Citation {
            kind: SourceKind::Literature,
            title: self.title.clone(),
            excerpt: truncate(&self.abstract_text, 300),
            reference: self.url().or_else(|| Some(format!("PMID:{}", self.id))),
            score: None,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render knowledge chunks as a numbered context block for prompts
pub fn format_chunks(chunks: &[KnowledgeChunk]) -> String {
    if chunks.is_empty() {
        return "No relevant information found in the knowledge base.".to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Source {}: {} (score {:.2})]\n{}",
                i + 1,
                chunk.source_name(),
                chunk.score,
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Render articles as a numbered context block for prompts
pub fn format_articles(articles: &[Article]) -> String {
    if articles.is_empty() {
        return "No relevant literature found.".to_string();
    }
    articles
        .iter()
        .enumerate()
        .map(|(i, article)| {
            let mut block = format!("[Article {}]\nTitle: {}\n", i + 1, article.title);
            let authors = article.author_line();
            if !authors.is_empty() {
                block.push_str(&format!("Authors: {}\n", authors));
            }
            if let Some(journal) = article.metadata.get("journal") {
                block.push_str(&format!("Journal: {}\n", value_text(journal)));
            }
            block.push_str(&format!("PMID: {}\n\nAbstract:\n{}", article.id, truncate(&article.abstract_text, 500)));
            if let Some(url) = article.url() {
                block.push_str(&format!("\n\nURL: {}", url));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_identity_prefers_source_and_index() {
        let a = KnowledgeChunk::new("text", 0.9)
            .with_metadata("source", "ada_2024.md")
            .with_metadata("chunk_index", 3);
        assert_eq!(a.identity(), "ada_2024.md#3");

        let b = KnowledgeChunk::new("same text", 0.5);
        assert_eq!(b.identity(), "same text");
    }

    #[test]
    fn test_literature_query_appends_expert() {
        assert_eq!(
            literature_query(" SSRI and QT prolongation ", &ExpertId::new("Cardiology")),
            "SSRI and QT prolongation cardiology"
        );
    }

    #[test]
    fn test_distance_to_score() {
        assert_eq!(distance_to_score(0.0), 1.0);
        assert_eq!(distance_to_score(1.0), 0.5);
        assert_eq!(distance_to_score(-2.0), 1.0);
    }

    #[test]
    fn test_article_author_line_and_citation() {
        let mut article = Article::new("123", "SSRIs and QT");
        article
            .metadata
            .insert("authors".to_string(), json!(["A", "B", "C", "D"]));
        assert_eq!(article.author_line(), "A, B, C et al.");

        let citation = article.to_citation();
        assert_eq!(citation.kind, SourceKind::Literature);
        assert_eq!(citation.reference.as_deref(), Some("PMID:123"));
    }

    #[test]
    fn test_format_empty_lists() {
        assert!(format_chunks(&[]).contains("No relevant information"));
        assert!(format_articles(&[]).contains("No relevant literature"));
    }

    #[test]
    fn test_article_serializes_abstract_field() {
        let mut article = Article::new("1", "T");
        article.abstract_text = "Background".to_string();
        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(value["abstract"], "Background");
    }
}
