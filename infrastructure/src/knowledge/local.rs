//! Local guideline knowledge base.
//!
//! Documents matching a glob pattern under a root directory are split into
//! chunks at headings and blank lines. A document inside a first-level
//! subdirectory belongs to the expert of the same name; documents at the
//! root are shared by every expert.
//!
//! Scoring is lexical: the distance of a chunk is the ratio of missing to
//! matched query terms, so the resulting score is the fraction of distinct
//! query terms the chunk contains.

use async_trait::async_trait;
use crew_application::{KnowledgeLookup, KnowledgeQuery};
use crew_domain::{ExpertId, ExternalFailure, KnowledgeChunk, distance_to_score};
use glob::glob;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Chunks grow paragraph by paragraph up to this many characters
const MAX_CHUNK_CHARS: usize = 1200;

/// Files larger than this are skipped (2 MB)
const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "what", "which", "who", "how", "when", "are", "was", "were",
    "this", "that", "these", "those", "from", "into", "than", "then", "there", "their", "has",
    "have", "had", "not", "but", "can", "should", "would", "could", "does", "did", "any", "all",
    "our", "your", "its", "about", "over", "under", "between", "patient",
];

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Invalid document pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Invalid tokenizer pattern: {0}")]
    Tokenizer(#[from] regex::Error),
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    content: String,
    source: String,
    chunk_index: usize,
    /// `None` for shared documents
    scope: Option<ExpertId>,
    terms: HashSet<String>,
}

/// In-memory lexical index over local guideline documents
pub struct LocalKnowledgeBase {
    root: PathBuf,
    chunks: Vec<IndexedChunk>,
    tokenizer: Regex,
}

impl LocalKnowledgeBase {
    /// Index every file under `root` matching `pattern` (e.g. `**/*.md`).
    ///
    /// A missing root yields an empty index.
    pub fn load(root: impl AsRef<Path>, pattern: &str) -> Result<Self, KnowledgeError> {
        let root = root.as_ref().to_path_buf();
        let tokenizer = Regex::new(r"[\p{L}\p{N}]+")?;
        let mut kb = Self {
            root: root.clone(),
            chunks: Vec::new(),
            tokenizer,
        };

        if !root.is_dir() {
            warn!(root = %root.display(), "Knowledge root not found, index is empty");
            return Ok(kb);
        }

        let full_pattern = format!("{}/{}", root.display(), pattern);
        let mut documents = 0;
        for entry in glob(&full_pattern)?.flatten() {
            if !entry.is_file() {
                continue;
            }
            if let Ok(meta) = fs::metadata(&entry)
                && meta.len() > MAX_FILE_SIZE
            {
                warn!(path = %entry.display(), "Skipping oversized knowledge document");
                continue;
            }
            match fs::read_to_string(&entry) {
                Ok(text) => {
                    kb.add_document(&entry, &text);
                    documents += 1;
                }
                Err(e) => warn!(path = %entry.display(), error = %e, "Skipping unreadable document"),
            }
        }

        info!(
            root = %kb.root.display(),
            documents,
            chunks = kb.chunks.len(),
            "Knowledge base indexed"
        );
        Ok(kb)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn add_document(&mut self, path: &Path, text: &str) {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let scope = scope_of(relative);
        let source = relative.to_string_lossy().replace('\\', "/");

        for (chunk_index, content) in split_chunks(text).into_iter().enumerate() {
            let terms = self.terms(&content);
            if terms.is_empty() {
                continue;
            }
            self.chunks.push(IndexedChunk {
                content,
                source: source.clone(),
                chunk_index,
                scope: scope.clone(),
                terms,
            });
        }
    }

    fn terms(&self, text: &str) -> HashSet<String> {
        self.tokenizer
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|t| t.chars().count() >= 3 && !STOP_WORDS.contains(&t.as_str()))
            .collect()
    }

    fn visible_to(chunk: &IndexedChunk, scope: Option<&ExpertId>) -> bool {
        match (scope, &chunk.scope) {
            (None, _) | (_, None) => true,
            (Some(wanted), Some(owner)) => wanted == owner,
        }
    }
}

/// Expert scope of a document path relative to the root
fn scope_of(relative: &Path) -> Option<ExpertId> {
    let mut components = relative.components();
    let first = components.next()?;
    // A bare file name has no directory component left after it
    components.next()?;
    Some(ExpertId::new(first.as_os_str().to_string_lossy()))
}

/// Split a document at headings and blank lines, merging small paragraphs
fn split_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        current.clear();
    };

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let starts_section = paragraph.starts_with('#');
        if starts_section || current.len() + paragraph.len() > MAX_CHUNK_CHARS {
            flush(&mut current);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    flush(&mut current);
    chunks
}

#[async_trait]
impl KnowledgeLookup for LocalKnowledgeBase {
    async fn search(
        &self,
        query: &KnowledgeQuery,
        threshold: f64,
    ) -> Result<Vec<KnowledgeChunk>, ExternalFailure> {
        let wanted = self.terms(&query.text);
        if wanted.is_empty() || query.top_k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f64, &IndexedChunk)> = self
            .chunks
            .iter()
            .filter(|c| Self::visible_to(c, query.scope.as_ref()))
            .filter_map(|chunk| {
                let matched = wanted.iter().filter(|t| chunk.terms.contains(*t)).count();
                if matched == 0 {
                    return None;
                }
                let missing = wanted.len() - matched;
                let score = distance_to_score(missing as f64 / matched as f64);
                (score >= threshold).then_some((score, chunk))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.source.cmp(&b.1.source))
                .then_with(|| a.1.chunk_index.cmp(&b.1.chunk_index))
        });
        scored.truncate(query.top_k);

        debug!(
            scope = query.scope.as_ref().map(|s| s.as_str()).unwrap_or("*"),
            threshold,
            hits = scored.len(),
            "Knowledge search"
        );

        Ok(scored
            .into_iter()
            .map(|(score, chunk)| {
                let mut hit = KnowledgeChunk::new(chunk.content.clone(), score)
                    .with_metadata("source", chunk.source.clone())
                    .with_metadata("chunk_index", chunk.chunk_index);
                if let Some(scope) = &chunk.scope {
                    hit = hit.with_metadata("specialty", scope.as_str());
                }
                hit
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "cardiology/anticoagulation.md",
            "# Apixaban\n\nReduce apixaban dose in renal impairment with low creatinine clearance.\n\n# Warfarin\n\nMonitor INR weekly after warfarin initiation.",
        );
        write(
            dir.path(),
            "nephrology/ckd.md",
            "Stage 4 chronic kidney disease requires renal dose adjustment of many drugs.",
        );
        write(
            dir.path(),
            "general.md",
            "Renal function should be documented before any anticoagulant dose change.",
        );
        write(dir.path(), "notes.txt", "apixaban renal dose");
        dir
    }

    #[test]
    fn test_split_chunks_breaks_at_headings() {
        let chunks = split_chunks("# A\n\nfirst paragraph\n\nsecond paragraph\n\n# B\n\nthird");
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("second paragraph"));
        assert!(chunks[1].starts_with("# B"));
    }

    #[test]
    fn test_scope_follows_first_directory() {
        assert_eq!(
            scope_of(Path::new("Cardiology/a.md")),
            Some(ExpertId::new("cardiology"))
        );
        assert_eq!(scope_of(Path::new("general.md")), None);
    }

    #[test]
    fn test_load_respects_pattern() {
        let dir = fixture();
        let kb = LocalKnowledgeBase::load(dir.path(), "**/*.md").unwrap();
        // two cardiology sections, one nephrology, one shared
        assert_eq!(kb.len(), 4);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let kb = LocalKnowledgeBase::load(dir.path().join("absent"), "**/*.md").unwrap();
        assert!(kb.is_empty());
    }

    #[tokio::test]
    async fn test_scoped_search_sees_own_and_shared_documents() {
        let dir = fixture();
        let kb = LocalKnowledgeBase::load(dir.path(), "**/*.md").unwrap();
        let query = KnowledgeQuery::new("apixaban renal dose", 5).scoped(ExpertId::new("cardiology"));

        let hits = kb.search(&query, 0.5).await.unwrap();

        let sources: Vec<String> = hits.iter().map(|h| h.source_name()).collect();
        assert_eq!(sources[0], "cardiology/anticoagulation.md");
        assert!((hits[0].score - 1.0).abs() < 1e-9);
        assert!(sources.contains(&"general.md".to_string()));
        assert!(!sources.iter().any(|s| s.starts_with("nephrology")));
        assert_eq!(hits[0].metadata.get("chunk_index"), Some(&serde_json::json!(0)));
        assert_eq!(
            hits[0].metadata.get("specialty"),
            Some(&serde_json::json!("cardiology"))
        );
    }

    #[tokio::test]
    async fn test_threshold_and_top_k_limit_results() {
        let dir = fixture();
        let kb = LocalKnowledgeBase::load(dir.path(), "**/*.md").unwrap();

        let strict = kb
            .search(&KnowledgeQuery::new("apixaban renal dose", 5), 0.99)
            .await
            .unwrap();
        assert_eq!(strict.len(), 1);

        let capped = kb
            .search(&KnowledgeQuery::new("renal dose", 1), 0.0)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
        assert!(capped[0].score >= 0.5);
    }

    #[tokio::test]
    async fn test_stop_words_only_query_returns_nothing() {
        let dir = fixture();
        let kb = LocalKnowledgeBase::load(dir.path(), "**/*.md").unwrap();
        let hits = kb
            .search(&KnowledgeQuery::new("what should the", 5), 0.0)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
