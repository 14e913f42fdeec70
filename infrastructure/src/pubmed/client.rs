//! PubMed literature search over NCBI E-utilities.
//!
//! Two calls per search: `esearch` (JSON) for the ids ranked by relevance,
//! then `efetch` (XML) for titles, abstracts, authors, journal, date and DOI.

use crate::config::FileLiteratureConfig;
use crate::http::{classify_status, classify_transport, user_agent};
use async_trait::async_trait;
use crew_application::LiteratureSearch;
use crew_domain::{Article, ExternalFailure};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Authors kept per article
const MAX_AUTHORS: usize = 5;

#[derive(Error, Debug)]
pub enum PubMedError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

/// Compiled patterns for the subset of PubmedArticleSet XML that is used
struct ArticlePatterns {
    article: Regex,
    pmid: Regex,
    title: Regex,
    abstract_text: Regex,
    author: Regex,
    last_name: Regex,
    fore_name: Regex,
    journal: Regex,
    year: Regex,
    doi: Regex,
    tag: Regex,
}

impl ArticlePatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            article: Regex::new(r"(?s)<PubmedArticle>(.*?)</PubmedArticle>")?,
            pmid: Regex::new(r"<PMID[^>]*>(\d+)</PMID>")?,
            title: Regex::new(r"(?s)<ArticleTitle[^>]*>(.*?)</ArticleTitle>")?,
            abstract_text: Regex::new(r"(?s)<AbstractText([^>]*)>(.*?)</AbstractText>")?,
            author: Regex::new(r"(?s)<Author(?:\s[^>]*)?>(.*?)</Author>")?,
            last_name: Regex::new(r"<LastName>(.*?)</LastName>")?,
            fore_name: Regex::new(r"<ForeName>(.*?)</ForeName>")?,
            journal: Regex::new(r"(?s)<Journal>.*?<Title>(.*?)</Title>")?,
            year: Regex::new(r"(?s)<PubDate>.*?<Year>(\d{4})</Year>")?,
            doi: Regex::new(r#"<ArticleId IdType="doi">(.*?)</ArticleId>"#)?,
            tag: Regex::new(r"<[^>]+>")?,
        })
    }

    /// Inner text with markup removed and entities decoded
    fn text(&self, raw: &str) -> String {
        let stripped = self.tag.replace_all(raw, "");
        stripped
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn capture(&self, re: &Regex, block: &str) -> Option<String> {
        re.captures(block)
            .and_then(|c| c.get(1))
            .map(|m| self.text(m.as_str()))
            .filter(|s| !s.is_empty())
    }

    fn parse(&self, xml: &str) -> Vec<Article> {
        self.article
            .captures_iter(xml)
            .filter_map(|c| c.get(1))
            .filter_map(|block| self.parse_article(block.as_str()))
            .collect()
    }

    fn parse_article(&self, block: &str) -> Option<Article> {
        let pmid = self.capture(&self.pmid, block)?;
        let title = self
            .capture(&self.title, block)
            .unwrap_or_else(|| "Untitled".to_string());
        let mut article = Article::new(pmid.clone(), title);

        article.abstract_text = self
            .abstract_text
            .captures_iter(block)
            .filter_map(|c| {
                let text = self.text(c.get(2)?.as_str());
                let label = c
                    .get(1)
                    .and_then(|attrs| attrs.as_str().split("Label=\"").nth(1))
                    .and_then(|rest| rest.split('"').next())
                    .filter(|l| !l.is_empty());
                Some(match label {
                    Some(label) => format!("{}: {}", label, text),
                    None => text,
                })
            })
            .collect::<Vec<_>>()
            .join(" ");

        let authors: Vec<String> = self
            .author
            .captures_iter(block)
            .filter_map(|c| {
                let author = c.get(1)?.as_str();
                // Collective names carry no LastName
                let last = self.capture(&self.last_name, author)?;
                let fore = self.capture(&self.fore_name, author).unwrap_or_default();
                Some(format!("{} {}", last, fore).trim().to_string())
            })
            .take(MAX_AUTHORS)
            .collect();

        article.metadata.insert("authors".to_string(), json!(authors));
        if let Some(journal) = self.capture(&self.journal, block) {
            article.metadata.insert("journal".to_string(), Value::String(journal));
        }
        if let Some(year) = self.capture(&self.year, block) {
            article.metadata.insert("publication_year".to_string(), Value::String(year));
        }
        if let Some(doi) = self.capture(&self.doi, block) {
            article.metadata.insert("doi".to_string(), Value::String(doi));
        }
        article.metadata.insert(
            "url".to_string(),
            Value::String(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)),
        );
        Some(article)
    }
}

/// [`LiteratureSearch`] backed by PubMed
pub struct PubMedClient {
    client: reqwest::Client,
    base_url: String,
    tool: String,
    email: Option<String>,
    api_key: Option<String>,
    patterns: ArticlePatterns,
}

impl PubMedClient {
    pub fn from_config(config: &FileLiteratureConfig) -> Result<Self, PubMedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .user_agent(user_agent())
            .build()?;

        info!(base_url = %config.base_url, "PubMed client initialized");
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tool: config.tool.clone(),
            email: config.email.clone().filter(|e| !e.trim().is_empty()),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            patterns: ArticlePatterns::compile()?,
        })
    }

    /// Identification parameters NCBI expects on every call
    fn identity(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", self.tool.clone())];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    async fn get(
        &self,
        endpoint: &str,
        params: Vec<(&'static str, String)>,
    ) -> Result<String, ExternalFailure> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(&params)
            .query(&self.identity())
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_transport(&e))?;
        if !status.is_success() {
            return Err(classify_status(status, &crew_domain::truncate(body.trim(), 200)));
        }
        Ok(body)
    }

    async fn search_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>, ExternalFailure> {
        let body = self
            .get(
                "esearch.fcgi",
                vec![
                    ("db", "pubmed".to_string()),
                    ("term", query.to_string()),
                    ("retmax", max_results.to_string()),
                    ("sort", "relevance".to_string()),
                    ("retmode", "json".to_string()),
                ],
            )
            .await?;

        let envelope: SearchEnvelope = serde_json::from_str(&body).map_err(|e| {
            ExternalFailure::terminal(format!("Malformed esearch response: {}", e))
        })?;
        if let Some(error) = envelope.esearchresult.error {
            return Err(ExternalFailure::terminal(format!("esearch rejected query: {}", error)));
        }
        Ok(envelope.esearchresult.idlist)
    }

    async fn fetch_articles(&self, ids: &[String]) -> Result<Vec<Article>, ExternalFailure> {
        let xml = self
            .get(
                "efetch.fcgi",
                vec![
                    ("db", "pubmed".to_string()),
                    ("id", ids.join(",")),
                    ("rettype", "abstract".to_string()),
                    ("retmode", "xml".to_string()),
                ],
            )
            .await?;
        Ok(self.patterns.parse(&xml))
    }
}

#[async_trait]
impl LiteratureSearch for PubMedClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Article>, ExternalFailure> {
        if query.trim().is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let ids = self.search_ids(query, max_results).await?;
        debug!(query, hits = ids.len(), "PubMed search");
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut articles = self.fetch_articles(&ids).await?;
        // efetch does not promise relevance order
        articles.sort_by_key(|a| ids.iter().position(|id| *id == a.id).unwrap_or(usize::MAX));
        Ok(articles)
    }
}
