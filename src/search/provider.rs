use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{
    Article, AuthorDetail, AuthorSummary, NewsArticle, WebSearchSummary,
};

/// Failure marker returned by every provider call.
///
/// Transport faults, bad status codes, timeouts and malformed payloads all
/// collapse into this one shape before they reach the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{error}")]
pub struct ProviderError {
    pub error: String,
}

impl ProviderError {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Which external lookup a call (or a failure) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookup {
    Papers,
    SimilarArticles,
    News,
    AuthorSearch,
    AuthorDetail,
    WebSearch,
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Papers => write!(f, "paper search"),
            Lookup::SimilarArticles => write!(f, "similar-articles search"),
            Lookup::News => write!(f, "news search"),
            Lookup::AuthorSearch => write!(f, "author search"),
            Lookup::AuthorDetail => write!(f, "author details lookup"),
            Lookup::WebSearch => write!(f, "web search"),
        }
    }
}

/// The external lookups the dispatch engine can call.
#[async_trait]
pub trait ScholarProvider: Send + Sync {
    /// Ranked articles for a topic, at most `limit`.
    async fn search_papers(&self, topic: &str, limit: usize) -> ProviderResult<Vec<Article>>;

    /// Articles related to the one behind a Scholar related-pages link.
    async fn search_similar(&self, related_link: &str) -> ProviderResult<Vec<Article>>;

    /// Author profiles matching a name.
    async fn search_authors(&self, name: &str) -> ProviderResult<Vec<AuthorSummary>>;

    /// Profile details plus the article links scraped from the profile page.
    async fn author_details(&self, author_id: &str) -> ProviderResult<AuthorDetail>;

    async fn search_news(&self, topic: &str) -> ProviderResult<Vec<NewsArticle>>;

    /// General web search used when an author has no Scholar profile.
    async fn web_search(&self, name: &str) -> ProviderResult<WebSearchSummary>;
}
