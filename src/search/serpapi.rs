//! SerpAPI Client
//!
//! Backs every lookup the assistant performs:
//! - Google Scholar: papers, related articles and author-name search
//! - Google Scholar Author: profile details (plus a scrape of the profile page)
//! - Google News: trending coverage of the current topic
//! - Google Light: general web search when an author has no Scholar profile
//!
//! All engines share one endpoint (`{base_url}/search.json`) and differ only
//! in the `engine` parameter and the shape of the JSON they return.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::models::{
    Article, AuthorArticle, AuthorDetail, AuthorSummary, NewsArticle, WebSearchSummary,
    MAX_ARTICLES,
};
use crate::search::provider::{ProviderError, ProviderResult, ScholarProvider};
use crate::search::scrape::scrape_profile_links;

const DEFAULT_BASE_URL: &str = "https://serpapi.com";

/// Scholar's upper bound for `num` on a single results page.
const MAX_PAGE_SIZE: usize = 20;

/// SerpAPI reports an empty result page as an `error` with this text.
const EMPTY_RESULTS_MARKER: &str = "hasn't returned any results";

/// Errors that can occur during search operations
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("SerpAPI key not configured")]
    NoApiKey,

    #[error("Request error: {0}")]
    RequestFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("SerpAPI returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("SerpAPI error: {0}")]
    Api(String),

    #[error("Failed to parse search results: {0}")]
    ParseError(String),

    #[error("Author not found: {0}")]
    AuthorNotFound(String),

    #[error("Invalid related-articles link: {0}")]
    InvalidRelatedLink(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SearchError::Timeout
        } else {
            SearchError::RequestFailed(e.to_string())
        }
    }
}

impl From<SearchError> for ProviderError {
    fn from(e: SearchError) -> Self {
        ProviderError::new(e.to_string())
    }
}

/// SerpAPI client for scholarly search
pub struct SerpApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    language: String,
    papers_min_year: u32,
    timeout: Duration,
    scrape_timeout: Duration,
}

impl SerpApiClient {
    /// Create a new SerpAPI client with default settings
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            language: "en".to_string(),
            papers_min_year: 2000,
            timeout: Duration::from_secs(10),
            scrape_timeout: Duration::from_secs(15),
        }
    }

    /// Configure client from config. `None` when no key is set.
    pub fn from_config(config: &SearchConfig) -> Option<Self> {
        if config.serpapi_key.is_empty() {
            return None;
        }

        Some(Self {
            http: reqwest::Client::new(),
            api_key: config.serpapi_key.clone(),
            base_url: config.base_url.clone(),
            language: config.language.clone(),
            papers_min_year: config.papers_min_year,
            timeout: config.timeout(),
            scrape_timeout: config.scrape_timeout(),
        })
    }

    /// Point the client at another host (e.g. a local mock)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one SerpAPI query and return the raw JSON body
    async fn fetch(&self, engine: &str, params: &[(&str, String)]) -> Result<Value, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::NoApiKey);
        }

        let mut query: Vec<(&str, String)> = vec![
            ("engine", engine.to_string()),
            ("hl", self.language.clone()),
            ("api_key", self.api_key.clone()),
        ];
        query.extend(params.iter().cloned());

        let response = self
            .http
            .get(format!("{}/search.json", self.base_url))
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(body);
            return Err(SearchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let results: Value = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        if let Some(error) = results.get("error").and_then(|v| v.as_str()) {
            if error.contains(EMPTY_RESULTS_MARKER) {
                debug!(engine = %engine, "SerpAPI reported an empty result page");
            } else {
                return Err(SearchError::Api(error.to_string()));
            }
        }

        Ok(results)
    }

    /// Search Google Scholar for academic papers
    pub async fn search_scholar(&self, query: &str, limit: usize) -> Result<Vec<Article>, SearchError> {
        info!(query = %query, limit, "Searching Google Scholar via SerpAPI");

        let num = limit.clamp(1, MAX_PAGE_SIZE);
        let results = self
            .fetch(
                "google_scholar",
                &[
                    ("q", query.to_string()),
                    ("as_ylo", self.papers_min_year.to_string()),
                    ("num", num.to_string()),
                ],
            )
            .await?;

        let mut articles = parse_articles(&results);
        articles.truncate(num);

        info!(count = articles.len(), "Google Scholar search completed");
        Ok(articles)
    }

    /// Search Google Scholar for articles related to a previously seen one
    pub async fn search_related(&self, related_link: &str) -> Result<Vec<Article>, SearchError> {
        let query = related_query(related_link)
            .ok_or_else(|| SearchError::InvalidRelatedLink(related_link.to_string()))?;

        info!(query = %query, "Searching related articles via SerpAPI");

        let results = self.fetch("google_scholar", &[("q", query)]).await?;
        let articles = parse_articles(&results);

        info!(count = articles.len(), "Related articles search completed");
        Ok(articles)
    }

    /// Search Google Scholar for author profiles by name
    pub async fn search_author_profiles(&self, name: &str) -> Result<Vec<AuthorSummary>, SearchError> {
        info!(name = %name, "Searching Google Scholar author profiles");

        let results = self
            .fetch("google_scholar", &[("q", format!("author:{}", name))])
            .await?;

        if results.get("profiles").is_none() {
            debug!("No 'profiles' block in author search response");
        }
        let authors = parse_author_profiles(&results);

        info!(count = authors.len(), "Author search completed");
        Ok(authors)
    }

    /// Fetch an author's profile and scrape article links from the profile page
    pub async fn fetch_author_details(&self, author_id: &str) -> Result<AuthorDetail, SearchError> {
        info!(author_id = %author_id, "Fetching Google Scholar author details");

        let results = self
            .fetch("google_scholar_author", &[("author_id", author_id.to_string())])
            .await?;

        let mut detail = parse_author_detail(&results, author_id, &self.language)?;
        detail.scraped_links =
            scrape_profile_links(&self.http, &detail.profile_url, self.scrape_timeout).await;

        info!(
            author_id = %author_id,
            articles = detail.articles.len(),
            scraped = detail.scraped_links.len(),
            "Author details retrieved"
        );
        Ok(detail)
    }

    /// Search Google News for coverage of a topic
    pub async fn search_google_news(&self, query: &str) -> Result<Vec<NewsArticle>, SearchError> {
        info!(query = %query, "Searching Google News via SerpAPI");

        let results = self.fetch("google_news", &[("q", query.to_string())]).await?;
        let articles = parse_news(&results);

        info!(count = articles.len(), "Google News search completed");
        Ok(articles)
    }

    /// Search Google Light for quick web results about a person
    pub async fn search_light(&self, query: &str) -> Result<WebSearchSummary, SearchError> {
        info!(query = %query, "Searching Google Light via SerpAPI");

        let results = self.fetch("google_light", &[("q", query.to_string())]).await?;
        let summary = summarize_light_results(&results);

        info!(citations = summary.citations.len(), "Google Light search completed");
        Ok(summary)
    }
}

#[async_trait]
impl ScholarProvider for SerpApiClient {
    async fn search_papers(&self, topic: &str, limit: usize) -> ProviderResult<Vec<Article>> {
        self.search_scholar(topic, limit).await.map_err(log_failure)
    }

    async fn search_similar(&self, related_link: &str) -> ProviderResult<Vec<Article>> {
        self.search_related(related_link).await.map_err(log_failure)
    }

    async fn search_authors(&self, name: &str) -> ProviderResult<Vec<AuthorSummary>> {
        self.search_author_profiles(name).await.map_err(log_failure)
    }

    async fn author_details(&self, author_id: &str) -> ProviderResult<AuthorDetail> {
        self.fetch_author_details(author_id).await.map_err(log_failure)
    }

    async fn search_news(&self, topic: &str) -> ProviderResult<Vec<NewsArticle>> {
        self.search_google_news(topic).await.map_err(log_failure)
    }

    async fn web_search(&self, name: &str) -> ProviderResult<WebSearchSummary> {
        self.search_light(&format!("\"{}\"", name)).await.map_err(log_failure)
    }
}

fn log_failure(e: SearchError) -> ProviderError {
    warn!(error = %e, "SerpAPI lookup failed");
    e.into()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Strings or numbers, as SerpAPI is not consistent about years.
fn scalar_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse `organic_results` of a Scholar response into articles
fn parse_articles(results: &Value) -> Vec<Article> {
    let Some(organic) = results.get("organic_results").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    organic
        .iter()
        .map(|result| {
            let publication_info = result.get("publication_info");
            let publication_summary = publication_info.and_then(|p| str_field(p, "summary"));

            let mut author_names = Vec::new();
            let mut author_ids = Vec::new();
            match publication_info
                .and_then(|p| p.get("authors"))
                .and_then(|a| a.as_array())
            {
                Some(authors) => {
                    for author in authors {
                        if let Some(name) = str_field(author, "name") {
                            author_names.push(name);
                        }
                        if let Some(id) = str_field(author, "author_id") {
                            author_ids.push(id);
                        }
                    }
                }
                None => {
                    // Summary reads "Authors - Venue, Year - Host"
                    if let Some(summary) = &publication_summary {
                        let authors = summary.split(" - ").next().unwrap_or(summary).trim();
                        if !authors.is_empty() {
                            author_names.push(authors.to_string());
                        }
                    }
                }
            }

            Article {
                title: str_field(result, "title").unwrap_or_else(|| "Untitled".to_string()),
                link: str_field(result, "link"),
                snippet: str_field(result, "snippet").unwrap_or_default(),
                author_names,
                author_ids,
                publication_summary,
                related_pages_link: result
                    .get("inline_links")
                    .and_then(|links| str_field(links, "related_pages_link")),
            }
        })
        .collect()
}

/// The `q` parameter of a Scholar related-pages link
fn related_query(link: &str) -> Option<String> {
    let url = reqwest::Url::parse(link).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "q")
        .map(|(_, value)| value.into_owned())
        .filter(|q| !q.trim().is_empty())
}

fn parse_author_profiles(results: &Value) -> Vec<AuthorSummary> {
    results
        .get("profiles")
        .and_then(|p| p.get("authors"))
        .and_then(|a| a.as_array())
        .map(|authors| {
            authors
                .iter()
                .filter_map(|author| {
                    let author_id = str_field(author, "author_id")?;
                    Some(AuthorSummary {
                        name: str_field(author, "name").unwrap_or_else(|| "Unknown".to_string()),
                        profile_link: str_field(author, "link").unwrap_or_default(),
                        author_id,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_author_detail(
    results: &Value,
    author_id: &str,
    language: &str,
) -> Result<AuthorDetail, SearchError> {
    let author = results
        .get("author")
        .ok_or_else(|| SearchError::AuthorNotFound(author_id.to_string()))?;

    let interests = author
        .get("interests")
        .and_then(|i| i.as_array())
        .map(|items| items.iter().filter_map(|i| str_field(i, "title")).collect())
        .unwrap_or_default();

    let articles = results
        .get("articles")
        .and_then(|a| a.as_array())
        .map(|items| {
            items
                .iter()
                .take(MAX_ARTICLES)
                .map(|article| AuthorArticle {
                    title: str_field(article, "title").unwrap_or_else(|| "Untitled".to_string()),
                    link: str_field(article, "link"),
                    authors: str_field(article, "authors"),
                    publication: str_field(article, "publication"),
                    year: scalar_field(article, "year"),
                    cited_by: article
                        .get("cited_by")
                        .and_then(|c| c.get("value"))
                        .and_then(|v| v.as_u64()),
                })
                .collect()
        })
        .unwrap_or_default();

    let profile_url = results
        .get("search_metadata")
        .and_then(|m| str_field(m, "google_scholar_author_url"))
        .unwrap_or_else(|| {
            format!(
                "https://scholar.google.com/citations?user={}&hl={}",
                author_id, language
            )
        });

    Ok(AuthorDetail {
        author_id: author_id.to_string(),
        name: str_field(author, "name").unwrap_or_else(|| "Unknown".to_string()),
        image_url: str_field(author, "thumbnail"),
        profile_url,
        affiliations: str_field(author, "affiliations"),
        interests,
        email: str_field(author, "email"),
        articles,
        scraped_links: BTreeSet::new(),
    })
}

fn parse_news(results: &Value) -> Vec<NewsArticle> {
    let Some(news) = results.get("news_results").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    news.iter()
        .filter_map(|result| {
            let title = str_field(result, "title")?;
            let source = result.get("source");
            let author = str_field(result, "author").or_else(|| {
                source
                    .and_then(|s| s.get("authors"))
                    .and_then(|a| a.as_array())
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(|n| n.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .filter(|joined| !joined.is_empty())
            });
            let source_name = source.and_then(|s| match s {
                Value::String(name) => Some(name.clone()),
                other => str_field(other, "name"),
            });

            Some(NewsArticle {
                title,
                link: str_field(result, "link"),
                author,
                source: source_name,
                date: str_field(result, "date"),
            })
        })
        .take(MAX_ARTICLES)
        .collect()
}

fn summarize_light_results(results: &Value) -> WebSearchSummary {
    let Some(organic) = results.get("organic_results").and_then(|v| v.as_array()) else {
        return WebSearchSummary::default();
    };

    let mut lines = Vec::new();
    let mut citations = Vec::new();
    for result in organic {
        let Some(title) = str_field(result, "title") else {
            continue;
        };
        match str_field(result, "snippet") {
            Some(snippet) => lines.push(format!("{}: {}", title, snippet)),
            None => lines.push(title),
        }
        if let Some(link) = str_field(result, "link") {
            citations.push(link);
        }
    }

    WebSearchSummary {
        text: lines.join("\n"),
        citations,
    }
}
