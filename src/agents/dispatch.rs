//! Dispatch Engine
//!
//! Maps one classified `Intent` plus the conversation's memory onto provider
//! calls, chains follow-up calls where one lookup feeds the next, and folds
//! the outcome into a structured `Response`.
//!
//! ```text
//! PaperQuery ───────────► papers ──► stores topic + results
//! SimilarArticlesQuery ─► similar (needs a stored related-pages link)
//! TrendingNewsQuery ────► news (needs a stored topic)
//! AuthorByIdQuery ──────► details × N (concurrent, joined)
//! AuthorByNameQuery ────► author search ─┬─ 0 ─► web search fallback
//!                                        ├─ 1 ─► details
//!                                        └─ n ─► ask for an author_id
//! AmbiguousFollowUp ────► stored paper ──► AuthorByIdQuery(author_ids)
//! ```
//!
//! State is written only after a successful call of the matching kind, so a
//! failed lookup leaves earlier context available for a retry.

use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::agents::intent::{is_acknowledgement, parse_position, Intent, Position};
use crate::config::DispatchConfig;
use crate::models::{
    Article, AuthorDetail, AuthorSummary, ConversationState, NewsArticle, PaperSearchResult,
    WebSearchSummary, MAX_ARTICLES,
};
use crate::search::{Lookup, ProviderError, ProviderResult, ScholarProvider};

/// Outcome of one author-detail call within a multi-id lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorLookup {
    pub author_id: String,
    pub outcome: Result<AuthorDetail, ProviderError>,
}

/// Information the engine needs from the user before it can make a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Clarification {
    /// Neither a topic nor an author was given.
    TopicOrAuthor,
    /// A news request arrived before any paper search.
    ResearchTopic,
    /// No stored article with a related-pages link matches.
    ArticleSelection,
    /// An author lookup without any id.
    AuthorId,
    /// A follow-up that matches no stored article.
    ArticleReference { hint: String },
    /// The referenced article lists no author profiles.
    ArticleWithoutAuthors { title: String },
}

/// Structured result of one turn, rendered by the reply formatter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    PapersFound {
        topic: String,
        articles: Vec<Article>,
    },
    PapersEmpty {
        topic: String,
    },
    SimilarArticles {
        source_title: String,
        articles: Vec<Article>,
    },
    SimilarArticlesEmpty {
        source_title: String,
    },
    News {
        topic: String,
        articles: Vec<NewsArticle>,
    },
    NewsEmpty {
        topic: String,
    },
    /// Results of explicit (or follow-up) author id lookups, in request order.
    AuthorDetails {
        lookups: Vec<AuthorLookup>,
    },
    /// A name search with exactly one match, merged with its detail lookup.
    AuthorProfile {
        summary: AuthorSummary,
        detail: Result<AuthorDetail, ProviderError>,
    },
    /// Several matches; the user has to pick an `author_id`.
    AuthorCandidates {
        name: String,
        candidates: Vec<AuthorSummary>,
    },
    /// No Scholar profile; carries whatever the web search fallback returned.
    AuthorNotFound {
        name: String,
        fallback: Result<WebSearchSummary, ProviderError>,
    },
    Failed {
        lookup: Lookup,
        error: ProviderError,
    },
    NeedsInput(Clarification),
}

/// Coarse shape of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Found,
    Empty,
    Failed,
    NeedsInput,
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::PapersFound { .. }
            | Response::SimilarArticles { .. }
            | Response::News { .. }
            | Response::AuthorProfile { .. } => ResponseKind::Found,
            Response::AuthorDetails { lookups } => {
                if lookups.iter().any(|l| l.outcome.is_ok()) {
                    ResponseKind::Found
                } else {
                    ResponseKind::Failed
                }
            }
            Response::PapersEmpty { .. }
            | Response::SimilarArticlesEmpty { .. }
            | Response::NewsEmpty { .. }
            | Response::AuthorNotFound { .. } => ResponseKind::Empty,
            Response::Failed { .. } => ResponseKind::Failed,
            Response::AuthorCandidates { .. } | Response::NeedsInput(_) => ResponseKind::NeedsInput,
        }
    }
}

pub struct DispatchEngine {
    provider: Arc<dyn ScholarProvider>,
    default_num_results: usize,
    call_timeout: Duration,
}

impl DispatchEngine {
    pub fn new(provider: Arc<dyn ScholarProvider>) -> Self {
        Self::from_config(provider, &DispatchConfig::default())
    }

    pub fn from_config(provider: Arc<dyn ScholarProvider>, config: &DispatchConfig) -> Self {
        Self {
            provider,
            default_num_results: config.default_num_results.max(1),
            call_timeout: config.call_timeout(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Handle one intent against an owned state and hand both back.
    pub async fn handle(
        &self,
        intent: Intent,
        mut state: ConversationState,
    ) -> (Response, ConversationState) {
        let response = self.dispatch(intent, &mut state).await;
        (response, state)
    }

    /// Handle one intent, updating `state` in place.
    pub async fn dispatch(&self, intent: Intent, state: &mut ConversationState) -> Response {
        debug!(intent = ?intent, "Dispatching intent");
        match intent {
            Intent::PaperQuery { topic, num_results } => {
                self.find_papers(topic, num_results, state).await
            }
            Intent::SimilarArticlesQuery { source_link } => {
                self.find_similar(&source_link, state).await
            }
            Intent::TrendingNewsQuery => self.trending_news(state).await,
            Intent::AuthorByIdQuery { author_ids } => self.authors_by_id(author_ids).await,
            Intent::AuthorByNameQuery { name } => self.author_by_name(name, state).await,
            Intent::AmbiguousFollowUp { reference_hint } => {
                match resolve_follow_up(&reference_hint, state) {
                    Ok(author_ids) => {
                        info!(hint = %reference_hint, ids = ?author_ids, "Resolved follow-up to author ids");
                        self.authors_by_id(author_ids).await
                    }
                    Err(clarification) => Response::NeedsInput(clarification),
                }
            }
        }
    }

    /// Run a provider call under the engine deadline.
    async fn guarded<T, F>(&self, lookup: Lookup, call: F) -> ProviderResult<T>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(lookup = %lookup, timeout = ?self.call_timeout, "Provider call timed out");
                Err(ProviderError::new(format!(
                    "{} timed out after {:?}",
                    lookup, self.call_timeout
                )))
            }
        }
    }

    async fn find_papers(
        &self,
        topic: String,
        num_results: Option<usize>,
        state: &mut ConversationState,
    ) -> Response {
        let topic = topic.trim().to_string();
        if topic.is_empty() {
            return Response::NeedsInput(Clarification::TopicOrAuthor);
        }
        let limit = num_results.unwrap_or(self.default_num_results).max(1);

        match self
            .guarded(Lookup::Papers, self.provider.search_papers(&topic, limit))
            .await
        {
            Ok(mut articles) => {
                articles.truncate(MAX_ARTICLES);
                info!(topic = %topic, count = articles.len(), "Paper search succeeded");

                state.current_research_query = Some(topic.clone());
                state.last_scholar_results = Some(PaperSearchResult::new(articles.clone()));

                if articles.is_empty() {
                    Response::PapersEmpty { topic }
                } else {
                    Response::PapersFound { topic, articles }
                }
            }
            Err(error) => {
                warn!(topic = %topic, error = %error, "Paper search failed");
                Response::Failed {
                    lookup: Lookup::Papers,
                    error,
                }
            }
        }
    }

    async fn find_similar(&self, source_link: &str, state: &ConversationState) -> Response {
        let source = resolve_reference(source_link, state.last_articles()).and_then(|article| {
            article
                .related_pages_link
                .as_deref()
                .map(|link| (article.title.clone(), link.to_string()))
        });

        let Some((source_title, related_link)) = source else {
            debug!(source = %source_link, "No stored article with a related-pages link");
            return Response::NeedsInput(Clarification::ArticleSelection);
        };

        match self
            .guarded(Lookup::SimilarArticles, self.provider.search_similar(&related_link))
            .await
        {
            Ok(mut articles) => {
                articles.truncate(MAX_ARTICLES);
                info!(source = %source_title, count = articles.len(), "Similar articles search succeeded");
                if articles.is_empty() {
                    Response::SimilarArticlesEmpty { source_title }
                } else {
                    Response::SimilarArticles {
                        source_title,
                        articles,
                    }
                }
            }
            Err(error) => Response::Failed {
                lookup: Lookup::SimilarArticles,
                error,
            },
        }
    }

    async fn trending_news(&self, state: &ConversationState) -> Response {
        let Some(topic) = state.current_research_query.clone() else {
            return Response::NeedsInput(Clarification::ResearchTopic);
        };

        match self
            .guarded(Lookup::News, self.provider.search_news(&topic))
            .await
        {
            Ok(mut articles) => {
                articles.truncate(MAX_ARTICLES);
                info!(topic = %topic, count = articles.len(), "News search succeeded");
                if articles.is_empty() {
                    Response::NewsEmpty { topic }
                } else {
                    Response::News { topic, articles }
                }
            }
            Err(error) => Response::Failed {
                lookup: Lookup::News,
                error,
            },
        }
    }

    /// Independent detail lookups, issued together and joined in request order.
    async fn authors_by_id(&self, author_ids: Vec<String>) -> Response {
        let author_ids: Vec<String> = author_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if author_ids.is_empty() {
            return Response::NeedsInput(Clarification::AuthorId);
        }

        let lookups = join_all(author_ids.into_iter().map(|author_id| async move {
            let outcome = self.fetch_detail(&author_id).await;
            AuthorLookup { author_id, outcome }
        }))
        .await;

        let failures = lookups.iter().filter(|l| l.outcome.is_err()).count();
        info!(total = lookups.len(), failures, "Author detail lookups complete");

        Response::AuthorDetails { lookups }
    }

    async fn fetch_detail(&self, author_id: &str) -> ProviderResult<AuthorDetail> {
        self.guarded(Lookup::AuthorDetail, self.provider.author_details(author_id))
            .await
            .map(AuthorDetail::normalized)
            .map_err(|error| {
                warn!(author_id = %author_id, error = %error, "Author detail lookup failed");
                error
            })
    }

    async fn author_by_name(&self, name: String, state: &mut ConversationState) -> Response {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Response::NeedsInput(Clarification::TopicOrAuthor);
        }

        let candidates = match self
            .guarded(Lookup::AuthorSearch, self.provider.search_authors(&name))
            .await
        {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(name = %name, error = %error, "Author search failed");
                return Response::Failed {
                    lookup: Lookup::AuthorSearch,
                    error,
                };
            }
        };

        info!(name = %name, count = candidates.len(), "Author search succeeded");
        state.last_author_search_results = Some(candidates.clone());

        match candidates.as_slice() {
            [] => {
                info!(name = %name, "No Scholar profile, running web search fallback");
                let fallback = self
                    .guarded(Lookup::WebSearch, self.provider.web_search(&name))
                    .await;
                Response::AuthorNotFound { name, fallback }
            }
            [single] => {
                let detail = self.fetch_detail(&single.author_id).await;
                Response::AuthorProfile {
                    summary: single.clone(),
                    detail,
                }
            }
            _ => Response::AuthorCandidates { name, candidates },
        }
    }
}

/// Find the stored article a hint refers to: by link, title or position.
///
/// With a single stored article any non-matching hint ("yes") refers to it.
pub fn resolve_reference<'a>(hint: &str, articles: &'a [Article]) -> Option<&'a Article> {
    let hint = hint.trim();
    let normalized = hint
        .to_lowercase()
        .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!'))
        .trim()
        .to_string();
    if articles.is_empty() || normalized.is_empty() {
        return None;
    }

    articles
        .iter()
        .find(|a| {
            a.link.as_deref() == Some(hint) || a.related_pages_link.as_deref() == Some(hint)
        })
        .or_else(|| {
            let hint_words = words(&normalized);
            let acknowledgement = is_acknowledgement(&normalized);
            articles.iter().find(|a| {
                let title_words = words(&a.title);
                !title_words.is_empty()
                    && (contains_words(&hint_words, &title_words)
                        || (!acknowledgement
                            && normalized.chars().count() >= 4
                            && contains_words(&title_words, &hint_words)))
            })
        })
        .or_else(|| match parse_position(&normalized)? {
            Position::Index(i) => articles.get(i),
            Position::Last => articles.last(),
        })
        .or_else(|| if articles.len() == 1 { articles.first() } else { None })
}

/// Lowercased alphanumeric words.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `needle` occurs in `haystack` as a contiguous run of whole words.
fn contains_words(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Author ids of the stored article a follow-up refers to.
fn resolve_follow_up(hint: &str, state: &ConversationState) -> Result<Vec<String>, Clarification> {
    let article = resolve_reference(hint, state.last_articles()).ok_or_else(|| {
        Clarification::ArticleReference {
            hint: hint.to_string(),
        }
    })?;

    let mut author_ids: Vec<String> = Vec::new();
    for id in &article.author_ids {
        if !author_ids.contains(id) {
            author_ids.push(id.clone());
        }
    }

    if author_ids.is_empty() {
        return Err(Clarification::ArticleWithoutAuthors {
            title: article.title.clone(),
        });
    }
    Ok(author_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PLACEHOLDER_AVATAR_URL;
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Papers(String, usize),
        Similar(String),
        Authors(String),
        Detail(String),
        News(String),
        Web(String),
    }

    /// Provider that answers from a script and records every call.
    struct ScriptedProvider {
        calls: Mutex<Vec<Call>>,
        papers: ProviderResult<Vec<Article>>,
        similar: ProviderResult<Vec<Article>>,
        authors: ProviderResult<Vec<AuthorSummary>>,
        details: HashMap<String, ProviderResult<AuthorDetail>>,
        news: ProviderResult<Vec<NewsArticle>>,
        web: ProviderResult<WebSearchSummary>,
        detail_delay: Option<Duration>,
    }

    impl Default for ScriptedProvider {
        fn default() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                papers: Ok(vec![]),
                similar: Ok(vec![]),
                authors: Ok(vec![]),
                details: HashMap::new(),
                news: Ok(vec![]),
                web: Ok(WebSearchSummary::default()),
                detail_delay: None,
            }
        }
    }

    impl ScriptedProvider {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ScholarProvider for ScriptedProvider {
        async fn search_papers(&self, topic: &str, limit: usize) -> ProviderResult<Vec<Article>> {
            self.record(Call::Papers(topic.to_string(), limit));
            self.papers.clone()
        }

        async fn search_similar(&self, related_link: &str) -> ProviderResult<Vec<Article>> {
            self.record(Call::Similar(related_link.to_string()));
            self.similar.clone()
        }

        async fn search_authors(&self, name: &str) -> ProviderResult<Vec<AuthorSummary>> {
            self.record(Call::Authors(name.to_string()));
            self.authors.clone()
        }

        async fn author_details(&self, author_id: &str) -> ProviderResult<AuthorDetail> {
            self.record(Call::Detail(author_id.to_string()));
            if let Some(delay) = self.detail_delay {
                tokio::time::sleep(delay).await;
            }
            self.details
                .get(author_id)
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::new("Author not found")))
        }

        async fn search_news(&self, topic: &str) -> ProviderResult<Vec<NewsArticle>> {
            self.record(Call::News(topic.to_string()));
            self.news.clone()
        }

        async fn web_search(&self, name: &str) -> ProviderResult<WebSearchSummary> {
            self.record(Call::Web(name.to_string()));
            self.web.clone()
        }
    }

    fn engine(provider: &Arc<ScriptedProvider>) -> DispatchEngine {
        DispatchEngine::new(provider.clone())
    }

    fn article(title: &str, author_ids: &[&str]) -> Article {
        Article {
            title: title.to_string(),
            link: Some(format!("https://example.org/{}", title.replace(' ', "-"))),
            snippet: format!("About {}", title),
            author_names: author_ids.iter().map(|id| format!("Name of {}", id)).collect(),
            author_ids: author_ids.iter().map(|id| id.to_string()).collect(),
            publication_summary: None,
            related_pages_link: Some(format!(
                "https://scholar.google.com/scholar?q=related:{}:scholar.google.com/",
                title.replace(' ', "")
            )),
        }
    }

    fn summary(name: &str, id: &str) -> AuthorSummary {
        AuthorSummary {
            name: name.to_string(),
            profile_link: format!("https://scholar.google.com/citations?user={}", id),
            author_id: id.to_string(),
        }
    }

    fn detail(id: &str, name: &str) -> AuthorDetail {
        AuthorDetail {
            author_id: id.to_string(),
            name: name.to_string(),
            image_url: Some(format!("https://photos.example/{}.jpg", id)),
            profile_url: format!("https://scholar.google.com/citations?user={}", id),
            affiliations: Some("University of Somewhere".to_string()),
            interests: vec!["machine learning".to_string()],
            email: None,
            articles: vec![],
            scraped_links: BTreeSet::new(),
        }
    }

    fn state_with(articles: Vec<Article>) -> ConversationState {
        ConversationState {
            current_research_query: Some("transformers".to_string()),
            last_scholar_results: Some(PaperSearchResult::new(articles)),
            last_author_search_results: None,
        }
    }

    #[tokio::test]
    async fn test_paper_query_stores_topic_and_results() {
        let provider = Arc::new(ScriptedProvider {
            papers: Ok(vec![article("Attention", &["X"]), article("BERT", &["Y"])]),
            ..Default::default()
        });

        let (response, state) = engine(&provider)
            .handle(Intent::papers("transformers"), ConversationState::new())
            .await;

        let expected = vec![article("Attention", &["X"]), article("BERT", &["Y"])];
        assert_eq!(
            response,
            Response::PapersFound {
                topic: "transformers".to_string(),
                articles: expected.clone(),
            }
        );
        assert_eq!(state.current_research_query.as_deref(), Some("transformers"));
        assert_eq!(state.last_scholar_results, Some(PaperSearchResult::new(expected)));
        assert_eq!(provider.calls(), vec![Call::Papers("transformers".to_string(), 10)]);
    }

    #[tokio::test]
    async fn test_paper_query_passes_requested_count_and_caps_results() {
        let many: Vec<Article> = (0..8).map(|i| article(&format!("Paper {}", i), &[])).collect();
        let provider = Arc::new(ScriptedProvider {
            papers: Ok(many),
            ..Default::default()
        });

        let intent = Intent::PaperQuery {
            topic: "graphs".to_string(),
            num_results: Some(8),
        };
        let (response, state) = engine(&provider).handle(intent, ConversationState::new()).await;

        match response {
            Response::PapersFound { articles, .. } => assert_eq!(articles.len(), MAX_ARTICLES),
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(state.last_articles().len(), MAX_ARTICLES);
        assert_eq!(state.last_articles()[0].title, "Paper 0");
        assert_eq!(provider.calls(), vec![Call::Papers("graphs".to_string(), 8)]);
    }

    #[tokio::test]
    async fn test_empty_paper_search_is_stored_and_not_an_error() {
        let provider = Arc::new(ScriptedProvider::default());
        let previous = state_with(vec![article("Old", &["X"])]);

        let (response, state) = engine(&provider)
            .handle(Intent::papers("xyzzy-nonexistent-topic-42"), previous)
            .await;

        assert_eq!(
            response,
            Response::PapersEmpty {
                topic: "xyzzy-nonexistent-topic-42".to_string()
            }
        );
        assert_eq!(response.kind(), ResponseKind::Empty);
        assert_eq!(state.last_scholar_results, Some(PaperSearchResult::default()));
        assert_eq!(
            state.current_research_query.as_deref(),
            Some("xyzzy-nonexistent-topic-42")
        );
    }

    #[tokio::test]
    async fn test_failed_paper_search_keeps_previous_state() {
        let provider = Arc::new(ScriptedProvider {
            papers: Err(ProviderError::new("Request error: connection refused")),
            ..Default::default()
        });
        let previous = state_with(vec![article("Old", &["X"])]);

        let (response, state) = engine(&provider)
            .handle(Intent::papers("new topic"), previous.clone())
            .await;

        assert_eq!(response.kind(), ResponseKind::Failed);
        assert_eq!(
            response,
            Response::Failed {
                lookup: Lookup::Papers,
                error: ProviderError::new("Request error: connection refused"),
            }
        );
        assert_eq!(state, previous);
    }

    #[tokio::test]
    async fn test_news_without_topic_asks_for_one() {
        let provider = Arc::new(ScriptedProvider::default());

        let (response, _) = engine(&provider)
            .handle(Intent::TrendingNewsQuery, ConversationState::new())
            .await;

        assert_eq!(response, Response::NeedsInput(Clarification::ResearchTopic));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_news_uses_current_topic_without_mutating_state() {
        let news: Vec<NewsArticle> = (0..7)
            .map(|i| NewsArticle {
                title: format!("Story {}", i),
                link: None,
                author: None,
                source: None,
                date: None,
            })
            .collect();
        let provider = Arc::new(ScriptedProvider {
            news: Ok(news),
            ..Default::default()
        });
        let previous = state_with(vec![article("Attention", &["X"])]);

        let (response, state) = engine(&provider)
            .handle(Intent::TrendingNewsQuery, previous.clone())
            .await;

        match response {
            Response::News { topic, articles } => {
                assert_eq!(topic, "transformers");
                assert_eq!(articles.len(), MAX_ARTICLES);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(state, previous);
        assert_eq!(provider.calls(), vec![Call::News("transformers".to_string())]);
    }

    #[tokio::test]
    async fn test_unknown_author_triggers_exactly_one_fallback() {
        let provider = Arc::new(ScriptedProvider {
            web: Ok(WebSearchSummary {
                text: "Nothing notable".to_string(),
                citations: vec!["https://example.org".to_string()],
            }),
            ..Default::default()
        });
        let mut previous = ConversationState::new();
        previous.last_author_search_results = Some(vec![summary("Stale", "STALE0000AAAAJ")]);

        let (response, state) = engine(&provider)
            .handle(Intent::author_by_name("Nonexistent Person"), previous)
            .await;

        assert_eq!(
            provider.calls(),
            vec![
                Call::Authors("Nonexistent Person".to_string()),
                Call::Web("Nonexistent Person".to_string()),
            ]
        );
        assert!(matches!(
            response,
            Response::AuthorNotFound { ref name, fallback: Ok(_) } if name == "Nonexistent Person"
        ));
        assert_eq!(state.last_author_search_results, Some(vec![]));
    }

    #[tokio::test]
    async fn test_fallback_failure_is_still_reported_as_not_found() {
        let provider = Arc::new(ScriptedProvider {
            web: Err(ProviderError::new("Request timed out")),
            ..Default::default()
        });

        let (response, _) = engine(&provider)
            .handle(Intent::author_by_name("Nobody"), ConversationState::new())
            .await;

        assert_eq!(
            response,
            Response::AuthorNotFound {
                name: "Nobody".to_string(),
                fallback: Err(ProviderError::new("Request timed out")),
            }
        );
    }

    #[tokio::test]
    async fn test_single_author_match_chains_into_details() {
        let mut details = HashMap::new();
        details.insert("JicYPdAAAAAJ".to_string(), Ok(detail("JicYPdAAAAAJ", "Geoffrey Hinton")));
        let provider = Arc::new(ScriptedProvider {
            authors: Ok(vec![summary("Geoffrey Hinton", "JicYPdAAAAAJ")]),
            details,
            ..Default::default()
        });

        let (response, state) = engine(&provider)
            .handle(Intent::author_by_name("Geoffrey Hinton"), ConversationState::new())
            .await;

        assert_eq!(
            provider.calls(),
            vec![
                Call::Authors("Geoffrey Hinton".to_string()),
                Call::Detail("JicYPdAAAAAJ".to_string()),
            ]
        );
        match response {
            Response::AuthorProfile { summary, detail } => {
                assert_eq!(summary.profile_link, "https://scholar.google.com/citations?user=JicYPdAAAAAJ");
                let detail = detail.unwrap();
                assert_eq!(detail.affiliations.as_deref(), Some("University of Somewhere"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(state.last_author_search_results.map(|r| r.len()), Some(1));
    }

    #[tokio::test]
    async fn test_multiple_author_matches_never_auto_chain() {
        let candidates = vec![
            summary("Jane Doe", "AAAAAAAAAAAJ"),
            summary("Jane A. Doe", "BBBBBBBAAAAJ"),
        ];
        let provider = Arc::new(ScriptedProvider {
            authors: Ok(candidates.clone()),
            ..Default::default()
        });

        let (response, state) = engine(&provider)
            .handle(Intent::author_by_name("Jane Doe"), ConversationState::new())
            .await;

        assert_eq!(provider.calls(), vec![Call::Authors("Jane Doe".to_string())]);
        assert_eq!(
            response,
            Response::AuthorCandidates {
                name: "Jane Doe".to_string(),
                candidates: candidates.clone(),
            }
        );
        assert_eq!(response.kind(), ResponseKind::NeedsInput);
        assert_eq!(state.last_author_search_results, Some(candidates));
    }

    #[tokio::test]
    async fn test_failed_author_search_keeps_previous_candidates() {
        let provider = Arc::new(ScriptedProvider {
            authors: Err(ProviderError::new("SerpAPI returned HTTP 500: oops")),
            ..Default::default()
        });
        let mut previous = ConversationState::new();
        previous.last_author_search_results = Some(vec![summary("Jane Doe", "AAAAAAAAAAAJ")]);

        let (response, state) = engine(&provider)
            .handle(Intent::author_by_name("Jane Doe"), previous.clone())
            .await;

        assert_eq!(response.kind(), ResponseKind::Failed);
        assert_eq!(state, previous);
        assert_eq!(provider.calls(), vec![Call::Authors("Jane Doe".to_string())]);
    }

    #[tokio::test]
    async fn test_author_ids_return_partial_results() {
        let mut details = HashMap::new();
        details.insert("X".to_string(), Ok(detail("X", "Author X")));
        let provider = Arc::new(ScriptedProvider {
            details,
            ..Default::default()
        });
        let intent = Intent::AuthorByIdQuery {
            author_ids: vec!["X".to_string(), "Y".to_string()],
        };

        let (response, state) = engine(&provider).handle(intent, ConversationState::new()).await;

        match &response {
            Response::AuthorDetails { lookups } => {
                assert_eq!(lookups.len(), 2);
                assert_eq!(lookups[0].author_id, "X");
                assert!(lookups[0].outcome.is_ok());
                assert_eq!(lookups[1].author_id, "Y");
                assert_eq!(
                    lookups[1].outcome,
                    Err(ProviderError::new("Author not found"))
                );
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(response.kind(), ResponseKind::Found);
        assert_eq!(state, ConversationState::new());
    }

    #[tokio::test]
    async fn test_placeholder_thumbnail_is_normalized_to_absent() {
        let mut with_placeholder = detail("X", "Author X");
        with_placeholder.image_url = Some(PLACEHOLDER_AVATAR_URL.to_string());
        let mut details = HashMap::new();
        details.insert("X".to_string(), Ok(with_placeholder));
        let provider = Arc::new(ScriptedProvider {
            details,
            ..Default::default()
        });

        let (response, _) = engine(&provider)
            .handle(Intent::author_by_id("X"), ConversationState::new())
            .await;

        match response {
            Response::AuthorDetails { lookups } => {
                assert_eq!(lookups[0].outcome.as_ref().unwrap().image_url, None);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_id_list_asks_for_an_id() {
        let provider = Arc::new(ScriptedProvider::default());
        let intent = Intent::AuthorByIdQuery {
            author_ids: vec!["  ".to_string()],
        };

        let (response, _) = engine(&provider).handle(intent, ConversationState::new()).await;

        assert_eq!(response, Response::NeedsInput(Clarification::AuthorId));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_matches_explicit_id_query() {
        let state = state_with(vec![article("Attention", &["X", "Y"]), article("BERT", &["Z"])]);

        let follow_up_provider = Arc::new(ScriptedProvider::default());
        engine(&follow_up_provider)
            .handle(Intent::follow_up("the first one"), state.clone())
            .await;

        let explicit_provider = Arc::new(ScriptedProvider::default());
        engine(&explicit_provider)
            .handle(
                Intent::AuthorByIdQuery {
                    author_ids: vec!["X".to_string(), "Y".to_string()],
                },
                state,
            )
            .await;

        assert_eq!(follow_up_provider.calls(), explicit_provider.calls());
        assert_eq!(
            follow_up_provider.calls(),
            vec![Call::Detail("X".to_string()), Call::Detail("Y".to_string())]
        );
    }

    #[tokio::test]
    async fn test_follow_up_resolves_by_title() {
        let provider = Arc::new(ScriptedProvider::default());
        let state = state_with(vec![article("Attention", &["X"]), article("BERT pretraining", &["Z"])]);

        engine(&provider)
            .handle(Intent::follow_up("who wrote bert pretraining?"), state)
            .await;

        assert_eq!(provider.calls(), vec![Call::Detail("Z".to_string())]);
    }

    #[tokio::test]
    async fn test_follow_up_ignores_author_candidates() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut state = ConversationState::new();
        state.last_author_search_results = Some(vec![
            summary("Jane Doe", "AAAAAAAAAAAJ"),
            summary("Jane A. Doe", "BBBBBBBAAAAJ"),
        ]);

        let (response, _) = engine(&provider)
            .handle(Intent::follow_up("the first one"), state)
            .await;

        assert_eq!(
            response,
            Response::NeedsInput(Clarification::ArticleReference {
                hint: "the first one".to_string()
            })
        );
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_without_match_or_author_ids() {
        let provider = Arc::new(ScriptedProvider::default());
        let state = state_with(vec![article("Attention", &[]), article("BERT", &["Z"])]);

        let (unmatched, _) = engine(&provider)
            .handle(Intent::follow_up("the one about diffusion"), state.clone())
            .await;
        let (no_ids, _) = engine(&provider)
            .handle(Intent::follow_up("first"), state)
            .await;

        assert!(matches!(
            unmatched,
            Response::NeedsInput(Clarification::ArticleReference { .. })
        ));
        assert_eq!(
            no_ids,
            Response::NeedsInput(Clarification::ArticleWithoutAuthors {
                title: "Attention".to_string()
            })
        );
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_similar_articles_use_stored_related_link() {
        let provider = Arc::new(ScriptedProvider {
            similar: Ok(vec![article("Related work", &[])]),
            ..Default::default()
        });
        let source = article("Attention", &["X"]);
        let related = source.related_pages_link.clone().unwrap();
        let state = state_with(vec![source.clone(), article("BERT", &["Y"])]);

        let (response, after) = engine(&provider)
            .handle(
                Intent::SimilarArticlesQuery {
                    source_link: source.link.clone().unwrap(),
                },
                state.clone(),
            )
            .await;

        assert_eq!(provider.calls(), vec![Call::Similar(related)]);
        assert!(matches!(
            response,
            Response::SimilarArticles { ref source_title, .. } if source_title == "Attention"
        ));
        assert_eq!(after, state);
    }

    #[tokio::test]
    async fn test_similar_articles_without_stored_article() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut unlinked = article("Attention", &[]);
        unlinked.related_pages_link = None;

        let (no_state, _) = engine(&provider)
            .handle(
                Intent::SimilarArticlesQuery {
                    source_link: "https://example.org/Attention".to_string(),
                },
                ConversationState::new(),
            )
            .await;
        let (no_link, _) = engine(&provider)
            .handle(
                Intent::SimilarArticlesQuery {
                    source_link: "the first one".to_string(),
                },
                state_with(vec![unlinked]),
            )
            .await;

        assert_eq!(no_state, Response::NeedsInput(Clarification::ArticleSelection));
        assert_eq!(no_link, Response::NeedsInput(Clarification::ArticleSelection));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out_as_provider_error() {
        let mut details = HashMap::new();
        details.insert("X".to_string(), Ok(detail("X", "Author X")));
        let provider = Arc::new(ScriptedProvider {
            details,
            detail_delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let engine = DispatchEngine::new(provider.clone()).with_call_timeout(Duration::from_secs(5));

        let (response, _) = engine
            .handle(Intent::author_by_id("X"), ConversationState::new())
            .await;

        match response {
            Response::AuthorDetails { lookups } => {
                let error = lookups[0].outcome.clone().unwrap_err();
                assert_eq!(error.error, "author details lookup timed out after 5s");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_acknowledgement_with_several_papers_asks_which_one() {
        let provider = Arc::new(ScriptedProvider::default());
        let state = state_with(vec![
            article("Deep learning", &["X"]),
            article("Exposure to fine particulate matter", &["Y"]),
            article("Attention", &["Z"]),
        ]);

        let (response, _) = engine(&provider)
            .handle(Intent::follow_up("sure"), state)
            .await;

        assert_eq!(
            response,
            Response::NeedsInput(Clarification::ArticleReference {
                hint: "sure".to_string()
            })
        );
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_title_matching_uses_whole_words() {
        let articles = vec![
            article("Deep learning", &[]),
            article("Exposure to fine particulate matter", &[]),
        ];
        assert_eq!(resolve_reference("sure", &articles), None);
        assert_eq!(resolve_reference("posure to fine", &articles), None);
        assert_eq!(
            resolve_reference("the fine particulate one", &articles),
            None
        );
        assert_eq!(
            resolve_reference("fine particulate matter", &articles).unwrap().title,
            "Exposure to fine particulate matter"
        );
        assert_eq!(
            resolve_reference("who wrote deep learning?", &articles).unwrap().title,
            "Deep learning"
        );
    }

    #[tokio::test]
    async fn test_single_author_match_with_failed_details() {
        let provider = Arc::new(ScriptedProvider {
            authors: Ok(vec![summary("Geoffrey Hinton", "JicYPdAAAAAJ")]),
            ..Default::default()
        });

        let (response, state) = engine(&provider)
            .handle(Intent::author_by_name("Geoffrey Hinton"), ConversationState::new())
            .await;

        assert_eq!(
            response,
            Response::AuthorProfile {
                summary: summary("Geoffrey Hinton", "JicYPdAAAAAJ"),
                detail: Err(ProviderError::new("Author not found")),
            }
        );
        assert_eq!(
            state.last_author_search_results,
            Some(vec![summary("Geoffrey Hinton", "JicYPdAAAAAJ")])
        );
    }

    #[tokio::test]
    async fn test_similar_articles_are_capped() {
        let related: Vec<Article> = (0..9).map(|i| article(&format!("Related {}", i), &[])).collect();
        let provider = Arc::new(ScriptedProvider {
            similar: Ok(related),
            ..Default::default()
        });
        let source = article("Attention", &["X"]);

        let (response, _) = engine(&provider)
            .handle(
                Intent::SimilarArticlesQuery {
                    source_link: "the first one".to_string(),
                },
                state_with(vec![source]),
            )
            .await;

        match response {
            Response::SimilarArticles { articles, .. } => {
                assert_eq!(articles.len(), MAX_ARTICLES);
                assert_eq!(articles[0].title, "Related 0");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_deadline_is_reported_exactly() {
        let provider = Arc::new(ScriptedProvider {
            detail_delay: Some(Duration::from_secs(1)),
            ..Default::default()
        });
        let engine =
            DispatchEngine::new(provider.clone()).with_call_timeout(Duration::from_millis(250));

        let (response, _) = engine
            .handle(Intent::author_by_id("X"), ConversationState::new())
            .await;

        match response {
            Response::AuthorDetails { lookups } => {
                let error = lookups[0].outcome.clone().unwrap_err();
                assert_eq!(error.error, "author details lookup timed out after 250ms");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_reference_positions() {
        let articles = vec![article("Alpha", &[]), article("Beta", &[]), article("Gamma", &[])];
        assert_eq!(resolve_reference("the second one", &articles).unwrap().title, "Beta");
        assert_eq!(resolve_reference("last", &articles).unwrap().title, "Gamma");
        assert_eq!(resolve_reference("#7", &articles), None);
        assert_eq!(resolve_reference("yes", &articles), None);
        assert_eq!(resolve_reference("yes", &articles[..1]).unwrap().title, "Alpha");
        assert_eq!(resolve_reference("", &articles), None);
    }
}
