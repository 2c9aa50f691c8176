// Core data model shared by the providers, the dispatch engine and the formatter

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Upper bound on every article list handed onward from a provider.
pub const MAX_ARTICLES: usize = 5;

/// Scholar's generic avatar, reported as a thumbnail for authors without a photo.
pub const PLACEHOLDER_AVATAR_URL: &str =
    "https://scholar.google.com/citations/images/avatar_scholar_128.png";

/// One Google Scholar search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub snippet: String,
    /// Display names, in the order Scholar lists them.
    #[serde(default)]
    pub author_names: Vec<String>,
    /// Scholar profile ids. Authors without a profile have no entry here,
    /// so this can be shorter than `author_names`.
    #[serde(default)]
    pub author_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_pages_link: Option<String>,
}

/// Ordered result of a paper search. Order is the provider's ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperSearchResult {
    pub articles: Vec<Article>,
}

impl PaperSearchResult {
    pub fn new(articles: Vec<Article>) -> Self {
        Self { articles }
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }
}

/// A candidate profile returned by an author-name search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub name: String,
    pub profile_link: String,
    pub author_id: String,
}

/// A publication listed on an author's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorArticle {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cited_by: Option<u64>,
}

/// Full profile of one author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorDetail {
    pub author_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub profile_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliations: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub articles: Vec<AuthorArticle>,
    /// Article links scraped from the profile page itself.
    #[serde(default)]
    pub scraped_links: BTreeSet<String>,
}

impl AuthorDetail {
    /// Drop the generic avatar and cap the article list.
    pub fn normalized(mut self) -> Self {
        if self
            .image_url
            .as_deref()
            .map(|url| url.trim().is_empty() || url == PLACEHOLDER_AVATAR_URL)
            .unwrap_or(false)
        {
            self.image_url = None;
        }
        self.articles.truncate(MAX_ARTICLES);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Free-form answer of the general web search fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchSummary {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

impl WebSearchSummary {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.citations.is_empty()
    }
}

/// Cross-turn memory of one conversation.
///
/// Only the dispatch engine writes to it, and only after a successful
/// provider call of the matching kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Topic of the most recent paper search; the news follow-up reads it.
    pub current_research_query: Option<String>,
    /// Capped output of the most recent paper search.
    pub last_scholar_results: Option<PaperSearchResult>,
    /// Candidates of the most recent author-name search.
    pub last_author_search_results: Option<Vec<AuthorSummary>>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Articles of the last paper search, or an empty slice.
    pub fn last_articles(&self) -> &[Article] {
        self.last_scholar_results
            .as_ref()
            .map(|r| r.articles.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(image_url: Option<&str>, article_count: usize) -> AuthorDetail {
        AuthorDetail {
            author_id: "abcDEF12AAAAJ".to_string(),
            name: "Ada Lovelace".to_string(),
            image_url: image_url.map(String::from),
            profile_url: "https://scholar.google.com/citations?user=abcDEF12AAAAJ".to_string(),
            affiliations: None,
            interests: vec![],
            email: None,
            articles: (0..article_count)
                .map(|i| AuthorArticle {
                    title: format!("Paper {}", i),
                    link: None,
                    authors: None,
                    publication: None,
                    year: None,
                    cited_by: None,
                })
                .collect(),
            scraped_links: BTreeSet::new(),
        }
    }

    #[test]
    fn test_placeholder_avatar_is_dropped() {
        let normalized = detail(Some(PLACEHOLDER_AVATAR_URL), 0).normalized();
        assert_eq!(normalized.image_url, None);
    }

    #[test]
    fn test_real_photo_is_kept() {
        let url = "https://scholar.googleusercontent.com/citations?view_op=view_photo&user=x";
        let normalized = detail(Some(url), 0).normalized();
        assert_eq!(normalized.image_url.as_deref(), Some(url));
    }

    #[test]
    fn test_articles_are_capped() {
        let normalized = detail(None, 8).normalized();
        assert_eq!(normalized.articles.len(), MAX_ARTICLES);
        assert_eq!(normalized.articles[0].title, "Paper 0");
    }

    #[test]
    fn test_empty_state_has_no_articles() {
        let state = ConversationState::new();
        assert!(state.last_articles().is_empty());
        assert!(state.current_research_query.is_none());
    }
}
