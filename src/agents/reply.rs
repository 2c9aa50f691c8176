//! Reply Agent
//!
//! Renders a dispatch `Response` as the Markdown the user sees.
//! This is the final step in the agent pipeline.

use crate::agents::dispatch::{AuthorLookup, Clarification, Response};
use crate::models::{Article, AuthorDetail, AuthorSummary, NewsArticle, WebSearchSummary};
use crate::search::{Lookup, ProviderError};

const NOT_AVAILABLE: &str = "N/A";

pub struct ReplyAgent;

impl ReplyAgent {
    /// Render one turn's response.
    pub fn render(response: &Response) -> String {
        match response {
            Response::PapersFound { articles, .. } => Self::papers(articles),
            Response::PapersEmpty { topic } => format!(
                "I could not find any research papers for \"{}\". Please try a different topic.",
                topic
            ),
            Response::SimilarArticles {
                source_title,
                articles,
            } => {
                let mut out = format!("Here are some articles similar to \"{}\":\n\n", source_title);
                for (i, article) in articles.iter().enumerate() {
                    out.push_str(&Self::article_entry(i + 1, article, false));
                }
                out
            }
            Response::SimilarArticlesEmpty { source_title } => {
                format!("I could not find any articles similar to \"{}\".", source_title)
            }
            Response::News { topic, articles } => Self::news(topic, articles),
            Response::NewsEmpty { topic } => {
                format!("I could not find any trending news about \"{}\" right now.", topic)
            }
            Response::AuthorDetails { lookups } => Self::author_lookups(lookups),
            Response::AuthorProfile { summary, detail } => match detail {
                Ok(detail) => format!(
                    "I found one author matching that name: **{}** ([search result]({}), author_id `{}`).\n\n{}",
                    summary.name,
                    summary.profile_link,
                    summary.author_id,
                    Self::author_detail(detail)
                ),
                Err(error) => format!(
                    "I found **{}** ([profile]({}), author_id `{}`) but could not load their details: {}",
                    summary.name, summary.profile_link, summary.author_id, error
                ),
            },
            Response::AuthorCandidates { name, candidates } => Self::candidates(name, candidates),
            Response::AuthorNotFound { name, fallback } => Self::not_found(name, fallback),
            Response::Failed { lookup, error } => Self::failure(*lookup, error),
            Response::NeedsInput(clarification) => Self::clarification(clarification),
        }
    }

    fn papers(articles: &[Article]) -> String {
        let mut out = String::from("Here are some papers I found related to your query:\n\n");
        for (i, article) in articles.iter().enumerate() {
            out.push_str(&Self::article_entry(i + 1, article, true));
        }
        out.push_str(
            "\n---\n\n*Ask about the authors of any of these papers, or for similar articles or trending news.*",
        );
        out
    }

    fn article_entry(position: usize, article: &Article, with_authors: bool) -> String {
        let mut out = match &article.link {
            Some(link) => format!("{}. [{}]({})\n", position, article.title, link),
            None => format!("{}. {}\n", position, article.title),
        };
        if !article.snippet.trim().is_empty() {
            out.push_str(&format!("   {}\n", article.snippet.trim()));
        }
        if with_authors {
            if !article.author_names.is_empty() {
                out.push_str(&format!("   Authors: {}\n", article.author_names.join(", ")));
            } else if let Some(summary) = &article.publication_summary {
                out.push_str(&format!("   Authors: {}\n", summary));
            }
            if !article.author_ids.is_empty() {
                let ids: Vec<String> = article.author_ids.iter().map(|id| format!("`{}`", id)).collect();
                out.push_str(&format!("   Author IDs: {}\n", ids.join(", ")));
            }
        }
        out.push('\n');
        out
    }

    fn news(topic: &str, articles: &[NewsArticle]) -> String {
        let mut out = format!("Here is the latest news about \"{}\":\n\n", topic);
        for (i, article) in articles.iter().enumerate() {
            match &article.link {
                Some(link) => out.push_str(&format!("{}. [{}]({})\n", i + 1, article.title, link)),
                None => out.push_str(&format!("{}. {}\n", i + 1, article.title)),
            }
            let byline: Vec<&str> = [&article.author, &article.source, &article.date]
                .into_iter()
                .filter_map(|field| field.as_deref())
                .collect();
            if !byline.is_empty() {
                out.push_str(&format!("   {}\n", byline.join(" | ")));
            }
        }
        out
    }

    fn author_lookups(lookups: &[AuthorLookup]) -> String {
        let sections: Vec<String> = lookups
            .iter()
            .map(|lookup| match &lookup.outcome {
                Ok(detail) => Self::author_detail(detail),
                Err(error) => format!(
                    "I could not find details for author `{}`. Please ensure the author ID or name is correct. ({})",
                    lookup.author_id, error
                ),
            })
            .collect();
        sections.join("\n\n---\n\n")
    }

    fn author_detail(detail: &AuthorDetail) -> String {
        let mut out = String::from("Here are the details for the author:\n\n");
        out.push_str(&format!("**Name:** {}\n", detail.name));
        if let Some(image) = &detail.image_url {
            out.push_str(&format!("![Profile image of {}]({})\n", detail.name, image));
        }
        out.push_str(&format!(
            "**Google Scholar Profile:** [Profile Link]({})\n",
            detail.profile_url
        ));
        out.push_str(&format!(
            "**Affiliations:** {}\n",
            detail.affiliations.as_deref().unwrap_or(NOT_AVAILABLE)
        ));
        let interests = if detail.interests.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            detail.interests.join(", ")
        };
        out.push_str(&format!("**Interests:** {}\n", interests));
        out.push_str(&format!(
            "**Email:** {}\n",
            detail.email.as_deref().unwrap_or(NOT_AVAILABLE)
        ));

        out.push_str("\n**Publications (from Google Scholar):**\n");
        if detail.articles.is_empty() {
            out.push_str("No publications available.\n");
        }
        for (i, article) in detail.articles.iter().enumerate() {
            match &article.link {
                Some(link) => out.push_str(&format!("{}. [{}]({})\n", i + 1, article.title, link)),
                None => out.push_str(&format!("{}. {}\n", i + 1, article.title)),
            }
            if let Some(authors) = &article.authors {
                out.push_str(&format!("   Authors: {}\n", authors));
            }
            out.push_str(&format!(
                "   Publication: {} | Year: {} | Cited by: {}\n",
                article.publication.as_deref().unwrap_or(NOT_AVAILABLE),
                article.year.as_deref().unwrap_or(NOT_AVAILABLE),
                article
                    .cited_by
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string())
            ));
        }

        if !detail.scraped_links.is_empty() {
            out.push_str("\n**Additional Article Links (scraped from profile):**\n");
            for link in &detail.scraped_links {
                out.push_str(&format!("- {}\n", link));
            }
        }

        out.push_str("\nThat completes this author. Ask me about another author whenever you like.");
        out
    }

    fn candidates(name: &str, candidates: &[AuthorSummary]) -> String {
        let mut out = format!("I found several authors matching \"{}\":\n\n", name);
        for (i, candidate) in candidates.iter().enumerate() {
            out.push_str(&format!(
                "{}. [{}]({}) (author_id: `{}`)\n",
                i + 1,
                candidate.name,
                candidate.profile_link,
                candidate.author_id
            ));
        }
        out.push_str(
            "\nIs one of these the author you meant? Reply with their exact `author_id` for detailed information.",
        );
        out
    }

    fn not_found(name: &str, fallback: &Result<WebSearchSummary, ProviderError>) -> String {
        let mut out = format!(
            "I couldn't find any authors matching \"{}\". If you have their full name or author ID, I can search again.\n\n\
            This author does not seem to have a Google Scholar profile, so I ran a general web search instead.\n\n",
            name
        );
        match fallback {
            Ok(summary) if !summary.is_empty() => {
                out.push_str(summary.text.trim());
                out.push('\n');
                if !summary.citations.is_empty() {
                    out.push_str("\n**Sources:**\n");
                    for citation in &summary.citations {
                        out.push_str(&format!("- {}\n", citation));
                    }
                }
            }
            Ok(_) => out.push_str("The web search did not return anything useful either."),
            Err(error) => out.push_str(&format!("The web search failed as well: {}", error)),
        }
        out
    }

    fn failure(lookup: Lookup, error: &ProviderError) -> String {
        match lookup {
            Lookup::Papers => format!(
                "The paper search failed: {}. Please try again in a moment.",
                error
            ),
            other => format!("The {} failed: {}. Please try again in a moment.", other, error),
        }
    }

    fn clarification(clarification: &Clarification) -> String {
        match clarification {
            Clarification::TopicOrAuthor => "Hello! I can help you find research papers, author profiles and trending news. \
                What research topic are you interested in, or which author would you like to know about?"
                .to_string(),
            Clarification::ResearchTopic => {
                "Which research topic would you like news about? Search for papers on a topic first and I'll keep it in mind."
                    .to_string()
            }
            Clarification::ArticleSelection => {
                "Which article should I find similar work for? Search for papers first, then refer to one by its position or title."
                    .to_string()
            }
            Clarification::AuthorId => {
                "Please give me the author's Google Scholar author_id (for example `JicYPdAAAAAJ`).".to_string()
            }
            Clarification::ArticleReference { hint } => format!(
                "I'm not sure which paper \"{}\" refers to. Please name the paper by its title or position in the last list, or give me an author_id.",
                hint
            ),
            Clarification::ArticleWithoutAuthors { title } => format!(
                "\"{}\" does not list any Google Scholar author profiles. Try searching for an author by name instead.",
                title
            ),
        }
    }
}
