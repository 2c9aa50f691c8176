//! Profile Page Scraper
//!
//! Pulls direct article links out of a Google Scholar author profile page.
//! SerpAPI only returns the first few publications, the page itself lists more.

use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

const SCHOLAR_ORIGIN: &str = "https://scholar.google.com";

/// Scholar serves a stripped page to unknown clients.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Markers of a link that opens a single article view.
const ARTICLE_VIEW_MARKERS: [&str; 2] = ["view_citation", "view_article"];

/// Fetch a profile page and extract its article links.
///
/// Never fails: any fetch problem is logged and yields an empty set.
pub async fn scrape_profile_links(
    client: &reqwest::Client,
    profile_url: &str,
    timeout: Duration,
) -> BTreeSet<String> {
    let response = client
        .get(profile_url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .timeout(timeout)
        .send()
        .await
        .and_then(|r| r.error_for_status());

    let body = match response {
        Ok(response) => response.text().await,
        Err(e) => Err(e),
    };

    match body {
        Ok(html) => {
            let links = extract_article_links(&html);
            debug!(url = %profile_url, count = links.len(), "Scraped profile page");
            links
        }
        Err(e) => {
            warn!(url = %profile_url, error = %e, "Failed to scrape profile page");
            BTreeSet::new()
        }
    }
}

/// Extract article view links from profile HTML.
pub fn extract_article_links(html: &str) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    let mut links = BTreeSet::new();

    let selector = match Selector::parse("a.gsc_a_at") {
        Ok(selector) => selector,
        Err(e) => {
            warn!(error = ?e, "Invalid article link selector");
            return links;
        }
    };

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let full_url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", SCHOLAR_ORIGIN, href)
        };
        if ARTICLE_VIEW_MARKERS.iter().any(|m| full_url.contains(m)) {
            links.insert(full_url);
        }
    }

    links
}
