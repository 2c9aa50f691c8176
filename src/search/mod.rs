//! Search Module
//!
//! External lookups used by the dispatch engine:
//! - Google Scholar papers, related articles and author profiles
//! - Google News coverage of a research topic
//! - Google Light web search as the fallback for authors without a profile
//!
//! `provider` defines the contract the engine depends on; `serpapi` is the
//! SerpAPI-backed implementation and `scrape` reads author profile pages.

pub mod provider;
pub mod scrape;
pub mod serpapi;

pub use provider::{Lookup, ProviderError, ProviderResult, ScholarProvider};
pub use serpapi::{SearchError, SerpApiClient};
