// Scholar Agent - conversational research assistant over Google Scholar

pub mod agents;
pub mod config;
pub mod deploy;
pub mod models;
pub mod search; // SerpAPI-backed Scholar, News and web search providers
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use agents::{DispatchEngine, Intent, ResearchAssistant, Response};
pub use config::Config;
pub use models::ConversationState;
pub use search::{ScholarProvider, SerpApiClient};
