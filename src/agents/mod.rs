//! Agent System
//!
//! The pieces that turn one user utterance into one Markdown reply:
//!
//! - **Intent Classifier**: maps free text onto a typed `Intent`
//! - **Dispatch Engine**: calls providers and updates conversation memory
//! - **Reply Agent**: renders the structured response
//!
//! ## Pipeline Overview
//!
//! ```text
//! User Message
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Intent    │  → PaperQuery, AuthorByNameQuery, ...
//! │ Classifier  │
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Dispatch   │  → Provider calls (chained or concurrent)
//! │   Engine    │  ⇄ ConversationState
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Reply     │  → Markdown response
//! │   Agent     │
//! └─────────────┘
//!      │
//!      ▼
//!  User Response
//! ```

pub mod dispatch;
pub mod intent;
pub mod reply;

// Re-export main components
pub use dispatch::{AuthorLookup, Clarification, DispatchEngine, Response, ResponseKind};
pub use intent::{Intent, IntentClassifier, KeywordClassifier};
pub use reply::ReplyAgent;

use crate::models::ConversationState;
use tracing::info;

/// One conversation turn: classify, dispatch, render.
pub struct ResearchAssistant {
    classifier: Box<dyn IntentClassifier>,
    engine: DispatchEngine,
}

impl ResearchAssistant {
    pub fn new(engine: DispatchEngine) -> Self {
        Self::with_classifier(Box::new(KeywordClassifier::new()), engine)
    }

    pub fn with_classifier(classifier: Box<dyn IntentClassifier>, engine: DispatchEngine) -> Self {
        Self { classifier, engine }
    }

    /// Answer one utterance, updating the conversation memory.
    pub async fn respond(&self, utterance: &str, state: &mut ConversationState) -> String {
        info!(message_len = utterance.len(), "Handling user message");

        let response = match self.classifier.classify(utterance, state) {
            Some(intent) => self.engine.dispatch(intent, state).await,
            None => Response::NeedsInput(Clarification::TopicOrAuthor),
        };

        info!(kind = ?response.kind(), "Turn complete");
        ReplyAgent::render(&response)
    }
}
