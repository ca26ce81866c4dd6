//! AdvisorChat - Context-Scoped Guide Conversation
//!
//! ## Responsibilities
//!
//! - Welcome turn for a context with no history
//! - User turn -> model reply exchange, persisted through the ledger
//! - Visible transcript (hidden system notes filtered out)
//!
//! The advisor session is rebuilt from the ledger history on every turn, so
//! notes appended by the auditor in the meantime are part of the context.

use crate::ai_client::InferenceClient;
use crate::error::{Error, Result};
use crate::models::ChatMessage;
use crate::stats_store::SessionLedger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reply used when the advisor call fails
pub const CONNECTIVITY_FALLBACK: &str =
    "I encountered a connectivity issue. Please try your question again.";

/// Starter questions offered to the user
pub const SUGGESTED_QUESTIONS: [&str; 4] = [
    "Explain the detected issues",
    "What are WCAG contrast rules?",
    "How can I fix these barriers?",
    "Why is this so difficult?",
];

fn welcome_text(context: &str) -> String {
    format!(
        "Hello! I'm your interactive AI guide for this {} session. I'm here to answer questions \
         about the environment, explain accessibility standards like ADA or WCAG, and provide \
         remediation advice. How can I help you today?",
        context
    )
}

/// Clears the loading flag when the exchange ends or is cancelled
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Advisor conversation bound to one context label
pub struct AdvisorChat {
    client: Arc<dyn InferenceClient>,
    ledger: Arc<dyn SessionLedger>,
    context: String,
    loading: AtomicBool,
}

impl AdvisorChat {
    /// Open the conversation, posting the welcome turn if the context is new
    pub async fn open(
        client: Arc<dyn InferenceClient>,
        ledger: Arc<dyn SessionLedger>,
        context: impl Into<String>,
    ) -> Result<Self> {
        let context = context.into();

        if ledger.history(&context).await.is_empty() {
            ledger
                .append_history(&context, ChatMessage::model(welcome_text(&context)))
                .await?;
            tracing::debug!(context = %context, "Advisor welcome posted");
        }

        Ok(Self {
            client,
            ledger,
            context,
            loading: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Send one user turn and return the model turn that was recorded
    ///
    /// A failed call still records a reply (the connectivity fallback).
    pub async fn send(&self, text: &str) -> Result<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("Advisor message is empty".to_string()));
        }
        if self.loading.swap(true, Ordering::SeqCst) {
            return Err(Error::Validation("Advisor is still answering".to_string()));
        }
        let _loading = LoadingGuard(&self.loading);

        self.exchange(text).await
    }

    async fn exchange(&self, text: &str) -> Result<ChatMessage> {
        let prior = self.ledger.history(&self.context).await;
        let mut session = self.client.create_advisor_session(&self.context, &prior);

        self.ledger
            .append_history(&self.context, ChatMessage::user(text))
            .await?;

        let reply = match self.client.send_advisor_turn(&mut session, text).await {
            Some(reply) => ChatMessage::model(reply),
            None => {
                tracing::warn!(context = %self.context, "Advisor unavailable, posting fallback");
                ChatMessage::model(CONNECTIVITY_FALLBACK)
            }
        };

        self.ledger
            .append_history(&self.context, reply.clone())
            .await?;
        Ok(reply)
    }

    /// Transcript without hidden turns
    pub async fn visible_transcript(&self) -> Vec<ChatMessage> {
        self.ledger
            .history(&self.context)
            .await
            .into_iter()
            .filter(|m| !m.is_hidden)
            .collect()
    }
}
