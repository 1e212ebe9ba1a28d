//! To-do extraction over stored messages.

use std::sync::Arc;

use super::outcome::{BatchResult, Outcome};
use crate::ai::{AiClient, prompts};
use crate::constants::{MAX_TODO_CHARS, NO_TASK_SENTINEL, TASK_LABELS};
use crate::error::{ErrorKind, ProcessingError};
use crate::mail::EmailMessage;
use crate::store::EmailStore;

const ALREADY_ANALYZED: &str = "Email already analyzed";
const NO_TODO_FOUND: &str = "No TODO found";

pub struct AnalysisOrchestrator {
    ai: AiClient,
    store: Arc<dyn EmailStore>,
}

/// Case-insensitive ASCII prefix test that never splits a character.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Clean a model reply down to the to-do text.
///
/// An empty result means the message holds no task.
pub fn normalize_task(raw: &str) -> String {
    let mut text = raw.trim();
    if text.eq_ignore_ascii_case(NO_TASK_SENTINEL) {
        return String::new();
    }

    for label in TASK_LABELS {
        if let Some(rest) = strip_prefix_ignore_case(text, label) {
            text = rest.trim();
        }
    }
    if text.eq_ignore_ascii_case(NO_TASK_SENTINEL) {
        return String::new();
    }

    if text.chars().count() > MAX_TODO_CHARS {
        let kept: String = text.chars().take(MAX_TODO_CHARS - 3).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

impl AnalysisOrchestrator {
    pub fn new(ai: AiClient, store: Arc<dyn EmailStore>) -> Self {
        Self { ai, store }
    }

    /// Extract the to-do of one message and record it.
    ///
    /// An already processed message is left alone and reported as success.
    pub async fn analyze_single(&self, message: &EmailMessage) -> Outcome<String> {
        if message.processed {
            return Outcome::Success(ALREADY_ANALYZED.to_string());
        }

        let prompt = prompts::task_extraction_prompt(&message.subject, &message.body);
        let reply = match self.ai.generate_content(&prompt).await {
            Ok(reply) => reply,
            Err(e) => return Outcome::Error(e.into_remote()),
        };

        let todo = normalize_task(&reply);
        let stored = (!todo.is_empty()).then_some(todo.as_str());
        match self.store.mark_processed(message.id, stored).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Message {} was analyzed concurrently", message.id);
                return Outcome::Success(ALREADY_ANALYZED.to_string());
            }
            Err(e) => {
                return Outcome::Error(ProcessingError::classify(
                    "Failed to save analysis",
                    e,
                    ErrorKind::Database,
                ));
            }
        }

        if todo.is_empty() {
            tracing::debug!("No to-do in '{}'", message.subject);
            Outcome::Success(NO_TODO_FOUND.to_string())
        } else {
            tracing::debug!("Extracted to-do from '{}': {}", message.subject, todo);
            Outcome::Success(format!("TODO extracted: {}", todo))
        }
    }

    /// Analyze messages one after another, in order. A failed item never
    /// stops the batch.
    pub async fn analyze_multiple(&self, messages: &[EmailMessage]) -> BatchResult {
        let mut batch = BatchResult::with_capacity(messages.len());

        for message in messages {
            match self.analyze_single(message).await {
                Outcome::Success(summary) => {
                    batch.record_success(message.id, &message.subject, summary)
                }
                Outcome::Error(e) => {
                    tracing::warn!("Analysis of '{}' failed: {}", message.subject, e);
                    batch.record_failure(message.id, &message.subject, e.message)
                }
                Outcome::Loading => {
                    batch.record_skip(message.id, &message.subject, "Analysis pending")
                }
            }
        }

        tracing::info!(
            "Analyzed {} messages: {} succeeded, {} failed",
            batch.total,
            batch.successful,
            batch.failed
        );
        batch
    }

    /// Analyze everything the store still holds unprocessed.
    pub async fn analyze_pending(&self) -> Outcome<BatchResult> {
        match self.store.unprocessed().await {
            Ok(messages) => Outcome::Success(self.analyze_multiple(&messages).await),
            Err(e) => Outcome::Error(ProcessingError::classify(
                "Failed to load unprocessed messages",
                e,
                ErrorKind::Database,
            )),
        }
    }
}
