//! Result types returned by the orchestrators.
//!
//! None of these are persisted. The scheduler matches on them exhaustively to
//! pick between retry, terminal failure and recording a partial success.

use crate::error::ProcessingError;

/// Uniform return type of every single-item orchestrator operation.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Error(ProcessingError),
    /// Work was accepted but has not produced a result yet.
    Loading,
}

#[cfg(test)]
impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn error(&self) -> Option<&ProcessingError> {
        match self {
            Outcome::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl<T> From<Result<T, ProcessingError>> for Outcome<T> {
    fn from(result: Result<T, ProcessingError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(e) => Outcome::Error(e),
        }
    }
}

/// Result of one mail sync cycle.
#[derive(Debug, Clone)]
pub enum SyncResult {
    Success {
        fetched: usize,
        processed: usize,
        errors: usize,
    },
    /// Some targets failed while at least one made progress.
    PartialSuccess {
        fetched: usize,
        processed: usize,
        errors: usize,
        error_messages: Vec<String>,
    },
    Failure(ProcessingError),
}

/// Per-item record inside a [`BatchResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Local storage id of the message
    pub id: i64,
    pub subject: String,
    pub success: bool,
    pub skipped: bool,
    /// Summary on success, error message on failure, reason when skipped
    pub message: String,
}

/// Aggregate over many independent item attempts. `items` keeps input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<ItemOutcome>,
}

impl BatchResult {
    pub(crate) fn with_capacity(total: usize) -> Self {
        Self {
            total,
            items: Vec::with_capacity(total),
            ..Self::default()
        }
    }

    pub(crate) fn record_success(&mut self, id: i64, subject: &str, message: String) {
        self.successful += 1;
        self.items.push(ItemOutcome {
            id,
            subject: subject.to_string(),
            success: true,
            skipped: false,
            message,
        });
    }

    pub(crate) fn record_failure(&mut self, id: i64, subject: &str, message: String) {
        self.failed += 1;
        self.items.push(ItemOutcome {
            id,
            subject: subject.to_string(),
            success: false,
            skipped: false,
            message,
        });
    }

    pub(crate) fn record_skip(&mut self, id: i64, subject: &str, reason: &str) {
        self.skipped += 1;
        self.items.push(ItemOutcome {
            id,
            subject: subject.to_string(),
            success: false,
            skipped: true,
            message: reason.to_string(),
        });
    }

    /// Messages of failed items, in input order.
    pub fn failure_messages(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| !item.success && !item.skipped)
            .map(|item| format!("{}: {}", item.subject, item.message))
            .collect()
    }
}
