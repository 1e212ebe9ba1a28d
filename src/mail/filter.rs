//! Per-target message predicates.
//!
//! Each pattern list is matched case-insensitively as plain substrings. An
//! empty list matches everything; a non-empty list needs at least one hit.
//! All configured criteria must hold for a message to match.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use anyhow::{Context, Result};

use super::types::CanonicalMessage;

#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    senders: Option<AhoCorasick>,
    subjects: Option<AhoCorasick>,
    /// Searched in subject and body
    keywords: Option<AhoCorasick>,
    /// `Some(true)` needs attachments, `Some(false)` forbids them
    has_attachments: Option<bool>,
}

fn automaton(patterns: &[String]) -> Result<Option<AhoCorasick>> {
    let patterns: Vec<&str> = patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if patterns.is_empty() {
        return Ok(None);
    }

    let ac = AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(patterns)
        .context("Failed to build filter patterns")?;
    Ok(Some(ac))
}

fn hits(ac: &Option<AhoCorasick>, haystacks: &[&str]) -> bool {
    match ac {
        None => true,
        Some(ac) => haystacks.iter().any(|h| ac.is_match(*h)),
    }
}

impl MessageFilter {
    pub fn new(
        senders: &[String],
        subjects: &[String],
        keywords: &[String],
        has_attachments: Option<bool>,
    ) -> Result<Self> {
        Ok(Self {
            senders: automaton(senders)?,
            subjects: automaton(subjects)?,
            keywords: automaton(keywords)?,
            has_attachments,
        })
    }

    /// A filter that accepts every message.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, message: &CanonicalMessage) -> bool {
        let sender_name = message.sender_name.as_deref().unwrap_or_default();

        hits(&self.senders, &[message.sender.as_str(), sender_name])
            && hits(&self.subjects, &[message.subject.as_str()])
            && hits(&self.keywords, &[message.subject.as_str(), message.body.as_str()])
            && self
                .has_attachments
                .is_none_or(|wanted| wanted == message.has_attachments)
    }
}
