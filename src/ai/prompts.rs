//! Prompt builders for AI features

use crate::constants::NO_TASK_SENTINEL;

/// Instructions for single-task extraction. The model answers with the task
/// text alone, or the sentinel when the message asks nothing of the reader.
const TASK_EXTRACTION_RULES: &str = r#"You are a helpful assistant that extracts actionable tasks from emails.

Analyze the following email and extract ONE clear, concise to-do item.

Rules:
- Extract only ONE actionable task (the most important one)
- The task should be written as a clear action item
- Keep it concise (max 100 characters)"#;

/// Build the deterministic to-do extraction prompt for one message.
pub fn task_extraction_prompt(subject: &str, body: &str) -> String {
    format!(
        "{TASK_EXTRACTION_RULES}\n\
         - If there is no actionable task in the email, respond with: \"{NO_TASK_SENTINEL}\"\n\
         - Do not include explanations, only output the task text or \"{NO_TASK_SENTINEL}\"\n\
         \n\
         Email Subject: {subject}\n\
         \n\
         Email Body:\n\
         {body}\n\
         \n\
         Extracted Task:"
    )
}

/// Build a structured analysis prompt: agent instructions, the expected
/// output fields as `- name (type)` lines, the message and a JSON-only
/// output instruction.
#[allow(dead_code)]
pub fn email_analysis_prompt(
    subject: &str,
    body: &str,
    agent_prompt: &str,
    context_schema: &[(String, String)],
) -> String {
    let schema = context_schema
        .iter()
        .map(|(key, kind)| format!("- {} ({})", key, kind))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an email analysis assistant. Analyze the following email and extract structured information.\n\
         \n\
         Agent Instructions:\n\
         {agent_prompt}\n\
         \n\
         Expected Output Schema:\n\
         {schema}\n\
         \n\
         Email to Analyze:\n\
         Subject: {subject}\n\
         \n\
         Body:\n\
         {body}\n\
         \n\
         Please provide the extracted information in JSON format matching the schema above.\n\
         Only output the JSON, no additional text."
    )
}
