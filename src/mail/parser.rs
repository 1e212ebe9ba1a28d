use mail_parser::{MessageParser, MimeHeaders, PartType};

use super::types::CanonicalMessage;

/// Normalize a raw RFC 5322 message.
///
/// `fallback_id` stands in when the message has no `Message-ID`, and
/// `fallback_date` when it has no parsable `Date`. Returns `None` only for
/// input that is not a mail message at all.
pub fn parse_message(raw: &[u8], fallback_id: &str, fallback_date: i64) -> Option<CanonicalMessage> {
    let message = MessageParser::default().parse(raw)?;

    let (sender, sender_name) = match message.from().and_then(|addrs| addrs.first()) {
        Some(from) => (
            from.address().unwrap_or_default().to_string(),
            from.name().map(|s| s.to_string()),
        ),
        None => (String::new(), None),
    };

    let provider_id = message
        .message_id()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| fallback_id.to_string());

    let subject = message
        .subject()
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let received_at = message
        .date()
        .map(|d| d.to_timestamp())
        .unwrap_or(fallback_date);

    Some(CanonicalMessage {
        provider_id,
        subject,
        sender,
        sender_name,
        body: extract_body(&message),
        received_at,
        has_attachments: message.attachment_count() > 0,
    })
}

/// Plain text when the message has it, otherwise the HTML part flattened.
fn extract_body(message: &mail_parser::Message) -> String {
    if let Some(text) = extract_text_body(message) {
        return text;
    }

    for part in message.html_bodies() {
        if let PartType::Html(html) = &part.body {
            return html_to_text(html);
        }
    }

    String::new()
}

fn extract_text_body(message: &mail_parser::Message) -> Option<String> {
    for part in message.text_bodies() {
        if let PartType::Text(text) = &part.body {
            return Some(text.trim().to_string());
        }
    }

    // Some senders put the text in an untyped part
    for part in message.parts.iter() {
        if let PartType::Text(text) = &part.body
            && part
                .content_type()
                .map(|ct| ct.subtype() == Some("plain"))
                .unwrap_or(true)
        {
            return Some(text.trim().to_string());
        }
    }

    None
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}
