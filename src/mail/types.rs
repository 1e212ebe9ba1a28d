/// A message as the mail provider hands it over, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage {
    /// Provider-assigned id, globally unique and immutable
    pub provider_id: String,
    pub subject: String,
    pub sender: String,
    pub sender_name: Option<String>,
    pub body: String,
    /// Unix seconds
    pub received_at: i64,
    pub has_attachments: bool,
}

impl CanonicalMessage {
    pub fn display_sender(&self) -> &str {
        self.sender_name.as_deref().unwrap_or(&self.sender)
    }
}

/// A stored message with its processing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Local storage key
    pub id: i64,
    pub provider_id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub received_at: i64,
    pub processed: bool,
    pub extracted_todo: Option<String>,
    pub todos_synced: bool,
}

impl EmailMessage {
    /// The extracted to-do, if one exists and is not blank.
    pub fn todo(&self) -> Option<&str> {
        self.extracted_todo
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Where the last fetch left off. One logical instance per mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCheckpoint {
    /// Opaque provider history cursor
    pub cursor: Option<String>,
    /// Unix seconds of the last fetch that produced a cursor
    pub last_sync: Option<i64>,
}

/// Result of one gateway fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub messages: Vec<CanonicalMessage>,
    /// New cursor to persist, if the provider reported one
    pub new_cursor: Option<String>,
}
