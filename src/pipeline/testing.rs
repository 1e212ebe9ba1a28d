//! In-memory collaborators for pipeline tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::ai::{GenerationConfig, GenerationTransport};
use crate::mail::types::FetchBatch;
use crate::mail::{CanonicalMessage, EmailMessage, MailGateway, SyncCheckpoint};
use crate::store::{EmailStore, SqliteStore};
use crate::todo::TodoGateway;

pub fn canonical(provider_id: &str) -> CanonicalMessage {
    CanonicalMessage {
        provider_id: provider_id.to_string(),
        subject: format!("Message {}", provider_id),
        sender: "sender@example.com".to_string(),
        sender_name: None,
        body: format!("Body of {}", provider_id),
        received_at: 1_700_000_000,
        has_attachments: false,
    }
}

impl CanonicalMessage {
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn received(mut self, at: i64) -> Self {
        self.received_at = at;
        self
    }
}

type ErrorFactory = Box<dyn Fn() -> anyhow::Error + Send + Sync>;

pub struct FakeMailGateway {
    batch: Option<FetchBatch>,
    error: Option<ErrorFactory>,
    calls: AtomicUsize,
    last_checkpoint: Mutex<SyncCheckpoint>,
}

impl FakeMailGateway {
    /// Returns the same batch on every call.
    pub fn returning(messages: Vec<CanonicalMessage>, cursor: Option<&str>) -> Self {
        Self {
            batch: Some(FetchBatch {
                messages,
                new_cursor: cursor.map(String::from),
            }),
            error: None,
            calls: AtomicUsize::new(0),
            last_checkpoint: Mutex::new(SyncCheckpoint::default()),
        }
    }

    pub fn failing(error: impl Fn() -> anyhow::Error + Send + Sync + 'static) -> Self {
        Self {
            batch: None,
            error: Some(Box::new(error)),
            calls: AtomicUsize::new(0),
            last_checkpoint: Mutex::new(SyncCheckpoint::default()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_checkpoint(&self) -> SyncCheckpoint {
        self.last_checkpoint.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailGateway for FakeMailGateway {
    async fn fetch_new_messages(&self, since: &SyncCheckpoint) -> Result<FetchBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_checkpoint.lock().unwrap() = since.clone();
        match (&self.batch, &self.error) {
            (_, Some(error)) => Err(error()),
            (Some(batch), None) => Ok(batch.clone()),
            (None, None) => Ok(FetchBatch::default()),
        }
    }
}

/// Mailbox that, like IMAP, only offers messages past the cursor it is given.
///
/// The cursor is the highest position handed out so far.
pub struct CursorMailbox {
    messages: Vec<CanonicalMessage>,
}

impl CursorMailbox {
    pub fn new(messages: Vec<CanonicalMessage>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl MailGateway for CursorMailbox {
    async fn fetch_new_messages(&self, since: &SyncCheckpoint) -> Result<FetchBatch> {
        let seen = match since.cursor.as_deref() {
            Some(cursor) => cursor.parse::<usize>()?,
            None => 0,
        };
        Ok(FetchBatch {
            messages: self.messages.iter().skip(seen).cloned().collect(),
            new_cursor: Some(self.messages.len().max(seen).to_string()),
        })
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Generation transport answering from a script.
pub struct FakeTransport {
    replies: Mutex<VecDeque<String>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl FakeTransport {
    /// Answers with `replies` in order, then fails once they run out.
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers every prompt through `responder`.
    pub fn answering(responder: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: impl Fn() -> anyhow::Error + Send + Sync + 'static) -> Self {
        Self::answering(move |_| Err(error()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationTransport for FakeTransport {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(responder) = &self.responder {
            return responder(prompt);
        }
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => Ok(reply),
            None => bail!("no scripted reply left"),
        }
    }
}

/// To-do backend that records deliveries and rejects chosen texts.
#[derive(Default)]
pub struct FakeTodoGateway {
    rejected: HashSet<String>,
    added: Mutex<Vec<(String, String)>>,
}

impl FakeTodoGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rejected: texts.into_iter().map(Into::into).collect(),
            added: Mutex::new(Vec::new()),
        }
    }

    /// `(list, text)` pairs accepted so far.
    pub fn added(&self) -> Vec<(String, String)> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait]
impl TodoGateway for FakeTodoGateway {
    async fn add_todo(&self, list_name: &str, text: &str) -> Result<()> {
        if self.rejected.contains(text) {
            bail!(crate::error::GatewayError::Rejected {
                status: 500,
                body: format!("cannot store '{}'", text),
            });
        }
        self.added
            .lock()
            .unwrap()
            .push((list_name.to_string(), text.to_string()));
        Ok(())
    }
}

/// SQLite store whose batch insert fails when it contains chosen provider ids.
pub struct FlakyStore {
    inner: Arc<SqliteStore>,
    poisoned: HashSet<String>,
}

impl FlakyStore {
    pub fn new<I, S>(inner: Arc<SqliteStore>, poisoned: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner,
            poisoned: poisoned.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl EmailStore for FlakyStore {
    async fn exists_by_provider_id(&self, provider_id: &str) -> Result<bool> {
        self.inner.exists_by_provider_id(provider_id).await
    }

    async fn insert_ignore_duplicates(&self, messages: &[CanonicalMessage]) -> Result<usize> {
        if let Some(bad) = messages
            .iter()
            .find(|m| self.poisoned.contains(&m.provider_id))
        {
            bail!("disk I/O error while inserting {}", bad.provider_id);
        }
        self.inner.insert_ignore_duplicates(messages).await
    }

    async fn mark_processed(&self, id: i64, extracted_todo: Option<&str>) -> Result<bool> {
        self.inner.mark_processed(id, extracted_todo).await
    }

    async fn mark_synced(&self, id: i64) -> Result<bool> {
        self.inner.mark_synced(id).await
    }

    async fn unprocessed(&self) -> Result<Vec<EmailMessage>> {
        self.inner.unprocessed().await
    }

    async fn unsynced_todos(&self) -> Result<Vec<EmailMessage>> {
        self.inner.unsynced_todos().await
    }

    async fn load_checkpoint(&self) -> Result<SyncCheckpoint> {
        self.inner.load_checkpoint().await
    }

    async fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        self.inner.save_checkpoint(checkpoint).await
    }
}
