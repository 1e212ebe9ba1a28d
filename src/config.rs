use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use crate::constants::{
    AI_JITTER_MAX_MS, AI_JITTER_MIN_MS, AI_REQUESTS_PER_MINUTE, INITIAL_LOOKBACK_DAYS,
    JOB_RETRY_INITIAL_DELAY_MS, JOB_RETRY_MAX_DELAY_MS, MAX_FETCH_PER_CYCLE, MAX_JOB_ATTEMPTS,
    SYNC_INTERVAL_SECS,
};
use crate::error::ProcessingError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mail: MailConfig,
    /// LLM settings (OpenRouter)
    #[serde(default)]
    pub ai: AiConfig,
    /// To-do list backend
    #[serde(default)]
    pub todo: TodoConfig,
    /// Scheduler period and retry policy
    #[serde(default)]
    pub sync: SyncConfig,
    /// Desktop notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Named mailbox filters; none means everything is stored
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Messages pulled per cycle at most
    #[serde(default = "default_max_fetch")]
    pub max_fetch: usize,
    /// How far back the very first sync reaches
    #[serde(default = "default_lookback_days")]
    pub initial_lookback_days: i64,
}

/// Window the AI request budget applies to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RateWindow {
    #[default]
    Minute,
    Hour,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Model to use (default: google/gemini-2.0-flash-001)
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Requests admitted per `rate_window`
    #[serde(default = "default_requests_per_window")]
    pub requests_per_minute: usize,
    #[serde(default)]
    pub rate_window: RateWindow,
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_ai_model(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            requests_per_minute: default_requests_per_window(),
            rate_window: RateWindow::default(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            api_url: default_api_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoConfig {
    #[serde(default = "default_todo_base_url")]
    pub base_url: String,
    /// List receiving every extracted to-do
    #[serde(default = "default_list_name")]
    pub list_name: String,
    /// Shown as the author of created items
    #[serde(default = "default_creator_name")]
    pub creator_name: String,
    /// Create `list_name` on the backend when it does not exist yet
    #[serde(default)]
    pub create_missing_lists: bool,
}

impl Default for TodoConfig {
    fn default() -> Self {
        Self {
            base_url: default_todo_base_url(),
            list_name: default_list_name(),
            creator_name: default_creator_name(),
            create_missing_lists: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    /// Attempts per job, the first run included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Run to-do extraction after each sync
    #[serde(default = "default_true")]
    pub analyze: bool,
    /// Push extracted to-dos to the backend
    #[serde(default = "default_true")]
    pub push_todos: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
            max_attempts: default_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            analyze: true,
            push_todos: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Enable desktop notifications
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Notify about stored messages and pushed to-dos, not only failures
    #[serde(default = "default_true")]
    pub show_summary: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_summary: true,
        }
    }
}

/// A named mailbox filter. Empty lists match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default)]
    pub senders: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub has_attachments: Option<bool>,
}

fn default_imap_port() -> u16 {
    993
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_max_fetch() -> usize {
    MAX_FETCH_PER_CYCLE
}

fn default_lookback_days() -> i64 {
    INITIAL_LOOKBACK_DAYS
}

fn default_ai_model() -> String {
    "google/gemini-2.0-flash-001".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f32 {
    0.95
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_requests_per_window() -> usize {
    AI_REQUESTS_PER_MINUTE
}

fn default_jitter_min_ms() -> u64 {
    AI_JITTER_MIN_MS
}

fn default_jitter_max_ms() -> u64 {
    AI_JITTER_MAX_MS
}

fn default_api_url() -> String {
    crate::ai::DEFAULT_API_URL.to_string()
}

fn default_todo_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_list_name() -> String {
    "inbox-test".to_string()
}

fn default_creator_name() -> String {
    "MailFlow".to_string()
}

fn default_sync_interval_secs() -> u64 {
    SYNC_INTERVAL_SECS
}

fn default_max_attempts() -> u32 {
    MAX_JOB_ATTEMPTS
}

fn default_retry_initial_delay_ms() -> u64 {
    JOB_RETRY_INITIAL_DELAY_MS
}

fn default_retry_max_delay_ms() -> u64 {
    JOB_RETRY_MAX_DELAY_MS
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("mailflow");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_local_dir()
            .context("Could not find data directory")?
            .join("mailflow");
        Ok(dir)
    }

    pub fn database_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("mailflow.db"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            anyhow::bail!(
                "Configuration file not found at {}\n\
                 Please create a config file. Example:\n\n\
                 [mail]\n\
                 server = \"imap.example.com\"\n\
                 username = \"you@example.com\"\n\n\
                 [todo]\n\
                 base_url = \"https://todo.example.com/api\"\n\
                 list_name = \"inbox\"",
                path.display()
            );
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }


    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(Self::config_dir()?)?;
        fs::create_dir_all(Self::data_dir()?)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        if self.mail.server.trim().is_empty() {
            return Err(ProcessingError::parsing("mail.server must not be empty"));
        }
        if self.mail.username.trim().is_empty() {
            return Err(ProcessingError::parsing("mail.username must not be empty"));
        }
        if self.mail.max_fetch == 0 {
            return Err(ProcessingError::parsing("mail.max_fetch must be at least 1"));
        }
        if self.ai.requests_per_minute == 0 {
            return Err(ProcessingError::parsing(
                "ai.requests_per_minute must be at least 1",
            ));
        }
        if self.ai.jitter_min_ms > self.ai.jitter_max_ms {
            return Err(ProcessingError::parsing(format!(
                "ai.jitter_min_ms ({}) exceeds ai.jitter_max_ms ({})",
                self.ai.jitter_min_ms, self.ai.jitter_max_ms
            )));
        }
        if self.todo.list_name.trim().is_empty() {
            return Err(ProcessingError::validation("todo.list_name must not be blank"));
        }
        if self.sync.max_attempts == 0 {
            return Err(ProcessingError::parsing("sync.max_attempts must be at least 1"));
        }
        if self.sync.interval_secs == 0 {
            return Err(ProcessingError::parsing("sync.interval_secs must be at least 1"));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            let name = target.name.trim();
            if name.is_empty() {
                return Err(ProcessingError::validation("Target name must not be blank"));
            }
            if !names.insert(name.to_lowercase()) {
                return Err(ProcessingError::validation(format!(
                    "Duplicate target name '{}'",
                    name
                )));
            }
        }
        Ok(())
    }
}
