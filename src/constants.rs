//! Pipeline-wide constants for tuning and configuration
//!
//! Centralizes magic numbers to make them discoverable and configurable.

/// Lower bound of the pause after each successful AI call, in milliseconds.
pub const AI_JITTER_MIN_MS: u64 = 2000;

/// Upper bound of the pause after each successful AI call, in milliseconds.
pub const AI_JITTER_MAX_MS: u64 = 3000;

/// Default number of AI calls admitted per rate-limit window.
pub const AI_REQUESTS_PER_MINUTE: usize = 10;

/// Window length of the per-minute rate limiter preset.
pub const MINUTE_WINDOW_MS: u64 = 60_000;

/// Window length of the per-hour rate limiter preset.
pub const HOUR_WINDOW_MS: u64 = 3_600_000;

/// Extracted to-dos longer than this many characters are truncated.
pub const MAX_TODO_CHARS: usize = 200;

/// Literal the model is told to answer when a message has no task.
pub const NO_TASK_SENTINEL: &str = "NONE";

/// Labels models like to put in front of the task, stripped in this order.
pub const TASK_LABELS: [&str; 4] = ["Extracted Task:", "Task:", "To-do:", "Action:"];

/// Maximum attempts (first run included) before a job failure is terminal.
pub const MAX_JOB_ATTEMPTS: u32 = 3;

/// Delay before the first job retry, in milliseconds.
pub const JOB_RETRY_INITIAL_DELAY_MS: u64 = 30_000;

/// Cap on the exponential job retry delay, in milliseconds.
pub const JOB_RETRY_MAX_DELAY_MS: u64 = 600_000;

/// Default period between sync cycles (30 minutes).
pub const SYNC_INTERVAL_SECS: u64 = 1800;

/// Maximum number of messages pulled from the mailbox per cycle.
pub const MAX_FETCH_PER_CYCLE: usize = 100;

/// How far back the first sync looks when no checkpoint exists.
pub const INITIAL_LOOKBACK_DAYS: i64 = 1;

/// Resolved to-do list ids kept in memory.
pub const LIST_CACHE_MAX_CAPACITY: u64 = 64;

/// HTTP request timeout for AI and to-do backends, in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Notification display duration in milliseconds.
pub const NOTIFICATION_TIMEOUT_MS: u32 = 5000;
