//! Sliding-window admission control for outbound AI calls.
//!
//! Every admitted request leaves a timestamp behind. A caller is admitted
//! once fewer than `max_requests` timestamps fall inside the trailing window;
//! otherwise it sleeps until the oldest one ages out.
//!
//! Callers pass a turnstile before looking at the window. The caller at the
//! turnstile holds it while it sleeps, and `tokio::sync::Mutex` grants it in
//! arrival order, so admissions are first come, first served. The timestamp
//! lock itself is only held while pruning and recording.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::constants::{HOUR_WINDOW_MS, MINUTE_WINDOW_MS};

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    /// Held by the caller next in line, including while it waits
    turnstile: Mutex<()>,
    /// Admission instants, oldest first
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// A limiter admitting `max_requests` calls per `window`.
    ///
    /// A limit of zero would never admit anything and is raised to one.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            turnstile: Mutex::new(()),
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn per_minute(requests: usize) -> Self {
        Self::new(requests, Duration::from_millis(MINUTE_WINDOW_MS))
    }

    pub fn per_hour(requests: usize) -> Self {
        Self::new(requests, Duration::from_millis(HOUR_WINDOW_MS))
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for a free slot, then record the admission.
    pub async fn acquire(&self) {
        let _turn = self.turnstile.lock().await;
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                self.prune(&mut timestamps, now);

                if timestamps.len() < self.max_requests {
                    timestamps.push_back(now);
                    return;
                }

                // Full window: the oldest entry decides when a slot opens.
                match timestamps.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            tracing::debug!(
                "Rate limit reached ({} per {:?}), waiting {:?}",
                self.max_requests,
                self.window,
                wait
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Slots free right now, without waiting.
    pub async fn remaining_requests(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        self.prune(&mut timestamps, Instant::now());
        self.max_requests.saturating_sub(timestamps.len())
    }

    pub async fn reset(&self) {
        self.timestamps.lock().await.clear();
    }

    /// Drop admissions at or before `now - window`.
    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}
