//! Fixed-window rate limiting per connection.
//!
//! Cheap by construction: one counter and one `Instant` per connection,
//! reset when the window lapses. The handler checks every inbound frame
//! and answers rejections with an error frame instead of processing.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use parlor_protocol::ConnectionId;
use tracing::warn;

use crate::SessionError;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Events allowed per window.
    pub max_events: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_events: 30,
            window: Duration::from_secs(10),
        }
    }
}

struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<ConnectionId, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts one event against `conn`'s current window.
    pub fn check(&self, conn: ConnectionId) -> Result<(), SessionError> {
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.entry(conn).or_insert(Window { started: now, count: 0 });

        if now.duration_since(window.started) >= self.config.window {
            window.started = now;
            window.count = 0;
        }
        window.count += 1;
        if window.count > self.config.max_events {
            warn!(connection = %conn, count = window.count, "rate limit exceeded");
            return Err(SessionError::RateLimited(conn));
        }
        Ok(())
    }

    /// Drops the counter for a closed connection.
    pub fn forget(&self, conn: ConnectionId) {
        self.lock().remove(&conn);
    }

    /// Drops counters whose window has lapsed. Run periodically; `check`
    /// resets live counters on its own either way.
    pub fn sweep(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.lock()
            .retain(|_, w| now.duration_since(w.started) < window);
    }

    pub fn tracked(&self) -> usize {
        self.lock().len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

// =========================================================================
// Tests
// =========================================================================
