//! Fixed-window request limiter for the list API, keyed by client address.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::identity::{Clock, SystemClock};

pub const API_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const API_MAX_REQUESTS: u32 = 120;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

pub struct ApiLimiter {
    windows: Mutex<HashMap<String, Window>>,
    window: Duration,
    max_requests: u32,
    clock: Arc<dyn Clock>,
}

impl ApiLimiter {
    pub fn new() -> Self { Self::with_clock(Arc::new(SystemClock)) }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { windows: Mutex::new(HashMap::new()), window: API_WINDOW, max_requests: API_MAX_REQUESTS, clock }
    }

    pub fn with_limits(mut self, window: Duration, max_requests: u32) -> Self {
        self.window = window;
        self.max_requests = max_requests;
        self
    }

    /// Count one request; fails once the client has used up its window.
    pub fn check(&self, id: &str) -> AppResult<()> {
        let now = self.clock.now();
        let mut map = self.windows.lock();
        let w = map.entry(id.to_string()).or_insert(Window { started_at: now, count: 0 });
        if now.saturating_duration_since(w.started_at) >= self.window {
            *w = Window { started_at: now, count: 0 };
        }
        if w.count >= self.max_requests {
            let left = self.window.saturating_sub(now.saturating_duration_since(w.started_at));
            warn!(client = id, "api rate limit exceeded");
            return Err(AppError::RateLimited { retry_after_secs: left.as_secs().max(1) });
        }
        w.count += 1;
        Ok(())
    }

    /// Drop windows that have fully elapsed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.windows.lock();
        let before = map.len();
        map.retain(|_, w| now.saturating_duration_since(w.started_at) < self.window);
        before - map.len()
    }
}

impl Default for ApiLimiter {
    fn default() -> Self { Self::new() }
}
