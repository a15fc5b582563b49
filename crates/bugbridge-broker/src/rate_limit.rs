use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

/// Sliding-window request limiter, keyed per owner and route.
#[derive(Debug)]
pub struct RateLimiter {
    inner: Mutex<HashMap<String, Vec<Instant>>>,
    max: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max,
            window,
        }
    }

    pub async fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let entries = guard.entry(key.to_string()).or_default();
        entries.retain(|ts| now.saturating_duration_since(*ts) < self.window);
        if entries.len() >= self.max {
            return Err(RateLimitError);
        }
        entries.push(now);
        Ok(())
    }
}

#[derive(Debug)]
pub struct RateLimitError;

pub fn key(owner: &str, route: &str) -> String {
    format!("{owner}:{route}")
}
