//! Adaptive rate limiter shared by all workers.
//!
//! Tracks per-endpoint limit state from response headers and applies
//! exponential backoff on 429s. Exact limits are unknown until the service
//! reports them, so state starts empty and tightens as headers arrive.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Rate limit state for a single endpoint.
#[derive(Debug)]
pub struct EndpointLimitState {
    /// Limit on requests per interval
    pub limit_requests: Option<u32>,
    /// Remaining requests in current interval
    pub remaining_requests: Option<u32>,
    /// When the request limit resets
    pub reset_requests_at: Option<Instant>,
    /// Consecutive 429 errors (for backoff)
    pub consecutive_429s: u32,
    /// Backoff until this time
    pub backoff_until: Option<Instant>,
    /// Last update time
    pub last_updated: Instant,
}

impl Default for EndpointLimitState {
    fn default() -> Self {
        Self {
            limit_requests: None,
            remaining_requests: None,
            reset_requests_at: None,
            consecutive_429s: 0,
            backoff_until: None,
            last_updated: Instant::now(),
        }
    }
}

impl EndpointLimitState {
    /// Check if a request can proceed right now.
    pub fn can_proceed(&self) -> bool {
        let now = Instant::now();

        if self.backoff_until.is_some_and(|t| now < t) {
            return false;
        }

        // Blocked if the window is exhausted and the reset is still ahead
        if self.remaining_requests == Some(0) && self.reset_requests_at.is_some_and(|t| now < t) {
            return false;
        }

        true
    }

    /// Time to wait before proceeding.
    pub fn wait_time(&self) -> Duration {
        let now = Instant::now();
        let mut max_wait = Duration::ZERO;

        if let Some(backoff_until) = self.backoff_until.filter(|&t| t > now) {
            max_wait = max_wait.max(backoff_until - now);
        }

        if self.remaining_requests == Some(0) {
            if let Some(reset_at) = self.reset_requests_at.filter(|&t| t > now) {
                max_wait = max_wait.max(reset_at - now);
            }
        }

        max_wait
    }

    /// Record a 429 and compute the next backoff window.
    pub fn record_429(&mut self, retry_after: Option<f64>) {
        self.consecutive_429s += 1;
        let backoff_secs = retry_after
            .unwrap_or_else(|| (2.0_f64).powi(self.consecutive_429s as i32))
            .min(60.0);
        self.backoff_until = Some(Instant::now() + Duration::from_secs_f64(backoff_secs));
        warn!(
            consecutive_429s = self.consecutive_429s,
            backoff_secs = backoff_secs,
            "Rate limited (429), backing off"
        );
    }

    /// Record a successful request.
    pub fn record_success(&mut self) {
        if self.consecutive_429s > 0 {
            self.consecutive_429s = 0;
            self.backoff_until = None;
        }
    }

    /// Update state from rate limit response headers, when present.
    pub fn update_from_headers(&mut self, headers: &reqwest::header::HeaderMap) {
        let now = Instant::now();

        let parse_header = |headers: &reqwest::header::HeaderMap, key: &str| -> Option<String> {
            headers.get(key)?.to_str().ok().map(|s| s.to_string())
        };

        if let Some(s) = parse_header(headers, "x-ratelimit-limit-requests") {
            self.limit_requests = s.parse().ok();
        }
        if let Some(s) = parse_header(headers, "x-ratelimit-remaining-requests") {
            self.remaining_requests = s.parse().ok();
        }
        if let Some(secs) =
            parse_header(headers, "x-ratelimit-reset-requests").and_then(|s| s.parse::<f64>().ok())
        {
            self.reset_requests_at = Some(now + Duration::from_secs_f64(secs));
        }

        self.last_updated = now;
    }
}

/// Adaptive rate limiter keyed by endpoint.
#[derive(Debug)]
pub struct RateLimiter {
    /// Per-endpoint rate limit state
    states: DashMap<String, EndpointLimitState>,
    /// Global stats
    total_requests: AtomicU64,
    total_429s: AtomicU64,
    total_wait_ms: AtomicU64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            total_requests: AtomicU64::new(0),
            total_429s: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
        }
    }

    /// Wait if necessary before making a request to the given endpoint.
    ///
    /// Returns the duration waited.
    pub async fn wait_if_needed(&self, endpoint: &str) -> Duration {
        let wait_time = {
            let state = self.states.entry(endpoint.to_string()).or_default();
            state.wait_time()
        };

        if wait_time > Duration::ZERO {
            debug!(
                endpoint = endpoint,
                wait_ms = wait_time.as_millis(),
                "Waiting for rate limit"
            );
            self.total_wait_ms
                .fetch_add(wait_time.as_millis() as u64, Ordering::Relaxed);
            tokio::time::sleep(wait_time).await;
        }

        wait_time
    }

    /// Check if a request can proceed (non-blocking).
    pub fn can_proceed(&self, endpoint: &str) -> bool {
        self.states
            .entry(endpoint.to_string())
            .or_default()
            .can_proceed()
    }

    /// Record a request result.
    pub fn record_request(
        &self,
        endpoint: &str,
        status: u16,
        headers: &reqwest::header::HeaderMap,
    ) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut state = self.states.entry(endpoint.to_string()).or_default();

        state.update_from_headers(headers);

        if status == 429 {
            self.total_429s.fetch_add(1, Ordering::Relaxed);
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok());
            state.record_429(retry_after);
        } else if status < 400 {
            state.record_success();
        }
    }

    /// Get statistics.
    pub fn stats(&self) -> RateLimiterStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_429s = self.total_429s.load(Ordering::Relaxed);
        let total_wait_ms = self.total_wait_ms.load(Ordering::Relaxed);

        RateLimiterStats {
            total_requests,
            total_429s,
            total_wait_secs: total_wait_ms as f64 / 1000.0,
            rate_limit_ratio: if total_requests > 0 {
                total_429s as f64 / total_requests as f64
            } else {
                0.0
            },
            endpoints_tracked: self.states.len(),
        }
    }
}

/// Rate limiter statistics.
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub total_429s: u64,
    pub total_wait_secs: f64,
    pub rate_limit_ratio: f64,
    pub endpoints_tracked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_proceeds_immediately() {
        let state = EndpointLimitState::default();
        assert!(state.can_proceed());
        assert_eq!(state.wait_time(), Duration::ZERO);
    }

    #[test]
    fn backoff_blocks_and_clears_on_success() {
        let mut state = EndpointLimitState::default();
        state.record_429(None);
        assert!(!state.can_proceed());
        assert!(state.wait_time() > Duration::ZERO);

        state.record_success();
        assert_eq!(state.consecutive_429s, 0);
        assert!(state.can_proceed());
    }

    #[test]
    fn retry_after_hint_caps_backoff() {
        let mut state = EndpointLimitState::default();
        state.record_429(Some(120.0));
        // Capped at 60s
        assert!(state.wait_time() <= Duration::from_secs(60));
    }

    #[test]
    fn exhausted_window_blocks_until_reset() {
        let mut state = EndpointLimitState::default();
        state.remaining_requests = Some(0);
        state.reset_requests_at = Some(Instant::now() + Duration::from_secs(5));
        assert!(!state.can_proceed());

        state.remaining_requests = Some(3);
        assert!(state.can_proceed());
    }

    #[test]
    fn limiter_tracks_429_ratio() {
        let limiter = RateLimiter::new();
        let headers = reqwest::header::HeaderMap::new();
        limiter.record_request("finder", 200, &headers);
        limiter.record_request("finder", 429, &headers);

        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_429s, 1);
        assert!((stats.rate_limit_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.endpoints_tracked, 1);
        assert!(!limiter.can_proceed("finder"));
    }
}
