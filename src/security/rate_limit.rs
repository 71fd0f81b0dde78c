//! Admission control in front of the proxy route.
//!
//! A bucket left idle for `burst / rps` seconds has refilled completely and is
//! indistinguishable from a new one, so such buckets are swept out every
//! `SWEEP_EVERY` admissions. The map stays bounded by the clients seen within
//! one refill window.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Allow/deny decision per request key.
pub trait AdmissionGate: Send + Sync + 'static {
    fn admit(&self, key: &str) -> bool;
}

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Admissions between idle-bucket sweeps.
const SWEEP_EVERY: u64 = 1024;

/// Per-key token buckets.
pub struct TokenBucketLimiter {
    buckets: DashMap<String, TokenBucket>,
    rps: f64,
    burst: f64,
    admits: AtomicU64,
}

impl TokenBucketLimiter {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            rps: f64::from(requests_per_second),
            burst: f64::from(burst_size),
            admits: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets that have been idle long enough to be full again.
    /// Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let refill_secs = self.burst / self.rps;
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            let keep = bucket.last_update.elapsed().as_secs_f64() < refill_secs;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }
}

impl AdmissionGate for TokenBucketLimiter {
    fn admit(&self, key: &str) -> bool {
        let admitted = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst))
            .try_acquire(self.burst, self.rps);

        // The entry guard is released above; retain would deadlock on it.
        if self.admits.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let evicted = self.evict_idle();
            tracing::debug!(
                evicted,
                tracked = self.buckets.len(),
                "Swept idle rate limit buckets"
            );
        }
        admitted
    }
}

/// Middleware consulting the gate with the client IP as key.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(gate): State<Arc<dyn AdmissionGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();

    if gate.admit(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
        metrics::record_rate_limited();
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate limit exceeded" })),
        )
            .into_response()
    }
}
