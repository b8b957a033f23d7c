use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::AppState;

pub const LIMIT_REACHED_MESSAGE: &str = "You have reached maximum request limit.";

/// Buckets idle this long are dropped once the map grows past
/// `SWEEP_THRESHOLD` entries.
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(600);
const SWEEP_THRESHOLD: usize = 4096;

/// Tokens are tracked in thousandths so fractional refill rates work
/// without floating point drift.
const SCALE: u64 = 1000;

struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

/// Token bucket per client address. Holds `burst` requests and refills
/// `rate` of them per second.
#[derive(Clone)]
pub struct LoginRateLimiter {
    buckets: Arc<DashMap<String, Bucket>>,
    /// Tokens (scaled) gained per second.
    rate: u64,
    capacity: u64,
}

impl LoginRateLimiter {
    /// `None` when `per_second` doesn't enable limiting.
    pub fn new(per_second: f64) -> Option<Self> {
        if !per_second.is_finite() || per_second <= 0.0 {
            return None;
        }
        let burst = per_second.max(1.0).floor() as u64;
        Some(Self {
            buckets: Arc::new(DashMap::new()),
            rate: ((per_second * SCALE as f64) as u64).max(1),
            capacity: burst * SCALE,
        })
    }

    /// Take one request from `client`'s bucket.
    pub fn try_acquire(&self, client: &str) -> bool {
        let now = Instant::now();
        if self.buckets.len() > SWEEP_THRESHOLD {
            self.buckets
                .retain(|_, bucket| now.duration_since(bucket.last_refill) < IDLE_BUCKET_TTL);
        }

        let mut bucket = self.buckets.entry(client.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let elapsed_ms = now.duration_since(bucket.last_refill).as_millis() as u64;
        let refill = elapsed_ms.saturating_mul(self.rate) / 1000;
        if refill > 0 {
            bucket.tokens = bucket.tokens.saturating_add(refill).min(self.capacity);
            bucket.last_refill = now;
        }

        if bucket.tokens < SCALE {
            return false;
        }
        bucket.tokens -= SCALE;
        true
    }
}

/// Client address for limiting: the last `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the peer address.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware for the login route. A no-op when no limiter is configured.
pub async fn login_rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(limiter) = &state.login_limiter else {
        return next.run(req).await;
    };
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_address(req.headers(), peer);
    if !limiter.try_acquire(&client) {
        warn!("login rate limit reached for {}", client);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": LIMIT_REACHED_MESSAGE })),
        )
            .into_response();
    }
    next.run(req).await
}
