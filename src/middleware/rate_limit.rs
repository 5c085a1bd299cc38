use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::{cache::CacheService, config::Config, error::AppError};

/// Sliding-window limiter applied per client IP.
#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheService,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(cache: CacheService, config: &Config) -> Self {
        Self {
            cache,
            limit: config.rate_limit_max,
            window: config.rate_limit_window(),
        }
    }

    pub async fn check_rate_limit(
        self: Arc<Self>,
        req: Request<Body>,
        next: Next,
    ) -> Result<Response, AppError> {
        let ip = client_ip(&req);
        let decision = match self.cache.check_rate_limit(&ip, self.limit, self.window).await {
            Ok(decision) => decision,
            Err(e) => {
                // Fail open: a cache outage must not take the API down.
                tracing::error!("Rate limiter unavailable, admitting {}: {}", ip, e);
                return Ok(next.run(req).await);
            }
        };

        let now = Utc::now();
        let reset_secs = decision.retry_after_secs(now);
        if !decision.allowed {
            tracing::warn!(ip = %ip, path = %req.uri().path(), "Rate limit exceeded");
            return Err(AppError::RateLimited {
                retry_after_secs: reset_secs.max(1),
            });
        }

        let mut response = next.run(req).await;
        let headers = response.headers_mut();
        headers.insert("ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("ratelimit-remaining", HeaderValue::from(decision.remaining));
        headers.insert("ratelimit-reset", HeaderValue::from(reset_secs));
        Ok(response)
    }
}

/// Client identity for rate limiting: `x-real-ip`, then the first
/// `x-forwarded-for` entry, then the peer address.
pub fn client_ip<B>(req: &Request<B>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .filter(|ip| !ip.trim().is_empty())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("anonymous")
        .trim()
        .to_string()
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    limiter.check_rate_limit(req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_real_ip_then_forwarded_for() {
        let req = Request::builder()
            .header("x-real-ip", "203.0.113.7")
            .header("x-forwarded-for", "198.51.100.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), "203.0.113.7");

        let req = Request::builder()
            .header("x-forwarded-for", " , 198.51.100.1, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), "198.51.100.1");
    }

    #[test]
    fn falls_back_to_peer_address_then_anonymous() {
        let mut req = Request::builder().body(()).unwrap();
        assert_eq!(client_ip(&req), "anonymous");

        let peer: SocketAddr = "192.0.2.10:51234".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(client_ip(&req), "192.0.2.10");
    }
}
