//! Rate limiting middleware using token bucket algorithm

use axum::{extract::Request, middleware::Next, response::Response};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use mailscout_common::{
    config::RateLimitConfig,
    errors::{AppError, Result},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Create a new rate limiter
pub fn create_rate_limiter(config: &RateLimitConfig) -> Result<Arc<GlobalRateLimiter>> {
    let nonzero = |value: u32, name: &str| {
        NonZeroU32::new(value).ok_or_else(|| AppError::Configuration {
            message: format!("rate_limit.{name} must be greater than zero"),
        })
    };

    let quota = Quota::per_second(nonzero(config.requests_per_second, "requests_per_second")?)
        .allow_burst(nonzero(config.burst, "burst")?);

    Ok(Arc::new(RateLimiter::direct(quota)))
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    request: Request,
    next: Next,
    limiter: Arc<GlobalRateLimiter>,
    limit: u32,
) -> Result<Response> {
    match limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited { limit })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(requests_per_second: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second,
            burst,
            enabled: true,
        }
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(&config(100, 200)).unwrap();
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_burst_exhaustion() {
        let limiter = create_rate_limiter(&config(1, 2)).unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_zero_quota_rejected() {
        let err = create_rate_limiter(&config(0, 10)).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
