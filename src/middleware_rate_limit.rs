use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{Arc, Weak},
    time::Duration,
};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{AppState, errors::AppError};

pub type KeyedRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Build a keyed rate limiter allowing `per_minute` requests per client address.
/// A zero quota is raised to one.
///
/// # Must Use
/// The returned rate limiter should be stored; dropping it loses rate limiting state.
#[must_use]
pub fn build_rate_limiter(per_minute: u32) -> Arc<KeyedRateLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::keyed(quota))
}

/// Periodically drop client entries whose quota has fully refilled, so the
/// keyed state only holds addresses seen within roughly one quota period.
///
/// The task ends on its own once `limiter` has been dropped.
pub fn spawn_pruner(limiter: &Arc<KeyedRateLimiter>, every: Duration) -> JoinHandle<()> {
    let limiter: Weak<KeyedRateLimiter> = Arc::downgrade(limiter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(limiter) = limiter.upgrade() else {
                break;
            };
            let before = limiter.len();
            limiter.retain_recent();
            limiter.shrink_to_fit();
            tracing::debug!(before, after = limiter.len(), "pruned rate limiter state");
        }
    })
}

/// Reject clients that exceed their per-minute quota.
///
/// # Errors
/// Returns `RateLimited` once the caller's quota is exhausted.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if state.rate_limiter.check_key(&addr.ip()).is_err() {
        tracing::warn!(client = %addr.ip(), "rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    Ok(next.run(req).await)
}
