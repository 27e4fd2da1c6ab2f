use std::sync::Arc;

use crate::{
    Config,
    cache::EntityCache,
    lending::LendingEngine,
    middleware_rate_limit::{KeyedRateLimiter, build_rate_limiter},
    store::LibraryStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LibraryStore>,
    pub cache: EntityCache,
    pub lending: LendingEngine,
    pub config: Config,
    pub rate_limiter: Arc<KeyedRateLimiter>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn LibraryStore>, cache: EntityCache, config: Config) -> Self {
        let lending = LendingEngine::new(store.clone(), cache.clone());
        let rate_limiter = build_rate_limiter(config.rate_limit_per_minute);
        Self {
            store,
            cache,
            lending,
            config,
            rate_limiter,
        }
    }
}
